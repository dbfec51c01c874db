// crates/backend-lib/src/middleware/body_json.rs

//! Bounded JSON body reader.
use async_trait::async_trait;
use axum::http::header;
use futures_util::StreamExt;

use crate::error::AppError;
use crate::http::{Middleware, RequestContext, ResponseContext};

pub const BODY_TOO_LARGE: &str = "Requisição com corpo muito grande";
pub const REQUEST_ABORTED: &str = "Requisição abortada";
pub const INVALID_JSON: &str = "JSON inválido";

/// Reads and parses `application/json` bodies into [`RequestContext::body`].
///
/// Other content types pass through untouched with the body left as `{}`.
#[derive(Debug, Clone)]
pub struct JsonBody {
    max_bytes: usize,
}

impl JsonBody {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

fn is_json(content_type: &str) -> bool {
    let mut parts = content_type.split(';').map(str::trim);
    let media = parts.next().unwrap_or_default();
    if !media.eq_ignore_ascii_case("application/json") {
        return false;
    }
    match parts.next() {
        None => true,
        Some(param) => param.eq_ignore_ascii_case("charset=utf-8") && parts.next().is_none(),
    }
}

fn too_large() -> AppError {
    AppError::PayloadTooLarge(BODY_TOO_LARGE.to_string())
}

#[async_trait]
impl Middleware for JsonBody {
    async fn handle(
        &self,
        req: &mut RequestContext,
        _res: &mut ResponseContext,
    ) -> Result<(), AppError> {
        if !req.header(header::CONTENT_TYPE).is_some_and(is_json) {
            return Ok(());
        }

        // The declared length is only a first filter; the stream is counted too.
        let declared = req
            .header(header::CONTENT_LENGTH)
            .and_then(|v| v.trim().parse::<usize>().ok())
            .ok_or_else(too_large)?;
        if declared > self.max_bytes {
            return Err(too_large());
        }

        let Some(body) = req.take_body() else {
            return Ok(());
        };

        let mut stream = body.into_data_stream();
        let mut buf = Vec::with_capacity(declared);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|_| AppError::BadRequest(REQUEST_ABORTED.to_string()))?;
            if buf.len() + chunk.len() > self.max_bytes {
                return Err(too_large());
            }
            buf.extend_from_slice(&chunk);
        }

        if buf.is_empty() {
            req.body = serde_json::Value::Object(serde_json::Map::new());
            return Ok(());
        }

        req.body = serde_json::from_slice(&buf)
            .map_err(|_| AppError::BadRequest(INVALID_JSON.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, Bytes};
    use axum::http::{Request, StatusCode};
    use std::net::{IpAddr, Ipv4Addr};

    fn request(content_type: Option<&str>, length: Option<&str>, body: Body) -> RequestContext {
        let mut builder = Request::builder().method("POST").uri("/auth/login");
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        if let Some(length) = length {
            builder = builder.header(header::CONTENT_LENGTH, length);
        }
        RequestContext::from_http(builder.body(body).unwrap(), IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    async fn parse(limit: usize, mut req: RequestContext) -> (RequestContext, Result<(), AppError>) {
        let mut res = ResponseContext::new();
        let result = JsonBody::new(limit).handle(&mut req, &mut res).await;
        (req, result)
    }

    #[test]
    fn test_content_type_match() {
        assert!(is_json("application/json"));
        assert!(is_json("application/json; charset=utf-8"));
        assert!(is_json("Application/JSON;charset=UTF-8"));
        assert!(!is_json("application/json; charset=latin1"));
        assert!(!is_json("text/plain"));
        assert!(!is_json("application/jsonp"));
    }

    #[tokio::test]
    async fn test_parses_json() {
        let body = r#"{"email":"ada@example.com"}"#;
        let req = request(
            Some("application/json"),
            Some(&body.len().to_string()),
            Body::from(body),
        );
        let (req, result) = parse(1024, req).await;
        result.unwrap();
        assert_eq!(req.body["email"], "ada@example.com");
    }

    #[tokio::test]
    async fn test_other_content_types_are_skipped() {
        let req = request(Some("text/plain"), None, Body::from("not json"));
        let (req, result) = parse(1024, req).await;
        result.unwrap();
        assert_eq!(req.body, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_empty_body_is_empty_object() {
        let req = request(Some("application/json"), Some("0"), Body::empty());
        let (req, result) = parse(1024, req).await;
        result.unwrap();
        assert_eq!(req.body, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_length_rules() {
        let req = request(Some("application/json"), None, Body::from("{}"));
        let err = parse(1024, req).await.1.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let req = request(Some("application/json"), Some("abc"), Body::from("{}"));
        assert!(matches!(parse(1024, req).await.1, Err(AppError::PayloadTooLarge(_))));

        let req = request(Some("application/json"), Some("2048"), Body::from("{}"));
        assert!(matches!(parse(1024, req).await.1, Err(AppError::PayloadTooLarge(_))));

        // Understated length: the stream itself is capped
        let big = format!(r#"{{"pad":"{}"}}"#, "x".repeat(64));
        let req = request(Some("application/json"), Some("2"), Body::from(big));
        assert!(matches!(parse(32, req).await.1, Err(AppError::PayloadTooLarge(_))));
    }

    #[tokio::test]
    async fn test_invalid_json_is_bad_request() {
        let req = request(Some("application/json"), Some("5"), Body::from("{oops"));
        let err = parse(1024, req).await.1.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), INVALID_JSON);
    }

    #[tokio::test]
    async fn test_aborted_stream_is_bad_request() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"{\"a\":")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let body = Body::from_stream(futures_util::stream::iter(chunks));
        let req = request(Some("application/json"), Some("10"), body);

        let err = parse(1024, req).await.1.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), REQUEST_ABORTED);
    }
}
