// crates/backend-lib/src/http/context.rs

//! Mutable request/response state threaded through middleware and handlers.
use axum::{
    body::Body,
    extract::Query,
    http::{
        header::{self, HeaderName},
        HeaderMap, HeaderValue, Method, Request, StatusCode,
    },
    response::Response,
};
use lms_common::Identity;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use crate::auth::session::{SessionCookie, SESSION_COOKIE};
use crate::error::AppError;
use crate::validation::Validate;

const JSON: &str = "application/json";
const PROBLEM_JSON: &str = "application/problem+json";

/// Split a `Cookie` header into name/value pairs.
///
/// The first `=` separates name from value; pairs without a name are skipped
/// and later duplicates overwrite earlier ones.
pub fn parse_cookies(header: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for pair in header.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (name, value) = match pair.split_once('=') {
            Some((name, value)) => (name.trim(), value.trim()),
            None => (pair, ""),
        };
        if name.is_empty() {
            continue;
        }
        cookies.insert(name.to_string(), value.to_string());
    }
    cookies
}

/// Incoming request as seen by middleware and handlers
pub struct RequestContext {
    pub method: Method,
    pub pathname: String,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub cookies: HashMap<String, String>,
    /// Client address
    pub ip: IpAddr,
    /// Parsed JSON body, `{}` until a body parser fills it
    pub body: serde_json::Value,
    /// Values captured by `:name` route segments
    pub params: HashMap<String, String>,
    /// Set by the auth guard when the session is valid
    pub identity: Option<Identity>,
    // `Body` is not `Sync`; the lock makes the whole context `Sync`
    raw_body: Option<Mutex<Body>>,
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("pathname", &self.pathname)
            .field("ip", &self.ip)
            .field("params", &self.params)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl RequestContext {
    /// Adapt a raw transport request
    pub fn from_http(req: Request<Body>, ip: IpAddr) -> Self {
        let (parts, body) = req.into_parts();

        let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .unwrap_or_default();

        let mut cookies = HashMap::new();
        for value in parts.headers.get_all(header::COOKIE) {
            if let Ok(value) = value.to_str() {
                cookies.extend(parse_cookies(value));
            }
        }

        Self {
            method: parts.method,
            pathname: parts.uri.path().to_string(),
            query,
            headers: parts.headers,
            cookies,
            ip,
            body: serde_json::Value::Object(serde_json::Map::new()),
            params: HashMap::new(),
            identity: None,
            raw_body: Some(Mutex::new(body)),
        }
    }

    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn user_agent(&self) -> &str {
        self.header(header::USER_AGENT).unwrap_or("")
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Secret from the session cookie, if the client sent a non-empty one
    pub fn session_secret(&self) -> Option<&str> {
        self.cookie(SESSION_COOKIE).filter(|v| !v.is_empty())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Take the unread transport body. Returns `None` once consumed.
    pub fn take_body(&mut self) -> Option<Body> {
        self.raw_body.take().map(Mutex::into_inner)
    }

    /// Deserialize the parsed body into `T` and run its validation rules
    pub fn input<T>(&self) -> Result<T, AppError>
    where
        T: DeserializeOwned + Validate,
    {
        let parsed: T = serde_json::from_value(self.body.clone())
            .map_err(|e| AppError::Validation(format!("Corpo inválido: {e}")))?;
        parsed.validate()
    }

    /// Identity attached by the auth guard
    pub fn identity(&self) -> Result<&Identity, AppError> {
        self.identity.as_ref().ok_or_else(AppError::not_authorized)
    }
}

/// Response being assembled for the client
#[derive(Debug)]
pub struct ResponseContext {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
    sent: bool,
}

impl Default for ResponseContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseContext {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: None,
            sent: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Set the session cookie directive, replacing an earlier one
    pub fn set_cookie(&mut self, cookie: &SessionCookie) -> Result<(), AppError> {
        let value = HeaderValue::from_str(&cookie.to_string())
            .map_err(|e| AppError::Internal(format!("invalid cookie header: {e}")))?;
        let prefix = format!("{SESSION_COOKIE}=");
        let others: Vec<HeaderValue> = self
            .headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter(|v| !v.as_bytes().starts_with(prefix.as_bytes()))
            .cloned()
            .collect();
        self.headers.remove(header::SET_COOKIE);
        for other in others {
            self.headers.append(header::SET_COOKIE, other);
        }
        self.headers.append(header::SET_COOKIE, value);
        Ok(())
    }

    /// Mark the response as private to this client
    pub fn no_store(&mut self) {
        self.headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("private, no-store"),
        );
        self.headers
            .insert(header::VARY, HeaderValue::from_static("Cookie"));
    }

    /// Write a JSON body and finish the response
    pub fn json<T: Serialize>(&mut self, status: StatusCode, body: &T) -> Result<(), AppError> {
        let bytes = serde_json::to_vec(body)?;
        self.status = status;
        self.headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON));
        self.body = Some(bytes);
        self.sent = true;
        Ok(())
    }

    /// Finish the response without a body
    pub fn no_content(&mut self) {
        self.status = StatusCode::NO_CONTENT;
        self.headers.remove(header::CONTENT_TYPE);
        self.body = None;
        self.sent = true;
    }

    /// Whether a middleware or handler already produced the response
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body.unwrap_or_default()));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }

    /// Response for a failed request. Headers already set are kept.
    pub fn into_error_response(mut self, err: &AppError) -> Response {
        if let AppError::RateLimited { retry_after } = err {
            self.headers
                .insert(header::RETRY_AFTER, HeaderValue::from(*retry_after));
        }
        let body = serde_json::to_vec(&err.to_body()).unwrap_or_default();
        self.headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(PROBLEM_JSON));
        self.status = err.status_code();
        self.body = Some(body);
        self.into_response()
    }
}
