// crates/backend-lib/src/http/pipeline.rs

//! Per-request dispatcher: global middleware, route resolution, route
//! middleware, handler, and the single error-to-response translation point.
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::Request,
    response::Response,
};
use metrics::counter;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, error};

use super::{RequestContext, ResponseContext, Router};
use crate::error::AppError;
use crate::metrics as keys;

/// Message for requests no route matches
pub const ROUTE_NOT_FOUND: &str = "Rota não encontrada";

/// Drives a request through the router's middleware and handlers
pub struct Pipeline {
    router: Router,
}

impl Pipeline {
    /// Wrap a fully registered router. No routes can be added afterwards.
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Handle one raw transport request
    pub async fn dispatch(&self, req: Request<Body>) -> Response {
        let ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

        let mut ctx = RequestContext::from_http(req, ip);
        let mut res = ResponseContext::new();

        match self.run(&mut ctx, &mut res).await {
            Ok(()) => res.into_response(),
            Err(err) => {
                if err.is_internal() {
                    counter!(keys::INTERNAL_ERROR).increment(1);
                    error!(
                        method = %ctx.method,
                        path = %ctx.pathname,
                        error = %err,
                        "request failed"
                    );
                } else {
                    debug!(
                        method = %ctx.method,
                        path = %ctx.pathname,
                        status = err.status_code().as_u16(),
                        "request rejected"
                    );
                }
                res.into_error_response(&err)
            },
        }
    }

    async fn run(
        &self,
        req: &mut RequestContext,
        res: &mut ResponseContext,
    ) -> Result<(), AppError> {
        for middleware in self.router.middlewares() {
            middleware.handle(req, res).await?;
            if res.is_sent() {
                return Ok(());
            }
        }

        let found = self
            .router
            .resolve(&req.method, &req.pathname)
            .ok_or_else(|| AppError::NotFound(ROUTE_NOT_FOUND.to_string()))?;
        req.params = found.params;
        let route = found.route;

        for middleware in &route.middlewares {
            middleware.handle(req, res).await?;
            if res.is_sent() {
                return Ok(());
            }
        }

        route.handler.call(req, res).await?;

        if !res.is_sent() {
            return Err(AppError::Internal(format!(
                "{} {} finished without a response",
                route.method, route.pattern
            )));
        }
        Ok(())
    }

    /// Transport service that hands every request to this pipeline
    pub fn into_service(self) -> axum::Router {
        let pipeline = Arc::new(self);
        axum::Router::new().fallback(move |req: Request<Body>| {
            let pipeline = Arc::clone(&pipeline);
            async move { pipeline.dispatch(req).await }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{handler_fn, middleware_fn};
    use axum::http::{header, Method, StatusCode};
    use lms_common::MessageResponse;
    use tower::ServiceExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn echo_router() -> Router {
        let mut router = Router::new();
        router.get(
            "/lms/lesson/:courseSlug/:lessonSlug",
            handler_fn(|req, res| {
                let body = serde_json::json!({
                    "message": "ok",
                    "course": req.param("courseSlug"),
                    "lesson": req.param("lessonSlug"),
                });
                res.json(StatusCode::OK, &body)
            }),
            vec![],
        );
        router
    }

    #[tokio::test]
    async fn test_dispatch_with_params() {
        let pipeline = Pipeline::new(echo_router());
        let response = pipeline.dispatch(get("/lms/lesson/go-101/intro")).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["course"], "go-101");
        assert_eq!(body["lesson"], "intro");
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let pipeline = Pipeline::new(echo_router());
        let response = pipeline.dispatch(get("/lms/lesson/go-101")).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["message"], ROUTE_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_middleware_order_and_short_circuit() {
        let mut router = Router::new();
        router.use_middleware(middleware_fn(|req, _res| {
            req.params.insert("seen".into(), "global".into());
            Ok(())
        }));
        router.get(
            "/open",
            handler_fn(|req, res| {
                let seen = req.param("seen").unwrap_or_default().to_string();
                res.json(StatusCode::OK, &MessageResponse::new(seen))
            }),
            vec![],
        );
        router.get(
            "/closed",
            handler_fn(|_req, _res| Err(AppError::Internal("handler must not run".into()))),
            vec![middleware_fn(|_req, res| {
                res.json(StatusCode::ACCEPTED, &MessageResponse::new("stopped"))
            })],
        );
        let pipeline = Pipeline::new(router);

        // Params from resolution replace whatever global middleware left
        let response = pipeline.dispatch(get("/open")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["message"], "");

        let response = pipeline.dispatch(get("/closed")).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await["message"], "stopped");
    }

    #[tokio::test]
    async fn test_internal_errors_are_masked() {
        let mut router = Router::new();
        router.get(
            "/boom",
            handler_fn(|_req, _res| Err(AppError::Internal("db at 10.0.0.3 down".into()))),
            vec![],
        );
        router.get("/silent", handler_fn(|_req, _res| Ok(())), vec![]);
        let pipeline = Pipeline::new(router);

        let response = pipeline.dispatch(get("/boom")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );
        let body = body_json(response).await;
        assert_eq!(body["message"], "Erro de servidor");
        assert_eq!(body["code"], "INT_001");

        let response = pipeline.dispatch(get("/silent")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_application_errors_are_verbatim() {
        let mut router = Router::new();
        router.route(
            Method::DELETE,
            "/thing",
            handler_fn(|_req, _res| Err(AppError::Conflict("já existe".into()))),
            vec![],
        );
        let response = Pipeline::new(router)
            .into_service()
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/thing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["message"], "já existe");
        assert_eq!(body["code"], "CONFLICT_001");
    }
}
