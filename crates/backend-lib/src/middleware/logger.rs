// crates/backend-lib/src/middleware/logger.rs

//! Per-request access log line.
use async_trait::async_trait;
use tracing::info;

use crate::error::AppError;
use crate::http::{Middleware, RequestContext, ResponseContext};

/// Logs method, path and client ip of every request at info
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogger;

#[async_trait]
impl Middleware for RequestLogger {
    async fn handle(
        &self,
        req: &mut RequestContext,
        _res: &mut ResponseContext,
    ) -> Result<(), AppError> {
        info!(method = %req.method, path = %req.pathname, ip = %req.ip, "request");
        Ok(())
    }
}
