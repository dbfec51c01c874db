// ============================
// crates/backend-lib/src/auth/guard.rs
// ============================
//! Route middleware enforcing a valid session and a minimum role.
use async_trait::async_trait;
use lms_common::Role;
use std::sync::Arc;
use tracing::warn;

use super::session::SessionService;
use crate::error::AppError;
use crate::http::{Middleware, RequestContext, ResponseContext};

/// Rejects requests without a valid session whose role satisfies `required`
pub struct AuthGuard {
    sessions: SessionService,
    required: Role,
}

/// Attaches the identity when a valid session is presented; never rejects
pub struct OptionalAuth {
    sessions: SessionService,
}

impl AuthGuard {
    pub fn new(sessions: SessionService, required: Role) -> Self {
        Self { sessions, required }
    }
}

impl OptionalAuth {
    pub fn new(sessions: SessionService) -> Self {
        Self { sessions }
    }
}

/// Shared [`AuthGuard`] for use in a route's middleware list
pub fn guard(sessions: &SessionService, required: Role) -> Arc<dyn Middleware> {
    Arc::new(AuthGuard::new(sessions.clone(), required))
}

/// Shared [`OptionalAuth`] for use in a route's middleware list
pub fn optional(sessions: &SessionService) -> Arc<dyn Middleware> {
    Arc::new(OptionalAuth::new(sessions.clone()))
}

#[async_trait]
impl Middleware for AuthGuard {
    async fn handle(
        &self,
        req: &mut RequestContext,
        res: &mut ResponseContext,
    ) -> Result<(), AppError> {
        res.no_store();

        let sid = req
            .session_secret()
            .ok_or_else(AppError::not_authorized)?
            .to_string();

        let validation = self.sessions.validate(&sid).await?;
        res.set_cookie(&validation.cookie)?;

        let identity = validation.identity.ok_or_else(AppError::not_authorized)?;
        if !identity.role.satisfies(self.required) {
            return Err(AppError::forbidden());
        }

        req.identity = Some(identity);
        Ok(())
    }
}

#[async_trait]
impl Middleware for OptionalAuth {
    async fn handle(
        &self,
        req: &mut RequestContext,
        res: &mut ResponseContext,
    ) -> Result<(), AppError> {
        let Some(sid) = req.session_secret().map(str::to_string) else {
            return Ok(());
        };

        let validation = match self.sessions.validate(&sid).await {
            Ok(validation) => validation,
            Err(err) => {
                warn!(error = %err, "optional session check failed");
                return Ok(());
            },
        };
        res.set_cookie(&validation.cookie)?;

        if let Some(identity) = validation.identity {
            res.no_store();
            req.identity = Some(identity);
        }
        Ok(())
    }
}
