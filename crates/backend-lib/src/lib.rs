// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Core of the LMS auth backend: password hashing, sessions, the auth guard,
//! a hand-built router/middleware pipeline and the `/auth` routes.

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod mailer;
pub mod metrics;
pub mod middleware;
pub mod store;
pub mod validation;

use std::sync::Arc;

use crate::api::AuthApi;
use crate::auth::{PasswordHasher, SessionService};
use crate::clock::{Clock, SystemClock};
use crate::config::Settings;
use crate::http::{Pipeline, Router};
use crate::mailer::{LogMailer, Mailer};
use crate::middleware::{JsonBody, RateLimiter, RequestLogger};
use crate::store::AuthStore;

pub use crate::error::AppError;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Settings the process was started with
    pub settings: Arc<Settings>,
    /// User/session persistence
    pub store: Arc<dyn AuthStore>,
    pub clock: Arc<dyn Clock>,
    /// Session manager
    pub sessions: SessionService,
    pub passwords: PasswordHasher,
    /// Reset link delivery
    pub mailer: Arc<dyn Mailer>,
    /// Rate limiter, shared with the background sweeper
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// State for production: wall clock, log mailer, default scrypt cost
    pub fn new(settings: Settings, store: Arc<dyn AuthStore>) -> Self {
        let passwords = PasswordHasher::new(settings.pepper.as_bytes());
        Self::with_parts(
            settings,
            store,
            Arc::new(SystemClock),
            Arc::new(LogMailer),
            passwords,
        )
    }

    /// State with every collaborator supplied by the caller
    pub fn with_parts(
        settings: Settings,
        store: Arc<dyn AuthStore>,
        clock: Arc<dyn Clock>,
        mailer: Arc<dyn Mailer>,
        passwords: PasswordHasher,
    ) -> Self {
        let sessions = SessionService::new(Arc::clone(&store), Arc::clone(&clock));
        let rate_limiter = Arc::new(RateLimiter::new(
            settings.rate_limit.window(),
            settings.rate_limit.max_requests,
        ));
        Self {
            settings: Arc::new(settings),
            store,
            clock,
            sessions,
            passwords,
            mailer,
            rate_limiter,
        }
    }

    /// Route table with the global middleware chain and every route bound
    pub fn router(&self) -> Router {
        let mut router = Router::new();
        router
            .use_middleware(Arc::new(RequestLogger))
            .use_middleware(self.rate_limiter.clone())
            .use_middleware(Arc::new(JsonBody::new(self.settings.max_body_bytes)));

        api::auth::routes(
            &mut router,
            Arc::new(AuthApi {
                store: Arc::clone(&self.store),
                sessions: self.sessions.clone(),
                passwords: self.passwords.clone(),
                mailer: Arc::clone(&self.mailer),
                clock: Arc::clone(&self.clock),
                public_base_url: self.settings.public_base_url.clone(),
            }),
        );
        router
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.router())
    }

    /// Transport service for `axum::serve`
    pub fn app(&self) -> axum::Router {
        self.pipeline().into_service()
    }
}
