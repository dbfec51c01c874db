// ============================
// crates/backend-lib/src/api/auth.rs
// ============================
//! `/auth/*` routes: login, logout, registration, session introspection and
//! password change/reset.
use async_trait::async_trait;
use axum::http::StatusCode;
use lms_common::{
    ForgotPasswordRequest, LoginRequest, MessageResponse, PasswordUpdateRequest,
    RegisterRequest, ResetPasswordRequest, Role, SessionResponse,
};
use metrics::counter;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{guard, PasswordHasher, SessionService};
use crate::clock::Clock;
use crate::error::AppError;
use crate::http::{Handler, RequestContext, ResponseContext, Router};
use crate::mailer::Mailer;
use crate::metrics as keys;
use crate::store::{AuthStore, NewUser};

pub const LOGIN_FAILED: &str = "Email ou senha incorretos";
pub const REGISTER_FAILED: &str = "Erro ao criar usuário";
pub const PASSWORD_UPDATED: &str = "Senha atualizada";
pub const CHECK_EMAIL: &str = "Verifique seu email";
pub const INVALID_TOKEN: &str = "Token inválido";
pub const USER_NOT_FOUND: &str = "Usuário não encontrado";

/// Dependencies of the auth handlers
pub struct AuthApi {
    pub store: Arc<dyn AuthStore>,
    pub sessions: SessionService,
    pub passwords: PasswordHasher,
    pub mailer: Arc<dyn Mailer>,
    pub clock: Arc<dyn Clock>,
    /// Origin used to build links sent by email, without trailing slash
    pub public_base_url: String,
}

/// One handler per auth route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    Login,
    Logout,
    Register,
    Session,
    UpdatePassword,
    ForgotPassword,
    ResetPassword,
}

struct AuthHandler {
    api: Arc<AuthApi>,
    action: AuthAction,
}

#[async_trait]
impl Handler for AuthHandler {
    async fn call(&self, req: &mut RequestContext, res: &mut ResponseContext) -> Result<(), AppError> {
        match self.action {
            AuthAction::Login => self.api.login(req, res).await,
            AuthAction::Logout => self.api.logout(req, res).await,
            AuthAction::Register => self.api.register(req, res).await,
            AuthAction::Session => self.api.session(req, res),
            AuthAction::UpdatePassword => self.api.update_password(req, res).await,
            AuthAction::ForgotPassword => self.api.forgot_password(req, res).await,
            AuthAction::ResetPassword => self.api.reset_password(req, res).await,
        }
    }
}

/// Bind every auth route onto `router`
pub fn routes(router: &mut Router, api: Arc<AuthApi>) {
    let signed_in = guard(&api.sessions, Role::User);
    let handler = |action: AuthAction| -> Arc<dyn Handler> {
        Arc::new(AuthHandler {
            api: Arc::clone(&api),
            action,
        })
    };

    router
        .post("/auth/login", handler(AuthAction::Login), vec![])
        .post("/auth/logout", handler(AuthAction::Logout), vec![])
        .post("/auth/register", handler(AuthAction::Register), vec![])
        .post(
            "/auth/session",
            handler(AuthAction::Session),
            vec![Arc::clone(&signed_in)],
        )
        .put(
            "/auth/update-password",
            handler(AuthAction::UpdatePassword),
            vec![signed_in],
        )
        .post("/auth/forgot-password", handler(AuthAction::ForgotPassword), vec![])
        .post("/auth/reset-password", handler(AuthAction::ResetPassword), vec![]);
}

fn login_failed() -> AppError {
    counter!(keys::LOGIN_FAILED).increment(1);
    AppError::NotFound(LOGIN_FAILED.to_string())
}

impl AuthApi {
    async fn login(&self, req: &mut RequestContext, res: &mut ResponseContext) -> Result<(), AppError> {
        let input: LoginRequest = req.input()?;

        // Unknown accounts cost the same scrypt work as a wrong password.
        let Some(user) = self.store.user_by_email(&input.email).await? else {
            self.passwords.verify_dummy_blocking(input.password).await;
            return Err(login_failed());
        };
        let verified = self
            .passwords
            .verify_blocking(input.password, user.password_hash.clone())
            .await;
        if !verified {
            return Err(login_failed());
        }

        let cookie = self
            .sessions
            .create_session(user.id, &req.ip.to_string(), req.user_agent())
            .await?;
        res.set_cookie(&cookie)?;
        info!(user_id = user.id, "login");
        res.json(StatusCode::OK, &MessageResponse::new("login ok"))
    }

    async fn logout(&self, req: &mut RequestContext, res: &mut ResponseContext) -> Result<(), AppError> {
        let cookie = self.sessions.invalidate(req.session_secret()).await;
        res.set_cookie(&cookie)?;
        res.no_store();
        res.no_content();
        Ok(())
    }

    async fn register(&self, req: &mut RequestContext, res: &mut ResponseContext) -> Result<(), AppError> {
        let input: RegisterRequest = req.input()?;

        if self.store.user_by_email(&input.email).await?.is_some()
            || self.store.user_by_username(&input.username).await?.is_some()
        {
            return Err(AppError::Conflict(REGISTER_FAILED.to_string()));
        }

        let password_hash = self.passwords.hash_blocking(input.password).await?;
        let new_user = NewUser {
            name: input.name,
            username: input.username,
            email: input.email,
            role: Role::User,
            password_hash,
            created_at: self.clock.now(),
        };
        // A concurrent registration can still win between the checks and the insert.
        let user_id = self
            .store
            .insert_user(&new_user)
            .await?
            .ok_or_else(|| AppError::Conflict(REGISTER_FAILED.to_string()))?;

        info!(user_id, "user registered");
        res.json(
            StatusCode::CREATED,
            &MessageResponse::new("Usuário criado com sucesso"),
        )
    }

    fn session(&self, req: &mut RequestContext, res: &mut ResponseContext) -> Result<(), AppError> {
        let session = req.identity()?.clone();
        res.json(
            StatusCode::OK,
            &SessionResponse {
                message: "Sessão válida".to_string(),
                session,
            },
        )
    }

    async fn update_password(
        &self,
        req: &mut RequestContext,
        res: &mut ResponseContext,
    ) -> Result<(), AppError> {
        let user_id = req.identity()?.user_id;
        let input: PasswordUpdateRequest = req.input()?;

        let user = self
            .store
            .user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.to_string()))?;

        let verified = self
            .passwords
            .verify_blocking(input.password, user.password_hash)
            .await;
        if !verified {
            return Err(AppError::not_authorized());
        }

        let password_hash = self.passwords.hash_blocking(input.new_password).await?;
        let changed = self
            .store
            .update_password(user_id, &password_hash, self.clock.now())
            .await?;
        if changed == 0 {
            return Err(AppError::NotFound(USER_NOT_FOUND.to_string()));
        }

        self.sessions.revoke_all(user_id).await?;
        let cookie = self
            .sessions
            .create_session(user_id, &req.ip.to_string(), req.user_agent())
            .await?;
        res.set_cookie(&cookie)?;

        info!(user_id, "password updated");
        res.json(StatusCode::OK, &MessageResponse::new(PASSWORD_UPDATED))
    }

    async fn forgot_password(
        &self,
        req: &mut RequestContext,
        res: &mut ResponseContext,
    ) -> Result<(), AppError> {
        let input: ForgotPasswordRequest = req.input()?;

        if let Some(user) = self.store.user_by_email(&input.email).await? {
            let token = self
                .sessions
                .reset_token(user.id, &req.ip.to_string(), req.user_agent())
                .await?;
            let link = format!(
                "{}/auth/reset-password?token={token}",
                self.public_base_url.trim_end_matches('/')
            );

            if let Err(err) = self.mailer.send_reset_email(&user, &link).await {
                warn!(user_id = user.id, error = %err, "reset email not sent");
                if let Err(err) = self.sessions.consume_tokens(user.id).await {
                    warn!(user_id = user.id, error = %err, "undeliverable reset token kept");
                }
            }
        }

        res.json(StatusCode::OK, &MessageResponse::new(CHECK_EMAIL))
    }

    async fn reset_password(
        &self,
        req: &mut RequestContext,
        res: &mut ResponseContext,
    ) -> Result<(), AppError> {
        let input: ResetPasswordRequest = req.input()?;

        // Redeemed before the slow hash so a token cannot be used twice.
        let reset = self
            .sessions
            .validate_token(&input.token)
            .await?
            .ok_or_else(|| AppError::BadRequest(INVALID_TOKEN.to_string()))?;

        let password_hash = self.passwords.hash_blocking(input.new_password).await?;
        let changed = self
            .store
            .update_password(reset.user_id, &password_hash, self.clock.now())
            .await?;
        if changed == 0 {
            return Err(AppError::BadRequest(INVALID_TOKEN.to_string()));
        }

        self.sessions.consume_tokens(reset.user_id).await?;
        self.sessions.revoke_all(reset.user_id).await?;

        info!(user_id = reset.user_id, "password reset");
        res.json(StatusCode::OK, &MessageResponse::new(PASSWORD_UPDATED))
    }
}
