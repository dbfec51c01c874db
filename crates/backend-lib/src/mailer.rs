// crates/backend-lib/src/mailer.rs

//! Outgoing email.
use async_trait::async_trait;
use tracing::info;

use crate::error::AppError;
use crate::store::User;

/// Delivers password reset links
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_reset_email(&self, user: &User, link: &str) -> Result<(), AppError>;
}

/// Development mailer that writes the message to the log instead of sending it
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_reset_email(&self, user: &User, link: &str) -> Result<(), AppError> {
        info!(
            to = %user.email,
            subject = "Password Reset",
            "Utilize o link abaixo para resetar sua senha: {link}"
        );
        Ok(())
    }
}
