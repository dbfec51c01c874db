// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Input validation for request bodies.
//!
//! Shape is enforced by serde (`deny_unknown_fields` on every request type);
//! the rules here check and normalize the values. Every failure maps to a
//! 422 response.

use lms_common::{
    ForgotPasswordRequest, LoginRequest, PasswordUpdateRequest, RegisterRequest,
    ResetPasswordRequest,
};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use crate::error::AppError;

const MIN_PASSWORD_LENGTH: usize = 10;
const MAX_PASSWORD_LENGTH: usize = 256;
const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321 SMTP limit
const MAX_TEXT_LENGTH: usize = 120;

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@]+@[^@]+\.[^@]+$").unwrap());

/// Possible validation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("string esperado")]
    InvalidString,

    #[error("email invalido")]
    InvalidEmail,

    #[error("password invalido")]
    InvalidPassword,
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Checks and normalizes a deserialized request body
pub trait Validate: Sized {
    fn validate(self) -> Result<Self, AppError>;
}

fn is_zero_width(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200D}' | '\u{2060}' | '\u{FEFF}')
}

/// Free text: zero-width characters dropped, NFC, trimmed, non-empty
pub fn validate_text(input: &str) -> ValidationResult<String> {
    let cleaned: String = input.chars().filter(|c| !is_zero_width(*c)).nfc().collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_TEXT_LENGTH {
        return Err(ValidationError::InvalidString);
    }
    Ok(trimmed.to_string())
}

/// Email address, lower-cased
pub fn validate_email(input: &str) -> ValidationResult<String> {
    let email = input.trim().to_lowercase();
    if email.len() > MAX_EMAIL_LENGTH || !EMAIL_REGEX.is_match(&email) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(email)
}

/// Password being set: length bounds plus lowercase, uppercase and digit.
///
/// Passwords are never trimmed or otherwise rewritten here.
pub fn validate_password(password: &str) -> ValidationResult<&str> {
    let length = password.chars().count();
    if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&length) {
        return Err(ValidationError::InvalidPassword);
    }

    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_uppercase && has_lowercase && has_digit) {
        return Err(ValidationError::InvalidPassword);
    }

    Ok(password)
}

/// Password being checked against a stored hash: only required to be present
pub fn validate_existing_password(password: &str) -> ValidationResult<&str> {
    if password.is_empty() || password.chars().count() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::InvalidPassword);
    }
    Ok(password)
}

/// Opaque token from a link
pub fn validate_token(token: &str) -> ValidationResult<String> {
    let token = token.trim();
    if token.is_empty() || token.len() > MAX_TEXT_LENGTH {
        return Err(ValidationError::InvalidString);
    }
    Ok(token.to_string())
}

impl Validate for LoginRequest {
    fn validate(self) -> Result<Self, AppError> {
        Ok(Self {
            email: validate_email(&self.email)?,
            password: validate_existing_password(&self.password)?.to_string(),
        })
    }
}

impl Validate for RegisterRequest {
    fn validate(self) -> Result<Self, AppError> {
        Ok(Self {
            name: validate_text(&self.name)?,
            username: validate_text(&self.username)?,
            email: validate_email(&self.email)?,
            password: validate_password(&self.password)?.to_string(),
        })
    }
}

impl Validate for PasswordUpdateRequest {
    fn validate(self) -> Result<Self, AppError> {
        Ok(Self {
            password: validate_existing_password(&self.password)?.to_string(),
            new_password: validate_password(&self.new_password)?.to_string(),
        })
    }
}

impl Validate for ForgotPasswordRequest {
    fn validate(self) -> Result<Self, AppError> {
        Ok(Self {
            email: validate_email(&self.email)?,
        })
    }
}

impl Validate for ResetPasswordRequest {
    fn validate(self) -> Result<Self, AppError> {
        Ok(Self {
            new_password: validate_password(&self.new_password)?.to_string(),
            token: validate_token(&self.token)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_validate_email() {
        assert_eq!(validate_email("test@example.com").unwrap(), "test@example.com");
        assert_eq!(
            validate_email("  User.Name+tag@Example.co.uk ").unwrap(),
            "user.name+tag@example.co.uk"
        );

        // No @
        assert_eq!(validate_email("test.example.com"), Err(ValidationError::InvalidEmail));
        // No domain
        assert_eq!(validate_email("test@"), Err(ValidationError::InvalidEmail));
        // No dot after @
        assert_eq!(validate_email("test@example"), Err(ValidationError::InvalidEmail));
        // Two @
        assert_eq!(validate_email("a@b@c.com"), Err(ValidationError::InvalidEmail));
        assert_eq!(validate_email(""), Err(ValidationError::InvalidEmail));
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("Password123!").is_ok());
        assert!(validate_password("SecurePassword1").is_ok());

        // Too short
        assert!(validate_password("Short1a").is_err());
        // Too long
        assert!(validate_password(&format!("Aa1{}", "x".repeat(254))).is_err());
        // No uppercase
        assert!(validate_password("password123!").is_err());
        // No lowercase
        assert!(validate_password("PASSWORD123!").is_err());
        // No digits
        assert!(validate_password("PasswordABC!").is_err());

        // Surrounding spaces are part of the password
        assert_eq!(validate_password(" Password123 ").unwrap(), " Password123 ");
    }

    #[test]
    fn test_validate_existing_password_is_lenient() {
        assert!(validate_existing_password("weak").is_ok());
        assert!(validate_existing_password("").is_err());
    }

    #[test]
    fn test_validate_text() {
        assert_eq!(validate_text("  Ada Lovelace ").unwrap(), "Ada Lovelace");
        assert_eq!(validate_text("a\u{200B}da").unwrap(), "ada");
        assert_eq!(validate_text("Jose\u{301}").unwrap(), "Jos\u{e9}");

        assert_eq!(validate_text("   "), Err(ValidationError::InvalidString));
        assert_eq!(validate_text("\u{FEFF}"), Err(ValidationError::InvalidString));
        assert!(validate_text(&"a".repeat(121)).is_err());
    }

    #[test]
    fn test_request_validation() {
        let register = RegisterRequest {
            name: " Ada ".to_string(),
            username: "ada".to_string(),
            email: "ADA@Example.com".to_string(),
            password: "SecurePassword1".to_string(),
        }
        .validate()
        .unwrap();
        assert_eq!(register.name, "Ada");
        assert_eq!(register.email, "ada@example.com");

        let err = RegisterRequest {
            name: "Ada".to_string(),
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
            password: "weak".to_string(),
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.to_string(), "password invalido");

        let err = ResetPasswordRequest {
            new_password: "SecurePassword1".to_string(),
            token: "  ".to_string(),
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.to_string(), "string esperado");
    }
}
