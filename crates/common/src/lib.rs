// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between LMS clients and the auth backend.
//! This module defines the JSON request/response bodies and the role model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Database id of a user
pub type UserId = i64;

/// Capability level of a user account
///
/// Levels are strictly ordered: `Admin` satisfies every requirement,
/// `Editor` satisfies `Editor` and `User`, `User` satisfies only `User`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    User,
}

impl Role {
    fn level(self) -> u8 {
        match self {
            Role::Admin => 2,
            Role::Editor => 1,
            Role::User => 0,
        }
    }

    /// Whether a holder of `self` may access something that requires `required`
    pub fn satisfies(self, required: Role) -> bool {
        self.level() >= required.level()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of `admin`, `editor` or `user`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "editor" => Ok(Role::Editor),
            "user" => Ok(Role::User),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Identity attached to an authenticated request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Owner of the session
    pub user_id: UserId,
    /// Role of the owner at validation time
    pub role: Role,
    /// When the session stops being valid
    pub expires_at: DateTime<Utc>,
}

/// `POST /auth/login`
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// `POST /auth/register`
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

/// `PUT /auth/update-password`
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct PasswordUpdateRequest {
    /// Current password
    pub password: String,
    pub new_password: String,
}

/// `POST /auth/forgot-password`
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// `POST /auth/reset-password`
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ResetPasswordRequest {
    pub new_password: String,
    /// Plaintext token from the reset link
    pub token: String,
}

/// Envelope shared by every JSON response
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MessageResponse {
    pub message: String,
    /// Stable machine-readable code, present on errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }
}

/// Response of `POST /auth/session`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionResponse {
    pub message: String,
    #[serde(flatten)]
    pub session: Identity,
}
