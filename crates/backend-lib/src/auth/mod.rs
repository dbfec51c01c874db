// ============================
// crates/backend-lib/src/auth/mod.rs
// ============================
//! Authentication module.

pub mod guard;
pub mod password;
pub mod session;
pub mod token;

pub use guard::{guard, optional, AuthGuard, OptionalAuth};
pub use password::{PasswordHasher, ScryptCost};
pub use session::{
    SessionCookie, SessionService, Validation, RESET_TOKEN_TTL_SECS, SESSION_COOKIE,
    SESSION_TTL_SECS,
};
pub use token::{generate_secure_token, hash_secret};
