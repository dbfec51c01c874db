// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const SESSION_CREATED: &str = "session.created";
pub const SESSION_REFRESHED: &str = "session.refreshed";
pub const SESSION_REVOKED: &str = "session.revoked";
pub const LOGIN_FAILED: &str = "auth.login_failed";
pub const RATE_LIMITED: &str = "http.rate_limited";
pub const INTERNAL_ERROR: &str = "http.internal_error";
