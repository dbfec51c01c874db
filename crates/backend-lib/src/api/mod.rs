// crates/backend-lib/src/api/mod.rs

//! Route registration. Each submodule binds its handlers onto a [`Router`](crate::http::Router)
//! with explicit dependencies.

pub mod auth;

pub use auth::{AuthAction, AuthApi};
