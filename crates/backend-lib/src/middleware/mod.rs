// crates/backend-lib/src/middleware/mod.rs

//! Global middleware: request logging, rate limiting and JSON body parsing.

pub mod body_json;
pub mod logger;
pub mod rate_limit;

pub use body_json::JsonBody;
pub use logger::RequestLogger;
pub use rate_limit::RateLimiter;
