// crates/backend-lib/src/middleware/rate_limit.rs

//! Fixed-window request limiter keyed by client ip.
use async_trait::async_trait;
use axum::http::{header, HeaderName, HeaderValue};
use dashmap::DashMap;
use metrics::counter;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::http::{Middleware, RequestContext, ResponseContext};
use crate::metrics as keys;

const RATE_LIMIT: HeaderName = HeaderName::from_static("ratelimit");
const RATE_LIMIT_POLICY: HeaderName = HeaderName::from_static("ratelimit-policy");

/// Hits of one client in its current window
#[derive(Debug, Clone, Copy)]
struct Window {
    hits: u32,
    expires: Instant,
}

/// Rate limiter shared by every request of the process
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    clients: DashMap<IpAddr, Window>,
}

/// Verdict for a single hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Requests left in the window
    pub remaining: u32,
    /// Whole seconds until the window resets
    pub reset_secs: u64,
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            clients: DashMap::new(),
        }
    }

    /// Count a hit from `ip`
    pub fn check(&self, ip: IpAddr) -> Decision {
        let now = Instant::now();
        let mut entry = self.clients.entry(ip).or_insert(Window {
            hits: 0,
            expires: now + self.window,
        });
        if now >= entry.expires {
            *entry = Window {
                hits: 0,
                expires: now + self.window,
            };
        }
        entry.hits = entry.hits.saturating_add(1);

        Decision {
            allowed: entry.hits <= self.max_requests,
            remaining: self.max_requests.saturating_sub(entry.hits),
            reset_secs: ceil_secs(entry.expires.saturating_duration_since(now)),
        }
    }

    /// Drop every expired window. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.clients.len();
        self.clients.retain(|_, window| now < window.expires);
        before.saturating_sub(self.clients.len())
    }

    /// Number of clients currently tracked
    pub fn tracked(&self) -> usize {
        self.clients.len()
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `shutdown` flips to `true`
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.sweep();
                        debug!(removed, "rate limit windows swept");
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("rate limit sweeper stopped");
        })
    }

    fn policy(&self) -> String {
        format!(
            "\"default\";q={};w={}",
            self.max_requests,
            ceil_secs(self.window)
        )
    }
}

#[async_trait]
impl Middleware for RateLimiter {
    async fn handle(
        &self,
        req: &mut RequestContext,
        res: &mut ResponseContext,
    ) -> Result<(), AppError> {
        let decision = self.check(req.ip);

        let state = format!(
            "\"default\";r={};t={}",
            decision.remaining, decision.reset_secs
        );
        for (name, value) in [(RATE_LIMIT, state), (RATE_LIMIT_POLICY, self.policy())] {
            match HeaderValue::from_str(&value) {
                Ok(value) => res.set_header(name, value),
                Err(err) => warn!(error = %err, "rate limit header dropped"),
            }
        }

        if !decision.allowed {
            counter!(keys::RATE_LIMITED).increment(1);
            res.set_header(header::RETRY_AFTER, HeaderValue::from(decision.reset_secs));
            return Err(AppError::RateLimited {
                retry_after: decision.reset_secs,
            });
        }
        Ok(())
    }
}
