//! Sliding-window rate limiting keyed by client IP.
//!
//! Each client keeps a log of request instants. A request is admitted while
//! fewer than `max_requests` instants fall inside the window. The request
//! that would exceed the limit blocks the client for the configured block
//! duration and clears its log, so it starts fresh once the block expires.
//!
//! State lives in process memory. Running several replicas multiplies the
//! effective limit by the replica count.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::config::{MAX_BLOCK, WindowLimit};
use crate::error::AppError;
use crate::state::AppState;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Request admitted; `remaining` more fit in the current window.
    Allowed { remaining: usize },
    /// Client is blocked for `retry_after`.
    Limited { retry_after: Duration },
}

impl Decision {
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

#[derive(Debug, Default)]
struct ClientLog {
    hits: VecDeque<Instant>,
    blocked_until: Option<Instant>,
}

/// In-memory sliding-window limiter with a block period.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    name: &'static str,
    limit: WindowLimit,
    block: Duration,
    clients: DashMap<String, ClientLog>,
}

impl SlidingWindowLimiter {
    /// `block` is capped at [`MAX_BLOCK`].
    #[must_use]
    pub fn new(name: &'static str, limit: WindowLimit, block: Duration) -> Self {
        Self {
            name,
            limit,
            block: block.min(MAX_BLOCK),
            clients: DashMap::new(),
        }
    }

    /// Check and record a request from `key` now.
    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    /// Check and record a request from `key` at `now`.
    pub fn check_at(&self, key: &str, now: Instant) -> Decision {
        let mut log = self.clients.entry(key.to_owned()).or_default();

        if let Some(until) = log.blocked_until {
            if now < until {
                return Decision::Limited {
                    retry_after: until - now,
                };
            }
            log.blocked_until = None;
        }

        let window = self.limit.window;
        while log
            .hits
            .front()
            .is_some_and(|&hit| now.saturating_duration_since(hit) >= window)
        {
            log.hits.pop_front();
        }

        if log.hits.len() >= self.limit.max_requests {
            log.hits.clear();
            log.blocked_until = now.checked_add(self.block);
            tracing::warn!(
                limiter = self.name,
                client = key,
                block_secs = self.block.as_secs(),
                "Rate limit exceeded, blocking client"
            );
            return Decision::Limited {
                retry_after: self.block,
            };
        }

        log.hits.push_back(now);
        Decision::Allowed {
            remaining: self.limit.max_requests - log.hits.len(),
        }
    }

    /// Drop clients with no request inside the window and no active block.
    ///
    /// Returns how many clients were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.clients.len();
        let window = self.limit.window;
        self.clients.retain(|_, log| {
            let blocked = log.blocked_until.is_some_and(|until| now < until);
            let recent = log
                .hits
                .back()
                .is_some_and(|&hit| now.saturating_duration_since(hit) < window);
            blocked || recent
        });
        before.saturating_sub(self.clients.len())
    }

    /// Number of tracked clients.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}

/// Periodically sweep idle clients out of every limiter.
pub fn spawn_sweeper(limiters: Vec<Arc<SlidingWindowLimiter>>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let now = Instant::now();
            for limiter in &limiters {
                let removed = limiter.sweep(now);
                if removed > 0 {
                    tracing::debug!(limiter = limiter.name, removed, "Swept idle rate-limit entries");
                }
            }
        }
    })
}

// =============================================================================
// Client IP extraction
// =============================================================================

/// Best-effort client address: proxy headers first, then the socket peer.
///
/// Checks Cloudflare's `CF-Connecting-IP`, the first hop of
/// `X-Forwarded-For`, `X-Real-IP` and Fly.io's `Fly-Client-IP`.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    header("cf-connecting-ip")
        .or_else(|| {
            header("x-forwarded-for")
                .and_then(|s| s.split(',').next())
                .map(str::trim)
                .filter(|s| !s.is_empty())
        })
        .or_else(|| header("x-real-ip"))
        .or_else(|| header("fly-client-ip"))
        .map(String::from)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

// =============================================================================
// Middleware
// =============================================================================

/// Rate limit for storefront routes.
pub async fn api_rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    enforce(state.api_limiter(), request, next).await
}

/// Rate limit for the payment webhook.
pub async fn webhook_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    enforce(state.webhook_limiter(), request, next).await
}

async fn enforce(limiter: &SlidingWindowLimiter, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_ip(request.headers(), peer);

    match limiter.check(&key) {
        Decision::Allowed { .. } => next.run(request).await,
        Decision::Limited { retry_after } => AppError::RateLimited {
            retry_after_secs: retry_after_secs(retry_after),
        }
        .into_response(),
    }
}

/// Whole seconds to wait, rounded up and at least one.
fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn limiter(max_requests: usize, window_secs: u64, block_secs: u64) -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(
            "test",
            WindowLimit {
                max_requests,
                window: Duration::from_secs(window_secs),
            },
            Duration::from_secs(block_secs),
        )
    }

    #[test]
    fn test_admits_up_to_limit_then_blocks() {
        let limiter = limiter(3, 60, 300);
        let t0 = Instant::now();

        assert_eq!(limiter.check_at("a", t0), Decision::Allowed { remaining: 2 });
        assert_eq!(limiter.check_at("a", t0), Decision::Allowed { remaining: 1 });
        assert_eq!(limiter.check_at("a", t0), Decision::Allowed { remaining: 0 });
        assert_eq!(
            limiter.check_at("a", t0),
            Decision::Limited {
                retry_after: Duration::from_secs(300)
            }
        );
    }

    #[test]
    fn test_block_holds_then_expires() {
        let limiter = limiter(2, 60, 300);
        let t0 = Instant::now();
        limiter.check_at("a", t0);
        limiter.check_at("a", t0);
        assert!(!limiter.check_at("a", t0).is_allowed());

        // still blocked well after the window has passed
        let later = t0 + Duration::from_secs(120);
        assert_eq!(
            limiter.check_at("a", later),
            Decision::Limited {
                retry_after: Duration::from_secs(180)
            }
        );

        // the block clears the log, so the full allowance is back
        let after_block = t0 + Duration::from_secs(300);
        assert_eq!(
            limiter.check_at("a", after_block),
            Decision::Allowed { remaining: 1 }
        );
    }

    #[test]
    fn test_block_is_capped() {
        let limiter = limiter(1, 60, u64::MAX);
        let t0 = Instant::now();
        assert!(limiter.check_at("a", t0).is_allowed());
        assert_eq!(
            limiter.check_at("a", t0),
            Decision::Limited {
                retry_after: MAX_BLOCK
            }
        );
        assert!(limiter.check_at("a", t0 + MAX_BLOCK).is_allowed());
    }

    #[test]
    fn test_window_slides() {
        let limiter = limiter(2, 10, 300);
        let t0 = Instant::now();
        limiter.check_at("a", t0);
        limiter.check_at("a", t0 + Duration::from_secs(5));

        // first hit has aged out at t0 + 10
        let decision = limiter.check_at("a", t0 + Duration::from_secs(10));
        assert_eq!(decision, Decision::Allowed { remaining: 0 });
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = limiter(1, 60, 300);
        let t0 = Instant::now();
        assert!(limiter.check_at("a", t0).is_allowed());
        assert!(!limiter.check_at("a", t0).is_allowed());
        assert!(limiter.check_at("b", t0).is_allowed());
    }

    #[test]
    fn test_sweep_keeps_active_and_blocked() {
        let limiter = limiter(1, 10, 300);
        let t0 = Instant::now();
        limiter.check_at("idle", t0);
        limiter.check_at("blocked", t0);
        limiter.check_at("blocked", t0);
        limiter.check_at("recent", t0 + Duration::from_secs(15));

        let removed = limiter.sweep(t0 + Duration::from_secs(20));
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_clients(), 2);

        let removed = limiter.sweep(t0 + Duration::from_secs(400));
        assert_eq!(removed, 2);
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_client_ip_precedence() {
        let peer: SocketAddr = "10.0.0.9:5000".parse().unwrap();

        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(peer)), "10.0.0.9");
        assert_eq!(client_ip(&headers, None), "unknown");

        headers.insert("fly-client-ip", HeaderValue::from_static("4.4.4.4"));
        assert_eq!(client_ip(&headers, Some(peer)), "4.4.4.4");

        headers.insert("x-real-ip", HeaderValue::from_static("3.3.3.3"));
        assert_eq!(client_ip(&headers, Some(peer)), "3.3.3.3");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("2.2.2.2, 10.1.1.1"),
        );
        assert_eq!(client_ip(&headers, Some(peer)), "2.2.2.2");

        headers.insert("cf-connecting-ip", HeaderValue::from_static("1.1.1.1"));
        assert_eq!(client_ip(&headers, Some(peer)), "1.1.1.1");
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1500)), 2);
        assert_eq!(retry_after_secs(Duration::from_secs(300)), 300);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
    }
}
