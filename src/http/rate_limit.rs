//! Fixed-window rate limiting per client IP.
//!
//! Every response that passes through the limiter carries the standard
//! `RateLimit-*` headers. Requests over the limit get `429` and never reach a
//! handler.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use tracing::{debug, warn};
use crate::config::RateLimitConfiguration;
use crate::http::ApiError;

pub const RATELIMIT_POLICY: HeaderName = HeaderName::from_static("ratelimit-policy");
pub const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
pub const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    hits: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

impl RateLimitDecision {
    /// Seconds until the window resets, rounded up.
    pub fn reset_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs();
        if self.reset_after.subsec_nanos() > 0 { secs + 1 } else { secs }
    }

    fn write_headers(&self, headers: &mut HeaderMap, policy: &str) {
        if let Ok(policy) = HeaderValue::from_str(policy) {
            headers.insert(RATELIMIT_POLICY, policy);
        }
        headers.insert(RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(RATELIMIT_RESET, HeaderValue::from(self.reset_secs()));
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    trust_proxy: bool,
    clients: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfiguration) -> Self {
        Self {
            window: config.window,
            max_requests: config.max_requests,
            trust_proxy: config.trust_proxy,
            clients: DashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn policy(&self) -> String {
        format!("{};w={}", self.max_requests, self.window.as_secs())
    }

    pub fn check(&self, client: &str) -> RateLimitDecision {
        self.check_at(client, Instant::now())
    }

    pub fn check_at(&self, client: &str, now: Instant) -> RateLimitDecision {
        let mut entry = self.clients
            .entry(client.to_string())
            .or_insert(Window { started_at: now, hits: 0 });
        if now.duration_since(entry.started_at) >= self.window {
            *entry = Window { started_at: now, hits: 0 };
        }
        entry.hits = entry.hits.saturating_add(1);

        RateLimitDecision {
            allowed: entry.hits <= self.max_requests,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(entry.hits),
            reset_after: self.window.saturating_sub(now.duration_since(entry.started_at)),
        }
    }

    /// Drops windows that have already expired.
    pub fn prune_at(&self, now: Instant) {
        self.clients.retain(|_, window| now.duration_since(window.started_at) < self.window);
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    fn client_key(&self, request: &Request) -> String {
        if self.trust_proxy {
            let forwarded = request.headers()
                .get(X_FORWARDED_FOR)
                .and_then(|x| x.to_str().ok())
                .and_then(|x| x.split(',').next())
                .and_then(|x| x.trim().parse::<IpAddr>().ok());
            if let Some(ip) = forwarded {
                return ip.to_string();
            }
        }
        request.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|x| x.0.ip().to_string())
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
    }
}

pub async fn limit_by_ip(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client = limiter.client_key(&request);
    let decision = limiter.check(&client);

    let mut response = if decision.allowed {
        debug!("Rate limit check passed for {}", client);
        next.run(request).await
    } else {
        warn!("Rate limit exceeded for {}", client);
        ApiError::TooManyRequests { retry_after_secs: decision.reset_secs() }.into_response()
    };
    decision.write_headers(response.headers_mut(), &limiter.policy());
    response
}

pub async fn prune_periodically(limiter: Arc<RateLimiter>) {
    // interval() panics on a zero period
    let mut interval = tokio::time::interval(limiter.window().max(Duration::from_secs(1)));
    loop {
        interval.tick().await;
        limiter.prune_at(Instant::now());
        debug!("Rate limiter tracks {} clients", limiter.tracked_clients());
    }
}
