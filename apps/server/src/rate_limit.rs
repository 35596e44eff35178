use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::ApiResponse;

// ── Tiers ──

/// Request classes with separate budgets. Reads are cheap, mutations
/// touch the schedule, exports build whole workbooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Public,
    Mutation,
    Export,
}

impl Tier {
    /// (max requests, sliding window) for the tier.
    fn limit(self) -> (u32, Duration) {
        match self {
            Tier::Public => (60, Duration::from_secs(60)),
            Tier::Mutation => (30, Duration::from_secs(60)),
            Tier::Export => (10, Duration::from_secs(300)),
        }
    }
}

// ── Core limiter ──

/// In-memory per-IP sliding window limiter. Keys are (tier, client IP);
/// values are the timestamps of requests still inside the window.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    hits: Arc<DashMap<(Tier, IpAddr), Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Ok(())` when the request fits the tier's budget,
    /// `Err(retry_after_secs)` otherwise.
    pub fn check(&self, tier: Tier, ip: IpAddr) -> Result<(), u64> {
        let (max_requests, window) = tier.limit();
        let now = Instant::now();
        let window_start = now - window;

        let mut entry = self.hits.entry((tier, ip)).or_default();
        entry.retain(|t| *t > window_start);

        if entry.len() >= max_requests as usize {
            let oldest = entry[0];
            let retry_after = (oldest + window)
                .saturating_duration_since(now)
                .as_secs()
                .max(1);
            return Err(retry_after);
        }

        entry.push(now);
        Ok(())
    }

    /// Drop keys whose every timestamp is older than 2× the tier window.
    /// Call periodically from a background task.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.hits.retain(|(tier, _ip), timestamps| {
            let cutoff = tier.limit().1 * 2;
            timestamps.retain(|t| now.duration_since(*t) < cutoff);
            !timestamps.is_empty()
        });
    }
}

// ── IP extraction ──

/// Client IP from X-Forwarded-For (reverse proxy) or ConnectInfo.
pub fn extract_client_ip(req: &Request) -> IpAddr {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first_ip) = forwarded.split(',').next() {
            if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
                return ip;
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or_else(|| IpAddr::from([127, 0, 0, 1]))
}

fn too_many_requests(retry_after: u64) -> Response {
    let body = ApiResponse::<()>::error(format!(
        "Too many requests. Try again in {} seconds",
        retry_after
    ));
    (
        StatusCode::TOO_MANY_REQUESTS,
        [("Retry-After", retry_after.to_string())],
        Json(body),
    )
        .into_response()
}

// ── Middleware (one per tier) ──

/// Read-only endpoints (60 req/min).
pub async fn rate_limit_public(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_client_ip(&req);
    limiter.check(Tier::Public, ip).map_err(too_many_requests)?;
    Ok(next.run(req).await)
}

/// Schedule and directory mutations (30 req/min).
pub async fn rate_limit_mutation(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_client_ip(&req);
    limiter
        .check(Tier::Mutation, ip)
        .map_err(too_many_requests)?;
    Ok(next.run(req).await)
}

/// Spreadsheet export (10 req/5min — strictest).
pub async fn rate_limit_export(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_client_ip(&req);
    limiter.check(Tier::Export, ip).map_err(too_many_requests)?;
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::thread::sleep;

    fn test_ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_allows_requests_under_limit() {
        let limiter = RateLimiter::new();
        let ip = test_ip(1);
        for _ in 0..10 {
            assert!(limiter.check(Tier::Export, ip).is_ok());
        }
    }

    #[test]
    fn test_rejects_over_limit() {
        let limiter = RateLimiter::new();
        let ip = test_ip(1);
        for _ in 0..10 {
            limiter.check(Tier::Export, ip).unwrap();
        }
        assert!(limiter.check(Tier::Export, ip).is_err());
    }

    #[test]
    fn test_returns_retry_after_within_window() {
        let limiter = RateLimiter::new();
        let ip = test_ip(1);
        for _ in 0..30 {
            limiter.check(Tier::Mutation, ip).unwrap();
        }
        let retry_after = limiter.check(Tier::Mutation, ip).unwrap_err();
        assert!(retry_after >= 1 && retry_after <= 60);
    }

    #[test]
    fn test_different_ips_independent() {
        let limiter = RateLimiter::new();
        for _ in 0..10 {
            limiter.check(Tier::Export, test_ip(1)).unwrap();
        }
        assert!(limiter.check(Tier::Export, test_ip(1)).is_err());
        assert!(limiter.check(Tier::Export, test_ip(2)).is_ok());
    }

    #[test]
    fn test_tiers_have_separate_budgets() {
        let limiter = RateLimiter::new();
        let ip = test_ip(1);
        for _ in 0..10 {
            limiter.check(Tier::Export, ip).unwrap();
        }
        assert!(limiter.check(Tier::Export, ip).is_err());
        assert!(limiter.check(Tier::Public, ip).is_ok());
    }

    #[test]
    fn test_cleanup_preserves_active_entries() {
        let limiter = RateLimiter::new();
        let ip = test_ip(1);
        for _ in 0..30 {
            limiter.check(Tier::Mutation, ip).unwrap();
        }
        limiter.cleanup();
        assert!(limiter.check(Tier::Mutation, ip).is_err());
    }

    #[test]
    fn test_cleanup_drops_empty_keys() {
        let limiter = RateLimiter::new();
        let ip = test_ip(1);
        limiter.check(Tier::Public, ip).unwrap();
        // Instants can't be forged; verify cleanup keeps the live key
        limiter.cleanup();
        assert_eq!(limiter.hits.len(), 1);
    }

    #[test]
    fn test_sliding_window_is_per_request() {
        let limiter = RateLimiter::new();
        let ip = test_ip(1);
        limiter.check(Tier::Public, ip).unwrap();
        sleep(Duration::from_millis(10));
        assert!(limiter.check(Tier::Public, ip).is_ok());
    }
}
