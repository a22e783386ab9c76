//! Per-identity token-bucket rate limiting with continuous refill.
//!
//! Buckets live only in process memory; with multiple worker processes each
//! maintains an independent limiter, so limits are approximate under
//! horizontal scaling. Two limiter instances exist at runtime: one for the
//! general/admin surface (keyed by caller credential or IP) and one for the
//! ingestion endpoint (keyed by tracking token).

use crate::error::AppError;
use crate::server::Server;
use crate::utils::RequestIdExt;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::Mutex,
    time::Instant,
};
use tracing::{debug, warn};

/// Limiter configuration: requests per minute, burst capacity, and paths that
/// bypass the check entirely.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub requests_per_minute: u32,
    pub burst: u32,
    pub exempt_paths: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub retry_after_secs: u64,
    pub remaining: f64,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket limiter over a coarse-locked bucket map. Contention is low
/// (one short critical section per request), so a single mutex is enough.
pub struct TokenBucketLimiter {
    settings: RateLimitSettings,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl TokenBucketLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            settings,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> u32 {
        self.settings.requests_per_minute
    }

    /// Check and consume one token for `identity` at the current instant.
    pub fn check(&self, identity: &str) -> RateLimitDecision {
        self.check_at(identity, Instant::now())
    }

    /// Continuous-refill token bucket: refill at R/60 tokens per second up to
    /// the burst cap, consume one token if available. Rejections do not
    /// consume and report when at least one token will have regenerated.
    pub fn check_at(&self, identity: &str, now: Instant) -> RateLimitDecision {
        let rate_per_sec = f64::from(self.settings.requests_per_minute) / 60.0;
        let burst = f64::from(self.settings.burst);

        let mut buckets = self.buckets.lock().expect("rate limiter lock poisoned");
        let bucket = buckets.entry(identity.to_string()).or_insert(Bucket {
            tokens: burst,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = burst.min(bucket.tokens + elapsed * rate_per_sec);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            RateLimitDecision {
                allowed: true,
                retry_after_secs: 0,
                remaining: bucket.tokens,
            }
        } else {
            let deficit = (1.0 - bucket.tokens) / rate_per_sec;
            RateLimitDecision {
                allowed: false,
                retry_after_secs: (deficit.ceil() as u64).max(1),
                remaining: bucket.tokens,
            }
        }
    }

    /// OPTIONS requests (CORS preflight) are always exempt; configured paths
    /// match exactly or as a path prefix.
    pub fn is_exempt(&self, path: &str, method: &Method) -> bool {
        if method == Method::OPTIONS {
            return true;
        }
        self.settings.exempt_paths.iter().any(|p| {
            let prefix = format!("{}/", p.trim_end_matches('/'));
            path == p || path.starts_with(&prefix)
        })
    }
}

/// Extract the client IP, preferring proxy headers over the socket address.
pub fn extract_ip(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> Option<IpAddr> {
    if let Some(ip) = headers
        .get("X-Real-IP")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse().ok())
    {
        return Some(ip);
    }

    if let Some(ip) = headers
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse().ok())
    {
        return Some(ip);
    }

    connect_info.map(|info| info.0.ip())
}

/// Middleware for the general/admin surface: identity is the presented API
/// key when there is one, otherwise the client IP. Allowed responses carry
/// the X-RateLimit-Limit and X-RateLimit-Remaining headers.
pub async fn rate_limit_middleware(
    State(server): State<Server>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let limiter = &server.admin_limiter;

    if limiter.is_exempt(request.uri().path(), request.method()) {
        return Ok(next.run(request).await);
    }

    let connect_info = request.extensions().get::<ConnectInfo<SocketAddr>>();
    let identity = request
        .headers()
        .get("x-api-key")
        .and_then(|h| h.to_str().ok())
        .map(|key| format!("key:{key}"))
        .or_else(|| extract_ip(request.headers(), connect_info).map(|ip| format!("ip:{ip}")))
        .unwrap_or_else(|| "anonymous".to_string());

    let decision = limiter.check(&identity);
    if !decision.allowed {
        warn!(path = %request.uri().path(), "admin rate limit exceeded");
        crate::metrics::record_rate_limit_rejection("admin");
        return Err(AppError::rate_limited(
            decision.retry_after_secs,
            limiter.limit(),
            decision.remaining,
        )
        .with_request_id(request.extensions().request_id()));
    }
    debug!(remaining = decision.remaining, "rate limit check passed");

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&limiter.limit().to_string()) {
        headers.insert("X-RateLimit-Limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("{:.2}", decision.remaining)) {
        headers.insert("X-RateLimit-Remaining", value);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn limiter(rpm: u32, burst: u32) -> TokenBucketLimiter {
        TokenBucketLimiter::new(RateLimitSettings {
            requests_per_minute: rpm,
            burst,
            exempt_paths: vec!["/ping".to_string(), "/dashboard".to_string()],
        })
    }

    #[test]
    fn test_burst_then_reject_then_recover() {
        // rpm=60, burst=10: 10 instantaneous requests pass, the 11th is
        // rejected with retry_after >= 1, and one more passes after a second.
        let limiter = limiter(60, 10);
        let start = Instant::now();

        for i in 0..10 {
            let decision = limiter.check_at("client", start);
            assert!(decision.allowed, "request {i} should be admitted");
        }

        let rejected = limiter.check_at("client", start);
        assert!(!rejected.allowed);
        assert!(rejected.retry_after_secs >= 1);
        assert!(rejected.remaining < 1.0);

        let recovered = limiter.check_at("client", start + Duration::from_secs(1));
        assert!(recovered.allowed);
    }

    #[test]
    fn test_single_burst_recovers_after_refill() {
        let limiter = limiter(60, 1);
        let start = Instant::now();

        assert!(limiter.check_at("x", start).allowed);

        let second = limiter.check_at("x", start);
        assert!(!second.allowed);
        assert_eq!(second.retry_after_secs, 1);

        let third = limiter.check_at("x", start + Duration::from_millis(1100));
        assert!(third.allowed);
    }

    #[test]
    fn test_first_sight_initializes_full_bucket() {
        let limiter = limiter(60, 5);
        let decision = limiter.check_at("fresh", Instant::now());
        assert!(decision.allowed);
        assert!((decision.remaining - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_refill_capped_at_burst() {
        let limiter = limiter(60, 2);
        let start = Instant::now();
        limiter.check_at("x", start);
        // A long idle period must not accumulate beyond the burst cap.
        let decision = limiter.check_at("x", start + Duration::from_secs(3600));
        assert!(decision.allowed);
        assert!((decision.remaining - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_identities_are_independent() {
        let limiter = limiter(60, 1);
        let start = Instant::now();
        assert!(limiter.check_at("a", start).allowed);
        assert!(!limiter.check_at("a", start).allowed);
        assert!(limiter.check_at("b", start).allowed);
    }

    #[test]
    fn test_rejection_does_not_consume() {
        let limiter = limiter(60, 1);
        let start = Instant::now();
        limiter.check_at("x", start);
        let before = limiter.check_at("x", start).remaining;
        let after = limiter.check_at("x", start).remaining;
        assert!((before - after).abs() < 1e-9);
    }

    #[test]
    fn test_slow_rate_retry_after() {
        // rpm=6 -> 0.1 tokens/sec; an empty bucket needs 10s for one token.
        let limiter = limiter(6, 1);
        let start = Instant::now();
        limiter.check_at("x", start);
        let rejected = limiter.check_at("x", start);
        assert!(!rejected.allowed);
        assert_eq!(rejected.retry_after_secs, 10);
    }

    #[test]
    fn test_exempt_paths() {
        let limiter = limiter(60, 1);
        assert!(limiter.is_exempt("/ping", &Method::GET));
        assert!(limiter.is_exempt("/dashboard", &Method::GET));
        assert!(limiter.is_exempt("/dashboard/usage", &Method::GET));
        assert!(!limiter.is_exempt("/pingpong", &Method::GET));
        assert!(!limiter.is_exempt("/data", &Method::GET));
        // CORS preflight is always exempt
        assert!(limiter.is_exempt("/data", &Method::OPTIONS));
    }

    #[test]
    fn test_extract_ip_prefers_real_ip_header() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Real-IP", "192.168.1.1".parse().unwrap());
        headers.insert("X-Forwarded-For", "10.0.0.1, 10.0.0.2".parse().unwrap());

        let connect_info = ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 8080)));
        let ip = extract_ip(&headers, Some(&connect_info));
        assert_eq!(ip, Some("192.168.1.1".parse().unwrap()));
    }

    #[test]
    fn test_extract_ip_forwarded_for_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", "10.0.0.1, 10.0.0.2".parse().unwrap());
        let ip = extract_ip(&headers, None);
        assert_eq!(ip, Some("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_extract_ip_falls_back_to_socket() {
        let headers = HeaderMap::new();
        let connect_info = ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 8080)));
        let ip = extract_ip(&headers, Some(&connect_info));
        assert_eq!(ip, Some("127.0.0.1".parse().unwrap()));
    }
}
