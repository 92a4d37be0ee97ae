//! Rate limiting middleware using governor and `tower_governor`.
//!
//! Provides configurable rate limiters for different endpoint categories:
//! - `auth_rate_limiter`: Strict limits for authentication endpoints (~10/min)
//! - `api_rate_limiter`: Relaxed limits for payment endpoints (~100/min)

use std::net::IpAddr;
use std::sync::Arc;

use axum::http::Request;
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

// =============================================================================
// Custom IP Key Extractor for Cloudflare + Fly.io
// =============================================================================

/// Custom key extractor that checks Cloudflare's `CF-Connecting-IP` header first,
/// then falls back to standard proxy headers.
#[derive(Clone, Copy)]
pub struct CloudflareIpKeyExtractor;

impl tower_governor::key_extractor::KeyExtractor for CloudflareIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let headers = req.headers();

        // Try CF-Connecting-IP first (Cloudflare's real client IP)
        if let Some(ip) = headers
            .get("cf-connecting-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<IpAddr>().ok())
        {
            return Ok(ip);
        }

        // Try X-Forwarded-For (first IP in the chain)
        if let Some(ip) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
        {
            return Ok(ip);
        }

        // Try X-Real-IP
        if let Some(ip) = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
        {
            return Ok(ip);
        }

        // Try Fly-Client-IP (Fly.io's header)
        if let Some(ip) = headers
            .get("fly-client-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
        {
            return Ok(ip);
        }

        Err(GovernorError::UnableToExtractKey)
    }
}

// =============================================================================
// Rate Limiter Configuration
// =============================================================================

/// Rate limiter layer type for Axum.
///
/// Uses `CloudflareIpKeyExtractor` to get the real client IP from Cloudflare
/// and Fly.io proxy headers.
pub type RateLimiterLayer =
    GovernorLayer<CloudflareIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

/// Rejected limiter parameters.
#[derive(Debug, thiserror::Error)]
#[error("invalid rate limiter configuration: every {per_second}s, burst {burst}")]
pub struct RateLimitConfigError {
    per_second: u64,
    burst: u32,
}

fn limiter(per_second: u64, burst: u32) -> Result<RateLimiterLayer, RateLimitConfigError> {
    let config = GovernorConfigBuilder::default()
        .key_extractor(CloudflareIpKeyExtractor)
        .per_second(per_second)
        .burst_size(burst)
        .finish()
        .ok_or(RateLimitConfigError { per_second, burst })?;
    Ok(GovernorLayer::new(Arc::new(config)))
}

/// Create rate limiter for auth endpoints: ~10 requests per minute per IP.
///
/// Configuration: 1 request every 6 seconds (replenish), burst of 5.
/// This prevents brute force attacks on login and signup.
///
/// # Errors
///
/// Only if the governor rejects the fixed parameters.
pub fn auth_rate_limiter() -> Result<RateLimiterLayer, RateLimitConfigError> {
    limiter(6, 5)
}

/// Create rate limiter for payment endpoints: ~100 requests per minute per IP.
///
/// Configuration: 1 request per second (replenish), burst of 50.
/// Each accepted request may create a customer or an intent on the payments
/// platform.
///
/// # Errors
///
/// Only if the governor rejects the fixed parameters.
pub fn api_rate_limiter() -> Result<RateLimiterLayer, RateLimitConfigError> {
    limiter(1, 50)
}

/// Limiters for the two route groups that need them.
///
/// `None` leaves a group unlimited, which handler tests rely on since their
/// requests carry no client address headers.
#[derive(Clone, Default)]
pub struct RateLimits {
    pub auth: Option<RateLimiterLayer>,
    pub payments: Option<RateLimiterLayer>,
}

impl RateLimits {
    /// Production limits for both groups.
    ///
    /// # Errors
    ///
    /// Only if the governor rejects the fixed parameters.
    pub fn enabled() -> Result<Self, RateLimitConfigError> {
        Ok(Self {
            auth: Some(auth_rate_limiter()?),
            payments: Some(api_rate_limiter()?),
        })
    }
}
