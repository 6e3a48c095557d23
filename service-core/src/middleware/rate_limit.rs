use crate::error::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

pub const RATE_LIMIT_HEADER: &str = "x-ratelimit-limit";

type KeyedLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>;

/// Per-client-IP limiter allowing `max_requests` per `window`.
///
/// Clients are keyed by the socket peer. `x-forwarded-for` is only consulted
/// once the limiter is told it sits behind a trusted proxy.
#[derive(Clone)]
pub struct IpRateLimiter {
    limiter: Arc<KeyedLimiter>,
    max_requests: u32,
    trust_forwarded_for: bool,
}

impl IpRateLimiter {
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Key clients by the first `x-forwarded-for` hop. Only safe when every
    /// request arrives through a proxy that overwrites the header.
    pub fn trusting_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    /// Drop clients whose allowance has fully replenished.
    pub fn prune(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Number of clients with limiter state.
    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }

    /// Returns the number of seconds to wait if `ip` is over its quota.
    pub fn check(&self, ip: IpAddr) -> Result<(), u64> {
        self.limiter.check_key(&ip).map_err(|negative| {
            negative
                .wait_time_from(DefaultClock::default().now())
                .as_secs()
                .max(1)
        })
    }
}

/// Create an IP-keyed limiter. The whole window's allowance is available as a
/// burst and replenishes evenly across the window.
pub fn create_ip_rate_limiter(
    max_requests: u32,
    window_seconds: u64,
) -> Result<IpRateLimiter, AppError> {
    let burst = NonZeroU32::new(max_requests).ok_or_else(|| {
        AppError::ConfigError(anyhow::anyhow!("rate limit ceiling must be at least 1"))
    })?;
    let period = Duration::from_secs(window_seconds.max(1)) / burst.get();
    let quota = Quota::with_period(period.max(Duration::from_millis(1)))
        .ok_or_else(|| AppError::ConfigError(anyhow::anyhow!("invalid rate limit window")))?
        .allow_burst(burst);

    Ok(IpRateLimiter {
        limiter: Arc::new(RateLimiter::dashmap(quota)),
        max_requests,
        trust_forwarded_for: false,
    })
}

/// Resolve the caller address. The socket peer is authoritative unless the
/// limiter trusts `x-forwarded-for`, in which case its first hop wins.
fn client_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_forwarded_for: bool,
) -> Option<IpAddr> {
    let peer = connect_info.map(|ConnectInfo(addr)| addr.ip());
    if !trust_forwarded_for {
        return peer;
    }

    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
        .or(peer)
}

/// Middleware applying the IP limiter and advertising the ceiling.
pub async fn ip_rate_limit_middleware(
    State(limiter): State<IpRateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = client_ip(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
        limiter.trust_forwarded_for,
    );

    match ip {
        Some(ip) => {
            if let Err(retry_after) = limiter.check(ip) {
                tracing::warn!(client_ip = %ip, retry_after, "Rate limit exceeded");
                return Err(AppError::TooManyRequests(
                    "Too many requests, please try again later.".to_string(),
                    Some(retry_after),
                ));
            }
        }
        None => tracing::warn!("Could not determine client IP for rate limiting"),
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(RATE_LIMIT_HEADER, HeaderValue::from(limiter.max_requests()));
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_burst_then_rejects() {
        let limiter = create_ip_rate_limiter(2, 60).unwrap();
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(limiter.check(ip).is_ok());
        assert!(limiter.check(ip).is_ok());
        let wait = limiter.check(ip).unwrap_err();
        assert!(wait >= 1);
    }

    #[test]
    fn limits_are_tracked_per_ip() {
        let limiter = create_ip_rate_limiter(1, 60).unwrap();
        assert!(limiter.check("10.0.0.1".parse().unwrap()).is_ok());
        assert!(limiter.check("10.0.0.2".parse().unwrap()).is_ok());
        assert!(limiter.check("10.0.0.1".parse().unwrap()).is_err());
    }

    #[test]
    fn zero_ceiling_is_a_config_error() {
        assert!(create_ip_rate_limiter(0, 60).is_err());
    }

    fn forwarded(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", value.parse().unwrap());
        headers
    }

    #[test]
    fn peer_is_used_when_forwarded_header_is_untrusted() {
        let peer = ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000)));
        for hop in ["203.0.113.7", "203.0.113.8, 10.0.0.1"] {
            assert_eq!(
                client_ip(&forwarded(hop), Some(&peer), false),
                Some("192.0.2.1".parse().unwrap())
            );
        }
        assert_eq!(client_ip(&forwarded("203.0.113.7"), None, false), None);
    }

    #[test]
    fn trusted_forwarded_header_wins_over_peer() {
        let peer = ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000)));
        assert_eq!(
            client_ip(&forwarded("203.0.113.7, 10.0.0.1"), Some(&peer), true),
            Some("203.0.113.7".parse().unwrap())
        );
        assert_eq!(
            client_ip(&forwarded("not-an-ip"), Some(&peer), true),
            Some("127.0.0.1".parse().unwrap())
        );
        assert_eq!(
            client_ip(&HeaderMap::new(), Some(&peer), true),
            Some("127.0.0.1".parse().unwrap())
        );
    }

    #[test]
    fn prune_drops_only_replenished_clients() {
        // 10 per second: one request is repaid after 100ms.
        let limiter = create_ip_rate_limiter(10, 1).unwrap();
        limiter.check("10.0.0.1".parse().unwrap()).unwrap();
        assert_eq!(limiter.tracked_clients(), 1);

        limiter.prune();
        assert_eq!(limiter.tracked_clients(), 1);

        std::thread::sleep(Duration::from_millis(250));
        limiter.prune();
        assert_eq!(limiter.tracked_clients(), 0);
    }
}
