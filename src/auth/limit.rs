use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use crate::AppError;

/// Keys tracked before idle ones are pruned.
const PRUNE_ABOVE: usize = 10_000;

/// Login attempts allowed per client IP.
pub struct LoginLimiter {
    limiter: DefaultKeyedRateLimiter<IpAddr>,
}

impl LoginLimiter {
    pub fn per_minute(attempts: NonZeroU32) -> LoginLimiter {
        LoginLimiter {
            limiter: RateLimiter::keyed(Quota::per_minute(attempts)),
        }
    }

    pub fn check(&self, ip: IpAddr) -> bool {
        if self.limiter.len() > PRUNE_ABOVE {
            self.limiter.retain_recent();
        }
        self.limiter.check_key(&ip).is_ok()
    }
}

/// Peer address from the connection. Requests without one share a single bucket.
fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |ConnectInfo(addr)| addr.ip())
}

pub(crate) async fn limit_login(State(limiter): State<Arc<LoginLimiter>>, request: Request, next: Next) -> Response {
    let ip = client_ip(&request);
    if !limiter.check(ip) {
        tracing::warn!(%ip, "login rate limit hit");
        return AppError::RateLimited.into_response();
    }
    next.run(request).await
}
