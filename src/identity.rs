//! Client identification strategies.

use axum::extract::{ConnectInfo, Request};
use std::net::SocketAddr;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// Resolves the identity a request is throttled under.
///
/// Implementations must be deterministic for one logical client. An empty
/// identity is a valid result; every such request then shares one bucket.
pub trait IdentityProvider: Send + Sync {
    fn identify(&self, request: &Request) -> String;
}

impl<F> IdentityProvider for F
where
    F: Fn(&Request) -> String + Send + Sync,
{
    fn identify(&self, request: &Request) -> String {
        self(request)
    }
}

/// Reads the client IP from proxy headers.
///
/// `X-Forwarded-For` wins over `X-Real-IP`; its first entry is the original
/// client since proxies append hops to the right. Only use this behind a
/// reverse proxy that overwrites these headers, otherwise clients pick their
/// own identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealIp;

impl IdentityProvider for RealIp {
    fn identify(&self, request: &Request) -> String {
        let headers = request.headers();

        if let Some(forwarded) = headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            if !forwarded.is_empty() {
                return forwarded
                    .split(',')
                    .next()
                    .map(|ip| ip.trim().to_string())
                    .unwrap_or_default();
            }
        }

        headers
            .get(X_REAL_IP)
            .and_then(|v| v.to_str().ok())
            .map(|ip| ip.trim().to_string())
            .unwrap_or_default()
    }
}

/// Uses the transport peer address.
///
/// Behind a reverse proxy every request appears to come from the proxy, so
/// this is only meaningful for directly exposed servers. The server must be
/// started with `into_make_service_with_connect_info::<SocketAddr>()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteIp;

impl IdentityProvider for RemoteIp {
    fn identify(&self, request: &Request) -> String {
        let extensions = request.extensions();

        extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr)
            .or_else(|| extensions.get::<SocketAddr>().copied())
            .map(|addr| addr.ip().to_string())
            .unwrap_or_default()
    }
}
