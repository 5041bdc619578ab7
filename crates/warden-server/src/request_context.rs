use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

pub const UNKNOWN_IP: &str = "unknown";

/// Client IP as seen through at most one trusted proxy hop.
///
/// `X-Forwarded-For` (rightmost entry) and then `X-Real-IP` are only believed
/// when the direct peer is listed in `trusted_proxies`; otherwise the peer
/// address is used. Without a peer address the result is [`UNKNOWN_IP`].
pub fn extract_client_ip(
    headers: &HeaderMap,
    direct_ip: Option<IpAddr>,
    trusted_proxies: &[IpAddr],
) -> String {
    let Some(direct) = direct_ip else {
        tracing::debug!("No peer address on request");
        return UNKNOWN_IP.to_string();
    };

    if trusted_proxies.contains(&direct) {
        let forwarded = headers
            .get("X-Forwarded-For")
            .and_then(|h| h.to_str().ok())
            .and_then(|chain| chain.split(',').next_back());
        let real_ip = headers.get("X-Real-IP").and_then(|h| h.to_str().ok());

        for candidate in [forwarded, real_ip].into_iter().flatten() {
            let candidate = candidate.trim();
            if candidate.parse::<IpAddr>().is_ok() {
                return candidate.to_string();
            }
        }
    }

    direct.to_string()
}

pub(crate) fn direct_ip(extensions: &axum::http::Extensions) -> Option<IpAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
}

/// Caller metadata used for audit records and rate limiting
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub ip_address: String,
    pub user_agent: String,
}

impl RequestContext {
    pub fn from_parts(parts: &Parts, trusted_proxies: &[IpAddr]) -> Self {
        let ip_address =
            extract_client_ip(&parts.headers, direct_ip(&parts.extensions), trusted_proxies);

        let user_agent = parts
            .headers
            .get("User-Agent")
            .and_then(|h| h.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Self {
            ip_address,
            user_agent,
        }
    }

    /// IP for audit records; `None` when the address is unknown
    pub fn ip(&self) -> Option<String> {
        (self.ip_address != UNKNOWN_IP).then(|| self.ip_address.clone())
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(RequestContext::from_parts(
            parts,
            &state.config.trusted_proxies,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)], peer: Option<[u8; 4]>) -> Parts {
        let mut builder = Request::builder().uri("https://warden.test/auth/login");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        if let Some(peer) = peer {
            parts
                .extensions
                .insert(ConnectInfo(SocketAddr::from((peer, 443))));
        }
        parts
    }

    #[test]
    fn test_trusted_proxy_uses_rightmost_forwarded_entry() {
        let parts = parts(
            &[
                ("X-Forwarded-For", "198.51.100.7, 203.0.113.9"),
                ("User-Agent", "warden-tests/1.0"),
            ],
            Some([10, 0, 0, 1]),
        );
        let context = RequestContext::from_parts(&parts, &["10.0.0.1".parse().unwrap()]);
        assert_eq!(context.ip_address, "203.0.113.9");
        assert_eq!(context.user_agent, "warden-tests/1.0");
    }

    #[test]
    fn test_untrusted_peer_ignores_headers() {
        let parts = parts(
            &[("X-Forwarded-For", "203.0.113.9"), ("X-Real-IP", "203.0.113.10")],
            Some([192, 0, 2, 44]),
        );
        let context = RequestContext::from_parts(&parts, &["10.0.0.1".parse().unwrap()]);
        assert_eq!(context.ip_address, "192.0.2.44");
    }

    #[test]
    fn test_real_ip_fallback() {
        let parts = parts(
            &[("X-Forwarded-For", "garbage"), ("X-Real-IP", "203.0.113.10")],
            Some([10, 0, 0, 1]),
        );
        let context = RequestContext::from_parts(&parts, &["10.0.0.1".parse().unwrap()]);
        assert_eq!(context.ip_address, "203.0.113.10");
    }

    #[test]
    fn test_missing_peer_is_unknown() {
        let context = RequestContext::from_parts(&parts(&[], None), &[]);
        assert_eq!(context.ip_address, UNKNOWN_IP);
        assert_eq!(context.user_agent, "unknown");
        assert_eq!(context.ip(), None);
    }
}
