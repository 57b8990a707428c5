use crate::AppState;
use crate::api::error::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

/// Client IP as reported by a reverse proxy
fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    // Check X-Forwarded-For first (proxy)
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    // Check X-Real-IP
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

/// Rate-limit key for a request. Proxy headers are only honoured when
/// `trust_proxy_headers` is set; otherwise the peer address decides.
pub fn extract_client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> String {
    if trust_proxy_headers {
        if let Some(ip) = forwarded_ip(headers) {
            return ip;
        }
    }

    match peer {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}

/// Counts a conversion against the caller's hourly allowance before the
/// upload body is read.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = extract_client_ip(req.headers(), peer, state.config.trust_proxy_headers);
    state.rate_limiter.check(&ip).await?;
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer(ip: &str) -> Option<SocketAddr> {
        Some(SocketAddr::new(ip.parse().unwrap(), 52000))
    }

    fn proxied_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        headers
    }

    #[test]
    fn test_forwarded_for_wins_when_trusted() {
        assert_eq!(
            extract_client_ip(&proxied_headers(), peer("127.0.0.1"), true),
            "203.0.113.7"
        );
    }

    #[test]
    fn test_real_ip_fallback_when_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static(" 10.0.0.2 "));
        assert_eq!(extract_client_ip(&headers, None, true), "10.0.0.2");
    }

    #[test]
    fn test_proxy_headers_ignored_by_default() {
        assert_eq!(
            extract_client_ip(&proxied_headers(), peer("198.51.100.4"), false),
            "198.51.100.4"
        );
    }

    #[test]
    fn test_peer_port_is_not_part_of_key() {
        let a = extract_client_ip(&HeaderMap::new(), Some("192.0.2.1:1000".parse().unwrap()), false);
        let b = extract_client_ip(&HeaderMap::new(), Some("192.0.2.1:2000".parse().unwrap()), false);
        assert_eq!(a, b);
    }

    #[test]
    fn test_unknown_without_peer_or_headers() {
        assert_eq!(extract_client_ip(&HeaderMap::new(), None, false), "unknown");
    }
}
