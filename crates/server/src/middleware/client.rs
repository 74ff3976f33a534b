//! Client identity taken from request headers.

use axum::http::HeaderMap;
use std::net::IpAddr;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Address of the original client.
///
/// The first `X-Forwarded-For` hop wins, then `X-Real-IP`, then the socket peer. Header values
/// are taken as given; the proxy is expected to run behind a load balancer that sets them.
#[must_use]
pub fn remote_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<String> {
    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    let real_ip = headers
        .get(X_REAL_IP)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return Some(ip.to_string());
    }

    peer.map(|ip| ip.to_string())
}

/// The auth token from `header`, if present and non-empty.
#[must_use]
pub fn auth_token(headers: &HeaderMap, header: &str) -> Option<String> {
    headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}
