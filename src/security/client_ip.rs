//! Client IP derivation from proxy headers.

use axum::http::HeaderMap;

/// Used when no forwarding header is present (direct local access).
pub const FALLBACK_CLIENT_IP: &str = "127.0.0.1";

/// Header set by the CDN in front of the application.
pub const CDN_CONNECTING_IP: &str = "cf-connecting-ip";

/// Derive the client IP.
///
/// Preference: first entry of `x-forwarded-for`, then `x-real-ip`, then the
/// CDN connecting-IP header, else [`FALLBACK_CLIENT_IP`]. Values are taken
/// as reported; the proxy chain is trusted.
pub fn extract_client_ip(headers: &HeaderMap) -> String {
    first_forwarded(headers)
        .or_else(|| header_value(headers, "x-real-ip"))
        .or_else(|| header_value(headers, CDN_CONNECTING_IP))
        .unwrap_or_else(|| FALLBACK_CLIENT_IP.to_string())
}

fn first_forwarded(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(String::from)
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(String::from)
}
