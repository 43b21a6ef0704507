//! Outbound header preparation
//!
//! Strips connection-management headers and stamps the standard
//! `X-Forwarded-*` set before a request leaves the gateway.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Headers that are connection-scoped and must never be forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers plus `Host` (the client sets its own)
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Names listed in a Connection header are hop-by-hop too
    let named: Vec<String> = headers
        .get("connection")
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .collect()
        })
        .unwrap_or_default();

    for name in HOP_BY_HOP.iter().copied().chain(named.iter().map(String::as_str)) {
        if let Ok(name) = HeaderName::try_from(name) {
            headers.remove(name);
        }
    }
    headers.remove("host");
}

/// Stamp `X-Forwarded-For`/`Host`/`Proto` and `X-Real-IP`
///
/// An existing `X-Forwarded-For` chain is appended to, not replaced.
pub fn apply_forwarding(
    headers: &mut HeaderMap,
    client_ip: Option<&str>,
    host: &str,
    proto: &str,
) {
    if let Some(ip) = client_ip {
        let chain = match headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{}, {}", existing, ip),
            None => ip.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            headers.insert("x-forwarded-for", value);
        }
        if let Ok(value) = HeaderValue::from_str(ip) {
            headers.insert("x-real-ip", value);
        }
    }
    if let Ok(value) = HeaderValue::from_str(host) {
        headers.insert("x-forwarded-host", value);
    }
    if let Ok(value) = HeaderValue::from_str(proto) {
        headers.insert("x-forwarded-proto", value);
    }
}
