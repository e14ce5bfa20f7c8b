//! Hop-by-hop header handling: headers that describe a single
//! transport hop and must never be forwarded to the next one (RFC 9110 §7.6.1).

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

/// True if `name` is a hop-by-hop header that must be stripped before
/// forwarding in either direction.
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Removes every hop-by-hop header from `headers` in place.
pub fn strip_hop_by_hop(headers: &mut Vec<(String, String)>) {
    headers.retain(|(name, _)| !is_hop_by_hop(name));
}
