//! Client address extraction for click events
//!
//! The first `X-Forwarded-For` entry wins when the header is present,
//! matching how the fronting proxy reports the originating client.
//! Otherwise the socket peer address is used.

use axum::http::HeaderMap;
use std::net::IpAddr;

/// Stored when neither a forwarded chain nor a peer address is available.
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// Determine the address a click originated from.
///
/// # Arguments
/// * `headers` - HTTP request headers
/// * `peer` - The socket remote address, if the server recorded one
pub fn client_address(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    if let Some(forwarded) = first_forwarded_for(headers) {
        return forwarded;
    }

    peer.map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string())
}

/// Leftmost entry of `X-Forwarded-For`, trimmed; `None` when absent or blank.
fn first_forwarded_for(headers: &HeaderMap) -> Option<String> {
    let xff = headers.get("x-forwarded-for")?.to_str().ok()?;

    xff.split(',')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
