//! Client IP resolution from proxy headers and the socket peer.
//!
//! Priority: `CF-Connecting-IP` -> rightmost `X-Forwarded-For` -> peer address.

use axum::extract::{ConnectInfo, FromRequestParts};
use http::request::Parts;
use http::{Extensions, HeaderMap};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

/// The resolved client IP, if any source offered one.
pub struct ClientIp(pub Option<IpAddr>);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientIp(resolve(&parts.headers, &parts.extensions)))
    }
}

/// Shared by the extractor and the rate limiter.
pub fn resolve(headers: &HeaderMap, extensions: &Extensions) -> Option<IpAddr> {
    if let Some(ip) = header_str(headers, "cf-connecting-ip").and_then(|s| s.trim().parse().ok()) {
        return Some(ip);
    }

    if let Some(xff) = header_str(headers, "x-forwarded-for")
        && let Some(ip) = xff
            .rsplit(',')
            .next()
            .map(str::trim)
            .and_then(|s| s.parse::<IpAddr>().ok())
    {
        return Some(ip);
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
