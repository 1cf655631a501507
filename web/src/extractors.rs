//! Request extractors: [`ClientIp`] and [`Cookies`].

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use cookie::Cookie;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr};

/// Address of the caller as reported by the reverse proxy.
///
/// Takes the first address of `X-Forwarded-For`, then `X-Real-IP`, and
/// falls back to loopback when neither parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

impl ClientIp {
    fn from_headers(headers: &HeaderMap) -> Self {
        let header_ip = |name: &str, pick_first: bool| {
            let raw = headers.get(name)?.to_str().ok()?;
            let candidate = if pick_first {
                raw.split(',').next()?
            } else {
                raw
            };
            candidate.trim().parse::<IpAddr>().ok()
        };

        let ip = header_ip("X-Forwarded-For", true)
            .or_else(|| header_ip("X-Real-IP", false))
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        Self(ip)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

/// Cookies sent with the request, by name.
///
/// Malformed pairs are skipped and empty values read as absent.
#[derive(Debug, Clone, Default)]
pub struct Cookies(HashMap<String, String>);

impl Cookies {
    /// Parse every `Cookie` header in `headers`.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let cookies = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|raw| Cookie::split_parse(raw.to_string()).flatten())
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();
        Self(cookies)
    }

    /// Value of the cookie named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Cookies
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn client_ip_prefers_first_forwarded_address() {
        let ip = ClientIp::from_headers(&headers(&[
            ("x-forwarded-for", "203.0.113.1, 198.51.100.1"),
            ("x-real-ip", "198.51.100.42"),
        ]));
        assert_eq!(ip.0.to_string(), "203.0.113.1");
    }

    #[test]
    fn client_ip_uses_real_ip_when_forwarded_is_garbage() {
        let ip = ClientIp::from_headers(&headers(&[
            ("x-forwarded-for", "unknown"),
            ("x-real-ip", "198.51.100.42"),
        ]));
        assert_eq!(ip.0.to_string(), "198.51.100.42");
    }

    #[test]
    fn client_ip_defaults_to_loopback() {
        assert_eq!(
            ClientIp::from_headers(&HeaderMap::new()).0,
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        );
    }

    #[tokio::test]
    async fn cookies_across_several_headers() {
        let request = axum::http::Request::builder()
            .header(header::COOKIE, "iamin-access-token=abc; theme=dark")
            .header(header::COOKIE, "empty=; iamin-refresh-token=def")
            .body(())
            .unwrap();
        let (mut parts, ()) = request.into_parts();

        let cookies = Cookies::from_request_parts(&mut parts, &()).await.unwrap();

        assert_eq!(cookies.get("iamin-access-token"), Some("abc"));
        assert_eq!(cookies.get("iamin-refresh-token"), Some("def"));
        assert_eq!(cookies.get("theme"), Some("dark"));
        assert_eq!(cookies.get("empty"), None);
        assert_eq!(cookies.get("missing"), None);
    }
}
