//! Rate-limit identity resolution.

use axum::http::{HeaderMap, HeaderName};
use std::fmt;
use std::net::SocketAddr;

use crate::config::RateLimitingConfig;
use crate::error::{GatekeeperError, Result};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// The identity a request is counted against.
///
/// Exactly one identity is active per request: an API token when one is
/// supplied, otherwise the client network address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    /// Client network address (may be empty when unknown)
    Ip(String),
    /// API token value from the request header
    Token(String),
}

impl IdentityKey {
    /// The identity value: the address or the token.
    pub fn as_str(&self) -> &str {
        match self {
            IdentityKey::Ip(addr) => addr,
            IdentityKey::Token(token) => token,
        }
    }

    /// Short label for the identity class.
    pub fn kind(&self) -> &'static str {
        match self {
            IdentityKey::Ip(_) => "ip",
            IdentityKey::Token(_) => "token",
        }
    }

    /// The key this identity is counted under in the store.
    ///
    /// Prefixed by class, so a token whose value equals an address never
    /// lands in that address's bucket.
    pub fn store_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.as_str())
    }
}

/// An identity together with the limit that applies to its class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKey {
    pub key: IdentityKey,
    pub limit: u64,
}

/// Maps a request to exactly one [`ResolvedKey`].
///
/// Resolution is a pure function of the request and the configuration it
/// was built from.
#[derive(Debug, Clone)]
pub struct KeyResolver {
    token_header: HeaderName,
    ip_limit: u64,
    token_limit: u64,
    trust_forwarded_for: bool,
}

impl KeyResolver {
    /// Create a resolver reading tokens from `token_header`.
    pub fn new(token_header: HeaderName, ip_limit: u64, token_limit: u64) -> Self {
        Self {
            token_header,
            ip_limit,
            token_limit,
            trust_forwarded_for: false,
        }
    }

    /// Build a resolver from the rate limiting configuration.
    pub fn from_config(config: &RateLimitingConfig) -> Result<Self> {
        let token_header = HeaderName::from_bytes(config.token_header.as_bytes()).map_err(|e| {
            GatekeeperError::Config(format!(
                "invalid token header '{}': {}",
                config.token_header, e
            ))
        })?;

        Ok(Self::new(token_header, config.ip_limit, config.token_limit)
            .with_forwarded_for(config.trust_forwarded_for))
    }

    /// Prefer the first `X-Forwarded-For` entry over the peer address.
    pub fn with_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    /// Resolve an identity from an already-extracted address and token.
    ///
    /// A present, non-empty token wins. A missing address becomes the empty
    /// string, which is simply its own bucket.
    pub fn resolve(&self, client_addr: Option<&str>, token: Option<&str>) -> ResolvedKey {
        match token.filter(|t| !t.is_empty()) {
            Some(token) => ResolvedKey {
                key: IdentityKey::Token(token.to_string()),
                limit: self.token_limit,
            },
            None => ResolvedKey {
                key: IdentityKey::Ip(client_addr.unwrap_or_default().to_string()),
                limit: self.ip_limit,
            },
        }
    }

    /// Resolve an identity from request headers and the peer socket address.
    pub fn resolve_request(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> ResolvedKey {
        let token = headers
            .get(&self.token_header)
            .and_then(|value| value.to_str().ok());

        let forwarded = if self.trust_forwarded_for {
            forwarded_client(headers)
        } else {
            None
        };
        let client_addr = forwarded.or_else(|| peer.map(|addr| addr.ip().to_string()));

        self.resolve(client_addr.as_deref(), token)
    }
}

fn forwarded_client(headers: &HeaderMap) -> Option<String> {
    headers
        .get(FORWARDED_FOR)?
        .to_str()
        .ok()?
        .split(',')
        .next()
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn resolver() -> KeyResolver {
        KeyResolver::from_config(&RateLimitingConfig::default()).unwrap()
    }

    #[test]
    fn test_token_takes_priority() {
        let resolved = resolver().resolve(Some("10.0.0.1"), Some("abc123"));

        assert_eq!(resolved.key, IdentityKey::Token("abc123".to_string()));
        assert_eq!(resolved.limit, 10);
    }

    #[test]
    fn test_ip_used_without_token() {
        let resolved = resolver().resolve(Some("10.0.0.1"), None);

        assert_eq!(resolved.key, IdentityKey::Ip("10.0.0.1".to_string()));
        assert_eq!(resolved.limit, 5);
    }

    #[test]
    fn test_empty_token_falls_back_to_ip() {
        let resolved = resolver().resolve(Some("10.0.0.1"), Some(""));

        assert_eq!(resolved.key, IdentityKey::Ip("10.0.0.1".to_string()));
    }

    #[test]
    fn test_missing_address_is_empty_bucket() {
        let resolved = resolver().resolve(None, None);

        assert_eq!(resolved.key, IdentityKey::Ip(String::new()));
        assert_eq!(resolved.key.as_str(), "");
        assert_eq!(resolved.limit, 5);
    }

    #[test]
    fn test_resolve_request_reads_header_case_insensitively() {
        let mut headers = HeaderMap::new();
        headers.insert("api_key", HeaderValue::from_static("tok-1"));
        let peer: SocketAddr = "192.168.1.7:51000".parse().unwrap();

        let resolved = resolver().resolve_request(&headers, Some(peer));

        assert_eq!(resolved.key, IdentityKey::Token("tok-1".to_string()));
    }

    #[test]
    fn test_resolve_request_uses_peer_ip_without_port() {
        let peer: SocketAddr = "192.168.1.7:51000".parse().unwrap();

        let resolved = resolver().resolve_request(&HeaderMap::new(), Some(peer));

        assert_eq!(resolved.key, IdentityKey::Ip("192.168.1.7".to_string()));
    }

    #[test]
    fn test_forwarded_for_ignored_unless_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("203.0.113.9, 10.0.0.2"));
        let peer: SocketAddr = "10.0.0.2:443".parse().unwrap();

        let untrusted = resolver().resolve_request(&headers, Some(peer));
        assert_eq!(untrusted.key, IdentityKey::Ip("10.0.0.2".to_string()));

        let trusted = resolver()
            .with_forwarded_for(true)
            .resolve_request(&headers, Some(peer));
        assert_eq!(trusted.key, IdentityKey::Ip("203.0.113.9".to_string()));
    }

    #[test]
    fn test_identity_key_display() {
        assert_eq!(IdentityKey::Ip("1.2.3.4".to_string()).to_string(), "ip:1.2.3.4");
        assert_eq!(IdentityKey::Token("t".to_string()).to_string(), "token:t");
    }

    #[test]
    fn test_store_keys_are_namespaced_by_class() {
        let by_ip = resolver().resolve(Some("10.0.0.1"), None);
        let by_token = resolver().resolve(Some("198.51.100.7"), Some("10.0.0.1"));

        assert_eq!(by_ip.key.store_key(), "ip:10.0.0.1");
        assert_eq!(by_token.key.store_key(), "token:10.0.0.1");
        assert_ne!(by_ip.key.store_key(), by_token.key.store_key());
    }
}
