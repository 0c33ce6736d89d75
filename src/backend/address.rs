//! Backend address parsing.
//!
//! # Responsibilities
//! - Parse `scheme://host[:port][/path]` backend addresses
//! - Derive protocol, TLS and default port from the scheme
//! - Normalize the base path so joins never produce `//`

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendScheme {
    Http,
    Https,
    Grpc,
    Grpcs,
}

impl BackendScheme {
    fn parse(scheme: &str) -> Option<Self> {
        match scheme {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            "grpc" => Some(Self::Grpc),
            "grpcs" => Some(Self::Grpcs),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Grpc => "grpc",
            Self::Grpcs => "grpcs",
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Https | Self::Grpcs)
    }

    pub fn is_grpc(&self) -> bool {
        matches!(self, Self::Grpc | Self::Grpcs)
    }

    pub fn default_port(&self) -> u16 {
        if self.is_tls() {
            443
        } else {
            80
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("malformed url: {0}")]
    Malformed(#[from] url::ParseError),

    #[error("unsupported scheme `{0}`")]
    UnsupportedScheme(String),

    #[error("missing host")]
    MissingHost,
}

/// A parsed backend address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BackendAddress {
    pub scheme: BackendScheme,
    pub host: String,
    pub port: u16,
    /// Base path without trailing `/`; empty for the root.
    pub path: String,
}

impl BackendAddress {
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let url = Url::parse(input.trim())?;
        let scheme = BackendScheme::parse(url.scheme())
            .ok_or_else(|| AddressError::UnsupportedScheme(url.scheme().to_string()))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or(AddressError::MissingHost)?
            .to_string();
        let port = url.port().unwrap_or_else(|| scheme.default_port());
        let path = url.path().trim_end_matches('/').to_string();

        Ok(Self { scheme, host, port, path })
    }

    /// `host:port`.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for BackendAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}{}", self.scheme.as_str(), self.host, self.port, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_defaults() {
        let addr = BackendAddress::parse("https://backend.example.com").unwrap();
        assert_eq!(addr.scheme, BackendScheme::Https);
        assert_eq!(addr.host, "backend.example.com");
        assert_eq!(addr.port, 443);
        assert_eq!(addr.path, "");

        let addr = BackendAddress::parse("http://127.0.0.1:8082").unwrap();
        assert_eq!(addr.port, 8082);
        assert_eq!(addr.authority(), "127.0.0.1:8082");
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        assert_eq!(BackendAddress::parse("https://x.com/api/").unwrap().path, "/api");
        assert_eq!(BackendAddress::parse("https://x.com/").unwrap().path, "");
        assert_eq!(BackendAddress::parse("https://x.com/a/b").unwrap().path, "/a/b");
    }

    #[test]
    fn test_grpc_schemes() {
        let addr = BackendAddress::parse("grpc://10.0.0.1:9000").unwrap();
        assert!(addr.scheme.is_grpc());
        assert!(!addr.scheme.is_tls());
        assert_eq!(addr.port, 9000);

        let addr = BackendAddress::parse("grpcs://api.example.com").unwrap();
        assert!(addr.scheme.is_tls());
        assert_eq!(addr.port, 443);
    }

    #[test]
    fn test_rejects_bad_addresses() {
        assert!(matches!(
            BackendAddress::parse("ftp://x.com"),
            Err(AddressError::UnsupportedScheme(s)) if s == "ftp"
        ));
        assert!(matches!(BackendAddress::parse("not a url"), Err(AddressError::Malformed(_))));
        assert!(matches!(
            BackendAddress::parse("grpc:///path"),
            Err(AddressError::MissingHost)
        ));
    }
}
