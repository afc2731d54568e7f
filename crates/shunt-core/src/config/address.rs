//! Communicate URL parsing
//!
//! The relay listens on, and the agent dials, the address given by the
//! `communicate-url` option. Both `host:port` and `scheme://host:port` forms
//! are accepted so existing deployments can keep their URLs. The scheme is
//! only validated; whether TLS is used is decided by the `ssl` option.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// URL scheme of a communicate address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Plain TCP (also `http`)
    Tcp,
    /// TLS (also `ssl`, `https`)
    Tls,
    /// No scheme given
    Bare,
}

impl Scheme {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" | "http" => Some(Self::Tcp),
            "tls" | "ssl" | "https" => Some(Self::Tls),
            _ => None,
        }
    }
}

/// A parsed `communicate-url`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunicateUrl {
    /// Scheme the URL was written with
    pub scheme: Scheme,
    /// Host name or IP literal, without brackets
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl CommunicateUrl {
    /// Parse a communicate URL
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidAddress {
            address: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        let (scheme, rest) = match trimmed.split_once("://") {
            Some((scheme, rest)) => {
                let scheme = Scheme::parse(scheme).ok_or_else(|| invalid("unsupported scheme"))?;
                (scheme, rest)
            }
            None => (Scheme::Bare, trimmed),
        };

        // Drop any path component
        let authority = rest.split('/').next().unwrap_or_default();
        if authority.is_empty() {
            return Err(invalid("missing host"));
        }

        let (host, port) = if let Some(stripped) = authority.strip_prefix('[') {
            let (host, after) = stripped
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 literal"))?;
            let port = after
                .strip_prefix(':')
                .ok_or_else(|| invalid("missing port"))?;
            (host, port)
        } else {
            authority
                .rsplit_once(':')
                .ok_or_else(|| invalid("missing port"))?
        };

        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port: u16 = port.parse().map_err(|_| invalid("invalid port"))?;

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
        })
    }

    /// `host:port` form suitable for binding or dialing
    pub fn socket_address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for CommunicateUrl {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CommunicateUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            Scheme::Tcp => write!(f, "tcp://{}", self.socket_address()),
            Scheme::Tls => write!(f, "tls://{}", self.socket_address()),
            Scheme::Bare => f.write_str(&self.socket_address()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_address() {
        let url = CommunicateUrl::parse("relay.example.com:10443").unwrap();
        assert_eq!(url.scheme, Scheme::Bare);
        assert_eq!(url.host, "relay.example.com");
        assert_eq!(url.port, 10443);
        assert_eq!(url.socket_address(), "relay.example.com:10443");
    }

    #[test]
    fn test_https_url_with_path() {
        let url = CommunicateUrl::parse("https://localhost:10443/").unwrap();
        assert_eq!(url.scheme, Scheme::Tls);
        assert_eq!(url.socket_address(), "localhost:10443");
    }

    #[test]
    fn test_tcp_scheme() {
        let url: CommunicateUrl = "tcp://0.0.0.0:9000".parse().unwrap();
        assert_eq!(url.scheme, Scheme::Tcp);
        assert_eq!(url.to_string(), "tcp://0.0.0.0:9000");
    }

    #[test]
    fn test_ipv6_literal() {
        let url = CommunicateUrl::parse("ssl://[::1]:443").unwrap();
        assert_eq!(url.host, "::1");
        assert_eq!(url.socket_address(), "[::1]:443");
    }

    #[test]
    fn test_rejects_bad_input() {
        for input in [
            "",
            "localhost",
            "ftp://host:21",
            "host:notaport",
            "host:70000",
            ":8080",
            "[::1:80",
        ] {
            assert!(
                CommunicateUrl::parse(input).is_err(),
                "expected '{}' to be rejected",
                input
            );
        }
    }
}
