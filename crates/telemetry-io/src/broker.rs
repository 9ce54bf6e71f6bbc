//! Broker address parsing.
//!
//! Accepts `mqtt://host[:port]`, `tcp://host[:port]` or a bare `host[:port]`.
//! IPv6 hosts use brackets (`mqtt://[::1]:1883`).

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 1883;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerAddressError {
    #[error("unsupported scheme {0:?} (expected mqtt:// or tcp://)")]
    UnsupportedScheme(String),

    #[error("missing host")]
    MissingHost,

    #[error("invalid port {0:?}")]
    InvalidPort(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl FromStr for BrokerAddress {
    type Err = BrokerAddressError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let rest = match raw.split_once("://") {
            Some(("mqtt" | "tcp", rest)) => rest,
            Some((scheme, _)) => return Err(BrokerAddressError::UnsupportedScheme(scheme.into())),
            None => raw,
        };
        let rest = rest.trim_end_matches('/');

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, tail) = bracketed
                .split_once(']')
                .ok_or(BrokerAddressError::MissingHost)?;
            match tail {
                "" => (host, None),
                _ => match tail.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => return Err(BrokerAddressError::InvalidPort(tail.into())),
                },
            }
        } else {
            match rest.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (rest, None),
            }
        };

        if host.is_empty() {
            return Err(BrokerAddressError::MissingHost);
        }
        let port = match port {
            None => DEFAULT_PORT,
            Some(p) => p
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| BrokerAddressError::InvalidPort(p.into()))?,
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "mqtt://[{}]:{}", self.host, self.port)
        } else {
            write!(f, "mqtt://{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<BrokerAddress, BrokerAddressError> {
        raw.parse()
    }

    #[test]
    fn parses_default_broker_url() {
        let addr = parse("mqtt://127.0.0.1:1883").unwrap();
        assert_eq!(addr.host, "127.0.0.1");
        assert_eq!(addr.port, 1883);
        assert_eq!(addr.to_string(), "mqtt://127.0.0.1:1883");
    }

    #[test]
    fn port_defaults_when_omitted() {
        assert_eq!(parse("tcp://broker.local").unwrap().port, DEFAULT_PORT);
        assert_eq!(parse("broker.local").unwrap().host, "broker.local");
    }

    #[test]
    fn accepts_bracketed_ipv6() {
        let addr = parse("mqtt://[::1]:1884").unwrap();
        assert_eq!(addr.host, "::1");
        assert_eq!(addr.port, 1884);
    }

    #[test]
    fn rejects_tls_scheme_and_bad_ports() {
        assert_eq!(
            parse("mqtts://broker:8883"),
            Err(BrokerAddressError::UnsupportedScheme("mqtts".into()))
        );
        assert_eq!(
            parse("mqtt://broker:http"),
            Err(BrokerAddressError::InvalidPort("http".into()))
        );
        assert_eq!(
            parse("mqtt://broker:0"),
            Err(BrokerAddressError::InvalidPort("0".into()))
        );
        assert_eq!(parse("mqtt://:1883"), Err(BrokerAddressError::MissingHost));
    }
}
