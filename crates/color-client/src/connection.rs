//! Endpoint address parsing and normalization.
//!
//! - [`EndpointAddress`]: validated endpoint address
//! - [`AddressError`]: validation errors
//!
//! # Accepted Forms
//!
//! - `tcp://host:port`: a controller speaking the line protocol
//! - `tcp://host`: port defaults to [`DEFAULT_PORT`]
//! - `host:port` / `[::1]:port`: treated as `tcp://`
//! - `local://name`: an in-process register table
//!
//! ```
//! use color_client::connection::EndpointAddress;
//!
//! let addr = EndpointAddress::parse("10.129.4.30")?;
//! assert_eq!(addr.socket_addr(), Some("10.129.4.30:4840".to_string()));
//! # Ok::<(), color_client::connection::AddressError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

/// Default controller port.
pub const DEFAULT_PORT: u16 = 4840;

/// URL scheme of a remote line-protocol endpoint.
pub const TCP_SCHEME: &str = "tcp";

/// URL scheme of an in-process register table.
pub const LOCAL_SCHEME: &str = "local";

/// Where an endpoint lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointKind {
    /// Remote TCP endpoint
    Tcp {
        /// Host name or IP literal (IPv6 in brackets)
        host: String,
        /// TCP port
        port: u16,
    },
    /// In-process register table
    Local {
        /// Table name
        name: String,
    },
}

/// Validated endpoint address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EndpointAddress {
    url: Url,
    kind: EndpointKind,
}

impl EndpointAddress {
    /// Parse and normalize an address.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let url = normalize_address(input)?;
        let kind = match url.scheme() {
            TCP_SCHEME => EndpointKind::Tcp {
                host: url.host_str().ok_or(AddressError::MissingHost)?.to_string(),
                port: url.port().unwrap_or(DEFAULT_PORT),
            },
            _ => EndpointKind::Local {
                name: url.host_str().ok_or(AddressError::MissingHost)?.to_string(),
            },
        };
        Ok(Self { url, kind })
    }

    /// Normalized URL string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Endpoint kind.
    #[must_use]
    pub fn kind(&self) -> &EndpointKind {
        &self.kind
    }

    /// `host:port` for TCP endpoints.
    #[must_use]
    pub fn socket_addr(&self) -> Option<String> {
        match &self.kind {
            EndpointKind::Tcp { host, port } => Some(format!("{host}:{port}")),
            EndpointKind::Local { .. } => None,
        }
    }

    /// Table name for local endpoints.
    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        match &self.kind {
            EndpointKind::Local { name } => Some(name),
            EndpointKind::Tcp { .. } => None,
        }
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

impl TryFrom<String> for EndpointAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EndpointAddress> for String {
    fn from(value: EndpointAddress) -> Self {
        value.url.into()
    }
}

/// Address validation error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Input was empty or whitespace-only
    #[error("Address cannot be empty")]
    EmptyInput,
    /// URL parsing failed
    #[error("Invalid address: {0}")]
    InvalidUrl(String),
    /// No host (or table name) was found
    #[error("Address must include a host")]
    MissingHost,
    /// Port could not be set
    #[error("Invalid port: {0}")]
    InvalidPort(String),
    /// Only `tcp` and `local` are supported
    #[error("Unsupported scheme '{0}' (use tcp or local)")]
    UnsupportedScheme(String),
}

/// Normalize an endpoint address string.
///
/// Trims whitespace, adds `tcp://` when no scheme is given and fills in
/// [`DEFAULT_PORT`] for TCP addresses without a port.
pub fn normalize_address(input: &str) -> Result<Url, AddressError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AddressError::EmptyInput);
    }

    let with_scheme = if input.contains("://") {
        input.to_string()
    } else {
        format!("{TCP_SCHEME}://{input}")
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| AddressError::InvalidUrl(e.to_string()))?;

    let scheme = url.scheme().to_lowercase();
    if scheme != TCP_SCHEME && scheme != LOCAL_SCHEME {
        return Err(AddressError::UnsupportedScheme(scheme));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(AddressError::MissingHost);
    }

    if scheme == TCP_SCHEME && url.port().is_none() {
        url.set_port(Some(DEFAULT_PORT))
            .map_err(|()| AddressError::InvalidPort("Cannot set port on this URL".to_string()))?;
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_host_port_is_tcp() {
        let addr = EndpointAddress::parse("127.0.0.1:5000").unwrap();
        assert_eq!(
            addr.kind(),
            &EndpointKind::Tcp {
                host: "127.0.0.1".into(),
                port: 5000
            }
        );
        assert_eq!(addr.socket_addr().as_deref(), Some("127.0.0.1:5000"));
    }

    #[test]
    fn test_default_port_added() {
        let addr = EndpointAddress::parse("tcp://plc.local").unwrap();
        assert_eq!(addr.socket_addr().as_deref(), Some("plc.local:4840"));
        assert!(addr.as_str().starts_with("tcp://plc.local:4840"));
    }

    #[test]
    fn test_ipv6() {
        let addr = EndpointAddress::parse("[::1]:9000").unwrap();
        assert_eq!(addr.socket_addr().as_deref(), Some("[::1]:9000"));
    }

    #[test]
    fn test_local_address() {
        let addr = EndpointAddress::parse("local://dashboard").unwrap();
        assert_eq!(addr.local_name(), Some("dashboard"));
        assert!(addr.socket_addr().is_none());
    }

    #[test]
    fn test_trims_whitespace() {
        let addr = EndpointAddress::parse("  localhost:4841 ").unwrap();
        assert_eq!(addr.socket_addr().as_deref(), Some("localhost:4841"));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(
            EndpointAddress::parse("   ").unwrap_err(),
            AddressError::EmptyInput
        );
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = EndpointAddress::parse("http://example.com").unwrap_err();
        assert!(matches!(err, AddressError::UnsupportedScheme(_)));
    }

    #[test]
    fn test_invalid_port() {
        let err = EndpointAddress::parse("tcp://host:99999").unwrap_err();
        assert!(matches!(err, AddressError::InvalidUrl(_)));
    }

    #[test]
    fn test_deserialize_from_string() {
        #[derive(Deserialize)]
        struct Wrapper {
            address: EndpointAddress,
        }
        let w: Wrapper = toml::from_str(r#"address = "10.129.4.30:4840""#).unwrap();
        assert_eq!(w.address.socket_addr().as_deref(), Some("10.129.4.30:4840"));

        let bad: Result<Wrapper, _> = toml::from_str(r#"address = "ftp://x""#);
        assert!(bad.is_err());
    }
}
