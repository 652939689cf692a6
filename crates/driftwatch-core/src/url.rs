//! Environment base URLs.

use std::fmt;

use http::Uri;

use crate::error::{ConfigError, ConfigResult};

/// A validated `http://host[:port][/prefix]` base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUrl {
    raw: String,
    host: String,
    port: u16,
    host_header: String,
    prefix: String,
}

impl BaseUrl {
    /// Parse and validate a base URL. `field` names the setting in errors.
    pub fn parse(field: &'static str, raw: &str) -> ConfigResult<Self> {
        let raw = raw.trim();
        let invalid = |reason: String| ConfigError::InvalidUrl {
            field,
            url: raw.to_string(),
            reason,
        };

        let uri: Uri = raw.parse().map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?;

        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => {
                return Err(invalid(format!(
                    "unsupported scheme {other:?}, only http is supported"
                )));
            }
            None => return Err(invalid("missing scheme".to_string())),
        }

        let authority = uri
            .authority()
            .ok_or_else(|| invalid("missing host".to_string()))?;
        if authority.as_str().contains('@') {
            return Err(invalid("credentials in the URL are not supported".to_string()));
        }
        let host = authority.host();
        if host.is_empty() {
            return Err(invalid("missing host".to_string()));
        }
        if uri.query().is_some() {
            return Err(invalid("query strings are not allowed in a base URL".to_string()));
        }

        let host_header = match authority.port_u16() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Ok(Self {
            raw: raw.trim_end_matches('/').to_string(),
            host: host.to_string(),
            port: authority.port_u16().unwrap_or(80),
            host_header,
            prefix: uri.path().trim_end_matches('/').to_string(),
        })
    }

    /// `host:port` suitable for `TcpStream::connect` (resolves DNS names).
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Value for the `Host` request header.
    pub fn host_header(&self) -> &str {
        &self.host_header
    }

    /// Request target for an endpoint path, keeping any base path prefix.
    pub fn request_target(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.prefix)
        } else {
            format!("{}/{path}", self.prefix)
        }
    }
}

impl fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
