//! Broker endpoint checks: the hostname must be usable for SNI and
//! certificate verification, and resolvable before a connection is tried.
use crate::BootstrapError;
use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    time::Duration,
};

const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// A syntactically valid broker host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    Ip(IpAddr),
    Dns(String),
}

impl Host {
    /// Parses a hostname (RFC 1123) or an IP literal. IPv6 literals may
    /// be bracketed.
    pub fn parse(endpoint: &str) -> Result<Host, BootstrapError> {
        let unbracketed = endpoint
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(endpoint);
        if let Ok(ip) = unbracketed.parse::<IpAddr>() {
            return Ok(Host::Ip(ip));
        }
        let name = endpoint.strip_suffix('.').unwrap_or(endpoint);
        let invalid = |reason: &str| {
            BootstrapError::UnreachableEndpoint(format!("[{}] {}", endpoint, reason))
        };
        if name.is_empty() {
            return Err(invalid("is empty"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(invalid("is too long"));
        }
        for label in name.split('.') {
            if label.is_empty() || label.len() > MAX_LABEL_LEN {
                return Err(invalid("has a label of invalid length"));
            }
            if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                return Err(invalid("is not a hostname or IP address"));
            }
            if label.starts_with('-') || label.ends_with('-') {
                return Err(invalid("has a label starting or ending with '-'"));
            }
        }
        // A name made of digits only would be read as an IPv4 address.
        if name.split('.').all(|label| label.chars().all(|c| c.is_ascii_digit())) {
            return Err(invalid("is neither a valid IP address nor a hostname"));
        }
        Ok(Host::Dns(name.to_ascii_lowercase()))
    }

    /// The name the broker certificate is verified against.
    pub fn server_name(&self) -> String {
        match self {
            Host::Ip(ip) => ip.to_string(),
            Host::Dns(name) => name.clone(),
        }
    }

    /// HTTPS URI of the broker on |port|.
    pub fn uri(&self, port: u16) -> String {
        format!("https://{}:{}", self, port)
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Host::Ip(IpAddr::V6(ip)) => write!(f, "[{}]", ip),
            Host::Ip(IpAddr::V4(ip)) => write!(f, "{}", ip),
            Host::Dns(name) => write!(f, "{}", name),
        }
    }
}

/// Resolves |host| to socket addresses, failing if none is found within
/// |timeout|.
pub async fn resolve(
    host: &Host,
    port: u16,
    timeout: Duration,
) -> Result<Vec<SocketAddr>, BootstrapError> {
    if let Host::Ip(ip) = host {
        return Ok(vec![SocketAddr::new(*ip, port)]);
    }
    let name = host.server_name();
    let lookup = tokio::net::lookup_host((name.as_str(), port));
    let addresses: Vec<SocketAddr> = tokio::time::timeout(timeout, lookup)
        .await
        .map_err(|_| {
            BootstrapError::UnreachableEndpoint(format!(
                "resolving {} timed out after {:?}",
                name, timeout
            ))
        })?
        .map_err(|err| {
            BootstrapError::UnreachableEndpoint(format!("can't resolve {}: {}", name, err))
        })?
        .collect();
    if addresses.is_empty() {
        return Err(BootstrapError::UnreachableEndpoint(format!(
            "{} has no address",
            name
        )));
    }
    tracing::debug!("{} resolved to {:?}", name, addresses);
    Ok(addresses)
}
