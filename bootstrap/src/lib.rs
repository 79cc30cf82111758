//! Turns DeviceCredentials into something a network stack can use, and
//! reports why it can't when the credentials are not provisioned.
//!
//! Failures fall in three categories:
//!   - MalformedPem: a certificate or key doesn't parse,
//!   - InvalidCredential: the device name, Wi-Fi credentials or key pair
//!     would be refused,
//!   - UnreachableEndpoint: the broker endpoint isn't a host, or doesn't
//!     resolve.
use credentials::{DeviceCredentials, pem::PemError};
use endpoint::Host;
use std::{fmt, net::SocketAddr, time::Duration};
use tonic::transport::Endpoint;

pub mod endpoint;
pub mod tls;
pub mod wifi;

/// AWS IoT thing names are at most 128 characters.
pub const MAX_DEVICE_NAME_LEN: usize = 128;

/// The PEM blobs of DeviceCredentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PemField {
    CaCertificate,
    DeviceCertificate,
    PrivateKey,
}

impl fmt::Display for PemField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PemField::CaCertificate => write!(f, "CA certificate"),
            PemField::DeviceCertificate => write!(f, "device certificate"),
            PemField::PrivateKey => write!(f, "private key"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("{field} is malformed: {source}")]
    MalformedPem {
        field: PemField,
        #[source]
        source: PemError,
    },
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),
    #[error("Broker endpoint is unreachable: {0}")]
    UnreachableEndpoint(String),
    #[error("TLS configuration was rejected")]
    Tls(#[from] tonic::transport::Error),
}

/// Device names double as MQTT client ids: 1 to 128 characters among
/// letters, digits, ':', '_' and '-'.
pub fn check_device_name(name: &str) -> Result<(), BootstrapError> {
    if name.is_empty() {
        return Err(BootstrapError::InvalidCredential(
            "device name is empty".to_owned(),
        ));
    }
    if name.len() > MAX_DEVICE_NAME_LEN {
        return Err(BootstrapError::InvalidCredential(format!(
            "device name is longer than {} characters",
            MAX_DEVICE_NAME_LEN
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '-')))
    {
        return Err(BootstrapError::InvalidCredential(format!(
            "device name [{}] contains {:?}",
            name, c
        )));
    }
    Ok(())
}

/// Everything needed to open the broker connection.
#[derive(Debug, Clone)]
pub struct Target {
    client_id: String,
    host: Host,
    port: u16,
    endpoint: Endpoint,
}

impl Target {
    /// Identifier to present to the broker, the device name.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The broker endpoint, configured for mutual TLS.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

/// Validates the credentials and builds the TLS configuration, stopping
/// at the first problem. Nothing is sent on the network.
pub fn prepare(credentials: &DeviceCredentials) -> Result<Target, BootstrapError> {
    check_device_name(credentials.device_name())?;
    wifi::check_ssid(credentials.wifi_ssid())?;
    wifi::check_passphrase(credentials.wifi_password())?;
    let host = Host::parse(credentials.broker_endpoint())?;

    let ca = tls::ca_certificates(credentials)?;
    let device = tls::device_certificates(credentials)?;
    let key = tls::private_key(credentials)?;
    tls::check_key(&device[0], &key)?;
    for warning in tls::warnings(credentials, &ca, &device) {
        tracing::warn!("{}", warning);
    }

    let endpoint = tls::endpoint(credentials, &host)?;
    tracing::info!(
        "{} ready to connect to {}",
        credentials.device_name(),
        host.uri(credentials.broker_port())
    );
    Ok(Target {
        client_id: credentials.device_name().to_owned(),
        host,
        port: credentials.broker_port(),
        endpoint,
    })
}

/// Resolves the broker endpoint.
pub async fn reachable(
    credentials: &DeviceCredentials,
    timeout: Duration,
) -> Result<Vec<SocketAddr>, BootstrapError> {
    let host = Host::parse(credentials.broker_endpoint())?;
    endpoint::resolve(&host, credentials.broker_port(), timeout).await
}

/// Outcome of |check()|.
#[derive(Debug, Default)]
pub struct Report {
    problems: Vec<BootstrapError>,
    warnings: Vec<String>,
}

impl Report {
    /// Whether the device has a chance to connect.
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn problems(&self) -> &[BootstrapError] {
        &self.problems
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Records the result of a network check, see |reachable()|.
    pub fn add(&mut self, result: Result<(), BootstrapError>) {
        self.keep(result);
    }

    fn keep<T>(&mut self, result: Result<T, BootstrapError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.problems.push(err);
                None
            }
        }
    }
}

/// Runs every offline check, unlike |prepare()| which stops at the first
/// problem.
pub fn check(credentials: &DeviceCredentials) -> Report {
    let mut report = Report::default();
    report.keep(check_device_name(credentials.device_name()));
    report.keep(wifi::check_ssid(credentials.wifi_ssid()));
    report.keep(wifi::check_passphrase(credentials.wifi_password()));
    let host = report.keep(Host::parse(credentials.broker_endpoint()));

    let ca = report.keep(tls::ca_certificates(credentials));
    let device = report.keep(tls::device_certificates(credentials));
    let key = report.keep(tls::private_key(credentials));
    let (Some(ca), Some(device), Some(key)) = (ca, device, key) else {
        return report;
    };
    let matching = report.keep(tls::check_key(&device[0], &key)).is_some();
    report.warnings = tls::warnings(credentials, &ca, &device);

    if let (Some(host), true) = (host, matching) {
        report.keep(tls::endpoint(credentials, &host));
    }
    report
}
