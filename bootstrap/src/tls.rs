//! Mutual TLS material: checks each PEM blob, then hands them over to
//! tonic which builds the rustls client configuration.
use crate::{BootstrapError, PemField, endpoint::Host};
use credentials::{
    DeviceCredentials,
    pem::{self, Certificate, PemError, PrivateKey},
};
use tonic::transport::{self, ClientTlsConfig, Endpoint, Identity};

fn malformed(field: PemField) -> impl Fn(PemError) -> BootstrapError {
    move |source| BootstrapError::MalformedPem { field, source }
}

pub fn ca_certificates(credentials: &DeviceCredentials) -> Result<Vec<Certificate>, BootstrapError> {
    credentials
        .ca_certificate()
        .certificates()
        .map_err(malformed(PemField::CaCertificate))
}

/// The device certificate, followed by its intermediates if any.
pub fn device_certificates(
    credentials: &DeviceCredentials,
) -> Result<Vec<Certificate>, BootstrapError> {
    credentials
        .device_certificate()
        .certificates()
        .map_err(malformed(PemField::DeviceCertificate))
}

pub fn private_key(credentials: &DeviceCredentials) -> Result<PrivateKey, BootstrapError> {
    credentials
        .private_key()
        .private_key()
        .map_err(malformed(PemField::PrivateKey))
}

/// Fails if |key| is not the key of |leaf|. Keys which can't be compared
/// are let through, the TLS library will catch them.
pub fn check_key(leaf: &Certificate, key: &PrivateKey) -> Result<(), BootstrapError> {
    match pem::key_matches(leaf, key).map_err(malformed(PemField::PrivateKey))? {
        Some(true) => Ok(()),
        Some(false) => Err(BootstrapError::InvalidCredential(
            "private key does not match the device certificate".to_owned(),
        )),
        None => {
            tracing::warn!(
                "can't verify that the {:?} private key matches the device certificate",
                key.kind()
            );
            Ok(())
        }
    }
}

/// Things worth telling the operator which don't prevent a connection
/// attempt.
pub fn warnings(
    credentials: &DeviceCredentials,
    ca: &[Certificate],
    device: &[Certificate],
) -> Vec<String> {
    let mut warnings = vec![];
    for (field, certificates) in [
        (PemField::CaCertificate, ca),
        (PemField::DeviceCertificate, device),
    ] {
        for cert in certificates {
            let summary = cert.summary();
            if !summary.currently_valid {
                warnings.push(format!(
                    "{} [{}] is only valid from {} to {}",
                    field,
                    summary.common_name.as_deref().unwrap_or("no CN"),
                    summary.not_before,
                    summary.not_after
                ));
            }
        }
    }
    if let Some(root) = ca.first() {
        if !root.summary().is_ca {
            warnings.push(format!(
                "{} [{}] is not a certificate authority",
                PemField::CaCertificate,
                root.summary().common_name.as_deref().unwrap_or("no CN")
            ));
        }
    }
    if let Some(leaf) = device.first() {
        let common_name = leaf.summary().common_name.as_deref();
        if common_name != Some(credentials.device_name()) {
            warnings.push(format!(
                "{} is issued to [{}], not to device [{}]",
                PemField::DeviceCertificate,
                common_name.unwrap_or("no CN"),
                credentials.device_name()
            ));
        }
    }
    warnings
}

/// Builds the mutual TLS endpoint of the broker. This doesn't connect.
pub fn endpoint(credentials: &DeviceCredentials, host: &Host) -> Result<Endpoint, BootstrapError> {
    let tls = ClientTlsConfig::new()
        .domain_name(host.server_name())
        .ca_certificate(transport::Certificate::from_pem(
            credentials.ca_certificate().as_str(),
        ))
        .identity(Identity::from_pem(
            credentials.device_certificate().as_str(),
            credentials.private_key().as_str(),
        ));
    let endpoint = Endpoint::from_shared(host.uri(credentials.broker_port()))?.tls_config(tls)?;
    Ok(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use credentials::Builder;

    fn credentials(ca: &str, cert: &str, key: &str) -> anyhow::Result<DeviceCredentials> {
        Builder::default()
            .device_name("esp32_water_monitor")
            .wifi_ssid("garden")
            .wifi_password("correct horse")
            .broker_endpoint("a1b2c3.iot.us-east-1.amazonaws.com")
            .ca_certificate(ca)
            .device_certificate(cert)
            .private_key(key)
            .build()
    }

    fn host() -> anyhow::Result<Host> {
        Ok(Host::parse("a1b2c3.iot.us-east-1.amazonaws.com")?)
    }

    #[test]
    fn amazon_root_is_accepted() -> anyhow::Result<()> {
        let creds = credentials(
            constants::AMAZON_ROOT_CA_1,
            testcerts::device_certificate(),
            testcerts::device_key(),
        )?;
        let endpoint = endpoint(&creds, &host()?)?;
        assert_eq!(
            endpoint.uri().host(),
            Some("a1b2c3.iot.us-east-1.amazonaws.com")
        );
        assert_eq!(endpoint.uri().port_u16(), Some(8883));
        Ok(())
    }

    #[test]
    fn tls_library_rejects_empty_key() -> anyhow::Result<()> {
        let creds = credentials(
            testcerts::root(),
            testcerts::device_certificate(),
            "",
        )?;
        assert!(matches!(
            endpoint(&creds, &host()?),
            Err(BootstrapError::Tls(_))
        ));
        Ok(())
    }

    #[test]
    fn each_field_is_attributed() -> anyhow::Result<()> {
        let template = DeviceCredentials::template();
        assert!(matches!(
            ca_certificates(&template),
            Err(BootstrapError::MalformedPem {
                field: PemField::CaCertificate,
                ..
            })
        ));
        assert!(matches!(
            device_certificates(&template),
            Err(BootstrapError::MalformedPem {
                field: PemField::DeviceCertificate,
                ..
            })
        ));
        assert!(matches!(
            private_key(&template),
            Err(BootstrapError::MalformedPem {
                field: PemField::PrivateKey,
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn key_checks() -> anyhow::Result<()> {
        let creds = credentials(
            testcerts::root(),
            testcerts::device_certificate(),
            testcerts::other_key(),
        )?;
        let device = device_certificates(&creds)?;
        assert!(matches!(
            check_key(&device[0], &private_key(&creds)?),
            Err(BootstrapError::InvalidCredential(_))
        ));

        let creds = credentials(
            testcerts::root(),
            testcerts::device_certificate(),
            testcerts::device_key(),
        )?;
        check_key(&device[0], &private_key(&creds)?)?;

        // A key ring can't load is left to the TLS library.
        let creds = credentials(
            testcerts::root(),
            testcerts::device_certificate(),
            testcerts::p521_key(),
        )?;
        check_key(&device[0], &private_key(&creds)?)?;
        Ok(())
    }

    #[test]
    fn no_warnings_for_good_material() -> anyhow::Result<()> {
        let creds = credentials(
            testcerts::root(),
            testcerts::device_certificate(),
            testcerts::device_key(),
        )?;
        let warnings = warnings(
            &creds,
            &ca_certificates(&creds)?,
            &device_certificates(&creds)?,
        );
        assert!(warnings.is_empty(), "{:?}", warnings);
        Ok(())
    }

    #[test]
    fn warn_about_odd_material() -> anyhow::Result<()> {
        // A device certificate as CA, an expired device certificate.
        let creds = credentials(
            testcerts::device_certificate(),
            testcerts::expired_certificate(),
            testcerts::device_key(),
        )?;
        let warnings = warnings(
            &creds,
            &ca_certificates(&creds)?,
            &device_certificates(&creds)?,
        );
        assert_eq!(warnings.len(), 2, "{:?}", warnings);
        assert!(warnings[0].starts_with("device certificate [esp32_water_monitor] is only valid"));
        assert!(warnings[1].ends_with("is not a certificate authority"));
        Ok(())
    }
}
