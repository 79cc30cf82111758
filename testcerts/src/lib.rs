//! PEM fixtures for tests. The device certificate is signed by the root,
//! and the device key is its RSA (PKCS#1) private key. Certificates are
//! valid from 2020 to 2120, except for |expired_certificate()|.

/// Self-signed P-256 root CA, CN "Test Thing Root CA".
pub fn root() -> &'static str {
    include_str!("certs/root.pem")
}

/// Device certificate, CN "esp32_water_monitor", client auth only.
pub fn device_certificate() -> &'static str {
    include_str!("certs/device-cert.pem")
}

/// RSA private key matching |device_certificate()|.
pub fn device_key() -> &'static str {
    include_str!("certs/device-key.pem")
}

/// Same subject and key as |device_certificate()|, valid during 2000 only.
pub fn expired_certificate() -> &'static str {
    include_str!("certs/expired-cert.pem")
}

/// A PKCS#8 P-256 key unrelated to any of the certificates.
pub fn other_key() -> &'static str {
    include_str!("certs/other-key.pem")
}

/// A PKCS#8 P-521 key, a curve ring can't load.
pub fn p521_key() -> &'static str {
    include_str!("certs/p521-key.pem")
}
