//! PEM blobs as handed to TLS libraries, with the checks needed to tell
//! a provisioned value from a placeholder before trying to connect.
use crate::Secret;
use ring::signature::KeyPair;
use rustls_pemfile::Item;
use std::{fmt, io::BufReader};
use x509_parser::prelude::X509Certificate;

const DASHES: &str = "-----";
const BEGIN: &str = "-----BEGIN ";
const END: &str = "-----END ";

pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";
pub const KEY_LABELS: [&str; 3] = ["RSA PRIVATE KEY", "PRIVATE KEY", "EC PRIVATE KEY"];

/// Errors found while checking or parsing a PEM blob.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PemError {
    #[error("PEM text is empty")]
    Empty,
    #[error("PEM text does not start with a -----BEGIN <LABEL>----- line")]
    MissingBegin,
    #[error("PEM text does not end with a -----END {0}----- line")]
    MissingEnd(String),
    #[error("BEGIN label [{begin}] does not match END label [{end}]")]
    LabelMismatch { begin: String, end: String },
    #[error("{0} block has an empty body")]
    EmptyBody(String),
    #[error("expected {expected}, found a {found} block")]
    UnexpectedLabel { expected: String, found: String },
    #[error("PEM encoding is invalid: {0}")]
    Encoding(String),
    #[error("no {0} found in PEM text")]
    NotFound(&'static str),
    #[error("certificate can't be parsed: {0}")]
    Certificate(String),
    #[error("private key can't be parsed: {0}")]
    PrivateKey(String),
}

/// Checks the outer structure of a PEM blob: the first non-blank line is
/// a BEGIN marker, the last one a matching END marker, and there is
/// something in between. Returns the label.
///
/// Chains (several blocks back to back) are accepted as long as the
/// outermost markers agree; the content itself is checked by the parsers.
pub fn shape(text: &str) -> Result<String, PemError> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let first = lines.first().ok_or(PemError::Empty)?;
    let begin = first
        .strip_prefix(BEGIN)
        .and_then(|line| line.strip_suffix(DASHES))
        .ok_or(PemError::MissingBegin)?;
    if lines.len() < 2 {
        return Err(PemError::MissingEnd(begin.to_owned()));
    }
    let end = lines[lines.len() - 1]
        .strip_prefix(END)
        .and_then(|line| line.strip_suffix(DASHES))
        .ok_or_else(|| PemError::MissingEnd(begin.to_owned()))?;
    if begin != end {
        return Err(PemError::LabelMismatch {
            begin: begin.to_owned(),
            end: end.to_owned(),
        });
    }
    if lines.len() == 2 {
        return Err(PemError::EmptyBody(begin.to_owned()));
    }
    Ok(begin.to_owned())
}

/// PEM text, kept contiguous so it can be passed as-is to a TLS library.
///
/// The text is held as a Secret: private keys are PEM too, and nothing
/// distinguishes them before parsing.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Pem(Secret);

impl Pem {
    pub fn new<S: Into<String>>(text: S) -> Self {
        Pem(Secret::new(text))
    }

    pub fn as_str(&self) -> &str {
        self.0.expose()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Label of the outermost block, if the structure is sound.
    pub fn label(&self) -> Result<String, PemError> {
        shape(self.as_str())
    }

    /// Parses all the certificates of the blob. The leaf comes first for
    /// chains.
    pub fn certificates(&self) -> Result<Vec<Certificate>, PemError> {
        let label = self.label()?;
        if label != CERTIFICATE_LABEL {
            return Err(PemError::UnexpectedLabel {
                expected: CERTIFICATE_LABEL.to_owned(),
                found: label,
            });
        }
        let mut reader = BufReader::new(self.as_str().as_bytes());
        let mut certificates = vec![];
        for item in rustls_pemfile::read_all(&mut reader) {
            match item.map_err(|err| PemError::Encoding(err.to_string()))? {
                Item::X509Certificate(der) => {
                    certificates.push(Certificate::from_der(der.to_vec())?);
                }
                _ => continue,
            }
        }
        if certificates.is_empty() {
            return Err(PemError::NotFound("certificate"));
        }
        Ok(certificates)
    }

    /// Parses the first private key of the blob.
    pub fn private_key(&self) -> Result<PrivateKey, PemError> {
        let label = self.label()?;
        if !KEY_LABELS.contains(&label.as_str()) {
            return Err(PemError::UnexpectedLabel {
                expected: "a private key".to_owned(),
                found: label,
            });
        }
        let mut reader = BufReader::new(self.as_str().as_bytes());
        loop {
            let item = rustls_pemfile::read_one(&mut reader)
                .map_err(|err| PemError::Encoding(err.to_string()))?;
            let (kind, der) = match item {
                None => return Err(PemError::NotFound("private key")),
                Some(Item::Pkcs1Key(key)) => (KeyKind::Pkcs1, key.secret_pkcs1_der().to_vec()),
                Some(Item::Pkcs8Key(key)) => (KeyKind::Pkcs8, key.secret_pkcs8_der().to_vec()),
                Some(Item::Sec1Key(key)) => (KeyKind::Sec1, key.secret_sec1_der().to_vec()),
                Some(_) => continue,
            };
            if der.is_empty() {
                return Err(PemError::PrivateKey("key material is empty".to_owned()));
            }
            return Ok(PrivateKey { kind, der });
        }
    }
}

impl fmt::Debug for Pem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.label() {
            Ok(label) => write!(f, "Pem({}, {} bytes)", label, self.0.len()),
            Err(_) => write!(f, "Pem(malformed, {} bytes)", self.0.len()),
        }
    }
}

impl From<String> for Pem {
    fn from(text: String) -> Self {
        Pem::new(text)
    }
}

impl From<&str> for Pem {
    fn from(text: &str) -> Self {
        Pem::new(text)
    }
}

/// A parsed X.509 certificate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    summary: CertificateSummary,
}

/// What an operator wants to know about a certificate at a glance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateSummary {
    pub common_name: Option<String>,
    pub not_before: String,
    pub not_after: String,
    pub is_ca: bool,
    /// Whether the current time falls in the validity window.
    pub currently_valid: bool,
}

impl Certificate {
    fn from_der(der: Vec<u8>) -> Result<Self, PemError> {
        if der.is_empty() {
            return Err(PemError::Certificate("certificate is empty".to_owned()));
        }
        let summary = {
            let cert = parse(&der)?;
            let common_name = cert
                .subject()
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .map(str::to_owned);
            CertificateSummary {
                common_name,
                not_before: cert.validity().not_before.to_string(),
                not_after: cert.validity().not_after.to_string(),
                is_ca: cert.is_ca(),
                currently_valid: cert.validity().is_valid(),
            }
        };
        Ok(Certificate { der, summary })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn summary(&self) -> &CertificateSummary {
        &self.summary
    }
}

fn parse(der: &[u8]) -> Result<X509Certificate<'_>, PemError> {
    let (left, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|err| PemError::Certificate(err.to_string()))?;
    if !left.is_empty() {
        return Err(PemError::Certificate("certificate contains stray bytes".to_owned()));
    }
    Ok(cert)
}

/// Encoding of a private key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyKind {
    /// "RSA PRIVATE KEY"
    Pkcs1,
    /// "PRIVATE KEY"
    Pkcs8,
    /// "EC PRIVATE KEY"
    Sec1,
}

/// A decoded private key. The key material is zeroed on drop.
pub struct PrivateKey {
    kind: KeyKind,
    der: Vec<u8>,
}

impl PrivateKey {
    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn secret_der(&self) -> &[u8] {
        &self.der
    }

    /// Derives the public key, in the encoding certificates use for it.
    /// Returns None when the key format is not supported for derivation.
    fn public_key(&self) -> Result<Option<Vec<u8>>, PemError> {
        use ring::signature::{self, EcdsaKeyPair, Ed25519KeyPair, RsaKeyPair};

        let rejected = |err: ring::error::KeyRejected| PemError::PrivateKey(err.to_string());
        match self.kind {
            KeyKind::Pkcs1 => {
                let pair = RsaKeyPair::from_der(&self.der).map_err(rejected)?;
                Ok(Some(pair.public_key().as_ref().to_vec()))
            }
            KeyKind::Pkcs8 => {
                if let Ok(pair) = RsaKeyPair::from_pkcs8(&self.der) {
                    return Ok(Some(pair.public_key().as_ref().to_vec()));
                }
                let rng = ring::rand::SystemRandom::new();
                for alg in [
                    &signature::ECDSA_P256_SHA256_ASN1_SIGNING,
                    &signature::ECDSA_P384_SHA384_ASN1_SIGNING,
                ] {
                    if let Ok(pair) = EcdsaKeyPair::from_pkcs8(alg, &self.der, &rng) {
                        return Ok(Some(pair.public_key().as_ref().to_vec()));
                    }
                }
                // Other curves (P-521, ...) can't be checked.
                Ok(Ed25519KeyPair::from_pkcs8_maybe_unchecked(&self.der)
                    .ok()
                    .map(|pair| pair.public_key().as_ref().to_vec()))
            }
            KeyKind::Sec1 => Ok(None),
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PrivateKey({:?}, [REDACTED])", self.kind)
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.der.fill(0);
        std::hint::black_box(&self.der);
    }
}

/// Whether |key| is the private half of the key certified by |certificate|.
/// Returns None if the key type can't be checked.
pub fn key_matches(certificate: &Certificate, key: &PrivateKey) -> Result<Option<bool>, PemError> {
    let Some(public) = key.public_key()? else {
        tracing::debug!("can't derive the public key of a {:?} key", key.kind());
        return Ok(None);
    };
    let cert = parse(certificate.der())?;
    // The key is the trailing BIT STRING of the SubjectPublicKeyInfo.
    Ok(Some(cert.public_key().raw.ends_with(&public)))
}
