//! Credentials injected through the environment at startup.
//!
//! Every PEM value can be given either as text in THING_<NAME>, or as a
//! path to a file in THING_<NAME>_FILE. The text variable wins when both
//! are set.
use crate::{DeviceCredentials, Pem, Secret};
use constants::env;
use std::{env::VarError, path::PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("environment variable {0} is not set")]
    Missing(String),
    #[error("environment variable {0} is not valid unicode")]
    NotUnicode(String),
    #[error("environment variable {0} is invalid: {1}")]
    Invalid(String, String),
    #[error("can't read {path:?} named by {var}")]
    File {
        var: String,
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Reads the credentials from the process environment.
pub fn load() -> Result<DeviceCredentials, EnvError> {
    load_from(|name| std::env::var(name))
}

/// Reads the credentials through |lookup|, which behaves like
/// std::env::var.
pub fn load_from<F>(lookup: F) -> Result<DeviceCredentials, EnvError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let reader = Reader { lookup };
    let broker_port = match reader.optional(env::BROKER_PORT)? {
        Some(text) => crate::port::parse(&text).ok_or_else(|| {
            EnvError::Invalid(
                env::BROKER_PORT.to_owned(),
                format!("{:?} is not a port between 1 and 65535", text),
            )
        })?,
        None => constants::BROKER_PORT,
    };
    let credentials = DeviceCredentials {
        device_name: reader.required(env::DEVICE_NAME)?,
        wifi_ssid: reader.required(env::WIFI_SSID)?,
        wifi_password: Secret::new(reader.required(env::WIFI_PASSWORD)?),
        broker_endpoint: reader.required(env::BROKER_ENDPOINT)?,
        broker_port,
        ca_certificate: reader.pem(env::CA_CERTIFICATE)?,
        device_certificate: reader.pem(env::DEVICE_CERTIFICATE)?,
        private_key: reader.pem(env::PRIVATE_KEY)?,
    };
    tracing::info!(
        "loaded credentials of {} from the environment",
        credentials.device_name()
    );
    Ok(credentials)
}

struct Reader<F> {
    lookup: F,
}

impl<F> Reader<F>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    fn optional(&self, name: &str) -> Result<Option<String>, EnvError> {
        match (self.lookup)(name) {
            Ok(value) => Ok(Some(value)),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => Err(EnvError::NotUnicode(name.to_owned())),
        }
    }

    fn required(&self, name: &str) -> Result<String, EnvError> {
        self.optional(name)?
            .ok_or_else(|| EnvError::Missing(name.to_owned()))
    }

    fn pem(&self, name: &str) -> Result<Pem, EnvError> {
        if let Some(text) = self.optional(name)? {
            return Ok(Pem::new(text));
        }
        let var = format!("{}{}", name, env::FILE_SUFFIX);
        let path: PathBuf = self
            .optional(&var)?
            .ok_or_else(|| EnvError::Missing(format!("{} or {}", name, var)))?
            .into();
        let text = std::fs::read_to_string(&path).map_err(|source| EnvError::File {
            var,
            path,
            source,
        })?;
        Ok(Pem::new(text))
    }
}
