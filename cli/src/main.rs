use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use credentials::{DeviceCredentials, Pem};
use reading::{Measurements, Reading};
use settings::process;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration home, defaults to $THING_HOME or ~/.thing.
    #[arg(long, global = true)]
    home: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Provisions the credentials file. The Wi-Fi password is read from
    /// THING_WIFI_PASSWORD.
    Init {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        ssid: String,
        #[arg(short, long)]
        endpoint: String,
        #[arg(short, long)]
        port: Option<u16>,
        /// Root CA of the broker.
        #[arg(long)]
        ca: PathBuf,
        /// Device certificate.
        #[arg(short, long)]
        cert: PathBuf,
        /// Private key of the device certificate.
        #[arg(short, long)]
        key: PathBuf,
        #[arg(short, long)]
        overwrite: bool,
    },
    /// Prints the credentials, secrets redacted.
    Show {
        #[arg(long, value_enum, default_value_t = Source::File)]
        source: Source,
    },
    /// Checks that the credentials can be used to connect.
    Check {
        #[arg(long, value_enum, default_value_t = Source::File)]
        source: Source,
        /// Also resolve the broker endpoint.
        #[arg(short, long)]
        resolve: bool,
    },
    /// Prints the settings file of unprovisioned credentials.
    Template,
    /// Prints the payload this device publishes for a water quality reading.
    Reading {
        #[arg(long, value_enum, default_value_t = Source::File)]
        source: Source,
        #[arg(long)]
        ph: f64,
        /// Total dissolved solids, in ppm.
        #[arg(long)]
        solids: f64,
        /// Turbidity, in NTU.
        #[arg(long)]
        turbidity: f64,
    },
}

/// Where credentials come from.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Source {
    /// The credentials file in the configuration home.
    File,
    /// THING_* environment variables.
    Env,
    /// Values built into this binary.
    Compiled,
    /// The unprovisioned template.
    Template,
}

#[derive(Error, Debug)]
enum Error {
    #[error("File {0} already exists. Pass --overwrite to ignore.")]
    AlreadyExists(PathBuf),
    #[error("Set the Wi-Fi password in {0}, empty for an open network.")]
    MissingPassword(&'static str),
    #[error("Found {0} problem(s) with the credentials")]
    CheckFailed(usize),
}

fn init(
    home: Option<PathBuf>,
    builder: credentials::Builder,
    overwrite: bool,
) -> anyhow::Result<()> {
    let anchor = credentials::anchor(home)?;
    let path = credentials::Builder::path(&anchor);
    if path.exists() && !overwrite {
        Err(Error::AlreadyExists(path))?;
    }
    builder.save(&anchor)
}

fn read_pem(path: &Path) -> anyhow::Result<Pem> {
    let text = std::fs::read_to_string(path).context(format!("can't read {:?}", path))?;
    Ok(Pem::new(text))
}

fn wifi_password() -> anyhow::Result<String> {
    let var = constants::env::WIFI_PASSWORD;
    match std::env::var(var) {
        Ok(password) => Ok(password),
        Err(std::env::VarError::NotPresent) => Err(Error::MissingPassword(var).into()),
        Err(err) => Err(err).context(var),
    }
}

fn load_credentials(
    source: Source,
    settings: Option<&credentials::Settings>,
) -> anyhow::Result<DeviceCredentials> {
    match source {
        Source::File => Ok(settings
            .context("credentials are not provisioned yet, see `init`")?
            .credentials()
            .clone()),
        Source::Env => Ok(credentials::env::load()?),
        Source::Compiled => Ok(DeviceCredentials::compiled()),
        Source::Template => Ok(DeviceCredentials::template()),
    }
}

fn describe_pem(pem: &Pem, certificate: bool) -> Vec<String> {
    if certificate {
        match pem.certificates() {
            Ok(certificates) => certificates
                .iter()
                .map(|cert| {
                    let summary = cert.summary();
                    format!(
                        "{}{}, valid from {} to {}",
                        summary.common_name.as_deref().unwrap_or("(no CN)"),
                        if summary.is_ca { " (CA)" } else { "" },
                        summary.not_before,
                        summary.not_after
                    )
                })
                .collect(),
            Err(err) => vec![format!("unusable: {}", err)],
        }
    } else {
        match pem.private_key() {
            Ok(key) => vec![format!("{:?} key", key.kind())],
            Err(err) => vec![format!("unusable: {}", err)],
        }
    }
}

fn show(credentials: &DeviceCredentials) -> Vec<String> {
    let mut lines = vec![
        format!("Device name:        {}", credentials.device_name()),
        format!("Wi-Fi SSID:         {}", credentials.wifi_ssid()),
        format!("Wi-Fi password:     {}", credentials.wifi_password()),
        format!(
            "Broker:             {}:{}",
            credentials.broker_endpoint(),
            credentials.broker_port()
        ),
    ];
    for (title, pem, certificate) in [
        ("CA certificate:", credentials.ca_certificate(), true),
        ("Device certificate:", credentials.device_certificate(), true),
        ("Private key:", credentials.private_key(), false),
    ] {
        for line in describe_pem(pem, certificate) {
            lines.push(format!("{:<20}{}", title, line));
        }
    }
    lines
}

async fn check(credentials: &DeviceCredentials, resolve: bool) -> anyhow::Result<()> {
    let mut report = bootstrap::check(credentials);
    if resolve {
        let reachable = bootstrap::reachable(credentials, RESOLVE_TIMEOUT).await;
        if let Ok(addresses) = &reachable {
            println!(
                "{} resolves to {:?}",
                credentials.broker_endpoint(),
                addresses
            );
        }
        report.add(reachable.map(|_| ()));
    }
    for warning in report.warnings() {
        println!("warning: {}", warning);
    }
    for problem in report.problems() {
        println!("error: {}", problem);
    }
    if !report.is_ok() {
        Err(Error::CheckFailed(report.problems().len()))?;
    }
    println!("{} is ready to connect", credentials.device_name());
    Ok(())
}

/// A reading published under the device name.
fn payload(credentials: &DeviceCredentials, data: Measurements) -> anyhow::Result<String> {
    let reading = Reading::new(credentials.device_name(), data)?;
    Ok(reading.to_json()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // The CLI is responsible for creating the credentials file, so we
    // can't consider its absence an error.
    let settings = match credentials::load(args.home.clone()) {
        Ok(settings) => {
            process::init(settings.process())?;
            Some(settings)
        }
        Err(err) => {
            process::debug()?;
            tracing::info!("failed to load credentials: {:#}", err);
            None
        }
    };

    match args.command {
        Commands::Init {
            name,
            ssid,
            endpoint,
            port,
            ca,
            cert,
            key,
            overwrite,
        } => {
            let mut builder = credentials::Builder::default()
                .device_name(name)
                .wifi_ssid(ssid)
                .wifi_password(wifi_password()?)
                .broker_endpoint(endpoint)
                .ca_certificate(read_pem(&ca)?)
                .device_certificate(read_pem(&cert)?)
                .private_key(read_pem(&key)?);
            if let Some(port) = port {
                builder = builder.broker_port(port);
            }
            let report = bootstrap::check(&builder.clone().build()?);
            for problem in report.problems() {
                tracing::warn!("{}", problem);
            }
            init(args.home, builder, overwrite)?;
        }
        Commands::Show { source } => {
            for line in show(&load_credentials(source, settings.as_ref())?) {
                println!("{}", line);
            }
        }
        Commands::Check { source, resolve } => {
            check(&load_credentials(source, settings.as_ref())?, resolve).await?;
        }
        Commands::Template => {
            print!("{}", credentials::to_toml(&DeviceCredentials::template())?);
        }
        Commands::Reading {
            source,
            ph,
            solids,
            turbidity,
        } => {
            let creds = load_credentials(source, settings.as_ref())?;
            println!(
                "{}",
                payload(
                    &creds,
                    Measurements {
                        ph,
                        solids,
                        turbidity
                    }
                )?
            );
        }
    }
    Ok(())
}
