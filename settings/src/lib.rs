//! The settings package provides a mechanism to load TOML settings
//! while keeping the file definition stable from the config results.
//! It also offers canned settings for common patterns (logging, paths
//! inside the configuration home).
//!
//! Config fragments are conventionally put in the following structure:
//!
//!    mod my_fragment {
//!       pub struct Settings {}  // The validated settings.
//!
//!       mod wire {
//!         pub struct Settings {}  // What's parsed from TOML.
//!       }
//!    }
//!
//! Such a fragment can then be loaded using:
//!
//!   let anchor = settings::get_anchor("credentials".into(), None)?;
//!   let fragment : my_fragment::Settings = settings::load(&anchor)?;
//!
//! Settings files may hold secrets: they are written owner-only and
//! refused when group or others can read them.
use anyhow::Context;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    env, fs,
    path::{Component, Path, PathBuf},
};

/// Return the path to the specified anchored config.
pub fn path(anchor: &Anchor) -> PathBuf {
    Path::join(anchor.root.as_ref(), format!("{}.toml", &anchor.name))
}

/// Helper to load settings from a standard location.
pub fn load<T: Anchored>(anchor: &Anchor) -> anyhow::Result<T> {
    let file = path(anchor);
    platform::check_private_file(&file).map_err(SettingsError::from)?;
    let toml_data = fs::read_to_string(&file).context(format!("Config file is {:?}", &file))?;
    load_from_str(&toml_data, anchor)
}

/// Helper to save the underlying representation of data in the standard location.
pub fn save<T: serde::Serialize>(data: &T, anchor: &Anchor) -> anyhow::Result<()> {
    let file = path(anchor);
    platform::private_file(&file, &save_to_str(data)?).map_err(SettingsError::from)?;
    tracing::info!("saved settings to {:?}", &file);

    Ok(())
}

/// Anchor represents the location where configs and ancillary files
/// are stored. A valid Anchor validates permissions and ensures settings
/// are evaluated in the right location.
#[derive(Debug, Clone)]
pub struct Anchor {
    name: String,
    root: PathBuf,
}

impl Anchor {
    /// Name of the settings file, without extension.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configuration home.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Trait of a config object which has an underlying serializable
/// representation. The two objects are distinct, as the config object
/// proper has been sanitized and validated when "anchor()" has been
/// called.
pub trait Anchored: Sized {
    type Wire: DeserializeOwned;

    fn anchor(wire: &Self::Wire, anchor: &Anchor) -> anyhow::Result<Self>;
}

/// Common settings used by all processes.
pub mod process {
    use super::*;
    use logroller::{Compression, LogRollerBuilder, Rotation, RotationAge, TimeZone};
    use tracing::level_filters::LevelFilter;
    use tracing_subscriber::prelude::*;

    pub mod wire {
        use serde::{Deserialize, Serialize};

        #[derive(Debug, Default, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
        #[allow(clippy::upper_case_acronyms)]
        pub enum TracingLevel {
            TRACE,
            DEBUG,
            #[default]
            INFO,
            WARN,
            ERROR,
        }

        #[derive(Debug, Default, Deserialize, Serialize)]
        pub struct Settings {
            pub tracing_level: TracingLevel,
        }
    }

    pub struct Settings {
        level: LevelFilter,
        logfile: Option<PathBuf>,
    }

    impl Settings {
        pub fn trace_level(&self) -> LevelFilter {
            self.level
        }

        pub fn logfile(&self) -> Option<&Path> {
            self.logfile.as_deref()
        }
    }

    impl Anchored for Settings {
        type Wire = wire::Settings;

        fn anchor(wire: &Self::Wire, anchor: &Anchor) -> anyhow::Result<Self> {
            Ok(Settings {
                level: match wire.tracing_level {
                    wire::TracingLevel::TRACE => LevelFilter::TRACE,
                    wire::TracingLevel::DEBUG => LevelFilter::DEBUG,
                    wire::TracingLevel::INFO => LevelFilter::INFO,
                    wire::TracingLevel::WARN => LevelFilter::WARN,
                    wire::TracingLevel::ERROR => LevelFilter::ERROR,
                },
                logfile: Some(
                    anchor
                        .root
                        .join("logs")
                        .join(format!("{}.log", &anchor.name)),
                ),
            })
        }
    }

    /// Initializes the process with the provided settings.
    #[allow(dyn_drop)]
    pub fn init(settings: &Settings) -> anyhow::Result<()> {
        let mut layers = Vec::new();

        if let Some(ref logfile) = settings.logfile {
            let dir = logfile.parent().context("log dir is incomplete")?;
            let file = logfile.file_name().context("log dir is incomplete")?;
            platform::private_directory(dir).context("failed to create log dir")?;

            let appender = LogRollerBuilder::new(dir, Path::new(file))
                .rotation(Rotation::AgeBased(RotationAge::Daily))
                .max_keep_files(30)
                .time_zone(TimeZone::Local)
                .compression(Compression::Gzip)
                .build()?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_thread_ids(true)
                    .with_filter(settings.trace_level())
                    .boxed(),
            );
            std::mem::forget(guard); // Will log till the end of times.
        } else {
            layers.push(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_thread_ids(true)
                    .with_filter(settings.trace_level())
                    .boxed(),
            );
        }

        if let Ok(flame) = std::env::var(constants::env::FLAME) {
            let (flame_layer, guard) = tracing_flame::FlameLayer::with_file(flame)?;
            layers.push(flame_layer.boxed());
            std::mem::forget(guard); // Will measure till the end of times.
        }
        tracing_subscriber::registry().with(layers).init();
        Ok(())
    }

    /// Logs everything to stderr, for tools running without settings.
    #[allow(dyn_drop)]
    pub fn debug() -> anyhow::Result<()> {
        init(&Settings {
            level: LevelFilter::TRACE,
            logfile: None,
        })
    }
}

/// A ConfigPath represents a path _inside_ the config directory, for things
/// like PEM files stored next to the settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)] // Deserializes the PathBuf as if it was the field.
pub struct ConfigPath(PathBuf);

impl ConfigPath {
    /// Get the full path to the config file, resolved within the config context.
    /// Absolute paths and paths going up with ".." are refused.
    pub fn path(&self, anchor: &Anchor) -> Result<PathBuf, SettingsError> {
        let inside = self
            .0
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if !inside || self.0.as_os_str().is_empty() {
            return Err(SettingsError::OutsideConfigurationDirectory(
                self.0.clone(),
            ));
        }
        Ok(anchor.root.as_path().join(&self.0))
    }
}

impl From<PathBuf> for ConfigPath {
    fn from(path: PathBuf) -> ConfigPath {
        ConfigPath(path)
    }
}

impl From<&str> for ConfigPath {
    fn from(path: &str) -> ConfigPath {
        ConfigPath(path.into())
    }
}

/// Error returned by |load|.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Can't find configuration directory")]
    MissingConfigurationDirectory,
    #[error("{0:?} is not a path inside the configuration directory")]
    OutsideConfigurationDirectory(PathBuf),
    #[error("Configuration storage failed: {0}")]
    Storage(#[from] platform::PlatformError),
}

impl Anchor {
    fn new(name: String, root: PathBuf) -> Result<Anchor, SettingsError> {
        platform::private_directory(&root)?;
        Ok(Anchor { name, root })
    }
}

fn load_from_str<T: Anchored>(toml_data: &str, anchor: &Anchor) -> anyhow::Result<T> {
    let wire = toml::from_str::<T::Wire>(toml_data)?;
    T::anchor(&wire, anchor)
}

fn save_to_str<T: serde::Serialize>(data: &T) -> anyhow::Result<String> {
    Ok(toml::to_string(data)?)
}

/// Returns a valid anchor for the config.
pub fn get_anchor(name: String, default: Option<PathBuf>) -> Result<Anchor, SettingsError> {
    let root = default
        .or(home_override())
        .or(default_home())
        .ok_or(SettingsError::MissingConfigurationDirectory)?;
    Anchor::new(name, root)
}

fn home_override() -> Option<PathBuf> {
    Some(PathBuf::from(env::var(constants::env::HOME).ok()?))
}

fn default_home() -> Option<PathBuf> {
    let home = env::var("HOME").ok()?;
    let mut path = PathBuf::from(home);
    path.push(".thing");

    Some(path)
}
