//! Configuration: built-in defaults, optional TOML file, resolved settings.
//!
//! Priority (highest first): CLI flags → `config.toml` → defaults. CLI merging
//! happens in the binary; this module owns the file format and the defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::auth::{StoreError, default_data_dir};
use crate::target::DEFAULT_BASE_URL;

/// Default wall-clock budget for the browser login polling loop.
pub const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 120;
/// Default delay between polling iterations.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 2;
/// Default probe connect timeout.
pub const DEFAULT_PROBE_CONNECT_TIMEOUT_SECS: u64 = 5;
/// Default probe read timeout.
pub const DEFAULT_PROBE_READ_TIMEOUT_SECS: u64 = 10;

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config value for `{field}`: {value}. Expected range: {expected}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        expected: &'static str,
    },
    #[error(transparent)]
    DataDir(#[from] StoreError),
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Returns the tracing filter directive for this verbosity.
    #[must_use]
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

/// TOML-backed file configuration. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Target service base URL.
    pub base_url: Option<String>,
    /// Polling loop budget in seconds.
    pub login_timeout_secs: Option<u64>,
    /// Delay between polling iterations in seconds.
    pub check_interval_secs: Option<u64>,
    /// Probe connect timeout in seconds.
    pub probe_connect_timeout_secs: Option<u64>,
    /// Probe read timeout in seconds.
    pub probe_read_timeout_secs: Option<u64>,
    /// Command used to open the login page, tried before the platform openers.
    pub browser_command: Option<String>,
    /// Delete session files once they are older than 30 days.
    pub delete_stale_sessions: Option<bool>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] for the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_range("login_timeout_secs", self.login_timeout_secs, 10, 3600)?;
        validate_range("check_interval_secs", self.check_interval_secs, 1, 60)?;
        validate_range(
            "probe_connect_timeout_secs",
            self.probe_connect_timeout_secs,
            1,
            60,
        )?;
        validate_range(
            "probe_read_timeout_secs",
            self.probe_read_timeout_secs,
            1,
            120,
        )?;
        Ok(())
    }
}

fn validate_range(
    field: &'static str,
    value: Option<u64>,
    min: u64,
    max: u64,
) -> Result<(), ConfigError> {
    let Some(value) = value else {
        return Ok(());
    };
    if (min..=max).contains(&value) {
        return Ok(());
    }
    let expected = match field {
        "login_timeout_secs" => "10..=3600",
        "check_interval_secs" | "probe_connect_timeout_secs" => "1..=60",
        _ => "1..=120",
    };
    Err(ConfigError::OutOfRange {
        field,
        value,
        expected,
    })
}

/// Timing of one acquisition cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionSettings {
    /// Polling loop deadline after the browser is opened.
    pub login_timeout: Duration,
    /// Delay between polling iterations; also the cancellation granularity.
    pub check_interval: Duration,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            login_timeout: Duration::from_secs(DEFAULT_LOGIN_TIMEOUT_SECS),
            check_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS),
        }
    }
}

/// Network timeouts for extraction probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeHttpSettings {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for ProbeHttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_PROBE_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_PROBE_READ_TIMEOUT_SECS),
        }
    }
}

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: String,
    pub acquisition: AcquisitionSettings,
    pub probe_http: ProbeHttpSettings,
    pub browser_command: Option<String>,
    pub delete_stale_sessions: bool,
    pub verbosity: Option<VerbositySetting>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            acquisition: AcquisitionSettings::default(),
            probe_http: ProbeHttpSettings::default(),
            browser_command: None,
            delete_stale_sessions: false,
            verbosity: None,
        }
    }
}

impl Settings {
    /// Applies file values on top of the defaults.
    #[must_use]
    pub fn from_file_config(file: Option<&FileConfig>) -> Self {
        let mut settings = Self::default();
        let Some(file) = file else {
            return settings;
        };

        if let Some(base_url) = &file.base_url {
            settings.base_url.clone_from(base_url);
        }
        if let Some(secs) = file.login_timeout_secs {
            settings.acquisition.login_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.check_interval_secs {
            settings.acquisition.check_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = file.probe_connect_timeout_secs {
            settings.probe_http.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.probe_read_timeout_secs {
            settings.probe_http.read_timeout = Duration::from_secs(secs);
        }
        settings.browser_command.clone_from(&file.browser_command);
        settings.delete_stale_sessions = file.delete_stale_sessions.unwrap_or(false);
        settings.verbosity = file.verbosity;
        settings
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// Config path consulted.
    pub path: PathBuf,
    /// Parsed file config when the file exists.
    pub config: Option<FileConfig>,
}

/// Default config path: `<data dir>/config.toml`.
///
/// # Errors
///
/// Returns [`ConfigError::DataDir`] if no data directory can be resolved.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(default_data_dir()?.join(CONFIG_FILE_NAME))
}

/// Loads `path` if it exists; a missing file is not an error.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file cannot be read, parsed, or validated.
pub fn load_config(path: &Path) -> Result<LoadedConfig, ConfigError> {
    if !path.is_file() {
        debug!(path = %path.display(), "no config file; using defaults");
        return Ok(LoadedConfig {
            path: path.to_path_buf(),
            config: None,
        });
    }

    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config_str(&raw).map_err(|error| match error {
        ConfigError::Parse { source, .. } => ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })?;
    debug!(path = %path.display(), "loaded config file");
    Ok(LoadedConfig {
        path: path.to_path_buf(),
        config: Some(config),
    })
}

fn parse_config_str(raw: &str) -> Result<FileConfig, ConfigError> {
    let config = toml::from_str::<FileConfig>(raw).map_err(|source| ConfigError::Parse {
        path: PathBuf::new(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}
