//! ---
//! rig_section: "01-core-functionality"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Shared primitives and utilities for the rig runtime."
//! rig_version: "v0.0.0-prealpha"
//! rig_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;
use tracing_subscriber::filter::EnvFilter;
use url::Url;

use crate::logging::LogFormat;

fn default_endpoint() -> String {
    "http://127.0.0.1:7080".to_owned()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_username() -> String {
    "rigadmin".to_owned()
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_poll_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_relogin() -> bool {
    true
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

/// Primary configuration object for a harness run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HarnessConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where a [`HarnessConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedHarnessConfig {
    pub config: HarnessConfig,
    pub source: PathBuf,
}

impl HarnessConfig {
    pub const ENV_CONFIG_PATH: &str = "RIG_CONFIG";

    /// Load configuration from disk, respecting the `RIG_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedHarnessConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedHarnessConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedHarnessConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<HarnessConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.credentials.validate()?;
        self.polling.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for HarnessConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: HarnessConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Remote server location and transport settings.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_request_timeout", rename = "request_timeout_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl ServerConfig {
    /// Parse the configured endpoint.
    pub fn endpoint_url(&self) -> Result<Url> {
        Url::parse(&self.endpoint)
            .with_context(|| format!("server endpoint '{}' is not a valid url", self.endpoint))
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.endpoint_url()?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "server endpoint must use http or https, found '{}'",
                url.scheme()
            ));
        }
        Ok(())
    }
}

/// Login credentials. The password may be given inline or through an
/// environment variable so it stays out of checked-in files.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_env: Option<String>,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            password: None,
            password_env: None,
        }
    }
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("password_env", &self.password_env)
            .finish()
    }
}

impl CredentialsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(anyhow!("credentials.username cannot be empty"));
        }
        Ok(())
    }

    /// Resolve the password, preferring the environment variable when set.
    pub fn resolve_password(&self) -> Result<String> {
        if let Some(var) = &self.password_env {
            return std::env::var(var)
                .with_context(|| format!("password environment variable {var} is not set"));
        }
        self.password.clone().ok_or_else(|| {
            anyhow!(
                "no password configured for '{}': set credentials.password or credentials.password_env",
                self.username
            )
        })
    }
}

/// Completion polling parameters.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval", rename = "interval_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub interval: Duration,
    #[serde(default = "default_poll_timeout", rename = "timeout_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            timeout: default_poll_timeout(),
        }
    }
}

impl PollingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(anyhow!("polling.timeout_ms must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_relogin")]
    pub relogin_on_expiry: bool,
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            relogin_on_expiry: default_relogin(),
            report_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Filter directive used when neither `RIG_LOG` nor `RUST_LOG` is set.
    #[serde(default)]
    pub level: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            level: None,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(level) = &self.level {
            EnvFilter::try_new(level)
                .map_err(|err| anyhow!("logging.level '{level}' is not a valid filter: {err}"))?;
        }
        if let Some(prefix) = &self.file_prefix {
            if prefix.is_empty() || prefix.contains(['/', '\\']) {
                return Err(anyhow!(
                    "logging.file_prefix must be a non-empty file name, found '{prefix}'"
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_full_document() {
        let config: HarnessConfig = r#"
            [server]
            endpoint = "https://mgmt.example.invalid:7443"
            request_timeout_ms = 5000

            [credentials]
            username = "ops"
            password = "secret"

            [polling]
            interval_ms = 250
            timeout_ms = 60000

            [runner]
            relogin_on_expiry = false
            report_path = "target/report.json"

            [logging]
            format = "structured-json"
            level = "debug,rig_client=trace"
        "#
        .parse()
        .unwrap();

        assert_eq!(config.server.request_timeout, Duration::from_secs(5));
        assert_eq!(config.polling.interval, Duration::from_millis(250));
        assert_eq!(config.polling.timeout, Duration::from_secs(60));
        assert!(!config.runner.relogin_on_expiry);
        assert_eq!(config.logging.format, LogFormat::StructuredJson);
        assert_eq!(config.logging.level.as_deref(), Some("debug,rig_client=trace"));
        assert_eq!(config.credentials.resolve_password().unwrap(), "secret");
    }

    #[test]
    fn defaults_apply_to_empty_document() {
        let config: HarnessConfig = "".parse().unwrap();
        assert_eq!(config.polling.interval, Duration::from_millis(1000));
        assert_eq!(config.polling.timeout, Duration::from_secs(300));
        assert!(config.runner.relogin_on_expiry);
        assert_eq!(config.credentials.username, "rigadmin");
    }

    #[test]
    fn rejects_zero_poll_timeout() {
        let err = "[polling]\ntimeout_ms = 0\n"
            .parse::<HarnessConfig>()
            .unwrap_err();
        assert!(err.to_string().contains("timeout_ms"));
    }

    #[test]
    fn rejects_unparsable_log_level() {
        let err = "[logging]\nlevel = \"rig_client=loudest\"\n"
            .parse::<HarnessConfig>()
            .unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn rejects_log_prefix_with_path_separator() {
        let err = "[logging]\nfile_prefix = \"../escape\"\n"
            .parse::<HarnessConfig>()
            .unwrap_err();
        assert!(err.to_string().contains("file_prefix"));
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let err = "[server]\nendpoint = \"ftp://example.invalid\"\n"
            .parse::<HarnessConfig>()
            .unwrap_err();
        assert!(err.to_string().contains("http"));
    }

    #[test]
    fn missing_password_is_reported() {
        let creds = CredentialsConfig::default();
        let err = creds.resolve_password().unwrap_err();
        assert!(err.to_string().contains("rigadmin"));
    }

    #[test]
    fn debug_output_redacts_password() {
        let creds = CredentialsConfig {
            password: Some("hunter2".into()),
            ..CredentialsConfig::default()
        };
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn loads_first_existing_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rig.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[polling]\ninterval_ms = 10").unwrap();

        let missing = dir.path().join("missing.toml");
        let loaded = HarnessConfig::load_with_source(&[missing, path.clone()]).unwrap();
        assert_eq!(loaded.source, path);
        assert_eq!(loaded.config.polling.interval, Duration::from_millis(10));
    }
}
