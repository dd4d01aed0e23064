//! Deployment configuration.
//!
//! Loaded from TOML. Every section has defaults matching the stock nexus
//! layout, so a config file only needs `[target] host`.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable that overrides `target.host`.
pub const HOST_ENV: &str = "NEXUS_DEPLOY_HOST";

/// Config file name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "nexus-deploy.toml";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("No deployment host configured (set [target] host or NEXUS_DEPLOY_HOST)")]
    MissingHost,
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Remote login target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetConfig {
    /// `user@host` passed to scp/ssh.
    pub host: String,
    /// SSH port; `None` leaves the client default.
    pub port: Option<u16>,
    /// When false, host keys are neither checked nor recorded.
    pub verify_host_key: bool,
    /// scp executable name or path.
    pub scp_program: String,
    /// ssh executable name or path.
    pub ssh_program: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: None,
            verify_host_key: false,
            scp_program: "scp".into(),
            ssh_program: "ssh".into(),
        }
    }
}

/// Local build outputs and packaging paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocalLayout {
    /// Prebuilt executable.
    pub executable: PathBuf,
    /// Static asset directory.
    pub assets: PathBuf,
    /// Staging directory, recreated every run.
    pub staging_dir: PathBuf,
    /// Bundle file, recreated every run.
    pub bundle: PathBuf,
}

impl Default for LocalLayout {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("nexus/bin/nexus-linux"),
            assets: PathBuf::from("nexus/public"),
            staging_dir: PathBuf::from("deploy_stage"),
            bundle: PathBuf::from("payload.tar.gz"),
        }
    }
}

impl LocalLayout {
    /// File name of the executable inside the bundle.
    ///
    /// # Errors
    /// Returns error if the executable path has no file name.
    pub fn executable_name(&self) -> Result<String, ConfigError> {
        file_name(&self.executable)
    }

    /// Directory name of the asset tree inside the bundle.
    ///
    /// # Errors
    /// Returns error if the asset path has no file name.
    pub fn assets_name(&self) -> Result<String, ConfigError> {
        file_name(&self.assets)
    }
}

fn file_name(path: &Path) -> Result<String, ConfigError> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ConfigError::Invalid(format!("path has no file name: {}", path.display())))
}

/// Remote install layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteLayout {
    /// Where the bundle is uploaded.
    pub bundle_path: String,
    /// Temporary extraction directory.
    pub work_dir: String,
    /// Installed executable path.
    pub executable_path: String,
    /// Parent directory that receives the asset tree.
    pub assets_dir: String,
    /// `user:group` owning the installed assets.
    pub owner: String,
    /// systemd unit stopped before and started after the install.
    pub service: String,
}

impl Default for RemoteLayout {
    fn default() -> Self {
        Self {
            bundle_path: "/tmp/payload.tar.gz".into(),
            work_dir: "/tmp/ut_update".into(),
            executable_path: "/usr/bin/ultimate-terminal-nexus".into(),
            assets_dir: "/usr/share/ultimate-terminal".into(),
            owner: "utnexus:utnexus".into(),
            service: "ultimate-terminal-nexus".into(),
        }
    }
}

/// PTY session tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    /// Read loop poll granularity in milliseconds.
    pub poll_interval_ms: u64,
    /// Consecutive unconfirmed password prompts before giving up.
    pub max_unconfirmed_prompts: u32,
    /// Substrings that mark a password prompt.
    pub prompt_markers: Vec<String>,
    /// Trailing text that marks a password prompt.
    pub prompt_suffixes: Vec<String>,
    /// Substrings that mean the last credential was rejected.
    pub rejection_markers: Vec<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_unconfirmed_prompts: 3,
            prompt_markers: vec!["assword".into()],
            prompt_suffixes: vec!["d:".into()],
            rejection_markers: vec![
                "Permission denied, please try again".into(),
                "Permission denied (".into(),
                "Sorry, try again".into(),
                "incorrect password attempt".into(),
            ],
        }
    }
}

impl SessionSettings {
    /// Poll interval as a `Duration`.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Complete deployment configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeployConfig {
    pub target: TargetConfig,
    pub local: LocalLayout,
    pub remote: RemoteLayout,
    pub session: SessionSettings,
}

impl DeployConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    /// Returns error if the document is not valid config TOML.
    pub fn from_toml(source: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `./nexus-deploy.toml` and then
    /// `<config_dir>/nexus-deploy/config.toml` are tried, falling back to
    /// defaults.
    ///
    /// # Errors
    /// Returns error if a chosen file cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover(),
        };

        let Some(path) = path else {
            tracing::debug!("No config file found, using defaults");
            return Ok(Self::default());
        };

        tracing::debug!(path = %path.display(), "Loading config");
        let source = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&source, &path)
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.is_file() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("nexus-deploy").join("config.toml"))
            .filter(|p| p.is_file())
    }

    /// Apply `NEXUS_DEPLOY_HOST` when set.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        match std::env::var(HOST_ENV) {
            Ok(host) if !host.trim().is_empty() => self.with_host(host),
            _ => self,
        }
    }

    /// Override the target host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.target.host = host.into();
        self
    }

    /// Check the config is usable for a deployment.
    ///
    /// # Errors
    /// Returns error if the host is missing or a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }
        if self.session.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("session.poll_interval_ms must be > 0".into()));
        }
        if self.session.max_unconfirmed_prompts == 0 {
            return Err(ConfigError::Invalid(
                "session.max_unconfirmed_prompts must be > 0".into(),
            ));
        }
        self.local.executable_name()?;
        self.local.assets_name()?;
        Ok(())
    }
}
