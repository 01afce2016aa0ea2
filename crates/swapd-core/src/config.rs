//! The agent's YAML configuration file.
//!
//! Read once at startup and rewritten (best-effort) when a deployment
//! commits a new version. Durations are expressed as integer seconds in the
//! file and exposed as [`Duration`] through accessors.
//!
//! ```yaml
//! port: 9000
//! temp_dir: /var/tmp/swapd
//! apps:
//!   - name: myapp
//!     service: myapp.service
//!     executable: myapp
//!     path: /srv/myapp
//!     health_url: http://127.0.0.1:3000/health
//!     health_retry: 5
//!     startup_wait: 3
//!     rollback: true
//!     version: v1.0.0
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default HTTP port for the agent.
pub const DEFAULT_PORT: u16 = 9000;

const DEFAULT_HEALTH_RETRY: u32 = 5;
const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 2;
const DEFAULT_STARTUP_WAIT_SECS: u64 = 3;

/// Errors from loading, validating, or persisting the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config at {path}: {source}")]
    Read {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[source] serde_yaml::Error),

    /// Two apps share a name; names are the publisher-facing selector and
    /// must be unique.
    #[error("duplicate app name: {0}")]
    DuplicateApp(String),

    /// An app's install path is not an existing directory.
    #[error("app {app}: path {path} is not a directory")]
    BadAppPath {
        /// App with the bad path.
        app: String,
        /// The offending path.
        path: PathBuf,
    },

    /// The rewritten config could not be written back.
    #[error("failed to persist config to {path}: {detail}")]
    Persist {
        /// Destination path.
        path: PathBuf,
        /// What failed.
        detail: String,
    },
}

/// One managed application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppRecord {
    /// Unique selector used by the publisher.
    pub name: String,

    /// OS-level identifier for stop: systemd unit name on POSIX, process
    /// image name on Windows.
    pub service: String,

    /// Filename of the binary inside `path`.
    pub executable: String,

    /// Directory holding the binary. Must be writable by the agent.
    pub path: PathBuf,

    /// Readiness endpoint; probing is skipped entirely when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_url: Option<String>,

    /// Post-deploy probe attempts.
    #[serde(default = "default_health_retry")]
    pub health_retry: u32,

    /// Seconds between probe attempts.
    #[serde(rename = "health_interval", default = "default_health_interval")]
    health_interval_secs: u64,

    /// Seconds to wait after start before the first post-deploy probe.
    #[serde(rename = "startup_wait", default = "default_startup_wait")]
    startup_wait_secs: u64,

    /// Whether a failed start or health check restores the previous binary.
    #[serde(default = "default_rollback")]
    pub rollback: bool,

    /// Currently deployed version tag. Updated only after a successful
    /// post-deploy health check.
    #[serde(default)]
    pub version: String,
}

impl AppRecord {
    /// Interval between post-deploy probe attempts.
    #[must_use]
    pub const fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    /// Delay between starting the new binary and the first probe.
    #[must_use]
    pub const fn startup_wait(&self) -> Duration {
        Duration::from_secs(self.startup_wait_secs)
    }

    /// Path of the live binary.
    #[must_use]
    pub fn current_path(&self) -> PathBuf {
        self.path.join(&self.executable)
    }
}

/// The agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listen port for the webhook daemon.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory for staged downloads. Defaults to a `swapd` subdirectory
    /// of the OS temp dir. Must be on the same device as the app paths for
    /// rename atomicity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,

    /// Managed applications.
    #[serde(default)]
    pub apps: Vec<AppRecord>,
}

impl Config {
    /// Loads and validates the configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on unreadable file, invalid YAML, duplicate
    /// app names, or an app path that is not a directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&data).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the uniqueness and filesystem invariants.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for app in &self.apps {
            if !seen.insert(app.name.as_str()) {
                return Err(ConfigError::DuplicateApp(app.name.clone()));
            }
            if !app.path.is_dir() {
                return Err(ConfigError::BadAppPath {
                    app: app.name.clone(),
                    path: app.path.clone(),
                });
            }
        }
        Ok(())
    }

    /// The staging directory, with the OS-temp default applied.
    #[must_use]
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("swapd"))
    }

    /// Looks up an app by its unique name.
    #[must_use]
    pub fn find_app(&self, name: &str) -> Option<&AppRecord> {
        self.apps.iter().find(|app| app.name == name)
    }

    /// Mutable lookup, used by the commit step to record the new version.
    pub fn find_app_mut(&mut self, name: &str) -> Option<&mut AppRecord> {
        self.apps.iter_mut().find(|app| app.name == name)
    }

    /// Rewrites the config file with the current in-memory state.
    ///
    /// Atomic: serialises to a temp file in the destination directory, then
    /// renames over `path`, so a reader (or a crash) never observes a
    /// partial file. World-readable (0644) like the file it replaces.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Persist`]; callers treat this as best-effort
    /// and must not fail a committed deployment over it.
    pub fn persist(&self, path: &Path) -> Result<(), ConfigError> {
        let persist_error = |detail: String| ConfigError::Persist {
            path: path.to_path_buf(),
            detail,
        };

        let yaml = serde_yaml::to_string(self).map_err(|e| persist_error(e.to_string()))?;

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| persist_error(e.to_string()))?;
        tmp.write_all(yaml.as_bytes())
            .map_err(|e| persist_error(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = tmp
                .as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644));
        }

        tmp.persist(path)
            .map_err(|e| persist_error(e.to_string()))?;
        Ok(())
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_health_retry() -> u32 {
    DEFAULT_HEALTH_RETRY
}

fn default_health_interval() -> u64 {
    DEFAULT_HEALTH_INTERVAL_SECS
}

fn default_startup_wait() -> u64 {
    DEFAULT_STARTUP_WAIT_SECS
}

const fn default_rollback() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml(path: &Path) -> String {
        format!(
            r#"
apps:
  - name: myapp
    service: myapp.service
    executable: myapp
    path: {}
    version: v1.0.0
"#,
            path.display()
        )
    }

    #[test]
    fn load_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("deploy.yaml");
        std::fs::write(&config_path, minimal_yaml(dir.path())).unwrap();

        let config = Config::load(&config_path).unwrap();

        assert_eq!(config.port, 9000);
        let app = &config.apps[0];
        assert_eq!(app.health_retry, 5);
        assert_eq!(app.health_interval(), Duration::from_secs(2));
        assert_eq!(app.startup_wait(), Duration::from_secs(3));
        assert!(app.rollback);
        assert!(app.health_url.is_none());
    }

    #[test]
    fn duplicate_app_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = format!(
            r#"
apps:
  - {{ name: a, service: a, executable: a, path: {p} }}
  - {{ name: a, service: b, executable: b, path: {p} }}
"#,
            p = dir.path().display()
        );
        let config_path = dir.path().join("deploy.yaml");
        std::fs::write(&config_path, yaml).unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::DuplicateApp(name)) if name == "a"));
    }

    #[test]
    fn missing_app_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r#"
apps:
  - name: a
    service: a
    executable: a
    path: /nonexistent/swapd/test/dir
"#;
        let config_path = dir.path().join("deploy.yaml");
        std::fs::write(&config_path, yaml).unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::BadAppPath { .. })));
    }

    #[test]
    fn persist_round_trips_with_updated_version() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("deploy.yaml");
        std::fs::write(&config_path, minimal_yaml(dir.path())).unwrap();

        let mut config = Config::load(&config_path).unwrap();
        config.find_app_mut("myapp").unwrap().version = "v2.0.0".to_string();
        config.persist(&config_path).unwrap();

        let reloaded = Config::load(&config_path).unwrap();
        assert_eq!(reloaded.find_app("myapp").unwrap().version, "v2.0.0");
        assert_eq!(reloaded.port, 9000);
    }

    #[test]
    fn find_app_matches_by_name_only() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("deploy.yaml");
        std::fs::write(&config_path, minimal_yaml(dir.path())).unwrap();

        let config = Config::load(&config_path).unwrap();
        assert!(config.find_app("myapp").is_some());
        assert!(config.find_app("myapp.service").is_none());
    }

    #[test]
    fn temp_dir_defaults_to_os_temp_subdirectory() {
        let config = Config {
            port: DEFAULT_PORT,
            temp_dir: None,
            apps: Vec::new(),
        };
        assert!(config.temp_dir().starts_with(std::env::temp_dir()));
    }
}
