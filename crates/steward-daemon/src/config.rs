use crate::DaemonError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ENSURE_INTERVAL_SECS: u64 = 300;
pub const CONFIG_FILE_NAME: &str = "steward.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// Checkpoint file for the shared state. Relative paths are resolved
    /// against the data directory.
    pub state_file: PathBuf,
    /// Seconds between convergence passes when nothing requests one sooner.
    pub ensure_interval_secs: u64,
    /// Persist modified state in the background after each convergence pass.
    pub checkpoint_on_ensure: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from("state.json"),
            ensure_interval_secs: DEFAULT_ENSURE_INTERVAL_SECS,
            checkpoint_on_ensure: true,
        }
    }
}

impl DaemonConfig {
    pub fn load(path: &Path) -> Result<Self, DaemonError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DaemonError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| DaemonError::Config(format!("invalid config {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, DaemonError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), DaemonError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| DaemonError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), DaemonError> {
        if self.ensure_interval_secs == 0 {
            return Err(DaemonError::Config(
                "ensure_interval_secs must be at least 1".to_owned(),
            ));
        }
        if self.state_file.as_os_str().is_empty() {
            return Err(DaemonError::Config("state_file must not be empty".to_owned()));
        }
        Ok(())
    }

    pub fn ensure_interval(&self) -> Duration {
        Duration::from_secs(self.ensure_interval_secs)
    }

    pub fn state_path(&self, data_dir: &Path) -> PathBuf {
        if self.state_file.is_absolute() {
            self.state_file.clone()
        } else {
            data_dir.join(&self.state_file)
        }
    }
}
