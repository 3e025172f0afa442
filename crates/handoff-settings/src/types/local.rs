//! Local process settings: on-disk storage and logging.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// On-disk storage settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Data directory. A leading `~` expands to `$HOME`.
    pub data_dir: String,
    /// File name of the guest nonce store inside the data directory.
    pub nonce_file: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.handoff".to_string(),
            nonce_file: "nonces.json".to_string(),
        }
    }
}

impl StorageSettings {
    /// Data directory with `~` expanded.
    pub fn data_dir_path(&self) -> PathBuf {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(rest)
            }
            None => PathBuf::from(&self.data_dir),
        }
    }

    /// Full path of the nonce store.
    pub fn nonce_path(&self) -> PathBuf {
        self.data_dir_path().join(&self.nonce_file)
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter level when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_data_dir_untouched() {
        let s = StorageSettings {
            data_dir: "/var/lib/handoff".into(),
            nonce_file: "n.json".into(),
        };
        assert_eq!(s.nonce_path(), PathBuf::from("/var/lib/handoff/n.json"));
    }

    #[test]
    fn tilde_expands() {
        let s = StorageSettings::default();
        assert!(!s.data_dir_path().to_string_lossy().starts_with('~'));
        assert!(s.nonce_path().ends_with(".handoff/nonces.json"));
    }
}
