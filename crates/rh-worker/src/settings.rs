//! Live scan settings
//!
//! Phases read their settings from a [`SettingsSource`] right before they
//! start, so edits to the settings file take effect on the next phase
//! without restarting the worker.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use rh_core::config::{self, ScanSettings};

/// Where phases get their current settings
pub trait SettingsSource: Send + Sync {
    fn current(&self) -> ScanSettings;
}

/// Settings reread from a TOML file on every call
///
/// An unreadable or invalid file keeps the last good settings in effect.
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    last_good: Mutex<ScanSettings>,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_good: Mutex::new(ScanSettings::default()),
        }
    }
}

impl SettingsSource for FileSettings {
    fn current(&self) -> ScanSettings {
        let mut last_good = self
            .last_good
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match config::load_config_or_default::<ScanSettings>(&self.path) {
            Ok(settings) => {
                *last_good = settings.clone();
                settings
            }
            Err(e) => {
                tracing::warn!("Keeping previous scan settings, {:?} is invalid: {}", self.path, e);
                last_good.clone()
            }
        }
    }
}

/// Fixed settings
#[derive(Debug, Clone, Default)]
pub struct StaticSettings(pub ScanSettings);

impl SettingsSource for StaticSettings {
    fn current(&self) -> ScanSettings {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rh_core::{PerformanceMode, ScanPhase};
    use tempfile::tempdir;

    #[test]
    fn test_reread_on_every_call() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let source = FileSettings::new(&path);

        assert_eq!(source.current(), ScanSettings::default());

        std::fs::write(&path, "performance_mode = \"high\"\n").unwrap();
        let settings = source.current();
        assert_eq!(settings.performance_mode, PerformanceMode::High);
        assert_eq!(settings.limit(ScanPhase::Portscan), 4);

        std::fs::write(&path, "performance_mode = \"normal\"\n").unwrap();
        assert_eq!(source.current().limit(ScanPhase::Portscan), 2);
    }

    #[test]
    fn test_invalid_file_keeps_last_good() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "max_batch_targets = 10\n").unwrap();
        let source = FileSettings::new(&path);
        assert_eq!(source.current().max_batch_targets, 10);

        std::fs::write(&path, "max_batch_targets = [").unwrap();
        assert_eq!(source.current().max_batch_targets, 10);
    }
}
