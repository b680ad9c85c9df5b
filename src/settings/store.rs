//! Durable settings persistence.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::resilience::delays::is_valid_delay;

/// Errors raised while reading or writing the settings file.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Last known position of the (external) control panel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PanelPosition {
    pub left: i32,
    pub top: i32,
}

/// Everything that survives a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedSettings {
    /// Delay candidates in seconds; empty means "use the configured defaults".
    pub delays: Vec<f64>,
    /// Attempts that carried a redirect signal.
    pub redirect_count: u64,
    /// Attempts (and follow-ups) that returned HTTP 200.
    pub ok_count: u64,
    pub multi_on: bool,
    pub retrymax_on: bool,
    pub allow_fallback: bool,
    /// Mirror attempt start/finish events to the log.
    pub mirror: bool,
    pub log_collapsed: bool,
    /// Last transaction id observed as VALID.
    pub last_ok_tran: String,
    /// Milliseconds since the epoch when `last_ok_tran` was recorded.
    pub last_ok_at: u64,
    pub panel_position: Option<PanelPosition>,
}

impl Default for PersistedSettings {
    fn default() -> Self {
        Self {
            delays: Vec::new(),
            redirect_count: 0,
            ok_count: 0,
            multi_on: false,
            retrymax_on: true,
            allow_fallback: true,
            mirror: true,
            log_collapsed: false,
            last_ok_tran: String::new(),
            last_ok_at: 0,
            panel_position: None,
        }
    }
}

impl PersistedSettings {
    /// Last verified transaction, if any.
    pub fn last_verified(&self) -> Option<(&str, u64)> {
        if self.last_ok_tran.is_empty() {
            None
        } else {
            Some((&self.last_ok_tran, self.last_ok_at))
        }
    }
}

/// Settings store backed by an optional JSON file.
///
/// Read once at startup; every mutation through [`SettingsStore::update`] is
/// written back immediately.
#[derive(Debug)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    inner: Mutex<PersistedSettings>,
}

impl SettingsStore {
    /// Settings that are never written to disk.
    pub fn in_memory() -> Self {
        Self::with_settings(None, PersistedSettings::default())
    }

    fn with_settings(path: Option<PathBuf>, settings: PersistedSettings) -> Self {
        Self {
            path,
            inner: Mutex::new(settings),
        }
    }

    /// Load from file, falling back to defaults when missing or corrupt.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = match read_settings(&path) {
            Ok(Some(mut settings)) => {
                settings.delays.retain(|d| is_valid_delay(*d));
                tracing::info!(path = %path.display(), "Loaded persisted settings");
                settings
            }
            Ok(None) => {
                tracing::debug!(path = %path.display(), "No settings file, using defaults");
                PersistedSettings::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable settings file");
                PersistedSettings::default()
            }
        };
        Self::with_settings(Some(path), settings)
    }

    /// Copy of the current settings.
    pub fn snapshot(&self) -> PersistedSettings {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Read a value without cloning the whole settings.
    pub fn read<R>(&self, f: impl FnOnce(&PersistedSettings) -> R) -> R {
        f(&self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Mutate the settings and persist them.
    ///
    /// Persistence failures are logged, never propagated.
    pub fn update<R>(&self, f: impl FnOnce(&mut PersistedSettings) -> R) -> R {
        let (result, snapshot) = {
            let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let result = f(&mut *guard);
            (result, guard.clone())
        };
        if let Err(e) = self.write(&snapshot) {
            tracing::warn!(error = %e, "Failed to persist settings");
        }
        result
    }

    /// Write the current settings to disk.
    pub fn save(&self) -> Result<(), SettingsError> {
        let snapshot = self.snapshot();
        self.write(&snapshot)
    }

    fn write(&self, settings: &PersistedSettings) -> Result<(), SettingsError> {
        if let Some(path) = &self.path {
            let mut writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(&mut writer, settings)?;
            writer.flush()?;
        }
        Ok(())
    }

    /// Increment the redirect counter, returning the new total.
    pub fn bump_redirects(&self) -> u64 {
        self.update(|s| {
            s.redirect_count += 1;
            s.redirect_count
        })
    }

    /// Increment the HTTP 200 counter, returning the new total.
    pub fn bump_ok(&self) -> u64 {
        self.update(|s| {
            s.ok_count += 1;
            s.ok_count
        })
    }

    /// Record a transaction id as the last verified one.
    pub fn record_last_verified(&self, tran_id: &str) {
        if tran_id.is_empty() {
            return;
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.update(|s| {
            s.last_ok_tran = tran_id.to_string();
            s.last_ok_at = now;
        });
    }

    /// Zero the counters and forget the last verified transaction.
    pub fn reset_totals(&self) {
        self.update(|s| {
            s.redirect_count = 0;
            s.ok_count = 0;
            s.last_ok_tran.clear();
            s.last_ok_at = 0;
        });
    }

}

fn read_settings(path: &Path) -> Result<Option<PersistedSettings>, SettingsError> {
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(path)?;
    let settings = serde_json::from_reader(BufReader::new(file))?;
    Ok(Some(settings))
}
