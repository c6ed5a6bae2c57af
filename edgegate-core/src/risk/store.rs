//! Persistence for the runtime risk state.
//!
//! The state is a single record. The file store writes to a sibling temp file
//! and renames it into place so a crash never leaves a half-written record.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

use super::audit::AuditError;
use super::state::RuntimeRiskState;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("risk state I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("risk state at {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode risk state: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Audit(#[from] AuditError),
}

pub trait RiskStateStore: Send + Sync {
    /// Load the persisted record, or `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<RuntimeRiskState>, StateError>;

    fn save(&self, state: &RuntimeRiskState) -> Result<(), StateError>;
}

// ─── JSON file ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> StateError {
        StateError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl RiskStateStore for JsonFileStore {
    fn load(&self) -> Result<Option<RuntimeRiskState>, StateError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StateError::Corrupt {
                path: self.path.display().to_string(),
                source,
            })
    }

    fn save(&self, state: &RuntimeRiskState) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(state)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| self.io_err(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))
    }
}

// ─── In-memory ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<RuntimeRiskState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a record, as if loaded from disk.
    pub fn with_state(state: RuntimeRiskState) -> Self {
        Self {
            record: Mutex::new(Some(state)),
        }
    }
}

impl RiskStateStore for MemoryStore {
    fn load(&self) -> Result<Option<RuntimeRiskState>, StateError> {
        Ok(self.record.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, state: &RuntimeRiskState) -> Result<(), StateError> {
        *self.record.lock().unwrap_or_else(|e| e.into_inner()) = Some(state.clone());
        Ok(())
    }
}
