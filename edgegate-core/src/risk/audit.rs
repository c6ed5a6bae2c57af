//! Append-only audit log of risk-state mutations.
//!
//! Every named transition on the runtime risk state produces one entry with
//! before/after snapshots. The JSONL sink writes one JSON object per line so
//! a torn final write loses at most that line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

use super::state::RiskSnapshot;
use crate::domain::{Direction, ExecutionId, ExecutionMode, ExecutionStatus, MarketId};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode audit entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    FillRecorded {
        market_id: MarketId,
        direction: Direction,
        size: f64,
        price: f64,
        mode: ExecutionMode,
    },
    ExecutionFailed {
        reason: String,
        consecutive_failures: u32,
    },
    /// An execution ended without a successful fill. Any size the venue
    /// filled before the failure is booked in the same entry.
    ExecutionClosed {
        market_id: MarketId,
        status: ExecutionStatus,
        reason: String,
        filled_size: f64,
        counted: bool,
        consecutive_failures: u32,
    },
    KillSwitchActivated {
        reason: String,
        automatic: bool,
    },
    KillSwitchDeactivated,
    DailyReset {
        lazy: bool,
    },
    PositionSettled {
        market_id: MarketId,
        pnl: f64,
    },
    ModeChanged {
        from: ExecutionMode,
        to: ExecutionMode,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    pub execution_id: Option<ExecutionId>,
    pub before: RiskSnapshot,
    pub after: RiskSnapshot,
}

/// Destination for audit entries. Implementations must never drop an entry
/// silently: either it is durably appended or an error is returned.
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: &AuditLogEntry) -> Result<(), AuditError>;
}

// ─── JSONL file sink ─────────────────────────────────────────────────

#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> AuditError {
        AuditError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// Read every entry back. Malformed lines are skipped.
    pub fn read_all(&self) -> Result<Vec<AuditLogEntry>, AuditError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&self.path).map_err(|e| self.io_err(e))?;
        let mut entries = Vec::new();
        for line in io::BufReader::new(file).lines() {
            let line = line.map_err(|e| self.io_err(e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditLogEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "skipping malformed audit line"),
            }
        }
        Ok(entries)
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, entry: &AuditLogEntry) -> Result<(), AuditError> {
        let json = serde_json::to_string(entry)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        writeln!(file, "{json}").map_err(|e| self.io_err(e))?;
        file.flush().map_err(|e| self.io_err(e))
    }
}

// ─── In-memory sink ──────────────────────────────────────────────────

/// Keeps entries in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditLogEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, entry: &AuditLogEntry) -> Result<(), AuditError> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RuntimeRiskState;
    use chrono::NaiveDate;

    fn entry(event: AuditEvent) -> AuditLogEntry {
        let s = RuntimeRiskState::new(
            ExecutionMode::Paper,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        )
        .snapshot();
        AuditLogEntry {
            timestamp: Utc::now(),
            event,
            execution_id: None,
            before: s.clone(),
            after: s,
        }
    }

    #[test]
    fn jsonl_appends_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlAuditSink::new(dir.path().join("audit").join("log.jsonl"));
        sink.append(&entry(AuditEvent::KillSwitchDeactivated)).unwrap();
        sink.append(&entry(AuditEvent::DailyReset { lazy: true })).unwrap();

        let all = sink.read_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].event, AuditEvent::DailyReset { lazy: true });
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlAuditSink::new(dir.path().join("none.jsonl"));
        assert!(sink.read_all().unwrap().is_empty());
    }

    #[test]
    fn event_tag_is_snake_case() {
        let json = serde_json::to_string(&AuditEvent::KillSwitchActivated {
            reason: "x".into(),
            automatic: true,
        })
        .unwrap();
        assert!(json.contains("\"type\":\"kill_switch_activated\""));
    }

    #[test]
    fn memory_sink_collects() {
        let sink = MemoryAuditSink::new();
        assert!(sink.is_empty());
        sink.append(&entry(AuditEvent::KillSwitchDeactivated)).unwrap();
        assert_eq!(sink.len(), 1);
    }
}
