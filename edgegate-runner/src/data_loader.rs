//! Historical data loading for the backtest.
//!
//! A dataset directory holds three files:
//! - `ticks.csv` — `market_id,timestamp,price,size` (price is the YES price)
//! - `markets.json` — array of market records with their resolution, if any
//! - `candidates.csv` — `signal_id,market_id,created_at,direction,fair_probability,confidence,alpha_type`
//!
//! Timestamps are RFC 3339. Rows with out-of-range values are rejected with
//! the offending line, not skipped.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use edgegate_core::domain::{Direction, MarketId};

pub const TICKS_FILE: &str = "ticks.csv";
pub const MARKETS_FILE: &str = "markets.json";
pub const CANDIDATES_FILE: &str = "candidates.csv";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed CSV in {file}: {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },
    #[error("malformed JSON in {file}: {source}")]
    Json {
        file: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{file} record {record}: {reason}")]
    Invalid {
        file: String,
        record: usize,
        reason: String,
    },
}

/// One historical trade print.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub market_id: MarketId,
    pub timestamp: DateTime<Utc>,
    /// YES price in [0, 1].
    pub price: f64,
    pub size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub outcome_yes: bool,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRecord {
    pub market_id: MarketId,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub spread: Option<f64>,
    #[serde(default)]
    pub resolution: Option<Resolution>,
}

/// A signal as it was emitted historically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub signal_id: String,
    pub market_id: MarketId,
    pub created_at: DateTime<Utc>,
    pub direction: Direction,
    /// The signal's fair YES probability.
    pub fair_probability: f64,
    pub confidence: f64,
    #[serde(default)]
    pub alpha_type: String,
}

/// Everything a backtest run consumes.
#[derive(Debug, Clone, Default)]
pub struct BacktestData {
    pub ticks: Vec<Tick>,
    pub markets: HashMap<MarketId, MarketRecord>,
    pub candidates: Vec<Candidate>,
    /// BLAKE3 over the raw input files, for provenance.
    pub dataset_hash: String,
}

/// Load `ticks.csv`, `markets.json` and `candidates.csv` from `dir`.
pub fn load_dataset(dir: &Path) -> Result<BacktestData, LoadError> {
    let ticks_raw = read_file(&dir.join(TICKS_FILE))?;
    let markets_raw = read_file(&dir.join(MARKETS_FILE))?;
    let candidates_raw = read_file(&dir.join(CANDIDATES_FILE))?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(&ticks_raw);
    hasher.update(&markets_raw);
    hasher.update(&candidates_raw);

    let data = BacktestData {
        ticks: parse_ticks(ticks_raw.as_slice())?,
        markets: parse_markets(markets_raw.as_slice())?,
        candidates: parse_candidates(candidates_raw.as_slice())?,
        dataset_hash: hasher.finalize().to_hex().to_string(),
    };
    tracing::info!(
        ticks = data.ticks.len(),
        markets = data.markets.len(),
        candidates = data.candidates.len(),
        dataset = %&data.dataset_hash[..12],
        "dataset loaded"
    );
    Ok(data)
}

fn read_file(path: &Path) -> Result<Vec<u8>, LoadError> {
    std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn csv_rows<T, R>(reader: R, file: &str) -> Result<Vec<T>, LoadError>
where
    T: for<'de> Deserialize<'de>,
    R: Read,
{
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    rdr.deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|source| LoadError::Csv {
            file: file.to_string(),
            source,
        })
}

fn check(ok: bool, file: &str, record: usize, reason: impl FnOnce() -> String) -> Result<(), LoadError> {
    if ok {
        Ok(())
    } else {
        Err(LoadError::Invalid {
            file: file.to_string(),
            record,
            reason: reason(),
        })
    }
}

pub fn parse_ticks<R: Read>(reader: R) -> Result<Vec<Tick>, LoadError> {
    let ticks: Vec<Tick> = csv_rows(reader, TICKS_FILE)?;
    for (i, t) in ticks.iter().enumerate() {
        check((0.0..=1.0).contains(&t.price), TICKS_FILE, i + 1, || {
            format!("price {} outside [0, 1]", t.price)
        })?;
        check(t.size.is_finite() && t.size >= 0.0, TICKS_FILE, i + 1, || {
            format!("size {} must be non-negative", t.size)
        })?;
    }
    Ok(ticks)
}

pub fn parse_markets<R: Read>(reader: R) -> Result<HashMap<MarketId, MarketRecord>, LoadError> {
    let records: Vec<MarketRecord> = serde_json::from_reader(reader).map_err(|source| LoadError::Json {
        file: MARKETS_FILE.to_string(),
        source,
    })?;
    let mut markets = HashMap::with_capacity(records.len());
    for (i, m) in records.into_iter().enumerate() {
        if let Some(spread) = m.spread {
            check((0.0..=1.0).contains(&spread), MARKETS_FILE, i + 1, || {
                format!("spread {spread} outside [0, 1]")
            })?;
        }
        let id = m.market_id.clone();
        check(markets.insert(id.clone(), m).is_none(), MARKETS_FILE, i + 1, || {
            format!("duplicate market_id '{id}'")
        })?;
    }
    Ok(markets)
}

pub fn parse_candidates<R: Read>(reader: R) -> Result<Vec<Candidate>, LoadError> {
    let candidates: Vec<Candidate> = csv_rows(reader, CANDIDATES_FILE)?;
    for (i, c) in candidates.iter().enumerate() {
        check((0.0..=1.0).contains(&c.fair_probability), CANDIDATES_FILE, i + 1, || {
            format!("fair_probability {} outside [0, 1]", c.fair_probability)
        })?;
        check((0.0..=1.0).contains(&c.confidence), CANDIDATES_FILE, i + 1, || {
            format!("confidence {} outside [0, 1]", c.confidence)
        })?;
    }
    Ok(candidates)
}
