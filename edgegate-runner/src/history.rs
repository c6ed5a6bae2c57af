//! Trade history — JSONL append-only persistence of closed trades.
//!
//! One `BacktestTrade` per line. Queries filter by market id and by the UTC
//! date the trade closed, both optional and both inclusive.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::trade::BacktestTrade;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub market_id: Option<String>,
    /// Earliest close date, inclusive.
    pub closed_from: Option<NaiveDate>,
    /// Latest close date, inclusive.
    pub closed_to: Option<NaiveDate>,
}

impl HistoryQuery {
    pub fn matches(&self, trade: &BacktestTrade) -> bool {
        let day = trade.closed_at.date_naive();
        self.market_id.as_deref().map_or(true, |m| trade.market_id == m)
            && self.closed_from.map_or(true, |from| day >= from)
            && self.closed_to.map_or(true, |to| day <= to)
    }
}

#[derive(Debug, Clone)]
pub struct TradeHistory {
    path: PathBuf,
}

impl TradeHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, trade: &BacktestTrade) -> io::Result<()> {
        self.append_all(std::slice::from_ref(trade)).map(|_| ())
    }

    /// Append trades in order. Returns how many were written.
    pub fn append_all(&self, trades: &[BacktestTrade]) -> io::Result<usize> {
        if trades.is_empty() {
            return Ok(0);
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        for trade in trades {
            let json = serde_json::to_string(trade)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            writeln!(file, "{json}")?;
        }
        file.flush()?;
        Ok(trades.len())
    }

    /// Read every trade. Malformed lines are logged and skipped.
    pub fn read_all(&self) -> io::Result<Vec<BacktestTrade>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = io::BufReader::new(fs::File::open(&self.path)?);
        let mut trades = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<BacktestTrade>(&line) {
                Ok(t) => trades.push(t),
                Err(e) => warn!(path = %self.path.display(), line = i + 1, error = %e, "skipping malformed history line"),
            }
        }
        Ok(trades)
    }

    pub fn query(&self, query: &HistoryQuery) -> io::Result<Vec<BacktestTrade>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|t| query.matches(t))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::fixtures::trade;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let h = TradeHistory::new(dir.path().join("none.jsonl"));
        assert!(h.read_all().unwrap().is_empty());
    }

    #[test]
    fn append_then_read_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let h = TradeHistory::new(dir.path().join("nested/history.jsonl"));
        h.append(&trade(0, 5.0)).unwrap();
        assert_eq!(h.append_all(&[trade(1, -2.0), trade(2, 3.0)]).unwrap(), 2);
        let all = h.read_all().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0], trade(0, 5.0));
        assert_eq!(all[2].signal_id, "sig-2");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.jsonl");
        let h = TradeHistory::new(&path);
        h.append(&trade(0, 5.0)).unwrap();
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, "{{not json").unwrap();
        writeln!(f).unwrap();
        h.append(&trade(1, 5.0)).unwrap();
        assert_eq!(h.read_all().unwrap().len(), 2);
    }

    #[test]
    fn query_by_market_and_close_date() {
        let dir = tempfile::tempdir().unwrap();
        let h = TradeHistory::new(dir.path().join("h.jsonl"));
        // Trade `d` closes on 2024-01-(d+1).
        h.append_all(&(0..10).map(|d| trade(d, 1.0)).collect::<Vec<_>>()).unwrap();

        let by_market = h
            .query(&HistoryQuery {
                market_id: Some("m-3".into()),
                ..HistoryQuery::default()
            })
            .unwrap();
        assert_eq!(by_market.len(), 1);

        let range = h
            .query(&HistoryQuery {
                closed_from: Some(date(3)),
                closed_to: Some(date(5)),
                ..HistoryQuery::default()
            })
            .unwrap();
        let ids: Vec<_> = range.iter().map(|t| t.signal_id.as_str()).collect();
        assert_eq!(ids, ["sig-2", "sig-3", "sig-4"]);

        let both = h
            .query(&HistoryQuery {
                market_id: Some("m-3".into()),
                closed_from: Some(date(6)),
                closed_to: None,
            })
            .unwrap();
        assert!(both.is_empty());
        assert_eq!(h.query(&HistoryQuery::default()).unwrap().len(), 10);
    }
}
