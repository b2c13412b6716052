//! Bar loading from CSV.
//!
//! Expected header: `time,open,high,low,close,volume`. The time column accepts
//! RFC 3339 (`2024-01-02T09:30:00Z`), `YYYY-MM-DD HH:MM:SS` (taken as UTC) or
//! integer epoch seconds. Times must be strictly increasing.
//!
//! Price sanity is left to the driver, which skips malformed bars and counts them.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use tradesim_core::domain::Bar;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("line {line}: unrecognised time '{value}'")]
    Time { line: u64, value: String },

    #[error("line {line}: time {time} does not follow {previous}")]
    NotIncreasing {
        line: u64,
        time: DateTime<Utc>,
        previous: DateTime<Utc>,
    },

    #[error("no bars in input")]
    Empty,
}

/// Bars plus a fingerprint of their content.
#[derive(Debug, Clone)]
pub struct LoadedBars {
    pub bars: Vec<Bar>,
    /// BLAKE3 over every bar's time and OHLCV.
    pub dataset_hash: String,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

pub fn load_bars(path: &Path) -> Result<LoadedBars, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let loaded = read_bars(file)?;
    info!(
        path = %path.display(),
        bars = loaded.bars.len(),
        hash = %&loaded.dataset_hash[..12],
        "bars loaded"
    );
    Ok(loaded)
}

pub fn read_bars<R: Read>(reader: R) -> Result<LoadedBars, LoadError> {
    let mut csv = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut bars: Vec<Bar> = Vec::new();
    let mut hasher = blake3::Hasher::new();

    for (i, row) in csv.deserialize::<CsvRow>().enumerate() {
        let row = row?;
        // header is line 1
        let line = i as u64 + 2;
        let time = parse_time(&row.time).ok_or_else(|| LoadError::Time {
            line,
            value: row.time.clone(),
        })?;
        if let Some(previous) = bars.last().map(|b| b.time) {
            if time <= previous {
                return Err(LoadError::NotIncreasing {
                    line,
                    time,
                    previous,
                });
            }
        }

        hasher.update(&time.timestamp().to_le_bytes());
        for v in [row.open, row.high, row.low, row.close, row.volume] {
            hasher.update(&v.to_le_bytes());
        }
        bars.push(Bar::new(time, row.open, row.high, row.low, row.close, row.volume));
    }

    if bars.is_empty() {
        return Err(LoadError::Empty);
    }
    debug!(bars = bars.len(), "csv parsed");
    Ok(LoadedBars {
        bars,
        dataset_hash: hasher.finalize().to_hex().to_string(),
    })
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(secs) = value.parse::<i64>() {
        return DateTime::<Utc>::from_timestamp(secs, 0);
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|t| t.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const CSV: &str = "time,open,high,low,close,volume
2024-01-02T00:00:00Z,100.0,101.0,99.0,100.5,10
2024-01-02T01:00:00Z,100.5,102.0,100.0,101.5,12
2024-01-02 02:00:00,101.5,101.8,100.9,101.0,8
";

    #[test]
    fn parses_mixed_time_formats() {
        let loaded = read_bars(CSV.as_bytes()).unwrap();
        assert_eq!(loaded.bars.len(), 3);
        assert_eq!(
            loaded.bars[2].time,
            Utc.with_ymd_and_hms(2024, 1, 2, 2, 0, 0).unwrap()
        );
        assert_eq!(loaded.bars[1].close, 101.5);
        assert_eq!(loaded.dataset_hash.len(), 64);
    }

    #[test]
    fn epoch_seconds() {
        let csv = "time,open,high,low,close,volume\n1704153600,1,2,0.5,1.5,0\n";
        let loaded = read_bars(csv.as_bytes()).unwrap();
        assert_eq!(
            loaded.bars[0].time,
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn volume_column_is_optional() {
        let csv = "time,open,high,low,close\n1704153600,1,2,0.5,1.5\n";
        let loaded = read_bars(csv.as_bytes()).unwrap();
        assert_eq!(loaded.bars[0].volume, 0.0);
    }

    #[test]
    fn rejects_non_increasing_times() {
        let csv = "time,open,high,low,close,volume
1704153600,1,2,0.5,1.5,0
1704153600,1,2,0.5,1.5,0
";
        let err = read_bars(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, LoadError::NotIncreasing { line: 3, .. }));
    }

    #[test]
    fn rejects_bad_time() {
        let csv = "time,open,high,low,close,volume\nyesterday,1,2,0.5,1.5,0\n";
        let err = read_bars(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, LoadError::Time { line: 2, .. }));
    }

    #[test]
    fn rejects_empty_input() {
        let err = read_bars("time,open,high,low,close,volume\n".as_bytes()).unwrap_err();
        assert!(matches!(err, LoadError::Empty));
    }

    #[test]
    fn hash_tracks_content() {
        let a = read_bars(CSV.as_bytes()).unwrap();
        let b = read_bars(CSV.replace("101.5,12", "101.6,12").as_bytes()).unwrap();
        assert_ne!(a.dataset_hash, b.dataset_hash);
        assert_eq!(a.dataset_hash, read_bars(CSV.as_bytes()).unwrap().dataset_hash);
    }
}
