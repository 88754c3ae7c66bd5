//! CSV trade journal.
//!
//! Appends one row per simulated cycle to hour-sharded files:
//! `output/trades/YYYY-MM-DD/HH.csv`. The header is written exactly once per
//! file, detected by existence.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::types::TradeRecord;

pub struct TradeJournal {
    /// Base directory for trade files (`output/trades`).
    base_dir: PathBuf,
}

impl TradeJournal {
    const HEADERS: &'static [&'static str] = &[
        "timestamp",
        "cycle",
        "profit_pct",
        "initial_asset",
        "initial_amount",
        "final_asset",
        "final_amount",
    ];

    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self { base_dir: base_dir.as_ref().to_path_buf() }
    }

    /// Shard path for a given timestamp.
    fn file_path(&self, timestamp: DateTime<Utc>) -> PathBuf {
        self.base_dir
            .join(timestamp.format("%Y-%m-%d").to_string())
            .join(format!("{}.csv", timestamp.format("%H")))
    }

    /// Append one record, creating the shard (and its header) on demand.
    pub fn log(&self, record: &TradeRecord) -> Result<PathBuf> {
        let file_path = self.file_path(record.timestamp);
        let dir = file_path.parent().expect("shard path always has a parent");
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create trade journal dir: {}", dir.display()))?;

        let headers_needed = !file_path.exists();

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)
            .with_context(|| format!("Failed to open trade CSV file: {}", file_path.display()))?;

        if headers_needed {
            writeln!(file, "{}", Self::HEADERS.join(","))?;
        }

        writeln!(
            file,
            "{},{},{:.4},{},{:.8},{},{:.8}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            // The cycle string is the only free-form field in the row.
            escape_csv_field(&record.cycle),
            record.profit_pct,
            record.initial_asset,
            record.initial_amount,
            record.final_asset,
            record.final_amount,
        )?;

        Ok(file_path)
    }
}

/// Escape a CSV field that may contain special characters.
fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
