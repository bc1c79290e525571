//! Per-tournament log files.
//!
//! Each run gets its own log file named after the event, so interleaved
//! tournaments on one machine never write into each other's logs.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use time::{format_description, OffsetDateTime};
use tracing::Level;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

/// Installs a file-writing tracing subscriber for one tournament run and
/// returns the log file path, e.g. `TCEC-Swiss-7_2026-08-02_0930.log`.
///
/// Fails if the file cannot be created or another subscriber is already
/// installed (embedders that set up their own logging simply skip this).
pub fn init_tournament_log(event: &str) -> Result<PathBuf> {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let path = log_file_path(event, now);
    let file = File::create(&path)
        .with_context(|| format!("cannot create log file {}", path.display()))?;

    let offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        offset,
        format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")?,
    );

    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_ansi(false)
        .with_timer(timer)
        .with_writer(BoxMakeWriter::new(file))
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("a tracing subscriber is already installed")?;

    Ok(path)
}

// event names go through a filename-safe mangling; an unnamed event still
// gets a usable stem
fn log_file_path(event: &str, now: OffsetDateTime) -> PathBuf {
    let mut stem: String = event
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        stem.push_str("tournament");
    }

    let suffix = format_description::parse("[year]-[month]-[day]_[hour][minute]")
        .ok()
        .and_then(|format| now.format(&format).ok())
        .unwrap_or_default();
    PathBuf::from(format!("{stem}_{suffix}.log"))
}
