//! Export analysis results as CSV.
//!
//! Produces a file with the header `Original,Duplicates,Analysis`. Name
//! fields are always double-quoted with embedded quotes doubled; the
//! Analysis column holds the status tag (`SAME`, `DIFFERENT`,
//! `INCONCLUSIVE`, `ERROR`).

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

use persona_dedup_core::models::RowResult;

pub const CSV_HEADER: [&str; 3] = ["Original", "Duplicates", "Analysis"];

/// Write `results` as CSV to any writer.
pub fn write_csv<W: Write>(writer: W, results: &[RowResult]) -> Result<()> {
    let mut csv = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(writer);
    csv.write_record(CSV_HEADER)?;
    for result in results {
        csv.write_record([
            quote_field(&result.original).as_str(),
            quote_field(&result.duplicate).as_str(),
            result.status.as_str(),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

/// Double-quote a field, doubling any embedded quotes.
fn quote_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Write `results` to `path`, creating parent directories as needed.
pub fn export_csv(path: &Path, results: &[RowResult]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_csv(std::io::BufWriter::new(file), results)?;
    eprintln!("Exported {} rows to {}", results.len(), path.display());
    Ok(())
}

/// Default export file name, stamped with the local time of the run.
pub fn default_export_name(now: chrono::DateTime<chrono::Local>) -> String {
    format!("analysis_results_{}.csv", now.format("%Y%m%d_%H%M%S"))
}
