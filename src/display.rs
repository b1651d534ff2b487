//! Terminal rendering of analysis results.

use persona_dedup_core::models::RowResult;
use persona_dedup_core::verdict::collect_sources;

use crate::orchestrator::BatchReport;

const MAX_NAME_WIDTH: usize = 40;

/// Render the results table, then the deduplicated source list.
pub fn render_results(results: &[RowResult]) -> String {
    if results.is_empty() {
        return "No results.\n".to_string();
    }

    let w_orig = column_width(results.iter().map(|r| r.original.as_str()), "ORIGINAL");
    let w_dup = column_width(results.iter().map(|r| r.duplicate.as_str()), "DUPLICATE");

    let mut out = String::new();
    out.push_str(&format!(
        "{:<4} {:<w_orig$} {:<w_dup$} ANALYSIS\n",
        "#", "ORIGINAL", "DUPLICATE"
    ));
    for result in results {
        out.push_str(&format!(
            "{:<4} {:<w_orig$} {:<w_dup$} {}\n",
            result.index + 1,
            truncate(&result.original, MAX_NAME_WIDTH),
            truncate(&result.duplicate, MAX_NAME_WIDTH),
            result.status.label()
        ));
    }

    let sources = collect_sources(results);
    if !sources.is_empty() {
        out.push_str("\nSources\n");
        for source in &sources {
            if source.label() == source.uri {
                out.push_str(&format!("  - {}\n", source.uri));
            } else {
                out.push_str(&format!("  - {}\n    {}\n", source.label(), source.uri));
            }
        }
    }
    out
}

fn column_width<'a>(cells: impl Iterator<Item = &'a str>, header: &str) -> usize {
    cells
        .map(|c| c.chars().count())
        .fold(header.len(), usize::max)
        .min(MAX_NAME_WIDTH)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}

pub fn print_results(results: &[RowResult]) {
    print!("{}", render_results(results));
}

pub fn print_summary(report: &BatchReport) {
    let summary = report.summary();
    println!();
    if report.cancelled {
        println!("analyze (cancelled)");
    } else {
        println!("analyze");
    }
    println!("  rows: {} / {}", report.results.len(), report.total);
    println!("  same: {}", summary.same);
    println!("  different: {}", summary.different);
    if summary.inconclusive > 0 {
        println!("  inconclusive: {}", summary.inconclusive);
    }
    println!("  error: {}", summary.error);
    println!("  elapsed: {:.1}s", report.elapsed.as_secs_f64());
}
