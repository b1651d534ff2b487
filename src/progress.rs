//! Batch progress reporting.
//!
//! Reports observable progress during `dedup analyze` so users see how many
//! rows are done, which rows are being retried, and when the batch ends.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use persona_dedup_core::models::RowStatus;

/// A single progress event for a batch run.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// Records loaded; row processing is about to begin.
    Started { total: usize },
    /// A row's attempt failed or was inconclusive; waiting before the next one.
    Retrying {
        index: usize,
        attempt: u32,
        delay_ms: u64,
    },
    /// A row produced its result; `processed` rows out of `total` are done.
    RowFinished {
        index: usize,
        processed: usize,
        total: usize,
        status: RowStatus,
    },
    /// The batch ended, either complete or cancelled.
    Finished {
        processed: usize,
        total: usize,
        cancelled: bool,
    },
}

/// Receives progress events from the orchestrator.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "analyze  12 / 40 rows".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Started { total } => {
                format!("analyze  starting  {} rows\n", format_number(*total as u64))
            }
            ProgressEvent::Retrying {
                index,
                attempt,
                delay_ms,
            } => format!(
                "analyze  row {}  retrying (attempt {}) in {} ms\n",
                index + 1,
                attempt,
                delay_ms
            ),
            ProgressEvent::RowFinished {
                processed,
                total,
                status,
                ..
            } => format!(
                "analyze  {} / {} rows  [{}]\n",
                format_number(*processed as u64),
                format_number(*total as u64),
                status.label()
            ),
            ProgressEvent::Finished {
                processed,
                total,
                cancelled,
            } => {
                if *cancelled {
                    format!(
                        "analyze  cancelled after {} / {} rows\n",
                        format_number(*processed as u64),
                        format_number(*total as u64)
                    )
                } else {
                    format!("analyze  done  {} rows\n", format_number(*total as u64))
                }
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = event_json(&event);
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

fn event_json(event: &ProgressEvent) -> serde_json::Value {
    match event {
        ProgressEvent::Started { total } => serde_json::json!({
            "event": "started",
            "total": total
        }),
        ProgressEvent::Retrying {
            index,
            attempt,
            delay_ms,
        } => serde_json::json!({
            "event": "retrying",
            "index": index,
            "attempt": attempt,
            "delay_ms": delay_ms
        }),
        ProgressEvent::RowFinished {
            index,
            processed,
            total,
            status,
        } => serde_json::json!({
            "event": "progress",
            "index": index,
            "n": processed,
            "total": total,
            "status": status.as_str()
        }),
        ProgressEvent::Finished {
            processed,
            total,
            cancelled,
        } => serde_json::json!({
            "event": "finished",
            "n": processed,
            "total": total,
            "cancelled": cancelled
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
