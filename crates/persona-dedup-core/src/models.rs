//! Core data models used throughout persona-dedup.
//!
//! These types represent the name pairs loaded from a spreadsheet, the
//! classifier's reply for one pair, and the per-row result that flows to
//! the results table and CSV export.

use serde::Serialize;

/// One row of the uploaded batch: two names that may denote the same person.
///
/// `index` is 0-based and assigned once when the batch is loaded; it is the
/// key used to keep results in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamePairRecord {
    pub index: usize,
    pub original: String,
    pub duplicate: String,
}

impl NamePairRecord {
    pub fn new(index: usize, original: impl Into<String>, duplicate: impl Into<String>) -> Self {
        Self {
            index,
            original: original.into(),
            duplicate: duplicate.into(),
        }
    }
}

/// What the classifier said about a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Same,
    Different,
    /// The classifier answered but the reply matched neither token.
    Inconclusive,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Same => "SAME",
            Self::Different => "DIFFERENT",
            Self::Inconclusive => "INCONCLUSIVE",
        }
    }
}

/// A web source the classifier grounded its answer on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub uri: String,
    /// May be empty; displays fall back to the URI.
    pub title: String,
}

impl Citation {
    /// Returns `None` when `uri` is empty or only whitespace.
    pub fn new(uri: impl Into<String>, title: impl Into<String>) -> Option<Self> {
        let uri = uri.into();
        if uri.trim().is_empty() {
            return None;
        }
        Some(Self {
            uri,
            title: title.into(),
        })
    }

    /// The text to show for this source: the title, or the URI when untitled.
    pub fn label(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.uri
        } else {
            &self.title
        }
    }
}

/// A successful classifier reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub verdict: Verdict,
    pub citations: Vec<Citation>,
}

impl Classification {
    pub fn new(verdict: Verdict, citations: Vec<Citation>) -> Self {
        Self { verdict, citations }
    }
}

/// Final status of a row in the results table.
///
/// `Error` is the terminal-failure marker used when retries are exhausted;
/// it is distinct from `Inconclusive`, which only appears when the retry
/// policy accepts inconclusive replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowStatus {
    Same,
    Different,
    Inconclusive,
    Error,
}

impl RowStatus {
    /// Tag written to the CSV `Analysis` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Same => "SAME",
            Self::Different => "DIFFERENT",
            Self::Inconclusive => "INCONCLUSIVE",
            Self::Error => "ERROR",
        }
    }

    /// Badge text for the results table.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Same => "Same Person",
            Self::Different => "Different",
            Self::Inconclusive => "Inconclusive",
            Self::Error => "Error",
        }
    }
}

impl From<Verdict> for RowStatus {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Same => RowStatus::Same,
            Verdict::Different => RowStatus::Different,
            Verdict::Inconclusive => RowStatus::Inconclusive,
        }
    }
}

/// The single, immutable outcome for one [`NamePairRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowResult {
    pub index: usize,
    pub original: String,
    pub duplicate: String,
    pub status: RowStatus,
    pub citations: Vec<Citation>,
    /// Classifier invocations spent on this row.
    pub attempts: u32,
}

impl RowResult {
    /// Result for a row the classifier resolved.
    pub fn classified(record: &NamePairRecord, classification: Classification, attempts: u32) -> Self {
        Self {
            index: record.index,
            original: record.original.clone(),
            duplicate: record.duplicate.clone(),
            status: classification.verdict.into(),
            citations: classification.citations,
            attempts,
        }
    }

    /// Terminal-failure result: retries exhausted, no citations.
    pub fn failed(record: &NamePairRecord, attempts: u32) -> Self {
        Self {
            index: record.index,
            original: record.original.clone(),
            duplicate: record.duplicate.clone(),
            status: RowStatus::Error,
            citations: Vec::new(),
            attempts,
        }
    }
}
