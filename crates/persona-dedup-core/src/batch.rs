//! Per-batch result state.
//!
//! [`BatchState`] is created when a batch starts and dropped (or
//! [`reset`](BatchState::reset)) when a new run begins. It holds the
//! ordered records and the results gathered so far, keyed by record index,
//! so results always read back in input order no matter how long any row
//! took to resolve.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::models::{NamePairRecord, RowResult};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchStateError {
    #[error("row {0} already has a result")]
    Duplicate(usize),

    #[error("row {index} is not part of this batch ({total} rows)")]
    UnknownRow { index: usize, total: usize },
}

#[derive(Debug, Clone, Default)]
pub struct BatchState {
    records: Vec<NamePairRecord>,
    results: BTreeMap<usize, RowResult>,
    error_message: Option<String>,
}

impl BatchState {
    pub fn new(records: Vec<NamePairRecord>) -> Self {
        let mut state = Self::default();
        state.reset(records);
        state
    }

    pub fn records(&self) -> &[NamePairRecord] {
        &self.records
    }

    /// Store the result for one row. Each index is accepted exactly once.
    ///
    /// Records are numbered `0..total`, so membership is a position check.
    pub fn record(&mut self, result: RowResult) -> Result<(), BatchStateError> {
        let total = self.records.len();
        let known = self
            .records
            .get(result.index)
            .is_some_and(|r| r.index == result.index);
        if !known {
            return Err(BatchStateError::UnknownRow {
                index: result.index,
                total,
            });
        }
        if self.results.contains_key(&result.index) {
            return Err(BatchStateError::Duplicate(result.index));
        }
        self.results.insert(result.index, result);
        Ok(())
    }

    pub fn processed(&self) -> usize {
        self.results.len()
    }

    pub fn total(&self) -> usize {
        self.records.len()
    }

    pub fn is_complete(&self) -> bool {
        self.results.len() == self.records.len()
    }

    /// Results so far, sorted by record index.
    pub fn results(&self) -> impl Iterator<Item = &RowResult> {
        self.results.values()
    }

    pub fn into_results(self) -> Vec<RowResult> {
        self.results.into_values().collect()
    }

    /// Mark the batch as failed before any row ran. Drops the records so
    /// nothing is processed.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.records.clear();
        self.results.clear();
        self.error_message = Some(message.into());
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Start over with `records`, clearing results and any error.
    pub fn reset(&mut self, records: Vec<NamePairRecord>) {
        self.records = records;
        self.results.clear();
        self.error_message = None;
    }
}
