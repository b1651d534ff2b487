//! Batch orchestration.
//!
//! Runs the row processor over every record of a batch, strictly one row at
//! a time in index order, and gathers the results into a
//! [`BatchState`]. A row that exhausts its retries still contributes an
//! `ERROR` result and the batch moves on; only problems detected before the
//! first row (unreadable file, no rows) fail the batch.
//!
//! After each row the orchestrator records the result, reports
//! `(processed, total)` progress, then waits the pacing delay. Pacing is
//! independent of the per-row retry backoff and bounds the aggregate request
//! rate to the classifier.

use std::time::Duration;

use thiserror::Error;

use persona_dedup_core::batch::BatchState;
use persona_dedup_core::classifier::Classifier;
use persona_dedup_core::models::{NamePairRecord, RowResult, RowStatus};
use persona_dedup_core::policy::RetryPolicy;

use crate::cancel::CancelToken;
use crate::processor::{process_row, RowProcessed};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::source::SourceError;

/// Batch-fatal conditions. Reported once, before any row runs.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("The file is empty or could not be parsed.")]
    Empty,
}

/// Outcome of a batch run.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// One result per finished row, ordered by record index.
    pub results: Vec<RowResult>,
    pub total: usize,
    /// Set when the run stopped early; `results` then holds only the rows
    /// finished before cancellation.
    pub cancelled: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub same: usize,
    pub different: usize,
    pub inconclusive: usize,
    pub error: usize,
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for result in &self.results {
            match result.status {
                RowStatus::Same => summary.same += 1,
                RowStatus::Different => summary.different += 1,
                RowStatus::Inconclusive => summary.inconclusive += 1,
                RowStatus::Error => summary.error += 1,
            }
        }
        summary
    }

    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.results.len() == self.total
    }
}

/// Classify every record of a batch.
///
/// `records` is the Batch Source's output as-is so an upstream parse
/// failure takes the same batch-fatal path as an empty file.
pub async fn run_batch(
    records: Result<Vec<NamePairRecord>, SourceError>,
    classifier: &dyn Classifier,
    policy: &RetryPolicy,
    pacing: Duration,
    reporter: &dyn ProgressReporter,
    cancel: &CancelToken,
) -> Result<BatchReport, BatchError> {
    let mut state = BatchState::default();
    let fatal = match records {
        Ok(records) if !records.is_empty() => {
            state.reset(records);
            None
        }
        Ok(_) => Some(BatchError::Empty),
        Err(e) => Some(BatchError::Source(e)),
    };
    if let Some(error) = fatal {
        state.fail(error.to_string());
        tracing::error!(
            error = state.error_message().unwrap_or_default(),
            "batch not started"
        );
        return Err(error);
    }

    let started = tokio::time::Instant::now();
    let total = state.total();
    let mut cancelled = false;

    tracing::info!(
        rows = total,
        classifier = classifier.name(),
        max_attempts = %policy.max_attempts,
        pacing_ms = pacing.as_millis() as u64,
        "batch started"
    );
    reporter.report(ProgressEvent::Started { total });

    for i in 0..total {
        let record = state.records()[i].clone();
        let result = match process_row(classifier, &record, policy, reporter, cancel).await {
            RowProcessed::Done(result) => result,
            RowProcessed::Cancelled { attempts } => {
                tracing::warn!(row = record.index, attempts, "batch cancelled mid-row");
                cancelled = true;
                break;
            }
        };

        let status = result.status;
        if let Err(e) = state.record(result) {
            tracing::error!(row = record.index, error = %e, "result not recorded");
        }
        reporter.report(ProgressEvent::RowFinished {
            index: record.index,
            processed: state.processed(),
            total,
            status,
        });

        if !cancel.sleep(pacing).await && !state.is_complete() {
            tracing::warn!(processed = state.processed(), total, "batch cancelled between rows");
            cancelled = true;
            break;
        }
    }

    reporter.report(ProgressEvent::Finished {
        processed: state.processed(),
        total,
        cancelled,
    });

    let report = BatchReport {
        results: state.into_results(),
        total,
        cancelled,
        elapsed: started.elapsed(),
    };
    let summary = report.summary();
    tracing::info!(
        processed = report.results.len(),
        total,
        same = summary.same,
        different = summary.different,
        inconclusive = summary.inconclusive,
        error = summary.error,
        cancelled,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "batch finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use persona_dedup_core::models::Verdict;
    use persona_dedup_core::policy::MaxAttempts;
    use tokio::time::Instant;

    use crate::progress::NoProgress;
    use crate::testing::{records, RecordingReporter, Reply, ScriptedClassifier};

    const NAMES: &[(&str, &str)] = &[
        ("Ada Lovelace", "Augusta Ada King"),
        ("Alan Turing", "A. M. Turing"),
        ("Marie Curie", "Pierre Curie"),
        ("Jane \"JJ\" Doe", "Jane Doe"),
        ("Nikola Tesla", "Thomas Edison"),
    ];

    fn policy() -> RetryPolicy {
        RetryPolicy::new(MaxAttempts::limited(3), Duration::from_millis(100), 5)
    }

    #[tokio::test(start_paused = true)]
    async fn output_matches_input_order_and_length() {
        let classifier = ScriptedClassifier::new(
            vec![
                Reply::Verdict(Verdict::Same),
                Reply::Fail,
                Reply::Verdict(Verdict::Inconclusive),
                Reply::Verdict(Verdict::Same),
                Reply::Verdict(Verdict::Different),
            ],
            Reply::Verdict(Verdict::Different),
        );
        let input = records(NAMES);
        let report = run_batch(
            Ok(input.clone()),
            &classifier,
            &policy(),
            Duration::from_millis(250),
            &NoProgress,
            &CancelToken::new(),
        )
        .await
        .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.results.len(), input.len());
        for (result, record) in report.results.iter().zip(&input) {
            assert_eq!(result.index, record.index);
            assert_eq!(result.original, record.original);
            assert_eq!(result.duplicate, record.duplicate);
        }
        assert_eq!(report.results[0].status, RowStatus::Same);
        assert_eq!(report.results[1].status, RowStatus::Same);
        assert_eq!(report.results[1].attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rows_run_strictly_in_sequence() {
        let classifier = ScriptedClassifier::new(
            vec![Reply::Fail, Reply::Verdict(Verdict::Same)],
            Reply::Verdict(Verdict::Different),
        );
        run_batch(
            Ok(records(&NAMES[..3])),
            &classifier,
            &policy(),
            Duration::ZERO,
            &NoProgress,
            &CancelToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(classifier.calls(), vec![0, 0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_rows_do_not_abort_batch() {
        let classifier = ScriptedClassifier::always(Reply::Fail);
        let report = run_batch(
            Ok(records(NAMES)),
            &classifier,
            &policy(),
            Duration::from_millis(250),
            &NoProgress,
            &CancelToken::new(),
        )
        .await
        .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.summary().error, NAMES.len());
        assert_eq!(classifier.calls().len(), NAMES.len() * 3);
    }

    #[tokio::test]
    async fn empty_batch_is_fatal_and_makes_no_calls() {
        let classifier = ScriptedClassifier::always(Reply::Verdict(Verdict::Same));
        let reporter = RecordingReporter::default();
        let err = run_batch(
            Ok(Vec::new()),
            &classifier,
            &policy(),
            Duration::ZERO,
            &reporter,
            &CancelToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BatchError::Empty));
        assert_eq!(err.to_string(), "The file is empty or could not be parsed.");
        assert!(classifier.calls().is_empty());
        assert!(reporter.events().is_empty());
    }

    #[tokio::test]
    async fn source_failure_is_fatal() {
        let classifier = ScriptedClassifier::always(Reply::Verdict(Verdict::Same));
        let err = run_batch(
            Err(SourceError::MissingColumns {
                found: vec!["Name".to_string()],
            }),
            &classifier,
            &policy(),
            Duration::ZERO,
            &NoProgress,
            &CancelToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BatchError::Source(_)));
        assert!(err.to_string().contains("'Original' and 'Duplicates'"));
        assert!(classifier.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_runs_are_identical() {
        let mut outputs = Vec::new();
        for _ in 0..2 {
            let classifier = ScriptedClassifier::always(Reply::Cited(
                Verdict::Same,
                vec![("https://a.example", "A"), ("https://a.example", "A2")],
            ));
            let report = run_batch(
                Ok(records(NAMES)),
                &classifier,
                &policy(),
                Duration::from_millis(10),
                &NoProgress,
                &CancelToken::new(),
            )
            .await
            .unwrap();
            outputs.push(serde_json::to_vec(&report.results).unwrap());
        }
        assert_eq!(outputs[0], outputs[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_counts_up_to_total() {
        let classifier = ScriptedClassifier::always(Reply::Verdict(Verdict::Different));
        let reporter = RecordingReporter::default();
        run_batch(
            Ok(records(&NAMES[..3])),
            &classifier,
            &policy(),
            Duration::ZERO,
            &reporter,
            &CancelToken::new(),
        )
        .await
        .unwrap();

        let events = reporter.events();
        assert_eq!(events.first(), Some(&ProgressEvent::Started { total: 3 }));
        let processed: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::RowFinished {
                    processed, total, ..
                } => {
                    assert_eq!(*total, 3);
                    Some(*processed)
                }
                _ => None,
            })
            .collect();
        assert_eq!(processed, vec![1, 2, 3]);
        assert_eq!(
            events.last(),
            Some(&ProgressEvent::Finished {
                processed: 3,
                total: 3,
                cancelled: false
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_follows_every_row() {
        let classifier = ScriptedClassifier::always(Reply::Verdict(Verdict::Same));
        let start = Instant::now();
        let report = run_batch(
            Ok(records(&NAMES[..3])),
            &classifier,
            &policy(),
            Duration::from_millis(250),
            &NoProgress,
            &CancelToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(750));
        assert_eq!(report.elapsed, Duration::from_millis(750));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_between_rows_keeps_finished_results() {
        let classifier = ScriptedClassifier::always(Reply::Verdict(Verdict::Same));
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(600)).await;
            remote.cancel();
        });
        let report = run_batch(
            Ok(records(NAMES)),
            &classifier,
            &policy(),
            Duration::from_millis(250),
            &NoProgress,
            &cancel,
        )
        .await
        .unwrap();
        assert!(report.cancelled);
        assert!(!report.is_complete());
        let indices: Vec<usize> = report.results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn summary_counts_statuses() {
        let classifier = ScriptedClassifier::new(
            vec![
                Reply::Verdict(Verdict::Same),
                Reply::Verdict(Verdict::Different),
            ],
            Reply::Fail,
        );
        let report = run_batch(
            Ok(records(&NAMES[..3])),
            &classifier,
            &RetryPolicy::single_shot(),
            Duration::ZERO,
            &NoProgress,
            &CancelToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(
            report.summary(),
            BatchSummary {
                same: 1,
                different: 1,
                inconclusive: 0,
                error: 1
            }
        );
    }
}
