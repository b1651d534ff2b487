//! Row processor: resolve one name pair to exactly one result.
//!
//! Drives a single [`NamePairRecord`] through the classifier until the
//! retry policy accepts a verdict or runs out of attempts.
//!
//! # Retry Strategy
//!
//! - Classifier error (network, HTTP status, malformed body) → retry
//! - Reply outside the policy's accepted verdicts (by default an
//!   inconclusive reply) → retry
//! - Attempts exhausted → terminal
//!   [`RowStatus::Error`](persona_dedup_core::models::RowStatus::Error) result, no citations
//! - Wait before attempt `n >= 2` is `policy.backoff(n)`; attempt 1 is immediate
//!
//! Nothing here returns an error to the caller. Inter-row pacing is the
//! orchestrator's job, not this module's.

use persona_dedup_core::classifier::Classifier;
use persona_dedup_core::models::{NamePairRecord, RowResult};
use persona_dedup_core::policy::RetryPolicy;

use crate::cancel::CancelToken;
use crate::progress::{ProgressEvent, ProgressReporter};

/// What happened to a row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowProcessed {
    /// The row resolved (classified or exhausted).
    Done(RowResult),
    /// Cancellation was requested before the row resolved.
    Cancelled { attempts: u32 },
}

pub async fn process_row(
    classifier: &dyn Classifier,
    record: &NamePairRecord,
    policy: &RetryPolicy,
    reporter: &dyn ProgressReporter,
    cancel: &CancelToken,
) -> RowProcessed {
    let mut attempt: u32 = 1;

    loop {
        if cancel.is_cancelled() {
            return RowProcessed::Cancelled {
                attempts: attempt - 1,
            };
        }

        match classifier.classify(record).await {
            Ok(classification) if policy.accepts(classification.verdict) => {
                tracing::debug!(
                    row = record.index,
                    attempt,
                    verdict = classification.verdict.as_str(),
                    citations = classification.citations.len(),
                    "row classified"
                );
                return RowProcessed::Done(RowResult::classified(record, classification, attempt));
            }
            Ok(classification) => {
                tracing::warn!(
                    row = record.index,
                    attempt,
                    verdict = classification.verdict.as_str(),
                    "verdict not accepted; will retry if attempts remain"
                );
            }
            Err(e) => {
                tracing::warn!(
                    row = record.index,
                    attempt,
                    error = %e,
                    "classifier call failed"
                );
            }
        }

        let next = attempt.saturating_add(1);
        if !policy.has_attempt(next) {
            tracing::warn!(
                row = record.index,
                attempts = attempt,
                "retries exhausted; marking row as error"
            );
            return RowProcessed::Done(RowResult::failed(record, attempt));
        }

        let delay = policy.delay_before(next);
        reporter.report(ProgressEvent::Retrying {
            index: record.index,
            attempt: next,
            delay_ms: delay.as_millis() as u64,
        });
        if !cancel.sleep(delay).await {
            return RowProcessed::Cancelled { attempts: attempt };
        }
        attempt = next;
    }
}
