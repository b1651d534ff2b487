//! Classifier trait.
//!
//! Defines the interface every identity classifier backend implements.
//! Concrete backends (the Gemini client, the disabled placeholder) live in
//! the `persona-dedup` app crate; tests supply scripted stubs.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Classification, NamePairRecord};

/// Decides whether the two names of a record denote the same person.
///
/// `Ok` means the classifier answered, even if the answer is
/// [`Verdict::Inconclusive`](crate::models::Verdict::Inconclusive).
/// `Err` is a transport-level failure (network, HTTP status, malformed
/// response) and carries no verdict.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short backend identifier for logs (e.g. `"gemini:gemini-flash-lite-latest"`).
    fn name(&self) -> &str;

    async fn classify(&self, pair: &NamePairRecord) -> Result<Classification>;
}
