//! Classifier backends.
//!
//! Implements the [`Classifier`] trait from `persona-dedup-core`:
//! - **[`DisabledClassifier`]**: always fails; used when no provider is configured.
//! - **[`GeminiClassifier`]**: calls the Gemini `generateContent` endpoint with
//!   Google Search grounding and parses the free-text reply.
//!
//! # Provider Selection
//!
//! Use [`create_classifier`] to instantiate the backend named in
//! `[classifier] provider`:
//!
//! ```rust,no_run
//! # use persona_dedup::config::ClassifierConfig;
//! # use persona_dedup::classifier::create_classifier;
//! let mut config = ClassifierConfig::default();
//! config.provider = "disabled".to_string();
//! let classifier = create_classifier(&config).unwrap();
//! assert_eq!(classifier.name(), "disabled");
//! ```
//!
//! # Failures
//!
//! Backends do not retry. Any network error, non-2xx status, or response
//! without candidates is returned as `Err`; the row processor decides
//! whether to try again.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use persona_dedup_core::classifier::Classifier;
use persona_dedup_core::models::{Citation, Classification, NamePairRecord, Verdict};
use persona_dedup_core::verdict::{dedup_citations, parse_verdict};

use crate::config::ClassifierConfig;

/// Env var consulted when the configured key variable is unset.
const FALLBACK_API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Build the classifier named by `config.provider`.
pub fn create_classifier(config: &ClassifierConfig) -> Result<Box<dyn Classifier>> {
    match config.provider.as_str() {
        "gemini" => Ok(Box::new(GeminiClassifier::new(config)?)),
        "disabled" => Ok(Box::new(DisabledClassifier)),
        other => bail!("Unknown classifier provider: {}", other),
    }
}

/// The prompt sent for one pair. Asks for exactly one of two tokens.
pub fn build_prompt(pair: &NamePairRecord) -> String {
    format!(
        "Analyze if the following two names refer to the same person.\n\
         Name 1: \"{}\"\n\
         Name 2: \"{}\"\n\
         \n\
         Use Google Search to verify their identities.\n\
         \n\
         Your response MUST be one of these two words, and nothing else: \"SAME\" or \"DIFFERENT\".",
        pair.original, pair.duplicate
    )
}

// ============ Disabled ============

/// A classifier that refuses every request.
pub struct DisabledClassifier;

#[async_trait]
impl Classifier for DisabledClassifier {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn classify(&self, _pair: &NamePairRecord) -> Result<Classification> {
        bail!("Classifier provider is disabled. Set [classifier] provider in config.")
    }
}

// ============ Gemini ============

/// Classifier backed by the Gemini API with the `google_search` tool enabled.
///
/// Calls `POST {api_base}/models/{model}:generateContent`. The API key is
/// read from the environment at construction time.
pub struct GeminiClassifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    name: String,
}

impl GeminiClassifier {
    /// # Errors
    ///
    /// Returns an error if neither the configured key variable nor
    /// `GOOGLE_API_KEY` is set, or the HTTP client cannot be built.
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .or_else(|_| std::env::var(FALLBACK_API_KEY_ENV))
            .map_err(|_| {
                anyhow::anyhow!(
                    "{} environment variable not set (needed by the gemini classifier)",
                    config.api_key_env
                )
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let endpoint = format!(
            "{}/models/{}:generateContent",
            config.api_base.trim_end_matches('/'),
            config.model
        );

        Ok(Self {
            client,
            endpoint,
            api_key,
            name: format!("gemini:{}", config.model),
        })
    }
}

#[async_trait]
impl Classifier for GeminiClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn classify(&self, pair: &NamePairRecord) -> Result<Classification> {
        let body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": build_prompt(pair) }],
            }],
            "tools": [{ "google_search": {} }],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Gemini API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        let (text, classification) = parse_generate_response(&json)?;
        if classification.verdict == Verdict::Inconclusive {
            tracing::warn!(
                row = pair.index,
                reply = %text,
                "unexpected response format from classifier"
            );
        }
        Ok(classification)
    }
}

/// Parse a `generateContent` response body.
///
/// Returns the reply text alongside the classification. The text is the
/// concatenation of every text part of the first candidate; citations come
/// from its `groundingMetadata.groundingChunks[].web` entries.
pub fn parse_generate_response(json: &serde_json::Value) -> Result<(String, Classification)> {
    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing candidates"))?;

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let citations = candidate
        .pointer("/groundingMetadata/groundingChunks")
        .and_then(|c| c.as_array())
        .map(|chunks| {
            chunks
                .iter()
                .filter_map(|chunk| {
                    let web = chunk.get("web")?;
                    let uri = web.get("uri")?.as_str()?;
                    let title = web.get("title").and_then(|t| t.as_str()).unwrap_or("");
                    Citation::new(uri, title)
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let verdict = parse_verdict(&text);
    let text = text.trim().to_string();
    Ok((text, Classification::new(verdict, dedup_citations(citations))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_quotes_both_names() {
        let pair = NamePairRecord::new(0, "Marie Curie", "Maria Skłodowska");
        let prompt = build_prompt(&pair);
        assert!(prompt.contains("Name 1: \"Marie Curie\""));
        assert!(prompt.contains("Name 2: \"Maria Skłodowska\""));
        assert!(prompt.contains("\"SAME\" or \"DIFFERENT\""));
    }

    #[test]
    fn parses_text_and_grounding() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "SAME\n" }] },
                "groundingMetadata": {
                    "groundingChunks": [
                        { "web": { "uri": "https://en.wikipedia.org/wiki/Marie_Curie", "title": "Marie Curie" } },
                        { "web": { "uri": "https://en.wikipedia.org/wiki/Marie_Curie", "title": "Marie Curie - Wikipedia" } },
                        { "web": { "uri": "", "title": "empty" } },
                        { "retrievedContext": { "uri": "ignored" } },
                        { "web": { "uri": "https://nobelprize.org/curie" } }
                    ]
                }
            }]
        });
        let (text, classification) = parse_generate_response(&body).unwrap();
        assert_eq!(text, "SAME");
        assert_eq!(classification.verdict, Verdict::Same);
        assert_eq!(classification.citations.len(), 2);
        assert_eq!(classification.citations[0].title, "Marie Curie - Wikipedia");
        assert_eq!(classification.citations[1].title, "");
    }

    #[test]
    fn multi_part_text_is_joined() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "DIFF" }, { "text": "ERENT" }] } }]
        });
        let (_, classification) = parse_generate_response(&body).unwrap();
        assert_eq!(classification.verdict, Verdict::Different);
        assert!(classification.citations.is_empty());
    }

    #[test]
    fn no_text_is_inconclusive() {
        let body = json!({ "candidates": [{ "finishReason": "SAFETY" }] });
        let (text, classification) = parse_generate_response(&body).unwrap();
        assert!(text.is_empty());
        assert_eq!(classification.verdict, Verdict::Inconclusive);
    }

    #[test]
    fn missing_candidates_is_error() {
        assert!(parse_generate_response(&json!({ "promptFeedback": {} })).is_err());
        assert!(parse_generate_response(&json!({ "candidates": [] })).is_err());
    }

    #[tokio::test]
    async fn disabled_always_fails() {
        let pair = NamePairRecord::new(0, "a", "b");
        let err = DisabledClassifier.classify(&pair).await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }
}
