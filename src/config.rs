use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use persona_dedup_core::models::Verdict;
use persona_dedup_core::policy::{MaxAttempts, RetryPolicy};

/// Path used when `--config` is not given. A missing file here is not an
/// error; defaults apply.
pub const DEFAULT_CONFIG_PATH: &str = "./config/dedup.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    "gemini-flash-lite-latest".to_string()
}
fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `max_attempts` accepts an integer or the string `"unbounded"`.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum MaxAttemptsSetting {
    Count(u32),
    Keyword(String),
}

impl MaxAttemptsSetting {
    pub fn resolve(&self) -> Result<MaxAttempts> {
        match self {
            MaxAttemptsSetting::Count(0) => anyhow::bail!("retry.max_attempts must be >= 1"),
            MaxAttemptsSetting::Count(n) => Ok(MaxAttempts::limited(*n)),
            MaxAttemptsSetting::Keyword(s) => s
                .parse()
                .map_err(|e: String| anyhow::anyhow!("retry.max_attempts: {}", e)),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: MaxAttemptsSetting,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_cap_attempts")]
    pub cap_attempts: u32,
    /// Treat an inconclusive reply as final instead of retrying it.
    #[serde(default)]
    pub accept_inconclusive: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            cap_attempts: default_cap_attempts(),
            accept_inconclusive: false,
        }
    }
}

fn default_max_attempts() -> MaxAttemptsSetting {
    MaxAttemptsSetting::Count(3)
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_cap_attempts() -> u32 {
    5
}

impl RetryConfig {
    pub fn policy(&self) -> Result<RetryPolicy> {
        let policy = RetryPolicy::new(
            self.max_attempts.resolve()?,
            Duration::from_millis(self.base_delay_ms),
            self.cap_attempts,
        );
        if self.accept_inconclusive {
            Ok(policy.accepting([Verdict::Same, Verdict::Different, Verdict::Inconclusive]))
        } else {
            Ok(policy)
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    /// Wait after each row before starting the next one.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            pacing_ms: default_pacing_ms(),
        }
    }
}

fn default_pacing_ms() -> u64 {
    250
}

impl BatchConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path`, or fall back to defaults when `path` is the default location
/// and nothing is there.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG_PATH) {
        tracing::debug!(path = %path.display(), "no config file; using defaults");
        return Ok(Config::default());
    }
    load_config(path)
}

pub fn validate(config: &Config) -> Result<()> {
    match config.classifier.provider.as_str() {
        "gemini" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown classifier provider: '{}'. Must be gemini or disabled.",
            other
        ),
    }

    if config.classifier.model.trim().is_empty() {
        anyhow::bail!("classifier.model must not be empty");
    }

    if config.classifier.timeout_secs == 0 {
        anyhow::bail!("classifier.timeout_secs must be >= 1");
    }

    if config.retry.cap_attempts == 0 {
        anyhow::bail!("retry.cap_attempts must be >= 1");
    }

    config.retry.max_attempts.resolve()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.classifier.provider, "gemini");
        assert_eq!(config.classifier.model, "gemini-flash-lite-latest");
        assert_eq!(config.batch.pacing_ms, 250);
        let policy = config.retry.policy().unwrap();
        assert_eq!(policy.max_attempts, MaxAttempts::limited(3));
        assert!(!policy.accepts(Verdict::Inconclusive));
    }

    #[test]
    fn unbounded_keyword() {
        let config: Config = toml::from_str(
            r#"[retry]
max_attempts = "unbounded"
base_delay_ms = 2000
cap_attempts = 4
"#,
        )
        .unwrap();
        let policy = config.retry.policy().unwrap();
        assert_eq!(policy.max_attempts, MaxAttempts::Unbounded);
        assert_eq!(policy.backoff(9), Duration::from_millis(8000));
    }

    #[test]
    fn zero_attempts_rejected() {
        let config: Config = toml::from_str("[retry]\nmax_attempts = 0\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn unknown_provider_rejected() {
        let config: Config = toml::from_str("[classifier]\nprovider = \"openai\"\n").unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("openai"));
    }

    #[test]
    fn accept_inconclusive_extends_policy() {
        let config: Config = toml::from_str("[retry]\naccept_inconclusive = true\n").unwrap();
        assert!(config.retry.policy().unwrap().accepts(Verdict::Inconclusive));
    }

    #[test]
    fn explicit_missing_path_is_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nope.toml");
        assert!(load_config_or_default(&path).is_err());
    }

    #[test]
    fn example_config_parses() {
        let config: Config =
            toml::from_str(include_str!("../config/dedup.example.toml")).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.batch.pacing(), Duration::from_millis(250));
        assert_eq!(config.retry.policy().unwrap(), RetryPolicy::default());
    }
}
