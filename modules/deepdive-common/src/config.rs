use std::env;
use std::str::FromStr;

use tracing::info;

use crate::error::DeepDiveError;

/// Which structured completion backend the engine talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiProvider {
    Claude,
    OpenAi,
}

impl AiProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiProvider::Claude => "claude",
            AiProvider::OpenAi => "openai",
        }
    }
}

impl FromStr for AiProvider {
    type Err = DeepDiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "claude" | "anthropic" => Ok(AiProvider::Claude),
            "openai" => Ok(AiProvider::OpenAi),
            other => Err(DeepDiveError::Config(format!(
                "DEEP_DIVE_AI_PROVIDER must be claude or openai, got {other}"
            ))),
        }
    }
}

/// Tunable limits of one deep dive run.
///
/// None of these are known-optimal; they bound cost and drift.
#[derive(Debug, Clone, PartialEq)]
pub struct DeepDiveConfig {
    pub max_search_results: usize,
    pub search_results_per_query: usize,
    pub max_urls_per_type: usize,
    pub max_dossiers: usize,
    pub max_highlights: usize,
    pub max_query_count: usize,
    pub max_search_warnings: usize,
    pub expansion_waves: usize,
    pub identity_min_confidence: f64,
    pub identity_reason_max_len: usize,
    pub website_clue_matches_required: usize,
    pub max_identity_clue_tokens: usize,
    pub max_redirect_hops: usize,
    pub max_emails: usize,
}

impl Default for DeepDiveConfig {
    fn default() -> Self {
        Self {
            max_search_results: 30,
            search_results_per_query: 10,
            max_urls_per_type: 2,
            max_dossiers: 14,
            max_highlights: 6,
            max_query_count: 10,
            max_search_warnings: 4,
            expansion_waves: 3,
            identity_min_confidence: 0.82,
            identity_reason_max_len: 280,
            website_clue_matches_required: 2,
            max_identity_clue_tokens: 28,
            max_redirect_hops: 3,
            max_emails: 20,
        }
    }
}

impl DeepDiveConfig {
    /// Defaults with the handful of env overrides operators actually tune.
    pub fn from_env() -> Result<Self, DeepDiveError> {
        let defaults = Self::default();
        Ok(Self {
            max_urls_per_type: parsed_env("DEEP_DIVE_MAX_URLS_PER_TYPE", defaults.max_urls_per_type)?,
            max_dossiers: parsed_env("DEEP_DIVE_MAX_DOSSIERS", defaults.max_dossiers)?,
            expansion_waves: parsed_env("DEEP_DIVE_WAVES", defaults.expansion_waves)?,
            identity_min_confidence: parsed_env(
                "DEEP_DIVE_MIN_CONFIDENCE",
                defaults.identity_min_confidence,
            )?,
            ..defaults
        })
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // AI providers
    pub ai_provider: AiProvider,
    pub ai_model: String,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,

    // Scraping
    pub serper_api_key: String,
    pub browserless_url: String,
    pub browserless_token: Option<String>,

    // Storage
    pub database_url: Option<String>,

    pub deep_dive: DeepDiveConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, DeepDiveError> {
        let ai_provider: AiProvider = env::var("DEEP_DIVE_AI_PROVIDER")
            .unwrap_or_else(|_| "claude".to_string())
            .parse()?;
        let default_model = match ai_provider {
            AiProvider::Claude => "claude-haiku-4-5-20251001",
            AiProvider::OpenAi => "gpt-4o-mini",
        };
        let anthropic_api_key = optional_env("ANTHROPIC_API_KEY");
        let openai_api_key = optional_env("OPENAI_API_KEY");

        match ai_provider {
            AiProvider::Claude if anthropic_api_key.is_none() => {
                return Err(DeepDiveError::Config(
                    "ANTHROPIC_API_KEY environment variable is required".into(),
                ))
            }
            AiProvider::OpenAi if openai_api_key.is_none() => {
                return Err(DeepDiveError::Config(
                    "OPENAI_API_KEY environment variable is required".into(),
                ))
            }
            _ => {}
        }

        Ok(Self {
            ai_provider,
            ai_model: env::var("DEEP_DIVE_MODEL").unwrap_or_else(|_| default_model.to_string()),
            anthropic_api_key,
            openai_api_key,
            serper_api_key: required_env("SERPER_API_KEY")?,
            browserless_url: env::var("BROWSERLESS_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            browserless_token: optional_env("BROWSERLESS_TOKEN"),
            database_url: optional_env("DATABASE_URL"),
            deep_dive: DeepDiveConfig::from_env()?,
        })
    }

    /// Log the effective configuration without secrets.
    pub fn log_redacted(&self) {
        info!(
            ai_provider = self.ai_provider.as_str(),
            ai_model = self.ai_model.as_str(),
            browserless_url = self.browserless_url.as_str(),
            browserless_token = self.browserless_token.is_some(),
            database = self.database_url.is_some(),
            max_urls_per_type = self.deep_dive.max_urls_per_type,
            max_dossiers = self.deep_dive.max_dossiers,
            expansion_waves = self.deep_dive.expansion_waves,
            "Deep dive config loaded"
        );
    }
}

fn required_env(key: &str) -> Result<String, DeepDiveError> {
    optional_env(key)
        .ok_or_else(|| DeepDiveError::Config(format!("{key} environment variable is required")))
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_env<T: FromStr>(key: &str, default: T) -> Result<T, DeepDiveError> {
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| DeepDiveError::Config(format!("{key} must be a number, got {raw}"))),
        None => Ok(default),
    }
}
