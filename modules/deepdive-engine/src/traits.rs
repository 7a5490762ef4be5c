// Trait seams for everything a deep dive run talks to.
//
// SearchProvider, ProfileFetcher and StructuredCompletion are the three external
// capabilities; each returns ProviderError so every call site owns its fallback.
// LinkResolver expands shortener links. LeadStore is the only fallible seam
// whose errors abort a run.
//
// The concrete HTTP clients implement these directly; tests use the mocks in
// `testing`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use completion_client::{Claude, CompletionError, OpenAi};
use deepdive_common::{
    DeepDiveError, DeepDiveStatus, LeadOutcome, LeadRecord, ProfileSnapshot, ProfileType,
    ProviderError, SearchOutcome, SearchResult, SocialProfile,
};
use scrape_client::{BrowserlessClient, RedirectResolver, ScrapeError, SerperClient};

// ---------------------------------------------------------------------------
// SearchProvider
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run one web search. `warning` on the outcome is surfaced to users
    /// (for example an exhausted quota) without failing the run.
    async fn search(&self, query: &str, limit: usize) -> Result<SearchOutcome, ProviderError>;
}

#[async_trait]
impl SearchProvider for SerperClient {
    async fn search(&self, query: &str, limit: usize) -> Result<SearchOutcome, ProviderError> {
        let page = SerperClient::search(self, query, limit)
            .await
            .map_err(scrape_failure)?;
        Ok(SearchOutcome {
            results: page
                .hits
                .into_iter()
                .map(|hit| SearchResult {
                    title: hit.title,
                    url: hit.url,
                    snippet: hit.snippet,
                    query: query.to_string(),
                })
                .collect(),
            warning: page.warning,
            source: Some("serper".to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// ProfileFetcher
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    /// Scrape one profile or website. `Ok(None)` means the page had nothing usable.
    async fn fetch(
        &self,
        url: &str,
        profile_type: ProfileType,
        include_about: bool,
    ) -> Result<Option<ProfileSnapshot>, ProviderError>;
}

#[async_trait]
impl ProfileFetcher for BrowserlessClient {
    async fn fetch(
        &self,
        url: &str,
        profile_type: ProfileType,
        include_about: bool,
    ) -> Result<Option<ProfileSnapshot>, ProviderError> {
        let capture = match self.fetch_page(url, include_about).await {
            Ok(capture) => capture,
            Err(ScrapeError::InvalidUrl(_)) => return Ok(None),
            Err(e) => return Err(scrape_failure(e)),
        };
        if capture.title.is_empty() && capture.text.is_empty() && capture.links.is_empty() {
            return Ok(None);
        }
        Ok(Some(ProfileSnapshot {
            url: capture.url,
            final_url: Some(capture.final_url),
            channel_type: profile_type.as_str().to_string(),
            title: capture.title,
            description: capture.description,
            profile_text: capture.text,
            about_url: capture.about_url,
            about_text: capture.about_text.unwrap_or_default(),
            recent_posts: Vec::new(),
            emails: capture.emails,
            links: capture.links,
        }))
    }
}

fn scrape_failure(err: ScrapeError) -> ProviderError {
    match err {
        ScrapeError::Api { status, message } if status == 429 || status >= 500 => {
            ProviderError::Unavailable(format!("status {status}: {message}"))
        }
        ScrapeError::Decode(msg) => ProviderError::Malformed(msg),
        other => ProviderError::Transport(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// StructuredCompletion
// ---------------------------------------------------------------------------

#[async_trait]
pub trait StructuredCompletion: Send + Sync {
    /// Ask for a JSON object matching `schema`.
    async fn complete(&self, system: &str, user: &str, schema: &Value)
        -> Result<Value, ProviderError>;

    /// Recorded in `deep_dive_data.provider`.
    fn provider_name(&self) -> Option<String> {
        None
    }

    /// Recorded in `deep_dive_data.model`.
    fn model_name(&self) -> Option<String> {
        None
    }
}

#[async_trait]
impl StructuredCompletion for Claude {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        schema: &Value,
    ) -> Result<Value, ProviderError> {
        self.complete_json(system, user, schema)
            .await
            .map_err(completion_failure)
    }

    fn provider_name(&self) -> Option<String> {
        Some("claude".to_string())
    }

    fn model_name(&self) -> Option<String> {
        Some(self.model().to_string())
    }
}

#[async_trait]
impl StructuredCompletion for OpenAi {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        schema: &Value,
    ) -> Result<Value, ProviderError> {
        self.complete_json(system, user, schema)
            .await
            .map_err(completion_failure)
    }

    fn provider_name(&self) -> Option<String> {
        Some("openai".to_string())
    }

    fn model_name(&self) -> Option<String> {
        Some(self.model().to_string())
    }
}

fn completion_failure(err: CompletionError) -> ProviderError {
    match err {
        CompletionError::Network(msg) => ProviderError::Transport(msg),
        CompletionError::Api { status, message } => {
            ProviderError::Unavailable(format!("status {status}: {message}"))
        }
        CompletionError::Empty => ProviderError::Malformed("empty completion".to_string()),
        CompletionError::Decode(msg) => ProviderError::Malformed(msg),
    }
}

// ---------------------------------------------------------------------------
// LinkResolver
// ---------------------------------------------------------------------------

#[async_trait]
pub trait LinkResolver: Send + Sync {
    /// Final destination of a shortener link, or `url` itself on any failure.
    async fn expand(&self, url: &str) -> String;
}

#[async_trait]
impl LinkResolver for RedirectResolver {
    async fn expand(&self, url: &str) -> String {
        self.resolve(url).await
    }
}

// ---------------------------------------------------------------------------
// LeadStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait LeadStore: Send + Sync {
    /// The lead with its signals, communications and social profiles.
    async fn load_lead(&self, lead_id: Uuid) -> Result<Option<LeadRecord>, DeepDiveError>;

    async fn social_profiles(&self, lead_id: Uuid) -> Result<Vec<SocialProfile>, DeepDiveError>;

    /// Insert or update by (lead_id, profile_type, url).
    async fn save_social_profile(&self, profile: &SocialProfile) -> Result<(), DeepDiveError>;

    async fn delete_social_profile(&self, profile_id: Uuid) -> Result<(), DeepDiveError>;

    async fn set_status(
        &self,
        lead_id: Uuid,
        status: DeepDiveStatus,
        error: Option<&str>,
        last_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), DeepDiveError>;

    /// Persist a completed run: backfilled fields, `complete` status and data blob.
    async fn save_outcome(&self, lead_id: Uuid, outcome: &LeadOutcome)
        -> Result<(), DeepDiveError>;
}
