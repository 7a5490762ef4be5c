// Test mocks for the deep dive pipeline.
//
// One mock per provider seam:
// - MockSearch (SearchProvider): query -> canned outcome, records calls
// - MockFetcher (ProfileFetcher): url -> snapshot, or a generator closure
// - ScriptedCompletion (StructuredCompletion): fixed reply or handler closure
// - NoRedirects / FixedRedirects (LinkResolver)
//
// The in-memory LeadStore lives in `store::memory` since the CLI uses it too.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use deepdive_common::{ProfileSnapshot, ProfileType, ProviderError, SearchOutcome, SearchResult};

use crate::traits::{LinkResolver, ProfileFetcher, SearchProvider, StructuredCompletion};

// ---------------------------------------------------------------------------
// MockSearch
// ---------------------------------------------------------------------------

/// Canned search outcomes per query. Unknown queries return no results.
pub struct MockSearch {
    outcomes: HashMap<String, SearchOutcome>,
    failure: Option<ProviderError>,
    calls: Mutex<Vec<String>>,
}

impl MockSearch {
    pub fn new() -> Self {
        Self {
            outcomes: HashMap::new(),
            failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on_query(self, query: &str, results: Vec<SearchResult>) -> Self {
        self.on_outcome(
            query,
            SearchOutcome {
                results,
                warning: None,
                source: None,
            },
        )
    }

    pub fn on_outcome(mut self, query: &str, outcome: SearchOutcome) -> Self {
        self.outcomes.insert(query.to_string(), outcome);
        self
    }

    /// Every query fails with `error`.
    pub fn failing(mut self, error: ProviderError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<SearchOutcome, ProviderError> {
        self.calls.lock().unwrap().push(query.to_string());
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        let mut outcome = self.outcomes.get(query).cloned().unwrap_or_default();
        outcome.results.truncate(limit);
        Ok(outcome)
    }
}

/// Search hit with `query` filled in by the aggregator.
pub fn search_hit(url: &str, title: &str, snippet: &str) -> SearchResult {
    SearchResult {
        title: title.to_string(),
        url: url.to_string(),
        snippet: snippet.to_string(),
        query: String::new(),
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

type SnapshotFn = Box<dyn Fn(&str, ProfileType) -> Option<ProfileSnapshot> + Send + Sync>;

/// URL -> snapshot fetcher. Unregistered URLs return `Ok(None)` unless a
/// generator is installed.
pub struct MockFetcher {
    pages: HashMap<String, ProfileSnapshot>,
    failures: HashMap<String, ProviderError>,
    generator: Option<SnapshotFn>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            failures: HashMap::new(),
            generator: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on_page(mut self, url: &str, snapshot: ProfileSnapshot) -> Self {
        self.pages.insert(url.to_string(), snapshot);
        self
    }

    pub fn on_failure(mut self, url: &str, error: ProviderError) -> Self {
        self.failures.insert(url.to_string(), error);
        self
    }

    /// Build snapshots on the fly for any URL without a registered page.
    pub fn generate<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, ProfileType) -> Option<ProfileSnapshot> + Send + Sync + 'static,
    {
        self.generator = Some(Box::new(f));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileFetcher for MockFetcher {
    async fn fetch(
        &self,
        url: &str,
        profile_type: ProfileType,
        _include_about: bool,
    ) -> Result<Option<ProfileSnapshot>, ProviderError> {
        self.calls.lock().unwrap().push(url.to_string());
        if let Some(error) = self.failures.get(url) {
            return Err(error.clone());
        }
        if let Some(page) = self.pages.get(url) {
            return Ok(Some(page.clone()));
        }
        Ok(self.generator.as_ref().and_then(|g| g(url, profile_type)))
    }
}

/// Snapshot of `url` carrying `links`.
pub fn snapshot(url: &str, profile_type: ProfileType, title: &str, links: &[&str]) -> ProfileSnapshot {
    ProfileSnapshot {
        url: url.to_string(),
        final_url: None,
        channel_type: profile_type.as_str().to_string(),
        title: title.to_string(),
        links: links.iter().map(|l| l.to_string()).collect(),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// ScriptedCompletion
// ---------------------------------------------------------------------------

type Handler = Box<dyn Fn(&str, &str) -> Result<Value, ProviderError> + Send + Sync>;

/// Structured completion with scripted replies. Without a script every call
/// reports the provider as unavailable.
pub struct ScriptedCompletion {
    handler: Option<Handler>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self {
            handler: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self::new()
    }

    /// Same reply to every call.
    pub fn respond_with(self, reply: Value) -> Self {
        self.with_handler(move |_, _| Ok(reply.clone()))
    }

    /// Identity verdict `accept` at `confidence` for every call.
    pub fn accept(confidence: f64) -> Self {
        Self::new().respond_with(json!({
            "decision": "accept",
            "confidence": confidence,
            "reason": "Scripted accept."
        }))
    }

    /// Identity verdict `reject` at `confidence` for every call.
    pub fn reject(confidence: f64) -> Self {
        Self::new().respond_with(json!({
            "decision": "reject",
            "confidence": confidence,
            "reason": "Scripted reject."
        }))
    }

    /// Handler receives (system prompt, user prompt).
    pub fn with_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) -> Result<Value, ProviderError> + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(f));
        self
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// User prompts seen so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Default for ScriptedCompletion {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StructuredCompletion for ScriptedCompletion {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        _schema: &Value,
    ) -> Result<Value, ProviderError> {
        self.prompts.lock().unwrap().push(user.to_string());
        match &self.handler {
            Some(handler) => handler(system, user),
            None => Err(ProviderError::Unavailable("no completion scripted".to_string())),
        }
    }

    fn provider_name(&self) -> Option<String> {
        Some("scripted".to_string())
    }

    fn model_name(&self) -> Option<String> {
        Some("scripted-model".to_string())
    }
}

// ---------------------------------------------------------------------------
// LinkResolver mocks
// ---------------------------------------------------------------------------

/// Returns every URL unchanged.
pub struct NoRedirects;

#[async_trait]
impl LinkResolver for NoRedirects {
    async fn expand(&self, url: &str) -> String {
        url.to_string()
    }
}

/// Fixed shortener table; unknown URLs are returned unchanged.
#[derive(Default)]
pub struct FixedRedirects {
    targets: HashMap<String, String>,
}

impl FixedRedirects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn redirect(mut self, from: &str, to: &str) -> Self {
        self.targets.insert(from.to_string(), to.to_string());
        self
    }
}

#[async_trait]
impl LinkResolver for FixedRedirects {
    async fn expand(&self, url: &str) -> String {
        self.targets.get(url).cloned().unwrap_or_else(|| url.to_string())
    }
}
