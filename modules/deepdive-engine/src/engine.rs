//! One deep dive run for one lead.
//!
//! load -> plan queries -> search -> seed candidates -> sync -> expand
//! (scrape, discover, sync per wave) -> harvest emails -> summarize -> persist.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::info;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use completion_client::{Claude, OpenAi};
use deepdive_common::{
    AiProvider, Config, DeepDiveConfig, DeepDiveData, DeepDiveError, LeadOutcome, LeadRecord,
    ProfileType,
};
use scrape_client::{BrowserlessClient, RedirectResolver, SerperClient};

use crate::canonical::normalize_url;
use crate::clues::LeadIdentity;
use crate::context::RunContext;
use crate::discovery::Discovery;
use crate::emails::harvest_emails;
use crate::expansion::GraphExpansion;
use crate::identity::IdentityValidator;
use crate::planner::plan_queries;
use crate::search::collect_results;
use crate::summarize::summarize;
use crate::sync::sync_profiles;
use crate::traits::{LeadStore, LinkResolver, ProfileFetcher, SearchProvider, StructuredCompletion};

/// Superseded by `outreach_angle` / `next_step`; removed on every write.
const STALE_DATA_KEYS: &[&str] = &["first_contact_suggestion"];

/// The deep dive engine with its providers injected.
#[derive(Clone, TypedBuilder)]
pub struct DeepDive {
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn ProfileFetcher>,
    completion: Arc<dyn StructuredCompletion>,
    resolver: Arc<dyn LinkResolver>,
    store: Arc<dyn LeadStore>,
    #[builder(default)]
    config: DeepDiveConfig,
}

impl DeepDive {
    /// Production wiring: Serper search, Browserless fetches, the configured
    /// completion backend and a HEAD-based redirect resolver.
    pub fn from_config(config: &Config, store: Arc<dyn LeadStore>) -> Result<Self, DeepDiveError> {
        let completion: Arc<dyn StructuredCompletion> = match config.ai_provider {
            AiProvider::Claude => {
                let key = config.anthropic_api_key.as_deref().ok_or_else(|| {
                    DeepDiveError::Config("ANTHROPIC_API_KEY is not set".into())
                })?;
                Arc::new(Claude::new(key, config.ai_model.as_str()))
            }
            AiProvider::OpenAi => {
                let key = config.openai_api_key.as_deref().ok_or_else(|| {
                    DeepDiveError::Config("OPENAI_API_KEY is not set".into())
                })?;
                Arc::new(OpenAi::new(key, config.ai_model.as_str()))
            }
        };

        Ok(Self::builder()
            .search(Arc::new(SerperClient::new(&config.serper_api_key)))
            .fetcher(Arc::new(BrowserlessClient::new(
                &config.browserless_url,
                config.browserless_token.as_deref(),
            )))
            .completion(completion)
            .resolver(Arc::new(RedirectResolver::new(config.deep_dive.max_redirect_hops)))
            .store(store)
            .config(config.deep_dive.clone())
            .build())
    }

    pub fn store(&self) -> &Arc<dyn LeadStore> {
        &self.store
    }

    pub fn config(&self) -> &DeepDiveConfig {
        &self.config
    }

    /// Run the full pipeline and persist the outcome on the lead.
    pub async fn run(&self, lead_id: Uuid) -> Result<DeepDiveData, DeepDiveError> {
        let record = self
            .store
            .load_lead(lead_id)
            .await?
            .ok_or(DeepDiveError::LeadNotFound(lead_id))?;
        let config = &self.config;

        let identity = LeadIdentity::from_record(&record, config.max_identity_clue_tokens);
        let mut ctx = RunContext::new(lead_id, identity);
        info!(lead_id = %lead_id, name = record.lead.name.as_str(), "Deep dive started");

        let queries = plan_queries(&*self.completion, &record, config.max_query_count).await;
        let search_results = collect_results(&*self.search, &mut ctx, &queries, config).await;
        info!(
            lead_id = %lead_id,
            queries = queries.len(),
            results = search_results.len(),
            "Search complete"
        );

        let validator = IdentityValidator::new(&*self.completion, config);
        let discovery = Discovery::new(validator, &*self.resolver, config.max_urls_per_type);
        let mut map = discovery.seed(&mut ctx, &record, &search_results).await;
        let report = sync_profiles(&*self.store, &ctx, &map).await?;
        info!(
            lead_id = %lead_id,
            profiles = map.len(),
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            "Seed candidates synced"
        );

        let expansion = GraphExpansion {
            discovery: &discovery,
            fetcher: &*self.fetcher,
            store: &*self.store,
            config,
        };
        let dossiers = expansion.run(&mut ctx, &mut map, &record).await?;

        let emails = harvest_emails(&dossiers, config.max_emails);
        let summary = summarize(
            &*self.completion,
            &record,
            &search_results,
            &dossiers,
            &map,
            config.max_highlights,
        )
        .await;

        let data = DeepDiveData {
            provider: self.completion.provider_name(),
            model: self.completion.model_name(),
            queries,
            profiles: map.to_map(),
            profile_dossiers: dossiers,
            summary: summary.summary,
            outreach_angle: summary.outreach_angle,
            next_step: summary.next_step,
            confidence: summary.confidence,
            highlights: summary.highlights,
            emails_found: emails,
            search_warnings: ctx.warnings(config.max_search_warnings),
            search_sources: ctx.sources(),
            search_results,
        };

        let outcome = LeadOutcome {
            website: backfill_website(&record, map.first(ProfileType::Website)),
            email: record
                .lead
                .email
                .clone()
                .filter(|e| !e.trim().is_empty())
                .or_else(|| data.emails_found.first().map(|e| e.email.clone())),
            deep_dive_data: merged_data(&record.lead.deep_dive_data, &data)?,
            completed_at: Utc::now(),
        };
        self.store.save_outcome(lead_id, &outcome).await?;

        info!(
            lead_id = %lead_id,
            profiles = map.len(),
            dossiers = data.profile_dossiers.len(),
            emails = data.emails_found.len(),
            "Deep dive complete"
        );
        Ok(data)
    }
}

fn backfill_website(record: &LeadRecord, accepted: Option<&str>) -> Option<String> {
    match record.lead.website.as_deref() {
        Some(existing) if !existing.trim().is_empty() => Some(existing.to_string()),
        _ => accepted.and_then(normalize_url),
    }
}

/// Overlay the run's result on whatever `deep_dive_data` already holds.
fn merged_data(existing: &Value, data: &DeepDiveData) -> Result<Value, DeepDiveError> {
    let mut merged = match existing {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    if let Value::Object(fresh) = serde_json::to_value(data).map_err(anyhow::Error::from)? {
        merged.extend(fresh);
    }
    for key in STALE_DATA_KEYS {
        merged.remove(*key);
    }
    Ok(Value::Object(merged))
}
