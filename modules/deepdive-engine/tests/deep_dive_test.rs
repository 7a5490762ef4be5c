//! End-to-end runs against in-memory providers and the in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use deepdive_common::{
    DeepDiveConfig, DeepDiveError, DeepDiveStatus, Lead, LeadOutcome, LeadRecord, ProfileMetadata,
    ProfileSnapshot, ProfileType, ProviderError, SocialProfile, Strategy, Verdict,
    DEEP_DIVE_SOURCE,
};
use deepdive_engine::clues::LeadIdentity;
use deepdive_engine::sync::sync_profiles;
use deepdive_engine::testing::{
    search_hit, snapshot, FixedRedirects, MockFetcher, MockSearch, NoRedirects, ScriptedCompletion,
};
use deepdive_engine::{
    CandidateMap, DeepDive, DeepDiveJob, LeadStore, LinkResolver, MemoryLeadStore, RunContext,
};

const QUERY: &str = "shana nielsen filmmaker";

/// Plans a single query, accepts every identity check at `confidence`, and
/// fails summaries so the deterministic fallback is used.
fn scripted(confidence: f64) -> ScriptedCompletion {
    ScriptedCompletion::new().with_handler(move |system, user| {
        if user.contains("Candidate:") {
            Ok(json!({
                "decision": "accept",
                "confidence": confidence,
                "reason": "Scripted accept."
            }))
        } else if system.contains("plan web searches") {
            Ok(json!({ "queries": [QUERY] }))
        } else {
            Err(ProviderError::Unavailable("scripted".into()))
        }
    })
}

fn engine(
    store: Arc<MemoryLeadStore>,
    search: MockSearch,
    fetcher: Arc<MockFetcher>,
    resolver: Arc<dyn LinkResolver>,
    config: DeepDiveConfig,
) -> DeepDive {
    DeepDive::builder()
        .search(Arc::new(search))
        .fetcher(fetcher)
        .completion(Arc::new(scripted(0.95)))
        .resolver(resolver)
        .store(store)
        .config(config)
        .build()
}

fn shana() -> LeadRecord {
    LeadRecord::new(Lead::new("Shana Nielsen").with_platform("LinkedIn", "shanalnielsen"))
}

// =========================================================================
// Website seeding and lead backfill
// =========================================================================

#[tokio::test]
async fn bare_user_website_is_normalized_and_kept() {
    let mut record = shana();
    record.lead.website = Some("manual-example.test".to_string());
    let lead_id = record.lead.id;
    let store = Arc::new(MemoryLeadStore::new().with_lead(record));

    let deep_dive = engine(
        store.clone(),
        MockSearch::new(),
        Arc::new(MockFetcher::new()),
        Arc::new(NoRedirects),
        DeepDiveConfig::default(),
    );
    let data = deep_dive.run(lead_id).await.unwrap();

    assert_eq!(
        data.profiles.get(&ProfileType::Website).cloned().unwrap_or_default(),
        vec!["https://manual-example.test/".to_string()]
    );

    let saved = store.record(lead_id).unwrap();
    assert_eq!(saved.lead.deep_dive_status, DeepDiveStatus::Complete);
    assert_eq!(saved.lead.website.as_deref(), Some("manual-example.test"));
    assert!(saved
        .social_profiles
        .iter()
        .any(|p| p.url == "https://manual-example.test/" && p.is_deep_dive()));
}

#[tokio::test]
async fn existing_website_survives_a_different_discovery() {
    let mut record = shana();
    record.lead.website = Some("https://manual-example.test/".to_string());
    let lead_id = record.lead.id;
    let store = Arc::new(MemoryLeadStore::new().with_lead(record));

    let search = MockSearch::new().on_query(
        QUERY,
        vec![search_hit(
            "https://shana-nielsen.com/",
            "Shana Nielsen",
            "Shana Nielsen ai filmmaker official website shanalnielsen",
        )],
    );
    let deep_dive = engine(
        store.clone(),
        search,
        Arc::new(MockFetcher::new()),
        Arc::new(NoRedirects),
        DeepDiveConfig::default(),
    );
    let data = deep_dive.run(lead_id).await.unwrap();

    assert_eq!(
        data.profiles[&ProfileType::Website],
        vec![
            "https://manual-example.test/".to_string(),
            "https://shana-nielsen.com/".to_string()
        ]
    );
    let saved = store.record(lead_id).unwrap();
    assert_eq!(saved.lead.website.as_deref(), Some("https://manual-example.test/"));
}

#[tokio::test]
async fn website_and_email_are_backfilled_from_the_run() {
    let record = shana();
    let lead_id = record.lead.id;
    let store = Arc::new(MemoryLeadStore::new().with_lead(record));

    let search = MockSearch::new().on_query(
        QUERY,
        vec![search_hit(
            "https://shana-nielsen.com/work",
            "Shana Nielsen",
            "Shana Nielsen ai filmmaker shanalnielsen",
        )],
    );
    let page = ProfileSnapshot {
        emails: vec!["Hello@Shana-Nielsen.com".to_string()],
        profile_text: "AI filmmaker and director.".to_string(),
        ..snapshot("https://shana-nielsen.com/", ProfileType::Website, "Shana Nielsen", &[])
    };
    let fetcher = Arc::new(MockFetcher::new().on_page("https://shana-nielsen.com/", page));

    let deep_dive = engine(
        store.clone(),
        search,
        fetcher.clone(),
        Arc::new(NoRedirects),
        DeepDiveConfig::default(),
    );
    let data = deep_dive.run(lead_id).await.unwrap();

    assert_eq!(data.profile_dossiers.len(), 1);
    assert_eq!(data.emails_found[0].email, "hello@shana-nielsen.com");
    assert_eq!(data.provider.as_deref(), Some("scripted"));
    assert_eq!(data.queries, vec![QUERY.to_string()]);

    let saved = store.record(lead_id).unwrap();
    assert_eq!(saved.lead.website.as_deref(), Some("https://shana-nielsen.com/"));
    assert_eq!(saved.lead.email.as_deref(), Some("hello@shana-nielsen.com"));
    assert_eq!(
        saved.lead.deep_dive_data["profiles"]["website"][0],
        "https://shana-nielsen.com/"
    );
    assert!(saved.lead.deep_dive_last_run_at.is_some());
}

#[tokio::test]
async fn stale_data_keys_are_dropped_and_others_kept() {
    let mut record = shana();
    record.lead.deep_dive_data = json!({
        "first_contact_suggestion": "Say hi",
        "crm_note": "keep"
    });
    let lead_id = record.lead.id;
    let store = Arc::new(MemoryLeadStore::new().with_lead(record));

    let deep_dive = engine(
        store.clone(),
        MockSearch::new(),
        Arc::new(MockFetcher::new()),
        Arc::new(NoRedirects),
        DeepDiveConfig::default(),
    );
    deep_dive.run(lead_id).await.unwrap();

    let data = store.record(lead_id).unwrap().lead.deep_dive_data;
    assert_eq!(data["crm_note"], "keep");
    assert!(data.get("first_contact_suggestion").is_none());
    assert_eq!(data["summary"], "Found profile signals across: linkedin.");
}

#[tokio::test]
async fn search_failures_surface_as_warnings() {
    let record = shana();
    let lead_id = record.lead.id;
    let store = Arc::new(MemoryLeadStore::new().with_lead(record));

    let search = MockSearch::new()
        .failing(ProviderError::Unavailable("quota exhausted".into()));
    let deep_dive = engine(
        store,
        search,
        Arc::new(MockFetcher::new()),
        Arc::new(NoRedirects),
        DeepDiveConfig::default(),
    );
    let data = deep_dive.run(lead_id).await.unwrap();

    assert!(data.search_results.is_empty());
    assert_eq!(data.search_warnings.len(), 1);
    assert!(data.search_warnings[0].contains("quota exhausted"));
}

// =========================================================================
// Discovery bounds
// =========================================================================

#[tokio::test]
async fn shortened_links_are_expanded_before_classification() {
    let record = LeadRecord::new(Lead::new("Avery Lin").with_platform("YouTube", "@avlinfilms"));
    let lead_id = record.lead.id;
    let store = Arc::new(MemoryLeadStore::new().with_lead(record));

    let search = MockSearch::new().on_query(
        QUERY,
        vec![search_hit("https://bit.ly/avlin", "Avery Lin", "Avery Lin on X")],
    );
    let resolver = FixedRedirects::new().redirect("https://bit.ly/avlin", "https://x.com/avlinfilms");

    let deep_dive = engine(
        store,
        search,
        Arc::new(MockFetcher::new()),
        Arc::new(resolver),
        DeepDiveConfig::default(),
    );
    let data = deep_dive.run(lead_id).await.unwrap();

    assert_eq!(data.profiles[&ProfileType::X], vec!["https://x.com/avlinfilms".to_string()]);
}

#[tokio::test]
async fn per_type_cap_holds_across_search_results() {
    let record = shana();
    let lead_id = record.lead.id;
    let store = Arc::new(MemoryLeadStore::new().with_lead(record));

    let hits = (1..=5)
        .map(|n| {
            search_hit(
                &format!("https://x.com/shanafan{n}"),
                "Shana Nielsen",
                "Shana Nielsen fan account",
            )
        })
        .collect();
    let deep_dive = engine(
        store,
        MockSearch::new().on_query(QUERY, hits),
        Arc::new(MockFetcher::new()),
        Arc::new(NoRedirects),
        DeepDiveConfig::default(),
    );
    let data = deep_dive.run(lead_id).await.unwrap();

    assert_eq!(
        data.profiles[&ProfileType::X],
        vec!["https://x.com/shanafan1".to_string(), "https://x.com/shanafan2".to_string()]
    );
}

/// Every scraped page links to a fresh set of profiles.
fn endless_fetcher() -> MockFetcher {
    let counter = AtomicUsize::new(0);
    MockFetcher::new().generate(move |url, profile_type| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        let links = [
            format!("https://x.com/avlinfan{n}"),
            format!("https://www.instagram.com/avlinfan{n}"),
            format!("https://www.tiktok.com/@avlinfan{n}"),
            format!("https://www.linkedin.com/in/avlinfan{n}"),
            format!("https://www.reddit.com/user/avlinfan{n}"),
        ];
        let links: Vec<&str> = links.iter().map(String::as_str).collect();
        Some(snapshot(url, profile_type, "Avery Lin", &links))
    })
}

#[tokio::test]
async fn expansion_terminates_when_every_page_yields_new_links() {
    let record = LeadRecord::new(Lead::new("Avery Lin").with_platform("YouTube", "@avlinfilms"));
    let lead_id = record.lead.id;
    let store = Arc::new(MemoryLeadStore::new().with_lead(record));
    let fetcher = Arc::new(endless_fetcher());
    let config = DeepDiveConfig::default();

    let deep_dive = engine(
        store,
        MockSearch::new(),
        fetcher.clone(),
        Arc::new(NoRedirects),
        config.clone(),
    );
    let data = deep_dive.run(lead_id).await.unwrap();

    assert!(fetcher.calls().len() <= config.max_dossiers);
    assert!(data.profile_dossiers.len() <= config.max_dossiers);
    for urls in data.profiles.values() {
        assert!(urls.len() <= config.max_urls_per_type);
    }
}

#[tokio::test]
async fn dossier_budget_caps_fetches() {
    let record = LeadRecord::new(Lead::new("Avery Lin").with_platform("YouTube", "@avlinfilms"));
    let lead_id = record.lead.id;
    let store = Arc::new(MemoryLeadStore::new().with_lead(record));
    let fetcher = Arc::new(endless_fetcher());
    let config = DeepDiveConfig {
        max_dossiers: 3,
        ..Default::default()
    };

    let deep_dive = engine(store, MockSearch::new(), fetcher.clone(), Arc::new(NoRedirects), config);
    let data = deep_dive.run(lead_id).await.unwrap();

    assert_eq!(fetcher.calls().len(), 3);
    assert_eq!(data.profile_dossiers.len(), 3);
}

// =========================================================================
// Graph expansion
// =========================================================================

fn avery() -> LeadRecord {
    LeadRecord::new(Lead::new("Avery Lin").with_platform("YouTube", "@avlinfilms"))
}

const CHANNEL: &str = "https://www.youtube.com/@avlinfilms";
const HUB: &str = "https://linktr.ee/avlinfilms";
const SITE: &str = "https://avery.film/";

fn channel_linking(links: &[&str]) -> ProfileSnapshot {
    ProfileSnapshot {
        profile_text: "AI short films by avlinfilms.".to_string(),
        ..snapshot(CHANNEL, ProfileType::Youtube, "Avery Lin", links)
    }
}

#[tokio::test]
async fn link_hub_leads_to_the_lead_website() {
    let record = avery();
    let lead_id = record.lead.id;
    let store = Arc::new(MemoryLeadStore::new().with_lead(record));

    let hub = ProfileSnapshot {
        profile_text: "Films, newsletter and contact.".to_string(),
        ..snapshot(HUB, ProfileType::Website, "avlinfilms | Linktree", &[SITE])
    };
    let fetcher = Arc::new(
        MockFetcher::new()
            .on_page(CHANNEL, channel_linking(&[HUB]))
            .on_page(HUB, hub),
    );

    let deep_dive = engine(
        store.clone(),
        MockSearch::new(),
        fetcher.clone(),
        Arc::new(NoRedirects),
        DeepDiveConfig::default(),
    );
    let data = deep_dive.run(lead_id).await.unwrap();

    assert_eq!(
        data.profiles[&ProfileType::Website],
        vec![HUB.to_string(), SITE.to_string()]
    );
    assert_eq!(fetcher.calls(), vec![CHANNEL, HUB, SITE]);
    assert_eq!(data.profile_dossiers.len(), 2);

    let rows = store.social_profiles(lead_id).await.unwrap();
    assert_eq!(rows.len(), 3);
    for row in &rows {
        let audit = row
            .metadata
            .identity_validation
            .as_ref()
            .unwrap_or_else(|| panic!("no identity audit on {}", row.url));
        assert_eq!(audit.strategy, Strategy::Llm);
        assert_eq!(audit.decision, Verdict::Accept);
        assert!(row.metadata.last_seen_at.is_some());
    }
}

#[tokio::test]
async fn profile_fetch_failure_does_not_abort_the_run() {
    let record = avery();
    let lead_id = record.lead.id;
    let store = Arc::new(MemoryLeadStore::new().with_lead(record));

    let fetcher = Arc::new(
        MockFetcher::new()
            .on_page(CHANNEL, channel_linking(&["https://x.com/avlinfilms"]))
            .on_failure(
                "https://x.com/avlinfilms",
                ProviderError::Transport("connection refused".into()),
            ),
    );

    let deep_dive = engine(
        store.clone(),
        MockSearch::new(),
        fetcher.clone(),
        Arc::new(NoRedirects),
        DeepDiveConfig::default(),
    );
    let data = deep_dive.run(lead_id).await.unwrap();

    assert_eq!(fetcher.calls(), vec![CHANNEL, "https://x.com/avlinfilms"]);
    assert_eq!(data.profile_dossiers.len(), 1);
    assert_eq!(data.profiles[&ProfileType::X], vec!["https://x.com/avlinfilms".to_string()]);

    let saved = store.record(lead_id).unwrap();
    assert_eq!(saved.lead.deep_dive_status, DeepDiveStatus::Complete);
    let urls: Vec<&str> = saved.social_profiles.iter().map(|p| p.url.as_str()).collect();
    assert!(urls.contains(&CHANNEL));
    assert!(urls.contains(&"https://x.com/avlinfilms"));
}

// =========================================================================
// Social profile sync
// =========================================================================

#[tokio::test]
async fn sync_converges_and_leaves_user_rows_alone() {
    let mut record = shana();
    let lead_id = record.lead.id;
    let user_row = SocialProfile {
        id: Uuid::new_v4(),
        lead_id,
        profile_type: "x".to_string(),
        url: "https://x.com/shanalnielsen".to_string(),
        handle: None,
        source: "manual".to_string(),
        metadata: ProfileMetadata::default(),
    };
    let stale_row = SocialProfile {
        id: Uuid::new_v4(),
        url: "https://x.com/someoneelse".to_string(),
        source: DEEP_DIVE_SOURCE.to_string(),
        ..user_row.clone()
    };
    record.social_profiles = vec![user_row.clone(), stale_row];
    let store = MemoryLeadStore::new().with_lead(record);

    let mut map = CandidateMap::new(2);
    map.try_insert(ProfileType::X, "https://x.com/shanalnielsen", false);
    map.try_insert(ProfileType::Website, "https://shana-nielsen.com/", false);
    let ctx = RunContext::new(lead_id, LeadIdentity::default());

    let first = sync_profiles(&store, &ctx, &map).await.unwrap();
    assert_eq!(first.created, 1);
    assert_eq!(first.deleted, 1);
    assert_eq!(first.unchanged, 1);

    let writes_before = store.profile_writes();
    let second = sync_profiles(&store, &ctx, &map).await.unwrap();
    assert_eq!(second.writes(), 0);
    assert_eq!(store.profile_writes(), writes_before);

    let profiles = store.social_profiles(lead_id).await.unwrap();
    assert_eq!(profiles.len(), 2);
    assert!(profiles.contains(&user_row));
}

// =========================================================================
// Job wrapper
// =========================================================================

/// Delegates to the in-memory store but cannot persist outcomes.
struct BrokenOutcomeStore {
    inner: Arc<MemoryLeadStore>,
}

#[async_trait]
impl LeadStore for BrokenOutcomeStore {
    async fn load_lead(&self, lead_id: Uuid) -> Result<Option<LeadRecord>, DeepDiveError> {
        self.inner.load_lead(lead_id).await
    }

    async fn social_profiles(&self, lead_id: Uuid) -> Result<Vec<SocialProfile>, DeepDiveError> {
        self.inner.social_profiles(lead_id).await
    }

    async fn save_social_profile(&self, profile: &SocialProfile) -> Result<(), DeepDiveError> {
        self.inner.save_social_profile(profile).await
    }

    async fn delete_social_profile(&self, profile_id: Uuid) -> Result<(), DeepDiveError> {
        self.inner.delete_social_profile(profile_id).await
    }

    async fn set_status(
        &self,
        lead_id: Uuid,
        status: DeepDiveStatus,
        error: Option<&str>,
        last_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), DeepDiveError> {
        self.inner.set_status(lead_id, status, error, last_run_at).await
    }

    async fn save_outcome(&self, _: Uuid, _: &LeadOutcome) -> Result<(), DeepDiveError> {
        Err(DeepDiveError::Storage("connection reset".into()))
    }
}

#[tokio::test]
async fn job_records_failure_on_the_lead() {
    let record = shana();
    let lead_id = record.lead.id;
    let inner = Arc::new(MemoryLeadStore::new().with_lead(record));

    let deep_dive = DeepDive::builder()
        .search(Arc::new(MockSearch::new()))
        .fetcher(Arc::new(MockFetcher::new()))
        .completion(Arc::new(ScriptedCompletion::unavailable()))
        .resolver(Arc::new(NoRedirects))
        .store(Arc::new(BrokenOutcomeStore { inner: inner.clone() }))
        .build();

    let result = DeepDiveJob::new(deep_dive).perform(lead_id).await;
    assert!(matches!(result, Err(DeepDiveError::Storage(_))));

    let lead = inner.record(lead_id).unwrap().lead;
    assert_eq!(lead.deep_dive_status, DeepDiveStatus::Failed);
    assert_eq!(
        lead.deep_dive_error.as_deref(),
        Some("StorageError: Storage error: connection reset")
    );
    assert!(lead.deep_dive_last_run_at.is_some());
}

#[tokio::test]
async fn profiles_synced_during_expansion_survive_a_failed_outcome() {
    let record = avery();
    let lead_id = record.lead.id;
    let inner = Arc::new(MemoryLeadStore::new().with_lead(record));
    let fetcher = MockFetcher::new().on_page(CHANNEL, channel_linking(&["https://x.com/avlinfilms"]));

    let deep_dive = DeepDive::builder()
        .search(Arc::new(MockSearch::new()))
        .fetcher(Arc::new(fetcher))
        .completion(Arc::new(scripted(0.95)))
        .resolver(Arc::new(NoRedirects))
        .store(Arc::new(BrokenOutcomeStore { inner: inner.clone() }))
        .build();

    let result = DeepDiveJob::new(deep_dive).perform(lead_id).await;
    assert!(result.is_err());

    let saved = inner.record(lead_id).unwrap();
    assert_eq!(saved.lead.deep_dive_status, DeepDiveStatus::Failed);
    let mut synced: Vec<&str> = saved
        .social_profiles
        .iter()
        .filter(|p| p.is_deep_dive())
        .map(|p| p.url.as_str())
        .collect();
    synced.sort();
    assert_eq!(synced, vec![CHANNEL, "https://x.com/avlinfilms"]);
}

#[tokio::test]
async fn job_skips_missing_leads() {
    let store = Arc::new(MemoryLeadStore::new());
    let deep_dive = DeepDive::builder()
        .search(Arc::new(MockSearch::new()))
        .fetcher(Arc::new(MockFetcher::new()))
        .completion(Arc::new(ScriptedCompletion::unavailable()))
        .resolver(Arc::new(NoRedirects))
        .store(store.clone())
        .build();

    DeepDiveJob::new(deep_dive).perform(Uuid::new_v4()).await.unwrap();
    assert_eq!(store.profile_writes(), 0);
}

#[tokio::test]
async fn job_completes_a_lead() {
    let record = shana();
    let lead_id = record.lead.id;
    let store = Arc::new(MemoryLeadStore::new().with_lead(record));
    let deep_dive = engine(
        store.clone(),
        MockSearch::new(),
        Arc::new(MockFetcher::new()),
        Arc::new(NoRedirects),
        DeepDiveConfig::default(),
    );

    DeepDiveJob::new(deep_dive).perform(lead_id).await.unwrap();

    let lead = store.record(lead_id).unwrap().lead;
    assert_eq!(lead.deep_dive_status, DeepDiveStatus::Complete);
    assert!(lead.deep_dive_error.is_none());
}
