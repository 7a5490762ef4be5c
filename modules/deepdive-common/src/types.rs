use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::text::truncate_text;

/// Provenance tag for social profile rows owned by the deep dive engine.
pub const DEEP_DIVE_SOURCE: &str = "deep_dive";

// =============================================================================
// Profile types
// =============================================================================

/// Platform classification of a profile URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileType {
    X,
    Linkedin,
    Youtube,
    Instagram,
    Tiktok,
    Reddit,
    Website,
}

impl ProfileType {
    pub const ALL: [ProfileType; 7] = [
        ProfileType::X,
        ProfileType::Linkedin,
        ProfileType::Youtube,
        ProfileType::Instagram,
        ProfileType::Tiktok,
        ProfileType::Reddit,
        ProfileType::Website,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileType::X => "x",
            ProfileType::Linkedin => "linkedin",
            ProfileType::Youtube => "youtube",
            ProfileType::Instagram => "instagram",
            ProfileType::Tiktok => "tiktok",
            ProfileType::Reddit => "reddit",
            ProfileType::Website => "website",
        }
    }

    /// Everything except `Website` identifies an account on a social platform.
    pub fn is_social(&self) -> bool {
        !matches!(self, ProfileType::Website)
    }
}

impl fmt::Display for ProfileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProfileType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown profile type: {s}"))
    }
}

// =============================================================================
// Lead aggregate
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeepDiveStatus {
    #[default]
    Idle,
    Queued,
    Running,
    Complete,
    Failed,
}

impl DeepDiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeepDiveStatus::Idle => "idle",
            DeepDiveStatus::Queued => "queued",
            DeepDiveStatus::Running => "running",
            DeepDiveStatus::Complete => "complete",
            DeepDiveStatus::Failed => "failed",
        }
    }
}

impl FromStr for DeepDiveStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(DeepDiveStatus::Idle),
            "queued" => Ok(DeepDiveStatus::Queued),
            "running" => Ok(DeepDiveStatus::Running),
            "complete" => Ok(DeepDiveStatus::Complete),
            "failed" => Ok(DeepDiveStatus::Failed),
            other => Err(format!("unknown deep dive status: {other}")),
        }
    }
}

/// The person or organization under investigation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    #[serde(default)]
    pub organization_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub deep_dive_status: DeepDiveStatus,
    #[serde(default)]
    pub deep_dive_error: Option<String>,
    #[serde(default)]
    pub deep_dive_last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deep_dive_data: serde_json::Value,
}

impl Lead {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_platform(mut self, platform: &str, handle: &str) -> Self {
        self.platform = Some(platform.to_string());
        self.handle = Some(handle.to_string());
        self
    }
}

/// A captured public post or mention attributed to the lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub source: String,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub author_handle: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub captured_at: DateTime<Utc>,
}

/// An outreach touchpoint logged against the lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Communication {
    pub channel: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Persisted profile row. Unique per (lead, profile_type, url).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialProfile {
    pub id: Uuid,
    pub lead_id: Uuid,
    /// Stored as text: user-entered rows may carry types the engine does not track.
    pub profile_type: String,
    pub url: String,
    #[serde(default)]
    pub handle: Option<String>,
    pub source: String,
    #[serde(default)]
    pub metadata: ProfileMetadata,
}

impl SocialProfile {
    pub fn is_deep_dive(&self) -> bool {
        self.source == DEEP_DIVE_SOURCE
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_validation: Option<IdentityAudit>,
    /// Keys written by other parts of the product are carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Everything the engine reads about a lead in one load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub lead: Lead,
    #[serde(default)]
    pub signals: Vec<Signal>,
    #[serde(default)]
    pub communications: Vec<Communication>,
    #[serde(default)]
    pub social_profiles: Vec<SocialProfile>,
}

impl LeadRecord {
    pub fn new(lead: Lead) -> Self {
        Self {
            lead,
            ..Default::default()
        }
    }

    /// Signals ordered most recent first.
    pub fn recent_signals(&self) -> Vec<&Signal> {
        let mut signals: Vec<&Signal> = self.signals.iter().collect();
        signals.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
        signals
    }

    /// Communications ordered most recent first.
    pub fn recent_communications(&self) -> Vec<&Communication> {
        let mut comms: Vec<&Communication> = self.communications.iter().collect();
        comms.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        comms
    }
}

// =============================================================================
// Identity decisions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Accept,
    Reject,
    Unsure,
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "accept" => Ok(Verdict::Accept),
            "reject" => Ok(Verdict::Reject),
            "unsure" => Ok(Verdict::Unsure),
            other => Err(format!("unknown verdict: {other}")),
        }
    }
}

/// Which branch of the validator produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    UserSeed,
    HardRule,
    Llm,
    HybridRule,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityDecision {
    pub accepted: bool,
    pub decision: Verdict,
    pub confidence: f64,
    pub reason: String,
    pub strategy: Strategy,
}

impl IdentityDecision {
    pub fn audit(&self) -> IdentityAudit {
        IdentityAudit {
            decision: self.decision,
            confidence: self.confidence,
            reason: self.reason.clone(),
            strategy: self.strategy,
        }
    }
}

/// The slice of an identity decision stored on a profile row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityAudit {
    pub decision: Verdict,
    pub confidence: f64,
    pub reason: String,
    pub strategy: Strategy,
}

// =============================================================================
// Provider payloads
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    #[serde(default)]
    pub query: String,
}

/// One search provider response, with optional diagnostics for the user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub warning: Option<String>,
    pub source: Option<String>,
}

/// Raw page capture returned by a profile fetcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub url: String,
    #[serde(default)]
    pub final_url: Option<String>,
    pub channel_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub profile_text: String,
    #[serde(default)]
    pub about_url: Option<String>,
    #[serde(default)]
    pub about_text: String,
    #[serde(default)]
    pub recent_posts: Vec<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub links: Vec<String>,
}

const DOSSIER_TEXT_MAX_CHARS: usize = 1200;
const DOSSIER_MAX_POSTS: usize = 20;
const DOSSIER_MAX_EMAILS: usize = 20;
const DOSSIER_MAX_LINKS: usize = 30;

/// Bounded snapshot of one scraped profile or website.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dossier {
    pub profile_type: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub profile_text: String,
    pub about_url: String,
    pub about_text: String,
    pub recent_posts: Vec<String>,
    pub emails: Vec<String>,
    pub links: Vec<String>,
}

impl From<ProfileSnapshot> for Dossier {
    fn from(snapshot: ProfileSnapshot) -> Self {
        let url = snapshot
            .final_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(snapshot.url);
        Self {
            profile_type: snapshot.channel_type,
            url,
            title: snapshot.title,
            description: snapshot.description,
            profile_text: truncate_text(&snapshot.profile_text, DOSSIER_TEXT_MAX_CHARS),
            about_url: snapshot.about_url.unwrap_or_default(),
            about_text: truncate_text(&snapshot.about_text, DOSSIER_TEXT_MAX_CHARS),
            recent_posts: snapshot.recent_posts.into_iter().take(DOSSIER_MAX_POSTS).collect(),
            emails: snapshot.emails.into_iter().take(DOSSIER_MAX_EMAILS).collect(),
            links: snapshot.links.into_iter().take(DOSSIER_MAX_LINKS).collect(),
        }
    }
}

// =============================================================================
// Run results
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredEmail {
    pub email: String,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadSummary {
    pub summary: String,
    pub outreach_angle: String,
    pub next_step: String,
    pub confidence: f64,
    pub highlights: Vec<String>,
}

/// The `deep_dive_data` payload written at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeepDiveData {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub queries: Vec<String>,
    pub profiles: BTreeMap<ProfileType, Vec<String>>,
    pub profile_dossiers: Vec<Dossier>,
    pub summary: String,
    pub outreach_angle: String,
    pub next_step: String,
    pub confidence: f64,
    pub highlights: Vec<String>,
    pub emails_found: Vec<DiscoveredEmail>,
    pub search_warnings: Vec<String>,
    pub search_sources: Vec<String>,
    pub search_results: Vec<SearchResult>,
}

/// Final lead fields written by a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadOutcome {
    pub website: Option<String>,
    pub email: Option<String>,
    pub deep_dive_data: serde_json::Value,
    pub completed_at: DateTime<Utc>,
}
