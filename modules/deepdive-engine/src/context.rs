use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use deepdive_common::{normalize_token, IdentityAudit, IdentityDecision, ProfileType};

use crate::clues::LeadIdentity;
use crate::identity::CandidateSource;

const CONTEXT_KEY_CHARS: usize = 220;

/// Memo key for identity decisions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecisionKey {
    pub lead_id: Uuid,
    pub url: String,
    pub profile_type: ProfileType,
    pub source: CandidateSource,
    pub context: String,
}

impl DecisionKey {
    pub fn new(
        lead_id: Uuid,
        url: &str,
        profile_type: ProfileType,
        source: CandidateSource,
        context_text: &str,
    ) -> Self {
        Self {
            lead_id,
            url: url.to_string(),
            profile_type,
            source,
            context: normalize_token(context_text)
                .chars()
                .take(CONTEXT_KEY_CHARS)
                .collect(),
        }
    }
}

/// Mutable state of one deep dive run. Created fresh per run, never shared.
#[derive(Debug)]
pub struct RunContext {
    pub lead_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub identity: LeadIdentity,
    decisions: HashMap<DecisionKey, IdentityDecision>,
    audits: HashMap<(ProfileType, String), IdentityAudit>,
    warnings: Vec<String>,
    sources: Vec<String>,
}

impl RunContext {
    pub fn new(lead_id: Uuid, identity: LeadIdentity) -> Self {
        Self {
            lead_id,
            started_at: Utc::now(),
            identity,
            decisions: HashMap::new(),
            audits: HashMap::new(),
            warnings: Vec::new(),
            sources: Vec::new(),
        }
    }

    pub fn cached_decision(&self, key: &DecisionKey) -> Option<&IdentityDecision> {
        self.decisions.get(key)
    }

    pub fn cache_decision(&mut self, key: DecisionKey, decision: IdentityDecision) {
        self.decisions.insert(key, decision);
    }

    pub fn decision_count(&self) -> usize {
        self.decisions.len()
    }

    /// Keep the decision that admitted `url` so Sync can store it on the row.
    pub fn remember_audit(&mut self, profile_type: ProfileType, url: &str, audit: IdentityAudit) {
        self.audits.insert((profile_type, url.to_string()), audit);
    }

    pub fn audit_for(&self, profile_type: ProfileType, url: &str) -> Option<&IdentityAudit> {
        self.audits.get(&(profile_type, url.to_string()))
    }

    pub fn record_warning(&mut self, warning: &str, query: &str) {
        let message = format!("{warning} (query: {query})");
        if !self.warnings.contains(&message) {
            self.warnings.push(message);
        }
    }

    pub fn record_source(&mut self, source: &str) {
        self.sources.push(source.to_string());
    }

    pub fn warnings(&self, limit: usize) -> Vec<String> {
        self.warnings.iter().take(limit).cloned().collect()
    }

    /// Distinct search sources in first-seen order.
    pub fn sources(&self) -> Vec<String> {
        let mut unique: Vec<String> = Vec::new();
        for source in &self.sources {
            if !unique.contains(source) {
                unique.push(source.clone());
            }
        }
        unique
    }
}
