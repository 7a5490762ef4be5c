//! Same-person decisions for candidate profile URLs.
//!
//! Order of evaluation:
//! 1. the lead's own website seed is accepted outright;
//! 2. generic handles and wrong handles on the lead's own platform are hard rejects
//!    (the lead's own handle seed is never a mismatch);
//! 3. the completion provider judges, with websites additionally needing an anchor
//!    (and a host/path identity match can override a conservative rejection);
//! 4. without a usable completion, a strict deterministic rule that only ever
//!    accepts trusted seeds.
//!
//! Every decision is memoized in the run context.

use std::fmt;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use completion_client::strict_schema;
use deepdive_common::{
    normalize_token, squish, truncate_text, DeepDiveConfig, IdentityDecision, Lead, ProfileType,
    ProviderError, Strategy, Verdict,
};

use crate::canonical::{bare_host, extract_handle, is_generic_handle, same_host};
use crate::clues::LeadIdentity;
use crate::context::{DecisionKey, RunContext};
use crate::traits::StructuredCompletion;

const PROMPT_CONTEXT_CHARS: usize = 500;
const HOST_MATCH_CONFIDENCE: f64 = 0.92;
const PATH_MATCH_CONFIDENCE: f64 = 0.87;
const FALLBACK_ACCEPT_CONFIDENCE: f64 = 0.5;

/// Where a candidate URL came from. Provenance changes how much evidence is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateSource {
    LeadHandleSeed,
    LeadWebsiteSeed,
    ExistingProfileSeed,
    SignalSeed,
    CommunicationSeed,
    SearchResult,
    ProfileDiscovery,
    LinkHubDiscovery,
}

impl CandidateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateSource::LeadHandleSeed => "lead_handle_seed",
            CandidateSource::LeadWebsiteSeed => "lead_website_seed",
            CandidateSource::ExistingProfileSeed => "existing_profile_seed",
            CandidateSource::SignalSeed => "signal_seed",
            CandidateSource::CommunicationSeed => "communication_seed",
            CandidateSource::SearchResult => "search_result",
            CandidateSource::ProfileDiscovery => "profile_discovery",
            CandidateSource::LinkHubDiscovery => "link_hub_discovery",
        }
    }

    /// Stated by the lead themselves.
    pub fn is_trusted_seed(&self) -> bool {
        matches!(
            self,
            CandidateSource::LeadHandleSeed | CandidateSource::LeadWebsiteSeed
        )
    }
}

impl fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canonical URL awaiting a decision, with its provenance.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub url: &'a str,
    pub profile_type: ProfileType,
    pub source: CandidateSource,
    pub base_url: Option<&'a str>,
    pub context_text: &'a str,
}

pub struct IdentityValidator<'a> {
    completion: &'a dyn StructuredCompletion,
    config: &'a DeepDiveConfig,
}

impl<'a> IdentityValidator<'a> {
    pub fn new(completion: &'a dyn StructuredCompletion, config: &'a DeepDiveConfig) -> Self {
        Self { completion, config }
    }

    pub async fn decide(
        &self,
        ctx: &mut RunContext,
        lead: &Lead,
        candidate: &Candidate<'_>,
    ) -> IdentityDecision {
        let key = DecisionKey::new(
            ctx.lead_id,
            candidate.url,
            candidate.profile_type,
            candidate.source,
            candidate.context_text,
        );
        if let Some(cached) = ctx.cached_decision(&key) {
            return cached.clone();
        }

        let mut decision = self.evaluate(&ctx.identity, lead, candidate).await;
        decision.reason = truncate_text(&squish(&decision.reason), self.config.identity_reason_max_len);

        debug!(
            url = candidate.url,
            profile_type = %candidate.profile_type,
            source = %candidate.source,
            accepted = decision.accepted,
            strategy = ?decision.strategy,
            confidence = decision.confidence,
            "Identity decision"
        );
        ctx.cache_decision(key, decision.clone());
        decision
    }

    async fn evaluate(
        &self,
        identity: &LeadIdentity,
        lead: &Lead,
        candidate: &Candidate<'_>,
    ) -> IdentityDecision {
        let is_website = candidate.profile_type == ProfileType::Website;

        if is_website && candidate.source == CandidateSource::LeadWebsiteSeed {
            return decided(true, Verdict::Accept, 1.0, "User-provided website seed.", Strategy::UserSeed);
        }

        let handle = extract_handle(candidate.url, candidate.profile_type);
        if !is_website {
            if handle.as_deref().map(is_generic_handle).unwrap_or(true) {
                return decided(
                    false,
                    Verdict::Reject,
                    1.0,
                    "Generic non-person handle/path.",
                    Strategy::HardRule,
                );
            }
            if candidate.source != CandidateSource::LeadHandleSeed
                && identity.strict_handle_required(candidate.profile_type)
                && !identity.exact_handle_match(candidate.profile_type, handle.as_deref())
            {
                return decided(
                    false,
                    Verdict::Reject,
                    1.0,
                    &format!(
                        "Handle does not match the lead's known {} handle.",
                        candidate.profile_type
                    ),
                    Strategy::HardRule,
                );
            }
        }

        match self.llm_judgement(identity, lead, candidate, handle.as_deref()).await {
            Ok(judgement) => self.apply_judgement(identity, candidate, judgement),
            Err(e) => {
                warn!(url = candidate.url, error = %e, "Identity check falling back to deterministic rule");
                fallback_decision(
                    identity,
                    candidate,
                    handle.as_deref(),
                    self.config.website_clue_matches_required,
                )
            }
        }
    }

    fn apply_judgement(
        &self,
        identity: &LeadIdentity,
        candidate: &Candidate<'_>,
        judgement: Judgement,
    ) -> IdentityDecision {
        let llm_accept = judgement.verdict == Verdict::Accept
            && judgement.confidence >= self.config.identity_min_confidence;
        let mut decision = decided(
            llm_accept,
            judgement.verdict,
            judgement.confidence,
            &judgement.reason,
            Strategy::Llm,
        );

        if candidate.profile_type != ProfileType::Website {
            return decision;
        }

        let anchored = website_anchor(identity, candidate, self.config.website_clue_matches_required);
        let host_match = host_matches_full_name(identity, candidate.url);
        let path_match = path_matches_identity(identity, candidate.url);
        decision.accepted = anchored && (llm_accept || host_match || path_match);

        if decision.accepted && !llm_accept {
            decision.decision = Verdict::Accept;
            decision.strategy = Strategy::HybridRule;
            if host_match {
                decision.confidence = judgement.confidence.max(HOST_MATCH_CONFIDENCE);
                decision.reason =
                    "Accepted by exact full-name host match despite conservative LLM rejection."
                        .to_string();
            } else {
                decision.confidence = judgement.confidence.max(PATH_MATCH_CONFIDENCE);
                decision.reason =
                    "Accepted by exact identity path match despite conservative LLM rejection."
                        .to_string();
            }
        }
        decision
    }

    async fn llm_judgement(
        &self,
        identity: &LeadIdentity,
        lead: &Lead,
        candidate: &Candidate<'_>,
        handle: Option<&str>,
    ) -> Result<Judgement, ProviderError> {
        let schema = strict_schema::<IdentityResponse>();
        let user = identity_user_prompt(identity, lead, candidate, handle);
        let raw = self
            .completion
            .complete(IDENTITY_SYSTEM_PROMPT, &user, &schema)
            .await?;

        let response: IdentityResponse = serde_json::from_value(raw)
            .map_err(|e| ProviderError::Malformed(format!("identity response: {e}")))?;
        let verdict = response
            .decision
            .parse::<Verdict>()
            .map_err(ProviderError::Malformed)?;

        Ok(Judgement {
            verdict,
            confidence: normalize_confidence(&response.confidence),
            reason: squish(&response.reason),
        })
    }
}

struct Judgement {
    verdict: Verdict,
    confidence: f64,
    reason: String,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
enum VerdictChoice {
    Accept,
    Reject,
    Unsure,
}

/// Identity verdict for one candidate URL.
#[derive(Deserialize, JsonSchema)]
struct IdentityResponse {
    #[schemars(with = "VerdictChoice")]
    decision: String,
    /// 0 to 1.
    #[serde(default)]
    #[schemars(with = "f64")]
    confidence: Value,
    #[serde(default)]
    reason: String,
}

fn decided(
    accepted: bool,
    decision: Verdict,
    confidence: f64,
    reason: &str,
    strategy: Strategy,
) -> IdentityDecision {
    IdentityDecision {
        accepted,
        decision,
        confidence,
        reason: reason.to_string(),
        strategy,
    }
}

/// Provider confidence as 0..1. Percent-style values are scaled down; anything
/// non-numeric counts as zero.
pub fn normalize_confidence(value: &Value) -> f64 {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    let Some(mut confidence) = raw.filter(|c| c.is_finite()) else {
        return 0.0;
    };
    if confidence > 1.0 {
        confidence /= 100.0;
    }
    confidence.clamp(0.0, 1.0)
}

/// Independent evidence that a website belongs to the lead, beyond an LLM opinion.
pub fn website_anchor(
    identity: &LeadIdentity,
    candidate: &Candidate<'_>,
    clue_matches_required: usize,
) -> bool {
    match candidate.source {
        CandidateSource::LeadWebsiteSeed => return true,
        CandidateSource::ProfileDiscovery => {
            if candidate
                .base_url
                .map(|base| same_host(base, candidate.url))
                .unwrap_or(false)
            {
                return true;
            }
        }
        _ => {}
    }

    let probe = identity.probe(candidate.context_text);
    if candidate.source == CandidateSource::LinkHubDiscovery
        && (probe.handle_match || (probe.name_match && probe.clue_match_count >= 1))
    {
        return true;
    }

    if host_matches_full_name(identity, candidate.url) {
        return !probe.clues_present || probe.handle_match || probe.clue_match_count >= 1;
    }

    if !path_matches_identity(identity, candidate.url) {
        return false;
    }
    probe.handle_match || (probe.name_match && probe.clue_match_count >= clue_matches_required)
}

/// Host contains both name parts, e.g. `shana-nielsen.com` for Shana Nielsen.
pub fn host_matches_full_name(identity: &LeadIdentity, url: &str) -> bool {
    match (bare_host(url), identity.full_name()) {
        (Some(host), Some((first, last))) => host.contains(first) && host.contains(last),
        _ => false,
    }
}

/// Joined, normalized path contains the known handle or both name parts.
pub fn path_matches_identity(identity: &LeadIdentity, url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let combined: String = parsed
        .path_segments()
        .map(|parts| parts.map(normalize_token).collect())
        .unwrap_or_default();
    if combined.is_empty() {
        return false;
    }
    if let Some(handle) = &identity.known_handle {
        if combined.contains(handle.as_str()) {
            return true;
        }
    }
    identity.contains_full_name(&combined)
}

fn fallback_decision(
    identity: &LeadIdentity,
    candidate: &Candidate<'_>,
    handle: Option<&str>,
    clue_matches_required: usize,
) -> IdentityDecision {
    let profile_type = candidate.profile_type;
    let exact = identity.exact_handle_match(profile_type, handle);

    let matched = if profile_type == ProfileType::Website {
        website_anchor(identity, candidate, clue_matches_required)
    } else if identity.strict_handle_required(profile_type) {
        exact
    } else {
        exact || social_name_match(identity, handle, candidate)
    };
    let allowed = candidate.source.is_trusted_seed()
        || (candidate.source == CandidateSource::SearchResult && exact);

    if matched && allowed {
        decided(
            true,
            Verdict::Accept,
            FALLBACK_ACCEPT_CONFIDENCE,
            "LLM unavailable; strict fallback accepted trusted seed.",
            Strategy::Fallback,
        )
    } else {
        decided(
            false,
            Verdict::Reject,
            0.0,
            "LLM unavailable; strict fallback rejected candidate.",
            Strategy::Fallback,
        )
    }
}

/// Full name embedded in the handle; search hits must also name the lead in context.
fn social_name_match(identity: &LeadIdentity, handle: Option<&str>, candidate: &Candidate<'_>) -> bool {
    let normalized = normalize_token(handle.unwrap_or(""));
    if normalized.is_empty() || !identity.contains_full_name(&normalized) {
        return false;
    }
    if candidate.source != CandidateSource::SearchResult {
        return true;
    }
    identity.mentions_full_name(candidate.context_text)
}

const IDENTITY_SYSTEM_PROMPT: &str = "\
You verify identities for lead research. Decide whether the candidate URL belongs to \
the exact same person as the lead, and reject when in doubt.

Rules:
- Lookalike names do not match. \"Shana Nielsen\" is not \"Shana Nelson\".
- Missing or swapped letters, plurals and near-spellings do not match.
- Platform feature pages (watch, feed, home, explore) are not person profiles.
- When the lead has a known handle on the candidate's platform, only that exact handle matches.
- Without an exact handle, require at least two independent signals: cross-links, location, \
employer, bio phrasing, shared portfolio work, or a strong handle/name match.
- Link-in-bio hubs (Linktree, Beacons and similar) count only when they carry the lead's handle or name.
- A false negative is cheaper than a false positive.
Return JSON only.";

fn identity_user_prompt(
    identity: &LeadIdentity,
    lead: &Lead,
    candidate: &Candidate<'_>,
    handle: Option<&str>,
) -> String {
    let known_handle = lead.handle.as_deref().unwrap_or("");
    format!(
        "Lead:\n\
         - name: {name}\n\
         - first_name_normalized: {first}\n\
         - last_name_normalized: {last}\n\
         - platform: {platform}\n\
         - known_handle: {known_handle}\n\
         - known_handle_normalized: {known_norm}\n\
         - role: {role}\n\
         - country: {country}\n\n\
         Candidate:\n\
         - url: {url}\n\
         - profile_type: {profile_type}\n\
         - extracted_handle: {handle}\n\
         - extracted_handle_normalized: {handle_norm}\n\
         - source: {source}\n\
         - base_url: {base_url}\n\
         - context_text: {context}\n\n\
         Accept only if this URL very likely belongs to the same person. \
         Reject ambiguous, partial or near matches.",
        name = lead.name,
        first = identity.first_name.as_deref().unwrap_or(""),
        last = identity.last_name.as_deref().unwrap_or(""),
        platform = lead.platform.as_deref().unwrap_or(""),
        known_norm = identity.known_handle.as_deref().unwrap_or(""),
        role = lead.role.as_deref().unwrap_or(""),
        country = lead.country.as_deref().unwrap_or(""),
        url = candidate.url,
        profile_type = candidate.profile_type,
        handle = handle.unwrap_or(""),
        handle_norm = normalize_token(handle.unwrap_or("")),
        source = candidate.source,
        base_url = candidate.base_url.unwrap_or(""),
        context = truncate_text(candidate.context_text, PROMPT_CONTEXT_CHARS),
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn confidence_normalization() {
        assert_eq!(normalize_confidence(&json!(0.9)), 0.9);
        assert_eq!(normalize_confidence(&json!(85)), 0.85);
        assert_eq!(normalize_confidence(&json!("0.7")), 0.7);
        assert_eq!(normalize_confidence(&json!(-3)), 0.0);
        assert_eq!(normalize_confidence(&json!(500)), 1.0);
        assert_eq!(normalize_confidence(&json!("high")), 0.0);
        assert_eq!(normalize_confidence(&Value::Null), 0.0);
    }

    fn shana() -> LeadIdentity {
        LeadIdentity {
            first_name: Some("shana".into()),
            last_name: Some("nielsen".into()),
            known_handle: Some("shanalnielsen".into()),
            platform_type: Some(ProfileType::Linkedin),
            ..Default::default()
        }
    }

    fn website<'a>(url: &'a str, source: CandidateSource, context: &'a str) -> Candidate<'a> {
        Candidate {
            url,
            profile_type: ProfileType::Website,
            source,
            base_url: None,
            context_text: context,
        }
    }

    #[test]
    fn host_and_path_identity() {
        let identity = shana();
        assert!(host_matches_full_name(&identity, "https://www.shana-nielsen.com/"));
        assert!(!host_matches_full_name(&identity, "https://shana.com/"));
        assert!(path_matches_identity(&identity, "https://linktr.ee/shanalnielsen"));
        assert!(path_matches_identity(&identity, "https://studio.example/team/shana-nielsen"));
        assert!(!path_matches_identity(&identity, "https://compasconsulting.com/aboutus/shanan.html"));
    }

    #[test]
    fn anchor_rules() {
        let identity = shana();
        assert!(website_anchor(
            &identity,
            &website("https://any.example/", CandidateSource::LeadWebsiteSeed, ""),
            2
        ));

        let mut same_host = website("https://shop.example/", CandidateSource::ProfileDiscovery, "");
        same_host.base_url = Some("https://shop.example/about");
        assert!(website_anchor(&identity, &same_host, 2));

        assert!(website_anchor(
            &identity,
            &website("https://portfolio.example/", CandidateSource::LinkHubDiscovery, "links for shanalnielsen"),
            2
        ));

        assert!(!website_anchor(
            &identity,
            &website("https://portfolio.example/", CandidateSource::SearchResult, "Shana Nielsen"),
            2
        ));
    }

    #[test]
    fn full_name_host_needs_matching_clue_when_clues_exist() {
        let mut identity = shana();
        identity.clue_tokens = vec!["aidirector".into(), "musicvideo".into(), "dunedin".into()];
        let url = "https://shana-nielsen.com/";
        assert!(!website_anchor(
            &identity,
            &website(url, CandidateSource::SearchResult, "Professional coaching and consulting."),
            2
        ));
        assert!(website_anchor(
            &identity,
            &website(url, CandidateSource::SearchResult, "New musicvideo out now"),
            2
        ));
    }

    #[test]
    fn fallback_only_accepts_trusted_seeds() {
        let identity = shana();
        let seed = Candidate {
            url: "https://www.linkedin.com/in/shanalnielsen",
            profile_type: ProfileType::Linkedin,
            source: CandidateSource::LeadHandleSeed,
            base_url: None,
            context_text: "",
        };
        let decision = fallback_decision(&identity, &seed, Some("shanalnielsen"), 2);
        assert!(decision.accepted);
        assert_eq!(decision.confidence, 0.5);
        assert_eq!(decision.strategy, Strategy::Fallback);

        let discovered = Candidate {
            url: "https://x.com/shananielsen",
            profile_type: ProfileType::X,
            source: CandidateSource::ProfileDiscovery,
            base_url: Some("https://www.linkedin.com/in/shanalnielsen"),
            context_text: "Shana Nielsen",
        };
        let decision = fallback_decision(&identity, &discovered, Some("shananielsen"), 2);
        assert!(!decision.accepted);
        assert_eq!(decision.reason, "LLM unavailable; strict fallback rejected candidate.");
    }
}
