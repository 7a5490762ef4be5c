//! Identity evidence for one lead: normalized name parts, known handle and a
//! bounded set of clue tokens drawn from the lead's own history.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use deepdive_common::{normalize_token, presence, LeadRecord, ProfileType};

use crate::canonical::{canonical_url, classify, extract_handle, platform_profile_type};

const MAX_TRUSTED_SIGNALS: usize = 40;
const MAX_CLUE_COMMUNICATIONS: usize = 10;

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\p{L}[\p{L}\p{N}]+").unwrap());
static ALPHA_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\p{L}+").unwrap());

const STOPWORDS: &[&str] = &[
    "about", "after", "all", "also", "and", "are", "as", "at", "away", "back", "because",
    "been", "before", "being", "but", "can", "contact", "did", "do", "does", "doing", "done",
    "each", "even", "every", "few", "for", "from", "get", "got", "had", "has", "having", "her",
    "here", "hers", "him", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself",
    "just", "made", "many", "may", "me", "might", "mine", "more", "most", "my", "myself", "new",
    "no", "not", "now", "of", "off", "on", "once", "one", "only", "or", "other", "our", "ours",
    "ourselves", "out", "over", "profile", "same", "she", "should", "site", "so", "some",
    "such", "that", "the", "their", "theirs", "them", "themselves", "then", "there", "these",
    "they", "this", "those", "through", "too", "under", "until", "up", "us", "very", "was",
    "we", "were", "what", "when", "where", "which", "while", "who", "why", "will", "with",
    "you", "your", "yours", "yourself", "yourselves",
];

/// Distinct identity tokens of `text`, in first-seen order.
pub fn identity_tokens(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    WORD.find_iter(text)
        .map(|m| normalize_token(m.as_str()))
        .filter(|t| t.len() >= 3 || t == "ai")
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Alphabetic words of at least four letters, used for role matching.
pub fn role_tokens(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    ALPHA_RUN
        .find_iter(text)
        .map(|m| normalize_token(m.as_str()))
        .filter(|t| t.len() >= 4)
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// First and last alphabetic name parts, normalized.
pub fn name_identity(name: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<String> = ALPHA_RUN
        .find_iter(name)
        .map(|m| normalize_token(m.as_str()))
        .filter(|t| !t.is_empty())
        .collect();
    (parts.first().cloned(), parts.last().cloned())
}

/// Normalized account handle from a stored handle, which may be a full profile URL.
fn handle_identity(raw: &str, platform_type: Option<ProfileType>) -> Option<String> {
    let raw = raw.trim();
    let lower = raw.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return Some(normalize_token(raw.trim_start_matches('@')));
    }
    let profile_type = platform_type.or_else(|| classify(raw))?;
    let canonical = canonical_url(raw, profile_type)?;
    extract_handle(&canonical, profile_type).map(|h| normalize_token(h.trim_start_matches('@')))
}

/// How well a piece of context text lines up with the lead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextProbe {
    pub name_match: bool,
    pub handle_match: bool,
    pub role_match: bool,
    pub clue_match_count: usize,
    pub clues_present: bool,
}

/// Everything the validator knows about who the lead is. Built once per run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadIdentity {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub known_handle: Option<String>,
    pub platform_type: Option<ProfileType>,
    pub clue_tokens: Vec<String>,
    pub role_tokens: Vec<String>,
}

impl LeadIdentity {
    pub fn from_record(record: &LeadRecord, max_clue_tokens: usize) -> Self {
        let lead = &record.lead;
        let (first_name, last_name) = name_identity(&lead.name);
        let platform_type = lead.platform.as_deref().and_then(platform_profile_type);
        let known_handle = lead
            .handle
            .as_deref()
            .and_then(|h| handle_identity(h, platform_type))
            .filter(|h| !h.is_empty());
        let category = lead.category.as_deref().unwrap_or("").replace('_', " ");

        let mut sources: Vec<String> = vec![
            lead.role.clone().unwrap_or_default(),
            lead.notes.clone().unwrap_or_default(),
            category.clone(),
        ];

        let mut identity = Self {
            first_name,
            last_name,
            known_handle,
            platform_type,
            clue_tokens: Vec::new(),
            role_tokens: Vec::new(),
        };

        for signal in record.recent_signals().into_iter().take(MAX_TRUSTED_SIGNALS) {
            if identity.trusts_signal(
                signal.author_handle.as_deref(),
                signal.author_name.as_deref(),
                signal.url.as_deref(),
            ) {
                sources.push(signal.title.clone().unwrap_or_default());
                sources.push(signal.content.clone().unwrap_or_default());
            }
        }
        for comm in record
            .recent_communications()
            .into_iter()
            .take(MAX_CLUE_COMMUNICATIONS)
        {
            sources.push(comm.summary.clone().unwrap_or_default());
            sources.push(comm.notes.clone().unwrap_or_default());
        }

        let names: Vec<&String> = [&identity.first_name, &identity.last_name]
            .into_iter()
            .flatten()
            .collect();
        let mut clues = identity_tokens(&sources.join(" "));
        clues.retain(|t| !names.contains(&t));
        clues.truncate(max_clue_tokens);
        identity.clue_tokens = clues;

        let mut roles = role_tokens(presence(&lead.role).unwrap_or(""));
        roles.extend(role_tokens(&category));
        identity.role_tokens = roles;

        identity
    }

    /// A signal speaks for the lead when it carries the known handle or both name parts.
    fn trusts_signal(
        &self,
        author_handle: Option<&str>,
        author_name: Option<&str>,
        url: Option<&str>,
    ) -> bool {
        if let Some(known) = &self.known_handle {
            let handle = normalize_token(author_handle.unwrap_or("").trim_start_matches('@'));
            if &handle == known {
                return true;
            }
            if url.unwrap_or("").to_lowercase().contains(known.as_str()) {
                return true;
            }
        }
        let name = normalize_token(author_name.unwrap_or(""));
        self.contains_full_name(&name)
    }

    pub fn full_name(&self) -> Option<(&str, &str)> {
        Some((self.first_name.as_deref()?, self.last_name.as_deref()?))
    }

    /// Both name parts appear in an already-normalized string.
    pub fn contains_full_name(&self, normalized: &str) -> bool {
        match self.full_name() {
            Some((first, last)) => normalized.contains(first) && normalized.contains(last),
            None => false,
        }
    }

    pub fn mentions_full_name(&self, text: &str) -> bool {
        let normalized = normalize_token(text);
        !normalized.is_empty() && self.contains_full_name(&normalized)
    }

    pub fn probe(&self, text: &str) -> ContextProbe {
        let normalized = normalize_token(text);
        let tokens: HashSet<String> = identity_tokens(text).into_iter().collect();

        ContextProbe {
            name_match: self
                .full_name()
                .map(|(first, last)| tokens.contains(first) && tokens.contains(last))
                .unwrap_or(false),
            handle_match: self
                .known_handle
                .as_deref()
                .map(|h| normalized.contains(h))
                .unwrap_or(false),
            role_match: self.role_tokens.iter().any(|t| tokens.contains(t)),
            clue_match_count: self.clue_tokens.iter().filter(|t| tokens.contains(*t)).count(),
            clues_present: !self.clue_tokens.is_empty(),
        }
    }

    /// Candidate handle equals the lead's handle on the lead's own platform.
    pub fn exact_handle_match(&self, profile_type: ProfileType, candidate_handle: Option<&str>) -> bool {
        if self.platform_type != Some(profile_type) {
            return false;
        }
        match (&self.known_handle, candidate_handle) {
            (Some(known), Some(candidate)) => &normalize_token(candidate) == known,
            _ => false,
        }
    }

    /// On the lead's own platform a known handle is the only acceptable identity.
    pub fn strict_handle_required(&self, profile_type: ProfileType) -> bool {
        self.platform_type == Some(profile_type) && self.known_handle.is_some()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use deepdive_common::{Communication, Lead, Signal};

    use super::*;

    fn signal(author_handle: &str, author_name: &str, title: &str) -> Signal {
        Signal {
            source: "x".into(),
            author_name: Some(author_name.into()),
            author_handle: Some(author_handle.into()),
            title: Some(title.into()),
            content: None,
            url: None,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn tokens_drop_stopwords_and_short_words() {
        assert_eq!(
            identity_tokens("The AI director of Zoë's music-video for Dunedin"),
            vec!["ai", "director", "zoe", "music", "video", "dunedin"]
        );
    }

    #[test]
    fn name_identity_uses_first_and_last_parts() {
        assert_eq!(
            name_identity("Shana L. Nielsen"),
            (Some("shana".into()), Some("nielsen".into()))
        );
        assert_eq!(name_identity(""), (None, None));
    }

    #[test]
    fn clues_come_from_lead_fields_and_trusted_history() {
        let lead = Lead {
            role: Some("AI Director".into()),
            category: Some("music_video".into()),
            ..Lead::new("Shana Nielsen").with_platform("LinkedIn", "@shanalnielsen")
        };
        let mut record = LeadRecord::new(lead);
        record.signals = vec![
            signal("shanalnielsen", "", "Dunedin premiere"),
            signal("someoneelse", "Other Person", "Unrelated keynote"),
            signal("", "Shana Nielsen", "Shana Nielsen festival award"),
        ];
        record.communications = vec![Communication {
            channel: "email".into(),
            summary: Some("Asked about rates".into()),
            notes: None,
            link: None,
            occurred_at: Utc::now() - Duration::days(1),
        }];

        let identity = LeadIdentity::from_record(&record, 28);
        assert!(identity.clue_tokens.contains(&"dunedin".to_string()));
        assert!(identity.clue_tokens.contains(&"festival".to_string()));
        assert!(identity.clue_tokens.contains(&"rates".to_string()));
        assert!(!identity.clue_tokens.contains(&"keynote".to_string()));
        assert!(!identity.clue_tokens.contains(&"shana".to_string()));
        assert_eq!(identity.role_tokens, vec!["director", "music", "video"]);
        assert_eq!(identity.known_handle.as_deref(), Some("shanalnielsen"));
    }

    #[test]
    fn handle_given_as_url_reduces_to_the_account_name() {
        let lead = Lead::new("Avery Lin").with_platform("X", "https://x.com/AvLin");
        let identity = LeadIdentity::from_record(&LeadRecord::new(lead), 28);
        assert_eq!(identity.known_handle.as_deref(), Some("avlin"));
        assert!(identity.exact_handle_match(ProfileType::X, Some("AvLin")));

        let lead = Lead::new("Avery Lin").with_platform("YouTube", "https://www.youtube.com/@avlinfilms/videos");
        let identity = LeadIdentity::from_record(&LeadRecord::new(lead), 28);
        assert_eq!(identity.known_handle.as_deref(), Some("avlinfilms"));
    }

    #[test]
    fn clue_tokens_are_capped() {
        let notes = (0..60).map(|i| format!("word{i}x")).collect::<Vec<_>>().join(" ");
        let lead = Lead {
            notes: Some(notes),
            ..Lead::new("Avery Lin")
        };
        let identity = LeadIdentity::from_record(&LeadRecord::new(lead), 28);
        assert_eq!(identity.clue_tokens.len(), 28);
    }

    #[test]
    fn probe_counts_matches() {
        let lead = Lead {
            notes: Some("aidirector musicvideo dunedin".into()),
            ..Lead::new("Shana Nielsen").with_platform("LinkedIn", "shanalnielsen")
        };
        let identity = LeadIdentity::from_record(&LeadRecord::new(lead), 28);

        let probe = identity.probe("Shana Nielsen shot a musicvideo in Dunedin");
        assert!(probe.name_match);
        assert!(!probe.handle_match);
        assert_eq!(probe.clue_match_count, 2);
        assert!(probe.clues_present);

        let probe = identity.probe("linkedin.com/in/shanalnielsen");
        assert!(probe.handle_match);
        assert!(!probe.name_match);
    }

    #[test]
    fn exact_handle_only_applies_on_declared_platform() {
        let lead = Lead::new("Shana Nielsen").with_platform("LinkedIn", "shanalnielsen");
        let identity = LeadIdentity::from_record(&LeadRecord::new(lead), 28);
        assert!(identity.exact_handle_match(ProfileType::Linkedin, Some("ShanaLNielsen")));
        assert!(!identity.exact_handle_match(ProfileType::Linkedin, Some("shana-nielsen-71a65b70")));
        assert!(!identity.exact_handle_match(ProfileType::X, Some("shanalnielsen")));
        assert!(identity.strict_handle_required(ProfileType::Linkedin));
        assert!(!identity.strict_handle_required(ProfileType::Instagram));
    }
}
