//! Builds and grows the candidate map. Every offered URL goes through
//! normalization, shortener expansion, canonicalization and the identity
//! validator before it can take a slot.

use tracing::{debug, info};

use deepdive_common::{Dossier, LeadRecord, ProfileType, SearchResult};

use crate::candidates::CandidateMap;
use crate::canonical::{
    canonical_url, classify, is_link_aggregator, is_shortener, lead_handle_url, normalize_url,
    same_host, seed_website,
};
use crate::context::RunContext;
use crate::identity::{Candidate, CandidateSource, IdentityValidator};
use crate::traits::LinkResolver;

const MAX_EXISTING_PROFILES: usize = 50;
const MAX_SEED_SIGNALS: usize = 30;
const MAX_SEED_COMMUNICATIONS: usize = 30;

/// A raw URL offered to the candidate map.
#[derive(Debug, Clone, Copy)]
pub struct Offer<'a> {
    pub raw_url: &'a str,
    pub source: CandidateSource,
    pub type_hint: Option<ProfileType>,
    pub base_url: Option<&'a str>,
    pub context_text: &'a str,
}

impl<'a> Offer<'a> {
    pub fn new(raw_url: &'a str, source: CandidateSource, context_text: &'a str) -> Self {
        Self {
            raw_url,
            source,
            type_hint: None,
            base_url: None,
            context_text,
        }
    }
}

pub struct Discovery<'a> {
    validator: IdentityValidator<'a>,
    resolver: &'a dyn LinkResolver,
    max_urls_per_type: usize,
}

impl<'a> Discovery<'a> {
    pub fn new(
        validator: IdentityValidator<'a>,
        resolver: &'a dyn LinkResolver,
        max_urls_per_type: usize,
    ) -> Self {
        Self {
            validator,
            resolver,
            max_urls_per_type,
        }
    }

    /// Offer one URL. Returns true when it was accepted into the map.
    pub async fn append(
        &self,
        ctx: &mut RunContext,
        map: &mut CandidateMap,
        record: &LeadRecord,
        offer: Offer<'_>,
    ) -> bool {
        let Some(mut url) = normalize_url(offer.raw_url) else {
            return false;
        };
        if is_shortener(&url) {
            let expanded = self.resolver.expand(&url).await;
            url = normalize_url(&expanded).unwrap_or(url);
        }

        let Some(profile_type) = offer.type_hint.or_else(|| classify(&url)) else {
            return false;
        };
        let Some(canonical) = canonical_url(&url, profile_type) else {
            return false;
        };

        let trusted_website =
            profile_type == ProfileType::Website && offer.source == CandidateSource::LeadWebsiteSeed;
        if !map.admits(profile_type, &canonical, trusted_website) {
            return false;
        }

        let candidate = Candidate {
            url: &canonical,
            profile_type,
            source: offer.source,
            base_url: offer.base_url,
            context_text: offer.context_text,
        };
        let decision = self.validator.decide(ctx, &record.lead, &candidate).await;
        if !decision.accepted {
            return false;
        }

        let inserted = map.try_insert(profile_type, &canonical, trusted_website);
        if inserted {
            debug!(url = canonical.as_str(), profile_type = %profile_type, source = %offer.source, "Candidate accepted");
            ctx.remember_audit(profile_type, &canonical, decision.audit());
        }
        inserted
    }

    /// Initial candidate map from the lead's own data and the search results.
    pub async fn seed(
        &self,
        ctx: &mut RunContext,
        record: &LeadRecord,
        search_results: &[SearchResult],
    ) -> CandidateMap {
        let mut map = CandidateMap::new(self.max_urls_per_type);
        let lead = &record.lead;

        if let Some(url) = lead_handle_url(lead) {
            self.append(ctx, &mut map, record, Offer::new(&url, CandidateSource::LeadHandleSeed, ""))
                .await;
        }

        if let Some(website) = lead.website.as_deref().and_then(seed_website) {
            let offer = Offer {
                type_hint: Some(ProfileType::Website),
                ..Offer::new(&website, CandidateSource::LeadWebsiteSeed, "")
            };
            self.append(ctx, &mut map, record, offer).await;
        }

        for profile in record
            .social_profiles
            .iter()
            .filter(|p| !p.is_deep_dive())
            .take(MAX_EXISTING_PROFILES)
        {
            let offer = Offer::new(&profile.url, CandidateSource::ExistingProfileSeed, "");
            self.append(ctx, &mut map, record, offer).await;
        }

        for signal in record.recent_signals().into_iter().take(MAX_SEED_SIGNALS) {
            let Some(url) = signal.url.as_deref() else {
                continue;
            };
            let context = [&signal.author_name, &signal.author_handle, &signal.title]
                .into_iter()
                .flatten()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" ");
            self.append(ctx, &mut map, record, Offer::new(url, CandidateSource::SignalSeed, &context))
                .await;
        }

        for comm in record
            .recent_communications()
            .into_iter()
            .take(MAX_SEED_COMMUNICATIONS)
        {
            let Some(url) = comm.link.as_deref() else {
                continue;
            };
            let context = [&comm.summary, &comm.notes]
                .into_iter()
                .flatten()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" ");
            let offer = Offer::new(url, CandidateSource::CommunicationSeed, &context);
            self.append(ctx, &mut map, record, offer).await;
        }

        for result in search_results {
            let context = format!("{} {}", result.title, result.snippet);
            let offer = Offer::new(&result.url, CandidateSource::SearchResult, &context);
            self.append(ctx, &mut map, record, offer).await;
        }

        info!(lead_id = %record.lead.id, accepted = map.len(), "Candidate map seeded");
        map
    }

    /// Offer the relevant outbound links of freshly scraped dossiers.
    /// Returns true when anything new was accepted.
    pub async fn expand(
        &self,
        ctx: &mut RunContext,
        map: &mut CandidateMap,
        record: &LeadRecord,
        dossiers: &[Dossier],
    ) -> bool {
        let mut added = false;
        for dossier in dossiers {
            let context = format!(
                "{} {} {}",
                dossier.title, dossier.description, dossier.profile_text
            );
            let source = if is_link_aggregator(&dossier.url) {
                CandidateSource::LinkHubDiscovery
            } else {
                CandidateSource::ProfileDiscovery
            };

            for link in &dossier.links {
                if !is_relevant_link(&dossier.url, link) {
                    continue;
                }
                let offer = Offer {
                    base_url: Some(&dossier.url),
                    ..Offer::new(link, source, &context)
                };
                added |= self.append(ctx, map, record, offer).await;
            }
        }
        added
    }
}

/// Links worth following from a scraped page: hubs and social profiles always,
/// websites only from a hub or on the page's own host.
pub fn is_relevant_link(base_url: &str, candidate_url: &str) -> bool {
    let Some(profile_type) = classify(candidate_url) else {
        return false;
    };
    if is_link_aggregator(candidate_url) || profile_type.is_social() {
        return true;
    }
    is_link_aggregator(base_url) || same_host(base_url, candidate_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevance_rules() {
        let profile = "https://www.youtube.com/@avlinfilms";
        assert!(is_relevant_link(profile, "https://x.com/avlin"));
        assert!(is_relevant_link(profile, "https://linktr.ee/avlin"));
        assert!(!is_relevant_link(profile, "https://avery.film/"));
        assert!(!is_relevant_link(profile, "https://www.facebook.com/avlin"));

        let hub = "https://linktr.ee/avlin";
        assert!(is_relevant_link(hub, "https://avery.film/"));

        let site = "https://avery.film/";
        assert!(is_relevant_link(site, "https://avery.film/contact"));
        assert!(!is_relevant_link(site, "https://press.example/avery"));
    }
}
