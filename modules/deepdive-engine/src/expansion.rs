use std::collections::HashSet;

use tracing::{info, warn};

use deepdive_common::{DeepDiveConfig, DeepDiveError, Dossier, LeadRecord, ProfileType};

use crate::candidates::CandidateMap;
use crate::canonical::normalize_url;
use crate::context::RunContext;
use crate::discovery::Discovery;
use crate::sync::sync_profiles;
use crate::traits::{LeadStore, ProfileFetcher};

/// Scrape, discover, sync, repeat.
///
/// Stops after `expansion_waves` waves, once `max_dossiers` pages have been
/// scraped, when a wave scrapes nothing new, or when a wave accepts no new link.
pub struct GraphExpansion<'a> {
    pub discovery: &'a Discovery<'a>,
    pub fetcher: &'a dyn ProfileFetcher,
    pub store: &'a dyn LeadStore,
    pub config: &'a DeepDiveConfig,
}

impl GraphExpansion<'_> {
    pub async fn run(
        &self,
        ctx: &mut RunContext,
        map: &mut CandidateMap,
        record: &LeadRecord,
    ) -> Result<Vec<Dossier>, DeepDiveError> {
        let mut dossiers: Vec<Dossier> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for wave in 1..=self.config.expansion_waves {
            let budget = self.config.max_dossiers.saturating_sub(dossiers.len());
            if budget == 0 {
                break;
            }

            let fresh = self.scrape_wave(map, &mut seen, budget).await;
            if fresh.is_empty() {
                info!(wave, "Expansion wave scraped nothing new");
                break;
            }

            let added = self.discovery.expand(ctx, map, record, &fresh).await;
            info!(wave, scraped = fresh.len(), added, "Expansion wave complete");
            dossiers.extend(fresh);

            if added {
                sync_profiles(self.store, ctx, map).await?;
            }
            if dossiers.len() >= self.config.max_dossiers || !added {
                break;
            }
        }

        dossiers.truncate(self.config.max_dossiers);
        Ok(dossiers)
    }

    async fn scrape_wave(
        &self,
        map: &CandidateMap,
        seen: &mut HashSet<String>,
        budget: usize,
    ) -> Vec<Dossier> {
        let targets: Vec<(ProfileType, String)> =
            map.pairs().map(|(t, u)| (t, u.to_string())).collect();
        let mut wave = Vec::new();

        for (profile_type, url) in targets {
            if wave.len() >= budget {
                break;
            }
            let Some(normalized) = normalize_url(&url) else {
                continue;
            };
            if !seen.insert(normalized.clone()) {
                continue;
            }

            let include_about = profile_type == ProfileType::Website;
            match self.fetcher.fetch(&normalized, profile_type, include_about).await {
                Ok(Some(mut snapshot)) => {
                    if snapshot.channel_type.is_empty() {
                        snapshot.channel_type = profile_type.as_str().to_string();
                    }
                    wave.push(Dossier::from(snapshot));
                }
                Ok(None) => {}
                Err(e) => warn!(url = normalized.as_str(), error = %e, "Profile fetch failed"),
            }
        }
        wave
    }
}
