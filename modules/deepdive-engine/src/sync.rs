use tracing::info;
use uuid::Uuid;

use deepdive_common::{DeepDiveError, ProfileMetadata, ProfileType, SocialProfile, DEEP_DIVE_SOURCE};

use crate::candidates::CandidateMap;
use crate::canonical::{extract_handle, normalize_url};
use crate::context::RunContext;
use crate::traits::LeadStore;

/// Writes performed by one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl SyncReport {
    pub fn writes(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// Make the lead's `deep_dive` profile rows mirror the candidate map exactly.
///
/// Rows not in the map are deleted, rows in the map are created or refreshed.
/// User-entered rows are left alone even when they share a (type, url) pair.
/// `last_seen_at` is the run's start time, so a repeat pass within one run
/// writes nothing.
pub async fn sync_profiles(
    store: &dyn LeadStore,
    ctx: &RunContext,
    map: &CandidateMap,
) -> Result<SyncReport, DeepDiveError> {
    let lead_id = ctx.lead_id;
    let desired: Vec<(ProfileType, String)> = map
        .pairs()
        .filter_map(|(t, url)| normalize_url(url).map(|u| (t, u)))
        .collect();
    let is_desired = |profile: &SocialProfile| {
        desired
            .iter()
            .any(|(t, u)| t.as_str() == profile.profile_type && *u == profile.url)
    };

    let mut report = SyncReport::default();
    let existing = store.social_profiles(lead_id).await?;

    for profile in existing.iter().filter(|p| p.is_deep_dive()) {
        if !is_desired(profile) {
            store.delete_social_profile(profile.id).await?;
            report.deleted += 1;
        }
    }

    for (profile_type, url) in &desired {
        let current = existing
            .iter()
            .find(|p| p.profile_type == profile_type.as_str() && p.url == *url);
        let audit = ctx.audit_for(*profile_type, url).cloned();

        match current {
            Some(row) if !row.is_deep_dive() => report.unchanged += 1,
            Some(row) => {
                let mut next = row.clone();
                if next.handle.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    next.handle = extract_handle(url, *profile_type);
                }
                next.metadata.last_seen_at = Some(ctx.started_at);
                if audit.is_some() {
                    next.metadata.identity_validation = audit;
                }
                if next == *row {
                    report.unchanged += 1;
                } else {
                    store.save_social_profile(&next).await?;
                    report.updated += 1;
                }
            }
            None => {
                let row = SocialProfile {
                    id: Uuid::new_v4(),
                    lead_id,
                    profile_type: profile_type.as_str().to_string(),
                    url: url.clone(),
                    handle: extract_handle(url, *profile_type),
                    source: DEEP_DIVE_SOURCE.to_string(),
                    metadata: ProfileMetadata {
                        last_seen_at: Some(ctx.started_at),
                        identity_validation: audit,
                        extra: Default::default(),
                    },
                };
                store.save_social_profile(&row).await?;
                report.created += 1;
            }
        }
    }

    info!(
        lead_id = %lead_id,
        created = report.created,
        updated = report.updated,
        deleted = report.deleted,
        unchanged = report.unchanged,
        "Social profiles synced"
    );
    Ok(report)
}
