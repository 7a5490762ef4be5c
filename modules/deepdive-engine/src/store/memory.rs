use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use deepdive_common::{
    DeepDiveError, DeepDiveStatus, LeadOutcome, LeadRecord, SocialProfile,
};

use crate::traits::LeadStore;

/// In-memory `LeadStore` for tests and dry runs. Counts profile writes so
/// callers can assert on sync behaviour.
#[derive(Default)]
pub struct MemoryLeadStore {
    leads: Mutex<HashMap<Uuid, LeadRecord>>,
    profile_saves: AtomicUsize,
    profile_deletes: AtomicUsize,
}

impl MemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lead(self, record: LeadRecord) -> Self {
        self.insert(record);
        self
    }

    pub fn insert(&self, record: LeadRecord) {
        self.lock().insert(record.lead.id, record);
    }

    /// Current state of a lead, including its profile rows.
    pub fn record(&self, lead_id: Uuid) -> Option<LeadRecord> {
        self.lock().get(&lead_id).cloned()
    }

    pub fn profile_saves(&self) -> usize {
        self.profile_saves.load(Ordering::SeqCst)
    }

    pub fn profile_deletes(&self) -> usize {
        self.profile_deletes.load(Ordering::SeqCst)
    }

    pub fn profile_writes(&self) -> usize {
        self.profile_saves() + self.profile_deletes()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, LeadRecord>> {
        self.leads.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_record<T>(
        &self,
        lead_id: Uuid,
        f: impl FnOnce(&mut LeadRecord) -> T,
    ) -> Result<T, DeepDiveError> {
        let mut leads = self.lock();
        let record = leads
            .get_mut(&lead_id)
            .ok_or(DeepDiveError::LeadNotFound(lead_id))?;
        Ok(f(record))
    }
}

#[async_trait]
impl LeadStore for MemoryLeadStore {
    async fn load_lead(&self, lead_id: Uuid) -> Result<Option<LeadRecord>, DeepDiveError> {
        Ok(self.record(lead_id))
    }

    async fn social_profiles(&self, lead_id: Uuid) -> Result<Vec<SocialProfile>, DeepDiveError> {
        Ok(self
            .record(lead_id)
            .map(|r| r.social_profiles)
            .unwrap_or_default())
    }

    async fn save_social_profile(&self, profile: &SocialProfile) -> Result<(), DeepDiveError> {
        self.with_record(profile.lead_id, |record| {
            match record.social_profiles.iter_mut().find(|p| {
                p.profile_type == profile.profile_type && p.url == profile.url
            }) {
                Some(existing) => *existing = profile.clone(),
                None => record.social_profiles.push(profile.clone()),
            }
        })?;
        self.profile_saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_social_profile(&self, profile_id: Uuid) -> Result<(), DeepDiveError> {
        let mut leads = self.lock();
        for record in leads.values_mut() {
            record.social_profiles.retain(|p| p.id != profile_id);
        }
        self.profile_deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_status(
        &self,
        lead_id: Uuid,
        status: DeepDiveStatus,
        error: Option<&str>,
        last_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), DeepDiveError> {
        self.with_record(lead_id, |record| {
            record.lead.deep_dive_status = status;
            record.lead.deep_dive_error = error.map(str::to_string);
            if last_run_at.is_some() {
                record.lead.deep_dive_last_run_at = last_run_at;
            }
        })
    }

    async fn save_outcome(
        &self,
        lead_id: Uuid,
        outcome: &LeadOutcome,
    ) -> Result<(), DeepDiveError> {
        self.with_record(lead_id, |record| {
            let lead = &mut record.lead;
            lead.website = outcome.website.clone();
            lead.email = outcome.email.clone();
            lead.deep_dive_status = DeepDiveStatus::Complete;
            lead.deep_dive_error = None;
            lead.deep_dive_last_run_at = Some(outcome.completed_at);
            lead.deep_dive_data = outcome.deep_dive_data.clone();
        })
    }
}
