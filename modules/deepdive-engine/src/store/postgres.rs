use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use deepdive_common::{
    Communication, DeepDiveError, DeepDiveStatus, Lead, LeadOutcome, LeadRecord, Signal,
    SocialProfile,
};

use crate::traits::LeadStore;

/// Signals and communications beyond this are never read by identity or planning.
const MAX_SIGNAL_ROWS: i64 = 40;
const MAX_COMMUNICATION_ROWS: i64 = 10;

/// Postgres-backed `LeadStore`.
#[derive(Clone)]
pub struct PgLeadStore {
    pool: PgPool,
}

impl PgLeadStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, DeepDiveError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await
            .map_err(storage)?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), DeepDiveError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DeepDiveError::Storage(e.to_string()))
    }
}

fn storage(err: sqlx::Error) -> DeepDiveError {
    DeepDiveError::Storage(err.to_string())
}

// --- Row types ---

#[derive(Debug, sqlx::FromRow)]
struct LeadRow {
    id: Uuid,
    organization_id: Uuid,
    name: String,
    platform: Option<String>,
    handle: Option<String>,
    role: Option<String>,
    country: Option<String>,
    notes: Option<String>,
    category: Option<String>,
    website: Option<String>,
    email: Option<String>,
    deep_dive_status: String,
    deep_dive_error: Option<String>,
    deep_dive_last_run_at: Option<DateTime<Utc>>,
    deep_dive_data: Value,
}

impl From<LeadRow> for Lead {
    fn from(row: LeadRow) -> Self {
        Lead {
            id: row.id,
            organization_id: row.organization_id,
            name: row.name,
            platform: row.platform,
            handle: row.handle,
            role: row.role,
            country: row.country,
            notes: row.notes,
            category: row.category,
            website: row.website,
            email: row.email,
            deep_dive_status: row.deep_dive_status.parse().unwrap_or_default(),
            deep_dive_error: row.deep_dive_error,
            deep_dive_last_run_at: row.deep_dive_last_run_at,
            deep_dive_data: row.deep_dive_data,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SignalRow {
    source: String,
    author_name: Option<String>,
    author_handle: Option<String>,
    title: Option<String>,
    content: Option<String>,
    url: Option<String>,
    captured_at: DateTime<Utc>,
}

impl From<SignalRow> for Signal {
    fn from(row: SignalRow) -> Self {
        Signal {
            source: row.source,
            author_name: row.author_name,
            author_handle: row.author_handle,
            title: row.title,
            content: row.content,
            url: row.url,
            captured_at: row.captured_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CommunicationRow {
    channel: String,
    summary: Option<String>,
    notes: Option<String>,
    link: Option<String>,
    occurred_at: DateTime<Utc>,
}

impl From<CommunicationRow> for Communication {
    fn from(row: CommunicationRow) -> Self {
        Communication {
            channel: row.channel,
            summary: row.summary,
            notes: row.notes,
            link: row.link,
            occurred_at: row.occurred_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SocialProfileRow {
    id: Uuid,
    lead_id: Uuid,
    profile_type: String,
    url: String,
    handle: Option<String>,
    source: String,
    metadata: Value,
}

impl From<SocialProfileRow> for SocialProfile {
    fn from(row: SocialProfileRow) -> Self {
        SocialProfile {
            id: row.id,
            lead_id: row.lead_id,
            profile_type: row.profile_type,
            url: row.url,
            handle: row.handle,
            source: row.source,
            // Unreadable metadata is treated as empty rather than failing the load.
            metadata: serde_json::from_value(row.metadata).unwrap_or_default(),
        }
    }
}

#[async_trait]
impl LeadStore for PgLeadStore {
    async fn load_lead(&self, lead_id: Uuid) -> Result<Option<LeadRecord>, DeepDiveError> {
        let Some(lead) = sqlx::query_as::<_, LeadRow>(
            r#"
            SELECT id, organization_id, name, platform, handle, role, country, notes,
                   category, website, email, deep_dive_status, deep_dive_error,
                   deep_dive_last_run_at, deep_dive_data
            FROM leads
            WHERE id = $1
            "#,
        )
        .bind(lead_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?
        else {
            return Ok(None);
        };

        let signals = sqlx::query_as::<_, SignalRow>(
            r#"
            SELECT source, author_name, author_handle, title, content, url, captured_at
            FROM lead_signals
            WHERE lead_id = $1
            ORDER BY captured_at DESC
            LIMIT $2
            "#,
        )
        .bind(lead_id)
        .bind(MAX_SIGNAL_ROWS)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let communications = sqlx::query_as::<_, CommunicationRow>(
            r#"
            SELECT channel, summary, notes, link, occurred_at
            FROM lead_communications
            WHERE lead_id = $1
            ORDER BY occurred_at DESC
            LIMIT $2
            "#,
        )
        .bind(lead_id)
        .bind(MAX_COMMUNICATION_ROWS)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let social_profiles = self.social_profiles(lead_id).await?;

        Ok(Some(LeadRecord {
            lead: lead.into(),
            signals: signals.into_iter().map(Into::into).collect(),
            communications: communications.into_iter().map(Into::into).collect(),
            social_profiles,
        }))
    }

    async fn social_profiles(&self, lead_id: Uuid) -> Result<Vec<SocialProfile>, DeepDiveError> {
        let rows = sqlx::query_as::<_, SocialProfileRow>(
            r#"
            SELECT id, lead_id, profile_type, url, handle, source, metadata
            FROM lead_social_profiles
            WHERE lead_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn save_social_profile(&self, profile: &SocialProfile) -> Result<(), DeepDiveError> {
        let metadata = serde_json::to_value(&profile.metadata)
            .map_err(|e| DeepDiveError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO lead_social_profiles (id, lead_id, profile_type, url, handle, source, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (lead_id, profile_type, url) DO UPDATE SET
                handle = EXCLUDED.handle,
                source = EXCLUDED.source,
                metadata = EXCLUDED.metadata,
                updated_at = now()
            "#,
        )
        .bind(profile.id)
        .bind(profile.lead_id)
        .bind(&profile.profile_type)
        .bind(&profile.url)
        .bind(&profile.handle)
        .bind(&profile.source)
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }

    async fn delete_social_profile(&self, profile_id: Uuid) -> Result<(), DeepDiveError> {
        sqlx::query("DELETE FROM lead_social_profiles WHERE id = $1")
            .bind(profile_id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn set_status(
        &self,
        lead_id: Uuid,
        status: DeepDiveStatus,
        error: Option<&str>,
        last_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), DeepDiveError> {
        sqlx::query(
            r#"
            UPDATE leads SET
                deep_dive_status = $2,
                deep_dive_error = $3,
                deep_dive_last_run_at = COALESCE($4, deep_dive_last_run_at),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(lead_id)
        .bind(status.as_str())
        .bind(error)
        .bind(last_run_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn save_outcome(
        &self,
        lead_id: Uuid,
        outcome: &LeadOutcome,
    ) -> Result<(), DeepDiveError> {
        sqlx::query(
            r#"
            UPDATE leads SET
                website = $2,
                email = $3,
                deep_dive_status = $4,
                deep_dive_error = NULL,
                deep_dive_last_run_at = $5,
                deep_dive_data = $6,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(lead_id)
        .bind(&outcome.website)
        .bind(&outcome.email)
        .bind(DeepDiveStatus::Complete.as_str())
        .bind(outcome.completed_at)
        .bind(&outcome.deep_dive_data)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }
}
