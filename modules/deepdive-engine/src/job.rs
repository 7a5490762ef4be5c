use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use deepdive_common::{truncate_to_char_boundary, DeepDiveError, DeepDiveStatus};

use crate::engine::DeepDive;

const MAX_ERROR_LEN: usize = 1000;

/// Status bookkeeping around a single `DeepDive::run`.
pub struct DeepDiveJob {
    engine: DeepDive,
}

impl DeepDiveJob {
    pub fn new(engine: DeepDive) -> Self {
        Self { engine }
    }

    /// A lead that no longer exists is skipped. Failures are recorded on the
    /// lead and then returned to the caller.
    pub async fn perform(&self, lead_id: Uuid) -> Result<(), DeepDiveError> {
        let store = self.engine.store();
        if store.load_lead(lead_id).await?.is_none() {
            warn!(lead_id = %lead_id, "Lead not found, skipping deep dive");
            return Ok(());
        }

        store
            .set_status(lead_id, DeepDiveStatus::Running, None, None)
            .await?;

        match self.engine.run(lead_id).await {
            Ok(data) => {
                info!(lead_id = %lead_id, confidence = data.confidence, "Deep dive job finished");
                Ok(())
            }
            Err(e) => {
                error!(lead_id = %lead_id, error = %e, "Deep dive failed");
                let message = format!("{}: {}", e.kind(), e);
                let message = truncate_to_char_boundary(&message, MAX_ERROR_LEN);
                if let Err(status_err) = store
                    .set_status(lead_id, DeepDiveStatus::Failed, Some(message), Some(Utc::now()))
                    .await
                {
                    warn!(lead_id = %lead_id, error = %status_err, "Failed to record deep dive failure");
                }
                Err(e)
            }
        }
    }
}
