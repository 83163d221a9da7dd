use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use comet_db::{Database, RoomCas};
use comet_types::error::ChatError;
use comet_types::models::MatchAssignment;

use crate::blocking;
use crate::coordinator::ApprovalPolicy;
use crate::retry::{RetryConfig, with_retry};

/// Creates, at most once, the room shared by an approved pairing.
#[derive(Clone)]
pub struct RoomProvisioner {
    db: Arc<Database>,
    policy: ApprovalPolicy,
    retry: RetryConfig,
}

impl RoomProvisioner {
    pub fn new(db: Arc<Database>, policy: ApprovalPolicy, retry: RetryConfig) -> Self {
        Self { db, policy, retry }
    }

    /// Return the pairing's room id, provisioning it if needed.
    ///
    /// Both sides may call this concurrently; the store's compare-and-set
    /// guarantees they end up with the same id. A re-pairing between the read
    /// and the write surfaces as a transient error and is retried against
    /// the fresh assignments.
    pub async fn ensure_room(&self, user_uid: &str, match_uid: &str) -> Result<String, ChatError> {
        with_retry(&self.retry, "ensure_room", |_| self.try_ensure_room(user_uid, match_uid)).await
    }

    async fn try_ensure_room(&self, user_uid: &str, match_uid: &str) -> Result<String, ChatError> {
        let mine = self.assignment(user_uid).await?.ok_or(ChatError::NotMatched)?;
        if !mine.is_paired_with(match_uid) {
            return Err(ChatError::NotMatched);
        }
        if let Some(room_id) = mine.room_id() {
            return Ok(room_id.to_string());
        }

        let theirs = self
            .assignment(match_uid)
            .await?
            .filter(|a| a.is_paired_with(user_uid))
            .ok_or(ChatError::NotMatched)?;

        if !self.policy.unlocks_chat(&mine, &theirs) {
            return Err(ChatError::NotApproved);
        }

        // Random, so the id cannot be derived from the two user ids.
        let candidate = Uuid::new_v4().to_string();
        let (user, partner) = (user_uid.to_string(), match_uid.to_string());
        let (user_period, partner_period) = (mine.period.clone(), theirs.period.clone());
        let outcome = blocking(&self.db, move |db| {
            db.claim_room(&user, &user_period, &partner, &partner_period, &candidate)
        })
        .await?;

        match outcome {
            RoomCas::Created(room_id) => {
                info!("Provisioned room {} for {} and {}", room_id, user_uid, match_uid);
                Ok(room_id)
            }
            RoomCas::Conflict { current } => {
                debug!("{} adopted room {} provisioned by {}", user_uid, current, match_uid);
                Ok(current)
            }
            RoomCas::Stale => Err(ChatError::Transient(
                "assignment superseded during provisioning".into(),
            )),
        }
    }

    async fn assignment(&self, uid: &str) -> Result<Option<MatchAssignment>, ChatError> {
        let uid = uid.to_string();
        let row = blocking(&self.db, move |db| db.get_assignment(&uid)).await?;
        Ok(row.map(|r| r.into_model()))
    }
}
