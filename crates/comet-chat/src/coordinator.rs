use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use comet_db::Database;
use comet_types::error::ChatError;
use comet_types::models::{MatchAssignment, MatchState, MatchStatus};

use crate::blocking;
use crate::provisioner::RoomProvisioner;
use crate::retry::{RetryConfig, with_retry};

/// Whose consent opens the chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApprovalPolicy {
    /// Both sides must have approved.
    #[default]
    Mutual,
    /// The caller's own approval is enough.
    SingleSided,
}

impl ApprovalPolicy {
    pub fn unlocks_chat(&self, mine: &MatchAssignment, theirs: &MatchAssignment) -> bool {
        match self {
            Self::Mutual => mine.match_approved && theirs.match_approved,
            Self::SingleSided => mine.match_approved,
        }
    }
}

impl FromStr for ApprovalPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mutual" => Ok(Self::Mutual),
            "single" | "single_sided" => Ok(Self::SingleSided),
            other => Err(format!("unknown approval policy '{}'", other)),
        }
    }
}

impl fmt::Display for ApprovalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mutual => f.write_str("mutual"),
            Self::SingleSided => f.write_str("single"),
        }
    }
}

/// Per-user handshake: observes the match source's assignment and records
/// the owner's consent.
#[derive(Clone)]
pub struct MatchCoordinator {
    db: Arc<Database>,
    provisioner: RoomProvisioner,
    retry: RetryConfig,
}

impl MatchCoordinator {
    pub fn new(db: Arc<Database>, provisioner: RoomProvisioner, retry: RetryConfig) -> Self {
        Self {
            db,
            provisioner,
            retry,
        }
    }

    pub async fn get_state(&self, user_uid: &str) -> Result<MatchStatus, ChatError> {
        let Some(mine) = self.assignment(user_uid).await? else {
            return Ok(MatchStatus::no_match());
        };
        self.status_of(&mine).await
    }

    /// Record the owner's approval for the current period. Calling it again
    /// is a no-op that returns the current state.
    pub async fn approve(&self, user_uid: &str) -> Result<MatchStatus, ChatError> {
        let mine = with_retry(&self.retry, "approve", |_| self.try_approve(user_uid)).await?;
        self.status_of(&mine).await
    }

    async fn try_approve(&self, user_uid: &str) -> Result<MatchAssignment, ChatError> {
        let mut mine = self
            .read_assignment(user_uid)
            .await?
            .filter(|a| a.has_match())
            .ok_or(ChatError::NotMatched)?;

        if mine.match_approved {
            return Ok(mine);
        }

        let (uid, match_uid, period) =
            (user_uid.to_string(), mine.match_uid.clone(), mine.period.clone());
        let written =
            blocking(&self.db, move |db| db.set_match_approved(&uid, &match_uid, &period)).await?;
        if !written {
            // The match source re-paired us since the read; re-read.
            return Err(ChatError::Transient("assignment superseded during approval".into()));
        }

        info!("{} approved match with {} ({})", user_uid, mine.match_uid, mine.period);
        mine.match_approved = true;
        Ok(mine)
    }

    /// Provision (or look up) the room for the user's current pairing.
    pub async fn open_room(&self, user_uid: &str) -> Result<String, ChatError> {
        let mine = self
            .assignment(user_uid)
            .await?
            .filter(|a| a.has_match())
            .ok_or(ChatError::NotMatched)?;
        self.provisioner.ensure_room(user_uid, &mine.match_uid).await
    }

    pub fn provisioner(&self) -> &RoomProvisioner {
        &self.provisioner
    }

    async fn status_of(&self, mine: &MatchAssignment) -> Result<MatchStatus, ChatError> {
        if !mine.has_match() {
            return Ok(MatchStatus::no_match());
        }

        let partner_approved = self
            .assignment(&mine.match_uid)
            .await?
            .is_some_and(|theirs| theirs.is_paired_with(&mine.user_uid) && theirs.match_approved);

        Ok(MatchStatus {
            state: MatchState::of(Some(mine)),
            match_uid: Some(mine.match_uid.clone()),
            room_id: mine.room_id().map(str::to_string),
            partner_approved,
            period: Some(mine.period.clone()),
        })
    }

    async fn assignment(&self, uid: &str) -> Result<Option<MatchAssignment>, ChatError> {
        with_retry(&self.retry, "get_assignment", |_| self.read_assignment(uid)).await
    }

    /// Single attempt; callers already inside a retry loop use this one.
    async fn read_assignment(&self, uid: &str) -> Result<Option<MatchAssignment>, ChatError> {
        let uid = uid.to_string();
        let row = blocking(&self.db, move |db| db.get_assignment(&uid)).await?;
        Ok(row.map(|r| r.into_model()))
    }
}
