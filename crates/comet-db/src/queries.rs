use crate::Database;
use crate::models::{AssignmentRow, MessageRow, ProfileRow, RoomRow};
use anyhow::Result;
use comet_types::models::{MessageKind, ReplyRef, UserProfile};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};

/// Outcome of the conditional room write in [`Database::claim_room`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomCas {
    /// The candidate id was written to both assignments.
    Created(String),
    /// Another writer provisioned first; its id was kept and must be adopted.
    Conflict { current: String },
    /// One side's assignment moved to another period or partner (or vanished)
    /// since it was read.
    Stale,
}

impl Database {
    // -- Profiles --

    pub fn upsert_profile(&self, profile: &UserProfile) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO profiles (uid, name, handle, photo_url, place_of_birth)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(uid) DO UPDATE SET
                    name = excluded.name,
                    handle = excluded.handle,
                    photo_url = excluded.photo_url,
                    place_of_birth = excluded.place_of_birth,
                    updated_at = datetime('now')",
                rusqlite::params![
                    profile.uid,
                    profile.name,
                    profile.handle,
                    profile.photo_url,
                    profile.place_of_birth
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_profile(&self, uid: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT uid, name, handle, photo_url, place_of_birth FROM profiles WHERE uid = ?1",
                    [uid],
                    |row| {
                        Ok(ProfileRow {
                            uid: row.get(0)?,
                            name: row.get(1)?,
                            handle: row.get(2)?,
                            photo_url: row.get(3)?,
                            place_of_birth: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Match assignments --

    /// Match-source write: start a new period for `user_uid`.
    /// Re-sending the same pairing for the same period is a no-op, so approval
    /// and room survive a replayed feed. Returns whether anything changed.
    pub fn assign_match(&self, user_uid: &str, match_uid: &str, period: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT INTO match_assignments (user_uid, match_uid, period)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_uid) DO UPDATE SET
                    match_uid = excluded.match_uid,
                    match_approved = 0,
                    chat_room_id = '',
                    period = excluded.period,
                    updated_at = datetime('now')
                 WHERE match_assignments.period != excluded.period
                    OR match_assignments.match_uid != excluded.match_uid",
                (user_uid, match_uid, period),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn get_assignment(&self, user_uid: &str) -> Result<Option<AssignmentRow>> {
        self.with_conn(|conn| query_assignment(conn, user_uid))
    }

    /// Set the approval flag, but only for the pairing and period the caller
    /// decided on. Returns false when the assignment was superseded in between.
    pub fn set_match_approved(&self, user_uid: &str, match_uid: &str, period: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE match_assignments
                 SET match_approved = 1, updated_at = datetime('now')
                 WHERE user_uid = ?1 AND match_uid = ?2 AND period = ?3 AND match_uid != ''",
                (user_uid, match_uid, period),
            )?;
            Ok(changed == 1)
        })
    }

    // -- Rooms --

    /// Compare-and-set provisioning of the room shared by two assignments.
    ///
    /// Runs in an IMMEDIATE transaction: the write lock is taken before either
    /// `chat_room_id` is read. Each assignment must still name the other user
    /// for the given period, and is only written where its `chat_room_id` is
    /// still empty.
    pub fn claim_room(
        &self,
        user_uid: &str,
        user_period: &str,
        partner_uid: &str,
        partner_period: &str,
        candidate: &str,
    ) -> Result<RoomCas> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let mine = room_for_pairing(&tx, user_uid, partner_uid, user_period)?;
            let theirs = room_for_pairing(&tx, partner_uid, user_uid, partner_period)?;
            let (Some(mine), Some(theirs)) = (mine, theirs) else {
                return Ok(RoomCas::Stale);
            };

            let (room_id, outcome) = match [mine, theirs].into_iter().find(|id| !id.is_empty()) {
                Some(current) => (current.clone(), RoomCas::Conflict { current }),
                None => {
                    let (user_a, user_b) = if user_uid <= partner_uid {
                        (user_uid, partner_uid)
                    } else {
                        (partner_uid, user_uid)
                    };
                    tx.execute(
                        "INSERT INTO chat_rooms (id, user_a, user_b) VALUES (?1, ?2, ?3)",
                        (candidate, user_a, user_b),
                    )?;
                    (candidate.to_string(), RoomCas::Created(candidate.to_string()))
                }
            };

            for (uid, match_uid, period) in [
                (user_uid, partner_uid, user_period),
                (partner_uid, user_uid, partner_period),
            ] {
                tx.execute(
                    "UPDATE match_assignments
                     SET chat_room_id = ?1, updated_at = datetime('now')
                     WHERE user_uid = ?2 AND match_uid = ?3 AND period = ?4 AND chat_room_id = ''",
                    (&room_id, uid, match_uid, period),
                )?;
            }

            tx.commit()?;
            Ok(outcome)
        })
    }

    pub fn get_room(&self, room_id: &str) -> Result<Option<RoomRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_a, user_b, created_at FROM chat_rooms WHERE id = ?1",
                    [room_id],
                    |row| {
                        Ok(RoomRow {
                            id: row.get(0)?,
                            user_a: row.get(1)?,
                            user_b: row.get(2)?,
                            created_at: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Messages --

    /// Append to a room's log. The id and timestamp are assigned here.
    pub fn insert_message(
        &self,
        room_id: &str,
        sent_by: &str,
        body: &str,
        kind: MessageKind,
        reply_to: Option<&ReplyRef>,
    ) -> Result<MessageRow> {
        self.with_conn(|conn| {
            let (id, created_at): (i64, String) = conn.query_row(
                "INSERT INTO messages
                    (room_id, sent_by, body, kind, reply_message_id, reply_author, reply_kind)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 RETURNING id, created_at",
                rusqlite::params![
                    room_id,
                    sent_by,
                    body,
                    kind.as_str(),
                    reply_to.map(|r| r.message_id),
                    reply_to.map(|r| r.author.as_str()),
                    reply_to.map(|r| r.kind.as_str()),
                ],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            Ok(MessageRow {
                id,
                room_id: room_id.to_string(),
                sent_by: sent_by.to_string(),
                body: body.to_string(),
                kind: kind.as_str().to_string(),
                reply_message_id: reply_to.map(|r| r.message_id),
                reply_author: reply_to.map(|r| r.author.clone()),
                reply_kind: reply_to.map(|r| r.kind.as_str().to_string()),
                created_at,
            })
        })
    }

    pub fn message_exists(&self, room_id: &str, message_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM messages WHERE room_id = ?1 AND id = ?2",
                    rusqlite::params![room_id, message_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Full log of a room, ordered by the store-assigned id.
    pub fn list_messages(&self, room_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, room_id, sent_by, body, kind,
                        reply_message_id, reply_author, reply_kind, created_at
                 FROM messages
                 WHERE room_id = ?1
                 ORDER BY id ASC",
            )?;

            let rows = stmt
                .query_map([room_id], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        room_id: row.get(1)?,
                        sent_by: row.get(2)?,
                        body: row.get(3)?,
                        kind: row.get(4)?,
                        reply_message_id: row.get(5)?,
                        reply_author: row.get(6)?,
                        reply_kind: row.get(7)?,
                        created_at: row.get(8)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_assignment(conn: &Connection, user_uid: &str) -> Result<Option<AssignmentRow>> {
    let mut stmt = conn.prepare(
        "SELECT user_uid, match_uid, match_approved, chat_room_id, period, updated_at
         FROM match_assignments WHERE user_uid = ?1",
    )?;

    let row = stmt
        .query_row([user_uid], |row| {
            Ok(AssignmentRow {
                user_uid: row.get(0)?,
                match_uid: row.get(1)?,
                match_approved: row.get(2)?,
                chat_room_id: row.get(3)?,
                period: row.get(4)?,
                updated_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn room_for_pairing(
    conn: &Connection,
    user_uid: &str,
    match_uid: &str,
    period: &str,
) -> Result<Option<String>> {
    let room = conn
        .query_row(
            "SELECT chat_room_id FROM match_assignments
             WHERE user_uid = ?1 AND match_uid = ?2 AND period = ?3",
            (user_uid, match_uid, period),
            |row| row.get(0),
        )
        .optional()?;
    Ok(room)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paired_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.assign_match("alice", "bob", "w42").unwrap();
        db.assign_match("bob", "alice", "w42").unwrap();
        db
    }

    #[test]
    fn replaying_the_same_assignment_keeps_approval() {
        let db = paired_db();
        assert!(db.set_match_approved("alice", "bob", "w42").unwrap());
        assert!(!db.assign_match("alice", "bob", "w42").unwrap());
        assert!(db.get_assignment("alice").unwrap().unwrap().match_approved);
    }

    #[test]
    fn new_period_resets_approval_and_room() {
        let db = paired_db();
        db.set_match_approved("alice", "bob", "w42").unwrap();
        db.claim_room("alice", "w42", "bob", "w42", "room-1").unwrap();

        assert!(db.assign_match("alice", "carol", "w43").unwrap());
        let row = db.get_assignment("alice").unwrap().unwrap();
        assert_eq!(row.match_uid, "carol");
        assert!(!row.match_approved);
        assert_eq!(row.chat_room_id, "");
        // Rooms are never deleted
        assert!(db.get_room("room-1").unwrap().is_some());
    }

    #[test]
    fn approval_against_stale_period_is_rejected() {
        let db = paired_db();
        assert!(!db.set_match_approved("alice", "bob", "w41").unwrap());
        assert!(!db.get_assignment("alice").unwrap().unwrap().match_approved);
    }

    #[test]
    fn approval_for_replaced_partner_is_rejected() {
        let db = paired_db();
        db.assign_match("alice", "carol", "w42").unwrap();

        assert!(!db.set_match_approved("alice", "bob", "w42").unwrap());
        assert!(!db.get_assignment("alice").unwrap().unwrap().match_approved);
        assert!(db.set_match_approved("alice", "carol", "w42").unwrap());
    }

    #[test]
    fn second_claim_adopts_first_room() {
        let db = paired_db();
        let first = db.claim_room("alice", "w42", "bob", "w42", "room-a").unwrap();
        let second = db.claim_room("bob", "w42", "alice", "w42", "room-b").unwrap();

        assert_eq!(first, RoomCas::Created("room-a".into()));
        assert_eq!(second, RoomCas::Conflict { current: "room-a".into() });
        assert_eq!(db.get_assignment("alice").unwrap().unwrap().chat_room_id, "room-a");
        assert_eq!(db.get_assignment("bob").unwrap().unwrap().chat_room_id, "room-a");
        assert!(db.get_room("room-b").unwrap().is_none());
    }

    #[test]
    fn claim_against_moved_period_is_stale() {
        let db = paired_db();
        db.assign_match("bob", "carol", "w43").unwrap();
        let outcome = db.claim_room("alice", "w42", "bob", "w42", "room-a").unwrap();
        assert_eq!(outcome, RoomCas::Stale);
        assert_eq!(db.get_assignment("alice").unwrap().unwrap().chat_room_id, "");
    }

    #[test]
    fn claim_after_partner_repaired_in_same_period_is_stale() {
        let db = paired_db();
        db.assign_match("bob", "carol", "w42").unwrap();

        let outcome = db.claim_room("alice", "w42", "bob", "w42", "room-x").unwrap();
        assert_eq!(outcome, RoomCas::Stale);
        assert_eq!(db.get_assignment("alice").unwrap().unwrap().chat_room_id, "");
        assert_eq!(db.get_assignment("bob").unwrap().unwrap().chat_room_id, "");
        assert!(db.get_room("room-x").unwrap().is_none());
    }

    #[test]
    fn messages_come_back_in_id_order_with_reply() {
        let db = paired_db();
        db.claim_room("alice", "w42", "bob", "w42", "room-a").unwrap();

        let first = db.insert_message("room-a", "alice", "hi", MessageKind::Text, None).unwrap();
        let reply = ReplyRef {
            message_id: first.id,
            author: "alice".into(),
            kind: MessageKind::Text,
        };
        let second = db
            .insert_message("room-a", "bob", "hey", MessageKind::Voice, Some(&reply))
            .unwrap();
        assert!(second.id > first.id);

        let log: Vec<_> = db
            .list_messages("room-a")
            .unwrap()
            .into_iter()
            .map(|r| r.into_model())
            .collect();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].body, "hi");
        assert_eq!(log[1].kind, MessageKind::Voice);
        assert_eq!(log[1].reply_to.as_ref(), Some(&reply));
        assert!(db.message_exists("room-a", first.id).unwrap());
        assert!(!db.message_exists("room-b", first.id).unwrap());
    }

    #[test]
    fn message_for_unknown_room_violates_foreign_key() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.insert_message("nope", "alice", "hi", MessageKind::Text, None).is_err());
    }
}
