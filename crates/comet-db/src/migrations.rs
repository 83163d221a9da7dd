use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS profiles (
            uid             TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            handle          TEXT NOT NULL,
            photo_url       TEXT NOT NULL DEFAULT '',
            place_of_birth  TEXT NOT NULL DEFAULT '',
            updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- One row per user, overwritten each assignment period.
        CREATE TABLE IF NOT EXISTS match_assignments (
            user_uid        TEXT PRIMARY KEY,
            match_uid       TEXT NOT NULL DEFAULT '',
            match_approved  INTEGER NOT NULL DEFAULT 0,
            chat_room_id    TEXT NOT NULL DEFAULT '',
            period          TEXT NOT NULL,
            updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS chat_rooms (
            id          TEXT PRIMARY KEY,
            user_a      TEXT NOT NULL,
            user_b      TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- AUTOINCREMENT keeps ids strictly increasing, never reused.
        CREATE TABLE IF NOT EXISTS messages (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            room_id             TEXT NOT NULL REFERENCES chat_rooms(id),
            sent_by             TEXT NOT NULL,
            body                TEXT NOT NULL,
            kind                TEXT NOT NULL DEFAULT 'text',
            reply_message_id    INTEGER,
            reply_author        TEXT,
            reply_kind          TEXT,
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_room
            ON messages(room_id, id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
