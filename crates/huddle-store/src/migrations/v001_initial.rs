//! v001 -- Initial schema creation.
//!
//! Creates the four tables the chat server relies on: `users`, `chats`,
//! `pending_messages` and the matching pool `chat_finder`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id        TEXT PRIMARY KEY NOT NULL,
    name      TEXT NOT NULL,
    tag       TEXT NOT NULL,
    interests TEXT NOT NULL DEFAULT '[]'      -- JSON array of strings
);

-- ----------------------------------------------------------------
-- Chats
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    id               TEXT PRIMARY KEY NOT NULL,
    participants     TEXT NOT NULL,            -- JSON array of user ids
    type             TEXT NOT NULL,            -- 'dm' | 'group'
    description      TEXT NOT NULL DEFAULT '',
    common_interests TEXT NOT NULL DEFAULT '[]',
    created_at       TEXT NOT NULL             -- RFC-3339
);

-- ----------------------------------------------------------------
-- Pending messages (one row per user)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS pending_messages (
    user_id           TEXT PRIMARY KEY NOT NULL,
    messages          TEXT NOT NULL DEFAULT '[]',  -- JSON array of frames
    active_anon_chats TEXT NOT NULL DEFAULT '[]',  -- JSON array of chat ids

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Matching pool
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chat_finder (
    seq       INTEGER PRIMARY KEY AUTOINCREMENT, -- arrival order
    user_id   TEXT NOT NULL UNIQUE,
    interests TEXT NOT NULL DEFAULT '[]'
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
