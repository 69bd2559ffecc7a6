//! Per-user pending-message records.

use rusqlite::params;

use huddle_shared::UserId;

use crate::database::{json_column, Database};
use crate::error::{not_found, Result};
use crate::models::PendingMessages;

impl Database {
    pub fn get_pending(&self, user_id: &UserId) -> Result<PendingMessages> {
        self.conn()
            .query_row(
                "SELECT user_id, messages, active_anon_chats
                 FROM pending_messages WHERE user_id = ?1",
                params![user_id.as_str()],
                |row| {
                    Ok(PendingMessages {
                        user_id: UserId(row.get(0)?),
                        messages: json_column(row, 1)?,
                        active_anon_chats: json_column(row, 2)?,
                    })
                },
            )
            .map_err(not_found)
    }

    /// Replace the whole record in a single statement.
    pub fn save_pending(&self, record: &PendingMessages) -> Result<()> {
        self.conn().execute(
            "INSERT INTO pending_messages (user_id, messages, active_anon_chats)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                messages = excluded.messages,
                active_anon_chats = excluded.active_anon_chats",
            params![
                record.user_id.as_str(),
                serde_json::to_string(&record.messages)?,
                serde_json::to_string(&record.active_anon_chats)?,
            ],
        )?;
        Ok(())
    }
}
