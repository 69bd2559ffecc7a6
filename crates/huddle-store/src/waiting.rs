//! The pool of users waiting for an anonymous group match.

use rusqlite::params;

use huddle_shared::matching::WaitingUser;
use huddle_shared::UserId;

use crate::chats::insert_chat;
use crate::database::{json_column, Database};
use crate::error::{already_exists, Result};
use crate::models::Chat;

impl Database {
    /// Add a user to the pool. Fails with `AlreadyExists` if they are
    /// already waiting.
    pub fn enqueue_waiting(&self, user: &WaitingUser) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO chat_finder (user_id, interests) VALUES (?1, ?2)",
                params![user.id.as_str(), serde_json::to_string(&user.interests)?],
            )
            .map_err(already_exists)?;
        Ok(())
    }

    pub fn is_waiting(&self, user_id: &UserId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM chat_finder WHERE user_id = ?1",
            params![user_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Every waiting user, in arrival order.
    pub fn list_waiting(&self) -> Result<Vec<WaitingUser>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT user_id, interests FROM chat_finder ORDER BY seq ASC")?;

        let rows = stmt.query_map([], |row| {
            Ok(WaitingUser {
                id: UserId(row.get(0)?),
                interests: json_column(row, 1)?,
            })
        })?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Insert a newly formed group chat and take its participants out of
    /// the pool, in one transaction. Returns how many pool rows were
    /// deleted.
    pub fn create_group_chat(&mut self, chat: &Chat) -> Result<usize> {
        let tx = self.conn_mut().transaction()?;
        insert_chat(&tx, chat)?;

        let mut removed = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM chat_finder WHERE user_id = ?1")?;
            for id in &chat.participants {
                removed += stmt.execute(params![id.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }
}
