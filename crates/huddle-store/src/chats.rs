//! CRUD operations for [`Chat`] records.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use huddle_shared::{ChatId, ChatKind};

use crate::database::{json_column, Database};
use crate::error::{not_found, Result};
use crate::models::Chat;

impl Database {
    pub fn create_chat(&self, chat: &Chat) -> Result<()> {
        insert_chat(self.conn(), chat)
    }

    pub fn get_chat(&self, id: &ChatId) -> Result<Chat> {
        self.conn()
            .query_row(
                "SELECT id, participants, type, description, common_interests, created_at
                 FROM chats WHERE id = ?1",
                params![id.as_str()],
                row_to_chat,
            )
            .map_err(not_found)
    }
}

/// Insert a chat row. Takes a plain connection so it can run inside a
/// transaction.
pub(crate) fn insert_chat(conn: &Connection, chat: &Chat) -> Result<()> {
    conn.execute(
        "INSERT INTO chats (id, participants, type, description, common_interests, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            chat.id.as_str(),
            serde_json::to_string(&chat.participants)?,
            chat.kind.as_str(),
            chat.description,
            serde_json::to_string(&chat.common_interests)?,
            chat.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    let kind_str: String = row.get(2)?;
    let ts_str: String = row.get(5)?;

    let kind = ChatKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown chat type '{kind_str}'").into(),
        )
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Chat {
        id: ChatId(row.get(0)?),
        participants: json_column(row, 1)?,
        kind,
        description: row.get(3)?,
        common_interests: json_column(row, 4)?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use huddle_shared::UserId;

    #[test]
    fn test_create_and_get_group_chat() {
        let db = Database::open_in_memory().unwrap();
        let chat = Chat::group(
            ["a", "b", "c"].map(UserId::from),
            ["chess".to_string()].into(),
            "At The Bar",
        );
        db.create_chat(&chat).unwrap();

        let loaded = db.get_chat(&chat.id).unwrap();
        assert_eq!(loaded.participants, chat.participants);
        assert_eq!(loaded.kind, ChatKind::Group);
        assert_eq!(loaded.common_interests, chat.common_interests);
        assert_eq!(loaded.created_at.timestamp(), chat.created_at.timestamp());
    }

    #[test]
    fn test_missing_chat() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.get_chat(&ChatId::from("nope")),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_direct_chat_dedups_participants() {
        let chat = Chat::new(
            ChatKind::Direct,
            ["a", "b", "a"].map(UserId::from),
            "",
        );
        assert_eq!(chat.participants, ["a", "b"].map(UserId::from));
    }
}
