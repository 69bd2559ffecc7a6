//! CRUD operations for [`User`] records.

use rusqlite::params;

use huddle_shared::UserId;

use crate::database::{json_column, Database};
use crate::error::{not_found, Result};
use crate::models::User;

impl Database {
    /// Insert or replace a user, making sure they have a pending-messages
    /// row to receive offline deliveries.
    pub fn save_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, name, tag, interests)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                tag = excluded.tag,
                interests = excluded.interests",
            params![
                user.id.as_str(),
                user.name,
                user.tag,
                serde_json::to_string(&user.interests)?,
            ],
        )?;
        self.conn().execute(
            "INSERT OR IGNORE INTO pending_messages (user_id) VALUES (?1)",
            params![user.id.as_str()],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: &UserId) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, name, tag, interests FROM users WHERE id = ?1",
                params![id.as_str()],
                row_to_user,
            )
            .map_err(not_found)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        name: row.get(1)?,
        tag: row.get(2)?,
        interests: json_column(row, 3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    fn alice() -> User {
        User {
            id: UserId::from("alice"),
            name: "Alice Liddell".to_string(),
            tag: "quirky_otter.Ab3dE".to_string(),
            interests: ["music".to_string(), "travel".to_string()].into(),
        }
    }

    #[test]
    fn test_save_and_get_user() {
        let db = Database::open_in_memory().unwrap();
        db.save_user(&alice()).unwrap();

        assert_eq!(db.get_user(&UserId::from("alice")).unwrap(), alice());
        assert!(matches!(
            db.get_user(&UserId::from("bob")),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_save_user_updates_in_place() {
        let db = Database::open_in_memory().unwrap();
        db.save_user(&alice()).unwrap();

        let mut renamed = alice();
        renamed.name = "Alice".to_string();
        db.save_user(&renamed).unwrap();

        assert_eq!(db.get_user(&renamed.id).unwrap().name, "Alice");
    }
}
