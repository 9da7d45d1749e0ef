use anyhow::Result;
use rusqlite::Connection;

use super::{is_unique_violation, OptionalExt};
use crate::models::UserRow;
use crate::Database;

/// Outcome of a user insert. Alias collisions are reported rather than
/// failing so the caller can retry with a fresh alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserInsert {
    Created,
    AliasTaken,
    StudentIdTaken,
}

impl Database {
    #[allow(clippy::too_many_arguments)]
    pub fn create_user(
        &self,
        id: &str,
        alias: &str,
        avatar_color: &str,
        avatar_face: &str,
        student_id: Option<&str>,
        password_hash: Option<&str>,
        email: Option<&str>,
    ) -> Result<UserInsert> {
        self.with_conn(|conn| {
            let result = conn.execute(
                "INSERT INTO users (id, alias, avatar_color, avatar_face, student_id, password, email)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![id, alias, avatar_color, avatar_face, student_id, password_hash, email],
            );

            match result {
                Ok(_) => Ok(UserInsert::Created),
                Err(e) if is_unique_violation(&e) => {
                    // Disambiguate which UNIQUE column tripped
                    let alias_taken: bool = conn
                        .query_row("SELECT 1 FROM users WHERE alias = ?1", [alias], |_| Ok(true))
                        .optional()?
                        .unwrap_or(false);
                    if alias_taken {
                        Ok(UserInsert::AliasTaken)
                    } else {
                        Ok(UserInsert::StudentIdTaken)
                    }
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_user_by_student_id(&self, student_id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "student_id", student_id))
    }

    pub fn user_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row("SELECT 1 FROM users WHERE id = ?1", [id], |_| Ok(true))
                .optional()?
                .unwrap_or(false))
        })
    }

    /// Flip the presence flag and stamp last_seen. Last-write-wins is fine:
    /// presence is advisory.
    pub fn set_online(&self, id: &str, online: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET is_online = ?1, last_seen = datetime('now') WHERE id = ?2",
                rusqlite::params![online as i64, id],
            )?;
            Ok(())
        })
    }

    pub fn get_settings(&self, id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT settings FROM users WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()
        })
    }

    pub fn set_settings(&self, id: &str, settings_json: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET settings = ?1 WHERE id = ?2",
                rusqlite::params![settings_json, id],
            )?;
            Ok(())
        })
    }

    pub fn update_avatar(
        &self,
        id: &str,
        color: Option<&str>,
        face: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            if let Some(color) = color {
                conn.execute(
                    "UPDATE users SET avatar_color = ?1 WHERE id = ?2",
                    rusqlite::params![color, id],
                )?;
            }
            if let Some(face) = face {
                conn.execute(
                    "UPDATE users SET avatar_face = ?1 WHERE id = ?2",
                    rusqlite::params![face, id],
                )?;
            }
            Ok(())
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is a compile-time constant from the callers above, never input
    let sql = format!(
        "SELECT id, alias, avatar_color, avatar_face, student_id, password, email,
                settings, is_online, last_seen, created_at
         FROM users WHERE {} = ?1",
        column
    );

    let mut stmt = conn.prepare(&sql)?;
    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                alias: row.get(1)?,
                avatar_color: row.get(2)?,
                avatar_face: row.get(3)?,
                student_id: row.get(4)?,
                password: row.get(5)?,
                email: row.get(6)?,
                settings: row.get(7)?,
                is_online: row.get::<_, i64>(8)? != 0,
                last_seen: row.get(9)?,
                created_at: row.get(10)?,
            })
        })
        .optional()?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{seed_user, test_db};
    use super::UserInsert;

    #[test]
    fn alias_collision_reported_not_fatal() {
        let db = test_db();
        seed_user(&db, "SilentOtter42");

        let outcome = db
            .create_user("another-id", "SilentOtter42", "red", "wink", None, None, None)
            .unwrap();
        assert_eq!(outcome, UserInsert::AliasTaken);
    }

    #[test]
    fn duplicate_student_id_reported() {
        let db = test_db();
        db.create_user("u1", "BoldBadger7", "red", "calm", Some("s123"), Some("h"), None)
            .unwrap();

        let outcome = db
            .create_user("u2", "WiseWren9", "blue", "calm", Some("s123"), Some("h"), None)
            .unwrap();
        assert_eq!(outcome, UserInsert::StudentIdTaken);
    }

    #[test]
    fn presence_flip_updates_last_seen() {
        let db = test_db();
        let id = seed_user(&db, "QuietQuokka1");

        db.set_online(&id, true).unwrap();
        let user = db.get_user(&id).unwrap().unwrap();
        assert!(user.is_online);
        assert!(user.last_seen.is_some());

        db.set_online(&id, false).unwrap();
        assert!(!db.get_user(&id).unwrap().unwrap().is_online);
    }

    #[test]
    fn settings_roundtrip() {
        let db = test_db();
        let id = seed_user(&db, "GentleGull3");

        db.set_settings(&id, r#"{"theme":"dark"}"#).unwrap();
        assert_eq!(
            db.get_settings(&id).unwrap().unwrap(),
            r#"{"theme":"dark"}"#
        );
    }
}
