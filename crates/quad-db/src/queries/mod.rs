pub mod channels;
pub mod direct_messages;
pub mod messages;
pub mod posts;
pub mod reactions;
pub mod users;
pub mod verification;

use anyhow::Result;

/// Outcome of an owner-scoped delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteResult {
    Deleted,
    NotOwner,
    NotFound,
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// True when an error is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
pub(crate) mod test_util {
    use crate::Database;
    use uuid::Uuid;

    pub const GENERAL: &str = "00000000-0000-0000-0000-000000000001";

    pub fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    pub fn seed_user(db: &Database, alias: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_user(&id, alias, "blue", "happy", None, None, None)
            .unwrap();
        id
    }

    pub fn seed_message(db: &Database, channel_id: &str, author_id: &str, content: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.insert_message(&id, channel_id, author_id, content, false, None, None)
            .unwrap();
        id
    }
}
