use anyhow::Result;

use super::{DeleteResult, OptionalExt};
use crate::models::MessageRow;
use crate::{clamp_per_page, Database};

const MESSAGE_COLUMNS: &str = "m.id, m.channel_id, m.author_id,
    COALESCE(u.alias, 'unknown'), COALESCE(u.avatar_color, 'gray'),
    COALESCE(u.avatar_face, 'blank'),
    m.content, m.is_encrypted, m.enc_key, m.nonce, m.created_at";

impl Database {
    #[allow(clippy::too_many_arguments)]
    pub fn insert_message(
        &self,
        id: &str,
        channel_id: &str,
        author_id: &str,
        content: &str,
        is_encrypted: bool,
        enc_key: Option<&[u8]>,
        nonce: Option<&[u8]>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, channel_id, author_id, content, is_encrypted, enc_key, nonce)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![id, channel_id, author_id, content, is_encrypted as i64, enc_key, nonce],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages m LEFT JOIN users u ON m.author_id = u.id
                 WHERE m.id = ?1",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let row = stmt.query_row([id], map_message).optional()?;
            Ok(row)
        })
    }

    /// One page of a channel's history. Retrieval is newest-first (so page 1
    /// is always the most recent slice); the returned items are re-ordered
    /// chronologically for display. Also returns the channel's total message
    /// count.
    pub fn list_messages(
        &self,
        channel_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<MessageRow>, i64)> {
        let per_page = clamp_per_page(per_page);
        let page = page.max(1);
        let offset = (page as i64 - 1) * per_page as i64;

        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE channel_id = ?1",
                [channel_id],
                |row| row.get(0),
            )?;

            let sql = format!(
                "SELECT {} FROM messages m LEFT JOIN users u ON m.author_id = u.id
                 WHERE m.channel_id = ?1
                 ORDER BY m.created_at DESC, m.rowid DESC
                 LIMIT ?2 OFFSET ?3",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map(rusqlite::params![channel_id, per_page, offset], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.reverse();
            Ok((rows, total))
        })
    }

    /// Delete a message and its reactions. Only the author may delete;
    /// the ownership check runs inside the same transaction as the delete.
    pub fn delete_message(&self, id: &str, requester_id: &str) -> Result<DeleteResult> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let author: Option<String> = tx
                .query_row("SELECT author_id FROM messages WHERE id = ?1", [id], |row| {
                    row.get(0)
                })
                .optional()?;

            let outcome = match author.as_deref() {
                None => DeleteResult::NotFound,
                Some(a) if a != requester_id => DeleteResult::NotOwner,
                Some(_) => {
                    // No polymorphic FK exists; cascade is explicit
                    tx.execute(
                        "DELETE FROM reactions WHERE target_id = ?1 AND target_kind = 'message'",
                        [id],
                    )?;
                    tx.execute("DELETE FROM messages WHERE id = ?1", [id])?;
                    DeleteResult::Deleted
                }
            };

            tx.commit()?;
            Ok(outcome)
        })
    }
}

fn map_message(row: &rusqlite::Row<'_>) -> std::result::Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        author_id: row.get(2)?,
        author_alias: row.get(3)?,
        author_color: row.get(4)?,
        author_face: row.get(5)?,
        content: row.get(6)?,
        is_encrypted: row.get::<_, i64>(7)? != 0,
        enc_key: row.get(8)?,
        nonce: row.get(9)?,
        created_at: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{seed_message, seed_user, test_db, GENERAL};
    use super::super::DeleteResult;

    #[test]
    fn page_size_is_clamped() {
        let db = test_db();
        let user = seed_user(&db, "HiddenHeron8");
        for i in 0..120 {
            seed_message(&db, GENERAL, &user, &format!("msg {}", i));
        }

        let (items, total) = db.list_messages(GENERAL, 1, 500).unwrap();
        assert_eq!(items.len(), 100);
        assert_eq!(total, 120);
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let db = test_db();
        let user = seed_user(&db, "MellowMoose4");
        seed_message(&db, GENERAL, &user, "only one");

        let (items, total) = db.list_messages(GENERAL, 9, 50).unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 1);
    }

    #[test]
    fn items_come_back_chronological() {
        let db = test_db();
        let user = seed_user(&db, "SwiftSwan6");
        seed_message(&db, GENERAL, &user, "first");
        seed_message(&db, GENERAL, &user, "second");
        seed_message(&db, GENERAL, &user, "third");

        let (items, _) = db.list_messages(GENERAL, 1, 50).unwrap();
        let contents: Vec<&str> = items.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn only_author_can_delete() {
        let db = test_db();
        let author = seed_user(&db, "KindKoala1");
        let other = seed_user(&db, "SlyStork2");
        let msg = seed_message(&db, GENERAL, &author, "mine");

        assert_eq!(
            db.delete_message(&msg, &other).unwrap(),
            DeleteResult::NotOwner
        );
        assert!(db.get_message(&msg).unwrap().is_some());

        assert_eq!(
            db.delete_message(&msg, &author).unwrap(),
            DeleteResult::Deleted
        );
        assert!(db.get_message(&msg).unwrap().is_none());
    }

    #[test]
    fn deleting_missing_message_is_not_found() {
        let db = test_db();
        let user = seed_user(&db, "PlainPuffin3");
        assert_eq!(
            db.delete_message("no-such-id", &user).unwrap(),
            DeleteResult::NotFound
        );
    }
}
