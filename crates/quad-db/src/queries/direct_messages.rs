use anyhow::Result;

use super::OptionalExt;
use crate::models::DirectMessageRow;
use crate::Database;

const DM_COLUMNS: &str = "d.id, d.sender_id,
    COALESCE(u.alias, 'unknown'), COALESCE(u.avatar_color, 'gray'),
    COALESCE(u.avatar_face, 'blank'),
    d.recipient_id, d.content, d.is_read, d.is_encrypted, d.enc_key, d.nonce,
    d.created_at";

impl Database {
    #[allow(clippy::too_many_arguments)]
    pub fn insert_direct_message(
        &self,
        id: &str,
        sender_id: &str,
        recipient_id: &str,
        content: &str,
        is_encrypted: bool,
        enc_key: Option<&[u8]>,
        nonce: Option<&[u8]>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO direct_messages
                    (id, sender_id, recipient_id, content, is_encrypted, enc_key, nonce)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    id,
                    sender_id,
                    recipient_id,
                    content,
                    is_encrypted as i64,
                    enc_key,
                    nonce
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_direct_message(&self, id: &str) -> Result<Option<DirectMessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM direct_messages d
                 LEFT JOIN users u ON d.sender_id = u.id
                 WHERE d.id = ?1",
                DM_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let row = stmt.query_row([id], map_dm).optional()?;
            Ok(row)
        })
    }

    /// Full conversation between two users, chronological. Direction does
    /// not matter: (a, b) and (b, a) return the same rows.
    pub fn conversation(&self, a: &str, b: &str) -> Result<Vec<DirectMessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM direct_messages d
                 LEFT JOIN users u ON d.sender_id = u.id
                 WHERE (d.sender_id = ?1 AND d.recipient_id = ?2)
                    OR (d.sender_id = ?2 AND d.recipient_id = ?1)
                 ORDER BY d.created_at ASC, d.rowid ASC",
                DM_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([a, b], map_dm)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Mark a batch of messages as read, scoped to the requesting recipient.
    /// One atomic UPDATE; ids addressed to someone else are untouched.
    /// Returns the number of rows flipped.
    pub fn mark_read(&self, recipient_id: &str, message_ids: &[String]) -> Result<usize> {
        if message_ids.is_empty() {
            return Ok(0);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (2..=message_ids.len() + 1).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "UPDATE direct_messages SET is_read = 1
                 WHERE recipient_id = ?1 AND is_read = 0 AND id IN ({})",
                placeholders.join(", ")
            );

            let mut params: Vec<&dyn rusqlite::types::ToSql> = vec![&recipient_id];
            params.extend(
                message_ids
                    .iter()
                    .map(|id| id as &dyn rusqlite::types::ToSql),
            );

            let updated = conn.execute(&sql, params.as_slice())?;
            Ok(updated)
        })
    }

    /// Mark everything `sender` has sent to `recipient` as read. Used when
    /// the recipient fetches the conversation.
    pub fn mark_conversation_read(&self, recipient_id: &str, sender_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE direct_messages SET is_read = 1
                 WHERE recipient_id = ?1 AND sender_id = ?2 AND is_read = 0",
                [recipient_id, sender_id],
            )?;
            Ok(updated)
        })
    }
}

fn map_dm(row: &rusqlite::Row<'_>) -> std::result::Result<DirectMessageRow, rusqlite::Error> {
    Ok(DirectMessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        sender_alias: row.get(2)?,
        sender_color: row.get(3)?,
        sender_face: row.get(4)?,
        recipient_id: row.get(5)?,
        content: row.get(6)?,
        is_read: row.get::<_, i64>(7)? != 0,
        is_encrypted: row.get::<_, i64>(8)? != 0,
        enc_key: row.get(9)?,
        nonce: row.get(10)?,
        created_at: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{seed_user, test_db};
    use uuid::Uuid;

    fn seed_dm(db: &crate::Database, from: &str, to: &str, content: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.insert_direct_message(&id, from, to, content, false, None, None)
            .unwrap();
        id
    }

    #[test]
    fn conversation_is_symmetric_and_chronological() {
        let db = test_db();
        let a = seed_user(&db, "EagerEgret1");
        let b = seed_user(&db, "CalmCarp2");
        seed_dm(&db, &a, &b, "hey");
        seed_dm(&db, &b, &a, "hi yourself");

        let ab = db.conversation(&a, &b).unwrap();
        let ba = db.conversation(&b, &a).unwrap();
        assert_eq!(ab.len(), 2);
        assert_eq!(ab[0].content, "hey");
        assert_eq!(ab[1].content, "hi yourself");
        assert_eq!(
            ab.iter().map(|m| m.id.clone()).collect::<Vec<_>>(),
            ba.iter().map(|m| m.id.clone()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn mark_read_only_touches_own_inbox() {
        let db = test_db();
        let a = seed_user(&db, "ShyShrew3");
        let b = seed_user(&db, "LoudLark4");
        let c = seed_user(&db, "TameTern5");

        let to_b = seed_dm(&db, &a, &b, "for b");
        let to_c = seed_dm(&db, &a, &c, "for c");

        // b tries to mark both; only their own message flips
        let ids = vec![to_b.clone(), to_c.clone()];
        let updated = db.mark_read(&b, &ids).unwrap();
        assert_eq!(updated, 1);

        assert!(db.get_direct_message(&to_b).unwrap().unwrap().is_read);
        assert!(!db.get_direct_message(&to_c).unwrap().unwrap().is_read);
    }

    #[test]
    fn mark_read_is_idempotent() {
        let db = test_db();
        let a = seed_user(&db, "VividVole6");
        let b = seed_user(&db, "MutedMule7");
        let id = seed_dm(&db, &a, &b, "once");

        let ids = vec![id];
        assert_eq!(db.mark_read(&b, &ids).unwrap(), 1);
        assert_eq!(db.mark_read(&b, &ids).unwrap(), 0);
    }

    #[test]
    fn fetching_conversation_marks_incoming_read() {
        let db = test_db();
        let a = seed_user(&db, "NobleNewt8");
        let b = seed_user(&db, "HumbleHare9");
        seed_dm(&db, &a, &b, "unread");

        assert_eq!(db.mark_conversation_read(&b, &a).unwrap(), 1);
        let convo = db.conversation(&a, &b).unwrap();
        assert!(convo[0].is_read);
    }
}
