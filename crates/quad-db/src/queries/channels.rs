use anyhow::Result;

use super::OptionalExt;
use crate::models::{ChannelRow, ChannelSummary};
use crate::Database;

/// Compact view of a user who has recently posted in a channel.
pub struct ActiveUser {
    pub id: String,
    pub alias: String,
    pub avatar_color: String,
    pub is_online: bool,
}

impl Database {
    /// All channels, most recently active first. A channel with no messages
    /// falls back to its creation time.
    pub fn list_channels(&self) -> Result<Vec<ChannelSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name, c.description, c.created_at,
                        COALESCE(MAX(m.created_at), c.created_at) AS last_activity
                 FROM channels c
                 LEFT JOIN messages m ON m.channel_id = c.id
                 GROUP BY c.id
                 ORDER BY last_activity DESC",
            )?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(ChannelSummary {
                        row: ChannelRow {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            description: row.get(2)?,
                            created_at: row.get(3)?,
                        },
                        last_activity: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn get_channel(&self, id: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, name, description, created_at FROM channels WHERE id = ?1")?;
            let row = stmt
                .query_row([id], |row| {
                    Ok(ChannelRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    pub fn channel_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row("SELECT 1 FROM channels WHERE id = ?1", [id], |_| Ok(true))
                .optional()?
                .unwrap_or(false))
        })
    }

    pub fn channel_message_count(&self, id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE channel_id = ?1",
                [id],
                |row| row.get(0),
            )?)
        })
    }

    /// Users who have posted in the channel, a small sample for the detail
    /// view.
    pub fn channel_active_users(&self, id: &str, limit: u32) -> Result<Vec<ActiveUser>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT u.id, u.alias, u.avatar_color, u.is_online
                 FROM users u
                 JOIN messages m ON m.author_id = u.id
                 WHERE m.channel_id = ?1
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![id, limit], |row| {
                    Ok(ActiveUser {
                        id: row.get(0)?,
                        alias: row.get(1)?,
                        avatar_color: row.get(2)?,
                        is_online: row.get::<_, i64>(3)? != 0,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{seed_message, seed_user, test_db, GENERAL};

    #[test]
    fn channels_sorted_by_last_activity() {
        let db = test_db();
        let user = seed_user(&db, "CleverCrane5");

        // Seeded channels share a creation instant; a message should float
        // its channel to the top.
        let quiet = "00000000-0000-0000-0000-000000000002";
        seed_message(&db, quiet, &user, "bump");

        let channels = db.list_channels().unwrap();
        assert_eq!(channels[0].row.id, quiet);
        assert_eq!(channels.len(), 3);
    }

    #[test]
    fn detail_counts_messages() {
        let db = test_db();
        let user = seed_user(&db, "BraveBison2");
        seed_message(&db, GENERAL, &user, "one");
        seed_message(&db, GENERAL, &user, "two");

        assert_eq!(db.channel_message_count(GENERAL).unwrap(), 2);
        let active = db.channel_active_users(GENERAL, 10).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].alias, "BraveBison2");
    }
}
