use std::collections::HashMap;

use anyhow::Result;

use quad_types::models::{TargetKind, ToggleOutcome};

use super::{is_unique_violation, OptionalExt};
use crate::Database;

impl Database {
    /// Toggle a reaction: delete it if the identical (user, target, kind,
    /// reaction) row exists, insert it otherwise. Runs in one transaction;
    /// the UNIQUE constraint backstops the check-then-act, so a racing
    /// insert is folded into the Added outcome rather than duplicated or
    /// surfaced as an error.
    pub fn toggle_reaction(
        &self,
        id: &str,
        user_id: &str,
        target_id: &str,
        target_kind: TargetKind,
        reaction: &str,
    ) -> Result<ToggleOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let kind = target_kind.as_str();

            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM reactions
                     WHERE user_id = ?1 AND target_id = ?2 AND target_kind = ?3 AND reaction = ?4",
                    rusqlite::params![user_id, target_id, kind, reaction],
                    |row| row.get(0),
                )
                .optional()?;

            let outcome = if let Some(existing_id) = existing {
                tx.execute("DELETE FROM reactions WHERE id = ?1", [&existing_id])?;
                ToggleOutcome::Removed
            } else {
                let inserted = tx.execute(
                    "INSERT INTO reactions (id, user_id, target_id, target_kind, reaction)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![id, user_id, target_id, kind, reaction],
                );
                match inserted {
                    Ok(_) => ToggleOutcome::Added,
                    Err(e) if is_unique_violation(&e) => ToggleOutcome::Added,
                    Err(e) => return Err(e.into()),
                }
            };

            tx.commit()?;
            Ok(outcome)
        })
    }

    /// Reaction counts per type for one target, recomputed from rows.
    pub fn reaction_counts(
        &self,
        target_id: &str,
        target_kind: TargetKind,
    ) -> Result<HashMap<String, i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT reaction, COUNT(*) FROM reactions
                 WHERE target_id = ?1 AND target_kind = ?2
                 GROUP BY reaction",
            )?;

            let rows = stmt
                .query_map([target_id, target_kind.as_str()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<std::result::Result<HashMap<_, _>, _>>()?;

            Ok(rows)
        })
    }

    /// Batch counts for a page of targets, keyed by target id. One query
    /// instead of one per row when rendering message history.
    pub fn reaction_counts_for_targets(
        &self,
        target_ids: &[String],
        target_kind: TargetKind,
    ) -> Result<HashMap<String, HashMap<String, i64>>> {
        if target_ids.is_empty() {
            return Ok(HashMap::new());
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (2..=target_ids.len() + 1).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT target_id, reaction, COUNT(*) FROM reactions
                 WHERE target_kind = ?1 AND target_id IN ({})
                 GROUP BY target_id, reaction",
                placeholders.join(", ")
            );

            let kind = target_kind.as_str();
            let mut params: Vec<&dyn rusqlite::types::ToSql> = vec![&kind];
            params.extend(
                target_ids
                    .iter()
                    .map(|id| id as &dyn rusqlite::types::ToSql),
            );

            let mut stmt = conn.prepare(&sql)?;
            let mut out: HashMap<String, HashMap<String, i64>> = HashMap::new();
            let rows = stmt.query_map(params.as_slice(), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?;
            for row in rows {
                let (target, reaction, count) = row?;
                out.entry(target).or_default().insert(reaction, count);
            }

            Ok(out)
        })
    }

    /// Does the reaction target actually exist? The polymorphic columns are
    /// not a real foreign key, so existence is checked per kind.
    pub fn target_exists(&self, target_id: &str, target_kind: TargetKind) -> Result<bool> {
        match target_kind {
            TargetKind::Message => Ok(self.get_message(target_id)?.is_some()),
            TargetKind::Post => self.post_exists(target_id),
            TargetKind::Comment => self.comment_exists(target_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::test_util::{seed_message, seed_user, test_db, GENERAL};
    use quad_types::models::{TargetKind, ToggleOutcome};
    use uuid::Uuid;

    #[test]
    fn toggle_is_added_then_removed() {
        let db = test_db();
        let user = seed_user(&db, "RowdyRobin1");
        let msg = seed_message(&db, GENERAL, &user, "react to me");

        let first = db
            .toggle_reaction(&Uuid::new_v4().to_string(), &user, &msg, TargetKind::Message, "heart")
            .unwrap();
        assert_eq!(first, ToggleOutcome::Added);
        assert_eq!(
            db.reaction_counts(&msg, TargetKind::Message).unwrap()["heart"],
            1
        );

        let second = db
            .toggle_reaction(&Uuid::new_v4().to_string(), &user, &msg, TargetKind::Message, "heart")
            .unwrap();
        assert_eq!(second, ToggleOutcome::Removed);
        assert!(db
            .reaction_counts(&msg, TargetKind::Message)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn distinct_types_count_separately() {
        let db = test_db();
        let user = seed_user(&db, "PertPelican2");
        let msg = seed_message(&db, GENERAL, &user, "multi");

        for reaction in ["like", "heart", "like"] {
            db.toggle_reaction(
                &Uuid::new_v4().to_string(),
                &user,
                &msg,
                TargetKind::Message,
                reaction,
            )
            .unwrap();
        }

        // like toggled on then off, heart stays
        let counts = db.reaction_counts(&msg, TargetKind::Message).unwrap();
        assert_eq!(counts.get("like"), None);
        assert_eq!(counts.get("heart"), Some(&1));
    }

    #[test]
    fn concurrent_toggles_never_double_insert() {
        let db = Arc::new(test_db());
        let user = seed_user(&db, "TenseTapir3");
        let msg = seed_message(&db, GENERAL, &user, "contended");

        let mut handles = Vec::new();
        for _ in 0..2 {
            let db = db.clone();
            let user = user.clone();
            let msg = msg.clone();
            handles.push(std::thread::spawn(move || {
                db.toggle_reaction(
                    &Uuid::new_v4().to_string(),
                    &user,
                    &msg,
                    TargetKind::Message,
                    "fire",
                )
                .unwrap()
            }));
        }

        let outcomes: Vec<ToggleOutcome> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        // The two toggles serialize on the connection: one adds, one removes.
        assert!(outcomes.contains(&ToggleOutcome::Added));
        assert!(outcomes.contains(&ToggleOutcome::Removed));
        assert!(db
            .reaction_counts(&msg, TargetKind::Message)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn same_reaction_from_two_users_counts_twice() {
        let db = test_db();
        let a = seed_user(&db, "GladGibbon4");
        let b = seed_user(&db, "SageSloth5");
        let msg = seed_message(&db, GENERAL, &a, "popular");

        for user in [&a, &b] {
            db.toggle_reaction(
                &Uuid::new_v4().to_string(),
                user,
                &msg,
                TargetKind::Message,
                "like",
            )
            .unwrap();
        }

        assert_eq!(
            db.reaction_counts(&msg, TargetKind::Message).unwrap()["like"],
            2
        );
    }
}
