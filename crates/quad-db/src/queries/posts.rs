use anyhow::Result;

use super::{DeleteResult, OptionalExt};
use crate::models::{CommentRow, PostRow};
use crate::{clamp_per_page, Database};

impl Database {
    pub fn insert_post(&self, id: &str, author_id: &str, content: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, author_id, content) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, author_id, content],
            )?;
            Ok(())
        })
    }

    /// One page of the feed, newest first. Like/comment counts and whether
    /// `viewer_id` has liked each post are recomputed from rows on every
    /// read; feed pages are small so there is no cached counter to drift.
    pub fn list_posts(
        &self,
        page: u32,
        per_page: u32,
        viewer_id: &str,
    ) -> Result<(Vec<PostRow>, i64)> {
        let per_page = clamp_per_page(per_page);
        let page = page.max(1);
        let offset = (page as i64 - 1) * per_page as i64;

        self.with_conn(|conn| {
            let total: i64 =
                conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM posts p LEFT JOIN users u ON p.author_id = u.id
                 ORDER BY p.created_at DESC, p.rowid DESC
                 LIMIT ?2 OFFSET ?3",
                post_columns()
            ))?;

            let rows = stmt
                .query_map(rusqlite::params![viewer_id, per_page, offset], map_post)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, total))
        })
    }

    pub fn get_post(&self, id: &str, viewer_id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM posts p LEFT JOIN users u ON p.author_id = u.id
                 WHERE p.id = ?2",
                post_columns()
            ))?;
            let row = stmt
                .query_row(rusqlite::params![viewer_id, id], map_post)
                .optional()?;
            Ok(row)
        })
    }

    pub fn post_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row("SELECT 1 FROM posts WHERE id = ?1", [id], |_| Ok(true))
                .optional()?
                .unwrap_or(false))
        })
    }

    /// Delete a post, its comments, and every reaction hanging off either.
    /// Explicit cascade in one transaction — the reactions table has no real
    /// foreign key to cascade through.
    pub fn delete_post(&self, id: &str, requester_id: &str) -> Result<DeleteResult> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let author: Option<String> = tx
                .query_row("SELECT author_id FROM posts WHERE id = ?1", [id], |row| {
                    row.get(0)
                })
                .optional()?;

            let outcome = match author.as_deref() {
                None => DeleteResult::NotFound,
                Some(a) if a != requester_id => DeleteResult::NotOwner,
                Some(_) => {
                    tx.execute(
                        "DELETE FROM reactions WHERE target_kind = 'comment' AND target_id IN
                             (SELECT id FROM comments WHERE post_id = ?1)",
                        [id],
                    )?;
                    tx.execute("DELETE FROM comments WHERE post_id = ?1", [id])?;
                    tx.execute(
                        "DELETE FROM reactions WHERE target_id = ?1 AND target_kind = 'post'",
                        [id],
                    )?;
                    tx.execute("DELETE FROM posts WHERE id = ?1", [id])?;
                    DeleteResult::Deleted
                }
            };

            tx.commit()?;
            Ok(outcome)
        })
    }

    // -- Comments --

    pub fn insert_comment(
        &self,
        id: &str,
        post_id: &str,
        author_id: &str,
        content: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO comments (id, post_id, author_id, content) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, post_id, author_id, content],
            )?;
            Ok(())
        })
    }

    pub fn list_comments(&self, post_id: &str, viewer_id: &str) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM comments c LEFT JOIN users u ON c.author_id = u.id
                 WHERE c.post_id = ?2
                 ORDER BY c.created_at ASC, c.rowid ASC",
                comment_columns()
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![viewer_id, post_id], map_comment)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_comment(&self, id: &str, viewer_id: &str) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM comments c LEFT JOIN users u ON c.author_id = u.id
                 WHERE c.id = ?2",
                comment_columns()
            ))?;
            let row = stmt
                .query_row(rusqlite::params![viewer_id, id], map_comment)
                .optional()?;
            Ok(row)
        })
    }

    pub fn comment_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row("SELECT 1 FROM comments WHERE id = ?1", [id], |_| Ok(true))
                .optional()?
                .unwrap_or(false))
        })
    }

    pub fn delete_comment(&self, id: &str, requester_id: &str) -> Result<DeleteResult> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let author: Option<String> = tx
                .query_row("SELECT author_id FROM comments WHERE id = ?1", [id], |row| {
                    row.get(0)
                })
                .optional()?;

            let outcome = match author.as_deref() {
                None => DeleteResult::NotFound,
                Some(a) if a != requester_id => DeleteResult::NotOwner,
                Some(_) => {
                    tx.execute(
                        "DELETE FROM reactions WHERE target_id = ?1 AND target_kind = 'comment'",
                        [id],
                    )?;
                    tx.execute("DELETE FROM comments WHERE id = ?1", [id])?;
                    DeleteResult::Deleted
                }
            };

            tx.commit()?;
            Ok(outcome)
        })
    }
}

fn post_columns() -> String {
    "p.id, p.author_id,
     COALESCE(u.alias, 'unknown'), COALESCE(u.avatar_color, 'gray'),
     COALESCE(u.avatar_face, 'blank'),
     p.content, p.created_at,
     (SELECT COUNT(*) FROM reactions r
        WHERE r.target_id = p.id AND r.target_kind = 'post' AND r.reaction = 'like'),
     (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id),
     EXISTS(SELECT 1 FROM reactions r
        WHERE r.target_id = p.id AND r.target_kind = 'post'
          AND r.reaction = 'like' AND r.user_id = ?1)"
        .to_string()
}

fn comment_columns() -> String {
    "c.id, c.post_id, c.author_id,
     COALESCE(u.alias, 'unknown'), COALESCE(u.avatar_color, 'gray'),
     COALESCE(u.avatar_face, 'blank'),
     c.content, c.created_at,
     (SELECT COUNT(*) FROM reactions r
        WHERE r.target_id = c.id AND r.target_kind = 'comment' AND r.reaction = 'like'),
     EXISTS(SELECT 1 FROM reactions r
        WHERE r.target_id = c.id AND r.target_kind = 'comment'
          AND r.reaction = 'like' AND r.user_id = ?1)"
        .to_string()
}

fn map_post(row: &rusqlite::Row<'_>) -> std::result::Result<PostRow, rusqlite::Error> {
    Ok(PostRow {
        id: row.get(0)?,
        author_id: row.get(1)?,
        author_alias: row.get(2)?,
        author_color: row.get(3)?,
        author_face: row.get(4)?,
        content: row.get(5)?,
        created_at: row.get(6)?,
        like_count: row.get(7)?,
        comment_count: row.get(8)?,
        user_liked: row.get::<_, i64>(9)? != 0,
    })
}

fn map_comment(row: &rusqlite::Row<'_>) -> std::result::Result<CommentRow, rusqlite::Error> {
    Ok(CommentRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author_id: row.get(2)?,
        author_alias: row.get(3)?,
        author_color: row.get(4)?,
        author_face: row.get(5)?,
        content: row.get(6)?,
        created_at: row.get(7)?,
        like_count: row.get(8)?,
        user_liked: row.get::<_, i64>(9)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{seed_user, test_db};
    use super::super::DeleteResult;
    use quad_types::models::{TargetKind, ToggleOutcome};
    use uuid::Uuid;

    fn seed_post(db: &crate::Database, author: &str, content: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.insert_post(&id, author, content).unwrap();
        id
    }

    #[test]
    fn feed_counts_and_user_liked() {
        let db = test_db();
        let author = seed_user(&db, "WittyWombat1");
        let fan = seed_user(&db, "FondFox2");
        let post = seed_post(&db, &author, "first post");

        let comment_id = Uuid::new_v4().to_string();
        db.insert_comment(&comment_id, &post, &fan, "nice").unwrap();
        assert_eq!(
            db.toggle_reaction(
                &Uuid::new_v4().to_string(),
                &fan,
                &post,
                TargetKind::Post,
                "like"
            )
            .unwrap(),
            ToggleOutcome::Added
        );

        let (posts, total) = db.list_posts(1, 10, &fan).unwrap();
        assert_eq!(total, 1);
        assert_eq!(posts[0].like_count, 1);
        assert_eq!(posts[0].comment_count, 1);
        assert!(posts[0].user_liked);

        let (posts, _) = db.list_posts(1, 10, &author).unwrap();
        assert!(!posts[0].user_liked);
    }

    #[test]
    fn deleting_post_cascades_to_comments_and_reactions() {
        let db = test_db();
        let author = seed_user(&db, "DaringDove3");
        let fan = seed_user(&db, "MerryMarmot4");
        let post = seed_post(&db, &author, "soon gone");

        let comment_id = Uuid::new_v4().to_string();
        db.insert_comment(&comment_id, &post, &fan, "rip").unwrap();
        db.toggle_reaction(
            &Uuid::new_v4().to_string(),
            &fan,
            &post,
            TargetKind::Post,
            "like",
        )
        .unwrap();
        db.toggle_reaction(
            &Uuid::new_v4().to_string(),
            &author,
            &comment_id,
            TargetKind::Comment,
            "like",
        )
        .unwrap();

        assert_eq!(
            db.delete_post(&post, &author).unwrap(),
            DeleteResult::Deleted
        );

        // Zero orphans anywhere
        assert!(!db.post_exists(&post).unwrap());
        assert!(!db.comment_exists(&comment_id).unwrap());
        assert!(db
            .reaction_counts(&post, TargetKind::Post)
            .unwrap()
            .is_empty());
        assert!(db
            .reaction_counts(&comment_id, TargetKind::Comment)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn only_owner_deletes_post() {
        let db = test_db();
        let author = seed_user(&db, "SoberSeal5");
        let other = seed_user(&db, "GiddyGoat6");
        let post = seed_post(&db, &author, "hands off");

        assert_eq!(
            db.delete_post(&post, &other).unwrap(),
            DeleteResult::NotOwner
        );
        assert!(db.post_exists(&post).unwrap());
    }

    #[test]
    fn comment_delete_sweeps_its_reactions() {
        let db = test_db();
        let author = seed_user(&db, "DryDingo7");
        let post = seed_post(&db, &author, "parent");
        let comment_id = Uuid::new_v4().to_string();
        db.insert_comment(&comment_id, &post, &author, "self-reply")
            .unwrap();
        db.toggle_reaction(
            &Uuid::new_v4().to_string(),
            &author,
            &comment_id,
            TargetKind::Comment,
            "like",
        )
        .unwrap();

        assert_eq!(
            db.delete_comment(&comment_id, &author).unwrap(),
            DeleteResult::Deleted
        );
        assert!(db
            .reaction_counts(&comment_id, TargetKind::Comment)
            .unwrap()
            .is_empty());
    }
}
