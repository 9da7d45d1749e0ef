use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id           TEXT PRIMARY KEY,
            alias        TEXT NOT NULL UNIQUE,
            avatar_color TEXT NOT NULL,
            avatar_face  TEXT NOT NULL,
            student_id   TEXT UNIQUE,
            password     TEXT,
            email        TEXT,
            settings     TEXT NOT NULL DEFAULT '{}',
            is_online    INTEGER NOT NULL DEFAULT 0,
            last_seen    TEXT,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS channels (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            description TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS messages (
            id           TEXT PRIMARY KEY,
            channel_id   TEXT NOT NULL REFERENCES channels(id),
            author_id    TEXT NOT NULL REFERENCES users(id),
            content      TEXT NOT NULL,
            is_encrypted INTEGER NOT NULL DEFAULT 0,
            enc_key      BLOB,
            nonce        BLOB,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel_id, created_at);

        CREATE TABLE IF NOT EXISTS direct_messages (
            id           TEXT PRIMARY KEY,
            sender_id    TEXT NOT NULL REFERENCES users(id),
            recipient_id TEXT NOT NULL REFERENCES users(id),
            content      TEXT NOT NULL,
            is_read      INTEGER NOT NULL DEFAULT 0,
            is_encrypted INTEGER NOT NULL DEFAULT 0,
            enc_key      BLOB,
            nonce        BLOB,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_dms_pair
            ON direct_messages(sender_id, recipient_id, created_at);

        CREATE TABLE IF NOT EXISTS posts (
            id         TEXT PRIMARY KEY,
            author_id  TEXT NOT NULL REFERENCES users(id),
            content    TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS comments (
            id         TEXT PRIMARY KEY,
            post_id    TEXT NOT NULL REFERENCES posts(id),
            author_id  TEXT NOT NULL REFERENCES users(id),
            content    TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_comments_post
            ON comments(post_id, created_at);

        -- target_kind + target_id emulate a polymorphic foreign key; there
        -- is no real FK here, so cascade deletes are explicit SQL in the
        -- delete paths.
        CREATE TABLE IF NOT EXISTS reactions (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id),
            target_id   TEXT NOT NULL,
            target_kind TEXT NOT NULL,
            reaction    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(user_id, target_id, target_kind, reaction)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_target
            ON reactions(target_id, target_kind);

        CREATE TABLE IF NOT EXISTS verification_codes (
            code       TEXT NOT NULL,
            student_id TEXT NOT NULL,
            email      TEXT NOT NULL,
            purpose    TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            PRIMARY KEY (student_id, purpose)
        );

        -- Seed channels
        INSERT OR IGNORE INTO channels (id, name, description) VALUES
            ('00000000-0000-0000-0000-000000000001', 'general',
             'Campus-wide chatter'),
            ('00000000-0000-0000-0000-000000000002', 'study-hall',
             'Find study groups and share notes'),
            ('00000000-0000-0000-0000-000000000003', 'confessions',
             'Anonymous campus confessions');
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
