//! Gateway command handlers: validate, sanitize, encrypt, persist, then
//! broadcast. Persistence always happens before any broadcast, so a failed
//! write is reported to the sender alone and nothing partial ever reaches
//! the room.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use quad_db::Database;
use quad_types::events::{GatewayCommand, GatewayEvent};
use quad_types::models::{Author, DirectMessageView, MessageView, TargetKind};

use crate::dispatcher::RoomKey;
use crate::sanitize::sanitize_text;
use crate::views;
use crate::GatewayContext;

/// Upper bound on any single persistence call issued from a connection
/// handler. A stuck write surfaces as a transient error instead of
/// starving the rest of the room.
const DB_TIMEOUT: Duration = Duration::from_secs(5);

/// The identity bound to a connection after Identify.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub id: Uuid,
    pub alias: String,
}

/// Run a blocking database closure off the async runtime, bounded by
/// [`DB_TIMEOUT`].
pub(crate) async fn run_db<T, F>(db: &Arc<Database>, f: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
{
    let db = db.clone();
    let task = tokio::task::spawn_blocking(move || f(&db));

    match tokio::time::timeout(DB_TIMEOUT, task).await {
        Err(_) => {
            warn!("Database call timed out after {:?}", DB_TIMEOUT);
            Err("Storage timed out, try again".into())
        }
        Ok(Err(e)) => {
            warn!("Database task panicked: {}", e);
            Err("Storage failed, try again".into())
        }
        Ok(Ok(result)) => result.map_err(|e| {
            warn!("Database error: {}", e);
            "Storage failed, try again".to_string()
        }),
    }
}

/// Dispatch one client command. Failures are sent back to the invoking
/// connection as an `error` event and never broadcast.
pub async fn handle_command(
    ctx: &GatewayContext,
    conn_id: Uuid,
    user: &SessionUser,
    cmd: GatewayCommand,
) {
    let result = match cmd {
        GatewayCommand::Identify { .. } => Ok(()), // already bound
        GatewayCommand::Join { channel_id } => join(ctx, conn_id, user, channel_id).await,
        GatewayCommand::Leave { channel_id } => leave(ctx, conn_id, user, channel_id).await,
        GatewayCommand::SendMessage { content, channel_id } => {
            send_message(ctx, user, channel_id, content).await
        }
        GatewayCommand::Typing { channel_id } => typing(ctx, conn_id, user, channel_id).await,
        GatewayCommand::DirectMessage { content, recipient_id } => {
            direct_message(ctx, user, recipient_id, content).await
        }
        GatewayCommand::MarkRead { message_ids } => {
            mark_read(ctx, conn_id, user, message_ids).await
        }
        GatewayCommand::Reaction { message_id, reaction_type } => {
            reaction(ctx, conn_id, user, message_id, reaction_type).await
        }
    };

    if let Err(message) = result {
        debug!("{} ({}) command failed: {}", user.alias, user.id, message);
        ctx.dispatcher
            .send_to_conn(conn_id, GatewayEvent::Error { message })
            .await;
    }
}

async fn join(
    ctx: &GatewayContext,
    conn_id: Uuid,
    user: &SessionUser,
    channel_id: Uuid,
) -> Result<(), String> {
    let cid = channel_id.to_string();
    let channel = run_db(&ctx.db, move |db| db.get_channel(&cid))
        .await?
        .ok_or("Channel not found")?;

    let room = RoomKey::Channel(channel_id);
    ctx.dispatcher.join(conn_id, room).await;

    ctx.dispatcher
        .send_to_room(
            room,
            GatewayEvent::UserJoinedChannel {
                user_id: user.id,
                alias: user.alias.clone(),
                channel_id,
            },
            Some(conn_id),
        )
        .await;

    // Ephemeral join notice; intentionally not persisted as a message row
    ctx.dispatcher
        .send_to_room(
            room,
            GatewayEvent::SystemMessage {
                content: format!("{} has joined #{}", user.alias, channel.name),
                timestamp: Utc::now(),
                channel_id,
            },
            None,
        )
        .await;

    Ok(())
}

async fn leave(
    ctx: &GatewayContext,
    conn_id: Uuid,
    user: &SessionUser,
    channel_id: Uuid,
) -> Result<(), String> {
    let room = RoomKey::Channel(channel_id);
    ctx.dispatcher.leave(conn_id, room).await;

    let cid = channel_id.to_string();
    let Some(channel) = run_db(&ctx.db, move |db| db.get_channel(&cid)).await? else {
        // Leaving an unknown room is a quiet no-op
        return Ok(());
    };

    ctx.dispatcher
        .send_to_room(
            room,
            GatewayEvent::UserLeftChannel {
                user_id: user.id,
                alias: user.alias.clone(),
                channel_id,
            },
            Some(conn_id),
        )
        .await;

    ctx.dispatcher
        .send_to_room(
            room,
            GatewayEvent::SystemMessage {
                content: format!("{} has left #{}", user.alias, channel.name),
                timestamp: Utc::now(),
                channel_id,
            },
            None,
        )
        .await;

    Ok(())
}

async fn send_message(
    ctx: &GatewayContext,
    user: &SessionUser,
    channel_id: Uuid,
    content: String,
) -> Result<(), String> {
    let content = sanitize_text(content.trim());
    if content.is_empty() {
        return Err("Message content required".into());
    }

    let cid = channel_id.to_string();
    if !run_db(&ctx.db, move |db| db.channel_exists(&cid)).await? {
        return Err("Channel not found".into());
    }

    let uid = user.id.to_string();
    let author_row = run_db(&ctx.db, move |db| db.get_user(&uid))
        .await?
        .ok_or("Authentication required")?;

    let sealed = ctx
        .cipher
        .seal(&content)
        .map_err(|e| format!("Encryption failed: {}", e))?;

    let message_id = Uuid::new_v4();
    let stored = if sealed.is_encrypted() {
        B64.encode(&sealed.content)
    } else {
        content.clone()
    };

    {
        let mid = message_id.to_string();
        let cid = channel_id.to_string();
        let uid = user.id.to_string();
        let is_encrypted = sealed.is_encrypted();
        let key = sealed.key.map(|k| k.to_vec());
        let nonce = sealed.nonce.map(|n| n.to_vec());
        run_db(&ctx.db, move |db| {
            db.insert_message(
                &mid,
                &cid,
                &uid,
                &stored,
                is_encrypted,
                key.as_deref(),
                nonce.as_deref(),
            )
        })
        .await?;
    }

    // Broadcast carries the original plaintext; the stored row keeps the
    // ciphertext. Persist happened above, so history readers will see the
    // same message.
    let view = MessageView {
        id: message_id,
        content,
        timestamp: Utc::now(),
        author: author_from_row(&author_row),
        channel_id,
        is_encrypted: sealed.is_encrypted(),
        reactions: HashMap::new(),
        encryption: views::envelope(&sealed),
    };

    ctx.dispatcher
        .send_to_room(
            RoomKey::Channel(channel_id),
            GatewayEvent::NewMessage(view),
            None,
        )
        .await;

    Ok(())
}

async fn typing(
    ctx: &GatewayContext,
    conn_id: Uuid,
    user: &SessionUser,
    channel_id: Uuid,
) -> Result<(), String> {
    ctx.dispatcher
        .send_to_room(
            RoomKey::Channel(channel_id),
            GatewayEvent::UserTyping {
                user_id: user.id,
                alias: user.alias.clone(),
                channel_id,
            },
            Some(conn_id),
        )
        .await;
    Ok(())
}

async fn direct_message(
    ctx: &GatewayContext,
    user: &SessionUser,
    recipient_id: Uuid,
    content: String,
) -> Result<(), String> {
    let content = sanitize_text(content.trim());
    if content.is_empty() {
        return Err("Message content required".into());
    }

    let rid = recipient_id.to_string();
    if run_db(&ctx.db, move |db| db.get_user(&rid)).await?.is_none() {
        return Err("Recipient not found".into());
    }

    let uid = user.id.to_string();
    let sender_row = run_db(&ctx.db, move |db| db.get_user(&uid))
        .await?
        .ok_or("Authentication required")?;

    let sealed = ctx
        .cipher
        .seal(&content)
        .map_err(|e| format!("Encryption failed: {}", e))?;

    let dm_id = Uuid::new_v4();
    let stored = if sealed.is_encrypted() {
        B64.encode(&sealed.content)
    } else {
        content.clone()
    };

    {
        let id = dm_id.to_string();
        let sid = user.id.to_string();
        let rid = recipient_id.to_string();
        let is_encrypted = sealed.is_encrypted();
        let key = sealed.key.map(|k| k.to_vec());
        let nonce = sealed.nonce.map(|n| n.to_vec());
        run_db(&ctx.db, move |db| {
            db.insert_direct_message(
                &id,
                &sid,
                &rid,
                &stored,
                is_encrypted,
                key.as_deref(),
                nonce.as_deref(),
            )
        })
        .await?;
    }

    // Both ends land in the same room regardless of who sent first
    let room = RoomKey::dm(user.id, recipient_id);
    ctx.dispatcher.merge_room(RoomKey::User(user.id), room).await;
    ctx.dispatcher
        .merge_room(RoomKey::User(recipient_id), room)
        .await;

    let timestamp = Utc::now();
    let view = DirectMessageView {
        id: dm_id,
        content,
        timestamp,
        sender: author_from_row(&sender_row),
        recipient_id,
        is_read: false,
        is_encrypted: sealed.is_encrypted(),
        encryption: views::envelope(&sealed),
    };

    ctx.dispatcher
        .send_to_room(room, GatewayEvent::NewDirectMessage(view), None)
        .await;

    // Badge notice, distinct from the full broadcast, only if they're here
    if ctx.dispatcher.is_online(recipient_id).await {
        ctx.dispatcher
            .send_to_room(
                RoomKey::User(recipient_id),
                GatewayEvent::DmNotification {
                    dm_id,
                    sender_id: user.id,
                    sender_alias: user.alias.clone(),
                    timestamp,
                },
                None,
            )
            .await;
    }

    Ok(())
}

async fn mark_read(
    ctx: &GatewayContext,
    conn_id: Uuid,
    user: &SessionUser,
    message_ids: Vec<Uuid>,
) -> Result<(), String> {
    let ids: Vec<String> = message_ids.iter().map(|id| id.to_string()).collect();
    let uid = user.id.to_string();
    let marked = run_db(&ctx.db, move |db| db.mark_read(&uid, &ids)).await?;

    ctx.dispatcher
        .send_to_conn(
            conn_id,
            GatewayEvent::MarkReadAck {
                status: "success".into(),
                marked_read: marked,
            },
        )
        .await;

    Ok(())
}

async fn reaction(
    ctx: &GatewayContext,
    conn_id: Uuid,
    user: &SessionUser,
    message_id: Uuid,
    reaction_type: String,
) -> Result<(), String> {
    if reaction_type.trim().is_empty() {
        return Err("Reaction type required".into());
    }

    let mid = message_id.to_string();
    let message = run_db(&ctx.db, move |db| db.get_message(&mid))
        .await?
        .ok_or("Message not found")?;

    let outcome = {
        let id = Uuid::new_v4().to_string();
        let uid = user.id.to_string();
        let mid = message_id.to_string();
        let rtype = reaction_type.clone();
        run_db(&ctx.db, move |db| {
            db.toggle_reaction(&id, &uid, &mid, TargetKind::Message, &rtype)
        })
        .await?
    };

    let counts = {
        let mid = message_id.to_string();
        run_db(&ctx.db, move |db| {
            db.reaction_counts(&mid, TargetKind::Message)
        })
        .await?
    };

    let channel_id = views::parse_uuid(&message.channel_id, "channel id");
    let update = GatewayEvent::ReactionUpdate {
        message_id,
        reactions: counts,
        user_id: user.id,
        action: outcome.as_str().to_string(),
        reaction_type,
    };

    ctx.dispatcher
        .send_to_room(RoomKey::Channel(channel_id), update.clone(), Some(conn_id))
        .await;

    // The caller always hears back, joined to the channel room or not
    ctx.dispatcher.send_to_conn(conn_id, update).await;

    Ok(())
}

fn author_from_row(row: &quad_db::models::UserRow) -> Author {
    Author {
        id: views::parse_uuid(&row.id, "user id"),
        alias: row.alias.clone(),
        avatar_color: row.avatar_color.clone(),
        avatar_face: row.avatar_face.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use quad_crypto::MessageCipher;

    const GENERAL: &str = "00000000-0000-0000-0000-000000000001";

    fn test_ctx() -> GatewayContext {
        GatewayContext {
            db: Arc::new(Database::open_in_memory().unwrap()),
            dispatcher: crate::dispatcher::Dispatcher::new(),
            cipher: MessageCipher::new(false),
            jwt_secret: "test-secret".into(),
        }
    }

    fn seed_user(ctx: &GatewayContext, alias: &str) -> SessionUser {
        let id = Uuid::new_v4();
        ctx.db
            .create_user(&id.to_string(), alias, "blue", "blue", None, None, None)
            .unwrap();
        SessionUser {
            id,
            alias: alias.into(),
        }
    }

    #[tokio::test]
    async fn sent_message_lands_in_the_db_and_reaches_every_member_once() {
        let ctx = test_ctx();
        let user = seed_user(&ctx, "QuietFox1");
        let channel_id = Uuid::parse_str(GENERAL).unwrap();
        let room = RoomKey::Channel(channel_id);

        let (conn_a, mut rx_a) = ctx.dispatcher.register().await;
        let (conn_b, mut rx_b) = ctx.dispatcher.register().await;
        ctx.dispatcher.join(conn_a, room).await;
        ctx.dispatcher.join(conn_b, room).await;

        send_message(&ctx, &user, channel_id, "hello room".into())
            .await
            .unwrap();

        let (rows, total) = ctx.db.list_messages(GENERAL, 1, 50).unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].content, "hello room");

        for rx in [&mut rx_a, &mut rx_b] {
            match rx.try_recv().unwrap() {
                GatewayEvent::NewMessage(view) => {
                    assert_eq!(view.content, "hello room");
                    assert_eq!(view.channel_id, channel_id);
                    assert_eq!(view.author.alias, "QuietFox1");
                }
                other => panic!("expected new_message, got {:?}", other),
            }
            assert!(rx.try_recv().is_err(), "member received more than one event");
        }
    }

    #[tokio::test]
    async fn failed_send_persists_nothing_and_broadcasts_nothing() {
        let ctx = test_ctx();
        let user = seed_user(&ctx, "QuietFox1");
        let channel_id = Uuid::parse_str(GENERAL).unwrap();
        let room = RoomKey::Channel(channel_id);

        let (conn, mut rx) = ctx.dispatcher.register().await;
        ctx.dispatcher.join(conn, room).await;

        let result = send_message(&ctx, &user, Uuid::new_v4(), "into the void".into()).await;
        assert_eq!(result, Err("Channel not found".to_string()));

        let (_, total) = ctx.db.list_messages(GENERAL, 1, 50).unwrap();
        assert_eq!(total, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn reaction_reaches_the_caller_even_outside_the_room() {
        let ctx = test_ctx();
        let user = seed_user(&ctx, "QuietFox1");
        let channel_id = Uuid::parse_str(GENERAL).unwrap();

        let message_id = Uuid::new_v4();
        ctx.db
            .insert_message(
                &message_id.to_string(),
                GENERAL,
                &user.id.to_string(),
                "react to me",
                false,
                None,
                None,
            )
            .unwrap();

        let (member, mut member_rx) = ctx.dispatcher.register().await;
        ctx.dispatcher.join(member, RoomKey::Channel(channel_id)).await;

        // The reacting connection never joined the channel room
        let (caller, mut caller_rx) = ctx.dispatcher.register().await;

        reaction(&ctx, caller, &user, message_id, "heart".into())
            .await
            .unwrap();

        for rx in [&mut caller_rx, &mut member_rx] {
            match rx.try_recv().unwrap() {
                GatewayEvent::ReactionUpdate {
                    message_id: mid,
                    action,
                    reaction_type,
                    ..
                } => {
                    assert_eq!(mid, message_id);
                    assert_eq!(action, "added");
                    assert_eq!(reaction_type, "heart");
                }
                other => panic!("expected reaction_update, got {:?}", other),
            }
            assert!(rx.try_recv().is_err());
        }
    }
}
