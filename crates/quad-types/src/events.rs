use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{DirectMessageView, MessageView};

/// Events sent from the server to gateway clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Identify accepted; the connection is bound to this user.
    Ready { user_id: Uuid, alias: String },

    /// A user came online.
    UserOnline { user_id: Uuid, alias: String },

    /// A user went offline.
    UserOffline { user_id: Uuid, alias: String },

    /// Someone else joined a channel room.
    UserJoinedChannel {
        user_id: Uuid,
        alias: String,
        channel_id: Uuid,
    },

    /// Someone left a channel room.
    UserLeftChannel {
        user_id: Uuid,
        alias: String,
        channel_id: Uuid,
    },

    /// Ephemeral join/leave notice for channel history readers.
    /// Broadcast-only — never persisted as a message row.
    SystemMessage {
        content: String,
        timestamp: chrono::DateTime<chrono::Utc>,
        channel_id: Uuid,
    },

    /// A new channel message (already persisted).
    NewMessage(MessageView),

    /// A user is typing in a channel. Not sent back to the typist.
    UserTyping {
        user_id: Uuid,
        alias: String,
        channel_id: Uuid,
    },

    /// A new direct message, delivered to the DM room.
    NewDirectMessage(DirectMessageView),

    /// Lightweight badge notice sent to the recipient's private room.
    DmNotification {
        dm_id: Uuid,
        sender_id: Uuid,
        sender_alias: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Updated reaction counts for a message, after a toggle.
    ReactionUpdate {
        message_id: Uuid,
        reactions: HashMap<String, i64>,
        user_id: Uuid,
        action: String,
        reaction_type: String,
    },

    /// Ack for a mark_read command, sent only to the caller.
    MarkReadAck { status: String, marked_read: usize },

    /// Structural/validation failure, reported to the invoking
    /// connection only. Never broadcast.
    Error { message: String },
}

/// Commands sent from clients to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Bind this connection to an identity (JWT from /auth/*).
    Identify { token: String },

    /// Join a channel room.
    Join { channel_id: Uuid },

    /// Leave a channel room.
    Leave { channel_id: Uuid },

    /// Send a message to a channel.
    SendMessage { content: String, channel_id: Uuid },

    /// Typing indicator, ephemeral.
    Typing { channel_id: Uuid },

    /// Send a direct message to another user.
    DirectMessage { content: String, recipient_id: Uuid },

    /// Mark a batch of received direct messages as read.
    MarkRead { message_ids: Vec<Uuid> },

    /// Toggle a reaction on a channel message.
    Reaction {
        message_id: Uuid,
        reaction_type: String,
    },
}
