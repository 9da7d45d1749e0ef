use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use quad_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::RoomKey;
use crate::handlers::{self, SessionUser};
use crate::GatewayContext;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a freshly upgraded socket gets to send Identify.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a single WebSocket connection: Identify handshake, Ready, then
/// the send/recv event loop until either side drops.
pub async fn handle_connection(socket: WebSocket, ctx: GatewayContext) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for Identify command with JWT
    let user = match wait_for_identify(&mut receiver, &ctx.jwt_secret).await {
        Some(user) => user,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", user.alias, user.id);

    // Step 2: Send Ready event
    let ready = GatewayEvent::Ready {
        user_id: user.id,
        alias: user.alias.clone(),
    };
    let Ok(ready_json) = serde_json::to_string(&ready) else {
        return;
    };
    if sender.send(Message::Text(ready_json.into())).await.is_err() {
        return;
    }

    // Step 3: Register with the dispatcher. Every connection sits in its
    // user's private room so DM notifications can find it.
    let (conn_id, mut rx) = ctx.dispatcher.register().await;
    ctx.dispatcher.join(conn_id, RoomKey::User(user.id)).await;

    // Replay who's already online so the new client starts from a full roster
    for (uid, alias) in ctx.dispatcher.online_users().await {
        let event = GatewayEvent::UserOnline {
            user_id: uid,
            alias,
        };
        let Ok(json) = serde_json::to_string(&event) else {
            continue;
        };
        if sender.send(Message::Text(json.into())).await.is_err() {
            ctx.dispatcher.unregister(conn_id).await;
            return;
        }
    }

    // Presence flips only on the user's first connection
    if ctx.dispatcher.user_connected(user.id, &user.alias).await {
        set_online(&ctx, user.id, true).await;
        ctx.dispatcher
            .broadcast_all(GatewayEvent::UserOnline {
                user_id: user.id,
                alias: user.alias.clone(),
            })
            .await;
    }

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward dispatcher events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    let Ok(json) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!(
                                "Heartbeat timeout (missed {} pongs), dropping connection",
                                missed_heartbeats
                            );
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_ctx = ctx.clone();
    let recv_user = user.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    match serde_json::from_str::<GatewayCommand>(&text) {
                        Ok(cmd) => {
                            handlers::handle_command(&recv_ctx, conn_id, &recv_user, cmd).await;
                        }
                        Err(e) => {
                            warn!(
                                "{} ({}) bad command: {} -- raw: {}",
                                recv_user.alias,
                                recv_user.id,
                                e,
                                truncate_for_log(&text, 200)
                            );
                            recv_ctx
                                .dispatcher
                                .send_to_conn(
                                    conn_id,
                                    GatewayEvent::Error {
                                        message: "Unrecognized command".into(),
                                    },
                                )
                                .await;
                        }
                    }
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Cleanup always runs, however the socket died
    ctx.dispatcher.unregister(conn_id).await;
    if ctx.dispatcher.user_disconnected(user.id).await {
        set_online(&ctx, user.id, false).await;
        ctx.dispatcher
            .broadcast_all(GatewayEvent::UserOffline {
                user_id: user.id,
                alias: user.alias.clone(),
            })
            .await;
    }

    info!("{} ({}) disconnected from gateway", user.alias, user.id);
}

/// Persist the presence flag; a storage failure here is logged but never
/// blocks connect/disconnect handling.
async fn set_online(ctx: &GatewayContext, user_id: Uuid, online: bool) {
    let uid = user_id.to_string();
    if let Err(e) = handlers::run_db(&ctx.db, move |db| db.set_online(&uid, online)).await {
        warn!("Failed to persist presence for {}: {}", user_id, e);
    }
}

/// Cut a log excerpt at a char boundary at or below `max_bytes`. Client
/// frames are arbitrary UTF-8, so a plain byte slice could land inside a
/// multibyte character and panic the recv task.
fn truncate_for_log(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<SessionUser> {
    use jsonwebtoken::{decode, DecodingKey, Validation};
    use quad_types::api::Claims;

    let timeout = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some(SessionUser {
                        id: token_data.claims.sub,
                        alias: token_data.claims.alias,
                    });
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

#[cfg(test)]
mod tests {
    use super::truncate_for_log;

    #[test]
    fn short_text_passes_through() {
        assert_eq!(truncate_for_log("hello", 200), "hello");
    }

    #[test]
    fn truncation_lands_on_a_char_boundary() {
        // 301 bytes; byte 200 falls inside a 2-byte character
        let frame = format!("a{}", "é".repeat(150));
        let cut = truncate_for_log(&frame, 200);
        assert!(cut.len() <= 200);
        assert!(frame.starts_with(cut));
        // would have panicked with a plain byte slice
        assert!(cut.chars().all(|c| c == 'a' || c == 'é'));
    }

    #[test]
    fn ascii_truncates_to_exact_length() {
        let frame = "x".repeat(500);
        assert_eq!(truncate_for_log(&frame, 200).len(), 200);
    }
}
