//! Realtime messaging core: the room registry, the per-connection WebSocket
//! loop, and the command handlers that persist-then-broadcast.

pub mod connection;
pub mod dispatcher;
pub mod handlers;
pub mod sanitize;
pub mod views;

use std::sync::Arc;

use quad_crypto::MessageCipher;
use quad_db::Database;

use dispatcher::Dispatcher;

/// Everything a connection handler needs, cloned per connection.
#[derive(Clone)]
pub struct GatewayContext {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub cipher: MessageCipher,
    pub jwt_secret: String,
}
