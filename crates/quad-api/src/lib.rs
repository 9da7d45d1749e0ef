//! REST surface: auth, profiles, channels, messages, direct messages,
//! the social feed, and reactions. Handlers share the gateway's dispatcher
//! so REST writes reach connected WebSocket clients too.

use std::sync::Arc;

use quad_crypto::MessageCipher;
use quad_db::Database;
use quad_gateway::dispatcher::Dispatcher;

pub mod auth;
pub mod channels;
pub mod dms;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod pagination;
pub mod posts;
pub mod reactions;
pub mod users;
mod views;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub cipher: MessageCipher,
}

/// Upper bound on any single persistence call issued from a REST handler.
/// Every write serializes on one connection, so a stuck writer must surface
/// as an error instead of hanging every request behind it.
const DB_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Run a blocking database closure off the async runtime, bounded by
/// [`DB_TIMEOUT`].
pub(crate) async fn with_db<T, F>(state: &AppState, f: F) -> Result<T, error::ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
{
    with_db_timeout(state.db.clone(), DB_TIMEOUT, f).await
}

async fn with_db_timeout<T, F>(
    db: Arc<Database>,
    timeout: std::time::Duration,
    f: F,
) -> Result<T, error::ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(move || f(&db));

    match tokio::time::timeout(timeout, task).await {
        Err(_) => Err(error::ApiError::Internal(anyhow::anyhow!(
            "storage call timed out after {:?}",
            timeout
        ))),
        Ok(Err(e)) => Err(error::ApiError::Internal(anyhow::anyhow!(
            "task join error: {}",
            e
        ))),
        Ok(Ok(result)) => result.map_err(error::ApiError::Internal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn slow_storage_surfaces_as_error() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let result = with_db_timeout(db, Duration::from_millis(50), |_db| {
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(error::ApiError::Internal(_))));
    }

    #[tokio::test]
    async fn fast_storage_passes_through() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let result = with_db_timeout(db, Duration::from_secs(5), |db| {
            db.channel_exists("00000000-0000-0000-0000-000000000001")
        })
        .await;
        assert!(result.unwrap());
    }
}
