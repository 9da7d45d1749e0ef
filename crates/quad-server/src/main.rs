use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use quad_api::middleware::require_auth;
use quad_api::{auth, channels, dms, messages, posts, reactions, users, AppState, AppStateInner};
use quad_crypto::MessageCipher;
use quad_gateway::{connection, dispatcher::Dispatcher, GatewayContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quad=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("QUAD_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("QUAD_DB_PATH").unwrap_or_else(|_| "quad.db".into());
    let host = std::env::var("QUAD_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("QUAD_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let encryption = std::env::var("QUAD_ENCRYPTION")
        .map(|v| v != "0" && v.to_lowercase() != "false")
        .unwrap_or(true);

    // Init database
    let db = Arc::new(quad_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let dispatcher = Dispatcher::new();
    let cipher = MessageCipher::new(encryption);
    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        jwt_secret: jwt_secret.clone(),
        dispatcher: dispatcher.clone(),
        cipher: cipher.clone(),
    });
    let gateway_ctx = GatewayContext {
        db,
        dispatcher,
        cipher,
        jwt_secret,
    };

    // Routes
    let public_routes = Router::new()
        .route("/auth/anonymous", post(auth::anonymous))
        .route("/auth/request-code", post(auth::request_code))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/api/logout", post(auth::logout))
        .route("/api/users/me", get(users::me))
        .route("/api/users/settings", get(users::get_settings))
        .route("/api/users/settings", put(users::put_settings))
        .route("/api/users/avatar", put(users::put_avatar))
        .route("/api/users/{user_id}", get(users::get_user))
        .route("/api/channels", get(channels::list_channels))
        .route("/api/channels/{channel_id}", get(channels::channel_detail))
        .route(
            "/api/channels/{channel_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route(
            "/api/channels/{channel_id}/messages/{message_id}",
            delete(messages::delete_message),
        )
        .route(
            "/api/channels/{channel_id}/messages/{message_id}/reactions",
            post(reactions::toggle_message_reaction),
        )
        .route("/api/reactions", post(reactions::toggle_generic_reaction))
        .route(
            "/api/direct-messages",
            get(dms::conversation).post(dms::send),
        )
        .route("/api/posts", get(posts::list_posts).post(posts::create_post))
        .route("/api/posts/{post_id}", delete(posts::delete_post))
        .route(
            "/api/posts/{post_id}/comments",
            get(posts::list_comments).post(posts::create_comment),
        )
        .route("/api/comments/{comment_id}", delete(posts::delete_comment))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway_ctx);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Quad server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(ctx): State<GatewayContext>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, ctx))
}
