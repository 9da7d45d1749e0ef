use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use jsonwebtoken::{encode, EncodingKey, Header};
use rand::Rng;
use tracing::info;
use uuid::Uuid;

use quad_db::models::UserRow;
use quad_db::queries::users::UserInsert;
use quad_types::api::{
    AuthResponse, Claims, LoginRequest, RegisterRequest, RequestCodeRequest,
};

use crate::error::ApiError;
use crate::middleware;
use crate::views::profile;
use crate::{with_db, AppState};

const ADJECTIVES: &[&str] = &[
    "Anonymous", "Mysterious", "Hidden", "Secret", "Unknown", "Unnamed", "Silent", "Quiet",
    "Peaceful", "Creative", "Curious", "Brilliant", "Thoughtful", "Wise", "Gentle", "Clever",
    "Kind", "Brave", "Bold",
];

const NOUNS: &[&str] = &[
    "Fox", "Owl", "Otter", "Raven", "Lynx", "Heron", "Badger", "Falcon", "Moth", "Wren", "Elk",
    "Newt",
];

const AVATAR_COLORS: &[&str] = &[
    "blue", "pink", "yellow", "green", "purple", "orange", "teal", "red",
];

const AVATAR_FACES: &[&str] = &[
    "blue", "pink", "yellow", "green", "purple", "orange", "teal", "red",
];

/// How many alias collisions we tolerate before giving up.
const MAX_ALIAS_ATTEMPTS: u32 = 16;

/// Verification codes are valid for 15 minutes.
const CODE_TTL_MINUTES: u32 = 15;

/// The only purposes a verification code can be bound to.
const CODE_PURPOSES: &[&str] = &["registration", "password_reset"];

fn generate_alias() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.gen_range(0..NOUNS.len())];
    let number: u32 = rng.gen_range(1..100);
    format!("{}{}{}", adjective, noun, number)
}

fn generate_avatar() -> (&'static str, &'static str) {
    let mut rng = rand::thread_rng();
    (
        AVATAR_COLORS[rng.gen_range(0..AVATAR_COLORS.len())],
        AVATAR_FACES[rng.gen_range(0..AVATAR_FACES.len())],
    )
}

/// Insert a user with a freshly generated alias, retrying on alias
/// collisions. Credential fields are optional: anonymous users carry none.
async fn create_user_with_alias(
    state: &AppState,
    student_id: Option<String>,
    password_hash: Option<String>,
    email: Option<String>,
) -> Result<UserRow, ApiError> {
    for _ in 0..MAX_ALIAS_ATTEMPTS {
        let user_id = Uuid::new_v4();
        let alias = generate_alias();
        let (color, face) = generate_avatar();

        let uid = user_id.to_string();
        let alias_clone = alias.clone();
        let sid = student_id.clone();
        let hash = password_hash.clone();
        let mail = email.clone();
        let outcome = with_db(state, move |db| {
            db.create_user(
                &uid,
                &alias_clone,
                color,
                face,
                sid.as_deref(),
                hash.as_deref(),
                mail.as_deref(),
            )
        })
        .await?;

        match outcome {
            UserInsert::Created => {
                let uid = user_id.to_string();
                return with_db(state, move |db| db.get_user(&uid))
                    .await?
                    .ok_or_else(|| {
                        ApiError::Internal(anyhow::anyhow!("user vanished after insert"))
                    });
            }
            UserInsert::AliasTaken => continue,
            UserInsert::StudentIdTaken => {
                return Err(ApiError::Conflict("student id already registered".into()))
            }
        }
    }
    Err(ApiError::Internal(anyhow::anyhow!(
        "alias space exhausted after {} attempts",
        MAX_ALIAS_ATTEMPTS
    )))
}

/// POST /auth/anonymous — instant identity with no credentials.
pub async fn anonymous(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let user = create_user_with_alias(&state, None, None, None).await?;
    let token = create_token(&state.jwt_secret, &user)?;

    info!("Anonymous user {} created", user.alias);
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: profile(&user),
            token,
        }),
    ))
}

/// POST /auth/request-code — bind a short-lived verification code to a
/// (student_id, purpose) pair. Delivery is out of scope for the server;
/// the code is logged for the operator to relay.
pub async fn request_code(
    State(state): State<AppState>,
    Json(req): Json<RequestCodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let student_id = req.student_id.trim().to_string();
    if student_id.is_empty() || student_id.len() > 32 {
        return Err(ApiError::Validation("student id required".into()));
    }
    if !req.email.contains('@') {
        return Err(ApiError::Validation("valid email required".into()));
    }
    if !CODE_PURPOSES.contains(&req.purpose.as_str()) {
        return Err(ApiError::Validation(format!(
            "purpose must be one of: {}",
            CODE_PURPOSES.join(", ")
        )));
    }

    let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));

    {
        let sid = student_id.clone();
        let email = req.email.clone();
        let purpose = req.purpose.clone();
        let code = code.clone();
        with_db(&state, move |db| {
            db.store_verification_code(&sid, &email, &purpose, &code, CODE_TTL_MINUTES)
        })
        .await?;
    }

    // No mail transport here; the operator relays the code out of band
    info!(
        "Verification code for student {} ({}): {}",
        student_id, req.purpose, code
    );

    Ok(Json(serde_json::json!({ "status": "sent" })))
}

/// POST /auth/register — consume a verification code and create a durable
/// account. The stored profile still only carries the anonymous alias.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let student_id = req.student_id.trim().to_string();
    if student_id.is_empty() {
        return Err(ApiError::Validation("student id required".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }

    let email = {
        let sid = student_id.clone();
        let code = req.code.clone();
        with_db(&state, move |db| {
            db.consume_verification_code(&sid, "registration", &code)
        })
        .await?
        .ok_or_else(|| ApiError::Validation("invalid or expired verification code".into()))?
    };

    if email != req.email {
        return Err(ApiError::Validation(
            "email does not match the verification request".into(),
        ));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hash failed: {}", e)))?
        .to_string();

    let user =
        create_user_with_alias(&state, Some(student_id), Some(password_hash), Some(email)).await?;
    let token = create_token(&state.jwt_secret, &user)?;

    info!("Registered user {} created", user.alias);
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: profile(&user),
            token,
        }),
    ))
}

/// POST /auth/login — verify student credentials, issue a fresh token.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sid = req.student_id.trim().to_string();
    let user = with_db(&state, move |db| db.get_user_by_student_id(&sid))
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    let stored = user.password.as_deref().ok_or(ApiError::Unauthenticated)?;
    let parsed_hash = PasswordHash::new(stored)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt password hash: {}", e)))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthenticated)?;

    let token = create_token(&state.jwt_secret, &user)?;

    Ok(Json(AuthResponse {
        user: profile(&user),
        token,
    }))
}

/// POST /api/logout — tokens are stateless, so logout is a presence
/// mutation plus a broadcast; the client discards its token.
pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<middleware::Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    with_db(&state, move |db| db.set_online(&uid, false)).await?;

    state
        .dispatcher
        .broadcast_all(quad_types::events::GatewayEvent::UserOffline {
            user_id: claims.sub,
            alias: claims.alias.clone(),
        })
        .await;

    Ok(Json(serde_json::json!({ "status": "ok" })))
}

fn create_token(secret: &str, user: &UserRow) -> Result<String, ApiError> {
    let claims = Claims {
        sub: crate::views::parse_uuid(&user.id, "user id"),
        alias: user.alias.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("token encode failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_use_the_word_lists() {
        for _ in 0..50 {
            let alias = generate_alias();
            assert!(ADJECTIVES.iter().any(|a| alias.starts_with(a)));
            assert!(alias.chars().last().is_some_and(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn avatars_come_from_the_palette() {
        for _ in 0..20 {
            let (color, face) = generate_avatar();
            assert!(AVATAR_COLORS.contains(&color));
            assert!(AVATAR_FACES.contains(&face));
        }
    }

    fn test_state() -> AppState {
        std::sync::Arc::new(crate::AppStateInner {
            db: std::sync::Arc::new(quad_db::Database::open_in_memory().unwrap()),
            jwt_secret: "test-secret".into(),
            dispatcher: quad_gateway::dispatcher::Dispatcher::new(),
            cipher: quad_crypto::MessageCipher::new(false),
        })
    }

    #[tokio::test]
    async fn request_code_rejects_unknown_purposes() {
        let state = test_state();
        let req = RequestCodeRequest {
            student_id: "s1234567".into(),
            email: "s1234567@campus.edu".into(),
            purpose: "delete_everything".into(),
        };

        let result = request_code(State(state), Json(req)).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn request_code_accepts_known_purposes() {
        let state = test_state();
        for purpose in CODE_PURPOSES {
            let req = RequestCodeRequest {
                student_id: "s1234567".into(),
                email: "s1234567@campus.edu".into(),
                purpose: (*purpose).into(),
            };
            assert!(request_code(State(state.clone()), Json(req)).await.is_ok());
        }
    }
}
