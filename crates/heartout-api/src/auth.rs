use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{info, warn};
use uuid::Uuid;

use heartout_db::models::{NewUser, StoryFilter, UserRow};
use heartout_types::api::{
    AccessTokenResponse, ChangePasswordRequest, Claims, DeleteAccountRequest, LoginRequest, MessageResponse,
    ProfileUpdate, RefreshRequest, RegisterRequest, TokenResponse, TokenType, UserStats,
};
use heartout_types::models::{StoryStatus, UserRole};

use crate::error::{ApiError, ApiJson};
use crate::middleware::AuthUser;
use crate::state::{AppState, JwtSettings};
use crate::{validation, views};

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            warn!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

pub fn create_token(jwt: &JwtSettings, user_id: i64, username: &str, token_type: TokenType) -> Result<String, ApiError> {
    let ttl = match token_type {
        TokenType::Access => jwt.access_ttl,
        TokenType::Refresh => jwt.refresh_ttl,
    };
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (Utc::now() + ttl).timestamp() as usize,
        jti: Uuid::new_v4().to_string(),
        token_type,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(jwt.secret.as_bytes()))
        .map_err(|e| ApiError::Internal(format!("Failed to sign token: {}", e)))
}

/// Verifies signature and expiry, and that the token is of the `expected` kind.
pub fn decode_token(secret: &str, token: &str, expected: TokenType) -> Result<Claims, ApiError> {
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token".into()))?;

    if data.claims.token_type != expected {
        return Err(ApiError::Unauthorized("Invalid token type".into()));
    }
    Ok(data.claims)
}

fn token_pair(jwt: &JwtSettings, user: &UserRow) -> Result<TokenResponse, ApiError> {
    Ok(TokenResponse {
        access_token: create_token(jwt, user.id, &user.username, TokenType::Access)?,
        refresh_token: create_token(jwt, user.id, &user.username, TokenType::Refresh)?,
        token_type: "bearer".into(),
        user: views::user_profile(user),
    })
}

fn expiry(exp: usize) -> DateTime<Utc> {
    DateTime::from_timestamp(exp as i64, 0).unwrap_or_else(Utc::now)
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_string();
    validation::username(&username)?;
    validation::email(&email)?;
    validation::password(&req.password)?;
    validation::display_name(req.display_name.as_deref())?;
    validation::age_range(req.age_range.as_deref())?;

    let display_name = req
        .display_name
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| username.clone());
    let password = req.password;
    let age_range = req.age_range;
    let role = if state.is_admin_email(&email) {
        UserRole::Admin
    } else {
        UserRole::User
    };

    let user = state
        .call(move |s| {
            let password_hash = hash_password(&password)?;
            s.create_user(NewUser {
                username,
                email,
                password_hash,
                display_name: Some(display_name),
                age_range,
                role,
            })
        })
        .await?;

    info!("Registered user {} ({}) as {}", user.username, user.id, user.role);
    Ok((StatusCode::CREATED, Json(token_pair(&state.jwt, &user)?)))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_string();
    let password = req.password;

    let user = state
        .call(move |s| {
            let Some(user) = s.get_user_by_email(&email)? else {
                return Ok(None);
            };
            if !verify_password(&password, &user.password_hash) {
                return Ok(None);
            }
            // Suspended accounts are turned away below, without a login stamp
            if !user.is_active {
                return Ok(Some(user));
            }
            let now = Utc::now();
            s.record_login(user.id, now)?;
            Ok(Some(UserRow {
                last_login: Some(now),
                ..user
            }))
        })
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".into()))?;
    if !user.is_active {
        return Err(ApiError::deactivated());
    }

    Ok(Json(token_pair(&state.jwt, &user)?))
}

pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = decode_token(&state.jwt.secret, &req.refresh_token, TokenType::Refresh)
        .map_err(|_| ApiError::Unauthorized("Invalid refresh token".into()))?;

    let jti = claims.jti.clone();
    let user_id = claims.sub;
    let (revoked, user) = state
        .call(move |s| Ok((s.is_token_revoked(&jti)?, s.get_user(user_id)?)))
        .await?;
    if revoked {
        return Err(ApiError::Unauthorized("Invalid refresh token".into()));
    }
    let user = user.ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;
    if !user.is_active {
        return Err(ApiError::deactivated());
    }

    Ok(Json(AccessTokenResponse {
        access_token: create_token(&state.jwt, user.id, &user.username, TokenType::Access)?,
        token_type: "bearer".into(),
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let expires_at = expiry(user.exp);
    state
        .call(move |s| s.revoke_token(&user.jti, user.id, expires_at))
        .await?;
    Ok(Json(MessageResponse::new("Successfully logged out")))
}

async fn current_user(state: &AppState, user_id: i64) -> Result<UserRow, ApiError> {
    state
        .call(move |s| s.get_user(user_id))
        .await?
        .ok_or_else(|| ApiError::not_found("User"))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let row = current_user(&state, user.id).await?;
    Ok(Json(serde_json::json!({ "user": views::user_profile(&row) })))
}

fn check_max(value: Option<&str>, field: &str, max: usize) -> Result<(), ApiError> {
    match value {
        Some(v) if v.chars().count() > max => Err(ApiError::Validation(format!(
            "{} must be at most {} characters",
            field, max
        ))),
        _ => Ok(()),
    }
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    validation::display_name(update.display_name.as_deref())?;
    validation::age_range(update.age_range.as_deref())?;
    check_max(update.bio.as_deref(), "Bio", 1000)?;
    check_max(update.author_bio.as_deref(), "Author bio", 5000)?;
    check_max(update.website_url.as_deref(), "Website URL", 200)?;

    let user_id = user.id;
    let updated = state
        .call(move |s| {
            let Some(mut row) = s.get_user(user_id)? else {
                return Ok(None);
            };
            if let Some(v) = update.display_name {
                row.display_name = Some(v);
            }
            if let Some(v) = update.bio {
                row.bio = Some(v);
            }
            if let Some(v) = update.age_range {
                row.age_range = Some(v);
            }
            if let Some(v) = update.preferred_anonymity {
                row.preferred_anonymity = v;
            }
            if let Some(v) = update.author_bio {
                row.author_bio = Some(v);
            }
            if let Some(v) = update.website_url {
                row.website_url = Some(v);
            }
            if let Some(v) = update.social_links {
                row.social_links = v;
            }
            s.update_user_profile(&row)?;
            Ok(Some(row))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    Ok(Json(serde_json::json!({
        "message": "Profile updated successfully",
        "user": views::user_profile(&updated),
    })))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let row = current_user(&state, user.id).await?;
    if !verify_password(&req.current_password, &row.password_hash) {
        return Err(ApiError::Unauthorized("Current password is incorrect".into()));
    }
    validation::password(&req.new_password)?;

    let new_password = req.new_password;
    state
        .call(move |s| {
            let hash = hash_password(&new_password)?;
            s.set_password_hash(row.id, &hash)
        })
        .await?;

    info!("User {} changed their password", user.id);
    Ok(Json(MessageResponse::new("Password changed successfully")))
}

pub async fn delete_account(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<DeleteAccountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let row = current_user(&state, user.id).await?;
    if !verify_password(&req.password, &row.password_hash) {
        return Err(ApiError::Unauthorized("Password is incorrect".into()));
    }

    let expires_at = expiry(user.exp);
    state
        .call(move |s| {
            s.delete_user(user.id)?;
            s.revoke_token(&user.jti, user.id, expires_at)
        })
        .await?;

    info!("User {} deleted their account", row.id);
    Ok(Json(MessageResponse::new("Account deleted successfully")))
}

pub async fn stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let stories = state
        .call(move |s| {
            s.list_stories(&StoryFilter {
                author_id: Some(user_id),
                ..StoryFilter::default()
            })
        })
        .await?;

    let published: Vec<_> = stories.iter().filter(|s| s.status == StoryStatus::Published).collect();
    let stats = UserStats {
        total_stories: stories.len() as i64,
        published_stories: published.len() as i64,
        drafts: stories.iter().filter(|s| s.status == StoryStatus::Draft).count() as i64,
        total_views: published.iter().map(|s| s.view_count).sum(),
        total_reactions: stories.iter().map(|s| s.support_count).sum(),
        total_comments: stories.iter().map(|s| s.comment_count).sum(),
    };
    Ok(Json(serde_json::json!({ "stats": stats })))
}

pub async fn public_profile(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let row = current_user(&state, user_id).await?;
    Ok(Json(serde_json::json!({ "user": views::user_public(&row) })))
}
