use std::convert::Infallible;

use axum::{
    Extension,
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use tracing::debug;

use heartout_types::api::TokenType;
use heartout_types::models::UserRole;

use crate::auth::decode_token;
use crate::error::ApiError;
use crate::state::AppState;

/// The signed-in caller, placed in request extensions by `require_auth`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub jti: String,
    pub exp: usize,
    pub role: UserRole,
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
}

/// Validates an access token: signature, expiry, type, blocklist, and that the
/// user still exists and is not suspended.
pub async fn authenticate(state: &AppState, token: &str) -> Result<AuthUser, ApiError> {
    let claims = decode_token(&state.jwt.secret, token, TokenType::Access)?;

    let jti = claims.jti.clone();
    let user_id = claims.sub;
    let (revoked, user) = state
        .call(move |s| Ok((s.is_token_revoked(&jti)?, s.get_user(user_id)?)))
        .await?;

    if revoked {
        return Err(ApiError::Unauthorized("Token has been revoked".into()));
    }
    let user = user.ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;
    if !user.is_active {
        return Err(ApiError::deactivated());
    }

    Ok(AuthUser {
        id: claims.sub,
        username: claims.username,
        jti: claims.jti,
        exp: claims.exp,
        role: user.role,
    })
}

/// Extract and validate the JWT from the Authorization header.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers()).ok_or_else(ApiError::unauthorized)?;
    let user = authenticate(&state, &token).await?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Lets moderators and admins through. Runs inside `require_auth`.
pub async fn require_staff(Extension(user): Extension<AuthUser>, req: Request, next: Next) -> Result<Response, ApiError> {
    if !user.role.is_staff() {
        debug!("{} ({}) denied moderation access", user.username, user.role);
        return Err(ApiError::Forbidden("Admin access required".into()));
    }
    Ok(next.run(req).await)
}

/// The caller if a valid token was presented. Invalid tokens are treated as anonymous.
pub struct OptionalUser(pub Option<AuthUser>);

impl FromRequestParts<AppState> for OptionalUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(OptionalUser(None));
        };
        match authenticate(state, &token).await {
            Ok(user) => Ok(OptionalUser(Some(user))),
            Err(e) => {
                debug!("Ignoring bad optional token: {}", e);
                Ok(OptionalUser(None))
            }
        }
    }
}
