//! Authentication extractors and routes

use axum::{
    body::Bytes,
    extract::{FromRef, FromRequestParts, State},
    http::header::SET_COOKIE,
    http::{request::Parts, HeaderMap, HeaderName, StatusCode},
    response::AppendHeaders,
    routing::{get, post, put},
    Json, Router,
};
use passage_auth::TokenKind;
use passage_core::SessionTokens;
use passage_db::{User, UserRole};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::extract::{
    auth_cookie, clear_cookie, extract_token, ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME,
};
use crate::state::AppState;

use super::types::{
    ChangePasswordRequest, LoginRequest, RefreshRequest, RegisterRequest, RevokedResponse,
    TokenResponse, UserResponse,
};

// ==================== Auth Extractors ====================

/// Identity attached to a request once the auth gate passes
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
    pub role: UserRole,
    pub display_name: String,
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role,
            display_name: user.display_name,
        }
    }
}

/// Extractor for authenticated user (required)
///
/// Verifies the access token (cookie first, then Authorization header)
/// and re-fetches the user by the token subject, so role changes and
/// deletions since issuance take effect within one lookup.
pub struct RequireAuth(pub AuthUser);

impl<S> FromRequestParts<S> for RequireAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let token = extract_token(&parts.headers, ACCESS_COOKIE_NAME)
            .ok_or(ApiError::Unauthorized)?;

        let claims = app_state
            .jwt
            .verify(&token, TokenKind::Access)
            .map_err(|_| ApiError::Unauthorized)?;

        let user = app_state
            .db
            .get_user_by_id(claims.user_id())
            .await?
            .ok_or(ApiError::Unauthorized)?;

        debug!("Authenticated user: {} ({})", user.email, user.role.as_str());
        Ok(RequireAuth(user.into()))
    }
}

/// Extractor for admin user (required)
pub struct RequireAdmin(pub AuthUser);

impl<S> FromRequestParts<S> for RequireAdmin
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;

        if !user.role.is_admin() {
            return Err(ApiError::Forbidden);
        }

        Ok(RequireAdmin(user))
    }
}

// ==================== Input Validation ====================

/// Maximum allowed email length
const MAX_EMAIL_LENGTH: usize = 254;
/// Maximum allowed display name length
const MAX_DISPLAY_NAME_LENGTH: usize = 128;
/// Maximum allowed password length (prevent DoS with very large passwords)
const MAX_PASSWORD_LENGTH: usize = 256;
/// Minimum allowed password length
const MIN_PASSWORD_LENGTH: usize = 8;

/// Validate email shape and length
pub(super) fn validate_email(email: &str) -> Result<(), ApiError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ApiError::BadRequest("Email cannot be empty".to_string()));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "Email exceeds maximum length of {} characters",
            MAX_EMAIL_LENGTH
        )));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ApiError::BadRequest("Invalid email address".to_string())),
    }
}

/// Validate password length bounds
pub(super) fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        )));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "Password exceeds maximum length of {} characters",
            MAX_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

/// Validate display name
pub(super) fn validate_display_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Display name cannot be empty".to_string(),
        ));
    }
    if name.len() > MAX_DISPLAY_NAME_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "Display name exceeds maximum length of {} characters",
            MAX_DISPLAY_NAME_LENGTH
        )));
    }
    Ok(())
}

// ==================== Cookie Helpers ====================

type SessionCookies = AppendHeaders<[(HeaderName, String); 2]>;

/// Cookie pair delivering both tokens, max-ages matching their TTLs
fn session_cookies(state: &AppState, tokens: &SessionTokens) -> SessionCookies {
    AppendHeaders([
        (
            SET_COOKIE,
            auth_cookie(ACCESS_COOKIE_NAME, &tokens.access_token, tokens.expires_in),
        ),
        (
            SET_COOKIE,
            auth_cookie(
                REFRESH_COOKIE_NAME,
                &tokens.refresh_token,
                state.jwt.ttl(TokenKind::Refresh).num_seconds(),
            ),
        ),
    ])
}

/// Cookie pair clearing both tokens
fn cleared_cookies() -> SessionCookies {
    AppendHeaders([
        (SET_COOKIE, clear_cookie(ACCESS_COOKIE_NAME)),
        (SET_COOKIE, clear_cookie(REFRESH_COOKIE_NAME)),
    ])
}

/// Final extraction fallback: a `refresh_token` field in the JSON body,
/// for clients that hold tokens outside cookies
fn body_refresh_token(body: &Bytes) -> Option<String> {
    serde_json::from_slice::<RefreshRequest>(body)
        .ok()
        .and_then(|b| b.refresh_token)
}

fn token_response(tokens: SessionTokens) -> TokenResponse {
    TokenResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: tokens.expires_in,
        user: tokens.user.into(),
    }
}

// ==================== Auth Routes ====================

/// POST /api/v1/auth/register
async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    validate_email(&request.email)?;
    validate_password(&request.password)?;
    validate_display_name(&request.display_name)?;

    let user = state
        .sessions
        .register(&request.email, &request.password, &request.display_name)
        .await?;

    metrics::counter!("passage_registrations_total").increment(1);

    Ok((StatusCode::CREATED, Json(user.into())))
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<(SessionCookies, Json<TokenResponse>), ApiError> {
    // Cap input lengths before any hashing work
    if request.email.len() > MAX_EMAIL_LENGTH || request.password.len() > MAX_PASSWORD_LENGTH {
        return Err(ApiError::Core(passage_core::CoreError::InvalidCredentials));
    }

    let tokens = state
        .sessions
        .login(&request.email, &request.password, request.device_label)
        .await?;

    metrics::counter!("passage_logins_total").increment(1);

    let cookies = session_cookies(&state, &tokens);
    Ok((cookies, Json(token_response(tokens))))
}

/// POST /api/v1/auth/refresh
///
/// The presented refresh token is taken from the refresh cookie, the
/// Authorization header, or the JSON body, in that order.
async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(SessionCookies, Json<TokenResponse>), ApiError> {
    let presented = extract_token(&headers, REFRESH_COOKIE_NAME)
        .or_else(|| body_refresh_token(&body))
        .ok_or(ApiError::Unauthorized)?;

    let tokens = state.sessions.refresh(&presented).await?;

    metrics::counter!("passage_token_refreshes_total").increment(1);

    let cookies = session_cookies(&state, &tokens);
    Ok((cookies, Json(token_response(tokens))))
}

/// POST /api/v1/auth/logout
///
/// Revokes the presented session only. Deleting zero rows is not an
/// error; the cookies are cleared either way.
async fn logout(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(SessionCookies, StatusCode), ApiError> {
    let presented =
        extract_token(&headers, REFRESH_COOKIE_NAME).or_else(|| body_refresh_token(&body));

    if let Some(token) = presented {
        state.sessions.logout(user.id, &token).await?;
    }

    info!("User {} logged out", user.email);
    Ok((cleared_cookies(), StatusCode::NO_CONTENT))
}

/// POST /api/v1/auth/logout-all
async fn logout_all(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<(SessionCookies, Json<RevokedResponse>), ApiError> {
    let revoked = state.sessions.logout_all(user.id).await?;

    info!("User {} logged out everywhere", user.email);
    Ok((cleared_cookies(), Json(RevokedResponse { revoked })))
}

/// GET /api/v1/auth/me
async fn me(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .db
        .get_user_by_id(user.id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    Ok(Json(user.into()))
}

/// PUT /api/v1/auth/password
async fn change_password(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    validate_password(&request.new_password)?;

    state
        .sessions
        .change_password(user.id, &request.current_password, &request.new_password)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Create auth routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/auth/register", post(register))
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/refresh", post(refresh))
        .route("/api/v1/auth/logout", post(logout))
        .route("/api/v1/auth/logout-all", post(logout_all))
        .route("/api/v1/auth/me", get(me))
        .route("/api/v1/auth/password", put(change_password))
}
