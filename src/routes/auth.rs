use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Query, State},
    http::{header, request::Parts},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};

use crate::db::models::Organizer;
use crate::error::{AppError, AppResult};
use crate::i18n::{self, tr};
use crate::routes::language::{Lang, LANG_COOKIE};
use crate::services::auth::{AuthService, SESSION_COOKIE};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", get(login))
        .route("/callback", get(callback))
        .route("/me", get(me))
        .route("/logout", post(logout))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    redirect_to: Option<String>,
    lang: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrganizerResponse {
    pub id: i64,
    pub eventbrite_id: String,
    pub name: String,
    pub email: String,
    pub lang: Option<String>,
    /// Public page buyers use to redeem this organizer's discounts.
    pub landing_path: String,
}

impl From<Organizer> for OrganizerResponse {
    fn from(organizer: Organizer) -> Self {
        Self {
            landing_path: format!("/api/landing/{}", organizer.id),
            id: organizer.id,
            eventbrite_id: organizer.eventbrite_id,
            name: organizer.name,
            email: organizer.email,
            lang: organizer.lang,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Redirect to Eventbrite for authorization
async fn login(
    State(state): State<Arc<AppState>>,
    Lang(current): Lang,
    Query(query): Query<LoginQuery>,
) -> AppResult<impl IntoResponse> {
    let redirect_to = query.redirect_to.filter(|r| !r.is_empty());

    let lang = query
        .lang
        .filter(|l| !l.is_empty())
        .map(|l| i18n::normalize_language(&l))
        .filter(|l| i18n::is_supported_language(l))
        .unwrap_or(current);

    let state_jwt = AuthService::generate_oauth_state(&state, redirect_to, Some(lang))?;

    Ok(Redirect::to(&state.oauth.auth_url(&state_jwt)))
}

/// OAuth callback: exchange the code, store the organizer, set the session cookie
async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> AppResult<impl IntoResponse> {
    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_default();
        tracing::error!("OAuth error: {} - {}", error, description);
        return Err(AppError::BadRequest(format!("OAuth error: {}", description)));
    }

    let code = query.code.ok_or_else(|| {
        tracing::error!("OAuth callback missing authorization code");
        AppError::BadRequest("Missing authorization code".to_string())
    })?;

    let state_encoded = query.state.ok_or_else(|| {
        tracing::error!("OAuth callback missing state parameter");
        AppError::BadRequest("Missing state parameter".to_string())
    })?;

    let oauth_state = AuthService::decode_oauth_state(&state, &state_encoded)?;
    let outcome = AuthService::handle_callback(&state, &code, oauth_state).await?;

    let secure = state.config.cookie_secure();
    let session = Cookie::build((SESSION_COOKIE, outcome.session_token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(state.config.jwt.expiration_hours))
        .build();
    let mut jar = jar.add(session);

    if let Some(lang) = outcome.organizer.lang.clone() {
        jar = jar.add(
            Cookie::build((LANG_COOKIE, lang))
                .path("/")
                .secure(secure)
                .same_site(SameSite::Lax)
                .max_age(time::Duration::days(365))
                .build(),
        );
    }

    Ok((jar, Redirect::to(&outcome.redirect_to)))
}

async fn me(AuthUser(organizer): AuthUser) -> AppResult<Json<OrganizerResponse>> {
    Ok(Json(organizer.into()))
}

async fn logout(Lang(lang): Lang, jar: CookieJar) -> AppResult<impl IntoResponse> {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/").build());
    Ok((
        jar,
        Json(serde_json::json!({ "message": tr(Some(&lang), "auth.logged_out", None) })),
    ))
}

// ============================================================================
// Extractors
// ============================================================================

/// The logged-in organizer, from the `session` cookie or a Bearer token.
pub struct AuthUser(pub Organizer);

fn bearer_token(parts: &Parts) -> Option<String> {
    let auth_header = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())?;

    if !auth_header.to_ascii_lowercase().starts_with("bearer ") {
        tracing::debug!("Authorization header doesn't start with 'Bearer '");
        return None;
    }

    Some(auth_header[7..].trim().to_string()).filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .or_else(|| {
                CookieJar::from_headers(&parts.headers)
                    .get(SESSION_COOKIE)
                    .map(|c| c.value().to_string())
            })
            .ok_or_else(|| {
                tracing::debug!("No session cookie or bearer token");
                AppError::Unauthorized
            })?;

        let organizer = AuthService::get_organizer_from_token(state, &token)
            .await
            .map_err(|e| {
                tracing::debug!("Failed to get organizer from token: {:?}", e);
                e
            })?;

        tracing::debug!("Authenticated organizer: {}", organizer.id);
        Ok(AuthUser(organizer))
    }
}
