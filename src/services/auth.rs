use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::db::models::{Organizer, UpsertOrganizer};
use crate::db::repository::OrganizerRepository;
use crate::error::{AppError, AppResult};
use crate::AppState;

/// Name of the cookie carrying the session JWT.
pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthState {
    pub csrf_token: String,
    pub redirect_to: Option<String>,
    pub lang: Option<String>,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

/// Result of a completed login.
pub struct LoginOutcome {
    pub organizer: Organizer,
    pub session_token: String,
    pub redirect_to: String,
}

pub struct AuthService;

impl AuthService {
    /// Generate OAuth state JWT for Eventbrite login
    pub fn generate_oauth_state(
        state: &Arc<AppState>,
        redirect_to: Option<String>,
        lang: Option<String>,
    ) -> AppResult<String> {
        let now = Utc::now();
        let state_claims = OAuthState {
            csrf_token: Self::generate_random_string(32),
            redirect_to,
            lang,
            iat: now.timestamp() as usize,
            exp: (now + Duration::minutes(10)).timestamp() as usize,
        };

        let state_jwt = encode(
            &Header::default(),
            &state_claims,
            &EncodingKey::from_secret(state.config.jwt.secret.as_bytes()),
        )?;

        Ok(state_jwt)
    }

    /// Decode and validate OAuth state JWT
    pub fn decode_oauth_state(state: &Arc<AppState>, state_encoded: &str) -> AppResult<OAuthState> {
        let token_data = decode::<OAuthState>(
            state_encoded,
            &DecodingKey::from_secret(state.config.jwt.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| {
            tracing::error!("Failed to decode OAuth state: {:?}", e);
            e
        })?;
        Ok(token_data.claims)
    }

    /// Create a signed session JWT for an organizer id
    pub fn create_jwt(state: &Arc<AppState>, organizer_id: i64) -> AppResult<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(state.config.jwt.expiration_hours);
        let claims = Claims {
            sub: organizer_id.to_string(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(state.config.jwt.secret.as_bytes()),
        )?;
        Ok(token)
    }

    /// Decode and validate a JWT, returning the claims
    pub fn decode_jwt(state: &Arc<AppState>, token: &str) -> AppResult<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(state.config.jwt.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub async fn get_organizer_from_token(state: &Arc<AppState>, token: &str) -> AppResult<Organizer> {
        let claims = Self::decode_jwt(state, token)?;
        let organizer_id: i64 = claims.sub.parse().map_err(|_| AppError::Unauthorized)?;
        OrganizerRepository::find_by_id(&state.db, organizer_id)
            .await?
            .ok_or(AppError::Unauthorized)
    }

    /// Exchange the code, store the organizer and issue a session token.
    pub async fn handle_callback(
        state: &Arc<AppState>,
        code: &str,
        oauth_state: OAuthState,
    ) -> AppResult<LoginOutcome> {
        let token_response = state.oauth.exchange_code(code).await?;
        let user = state.eventbrite.current_user(&token_response.access_token).await?;

        let organizer = OrganizerRepository::upsert(
            &state.db,
            UpsertOrganizer {
                eventbrite_id: user.id.clone(),
                name: user.display_name(),
                email: user.primary_email().unwrap_or_default().to_string(),
                access_token: token_response.access_token,
            },
        )
        .await?;

        if organizer.lang.is_none() {
            if let Some(lang) = oauth_state.lang.as_deref() {
                OrganizerRepository::update_lang(&state.db, organizer.id, lang).await?;
            }
        }

        let session_token = Self::create_jwt(state, organizer.id)?;

        let raw_redirect = oauth_state.redirect_to.as_deref().unwrap_or("/");
        let redirect_to = if Self::is_safe_redirect(raw_redirect, &state.config.server.public_url) {
            raw_redirect.to_string()
        } else {
            tracing::warn!("Rejected unsafe redirect_to value: {}", raw_redirect);
            "/".to_string()
        };

        tracing::info!(
            "Organizer {} logged in (eventbrite_id: {})",
            organizer.id,
            organizer.eventbrite_id
        );

        Ok(LoginOutcome {
            organizer,
            session_token,
            redirect_to,
        })
    }

    pub fn generate_random_string(length: usize) -> String {
        use rand::Rng;
        const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
        let mut rng = rand::thread_rng();
        (0..length)
            .map(|_| {
                let idx = rng.gen_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect()
    }

    /// Only same-origin absolute URLs and single-slash relative paths are allowed.
    pub fn is_safe_redirect(redirect: &str, public_url: &str) -> bool {
        if redirect.starts_with('/') && !redirect.starts_with("//") {
            return true;
        }
        if let Ok(u) = Url::parse(redirect) {
            if let Ok(front) = Url::parse(public_url) {
                return u.origin() == front.origin();
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestApp;

    #[test]
    fn safe_redirects() {
        let base = "https://discounts.example.org";
        assert!(AuthService::is_safe_redirect("/events", base));
        assert!(AuthService::is_safe_redirect("https://discounts.example.org/x", base));
        assert!(!AuthService::is_safe_redirect("//evil.example", base));
        assert!(!AuthService::is_safe_redirect("https://evil.example/", base));
    }

    #[tokio::test]
    async fn session_token_round_trips() {
        let app = TestApp::new().await;
        let token = AuthService::create_jwt(&app.state, app.organizer.id).unwrap();
        let organizer = AuthService::get_organizer_from_token(&app.state, &token).await.unwrap();
        assert_eq!(organizer.id, app.organizer.id);

        assert!(AuthService::get_organizer_from_token(&app.state, "garbage").await.is_err());
    }

    #[tokio::test]
    async fn oauth_state_round_trips() {
        let app = TestApp::new().await;
        let encoded =
            AuthService::generate_oauth_state(&app.state, Some("/events".into()), Some("de".into()))
                .unwrap();
        let decoded = AuthService::decode_oauth_state(&app.state, &encoded).unwrap();
        assert_eq!(decoded.redirect_to.as_deref(), Some("/events"));
        assert_eq!(decoded.lang.as_deref(), Some("de"));
        assert_eq!(decoded.csrf_token.len(), 32);
    }
}
