use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{header, request::Parts, HeaderMap},
    response::{IntoResponse, Redirect},
    routing::get,
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::db::repository::OrganizerRepository;
use crate::error::{AppError, AppResult};
use crate::i18n::{self, tr, DEFAULT_LANG};
use crate::routes::auth::AuthUser;
use crate::services::auth::AuthService;
use crate::AppState;

pub const LANG_COOKIE: &str = "lang";

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/activate/:code", get(activate))
}

/// Language of the current request: the `lang` cookie, then `Accept-Language`, then the default.
#[derive(Debug, Clone)]
pub struct Lang(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Lang {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let lang = jar
            .get(LANG_COOKIE)
            .map(|c| i18n::normalize_language(c.value()))
            .filter(|l| i18n::is_supported_language(l))
            .or_else(|| {
                parts
                    .headers
                    .get(header::ACCEPT_LANGUAGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(i18n::negotiate)
            })
            .unwrap_or_else(|| DEFAULT_LANG.to_string());

        Ok(Lang(lang))
    }
}

/// Store the language in a cookie and go back to the page the switch was made from.
async fn activate(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Lang(current): Lang,
    organizer: Option<AuthUser>,
    headers: HeaderMap,
    jar: CookieJar,
) -> AppResult<impl IntoResponse> {
    let lang = i18n::normalize_language(&code);
    if !i18n::is_supported_language(&lang) {
        return Err(AppError::BadRequest(tr(
            Some(&current),
            "error.unsupported_language",
            Some(&[("lang", code.as_str())]),
        )));
    }

    if let Some(AuthUser(organizer)) = organizer {
        OrganizerRepository::update_lang(&state.db, organizer.id, &lang).await?;
    }

    let cookie = Cookie::build((LANG_COOKIE, lang))
        .path("/")
        .max_age(time::Duration::days(365))
        .same_site(SameSite::Lax)
        .secure(state.config.cookie_secure())
        .build();

    let back = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .filter(|r| AuthService::is_safe_redirect(r, &state.config.server.public_url))
        .unwrap_or("/")
        .to_string();

    Ok((jar.add(cookie), Redirect::to(&back)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestApp;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn lang_of(request: Request<Body>) -> String {
        let (mut parts, _) = request.into_parts();
        let Lang(lang) = Lang::from_request_parts(&mut parts, &()).await.unwrap();
        lang
    }

    #[tokio::test]
    async fn cookie_wins_over_accept_language() {
        let request = Request::builder()
            .header(header::COOKIE, "lang=es")
            .header(header::ACCEPT_LANGUAGE, "de-DE,de;q=0.9")
            .body(Body::empty())
            .unwrap();
        assert_eq!(lang_of(request).await, "es");

        let request = Request::builder()
            .header(header::ACCEPT_LANGUAGE, "fr-FR, de;q=0.8")
            .body(Body::empty())
            .unwrap();
        assert_eq!(lang_of(request).await, "de");

        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(lang_of(request).await, "en");
    }

    #[tokio::test]
    async fn activate_sets_cookie_and_redirects_back() {
        let app = TestApp::new().await;
        let router = router().with_state(app.state.clone());

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/activate/de")
                    .header(header::REFERER, "/events")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/events");
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("lang=de"));

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/activate/fr")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
