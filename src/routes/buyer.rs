use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::get,
    Form, Json, Router,
};

use crate::error::AppResult;
use crate::routes::language::Lang;
use crate::services::redemption::{self, LandingView, ListingView, RedeemForm, RedeemOutcome};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:organizer_id", get(landing))
        .route(
            "/:organizer_id/events/:event_id",
            get(listing).post(redeem),
        )
}

/// Client address as reported by the reverse proxy.
fn remote_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

async fn landing(
    State(state): State<Arc<AppState>>,
    Lang(lang): Lang,
    Path(organizer_id): Path<i64>,
) -> AppResult<Json<LandingView>> {
    Ok(Json(redemption::landing(&state, organizer_id, &lang).await?))
}

async fn listing(
    State(state): State<Arc<AppState>>,
    Lang(lang): Lang,
    Path((organizer_id, event_id)): Path<(i64, i64)>,
) -> AppResult<Json<ListingView>> {
    Ok(Json(
        redemption::listing(&state, organizer_id, event_id, &lang).await?,
    ))
}

async fn redeem(
    State(state): State<Arc<AppState>>,
    Lang(lang): Lang,
    Path((organizer_id, event_id)): Path<(i64, i64)>,
    headers: HeaderMap,
    Form(fields): Form<Vec<(String, String)>>,
) -> AppResult<Json<RedeemOutcome>> {
    let form = RedeemForm::from_fields(&fields);
    let ip = remote_ip(&headers);

    let outcome = redemption::redeem(
        &state,
        organizer_id,
        event_id,
        &form,
        ip.as_deref(),
        &lang,
    )
    .await?;
    tracing::info!(
        "Redeemed {} member number(s) on event {} with code {}",
        form.member_numbers.len(),
        event_id,
        outcome.code
    );
    Ok(Json(outcome))
}
