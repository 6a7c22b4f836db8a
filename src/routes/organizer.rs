use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Form, Json, Router,
};
use serde::Serialize;

use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::routes::language::Lang;
use crate::services::discounts::{self, DeleteConfirmation, DiscountForm, DiscountView};
use crate::services::reconcile::{self, EventDiscountsView, HomeView, SelectEventsView};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(home))
        .route("/select", get(select_view).post(select))
        .route("/:event_id/discounts", get(event_discounts))
        .route("/:event_id/discounts/event", post(create_event_discount))
        .route(
            "/:event_id/discounts/ticket/:ticket_type_id",
            post(create_ticket_type_discount),
        )
        .route(
            "/:event_id/discounts/:discount_id",
            get(get_discount).post(modify_discount),
        )
        .route(
            "/:event_id/discounts/:discount_id/delete",
            get(delete_confirmation).post(delete_discount).delete(delete_discount),
        )
}

#[derive(Debug, Serialize)]
pub struct SelectResponse {
    pub selected_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DiscountResponse {
    pub event_id: i64,
    pub discount: DiscountView,
}

async fn home(
    State(state): State<Arc<AppState>>,
    AuthUser(organizer): AuthUser,
    Lang(lang): Lang,
) -> AppResult<Json<HomeView>> {
    Ok(Json(reconcile::home(&state, &organizer, &lang).await?))
}

async fn select_view(
    State(state): State<Arc<AppState>>,
    AuthUser(organizer): AuthUser,
) -> AppResult<Json<SelectEventsView>> {
    Ok(Json(reconcile::select_events_view(&state, &organizer).await?))
}

/// One `event_<eventbrite id>=on` field per checked event.
async fn select(
    State(state): State<Arc<AppState>>,
    AuthUser(organizer): AuthUser,
    Form(fields): Form<Vec<(String, String)>>,
) -> AppResult<Json<SelectResponse>> {
    let ids = reconcile::selected_event_ids(&fields);
    let synced = reconcile::select_events(&state, &organizer, &ids).await?;

    Ok(Json(SelectResponse {
        selected_ids: synced.into_iter().map(|s| s.event.external_id).collect(),
    }))
}

async fn event_discounts(
    State(state): State<Arc<AppState>>,
    AuthUser(organizer): AuthUser,
    Lang(lang): Lang,
    Path(event_id): Path<i64>,
) -> AppResult<Json<EventDiscountsView>> {
    Ok(Json(
        reconcile::event_discounts(&state, &organizer, event_id, &lang).await?,
    ))
}

async fn create_event_discount(
    State(state): State<Arc<AppState>>,
    AuthUser(organizer): AuthUser,
    Lang(lang): Lang,
    Path(event_id): Path<i64>,
    Form(form): Form<DiscountForm>,
) -> AppResult<impl IntoResponse> {
    let discount =
        discounts::create_event_discount(&state, &organizer, event_id, &form, &lang).await?;
    Ok((
        StatusCode::CREATED,
        Json(DiscountResponse {
            event_id,
            discount: DiscountView::new(&discount, &lang),
        }),
    ))
}

async fn create_ticket_type_discount(
    State(state): State<Arc<AppState>>,
    AuthUser(organizer): AuthUser,
    Lang(lang): Lang,
    Path((event_id, ticket_type_id)): Path<(i64, i64)>,
    Form(form): Form<DiscountForm>,
) -> AppResult<impl IntoResponse> {
    let discount = discounts::create_ticket_type_discount(
        &state,
        &organizer,
        event_id,
        ticket_type_id,
        &form,
        &lang,
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(DiscountResponse {
            event_id,
            discount: DiscountView::new(&discount, &lang),
        }),
    ))
}

async fn get_discount(
    State(state): State<Arc<AppState>>,
    AuthUser(organizer): AuthUser,
    Lang(lang): Lang,
    Path((event_id, discount_id)): Path<(i64, i64)>,
) -> AppResult<Json<DiscountResponse>> {
    let (event, discount) =
        discounts::get_discount(&state, &organizer, event_id, discount_id, &lang).await?;
    Ok(Json(DiscountResponse {
        event_id: event.id,
        discount: DiscountView::new(&discount, &lang),
    }))
}

async fn modify_discount(
    State(state): State<Arc<AppState>>,
    AuthUser(organizer): AuthUser,
    Lang(lang): Lang,
    Path((event_id, discount_id)): Path<(i64, i64)>,
    Form(form): Form<DiscountForm>,
) -> AppResult<Json<DiscountResponse>> {
    let discount =
        discounts::modify_discount(&state, &organizer, event_id, discount_id, &form, &lang)
            .await?;
    Ok(Json(DiscountResponse {
        event_id,
        discount: DiscountView::new(&discount, &lang),
    }))
}

async fn delete_confirmation(
    State(state): State<Arc<AppState>>,
    AuthUser(organizer): AuthUser,
    Lang(lang): Lang,
    Path((event_id, discount_id)): Path<(i64, i64)>,
) -> AppResult<Json<DeleteConfirmation>> {
    Ok(Json(
        discounts::delete_confirmation(&state, &organizer, event_id, discount_id, &lang).await?,
    ))
}

async fn delete_discount(
    State(state): State<Arc<AppState>>,
    AuthUser(organizer): AuthUser,
    Lang(lang): Lang,
    Path((event_id, discount_id)): Path<(i64, i64)>,
) -> AppResult<StatusCode> {
    discounts::delete_discount(&state, &organizer, event_id, discount_id, &lang).await?;
    Ok(StatusCode::NO_CONTENT)
}
