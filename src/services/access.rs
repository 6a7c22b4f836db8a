//! Ownership checks run at the top of every organizer operation.

use sqlx::SqlitePool;

use crate::db::models::{Discount, DiscountTarget, Event, Organizer};
use crate::db::repository::{DiscountRepository, EventRepository, TicketTypeRepository};
use crate::error::{AppError, AppResult};
use crate::i18n::tr;

pub async fn ensure_event_owner(
    pool: &SqlitePool,
    organizer: &Organizer,
    event_id: i64,
    lang: &str,
) -> AppResult<Event> {
    let event = EventRepository::find_by_id(pool, event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(tr(Some(lang), "not_found.event", None)))?;

    if event.organizer_id != organizer.id {
        tracing::debug!(
            "Organizer {} denied access to event {}",
            organizer.id,
            event_id
        );
        return Err(AppError::Forbidden(tr(Some(lang), "access.event_denied", None)));
    }

    Ok(event)
}

/// Local id of the event a discount belongs to, through its ticket type when needed.
pub async fn discount_event_id(pool: &SqlitePool, discount: &Discount) -> AppResult<i64> {
    match discount.target {
        DiscountTarget::Event(event_id) => Ok(event_id),
        DiscountTarget::TicketType(ticket_type_id) => TicketTypeRepository::find_by_id(pool, ticket_type_id)
            .await?
            .map(|t| t.event_id)
            .ok_or_else(|| AppError::NotFound(format!("ticket type {}", ticket_type_id))),
    }
}

/// The discount must hang off an event owned by `organizer`, and that event must be `event_id`.
pub async fn ensure_discount_access(
    pool: &SqlitePool,
    organizer: &Organizer,
    event_id: i64,
    discount_id: i64,
    lang: &str,
) -> AppResult<(Event, Discount)> {
    let discount = DiscountRepository::find_by_id(pool, discount_id)
        .await?
        .ok_or_else(|| AppError::NotFound(tr(Some(lang), "not_found.discount", None)))?;

    let owning_event_id = discount_event_id(pool, &discount).await?;
    let event = EventRepository::find_by_id(pool, owning_event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(tr(Some(lang), "not_found.event", None)))?;

    if event.organizer_id != organizer.id {
        return Err(AppError::Forbidden(tr(Some(lang), "access.discount_denied", None)));
    }
    if event.id != event_id {
        return Err(AppError::Forbidden(tr(
            Some(lang),
            "access.discount_event_mismatch",
            None,
        )));
    }

    Ok((event, discount))
}
