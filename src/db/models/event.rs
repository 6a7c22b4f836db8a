use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Local mirror of an Eventbrite event the organizer selected.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    /// Eventbrite event id
    pub external_id: String,
    pub organizer_id: i64,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Local mirror of an Eventbrite ticket class.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EventTicketType {
    pub id: i64,
    pub event_id: i64,
    /// Eventbrite ticket class id
    pub external_id: String,
    pub created_at: NaiveDateTime,
}
