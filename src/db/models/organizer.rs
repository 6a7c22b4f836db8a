use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An Eventbrite user who logged in to manage discounts for their events.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Organizer {
    pub id: i64,
    pub eventbrite_id: String,
    pub name: String,
    pub email: String,

    // OAuth token reused for every Eventbrite call made for this organizer's events
    #[serde(skip_serializing, default)]
    pub access_token: String,

    pub lang: Option<String>,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct UpsertOrganizer {
    pub eventbrite_id: String,
    pub name: String,
    pub email: String,
    pub access_token: String,
}
