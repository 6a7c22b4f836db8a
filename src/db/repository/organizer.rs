use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::{Organizer, UpsertOrganizer};
use crate::error::{AppError, AppResult};

pub struct OrganizerRepository;

impl OrganizerRepository {
    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> AppResult<Option<Organizer>> {
        sqlx::query_as::<_, Organizer>(
            r#"
            SELECT id, eventbrite_id, name, email, access_token, lang, created_at, updated_at
            FROM organizers
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Insert the organizer on first login, refresh profile and token on later ones.
    pub async fn upsert(pool: &SqlitePool, organizer: UpsertOrganizer) -> AppResult<Organizer> {
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, Organizer>(
            r#"
            INSERT INTO organizers (eventbrite_id, name, email, access_token, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(eventbrite_id) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                access_token = excluded.access_token,
                updated_at = excluded.updated_at
            RETURNING id, eventbrite_id, name, email, access_token, lang, created_at, updated_at
            "#,
        )
        .bind(organizer.eventbrite_id)
        .bind(organizer.name)
        .bind(organizer.email)
        .bind(organizer.access_token)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn update_lang(pool: &SqlitePool, id: i64, lang: &str) -> AppResult<()> {
        sqlx::query("UPDATE organizers SET lang = ?, updated_at = ? WHERE id = ?")
            .bind(lang)
            .bind(Utc::now().naive_utc())
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(())
    }
}
