use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use crate::db::models::Event;
use crate::db::repository::discount::{delete_discounts, DiscountScope};
use crate::error::{AppError, AppResult};

pub struct EventRepository;

impl EventRepository {
    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> AppResult<Option<Event>> {
        sqlx::query_as::<_, Event>(
            r#"
            SELECT id, external_id, organizer_id, is_active, created_at, updated_at
            FROM events
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_external_id(
        pool: &SqlitePool,
        external_id: &str,
    ) -> AppResult<Option<Event>> {
        sqlx::query_as::<_, Event>(
            r#"
            SELECT id, external_id, organizer_id, is_active, created_at, updated_at
            FROM events
            WHERE external_id = ?
            "#,
        )
        .bind(external_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn list_active_for_organizer(
        pool: &SqlitePool,
        organizer_id: i64,
    ) -> AppResult<Vec<Event>> {
        sqlx::query_as::<_, Event>(
            r#"
            SELECT id, external_id, organizer_id, is_active, created_at, updated_at
            FROM events
            WHERE organizer_id = ? AND is_active = 1
            ORDER BY id
            "#,
        )
        .bind(organizer_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Create the event if it is new, otherwise re-activate it and hand it to `organizer_id`.
    pub async fn activate(
        pool: &SqlitePool,
        external_id: &str,
        organizer_id: i64,
    ) -> AppResult<Event> {
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (external_id, organizer_id, is_active, created_at, updated_at)
            VALUES (?, ?, 1, ?, ?)
            ON CONFLICT(external_id) DO UPDATE SET
                organizer_id = excluded.organizer_id,
                is_active = 1,
                updated_at = excluded.updated_at
            RETURNING id, external_id, organizer_id, is_active, created_at, updated_at
            "#,
        )
        .bind(external_id)
        .bind(organizer_id)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Mark the event inactive and drop its ticket types and every discount attached to it.
    pub async fn deactivate(pool: &SqlitePool, id: i64) -> AppResult<()> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        clear_event(&mut tx, id).await?;

        sqlx::query("UPDATE events SET is_active = 0, updated_at = ? WHERE id = ?")
            .bind(Utc::now().naive_utc())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }

    /// Drop the ticket types and every discount of an event that became free.
    pub async fn clear_ticket_types_and_discounts(pool: &SqlitePool, id: i64) -> AppResult<()> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;
        clear_event(&mut tx, id).await?;
        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }
}

async fn clear_event(conn: &mut SqliteConnection, event_id: i64) -> AppResult<()> {
    delete_discounts(conn, DiscountScope::EventLevel(event_id)).await?;
    delete_discounts(conn, DiscountScope::TicketTypesOfEvent(event_id)).await?;

    sqlx::query("DELETE FROM event_ticket_types WHERE event_id = ?")
        .bind(event_id)
        .execute(&mut *conn)
        .await
        .map_err(AppError::Database)?;

    Ok(())
}
