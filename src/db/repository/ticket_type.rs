use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::EventTicketType;
use crate::db::repository::discount::{delete_discounts, DiscountScope};
use crate::error::{AppError, AppResult};

pub struct TicketTypeRepository;

impl TicketTypeRepository {
    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> AppResult<Option<EventTicketType>> {
        sqlx::query_as::<_, EventTicketType>(
            "SELECT id, event_id, external_id, created_at FROM event_ticket_types WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn list_for_event(pool: &SqlitePool, event_id: i64) -> AppResult<Vec<EventTicketType>> {
        sqlx::query_as::<_, EventTicketType>(
            r#"
            SELECT id, event_id, external_id, created_at
            FROM event_ticket_types
            WHERE event_id = ?
            ORDER BY id
            "#,
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Return the local mirror of a ticket class, creating it on first sight.
    pub async fn ensure(
        pool: &SqlitePool,
        event_id: i64,
        external_id: &str,
    ) -> AppResult<EventTicketType> {
        sqlx::query_as::<_, EventTicketType>(
            r#"
            INSERT INTO event_ticket_types (event_id, external_id, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(external_id) DO UPDATE SET event_id = excluded.event_id
            RETURNING id, event_id, external_id, created_at
            "#,
        )
        .bind(event_id)
        .bind(external_id)
        .bind(Utc::now().naive_utc())
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Delete a ticket type together with its discount, codes and member codes.
    pub async fn delete(pool: &SqlitePool, id: i64) -> AppResult<()> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        delete_discounts(&mut tx, DiscountScope::TicketType(id)).await?;

        sqlx::query("DELETE FROM event_ticket_types WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }
}
