use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use crate::db::models::discount::DiscountRow;
use crate::db::models::{Discount, DiscountTarget, NewDiscount};
use crate::error::{AppError, AppResult};

/// Which discounts a cascading delete applies to.
#[derive(Debug, Clone, Copy)]
pub(crate) enum DiscountScope {
    Discount(i64),
    /// The event-wide discount of an event.
    EventLevel(i64),
    /// Every ticket-type discount of an event.
    TicketTypesOfEvent(i64),
    TicketType(i64),
}

impl DiscountScope {
    fn filter(self) -> (&'static str, i64) {
        match self {
            DiscountScope::Discount(id) => ("d.id = ?", id),
            DiscountScope::EventLevel(id) => ("d.event_id = ?", id),
            DiscountScope::TicketTypesOfEvent(id) => (
                "d.ticket_type_id IN (SELECT id FROM event_ticket_types WHERE event_id = ?)",
                id,
            ),
            DiscountScope::TicketType(id) => ("d.ticket_type_id = ?", id),
        }
    }
}

/// Delete the discounts in `scope` with their codes and member codes.
/// Runs on a connection so callers can wrap it in their transaction.
pub(crate) async fn delete_discounts(
    conn: &mut SqliteConnection,
    scope: DiscountScope,
) -> AppResult<u64> {
    let (filter, id) = scope.filter();

    let members_sql = format!(
        "DELETE FROM member_discount_codes WHERE discount_code_id IN \
         (SELECT c.id FROM discount_codes c JOIN discounts d ON d.id = c.discount_id WHERE {})",
        filter
    );
    let codes_sql = format!(
        "DELETE FROM discount_codes WHERE discount_id IN (SELECT d.id FROM discounts d WHERE {})",
        filter
    );
    let discounts_sql = format!(
        "DELETE FROM discounts WHERE id IN (SELECT d.id FROM discounts d WHERE {})",
        filter
    );

    for sql in [&members_sql, &codes_sql] {
        sqlx::query(sql)
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(AppError::Database)?;
    }

    let result = sqlx::query(&discounts_sql)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(AppError::Database)?;

    Ok(result.rows_affected())
}

fn into_discount(row: DiscountRow) -> AppResult<Discount> {
    Discount::try_from(row).map_err(|e| AppError::Database(sqlx::Error::Decode(e.into())))
}

async fn insert(
    conn: &mut SqliteConnection,
    target: DiscountTarget,
    discount: &NewDiscount,
) -> AppResult<Discount> {
    let now = Utc::now().naive_utc();

    let row = sqlx::query_as::<_, DiscountRow>(
        r#"
        INSERT INTO discounts (name, value, value_type, target_kind, event_id, ticket_type_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id, name, value, value_type, target_kind, event_id, ticket_type_id, created_at, updated_at
        "#,
    )
    .bind(&discount.name)
    .bind(discount.value)
    .bind(discount.value_type.as_str())
    .bind(target.kind())
    .bind(target.event_id())
    .bind(target.ticket_type_id())
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
    .map_err(AppError::Database)?;

    into_discount(row)
}

pub struct DiscountRepository;

impl DiscountRepository {
    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> AppResult<Option<Discount>> {
        sqlx::query_as::<_, DiscountRow>(
            r#"
            SELECT id, name, value, value_type, target_kind, event_id, ticket_type_id, created_at, updated_at
            FROM discounts
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?
        .map(into_discount)
        .transpose()
    }

    /// The event-wide discount of an event, if any.
    pub async fn find_for_event(pool: &SqlitePool, event_id: i64) -> AppResult<Option<Discount>> {
        sqlx::query_as::<_, DiscountRow>(
            r#"
            SELECT id, name, value, value_type, target_kind, event_id, ticket_type_id, created_at, updated_at
            FROM discounts
            WHERE event_id = ?
            "#,
        )
        .bind(event_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?
        .map(into_discount)
        .transpose()
    }

    pub async fn find_for_ticket_type(
        pool: &SqlitePool,
        ticket_type_id: i64,
    ) -> AppResult<Option<Discount>> {
        sqlx::query_as::<_, DiscountRow>(
            r#"
            SELECT id, name, value, value_type, target_kind, event_id, ticket_type_id, created_at, updated_at
            FROM discounts
            WHERE ticket_type_id = ?
            "#,
        )
        .bind(ticket_type_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?
        .map(into_discount)
        .transpose()
    }

    /// Every ticket-type discount of an event.
    pub async fn list_ticket_type_discounts(
        pool: &SqlitePool,
        event_id: i64,
    ) -> AppResult<Vec<Discount>> {
        sqlx::query_as::<_, DiscountRow>(
            r#"
            SELECT d.id, d.name, d.value, d.value_type, d.target_kind, d.event_id, d.ticket_type_id,
                   d.created_at, d.updated_at
            FROM discounts d
            JOIN event_ticket_types t ON t.id = d.ticket_type_id
            WHERE t.event_id = ?
            ORDER BY d.id
            "#,
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?
        .into_iter()
        .map(into_discount)
        .collect()
    }

    /// Create the event-wide discount, replacing any ticket-type discounts of the event.
    pub async fn create_for_event(
        pool: &SqlitePool,
        event_id: i64,
        discount: &NewDiscount,
    ) -> AppResult<Discount> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        let removed = delete_discounts(&mut tx, DiscountScope::TicketTypesOfEvent(event_id)).await?;
        let created = insert(&mut tx, DiscountTarget::Event(event_id), discount).await?;

        tx.commit().await.map_err(AppError::Database)?;

        if removed > 0 {
            tracing::debug!(
                "Replaced {} ticket type discount(s) of event {} with discount {}",
                removed,
                event_id,
                created.id
            );
        }
        Ok(created)
    }

    /// Create a ticket-type discount, replacing the event-wide discount of its event.
    pub async fn create_for_ticket_type(
        pool: &SqlitePool,
        event_id: i64,
        ticket_type_id: i64,
        discount: &NewDiscount,
    ) -> AppResult<Discount> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        let removed = delete_discounts(&mut tx, DiscountScope::EventLevel(event_id)).await?;
        let created = insert(&mut tx, DiscountTarget::TicketType(ticket_type_id), discount).await?;

        tx.commit().await.map_err(AppError::Database)?;

        if removed > 0 {
            tracing::debug!(
                "Replaced event discount of event {} with ticket type discount {}",
                event_id,
                created.id
            );
        }
        Ok(created)
    }

    pub async fn update(pool: &SqlitePool, id: i64, discount: &NewDiscount) -> AppResult<Discount> {
        let row = sqlx::query_as::<_, DiscountRow>(
            r#"
            UPDATE discounts
            SET name = ?, value = ?, value_type = ?, updated_at = ?
            WHERE id = ?
            RETURNING id, name, value, value_type, target_kind, event_id, ticket_type_id, created_at, updated_at
            "#,
        )
        .bind(&discount.name)
        .bind(discount.value)
        .bind(discount.value_type.as_str())
        .bind(Utc::now().naive_utc())
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("discount {}", id)))?;

        into_discount(row)
    }

    /// Delete a discount with its codes and member codes.
    pub async fn delete(pool: &SqlitePool, id: i64) -> AppResult<()> {
        Self::delete_scope(pool, DiscountScope::Discount(id)).await
    }

    pub async fn delete_for_ticket_type(pool: &SqlitePool, ticket_type_id: i64) -> AppResult<()> {
        Self::delete_scope(pool, DiscountScope::TicketType(ticket_type_id)).await
    }

    async fn delete_scope(pool: &SqlitePool, scope: DiscountScope) -> AppResult<()> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;
        delete_discounts(&mut tx, scope).await?;
        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::DiscountValueType;
    use crate::db::repository::{
        DiscountCodeRepository, EventRepository, MemberDiscountCodeRepository, TicketTypeRepository,
    };
    use crate::db::{test_organizer, test_pool};

    fn percentage(value: f64) -> NewDiscount {
        NewDiscount {
            name: "Members".into(),
            value,
            value_type: DiscountValueType::Percentage,
        }
    }

    #[tokio::test]
    async fn event_discount_replaces_ticket_type_discounts() {
        let pool = test_pool().await;
        let organizer = test_organizer(&pool, "eb-1").await;
        let event = EventRepository::activate(&pool, "555", organizer.id).await.unwrap();
        let t1 = TicketTypeRepository::ensure(&pool, event.id, "t-1").await.unwrap();
        let t2 = TicketTypeRepository::ensure(&pool, event.id, "t-2").await.unwrap();
        DiscountRepository::create_for_ticket_type(&pool, event.id, t1.id, &percentage(10.0))
            .await
            .unwrap();
        DiscountRepository::create_for_ticket_type(&pool, event.id, t2.id, &percentage(15.0))
            .await
            .unwrap();

        let created = DiscountRepository::create_for_event(&pool, event.id, &percentage(20.0))
            .await
            .unwrap();

        assert_eq!(created.target, DiscountTarget::Event(event.id));
        assert!(DiscountRepository::list_ticket_type_discounts(&pool, event.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn ticket_type_discount_replaces_event_discount() {
        let pool = test_pool().await;
        let organizer = test_organizer(&pool, "eb-1").await;
        let event = EventRepository::activate(&pool, "555", organizer.id).await.unwrap();
        let ticket = TicketTypeRepository::ensure(&pool, event.id, "t-1").await.unwrap();
        let event_discount = DiscountRepository::create_for_event(&pool, event.id, &percentage(20.0))
            .await
            .unwrap();
        let code = DiscountCodeRepository::get_or_create(&pool, event_discount.id, "555-1234")
            .await
            .unwrap();
        MemberDiscountCodeRepository::create(&pool, code.id, "1234").await.unwrap();

        DiscountRepository::create_for_ticket_type(&pool, event.id, ticket.id, &percentage(10.0))
            .await
            .unwrap();

        assert!(DiscountRepository::find_for_event(&pool, event.id).await.unwrap().is_none());
        assert!(DiscountCodeRepository::find_by_id(&pool, code.id).await.unwrap().is_none());
        assert!(MemberDiscountCodeRepository::list_for_code(&pool, code.id)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            DiscountRepository::list_ticket_type_discounts(&pool, event.id)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn update_changes_fields_in_place() {
        let pool = test_pool().await;
        let organizer = test_organizer(&pool, "eb-1").await;
        let event = EventRepository::activate(&pool, "555", organizer.id).await.unwrap();
        let created = DiscountRepository::create_for_event(&pool, event.id, &percentage(20.0))
            .await
            .unwrap();

        let updated = DiscountRepository::update(
            &pool,
            created.id,
            &NewDiscount {
                name: "Flat".into(),
                value: 5.0,
                value_type: DiscountValueType::Fixed,
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.value_type, DiscountValueType::Fixed);
        assert_eq!(updated.target, created.target);
    }

    #[tokio::test]
    async fn only_one_discount_per_ticket_type() {
        let pool = test_pool().await;
        let organizer = test_organizer(&pool, "eb-1").await;
        let event = EventRepository::activate(&pool, "555", organizer.id).await.unwrap();
        let ticket = TicketTypeRepository::ensure(&pool, event.id, "t-1").await.unwrap();
        DiscountRepository::create_for_ticket_type(&pool, event.id, ticket.id, &percentage(10.0))
            .await
            .unwrap();

        let second =
            DiscountRepository::create_for_ticket_type(&pool, event.id, ticket.id, &percentage(10.0))
                .await;
        assert!(matches!(second, Err(AppError::Database(_))));
    }
}
