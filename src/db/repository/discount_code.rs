use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::discount_code::MemberDiscountCodeRow;
use crate::db::models::{DiscountCode, MemberCodeClaim, MemberCodeStatus, MemberDiscountCode};
use crate::error::{AppError, AppResult};

pub struct DiscountCodeRepository;

impl DiscountCodeRepository {
    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> AppResult<Option<DiscountCode>> {
        sqlx::query_as::<_, DiscountCode>(
            "SELECT id, discount_id, code, created_at FROM discount_codes WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Return the code row for `discount_id`, creating it when missing.
    pub async fn get_or_create(
        pool: &SqlitePool,
        discount_id: i64,
        code: &str,
    ) -> AppResult<DiscountCode> {
        sqlx::query_as::<_, DiscountCode>(
            r#"
            INSERT INTO discount_codes (discount_id, code, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(discount_id, code) DO UPDATE SET code = excluded.code
            RETURNING id, discount_id, code, created_at
            "#,
        )
        .bind(discount_id)
        .bind(code)
        .bind(Utc::now().naive_utc())
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Delete a code together with its member codes.
    pub async fn delete(pool: &SqlitePool, id: i64) -> AppResult<()> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        sqlx::query("DELETE FROM member_discount_codes WHERE discount_code_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        sqlx::query("DELETE FROM discount_codes WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }
}

fn into_member_code(row: MemberDiscountCodeRow) -> AppResult<MemberDiscountCode> {
    MemberDiscountCode::try_from(row).map_err(|e| AppError::Database(sqlx::Error::Decode(e.into())))
}

#[derive(sqlx::FromRow)]
struct ClaimRow {
    id: i64,
    discount_code_id: i64,
    member_number: String,
    status: String,
    created_at: chrono::NaiveDateTime,
    updated_at: chrono::NaiveDateTime,
    discount_id: i64,
    code: String,
    code_created_at: chrono::NaiveDateTime,
}

pub struct MemberDiscountCodeRepository;

impl MemberDiscountCodeRepository {
    /// New member codes always start as `Unknown`.
    pub async fn create(
        pool: &SqlitePool,
        discount_code_id: i64,
        member_number: &str,
    ) -> AppResult<MemberDiscountCode> {
        let now = Utc::now().naive_utc();

        let row = sqlx::query_as::<_, MemberDiscountCodeRow>(
            r#"
            INSERT INTO member_discount_codes (discount_code_id, member_number, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, discount_code_id, member_number, status, created_at, updated_at
            "#,
        )
        .bind(discount_code_id)
        .bind(member_number)
        .bind(MemberCodeStatus::Unknown.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        into_member_code(row)
    }

    pub async fn list_for_code(
        pool: &SqlitePool,
        discount_code_id: i64,
    ) -> AppResult<Vec<MemberDiscountCode>> {
        sqlx::query_as::<_, MemberDiscountCodeRow>(
            r#"
            SELECT id, discount_code_id, member_number, status, created_at, updated_at
            FROM member_discount_codes
            WHERE discount_code_id = ?
            ORDER BY id
            "#,
        )
        .bind(discount_code_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?
        .into_iter()
        .map(into_member_code)
        .collect()
    }

    pub async fn update_status(
        pool: &SqlitePool,
        id: i64,
        status: MemberCodeStatus,
    ) -> AppResult<()> {
        sqlx::query("UPDATE member_discount_codes SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().naive_utc())
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(())
    }

    /// Move every still-`Unknown` member of a code to `status`. Terminal rows are left alone.
    pub async fn resolve_unknown_for_code(
        pool: &SqlitePool,
        discount_code_id: i64,
        status: MemberCodeStatus,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE member_discount_codes
            SET status = ?, updated_at = ?
            WHERE discount_code_id = ? AND status = 'unknown'
            "#,
        )
        .bind(status.as_str())
        .bind(Utc::now().naive_utc())
        .bind(discount_code_id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }

    /// The member's live claim (`Unknown` or `Used`) on any discount of the event.
    /// A `Used` claim wins over `Unknown` ones; otherwise the newest is returned.
    pub async fn find_claim_in_event(
        pool: &SqlitePool,
        member_number: &str,
        event_id: i64,
    ) -> AppResult<Option<MemberCodeClaim>> {
        let row = sqlx::query_as::<_, ClaimRow>(
            r#"
            SELECT m.id, m.discount_code_id, m.member_number, m.status, m.created_at, m.updated_at,
                   c.discount_id, c.code, c.created_at AS code_created_at
            FROM member_discount_codes m
            JOIN discount_codes c ON c.id = m.discount_code_id
            JOIN discounts d ON d.id = c.discount_id
            LEFT JOIN event_ticket_types t ON t.id = d.ticket_type_id
            WHERE m.member_number = ?
              AND (d.event_id = ? OR t.event_id = ?)
              AND m.status IN ('unknown', 'used')
            ORDER BY CASE m.status WHEN 'used' THEN 0 ELSE 1 END, m.id DESC
            LIMIT 1
            "#,
        )
        .bind(member_number)
        .bind(event_id)
        .bind(event_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let code = DiscountCode {
            id: row.discount_code_id,
            discount_id: row.discount_id,
            code: row.code,
            created_at: row.code_created_at,
        };
        let member_code = into_member_code(MemberDiscountCodeRow {
            id: row.id,
            discount_code_id: row.discount_code_id,
            member_number: row.member_number,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })?;

        Ok(Some(MemberCodeClaim { member_code, code }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{DiscountValueType, NewDiscount};
    use crate::db::repository::{DiscountRepository, EventRepository, TicketTypeRepository};
    use crate::db::{test_organizer, test_pool};

    async fn setup(pool: &SqlitePool) -> (i64, i64, i64) {
        let organizer = test_organizer(pool, "eb-1").await;
        let event = EventRepository::activate(pool, "555", organizer.id).await.unwrap();
        let ticket = TicketTypeRepository::ensure(pool, event.id, "t-1").await.unwrap();
        let discount = DiscountRepository::create_for_ticket_type(
            pool,
            event.id,
            ticket.id,
            &NewDiscount {
                name: "Members".into(),
                value: 20.0,
                value_type: DiscountValueType::Percentage,
            },
        )
        .await
        .unwrap();
        (event.id, ticket.id, discount.id)
    }

    #[tokio::test]
    async fn get_or_create_reuses_code() {
        let pool = test_pool().await;
        let (_, _, discount_id) = setup(&pool).await;

        let a = DiscountCodeRepository::get_or_create(&pool, discount_id, "555-1234").await.unwrap();
        let b = DiscountCodeRepository::get_or_create(&pool, discount_id, "555-1234").await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn claim_lookup_prefers_used_and_ignores_canceled() {
        let pool = test_pool().await;
        let (event_id, _, discount_id) = setup(&pool).await;

        let first = DiscountCodeRepository::get_or_create(&pool, discount_id, "555-1234").await.unwrap();
        let used = MemberDiscountCodeRepository::create(&pool, first.id, "1234").await.unwrap();
        MemberDiscountCodeRepository::update_status(&pool, used.id, MemberCodeStatus::Used)
            .await
            .unwrap();

        let second = DiscountCodeRepository::get_or_create(&pool, discount_id, "555-1234_99").await.unwrap();
        let canceled = MemberDiscountCodeRepository::create(&pool, second.id, "1234").await.unwrap();
        MemberDiscountCodeRepository::update_status(&pool, canceled.id, MemberCodeStatus::Canceled)
            .await
            .unwrap();
        MemberDiscountCodeRepository::create(&pool, second.id, "99").await.unwrap();

        let claim = MemberDiscountCodeRepository::find_claim_in_event(&pool, "1234", event_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claim.member_code.id, used.id);
        assert_eq!(claim.code.code, "555-1234");

        assert!(MemberDiscountCodeRepository::find_claim_in_event(&pool, "1234", event_id + 1)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn resolve_unknown_leaves_terminal_rows() {
        let pool = test_pool().await;
        let (_, _, discount_id) = setup(&pool).await;
        let code = DiscountCodeRepository::get_or_create(&pool, discount_id, "555-1_2").await.unwrap();
        let a = MemberDiscountCodeRepository::create(&pool, code.id, "1").await.unwrap();
        MemberDiscountCodeRepository::create(&pool, code.id, "2").await.unwrap();
        MemberDiscountCodeRepository::update_status(&pool, a.id, MemberCodeStatus::Canceled)
            .await
            .unwrap();

        let changed = MemberDiscountCodeRepository::resolve_unknown_for_code(
            &pool,
            code.id,
            MemberCodeStatus::Used,
        )
        .await
        .unwrap();

        assert_eq!(changed, 1);
        let statuses: Vec<_> = MemberDiscountCodeRepository::list_for_code(&pool, code.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.status)
            .collect();
        assert_eq!(statuses, vec![MemberCodeStatus::Canceled, MemberCodeStatus::Used]);
    }

    #[tokio::test]
    async fn delete_removes_members() {
        let pool = test_pool().await;
        let (_, _, discount_id) = setup(&pool).await;
        let code = DiscountCodeRepository::get_or_create(&pool, discount_id, "555-1").await.unwrap();
        MemberDiscountCodeRepository::create(&pool, code.id, "1").await.unwrap();

        DiscountCodeRepository::delete(&pool, code.id).await.unwrap();

        assert!(DiscountCodeRepository::find_by_id(&pool, code.id).await.unwrap().is_none());
        assert!(MemberDiscountCodeRepository::list_for_code(&pool, code.id)
            .await
            .unwrap()
            .is_empty());
    }
}
