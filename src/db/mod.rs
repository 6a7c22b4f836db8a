pub mod models;
pub mod repository;

#[cfg(test)]
pub(crate) async fn test_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

#[cfg(test)]
pub(crate) async fn test_organizer(pool: &sqlx::SqlitePool, eventbrite_id: &str) -> models::Organizer {
    repository::OrganizerRepository::upsert(
        pool,
        models::UpsertOrganizer {
            eventbrite_id: eventbrite_id.to_string(),
            name: format!("Organizer {}", eventbrite_id),
            email: format!("{}@example.org", eventbrite_id),
            access_token: format!("token-{}", eventbrite_id),
        },
    )
    .await
    .expect("organizer")
}
