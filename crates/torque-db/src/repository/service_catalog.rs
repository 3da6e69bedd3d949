//! # Service Catalog Repository
//!
//! Labour items (oil change, tune-up, brake service) that job and
//! reconditioning lines reference by id.

use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

use torque_core::validation::{
    normalize_optional, validate_name, validate_price_cents, validate_search_query,
};
use torque_core::{Clock, NewService, Page, Service, UpdateService};

use super::{fetch_live, like_pattern, soft_delete};
use crate::error::DbResult;

const TABLE: &str = "services";
const ENTITY: &str = "service";

/// Repository for the service catalog.
#[derive(Debug, Clone)]
pub struct ServiceCatalogRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl ServiceCatalogRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        ServiceCatalogRepository { pool, clock }
    }

    pub async fn create(&self, input: NewService) -> DbResult<Service> {
        let name = validate_name("name", &input.name)?;
        validate_price_cents("price", input.price_cents)?;

        debug!(name = %name, "Inserting catalog service");

        let now = self.clock.now();
        let service = sqlx::query_as::<_, Service>(
            r#"
            INSERT INTO services (
                name, description, category_id, price_cents, created_by, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&name)
        .bind(normalize_optional(input.description.as_deref()))
        .bind(input.category_id)
        .bind(input.price_cents)
        .bind(input.created_by)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(service)
    }

    pub async fn get(&self, id: i64) -> DbResult<Service> {
        let mut conn = self.pool.acquire().await?;
        fetch_live(&mut conn, TABLE, ENTITY, id).await
    }

    /// Live catalog entries, alphabetical.
    pub async fn list(&self, page: Page) -> DbResult<Vec<Service>> {
        let services = sqlx::query_as::<_, Service>(
            r#"
            SELECT * FROM services
            WHERE deleted_at IS NULL
            ORDER BY name, id
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(services)
    }

    /// Substring search over name and description, alphabetical.
    pub async fn search(&self, query: &str, page: Page) -> DbResult<Vec<Service>> {
        let query = validate_search_query(query)?;
        let pattern = like_pattern(&query);

        let services = sqlx::query_as::<_, Service>(
            r#"
            SELECT * FROM services
            WHERE deleted_at IS NULL
              AND (name LIKE ?1 ESCAPE '\' OR COALESCE(description, '') LIKE ?1 ESCAPE '\')
            ORDER BY name, id
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(&pattern)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(services)
    }

    pub async fn update(&self, id: i64, input: UpdateService) -> DbResult<Service> {
        let mut tx = self.pool.begin().await?;
        let current: Service = fetch_live(&mut tx, TABLE, ENTITY, id).await?;

        let name = match input.name.as_deref() {
            Some(n) => validate_name("name", n)?,
            None => current.name,
        };
        let price = input.price_cents.unwrap_or(current.price_cents);
        validate_price_cents("price", price)?;

        let service = sqlx::query_as::<_, Service>(
            r#"
            UPDATE services SET name = ?, description = ?, category_id = ?, price_cents = ?,
                updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&name)
        .bind(normalize_optional(input.description.as_deref()).or(current.description))
        .bind(input.category_id.or(current.category_id))
        .bind(price)
        .bind(self.clock.now())
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(service)
    }

    pub async fn delete(&self, id: i64) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        soft_delete(&mut conn, TABLE, ENTITY, id, self.clock.now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{service, setup};
    use torque_core::ErrorKind;

    #[tokio::test]
    async fn test_catalog_crud() {
        let (db, _) = setup().await;
        let tune_up = service(&db, "Tune Up", 75_000).await;
        service(&db, "Oil Change", 30_000).await;

        let updated = db
            .services()
            .update(
                tune_up.id,
                UpdateService {
                    price_cents: Some(80_000),
                    description: Some("Carburettor and spark plug".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.price_cents, 80_000);
        assert_eq!(updated.name, "Tune Up");

        let hits = db.services().search("spark", Page::default()).await.unwrap();
        assert_eq!(hits.len(), 1);

        let all = db.services().search("", Page::default()).await.unwrap();
        let names: Vec<_> = all.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Oil Change", "Tune Up"]);

        db.services().delete(tune_up.id).await.unwrap();
        assert_eq!(
            db.services().get(tune_up.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_negative_price_rejected() {
        let (db, _) = setup().await;
        let err = db
            .services()
            .create(NewService {
                name: "Free?".to_string(),
                price_cents: -1,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
