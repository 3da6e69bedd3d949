//! # Outlet Repository
//!
//! Workshop branches. Every service job queue is scoped to one outlet, and
//! the outlet's UTC offset decides which civil day a job is queued on.

use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::debug;

use torque_core::validation::{normalize_optional, validate_name, validate_utc_offset};
use torque_core::{Clock, NewOutlet, Outlet, OutletStatus, Page, UpdateOutlet};

use super::{fetch_live, soft_delete};
use crate::error::DbResult;

/// Repository for outlet operations.
#[derive(Debug, Clone)]
pub struct OutletRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl OutletRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        OutletRepository { pool, clock }
    }

    /// Creates an outlet. Status defaults to active, offset to UTC.
    pub async fn create(&self, input: NewOutlet) -> DbResult<Outlet> {
        let name = validate_name("name", &input.name)?;
        let offset = input.utc_offset_minutes.unwrap_or(0);
        validate_utc_offset(offset)?;

        debug!(name = %name, utc_offset_minutes = offset, "Inserting outlet");

        let now = self.clock.now();
        let outlet = sqlx::query_as::<_, Outlet>(
            r#"
            INSERT INTO outlets (
                name, branch_type, city, contact, status, utc_offset_minutes,
                created_by, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&name)
        .bind(normalize_optional(input.branch_type.as_deref()))
        .bind(normalize_optional(input.city.as_deref()))
        .bind(normalize_optional(input.contact.as_deref()))
        .bind(input.status.unwrap_or_default())
        .bind(offset)
        .bind(input.created_by)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(outlet)
    }

    pub async fn get(&self, id: i64) -> DbResult<Outlet> {
        let mut conn = self.pool.acquire().await?;
        fetch_live(&mut conn, "outlets", "outlet", id).await
    }

    /// Lists outlets, optionally only those with `status`.
    pub async fn list(&self, status: Option<OutletStatus>, page: Page) -> DbResult<Vec<Outlet>> {
        let outlets = sqlx::query_as::<_, Outlet>(
            r#"
            SELECT * FROM outlets
            WHERE deleted_at IS NULL AND (?1 IS NULL OR status = ?1)
            ORDER BY name
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(status)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(outlets)
    }

    pub async fn update(&self, id: i64, input: UpdateOutlet) -> DbResult<Outlet> {
        let mut tx = self.pool.begin().await?;
        let current: Outlet = fetch_live(&mut tx, "outlets", "outlet", id).await?;

        let name = match input.name.as_deref() {
            Some(n) => validate_name("name", n)?,
            None => current.name,
        };
        let offset = input.utc_offset_minutes.unwrap_or(current.utc_offset_minutes);
        validate_utc_offset(offset)?;

        debug!(id, "Updating outlet");

        let outlet = sqlx::query_as::<_, Outlet>(
            r#"
            UPDATE outlets SET
                name = ?, branch_type = ?, city = ?, contact = ?, status = ?,
                utc_offset_minutes = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&name)
        .bind(normalize_optional(input.branch_type.as_deref()).or(current.branch_type))
        .bind(normalize_optional(input.city.as_deref()).or(current.city))
        .bind(normalize_optional(input.contact.as_deref()).or(current.contact))
        .bind(input.status.unwrap_or(current.status))
        .bind(offset)
        .bind(self.clock.now())
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(outlet)
    }

    pub async fn delete(&self, id: i64) -> DbResult<()> {
        debug!(id, "Soft-deleting outlet");
        let mut conn = self.pool.acquire().await?;
        soft_delete(&mut conn, "outlets", "outlet", id, self.clock.now()).await
    }
}

/// UTC offset of a live outlet, in minutes.
pub(crate) async fn utc_offset_in(conn: &mut SqliteConnection, outlet_id: i64) -> DbResult<i32> {
    let outlet: Outlet = fetch_live(conn, "outlets", "outlet", outlet_id).await?;
    Ok(outlet.utc_offset_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup;
    use torque_core::ErrorKind;

    #[tokio::test]
    async fn test_create_and_get_outlet() {
        let (db, _) = setup().await;
        let created = db
            .outlets()
            .create(NewOutlet {
                name: "  North Garage ".to_string(),
                city: Some("Bandung".to_string()),
                utc_offset_minutes: Some(420),
                ..Default::default()
            })
            .await
            .unwrap();

        let fetched = db.outlets().get(created.id).await.unwrap();
        assert_eq!(fetched.name, "North Garage");
        assert_eq!(fetched.city.as_deref(), Some("Bandung"));
        assert_eq!(fetched.utc_offset_minutes, 420);
        assert!(fetched.is_active());
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let (db, _) = setup().await;
        let err = db
            .outlets()
            .create(NewOutlet {
                name: "   ".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_list_by_status_and_delete() {
        let (db, _) = setup().await;
        let a = db
            .outlets()
            .create(NewOutlet {
                name: "A".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        db.outlets()
            .create(NewOutlet {
                name: "B".to_string(),
                status: Some(OutletStatus::Inactive),
                ..Default::default()
            })
            .await
            .unwrap();

        let active = db
            .outlets()
            .list(Some(OutletStatus::Active), Page::default())
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, a.id);

        db.outlets().delete(a.id).await.unwrap();
        assert_eq!(
            db.outlets().get(a.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(db.outlets().list(None, Page::default()).await.unwrap().len(), 1);
    }
}
