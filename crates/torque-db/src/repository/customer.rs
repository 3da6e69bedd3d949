//! # Customer Repository
//!
//! Workshop customers. The phone number is the natural key: no two live
//! customers may share one.

use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};

use torque_core::validation::{
    normalize_optional, validate_email, validate_name, validate_phone, validate_search_query,
};
use torque_core::{Clock, CoreError, Customer, NewCustomer, Page, UpdateCustomer};

use super::{ensure_unique, fetch_deleted, fetch_live, like_pattern, soft_delete, undelete};
use crate::error::DbResult;

/// Repository for customers.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        CustomerRepository { pool, clock }
    }

    /// Creates a customer.
    ///
    /// ## Errors
    /// - `conflict` if a live customer already holds the phone
    pub async fn create(&self, input: NewCustomer) -> DbResult<Customer> {
        let name = validate_name("name", &input.name)?;
        let phone = validate_phone(&input.phone)?;
        let email = match normalize_optional(input.email.as_deref()) {
            Some(e) => Some(validate_email(&e)?),
            None => None,
        };

        let mut tx = self.pool.begin().await?;
        ensure_unique(&mut tx, "customers", "phone", "customer", &phone, None).await?;

        debug!(phone = %phone, "Inserting customer");

        let now = self.clock.now();
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (name, phone, address, email, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&name)
        .bind(&phone)
        .bind(normalize_optional(input.address.as_deref()))
        .bind(email)
        .bind(input.created_by)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(customer)
    }

    pub async fn get(&self, id: i64) -> DbResult<Customer> {
        let mut conn = self.pool.acquire().await?;
        fetch_live(&mut conn, "customers", "customer", id).await
    }

    pub async fn get_by_phone(&self, phone: &str) -> DbResult<Customer> {
        let phone = validate_phone(phone)?;
        sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers WHERE phone = ? AND deleted_at IS NULL",
        )
        .bind(&phone)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CoreError::not_found("customer", phone).into())
    }

    /// Live customers, newest first.
    pub async fn list(&self, page: Page) -> DbResult<Vec<Customer>> {
        let customers = sqlx::query_as::<_, Customer>(
            r#"
            SELECT * FROM customers
            WHERE deleted_at IS NULL
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    /// Case-insensitive substring search over name, phone and address,
    /// newest first. An empty query lists every live customer.
    pub async fn search(&self, query: &str, page: Page) -> DbResult<Vec<Customer>> {
        let query = validate_search_query(query)?;
        let pattern = like_pattern(&query);

        debug!(query = %query, limit = page.limit, "Searching customers");

        let customers = sqlx::query_as::<_, Customer>(
            r#"
            SELECT * FROM customers
            WHERE deleted_at IS NULL
              AND (name LIKE ?1 ESCAPE '\' OR phone LIKE ?1 ESCAPE '\'
                   OR COALESCE(address, '') LIKE ?1 ESCAPE '\')
            ORDER BY created_at DESC, id DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(&pattern)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    /// Updates a customer. A new phone is checked against other live customers.
    pub async fn update(&self, id: i64, input: UpdateCustomer) -> DbResult<Customer> {
        let mut tx = self.pool.begin().await?;
        let current: Customer = fetch_live(&mut tx, "customers", "customer", id).await?;

        let name = match input.name.as_deref() {
            Some(n) => validate_name("name", n)?,
            None => current.name,
        };
        let phone = match input.phone.as_deref() {
            Some(p) => {
                let p = validate_phone(p)?;
                ensure_unique(&mut tx, "customers", "phone", "customer", &p, Some(id)).await?;
                p
            }
            None => current.phone,
        };
        let email = match normalize_optional(input.email.as_deref()) {
            Some(e) => Some(validate_email(&e)?),
            None => current.email,
        };

        debug!(id, "Updating customer");

        let customer = sqlx::query_as::<_, Customer>(
            r#"
            UPDATE customers SET name = ?, phone = ?, address = ?, email = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&name)
        .bind(&phone)
        .bind(normalize_optional(input.address.as_deref()).or(current.address))
        .bind(email)
        .bind(self.clock.now())
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(customer)
    }

    /// Soft-deletes a customer.
    ///
    /// ## Errors
    /// - `integrity` while any live vehicle still belongs to the customer
    pub async fn delete(&self, id: i64) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let _: Customer = fetch_live(&mut tx, "customers", "customer", id).await?;

        let vehicles: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM customer_vehicles WHERE customer_id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if vehicles > 0 {
            return Err(CoreError::Integrity(format!(
                "customer {} still owns {} vehicle(s)",
                id, vehicles
            ))
            .into());
        }

        debug!(id, "Soft-deleting customer");
        soft_delete(&mut tx, "customers", "customer", id, self.clock.now()).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Administrative restore of a soft-deleted customer.
    ///
    /// ## Errors
    /// - `conflict` if another live customer took the phone meanwhile
    pub async fn restore(&self, id: i64) -> DbResult<Customer> {
        let mut tx = self.pool.begin().await?;
        let deleted: Customer = fetch_deleted(&mut tx, "customers", "customer", id).await?;

        ensure_unique(&mut tx, "customers", "phone", "customer", &deleted.phone, Some(id)).await?;
        undelete(&mut tx, "customers", id, self.clock.now()).await?;
        let restored: Customer = fetch_live(&mut tx, "customers", "customer", id).await?;

        tx.commit().await?;
        info!(customer_id = id, "Customer restored");
        Ok(restored)
    }
}
