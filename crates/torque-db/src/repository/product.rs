//! # Product Repository
//!
//! Database operations for products and the authoritative stock counter.
//!
//! ## Stock Counter
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    How Stock Changes                                    │
//! │                                                                         │
//! │  Every mutation is one conditional UPDATE, never read-then-write:      │
//! │                                                                         │
//! │    UPDATE products SET stock = stock + :delta                          │
//! │    WHERE id = :id AND stock + :delta >= 0                              │
//! │                                                                         │
//! │  Two terminals deducting the last unit at the same time:               │
//! │    Terminal A: rows_affected = 1  → stock 1 → 0                        │
//! │    Terminal B: rows_affected = 0  → insufficient_stock, nothing written│
//! │                                                                         │
//! │  Serialised products: stock = count(serials WHERE status=available),   │
//! │  so only serial operations move it; update_stock refuses them.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};

use torque_core::validation::{
    normalize_optional, validate_code, validate_name, validate_price_cents, validate_search_query,
};
use torque_core::{
    Clock, CoreError, NewProduct, Page, Product, ProductFilter, UpdateProduct, ValidationError,
};

use super::{ensure_unique, fetch_deleted, fetch_live, like_pattern, soft_delete, undelete};
use crate::error::DbResult;

const TABLE: &str = "products";
const ENTITY: &str = "product";

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
///
/// let results = repo.search("oil", Page::default()).await?;
/// let product = repo.update_stock(product_id, -2).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        ProductRepository { pool, clock }
    }

    /// Creates a product.
    ///
    /// A serialised product starts at stock 0; its stock then follows the
    /// serial numbers registered for it.
    ///
    /// ## Errors
    /// - `conflict` if the SKU or barcode is held by a live product
    pub async fn create(&self, input: NewProduct) -> DbResult<Product> {
        let name = validate_name("name", &input.name)?;
        let sku = optional_code("sku", input.sku.as_deref())?;
        let barcode = optional_code("barcode", input.barcode.as_deref())?;
        validate_price_cents("cost_price", input.cost_price_cents)?;
        validate_price_cents("selling_price", input.selling_price_cents)?;

        let stock = input.stock.unwrap_or(0);
        if stock < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: "stock".to_string(),
            }
            .into());
        }
        if input.has_serial && stock != 0 {
            return Err(ValidationError::Invalid {
                field: "stock".to_string(),
                reason: "serialised products take their stock from serial numbers".to_string(),
            }
            .into());
        }

        let mut tx = self.pool.begin().await?;
        if let Some(sku) = &sku {
            ensure_unique(&mut tx, TABLE, "sku", ENTITY, sku, None).await?;
        }
        if let Some(barcode) = &barcode {
            ensure_unique(&mut tx, TABLE, "barcode", ENTITY, barcode, None).await?;
        }

        debug!(name = %name, sku = ?sku, "Inserting product");

        let now = self.clock.now();
        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (
                name, sku, barcode, category_id, supplier_id, cost_price_cents,
                selling_price_cents, stock, has_serial, is_active, usage,
                created_by, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&name)
        .bind(&sku)
        .bind(&barcode)
        .bind(input.category_id)
        .bind(input.supplier_id)
        .bind(input.cost_price_cents)
        .bind(input.selling_price_cents)
        .bind(stock)
        .bind(input.has_serial)
        .bind(input.is_active.unwrap_or(true))
        .bind(input.usage.unwrap_or_default())
        .bind(input.created_by)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(product)
    }

    /// Gets a product by its ID.
    pub async fn get(&self, id: i64) -> DbResult<Product> {
        let mut conn = self.pool.acquire().await?;
        fetch_live(&mut conn, TABLE, ENTITY, id).await
    }

    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Product> {
        self.get_by_code("sku", sku).await
    }

    pub async fn get_by_barcode(&self, barcode: &str) -> DbResult<Product> {
        self.get_by_code("barcode", barcode).await
    }

    async fn get_by_code(&self, column: &'static str, value: &str) -> DbResult<Product> {
        let value = validate_code(column, value)?;
        let sql = format!(
            "SELECT * FROM products WHERE {} = ? AND deleted_at IS NULL",
            column
        );

        sqlx::query_as::<_, Product>(&sql)
            .bind(&value)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::not_found(ENTITY, value).into())
    }

    /// Lists products filtered by category, supplier and usage tag.
    pub async fn list(&self, filter: ProductFilter, page: Page) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE deleted_at IS NULL
              AND (?1 IS NULL OR category_id = ?1)
              AND (?2 IS NULL OR supplier_id = ?2)
              AND (?3 IS NULL OR usage = ?3)
            ORDER BY name, id
            LIMIT ?4 OFFSET ?5
            "#,
        )
        .bind(filter.category_id)
        .bind(filter.supplier_id)
        .bind(filter.usage)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Searches products by substring over name, SKU and barcode.
    ///
    /// ## Arguments
    /// * `query` - Search term (can be partial, empty lists everything)
    /// * `page` - Limit and offset
    pub async fn search(&self, query: &str, page: Page) -> DbResult<Vec<Product>> {
        let query = validate_search_query(query)?;
        let pattern = like_pattern(&query);

        debug!(query = %query, limit = page.limit, "Searching products");

        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE deleted_at IS NULL
              AND (name LIKE ?1 ESCAPE '\' OR COALESCE(sku, '') LIKE ?1 ESCAPE '\'
                   OR COALESCE(barcode, '') LIKE ?1 ESCAPE '\')
            ORDER BY created_at DESC, id DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(&pattern)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = products.len(), "Search returned products");
        Ok(products)
    }

    /// Updates product metadata. Stock is only changed through
    /// [`update_stock`](Self::update_stock) and serial operations.
    pub async fn update(&self, id: i64, input: UpdateProduct) -> DbResult<Product> {
        let mut tx = self.pool.begin().await?;
        let current: Product = fetch_live(&mut tx, TABLE, ENTITY, id).await?;

        let name = match input.name.as_deref() {
            Some(n) => validate_name("name", n)?,
            None => current.name,
        };
        let sku = match optional_code("sku", input.sku.as_deref())? {
            Some(sku) => {
                ensure_unique(&mut tx, TABLE, "sku", ENTITY, &sku, Some(id)).await?;
                Some(sku)
            }
            None => current.sku,
        };
        let barcode = match optional_code("barcode", input.barcode.as_deref())? {
            Some(barcode) => {
                ensure_unique(&mut tx, TABLE, "barcode", ENTITY, &barcode, Some(id)).await?;
                Some(barcode)
            }
            None => current.barcode,
        };
        let cost = input.cost_price_cents.unwrap_or(current.cost_price_cents);
        let price = input.selling_price_cents.unwrap_or(current.selling_price_cents);
        validate_price_cents("cost_price", cost)?;
        validate_price_cents("selling_price", price)?;

        debug!(id, "Updating product");

        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET
                name = ?, sku = ?, barcode = ?, category_id = ?, supplier_id = ?,
                cost_price_cents = ?, selling_price_cents = ?, is_active = ?, usage = ?,
                updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&name)
        .bind(&sku)
        .bind(&barcode)
        .bind(input.category_id.or(current.category_id))
        .bind(input.supplier_id.or(current.supplier_id))
        .bind(cost)
        .bind(price)
        .bind(input.is_active.unwrap_or(current.is_active))
        .bind(input.usage.unwrap_or(current.usage))
        .bind(self.clock.now())
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(product)
    }

    /// Applies a signed stock delta.
    ///
    /// ## Errors
    /// - `insufficient_stock` if the result would be negative (nothing is written)
    /// - `invalid_state` for serialised products
    pub async fn update_stock(&self, id: i64, delta: i64) -> DbResult<Product> {
        let mut tx = self.pool.begin().await?;
        let product: Product = fetch_live(&mut tx, TABLE, ENTITY, id).await?;

        if product.has_serial {
            return Err(CoreError::invalid_state(format!(
                "stock of serialised product {} follows its serial numbers",
                id
            ))
            .into());
        }

        let updated = adjust_stock_in(&mut tx, id, delta, self.clock.now()).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Active products with `stock <= threshold`, lowest stock first.
    pub async fn low_stock(&self, threshold: i64) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE deleted_at IS NULL AND is_active = 1 AND stock <= ?
            ORDER BY stock, name
            "#,
        )
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    pub async fn delete(&self, id: i64) -> DbResult<()> {
        debug!(id, "Soft-deleting product");
        let mut conn = self.pool.acquire().await?;
        soft_delete(&mut conn, TABLE, ENTITY, id, self.clock.now()).await
    }

    /// Administrative restore; SKU and barcode must still be free.
    pub async fn restore(&self, id: i64) -> DbResult<Product> {
        let mut tx = self.pool.begin().await?;
        let deleted: Product = fetch_deleted(&mut tx, TABLE, ENTITY, id).await?;

        if let Some(sku) = &deleted.sku {
            ensure_unique(&mut tx, TABLE, "sku", ENTITY, sku, Some(id)).await?;
        }
        if let Some(barcode) = &deleted.barcode {
            ensure_unique(&mut tx, TABLE, "barcode", ENTITY, barcode, Some(id)).await?;
        }
        undelete(&mut tx, TABLE, id, self.clock.now()).await?;
        let restored: Product = fetch_live(&mut tx, TABLE, ENTITY, id).await?;

        tx.commit().await?;
        info!(product_id = id, "Product restored");
        Ok(restored)
    }
}

fn optional_code(field: &str, value: Option<&str>) -> DbResult<Option<String>> {
    match normalize_optional(value) {
        Some(v) => Ok(Some(validate_code(field, &v)?)),
        None => Ok(None),
    }
}

// =============================================================================
// In-transaction stock mutations
// =============================================================================

/// Strict signed stock change inside an open transaction.
///
/// ## Errors
/// - `not_found` if the product is missing or deleted
/// - `insufficient_stock` if the result would be negative
pub(crate) async fn adjust_stock_in(
    conn: &mut SqliteConnection,
    product_id: i64,
    delta: i64,
    now: DateTime<Utc>,
) -> DbResult<Product> {
    debug!(product_id, delta, "Updating stock");

    let updated = sqlx::query_as::<_, Product>(
        r#"
        UPDATE products SET stock = stock + ?1, updated_at = ?2
        WHERE id = ?3 AND deleted_at IS NULL AND stock + ?1 >= 0
        RETURNING *
        "#,
    )
    .bind(delta)
    .bind(now)
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?;

    match updated {
        Some(product) => Ok(product),
        None => {
            let product: Product = fetch_live(conn, TABLE, ENTITY, product_id).await?;
            Err(CoreError::InsufficientStock {
                product_id,
                available: product.stock,
                requested: -delta,
            }
            .into())
        }
    }
}

/// Deducts `quantity` if that much is on hand. Returns whether it did.
///
/// Leaves stock untouched when there is not enough; the caller decides
/// whether that is an error.
pub(crate) async fn try_deduct_in(
    conn: &mut SqliteConnection,
    product_id: i64,
    quantity: i64,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE products SET stock = stock - ?1, updated_at = ?2
        WHERE id = ?3 AND deleted_at IS NULL AND stock >= ?1
        "#,
    )
    .bind(quantity)
    .bind(now)
    .bind(product_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{product, setup};
    use torque_core::{ErrorKind, ProductUsage};

    #[tokio::test]
    async fn test_sku_and_barcode_unique_among_live() {
        let (db, _) = setup().await;
        let first = db
            .products()
            .create(NewProduct {
                name: "Engine Oil 1L".to_string(),
                sku: Some("OIL-1L".to_string()),
                barcode: Some("899100".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let dup_sku = db
            .products()
            .create(NewProduct {
                name: "Other".to_string(),
                sku: Some("OIL-1L".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(dup_sku.kind(), ErrorKind::Conflict);

        let dup_barcode = db
            .products()
            .create(NewProduct {
                name: "Other".to_string(),
                barcode: Some("899100".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(dup_barcode.kind(), ErrorKind::Conflict);

        assert_eq!(db.products().get_by_sku("OIL-1L").await.unwrap().id, first.id);
        assert_eq!(db.products().get_by_barcode("899100").await.unwrap().id, first.id);

        db.products().delete(first.id).await.unwrap();
        db.products()
            .create(NewProduct {
                name: "Engine Oil 1L v2".to_string(),
                sku: Some("OIL-1L".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(
            db.products().restore(first.id).await.unwrap_err().kind(),
            ErrorKind::Conflict
        );
    }

    #[tokio::test]
    async fn test_update_stock_never_negative() {
        let (db, _) = setup().await;
        let p = product(&db, "Spark Plug", 3, 1_000, 2_500).await;

        let after = db.products().update_stock(p.id, -2).await.unwrap();
        assert_eq!(after.stock, 1);

        let err = db.products().update_stock(p.id, -2).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(db.products().get(p.id).await.unwrap().stock, 1);

        assert_eq!(db.products().update_stock(p.id, 10).await.unwrap().stock, 11);
    }

    #[tokio::test]
    async fn test_serialised_product_rejects_manual_stock() {
        let (db, _) = setup().await;
        let p = db
            .products()
            .create(NewProduct {
                name: "Battery".to_string(),
                has_serial: true,
                ..Default::default()
            })
            .await
            .unwrap();

        let err = db.products().update_stock(p.id, 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let err = db
            .products()
            .create(NewProduct {
                name: "Battery 2".to_string(),
                has_serial: true,
                stock: Some(4),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_low_stock_and_filters() {
        let (db, _) = setup().await;
        product(&db, "Filter", 2, 0, 0).await;
        product(&db, "Gasket", 50, 0, 0).await;
        let inactive = db
            .products()
            .create(NewProduct {
                name: "Old Part".to_string(),
                stock: Some(0),
                is_active: Some(false),
                usage: Some(ProductUsage::Damaged),
                ..Default::default()
            })
            .await
            .unwrap();

        let low = db.products().low_stock(5).await.unwrap();
        let names: Vec<_> = low.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Filter"]);

        let damaged = db
            .products()
            .list(
                ProductFilter {
                    usage: Some(ProductUsage::Damaged),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(damaged.len(), 1);
        assert_eq!(damaged[0].id, inactive.id);

        assert_eq!(db.products().search("GASK", Page::default()).await.unwrap().len(), 1);
    }
}
