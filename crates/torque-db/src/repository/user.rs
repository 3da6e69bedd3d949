//! # User Repository
//!
//! Staff accounts: front-desk clerks, technicians, managers.
//!
//! ## Password Storage
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  plain secret ──► Argon2id + random salt ──► PHC string                │
//! │                                               $argon2id$v=19$m=...     │
//! │                                                                         │
//! │  The PHC string carries its own salt and parameters, so verification  │
//! │  only needs the stored hash and the candidate secret.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};

use torque_core::validation::{validate_email, validate_name, validate_password};
use torque_core::{
    ChangePassword, Clock, CoreError, ErrorKind, NewUser, Page, UpdateUser, User, ValidationError,
};

use super::{ensure_unique, fetch_live, require_live, soft_delete};
use crate::error::{DbError, DbResult};

/// Repository for staff accounts.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl UserRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        UserRepository { pool, clock }
    }

    /// Creates a user with a hashed password.
    ///
    /// ## Errors
    /// - `conflict` if a live user already has the email
    /// - `not_found` if `outlet_id` does not name a live outlet
    pub async fn create(&self, input: NewUser) -> DbResult<User> {
        let name = validate_name("name", &input.name)?;
        let email = validate_email(&input.email)?;
        validate_password(&input.password)?;
        let password_hash = hash_password(&input.password)?;

        let mut tx = self.pool.begin().await?;
        ensure_unique(&mut tx, "users", "email", "user", &email, None).await?;
        if let Some(outlet_id) = input.outlet_id {
            require_live(&mut tx, "outlets", "outlet", outlet_id).await?;
        }

        debug!(email = %email, "Inserting user");

        let now = self.clock.now();
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                name, email, password_hash, role, outlet_id, created_by, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&name)
        .bind(&email)
        .bind(&password_hash)
        .bind(input.role.unwrap_or_default())
        .bind(input.outlet_id)
        .bind(input.created_by)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(user_id = user.id, "User created");
        Ok(user)
    }

    pub async fn get(&self, id: i64) -> DbResult<User> {
        let mut conn = self.pool.acquire().await?;
        fetch_live(&mut conn, "users", "user", id).await
    }

    pub async fn get_by_email(&self, email: &str) -> DbResult<User> {
        let email = validate_email(email)?;
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ? AND deleted_at IS NULL")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::not_found("user", email).into())
    }

    /// Lists users, optionally only those attached to `outlet_id`.
    pub async fn list(&self, outlet_id: Option<i64>, page: Page) -> DbResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE deleted_at IS NULL AND (?1 IS NULL OR outlet_id = ?1)
            ORDER BY created_at DESC, id DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(outlet_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    pub async fn update(&self, id: i64, input: UpdateUser) -> DbResult<User> {
        let mut tx = self.pool.begin().await?;
        let current: User = fetch_live(&mut tx, "users", "user", id).await?;

        let name = match input.name.as_deref() {
            Some(n) => validate_name("name", n)?,
            None => current.name,
        };
        let email = match input.email.as_deref() {
            Some(e) => {
                let e = validate_email(e)?;
                ensure_unique(&mut tx, "users", "email", "user", &e, Some(id)).await?;
                e
            }
            None => current.email,
        };
        if let Some(outlet_id) = input.outlet_id {
            require_live(&mut tx, "outlets", "outlet", outlet_id).await?;
        }

        debug!(id, "Updating user");

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET name = ?, email = ?, role = ?, outlet_id = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&name)
        .bind(&email)
        .bind(input.role.unwrap_or(current.role))
        .bind(input.outlet_id.or(current.outlet_id))
        .bind(self.clock.now())
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(user)
    }

    pub async fn delete(&self, id: i64) -> DbResult<()> {
        debug!(id, "Soft-deleting user");
        let mut conn = self.pool.acquire().await?;
        soft_delete(&mut conn, "users", "user", id, self.clock.now()).await
    }

    /// Replaces the password after verifying the current one.
    ///
    /// ## Errors
    /// - `invalid_input` if `current_password` does not match
    pub async fn change_password(&self, id: i64, input: ChangePassword) -> DbResult<()> {
        validate_password(&input.new_password)?;

        let mut tx = self.pool.begin().await?;
        let user: User = fetch_live(&mut tx, "users", "user", id).await?;

        if !verify_password(&input.current_password, &user.password_hash) {
            return Err(ValidationError::Invalid {
                field: "current_password".to_string(),
                reason: "does not match".to_string(),
            }
            .into());
        }

        let new_hash = hash_password(&input.new_password)?;
        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(&new_hash)
            .bind(self.clock.now())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(user_id = id, "Password changed");
        Ok(())
    }

    /// Returns the user if `email` and `password` match a live account.
    pub async fn verify_credentials(&self, email: &str, password: &str) -> DbResult<Option<User>> {
        let user = match self.get_by_email(email).await {
            Ok(user) => user,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::InvalidInput) => {
                return Ok(None)
            }
            Err(e) => return Err(e),
        };

        Ok(verify_password(password, &user.password_hash).then_some(user))
    }
}

// =============================================================================
// Password Hashing
// =============================================================================

/// Hashes a password with Argon2id and a random salt.
pub(crate) fn hash_password(password: &str) -> DbResult<String> {
    use argon2::{
        password_hash::{rand_core::OsRng, SaltString},
        Argon2, PasswordHasher,
    };

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| DbError::Internal(format!("Failed to hash password: {}", e)))?;

    Ok(hash.to_string())
}

/// Checks a password against a stored PHC hash. Malformed hashes never match.
pub(crate) fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};

    let parsed = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
