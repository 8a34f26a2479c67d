//! Users repository for database operations

use chrono::NaiveDate;
use sqlx::{Pool, Postgres};

use crate::{
    error::{is_unique_violation, AppError, AppResult},
    models::{
        user::{Role, UpdateBorrower, User},
        Pagination,
    },
};

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    /// Find user by email (login lookup)
    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Create a new user
    pub async fn create(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        role: Role,
        registered_date: NaiveDate,
    ) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash, role, registered_date)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .bind(registered_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, Some("users_email_key")) {
                AppError::Conflict("Email already exists".to_string())
            } else {
                e.into()
            }
        })?;

        Ok(user)
    }

    /// List borrowers with optional name/email search
    pub async fn search_borrowers(
        &self,
        q: Option<&str>,
        page: Pagination,
    ) -> AppResult<(Vec<User>, i64)> {
        let (where_clause, pattern) = match q {
            Some(term) => (
                "role = 'BORROWER' AND (name ILIKE $1 OR email ILIKE $1)",
                Some(format!("%{}%", term)),
            ),
            None => ("role = 'BORROWER'", None),
        };

        let count_query = format!("SELECT COUNT(*) FROM users WHERE {}", where_clause);
        let mut count = sqlx::query_scalar::<_, i64>(&count_query);
        if let Some(ref p) = pattern {
            count = count.bind(p);
        }
        let total = count.fetch_one(&self.pool).await?;

        let select_query = format!(
            "SELECT * FROM users WHERE {} ORDER BY name LIMIT {} OFFSET {}",
            where_clause, page.limit, page.offset
        );
        let mut rows = sqlx::query_as::<_, User>(&select_query);
        if let Some(ref p) = pattern {
            rows = rows.bind(p);
        }
        let users = rows.fetch_all(&self.pool).await?;

        Ok((users, total))
    }

    /// Update a borrower record
    pub async fn update_borrower(&self, id: i32, update: &UpdateBorrower) -> AppResult<User> {
        // Build dynamic update query
        let mut sets = Vec::new();
        let mut param_idx = 1;

        macro_rules! add_field {
            ($field:expr, $name:expr) => {
                if $field.is_some() {
                    sets.push(format!("{} = ${}", $name, param_idx));
                    param_idx += 1;
                }
            };
        }

        add_field!(update.name, "name");
        add_field!(update.email, "email");
        add_field!(update.registered_date, "registered_date");

        if sets.is_empty() {
            return self.get_by_id(id).await;
        }

        let query = format!(
            "UPDATE users SET {} WHERE id = ${} AND role = 'BORROWER' RETURNING *",
            sets.join(", "),
            param_idx
        );

        let mut builder = sqlx::query_as::<_, User>(&query);

        macro_rules! bind_field {
            ($field:expr) => {
                if let Some(ref val) = $field {
                    builder = builder.bind(val);
                }
            };
        }

        bind_field!(update.name);
        bind_field!(update.email);
        bind_field!(update.registered_date);

        builder
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e, Some("users_email_key")) {
                    AppError::Conflict("Email already exists".to_string())
                } else {
                    AppError::from(e)
                }
            })?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    /// Delete a borrower. Refused while any loan references the user.
    pub async fn delete_borrower(&self, id: i32) -> AppResult<()> {
        let loan_refs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE user_id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        if loan_refs > 0 {
            return Err(AppError::Conflict(
                "User has loan records and cannot be deleted".to_string(),
            ));
        }

        let result = sqlx::query("DELETE FROM users WHERE id = $1 AND role = 'BORROWER'")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User with id {} not found", id)));
        }

        Ok(())
    }
}
