//! Loans repository: the checkout/return ledger
//!
//! All availability arithmetic happens inside a single transaction holding a
//! row-exclusive lock on the book (`SELECT ... FOR UPDATE`). Multiple server
//! processes may share the database, so no in-process lock is involved; the
//! book row lock is the sole serialization point for a book's counter.

use chrono::NaiveDate;
use sqlx::{Pool, Postgres};

use crate::{
    error::{is_unique_violation, AppError, AppResult},
    models::loan::{Checkout, CheckoutOutcome, Loan, LoanDetails, LoanDetailsRow},
};

const LOAN_DETAILS_SELECT: &str = r#"
    SELECT l.id, l.book_id, l.user_id, l.due_date, l.returned_at, l.created_at,
           b.title AS book_title, b.author AS book_author, b.isbn AS book_isbn,
           u.name AS borrower_name, u.email AS borrower_email
    FROM loans l
    JOIN books b ON b.id = l.book_id
    JOIN users u ON u.id = l.user_id
"#;

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Check out a book: create the loan and decrement the availability
    /// counter in one atomic unit of work.
    ///
    /// Invariants upheld here:
    /// - the counter never goes below zero: the check and the decrement run
    ///   under the same book row lock, so two checkouts racing for the last
    ///   copy resolve to exactly one success and one conflict;
    /// - at most one loan exists per idempotency key: a replay returns the
    ///   stored loan without touching the counter.
    pub async fn checkout(&self, checkout: &Checkout) -> AppResult<CheckoutOutcome> {
        let mut tx = self.pool.begin().await?;

        // Lock the book row first; every concurrent checkout or return for
        // this book queues behind it. Dropping the transaction on any error
        // path below rolls everything back.
        let available: i32 = sqlx::query_scalar(
            "SELECT available_quantity FROM books WHERE id = $1 FOR UPDATE",
        )
        .bind(checkout.book_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;

        let borrower_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(checkout.user_id)
                .fetch_one(&mut *tx)
                .await?;
        if !borrower_exists {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        // Replayed keyed checkout: return the original loan untouched. The
        // lookup runs under the book lock, so it cannot miss a concurrent
        // first submission against the same book.
        if let Some(ref key) = checkout.idempotency_key {
            let existing =
                sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE idempotency_key = $1")
                    .bind(key)
                    .fetch_optional(&mut *tx)
                    .await?;
            if let Some(loan) = existing {
                tx.rollback().await?;
                return Ok(CheckoutOutcome::Existing(loan));
            }
        }

        if available <= 0 {
            return Err(AppError::Conflict("No copies available".to_string()));
        }

        let inserted = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (book_id, user_id, due_date, idempotency_key)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(checkout.book_id)
        .bind(checkout.user_id)
        .bind(checkout.due_date)
        .bind(&checkout.idempotency_key)
        .fetch_one(&mut *tx)
        .await;

        let loan = match inserted {
            Ok(loan) => loan,
            Err(e) if is_unique_violation(&e, Some("loans_idempotency_key_key")) => {
                // Lost the uniqueness race against a same-key submission that
                // committed under a different book row lock. Surface the
                // winning loan instead of the constraint error.
                tx.rollback().await?;
                let key = checkout.idempotency_key.as_deref().unwrap_or_default();
                let winner =
                    sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE idempotency_key = $1")
                        .bind(key)
                        .fetch_optional(&self.pool)
                        .await?
                        .ok_or_else(|| {
                            AppError::Internal(
                                "Idempotency key conflict without a stored loan".to_string(),
                            )
                        })?;
                return Ok(CheckoutOutcome::Existing(winner));
            }
            Err(e) => return Err(e.into()),
        };

        sqlx::query(
            "UPDATE books SET available_quantity = available_quantity - 1, updated_at = now() \
             WHERE id = $1",
        )
        .bind(checkout.book_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(CheckoutOutcome::Created(loan))
    }

    /// Return a loan: stamp `returned_at` and increment the availability
    /// counter in one atomic unit of work.
    ///
    /// `restrict_to_user` carries the ownership restriction for non-admin
    /// callers; `None` means no restriction. A second return of the same loan
    /// is a conflict, not a no-op.
    pub async fn return_loan(
        &self,
        loan_id: i32,
        restrict_to_user: Option<i32>,
    ) -> AppResult<Loan> {
        let mut tx = self.pool.begin().await?;

        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(loan_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", loan_id)))?;

        if let Some(user_id) = restrict_to_user {
            if loan.user_id != user_id {
                return Err(AppError::Authorization("Forbidden".to_string()));
            }
        }

        if loan.returned_at.is_some() {
            return Err(AppError::Conflict("Loan already returned".to_string()));
        }

        // Lock the book row before touching the counter; checkout takes the
        // same lock, so the counter read-modify-write stays serialized per
        // book.
        let _: i32 = sqlx::query_scalar("SELECT id FROM books WHERE id = $1 FOR UPDATE")
            .bind(loan.book_id)
            .fetch_one(&mut *tx)
            .await?;

        let returned = sqlx::query_as::<_, Loan>(
            "UPDATE loans SET returned_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(loan_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE books SET available_quantity = available_quantity + 1, updated_at = now() \
             WHERE id = $1",
        )
        .bind(loan.book_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(returned)
    }

    /// Open loans for a borrower, soonest due first
    pub async fn open_loans_for_user(&self, user_id: i32) -> AppResult<Vec<LoanDetails>> {
        let query = format!(
            "{} WHERE l.user_id = $1 AND l.returned_at IS NULL ORDER BY l.due_date",
            LOAN_DETAILS_SELECT
        );
        let rows = sqlx::query_as::<_, LoanDetailsRow>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(LoanDetails::from).collect())
    }

    /// Open loans past due as of the given date, soonest due first
    pub async fn overdue_loans(&self, as_of: NaiveDate) -> AppResult<Vec<LoanDetails>> {
        let query = format!(
            "{} WHERE l.due_date < $1 AND l.returned_at IS NULL ORDER BY l.due_date",
            LOAN_DETAILS_SELECT
        );
        let rows = sqlx::query_as::<_, LoanDetailsRow>(&query)
            .bind(as_of)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(LoanDetails::from).collect())
    }

    /// Open loans due inside a date window (both bounds inclusive), used by
    /// the overdue report
    pub async fn open_loans_due_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<LoanDetails>> {
        let query = format!(
            "{} WHERE l.due_date BETWEEN $1 AND $2 AND l.returned_at IS NULL ORDER BY l.due_date",
            LOAN_DETAILS_SELECT
        );
        let rows = sqlx::query_as::<_, LoanDetailsRow>(&query)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(LoanDetails::from).collect())
    }

    /// Loans created inside a date window (both bounds inclusive), used by
    /// the all-borrows report
    pub async fn loans_created_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<LoanDetails>> {
        let query = format!(
            "{} WHERE l.created_at >= $1 AND l.created_at < ($2 + INTERVAL '1 day') \
             ORDER BY l.created_at",
            LOAN_DETAILS_SELECT
        );
        let rows = sqlx::query_as::<_, LoanDetailsRow>(&query)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(LoanDetails::from).collect())
    }
}
