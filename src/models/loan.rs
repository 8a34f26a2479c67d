//! Loan (borrow record) model and related types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Loan model from database. `returned_at` null means the book is still out;
/// once set the loan is closed and immutable.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: i32,
    pub book_id: i32,
    pub user_id: i32,
    pub due_date: NaiveDate,
    pub returned_at: Option<DateTime<Utc>>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Loan {
    pub fn is_open(&self) -> bool {
        self.returned_at.is_none()
    }
}

/// Book fields joined into a loan listing
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookSummary {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub isbn: String,
}

/// Borrower fields joined into a loan listing
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BorrowerSummary {
    pub id: i32,
    pub name: String,
    pub email: String,
}

/// Internal row structure for joined loan queries
#[derive(Debug, Clone, FromRow)]
pub struct LoanDetailsRow {
    id: i32,
    book_id: i32,
    user_id: i32,
    due_date: NaiveDate,
    returned_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    book_title: String,
    book_author: String,
    book_isbn: String,
    borrower_name: String,
    borrower_email: String,
}

/// Loan with joined book and borrower details for display
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanDetails {
    pub id: i32,
    pub due_date: NaiveDate,
    pub returned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub book: BookSummary,
    pub borrower: BorrowerSummary,
}

impl From<LoanDetailsRow> for LoanDetails {
    fn from(row: LoanDetailsRow) -> Self {
        LoanDetails {
            id: row.id,
            due_date: row.due_date,
            returned_at: row.returned_at,
            created_at: row.created_at,
            book: BookSummary {
                id: row.book_id,
                title: row.book_title,
                author: row.book_author,
                isbn: row.book_isbn,
            },
            borrower: BorrowerSummary {
                id: row.user_id,
                name: row.borrower_name,
                email: row.borrower_email,
            },
        }
    }
}

/// Checkout request body. `due_date` is parsed as an ISO-8601 date before any
/// transaction opens.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    #[validate(range(min = 1, message = "must be a positive id"))]
    pub book_id: i32,
    /// Target borrower; required for admin checkouts, must match the acting
    /// user otherwise
    #[validate(range(min = 1, message = "must be a positive id"))]
    pub user_id: Option<i32>,
    pub due_date: String,
}

/// Checkout parameters resolved by the service layer
#[derive(Debug, Clone)]
pub struct Checkout {
    pub book_id: i32,
    pub user_id: i32,
    pub due_date: NaiveDate,
    pub idempotency_key: Option<String>,
}

/// Whether a checkout created a new loan or replayed an idempotent one
#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    Created(Loan),
    Existing(Loan),
}

impl CheckoutOutcome {
    pub fn loan(&self) -> &Loan {
        match self {
            CheckoutOutcome::Created(loan) | CheckoutOutcome::Existing(loan) => loan,
        }
    }
}
