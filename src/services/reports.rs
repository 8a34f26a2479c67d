//! Reporting projector: CSV exports over the loan ledger
//!
//! Pure read-side aggregation; no side effects. Both reports cover the
//! previous calendar month.

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    models::loan::LoanDetails,
    repository::Repository,
};

/// Row of the overdue-loans report
#[derive(Debug, Serialize)]
struct OverdueRow {
    id: i32,
    book_title: String,
    book_isbn: String,
    borrower_name: String,
    borrower_email: String,
    due_date: NaiveDate,
}

/// Row of the all-borrows report
#[derive(Debug, Serialize)]
struct BorrowRow {
    id: i32,
    book_title: String,
    book_isbn: String,
    borrower_name: String,
    borrower_email: String,
    due_date: NaiveDate,
    returned_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ReportsService {
    repository: Repository,
}

impl ReportsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Loans due last month and still open, as CSV
    pub async fn overdue_last_month_csv(&self) -> AppResult<String> {
        let (start, end) = last_month_window(Utc::now().date_naive());
        let loans = self
            .repository
            .loans
            .open_loans_due_between(start, end)
            .await?;

        let rows = loans.into_iter().map(|loan| OverdueRow {
            id: loan.id,
            book_title: loan.book.title,
            book_isbn: loan.book.isbn,
            borrower_name: loan.borrower.name,
            borrower_email: loan.borrower.email,
            due_date: loan.due_date,
        });

        write_csv(rows)
    }

    /// All loans created last month, as CSV
    pub async fn borrows_last_month_csv(&self) -> AppResult<String> {
        let (start, end) = last_month_window(Utc::now().date_naive());
        let loans = self
            .repository
            .loans
            .loans_created_between(start, end)
            .await?;

        let rows = loans.into_iter().map(|loan: LoanDetails| BorrowRow {
            id: loan.id,
            book_title: loan.book.title,
            book_isbn: loan.book.isbn,
            borrower_name: loan.borrower.name,
            borrower_email: loan.borrower.email,
            due_date: loan.due_date,
            returned_at: loan.returned_at,
            created_at: loan.created_at,
        });

        write_csv(rows)
    }
}

/// First and last day of the month before the one containing `today`
fn last_month_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first_of_current = today.with_day(1).expect("day 1 always valid");
    let start = first_of_current - Months::new(1);
    let end = first_of_current.pred_opt().expect("dates have predecessors");
    (start, end)
}

fn write_csv<T: Serialize>(rows: impl Iterator<Item = T>) -> AppResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| AppError::Internal(format!("CSV serialization failed: {}", e)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV flush failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("CSV not UTF-8: {}", e)))
}
