//! Loan lifecycle service
//!
//! Validates and authorizes checkout/return requests before any transaction
//! opens, then delegates the atomic state transition to the loans repository.

use chrono::{DateTime, NaiveDate, Utc};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        loan::{Checkout, CheckoutOutcome, CheckoutRequest, Loan, LoanDetails},
        user::UserClaims,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
}

impl LoansService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Check out a book. Admins may check out for any borrower (body
    /// `user_id` required); borrowers only for themselves.
    pub async fn checkout(
        &self,
        claims: &UserClaims,
        request: CheckoutRequest,
        idempotency_key: Option<String>,
    ) -> AppResult<CheckoutOutcome> {
        request.validate()?;
        let due_date = parse_due_date(&request.due_date)?;

        let user_id = if claims.is_admin() {
            request.user_id.ok_or_else(|| {
                AppError::Validation(vec!["user_id: required for admin checkout".to_string()])
            })?
        } else {
            if let Some(target) = request.user_id {
                if target != claims.id {
                    return Err(AppError::Authorization("Forbidden".to_string()));
                }
            }
            claims.id
        };

        self.repository
            .loans
            .checkout(&Checkout {
                book_id: request.book_id,
                user_id,
                due_date,
                idempotency_key,
            })
            .await
    }

    /// Return a loan. Admins may return any loan; borrowers only their own.
    pub async fn return_loan(&self, claims: &UserClaims, loan_id: i32) -> AppResult<Loan> {
        let restrict_to_user = if claims.is_admin() {
            None
        } else {
            Some(claims.id)
        };
        self.repository.loans.return_loan(loan_id, restrict_to_user).await
    }

    /// Open loans of the acting user, soonest due first
    pub async fn my_open_loans(&self, claims: &UserClaims) -> AppResult<Vec<LoanDetails>> {
        self.repository.loans.open_loans_for_user(claims.id).await
    }

    /// All open loans past due as of today (admin only)
    pub async fn overdue_loans(&self) -> AppResult<Vec<LoanDetails>> {
        self.repository
            .loans
            .overdue_loans(Utc::now().date_naive())
            .await
    }
}

/// Parse a due date from an ISO-8601 date or datetime string
fn parse_due_date(raw: &str) -> AppResult<NaiveDate> {
    if let Ok(date) = raw.parse::<NaiveDate>() {
        return Ok(date);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
        return Ok(datetime.date_naive());
    }
    Err(AppError::Validation(vec![
        "due_date: must be an ISO-8601 date".to_string(),
    ]))
}
