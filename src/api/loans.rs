//! Loan lifecycle endpoints

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    error::{AppError, AppResult},
    models::loan::{CheckoutOutcome, CheckoutRequest, Loan, LoanDetails},
};

use super::AuthenticatedUser;

/// Check out a book (create a loan)
///
/// A repeated request carrying the same `Idempotency-Key` header returns the
/// originally created loan with status 200 instead of creating a second one.
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = CheckoutRequest,
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Client token deduplicating retried checkouts")
    ),
    responses(
        (status = 201, description = "Loan created", body = Loan),
        (status = 200, description = "Idempotent replay, existing loan", body = Loan),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Checkout for another borrower"),
        (status = 404, description = "Book or user not found"),
        (status = 409, description = "No copies available")
    )
)]
pub async fn checkout(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    headers: HeaderMap,
    Json(request): Json<CheckoutRequest>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    let idempotency_key = headers
        .get("Idempotency-Key")
        .map(|value| {
            value
                .to_str()
                .map(str::to_string)
                .map_err(|_| AppError::BadRequest("Invalid Idempotency-Key header".to_string()))
        })
        .transpose()?;

    let outcome = state
        .services
        .loans
        .checkout(&claims, request, idempotency_key)
        .await?;

    match outcome {
        CheckoutOutcome::Created(loan) => Ok((StatusCode::CREATED, Json(loan))),
        CheckoutOutcome::Existing(loan) => Ok((StatusCode::OK, Json(loan))),
    }
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = Loan),
        (status = 403, description = "Not the borrower"),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Loan already returned")
    )
)]
pub async fn return_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(loan_id): Path<i32>,
) -> AppResult<Json<Loan>> {
    let loan = state.services.loans.return_loan(&claims, loan_id).await?;
    Ok(Json(loan))
}

/// Open loans of the authenticated user
#[utoipa::path(
    get,
    path = "/loans/me",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Open loans, soonest due first", body = Vec<LoanDetails>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn my_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.loans.my_open_loans(&claims).await?;
    Ok(Json(loans))
}

/// All overdue loans (admin only)
#[utoipa::path(
    get,
    path = "/loans/overdue",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Overdue loans, soonest due first", body = Vec<LoanDetails>),
        (status = 403, description = "Admin privileges required")
    )
)]
pub async fn overdue_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_admin()?;

    let loans = state.services.loans.overdue_loans().await?;
    Ok(Json(loans))
}
