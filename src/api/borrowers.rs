//! Borrower management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{
        user::{BorrowerQuery, UpdateBorrower, UserResponse},
        Pagination,
    },
};

use super::AuthenticatedUser;

/// Paginated borrower list response
#[derive(Serialize, ToSchema)]
pub struct BorrowerListPage {
    pub data: Vec<UserResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// List borrowers with optional name/email search
#[utoipa::path(
    get,
    path = "/borrowers",
    tag = "borrowers",
    security(("bearer_auth" = [])),
    params(
        ("q" = Option<String>, Query, description = "Substring search on name or email"),
        ("limit" = Option<i64>, Query, description = "Page size (1-100, default 20)"),
        ("offset" = Option<i64>, Query, description = "Offset (default 0)")
    ),
    responses(
        (status = 200, description = "Paginated borrower list", body = BorrowerListPage),
        (status = 403, description = "Admin privileges required")
    )
)]
pub async fn list_borrowers(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<BorrowerQuery>,
) -> AppResult<Json<BorrowerListPage>> {
    claims.require_admin()?;

    let page = Pagination::clamped(query.limit, query.offset);
    let (data, total) = state
        .services
        .users
        .search_borrowers(query.q.as_deref(), page)
        .await?;

    Ok(Json(BorrowerListPage {
        data,
        total,
        limit: page.limit,
        offset: page.offset,
    }))
}

/// Get borrower details by ID (owner or admin)
#[utoipa::path(
    get,
    path = "/borrowers/{id}",
    tag = "borrowers",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Borrower ID")
    ),
    responses(
        (status = 200, description = "Borrower details", body = UserResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Borrower not found")
    )
)]
pub async fn get_borrower(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<UserResponse>> {
    claims.require_self_or_admin(id)?;

    let borrower = state.services.users.get_borrower(id).await?;
    Ok(Json(borrower))
}

/// Update a borrower record
#[utoipa::path(
    put,
    path = "/borrowers/{id}",
    tag = "borrowers",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Borrower ID")
    ),
    request_body = UpdateBorrower,
    responses(
        (status = 200, description = "Borrower updated", body = UserResponse),
        (status = 403, description = "Admin privileges required"),
        (status = 404, description = "Borrower not found"),
        (status = 409, description = "Email already exists")
    )
)]
pub async fn update_borrower(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(update): Json<UpdateBorrower>,
) -> AppResult<Json<UserResponse>> {
    claims.require_admin()?;

    let updated = state.services.users.update_borrower(id, update).await?;
    Ok(Json(updated))
}

/// Delete a borrower
#[utoipa::path(
    delete,
    path = "/borrowers/{id}",
    tag = "borrowers",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Borrower ID")
    ),
    responses(
        (status = 204, description = "Borrower deleted"),
        (status = 403, description = "Admin privileges required"),
        (status = 404, description = "Borrower not found"),
        (status = 409, description = "Borrower has loan records")
    )
)]
pub async fn delete_borrower(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    claims.require_admin()?;

    state.services.users.delete_borrower(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
