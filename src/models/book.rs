//! Book model, search parameters and ISBN handling

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

/// ISBN-10/13 shape, checked after normalization
static ISBN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d{9}[\dXx]|\d{13})$").expect("invalid ISBN pattern"));

/// Strip hyphens and whitespace. Applied to every ISBN before storage or
/// comparison: two strings differing only in formatting name the same book.
pub fn normalize_isbn(isbn: &str) -> String {
    isbn.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect()
}

fn validate_isbn(isbn: &str) -> Result<(), ValidationError> {
    if ISBN_PATTERN.is_match(&normalize_isbn(isbn)) {
        Ok(())
    } else {
        let mut error = ValidationError::new("isbn");
        error.message = Some("must be a valid ISBN-10 or ISBN-13".into());
        Err(error)
    }
}

/// Book model from database. The stored ISBN is always normalized.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub available_quantity: i32,
    pub shelf_location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create book request (admin only)
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub title: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub author: String,
    #[validate(custom(function = "validate_isbn"))]
    pub isbn: String,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub available_quantity: i32,
    pub shelf_location: Option<String>,
}

/// Update book request (admin only). `available_quantity` here is a manual
/// correction outside the loan ledger, not guarded against concurrent
/// checkouts.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub author: Option<String>,
    #[validate(custom(function = "validate_isbn"))]
    pub isbn: Option<String>,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub available_quantity: Option<i32>,
    pub shelf_location: Option<String>,
}

/// Book list/search query parameters
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    /// Free-text search on title, author and ISBN
    pub q: Option<String>,
    pub author: Option<String>,
    pub title: Option<String>,
    /// Exact ISBN match, normalized before comparison
    pub isbn: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Paginated book list response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BookListPage {
    pub data: Vec<Book>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}
