//! Books repository for database operations
//!
//! ISBN values are normalized before every comparison or write, so formatting
//! variants of the same ISBN always hit the same row.

use sqlx::{Pool, Postgres};

use crate::{
    error::{is_foreign_key_violation, is_unique_violation, AppError, AppResult},
    models::{
        book::{normalize_isbn, Book, BookQuery, CreateBook, UpdateBook},
        Pagination,
    },
};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Create a new book
    pub async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        let created = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, author, isbn, available_quantity, shelf_location)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(normalize_isbn(&book.isbn))
        .bind(book.available_quantity)
        .bind(&book.shelf_location)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, Some("books_isbn_key")) {
                AppError::Conflict("ISBN already exists".to_string())
            } else {
                e.into()
            }
        })?;

        Ok(created)
    }

    /// Update an existing book
    pub async fn update(&self, id: i32, update: &UpdateBook) -> AppResult<Book> {
        let isbn = update.isbn.as_deref().map(normalize_isbn);

        // Build dynamic update query
        let mut sets = vec!["updated_at = now()".to_string()];
        let mut param_idx = 1;

        macro_rules! add_field {
            ($field:expr, $name:expr) => {
                if $field.is_some() {
                    sets.push(format!("{} = ${}", $name, param_idx));
                    param_idx += 1;
                }
            };
        }

        add_field!(update.title, "title");
        add_field!(update.author, "author");
        add_field!(isbn, "isbn");
        add_field!(update.available_quantity, "available_quantity");
        add_field!(update.shelf_location, "shelf_location");

        let query = format!(
            "UPDATE books SET {} WHERE id = ${} RETURNING *",
            sets.join(", "),
            param_idx
        );

        let mut builder = sqlx::query_as::<_, Book>(&query);

        macro_rules! bind_field {
            ($field:expr) => {
                if let Some(ref val) = $field {
                    builder = builder.bind(val);
                }
            };
        }

        bind_field!(update.title);
        bind_field!(update.author);
        bind_field!(isbn);
        bind_field!(update.available_quantity);
        bind_field!(update.shelf_location);

        builder
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e, Some("books_isbn_key")) {
                    AppError::Conflict("ISBN already exists".to_string())
                } else {
                    AppError::from(e)
                }
            })?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Delete a book. Refused while any loan references it.
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    AppError::Conflict("Book has loan records and cannot be deleted".to_string())
                } else {
                    AppError::from(e)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }

        Ok(())
    }

    /// Search books with optional filters and pagination, ordered by title
    pub async fn search(&self, query: &BookQuery, page: Pagination) -> AppResult<(Vec<Book>, i64)> {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(ref isbn) = query.isbn {
            params.push(normalize_isbn(isbn));
            conditions.push(format!("isbn = ${}", params.len()));
        }
        if let Some(ref author) = query.author {
            params.push(format!("%{}%", author));
            conditions.push(format!("author ILIKE ${}", params.len()));
        }
        if let Some(ref title) = query.title {
            params.push(format!("%{}%", title));
            conditions.push(format!("title ILIKE ${}", params.len()));
        }
        if let Some(ref q) = query.q {
            params.push(format!("%{}%", q));
            let n = params.len();
            conditions.push(format!(
                "(title ILIKE ${n} OR author ILIKE ${n} OR isbn ILIKE ${n})",
                n = n
            ));
        }

        let where_clause = if conditions.is_empty() {
            "TRUE".to_string()
        } else {
            conditions.join(" AND ")
        };

        let count_query = format!("SELECT COUNT(*) FROM books WHERE {}", where_clause);
        let mut count = sqlx::query_scalar::<_, i64>(&count_query);
        for p in &params {
            count = count.bind(p);
        }
        let total = count.fetch_one(&self.pool).await?;

        let select_query = format!(
            "SELECT * FROM books WHERE {} ORDER BY title LIMIT {} OFFSET {}",
            where_clause, page.limit, page.offset
        );
        let mut rows = sqlx::query_as::<_, Book>(&select_query);
        for p in &params {
            rows = rows.bind(p);
        }
        let books = rows.fetch_all(&self.pool).await?;

        Ok((books, total))
    }
}
