//! Catalog (books) service
//!
//! Write paths go straight to the repository. The list/search read path is
//! memoized in the read-side cache under a canonical key; staleness up to the
//! cache TTL is accepted by design.

use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        book::{normalize_isbn, Book, BookListPage, BookQuery, CreateBook, UpdateBook},
        Pagination,
    },
    repository::Repository,
    services::cache::CacheService,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    cache: CacheService,
}

impl CatalogService {
    pub fn new(repository: Repository, cache: CacheService) -> Self {
        Self { repository, cache }
    }

    /// Create a new book (admin only)
    pub async fn create_book(&self, book: CreateBook) -> AppResult<Book> {
        book.validate()?;
        self.repository.books.create(&book).await
    }

    /// Get book details by ID
    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.repository.books.get_by_id(id).await
    }

    /// Update an existing book (admin only). A supplied available_quantity
    /// is a manual correction applied outside the loan ledger.
    pub async fn update_book(&self, id: i32, update: UpdateBook) -> AppResult<Book> {
        update.validate()?;
        self.repository.books.update(id, &update).await
    }

    /// Delete a book (admin only)
    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        self.repository.books.delete(id).await
    }

    /// List/search books. Results are served from the cache when a fresh
    /// entry exists for the same canonical query.
    pub async fn search_books(&self, query: &BookQuery) -> AppResult<BookListPage> {
        let page = Pagination::clamped(query.limit, query.offset);
        let key = cache_key(query, page);

        if let Some(cached) = self.cache.get_json::<BookListPage>(&key).await {
            return Ok(cached);
        }

        let (data, total) = self.repository.books.search(query, page).await?;
        let result = BookListPage {
            data,
            total,
            limit: page.limit,
            offset: page.offset,
        };

        self.cache.put_json(&key, &result).await;
        Ok(result)
    }
}

/// Canonical cache key: stable field order, normalized ISBN, clamped
/// pagination — equivalent queries share one entry.
fn cache_key(query: &BookQuery, page: Pagination) -> String {
    format!(
        "books:list:q={}&author={}&title={}&isbn={}&limit={}&offset={}",
        query.q.as_deref().unwrap_or(""),
        query.author.as_deref().unwrap_or(""),
        query.title.as_deref().unwrap_or(""),
        query.isbn.as_deref().map(normalize_isbn).unwrap_or_default(),
        page.limit,
        page.offset
    )
}
