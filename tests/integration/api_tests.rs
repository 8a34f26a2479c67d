//! API integration tests
//!
//! Run against a live server (with its database and Redis) with:
//! `cargo test -- --ignored`

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};

const BASE_URL: &str = "http://localhost:3000/api";

/// Unique suffix so repeated test runs do not collide on unique columns
fn unique(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    format!("{}-{}", prefix, nanos)
}

fn tomorrow() -> String {
    (chrono::Utc::now() + chrono::Duration::days(1))
        .date_naive()
        .to_string()
}

/// Register a user with the given role and return (token, user_id)
async fn register_and_login(client: &Client, role: &str) -> (String, i64) {
    let email = format!("{}@example.org", unique(&role.to_lowercase()));

    let response = client
        .post(format!("{}/auth/register", BASE_URL))
        .json(&json!({
            "name": format!("Test {}", role),
            "email": email,
            "password": "hunter22",
            "role": role
        }))
        .send()
        .await
        .expect("Failed to send register request");
    assert_eq!(response.status(), StatusCode::CREATED);

    let user: Value = response.json().await.expect("Failed to parse register response");
    let user_id = user["id"].as_i64().expect("No user id");

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "email": email, "password": "hunter22" }))
        .send()
        .await
        .expect("Failed to send login request");
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.expect("Failed to parse login response");
    let token = body["token"].as_str().expect("No token in response").to_string();

    (token, user_id)
}

/// Create a book as admin and return its id
async fn create_book(client: &Client, admin_token: &str, isbn: &str, quantity: i64) -> i64 {
    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(admin_token)
        .json(&json!({
            "title": unique("Book"),
            "author": "Test Author",
            "isbn": isbn,
            "available_quantity": quantity
        }))
        .send()
        .await
        .expect("Failed to send create book request");
    assert_eq!(response.status(), StatusCode::CREATED);

    let body: Value = response.json().await.expect("Failed to parse book response");
    body["id"].as_i64().expect("No book id")
}

/// A unique, well-formed 13-digit ISBN
fn unique_isbn() -> String {
    static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos() as u64;
    let n = nanos.wrapping_add(COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed));
    format!("{:013}", n as u128 % 10_000_000_000_000)
}

#[tokio::test]
#[ignore]
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get("http://localhost:3000/health")
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
#[ignore]
async fn test_register_rejects_invalid_input() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/register", BASE_URL))
        .json(&json!({
            "name": "",
            "email": "not-an-email",
            "password": "123"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["errors"].is_array());
}

#[tokio::test]
#[ignore]
async fn test_login_invalid_credentials() {
    let client = Client::new();
    let (_token, _id) = register_and_login(&client, "BORROWER").await;

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "email": "nobody@example.org", "password": "wrong" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["error"].is_string());
}

#[tokio::test]
#[ignore]
async fn test_duplicate_email_conflicts() {
    let client = Client::new();
    let email = format!("{}@example.org", unique("dup"));

    for expected in [StatusCode::CREATED, StatusCode::CONFLICT] {
        let response = client
            .post(format!("{}/auth/register", BASE_URL))
            .json(&json!({
                "name": "Dup User",
                "email": email,
                "password": "hunter22"
            }))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status(), expected);
    }
}

#[tokio::test]
#[ignore]
async fn test_book_crud_requires_admin() {
    let client = Client::new();
    let (borrower_token, _) = register_and_login(&client, "BORROWER").await;

    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(&borrower_token)
        .json(&json!({
            "title": "Forbidden",
            "author": "Nobody",
            "isbn": unique_isbn(),
            "available_quantity": 1
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore]
async fn test_duplicate_isbn_conflicts_across_formatting() {
    let client = Client::new();
    let (admin_token, _) = register_and_login(&client, "ADMIN").await;

    let isbn = unique_isbn();
    create_book(&client, &admin_token, &isbn, 1).await;

    // Same digits with hyphens is the same book
    let formatted = format!(
        "{}-{}-{}",
        &isbn[..3],
        &isbn[3..8],
        &isbn[8..]
    );
    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(&admin_token)
        .json(&json!({
            "title": "Other Title",
            "author": "Other Author",
            "isbn": formatted,
            "available_quantity": 2
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore]
async fn test_search_by_isbn_ignores_formatting() {
    let client = Client::new();
    let (admin_token, _) = register_and_login(&client, "ADMIN").await;

    let isbn = unique_isbn();
    let book_id = create_book(&client, &admin_token, &isbn, 1).await;

    let formatted = format!("{}-{}", &isbn[..4], &isbn[4..]);
    let response = client
        .get(format!("{}/books", BASE_URL))
        .query(&[("isbn", formatted.as_str())])
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    let data = body["data"].as_array().expect("No data array");
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["id"].as_i64(), Some(book_id));
    assert_eq!(data[0]["isbn"].as_str(), Some(isbn.as_str()));
}

#[tokio::test]
#[ignore]
async fn test_loan_lifecycle_end_to_end() {
    let client = Client::new();
    let (admin_token, _) = register_and_login(&client, "ADMIN").await;
    let (borrower_token, _) = register_and_login(&client, "BORROWER").await;

    let book_id = create_book(&client, &admin_token, &unique_isbn(), 3).await;

    // Checkout as borrower
    let response = client
        .post(format!("{}/loans", BASE_URL))
        .bearer_auth(&borrower_token)
        .json(&json!({ "book_id": book_id, "due_date": tomorrow() }))
        .send()
        .await
        .expect("Failed to send checkout request");
    assert_eq!(response.status(), StatusCode::CREATED);

    let loan: Value = response.json().await.expect("Failed to parse loan");
    let loan_id = loan["id"].as_i64().expect("No loan id");
    assert!(loan["returned_at"].is_null());

    // Quantity decremented
    let book: Value = client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .send()
        .await
        .expect("Failed to fetch book")
        .json()
        .await
        .expect("Failed to parse book");
    assert_eq!(book["available_quantity"].as_i64(), Some(2));

    // One open loan listed for the borrower
    let me: Value = client
        .get(format!("{}/loans/me", BASE_URL))
        .bearer_auth(&borrower_token)
        .send()
        .await
        .expect("Failed to fetch own loans")
        .json()
        .await
        .expect("Failed to parse own loans");
    let mine = me.as_array().expect("Expected array");
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["id"].as_i64(), Some(loan_id));
    assert_eq!(mine[0]["book"]["id"].as_i64(), Some(book_id));

    // Return
    let response = client
        .post(format!("{}/loans/{}/return", BASE_URL, loan_id))
        .bearer_auth(&borrower_token)
        .send()
        .await
        .expect("Failed to send return request");
    assert_eq!(response.status(), StatusCode::OK);

    let returned: Value = response.json().await.expect("Failed to parse returned loan");
    assert!(returned["returned_at"].is_string());

    // Quantity restored
    let book: Value = client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .send()
        .await
        .expect("Failed to fetch book")
        .json()
        .await
        .expect("Failed to parse book");
    assert_eq!(book["available_quantity"].as_i64(), Some(3));
}

#[tokio::test]
#[ignore]
async fn test_last_copy_race_admits_exactly_one() {
    let client = Client::new();
    let (admin_token, _) = register_and_login(&client, "ADMIN").await;
    let (token_a, _) = register_and_login(&client, "BORROWER").await;
    let (token_b, _) = register_and_login(&client, "BORROWER").await;

    let book_id = create_book(&client, &admin_token, &unique_isbn(), 1).await;

    let checkout = |token: String| {
        let client = client.clone();
        async move {
            client
                .post(format!("{}/loans", BASE_URL))
                .bearer_auth(token)
                .json(&json!({ "book_id": book_id, "due_date": tomorrow() }))
                .send()
                .await
                .expect("Failed to send checkout request")
                .status()
        }
    };

    let (status_a, status_b) = tokio::join!(checkout(token_a), checkout(token_b));

    let statuses = [status_a, status_b];
    assert!(statuses.contains(&StatusCode::CREATED), "one must succeed");
    assert!(statuses.contains(&StatusCode::CONFLICT), "one must conflict");

    let book: Value = client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .send()
        .await
        .expect("Failed to fetch book")
        .json()
        .await
        .expect("Failed to parse book");
    assert_eq!(book["available_quantity"].as_i64(), Some(0));
}

#[tokio::test]
#[ignore]
async fn test_idempotent_checkout_creates_one_loan() {
    let client = Client::new();
    let (admin_token, _) = register_and_login(&client, "ADMIN").await;
    let (borrower_token, _) = register_and_login(&client, "BORROWER").await;

    let book_id = create_book(&client, &admin_token, &unique_isbn(), 5).await;
    let key = unique("checkout");

    let submit = || {
        let client = client.clone();
        let token = borrower_token.clone();
        let key = key.clone();
        async move {
            let response = client
                .post(format!("{}/loans", BASE_URL))
                .bearer_auth(token)
                .header("Idempotency-Key", key)
                .json(&json!({ "book_id": book_id, "due_date": tomorrow() }))
                .send()
                .await
                .expect("Failed to send checkout request");
            let status = response.status();
            let body: Value = response.json().await.expect("Failed to parse loan");
            (status, body["id"].as_i64().expect("No loan id"))
        }
    };

    // Concurrent duplicates converge to one created loan
    let (first, second, third) = tokio::join!(submit(), submit(), submit());

    let ids = [first.1, second.1, third.1];
    assert!(ids.iter().all(|id| *id == ids[0]), "all callers see one loan");

    let created = [first.0, second.0, third.0]
        .iter()
        .filter(|s| **s == StatusCode::CREATED)
        .count();
    assert_eq!(created, 1, "exactly one submission creates");

    // Exactly one decrement happened
    let book: Value = client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .send()
        .await
        .expect("Failed to fetch book")
        .json()
        .await
        .expect("Failed to parse book");
    assert_eq!(book["available_quantity"].as_i64(), Some(4));

    // A later replay still returns the same loan
    let replay = submit().await;
    assert_eq!(replay.0, StatusCode::OK);
    assert_eq!(replay.1, ids[0]);
}

#[tokio::test]
#[ignore]
async fn test_return_is_not_idempotent() {
    let client = Client::new();
    let (admin_token, _) = register_and_login(&client, "ADMIN").await;
    let (borrower_token, _) = register_and_login(&client, "BORROWER").await;

    let book_id = create_book(&client, &admin_token, &unique_isbn(), 1).await;

    let loan: Value = client
        .post(format!("{}/loans", BASE_URL))
        .bearer_auth(&borrower_token)
        .json(&json!({ "book_id": book_id, "due_date": tomorrow() }))
        .send()
        .await
        .expect("Failed to send checkout request")
        .json()
        .await
        .expect("Failed to parse loan");
    let loan_id = loan["id"].as_i64().expect("No loan id");

    let first = client
        .post(format!("{}/loans/{}/return", BASE_URL, loan_id))
        .bearer_auth(&borrower_token)
        .send()
        .await
        .expect("Failed to send first return")
        .status();
    let second = client
        .post(format!("{}/loans/{}/return", BASE_URL, loan_id))
        .bearer_auth(&borrower_token)
        .send()
        .await
        .expect("Failed to send second return")
        .status();

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::CONFLICT);

    // Counter incremented exactly once
    let book: Value = client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .send()
        .await
        .expect("Failed to fetch book")
        .json()
        .await
        .expect("Failed to parse book");
    assert_eq!(book["available_quantity"].as_i64(), Some(1));
}

#[tokio::test]
#[ignore]
async fn test_borrower_cannot_checkout_for_someone_else() {
    let client = Client::new();
    let (admin_token, _) = register_and_login(&client, "ADMIN").await;
    let (borrower_token, _) = register_and_login(&client, "BORROWER").await;
    let (_, other_id) = register_and_login(&client, "BORROWER").await;

    let book_id = create_book(&client, &admin_token, &unique_isbn(), 1).await;

    let response = client
        .post(format!("{}/loans", BASE_URL))
        .bearer_auth(&borrower_token)
        .json(&json!({
            "book_id": book_id,
            "user_id": other_id,
            "due_date": tomorrow()
        }))
        .send()
        .await
        .expect("Failed to send checkout request");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore]
async fn test_admin_checkout_for_borrower() {
    let client = Client::new();
    let (admin_token, _) = register_and_login(&client, "ADMIN").await;
    let (_, borrower_id) = register_and_login(&client, "BORROWER").await;

    let book_id = create_book(&client, &admin_token, &unique_isbn(), 1).await;

    let response = client
        .post(format!("{}/loans", BASE_URL))
        .bearer_auth(&admin_token)
        .json(&json!({
            "book_id": book_id,
            "user_id": borrower_id,
            "due_date": tomorrow()
        }))
        .send()
        .await
        .expect("Failed to send checkout request");
    assert_eq!(response.status(), StatusCode::CREATED);

    let loan: Value = response.json().await.expect("Failed to parse loan");
    assert_eq!(loan["user_id"].as_i64(), Some(borrower_id));
}

#[tokio::test]
#[ignore]
async fn test_checkout_rejects_malformed_due_date() {
    let client = Client::new();
    let (admin_token, _) = register_and_login(&client, "ADMIN").await;
    let (borrower_token, _) = register_and_login(&client, "BORROWER").await;

    let book_id = create_book(&client, &admin_token, &unique_isbn(), 1).await;

    let response = client
        .post(format!("{}/loans", BASE_URL))
        .bearer_auth(&borrower_token)
        .json(&json!({ "book_id": book_id, "due_date": "next week" }))
        .send()
        .await
        .expect("Failed to send checkout request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn test_overdue_endpoint_is_admin_only() {
    let client = Client::new();
    let (borrower_token, _) = register_and_login(&client, "BORROWER").await;

    let response = client
        .get(format!("{}/loans/overdue", BASE_URL))
        .bearer_auth(&borrower_token)
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore]
async fn test_loans_require_authentication() {
    let client = Client::new();

    let response = client
        .get(format!("{}/loans/me", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_overdue_report_csv_headers() {
    let client = Client::new();

    let response = client
        .get(format!("{}/reports/overdue/last-month.csv", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/csv"));

    let body = response.text().await.expect("Failed to read body");
    if !body.is_empty() {
        assert!(body.starts_with(
            "id,book_title,book_isbn,borrower_name,borrower_email,due_date"
        ));
    }
}

#[tokio::test]
#[ignore]
async fn test_borrows_report_csv_headers() {
    let client = Client::new();

    let response = client
        .get(format!("{}/reports/borrows/last-month.csv", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let body = response.text().await.expect("Failed to read body");
    if !body.is_empty() {
        assert!(body.starts_with(
            "id,book_title,book_isbn,borrower_name,borrower_email,due_date,returned_at,created_at"
        ));
    }
}

#[tokio::test]
#[ignore]
async fn test_list_cache_staleness_is_bounded_by_ttl() {
    let client = Client::new();
    let (admin_token, _) = register_and_login(&client, "ADMIN").await;

    let author = unique("Cached Author");

    // Prime the cache for this query
    let response = client
        .get(format!("{}/books", BASE_URL))
        .query(&[("author", author.as_str())])
        .send()
        .await
        .expect("Failed to send request");
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["total"].as_i64(), Some(0));

    let book_response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(&admin_token)
        .json(&json!({
            "title": unique("Book"),
            "author": author,
            "isbn": unique_isbn(),
            "available_quantity": 1
        }))
        .send()
        .await
        .expect("Failed to send create book request");
    assert_eq!(book_response.status(), StatusCode::CREATED);

    // Past the TTL (20s default) the write must be visible
    tokio::time::sleep(std::time::Duration::from_secs(21)).await;

    let response = client
        .get(format!("{}/books", BASE_URL))
        .query(&[("author", author.as_str())])
        .send()
        .await
        .expect("Failed to send request");
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["total"].as_i64(), Some(1));
}

#[tokio::test]
#[ignore]
async fn test_delete_borrower_with_loans_conflicts() {
    let client = Client::new();
    let (admin_token, _) = register_and_login(&client, "ADMIN").await;
    let (borrower_token, borrower_id) = register_and_login(&client, "BORROWER").await;

    let book_id = create_book(&client, &admin_token, &unique_isbn(), 1).await;

    let response = client
        .post(format!("{}/loans", BASE_URL))
        .bearer_auth(&borrower_token)
        .json(&json!({ "book_id": book_id, "due_date": tomorrow() }))
        .send()
        .await
        .expect("Failed to send checkout request");
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = client
        .delete(format!("{}/borrowers/{}", BASE_URL, borrower_id))
        .bearer_auth(&admin_token)
        .send()
        .await
        .expect("Failed to send delete request");

    assert_eq!(response.status(), StatusCode::CONFLICT);
}
