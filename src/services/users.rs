//! Authentication and borrower management service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::{
        user::{
            RegisterRequest, Role, UpdateBorrower, User, UserClaims, UserResponse,
        },
        Pagination,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
}

impl UsersService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Register a new user. Defaults to the BORROWER role.
    pub async fn register(&self, request: RegisterRequest) -> AppResult<UserResponse> {
        request.validate()?;

        let password_hash = hash_password(&request.password)?;
        let role = request.role.unwrap_or(Role::Borrower);
        let registered_date = request
            .registered_date
            .unwrap_or_else(|| Utc::now().date_naive());

        let user = self
            .repository
            .users
            .create(
                &request.name,
                &request.email,
                &password_hash,
                role,
                registered_date,
            )
            .await?;

        Ok(user.into())
    }

    /// Authenticate by email/password and issue a bearer token
    pub async fn login(&self, email: &str, password: &str) -> AppResult<(String, UserResponse)> {
        let user = self
            .repository
            .users
            .find_by_email(email)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid credentials".to_string()))?;

        if !verify_password(&user.password_hash, password) {
            return Err(AppError::Authentication("Invalid credentials".to_string()));
        }

        let token = self.issue_token(&user)?;
        Ok((token, user.into()))
    }

    fn issue_token(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let exp = now + (self.config.jwt_expiration_hours as i64 * 3600);

        let claims = UserClaims {
            id: user.id,
            role: user.role,
            exp,
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// List borrowers with optional name/email search (admin only)
    pub async fn search_borrowers(
        &self,
        q: Option<&str>,
        page: Pagination,
    ) -> AppResult<(Vec<UserResponse>, i64)> {
        let (users, total) = self.repository.users.search_borrowers(q, page).await?;
        Ok((users.into_iter().map(UserResponse::from).collect(), total))
    }

    /// Fetch a borrower by id
    pub async fn get_borrower(&self, id: i32) -> AppResult<UserResponse> {
        let user = self.repository.users.get_by_id(id).await?;
        if user.role != Role::Borrower {
            return Err(AppError::NotFound(format!("User with id {} not found", id)));
        }
        Ok(user.into())
    }

    /// Update a borrower record (admin only)
    pub async fn update_borrower(
        &self,
        id: i32,
        update: UpdateBorrower,
    ) -> AppResult<UserResponse> {
        update.validate()?;
        let user = self.repository.users.update_borrower(id, &update).await?;
        Ok(user.into())
    }

    /// Delete a borrower (admin only); refused while loans reference them
    pub async fn delete_borrower(&self, id: i32) -> AppResult<()> {
        self.repository.users.delete_borrower(id).await
    }
}

/// Hash a password with argon2 and a fresh random salt
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a stored argon2 hash
pub fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
