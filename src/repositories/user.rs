//! # User Repository
//!
//! Repository for user accounts in the master database, plus password
//! hashing helpers used at registration and login.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::user::{
    ActiveModel as UserActiveModel, Column as UserColumn, Entity as User, Model as UserModel,
};
use crate::repositories::{roles_from_json, roles_to_json};

/// Repository for User database operations
pub struct UserRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> UserRepository<'a> {
    /// Create a new UserRepository with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a new user with a freshly hashed password
    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        global_roles: Vec<String>,
    ) -> Result<UserModel, RepositoryError> {
        validate_email(email)?;
        let password_hash = hash_password(password)?;
        let now = Utc::now();

        let user = UserActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_lowercase()),
            password_hash: Set(password_hash),
            global_roles: Set(roles_to_json(&global_roles)),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        user.insert(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Get user by ID
    pub async fn get_user_by_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<UserModel>, RepositoryError> {
        User::find_by_id(user_id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Get user by login email
    pub async fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserModel>, RepositoryError> {
        User::find()
            .filter(UserColumn::Email.eq(email.to_lowercase()))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// List all users
    pub async fn list_users(&self) -> Result<Vec<UserModel>, RepositoryError> {
        User::find()
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Replace the user's global role set
    pub async fn set_global_roles(
        &self,
        user_id: Uuid,
        global_roles: Vec<String>,
    ) -> Result<UserModel, RepositoryError> {
        let user = self
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("User not found".to_string()))?;

        let mut active = user.into_active_model();
        active.global_roles = Set(roles_to_json(&global_roles));
        active.updated_at = Set(Utc::now().into());

        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// The user's cross-tenant roles
    pub fn global_roles(user: &UserModel) -> Vec<String> {
        roles_from_json(&user.global_roles)
    }
}

fn validate_email(email: &str) -> Result<(), RepositoryError> {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(RepositoryError::validation_error("invalid email address"));
    }
    Ok(())
}

/// Hash a password for storage using Argon2 with a random salt.
pub fn hash_password(password: &str) -> Result<String, RepositoryError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| RepositoryError::validation_error(format!("password hashing failed: {e}")))
}

/// Verify a candidate password against a stored hash.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn test_hashes_are_salted() {
        let first = hash_password("same password").unwrap();
        let second = hash_password("same password").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_garbage_stored_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", ""));
    }

    #[test]
    fn test_email_validation() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
    }
}
