//! Password verification.

use argon2::{Argon2, PasswordVerifier, password_hash::PasswordHash};
use async_trait::async_trait;
use watchlog_common::{AppError, AppResult};
use watchlog_db::repositories::UserRepository;

/// Checks a user's password.
///
/// Lifecycle operations only need a yes/no answer; how credentials are
/// stored is up to the implementation.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Returns `Ok(false)` for a wrong password or an account without one.
    async fn verify_password(&self, user_id: &str, password: &str) -> AppResult<bool>;
}

/// Verifies against the Argon2 PHC string stored on the user row.
#[derive(Clone)]
pub struct Argon2CredentialVerifier {
    user_repo: UserRepository,
}

impl Argon2CredentialVerifier {
    #[must_use]
    pub const fn new(user_repo: UserRepository) -> Self {
        Self { user_repo }
    }
}

#[async_trait]
impl CredentialVerifier for Argon2CredentialVerifier {
    async fn verify_password(&self, user_id: &str, password: &str) -> AppResult<bool> {
        let user = self.user_repo.get_by_id(user_id).await?;

        match user.password_hash {
            Some(hash) => verify_hash(password, &hash),
            None => Ok(false),
        }
    }
}

/// Verify a password against a hash.
fn verify_hash(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| AppError::Internal(format!("Invalid hash: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use argon2::password_hash::{PasswordHasher, SaltString, rand_core::OsRng};
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::sync::Arc;
    use watchlog_db::entities::user;
    use watchlog_db::test_utils::fixtures;

    fn hash(password: &str) -> String {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .unwrap()
            .to_string()
    }

    fn verifier_for(user: user::Model) -> Argon2CredentialVerifier {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[user]])
                .into_connection(),
        );
        Argon2CredentialVerifier::new(UserRepository::new(db))
    }

    #[test]
    fn test_verify_hash() {
        let stored = hash("correct horse");
        assert!(verify_hash("correct horse", &stored).unwrap());
        assert!(!verify_hash("battery staple", &stored).unwrap());
    }

    #[test]
    fn test_verify_hash_rejects_malformed_hash() {
        let result = verify_hash("anything", "not-a-phc-string");
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn test_verify_password_against_user_row() {
        let user = user::Model {
            password_hash: Some(hash("hunter2")),
            ..fixtures::user("user1")
        };

        let verifier = verifier_for(user);
        assert!(verifier.verify_password("user1", "hunter2").await.unwrap());
    }

    #[tokio::test]
    async fn test_account_without_password_never_verifies() {
        let verifier = verifier_for(fixtures::user("user1"));
        assert!(!verifier.verify_password("user1", "").await.unwrap());
    }
}
