//! Test utilities for database operations.
//!
//! Provides helpers for setting up and tearing down test databases.

use std::sync::Arc;

use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr, Statement};
use tracing::info;

/// Test database configuration.
#[derive(Debug, Clone)]
pub struct TestDbConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database username.
    pub username: String,
    /// Database password.
    pub password: String,
    /// Database name.
    pub database: String,
}

impl Default for TestDbConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("TEST_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("TEST_DB_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5433),
            username: std::env::var("TEST_DB_USER").unwrap_or_else(|_| "watchlog_test".to_string()),
            password: std::env::var("TEST_DB_PASSWORD")
                .unwrap_or_else(|_| "watchlog_test".to_string()),
            database: std::env::var("TEST_DB_NAME").unwrap_or_else(|_| "watchlog_test".to_string()),
        }
    }
}

impl TestDbConfig {
    /// Get the database URL.
    #[must_use]
    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }

    /// Get URL for connecting to postgres database (for creating test DB).
    #[must_use]
    pub fn postgres_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/postgres",
            self.username, self.password, self.host, self.port
        )
    }
}

/// A test database context that manages the lifecycle of a test database.
pub struct TestDatabase {
    conn: Arc<DatabaseConnection>,
    /// Database configuration.
    pub config: TestDbConfig,
}

impl TestDatabase {
    /// Connect to an existing test database.
    pub async fn with_config(config: TestDbConfig) -> Result<Self, DbErr> {
        let conn = Database::connect(&config.database_url()).await?;

        info!(database = %config.database, "Connected to test database");

        Ok(Self {
            conn: Arc::new(conn),
            config,
        })
    }

    /// Create a unique test database (for parallel tests).
    pub async fn create_unique() -> Result<Self, DbErr> {
        let mut config = TestDbConfig::default();
        let unique_suffix = uuid::Uuid::new_v4().to_string().replace('-', "_");
        config.database = format!("watchlog_test_{}", &unique_suffix[..8]);

        // Connect to postgres to create the database
        let postgres_conn = Database::connect(&config.postgres_url()).await?;

        let create_db = format!("CREATE DATABASE \"{}\"", config.database);
        postgres_conn
            .execute(Statement::from_string(DatabaseBackend::Postgres, create_db))
            .await?;

        postgres_conn.close().await?;

        let conn = Database::connect(&config.database_url()).await?;

        info!(database = %config.database, "Created unique test database");

        Ok(Self {
            conn: Arc::new(conn),
            config,
        })
    }

    /// Shared handle to the connection, ready to hand to repositories.
    #[must_use]
    pub fn connection(&self) -> Arc<DatabaseConnection> {
        Arc::clone(&self.conn)
    }

    /// Drop the test database.
    ///
    /// Backends still held by repository clones are terminated server-side.
    pub async fn drop_database(self) -> Result<(), DbErr> {
        if let Ok(conn) = Arc::try_unwrap(self.conn) {
            conn.close().await?;
        }

        let postgres_conn = Database::connect(&self.config.postgres_url()).await?;

        let terminate = format!(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = '{}'",
            self.config.database
        );
        postgres_conn
            .execute(Statement::from_string(DatabaseBackend::Postgres, terminate))
            .await
            .ok(); // Ignore errors

        let drop_db = format!("DROP DATABASE IF EXISTS \"{}\"", self.config.database);
        postgres_conn
            .execute(Statement::from_string(DatabaseBackend::Postgres, drop_db))
            .await?;

        postgres_conn.close().await?;

        info!(database = %self.config.database, "Dropped test database");
        Ok(())
    }
}

/// Model builders shared by repository and service tests.
///
/// Every builder returns a row in its most ordinary state; tests tweak the
/// fields they care about.
pub mod fixtures {
    use chrono::{DateTime, Utc};
    use serde_json::Value;

    use crate::entities::group_member::GroupRole;
    use crate::entities::user::AccountStatus;
    use crate::entities::{disposition_plan, group, group_member, user, watch};

    /// An active account with default privacy toggles.
    #[must_use]
    pub fn user(id: &str) -> user::Model {
        user::Model {
            id: id.to_string(),
            username: id.to_string(),
            password_hash: None,
            is_premium: false,
            share_watches: true,
            share_ratings: true,
            share_notes: false,
            account_status: AccountStatus::Active,
            deactivated_at: None,
            deletion_requested_at: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    /// A deactivated account without a deletion countdown.
    #[must_use]
    pub fn deactivated_user(id: &str, since: DateTime<Utc>) -> user::Model {
        user::Model {
            account_status: AccountStatus::Deactivated,
            deactivated_at: Some(since.into()),
            ..user(id)
        }
    }

    /// An account whose deletion countdown started at `anchor`.
    #[must_use]
    pub fn pending_deletion_user(id: &str, anchor: DateTime<Utc>) -> user::Model {
        user::Model {
            account_status: AccountStatus::PendingDeletion,
            deactivated_at: Some(anchor.into()),
            deletion_requested_at: Some(anchor.into()),
            ..user(id)
        }
    }

    /// A deleted account.
    #[must_use]
    pub fn deleted_user(id: &str) -> user::Model {
        user::Model {
            account_status: AccountStatus::Deleted,
            ..user(id)
        }
    }

    /// A public, rated and annotated watch.
    #[must_use]
    pub fn watch(id: &str, user_id: &str, movie_id: &str) -> watch::Model {
        watch::Model {
            id: id.to_string(),
            user_id: user_id.to_string(),
            movie_id: movie_id.to_string(),
            watched_at: Utc::now().into(),
            rating: Some(8),
            notes: Some("rewatch with commentary".to_string()),
            is_private: false,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    /// A live group.
    #[must_use]
    pub fn group(id: &str, owner_id: &str) -> group::Model {
        group::Model {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            name: format!("Group {id}"),
            deleted_at: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    /// A membership row.
    #[must_use]
    pub fn member(group_id: &str, user_id: &str, role: GroupRole) -> group_member::Model {
        group_member::Model {
            id: format!("{group_id}-{user_id}"),
            user_id: user_id.to_string(),
            group_id: group_id.to_string(),
            role,
            joined_at: Utc::now().into(),
            updated_at: None,
        }
    }

    /// A stored disposition plan.
    #[must_use]
    pub fn plan(id: &str, user_id: &str, directives: Value) -> disposition_plan::Model {
        disposition_plan::Model {
            id: id.to_string(),
            user_id: user_id.to_string(),
            directives,
            created_at: Utc::now().into(),
        }
    }
}
