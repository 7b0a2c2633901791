//! Watch repository.

use std::sync::Arc;

use crate::entities::{Watch, watch};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use watchlog_common::{AppError, AppResult};

/// Watch repository for database operations.
#[derive(Clone)]
pub struct WatchRepository {
    db: Arc<DatabaseConnection>,
}

impl WatchRepository {
    /// Create a new watch repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a watch by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<watch::Model>> {
        Watch::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a watch by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<watch::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Watch not found: {id}")))
    }

    /// Latest watches of the given users, private ones included.
    ///
    /// Callers decide what each viewer may see.
    pub async fn find_by_user_ids(
        &self,
        user_ids: &[String],
        limit: u64,
    ) -> AppResult<Vec<watch::Model>> {
        if user_ids.is_empty() {
            return Ok(vec![]);
        }

        Watch::find()
            .filter(watch::Column::UserId.is_in(user_ids.to_vec()))
            .order_by_desc(watch::Column::WatchedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All non-private watches of the given users.
    pub async fn find_non_private_by_user_ids(
        &self,
        user_ids: &[String],
    ) -> AppResult<Vec<watch::Model>> {
        if user_ids.is_empty() {
            return Ok(vec![]);
        }

        Watch::find()
            .filter(watch::Column::UserId.is_in(user_ids.to_vec()))
            .filter(watch::Column::IsPrivate.eq(false))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
