//! Disposition plan repository.

use std::sync::Arc;

use crate::entities::{DispositionPlan, disposition_plan};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use watchlog_common::{AppError, AppResult};

/// Disposition plan repository for database operations.
#[derive(Clone)]
pub struct DispositionPlanRepository {
    db: Arc<DatabaseConnection>,
}

impl DispositionPlanRepository {
    /// Create a new disposition plan repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find the pending plan for a user.
    pub async fn find_by_user_id(
        &self,
        user_id: &str,
    ) -> AppResult<Option<disposition_plan::Model>> {
        DispositionPlan::find()
            .filter(disposition_plan::Column::UserId.eq(user_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Store a new plan.
    pub async fn create(
        &self,
        model: disposition_plan::ActiveModel,
    ) -> AppResult<disposition_plan::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Drop whatever plan a user has. Returns the number of rows removed.
    pub async fn delete_by_user_id(&self, user_id: &str) -> AppResult<u64> {
        let result = DispositionPlan::delete_many()
            .filter(disposition_plan::Column::UserId.eq(user_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Remove exactly the plan that was read.
    ///
    /// Returns `false` when the row is already gone, i.e. another run
    /// consumed the plan first.
    pub async fn consume(&self, plan_id: &str) -> AppResult<bool> {
        let result = DispositionPlan::delete_by_id(plan_id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected == 1)
    }
}
