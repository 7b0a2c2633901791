//! User repository.

use std::sync::Arc;

use crate::entities::user::AccountStatus;
use crate::entities::{DispositionPlan, User, disposition_plan, user};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use watchlog_common::{AppError, AppResult};

/// Lifecycle columns written together on every account transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleColumns {
    /// Stored status.
    pub status: AccountStatus,
    /// When the account was deactivated.
    pub deactivated_at: Option<DateTime<Utc>>,
    /// Deletion countdown anchor.
    pub deletion_requested_at: Option<DateTime<Utc>>,
}

/// User repository for database operations.
#[derive(Clone)]
pub struct UserRepository {
    db: Arc<DatabaseConnection>,
}

impl UserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a user by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<user::Model>> {
        User::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a user by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<user::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))
    }

    /// Find users by IDs.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<user::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        User::find()
            .filter(user::Column::Id.is_in(ids.to_vec()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new user.
    pub async fn create(&self, model: user::ActiveModel) -> AppResult<user::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a user.
    pub async fn update(&self, model: user::ActiveModel) -> AppResult<user::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Persist a lifecycle transition.
    pub async fn save_lifecycle(
        &self,
        user: user::Model,
        columns: LifecycleColumns,
    ) -> AppResult<user::Model> {
        self.update(lifecycle_update(user, columns)).await
    }

    /// Persist a lifecycle transition and replace the user's disposition plan
    /// in one transaction.
    ///
    /// Any stored plan is removed; `plan`, if given, takes its place. Returns
    /// the updated row and the number of plans removed.
    pub async fn save_lifecycle_with_plan(
        &self,
        user: user::Model,
        columns: LifecycleColumns,
        plan: Option<disposition_plan::ActiveModel>,
    ) -> AppResult<(user::Model, u64)> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let dropped = DispositionPlan::delete_many()
            .filter(disposition_plan::Column::UserId.eq(user.id.clone()))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .rows_affected;

        if let Some(plan) = plan {
            plan.insert(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        let saved = lifecycle_update(user, columns)
            .update(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok((saved, dropped))
    }

    /// Accounts pending deletion whose countdown started at or before `cutoff`.
    pub async fn find_pending_deletion_due(
        &self,
        cutoff: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<Vec<user::Model>> {
        User::find()
            .filter(user::Column::AccountStatus.eq(AccountStatus::PendingDeletion))
            .filter(user::Column::DeletionRequestedAt.lte(cutoff))
            .order_by_asc(user::Column::DeletionRequestedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

fn lifecycle_update(user: user::Model, columns: LifecycleColumns) -> user::ActiveModel {
    let mut active: user::ActiveModel = user.into();
    active.account_status = Set(columns.status);
    active.deactivated_at = Set(columns.deactivated_at.map(Into::into));
    active.deletion_requested_at = Set(columns.deletion_requested_at.map(Into::into));
    active.updated_at = Set(Some(Utc::now().into()));
    active
}
