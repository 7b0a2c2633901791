//! Group repository.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, TransactionTrait, sea_query::Expr,
};
use watchlog_common::{AppError, AppResult};

use crate::entities::group_member::GroupRole;
use crate::entities::{Group, GroupMember, group, group_member};

/// Repository for group operations.
#[derive(Clone)]
pub struct GroupRepository {
    db: Arc<DatabaseConnection>,
}

impl GroupRepository {
    /// Create a new group repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    // ==================== Group Operations ====================

    /// Find group by ID, deleted groups included.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<group::Model>> {
        Group::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get group by ID, returning error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<group::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Group not found: {id}")))
    }

    /// Live groups owned by user, oldest first.
    pub async fn find_owned_by_user(&self, user_id: &str) -> AppResult<Vec<group::Model>> {
        Group::find()
            .filter(group::Column::OwnerId.eq(user_id))
            .filter(group::Column::DeletedAt.is_null())
            .order_by(group::Column::CreatedAt, Order::Asc)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count live groups owned by user.
    pub async fn count_owned_by_user(&self, user_id: &str) -> AppResult<u64> {
        Group::find()
            .filter(group::Column::OwnerId.eq(user_id))
            .filter(group::Column::DeletedAt.is_null())
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// IDs of the live groups a user belongs to.
    pub async fn find_group_ids_for_user(&self, user_id: &str) -> AppResult<Vec<String>> {
        let memberships = GroupMember::find()
            .filter(group_member::Column::UserId.eq(user_id))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let group_ids: Vec<String> = memberships.into_iter().map(|m| m.group_id).collect();

        if group_ids.is_empty() {
            return Ok(vec![]);
        }

        let groups = Group::find()
            .filter(group::Column::Id.is_in(group_ids))
            .filter(group::Column::DeletedAt.is_null())
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(groups.into_iter().map(|g| g.id).collect())
    }

    /// Create a new group.
    pub async fn create(&self, model: group::ActiveModel) -> AppResult<group::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Soft-delete a group. Returns `false` if it was already deleted.
    pub async fn mark_deleted(&self, id: &str) -> AppResult<bool> {
        let now = Utc::now();
        let result = Group::update_many()
            .col_expr(group::Column::DeletedAt, Expr::value(now))
            .col_expr(group::Column::UpdatedAt, Expr::value(now))
            .filter(group::Column::Id.eq(id))
            .filter(group::Column::DeletedAt.is_null())
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    /// Hand a live group from `from_user_id` to `to_user_id`.
    ///
    /// Moves `owner_id`, promotes the new owner to [`GroupRole::Creator`] and
    /// removes the previous owner's membership, all in one transaction.
    /// Returns `false` without writing anything when the group is deleted or
    /// no longer owned by `from_user_id`.
    pub async fn transfer_ownership(
        &self,
        group_id: &str,
        from_user_id: &str,
        to_user_id: &str,
    ) -> AppResult<bool> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let now = Utc::now();
        let moved = Group::update_many()
            .col_expr(group::Column::OwnerId, Expr::value(to_user_id))
            .col_expr(group::Column::UpdatedAt, Expr::value(now))
            .filter(group::Column::Id.eq(group_id))
            .filter(group::Column::OwnerId.eq(from_user_id))
            .filter(group::Column::DeletedAt.is_null())
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if moved.rows_affected == 0 {
            txn.rollback()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            return Ok(false);
        }

        GroupMember::update_many()
            .col_expr(group_member::Column::Role, Expr::value(GroupRole::Creator))
            .col_expr(group_member::Column::UpdatedAt, Expr::value(now))
            .filter(group_member::Column::GroupId.eq(group_id))
            .filter(group_member::Column::UserId.eq(to_user_id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        GroupMember::delete_many()
            .filter(group_member::Column::GroupId.eq(group_id))
            .filter(group_member::Column::UserId.eq(from_user_id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(true)
    }

    // ==================== Member Operations ====================

    /// Get member record.
    pub async fn get_member(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> AppResult<Option<group_member::Model>> {
        GroupMember::find()
            .filter(group_member::Column::UserId.eq(user_id))
            .filter(group_member::Column::GroupId.eq(group_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Check if user is a member of a group.
    pub async fn is_member(&self, user_id: &str, group_id: &str) -> AppResult<bool> {
        Ok(self.get_member(user_id, group_id).await?.is_some())
    }

    /// Add a member to a group.
    pub async fn add_member(
        &self,
        model: group_member::ActiveModel,
    ) -> AppResult<group_member::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// List members of a group, earliest joiners first.
    pub async fn list_members(&self, group_id: &str) -> AppResult<Vec<group_member::Model>> {
        GroupMember::find()
            .filter(group_member::Column::GroupId.eq(group_id))
            .order_by(group_member::Column::JoinedAt, Order::Asc)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn exec(rows_affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected,
        }
    }

    #[tokio::test]
    async fn test_find_owned_by_user() {
        let grp1 = fixtures::group("grp1", "user1");
        let grp2 = fixtures::group("grp2", "user1");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[grp1, grp2]])
                .into_connection(),
        );

        let repo = GroupRepository::new(db);
        let result = repo.find_owned_by_user("user1").await.unwrap();

        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_count_owned_by_user() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(2))
                }]])
                .into_connection(),
        );

        let repo = GroupRepository::new(db);
        assert_eq!(repo.count_owned_by_user("user1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_find_group_ids_skips_deleted_groups() {
        let m1 = fixtures::member("grp1", "user1", GroupRole::Member);
        let m2 = fixtures::member("grp2", "user1", GroupRole::Member);
        // Only grp1 survives the deleted_at filter.
        let grp1 = fixtures::group("grp1", "owner");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[m1, m2]])
                .append_query_results([[grp1]])
                .into_connection(),
        );

        let repo = GroupRepository::new(db);
        let ids = repo.find_group_ids_for_user("user1").await.unwrap();

        assert_eq!(ids, vec!["grp1".to_string()]);
    }

    #[tokio::test]
    async fn test_find_group_ids_no_memberships() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<group_member::Model>::new()])
                .into_connection(),
        );

        let repo = GroupRepository::new(db);
        assert!(repo.find_group_ids_for_user("loner").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_deleted_reports_whether_it_changed() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([exec(1), exec(0)])
                .into_connection(),
        );

        let repo = GroupRepository::new(db);
        assert!(repo.mark_deleted("grp1").await.unwrap());
        assert!(!repo.mark_deleted("grp1").await.unwrap());
    }

    #[tokio::test]
    async fn test_transfer_ownership_applies_all_writes() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([exec(1), exec(1), exec(1)])
                .into_connection(),
        );

        let repo = GroupRepository::new(db);
        assert!(repo.transfer_ownership("grp1", "owner", "heir").await.unwrap());
    }

    #[tokio::test]
    async fn test_transfer_ownership_stops_when_owner_changed() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([exec(0)])
                .into_connection(),
        );

        let repo = GroupRepository::new(db);
        assert!(!repo.transfer_ownership("grp1", "owner", "heir").await.unwrap());
    }

    #[tokio::test]
    async fn test_is_member() {
        let member = fixtures::member("grp1", "user2", GroupRole::Member);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[member]])
                .append_query_results([Vec::<group_member::Model>::new()])
                .into_connection(),
        );

        let repo = GroupRepository::new(db);
        assert!(repo.is_member("user2", "grp1").await.unwrap());
        assert!(!repo.is_member("user3", "grp1").await.unwrap());
    }
}
