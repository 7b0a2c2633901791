//! Group membership predicates.

use std::collections::HashSet;

use watchlog_common::AppResult;
use watchlog_db::repositories::GroupRepository;

/// Answers co-membership questions from current membership rows.
#[derive(Clone)]
pub struct GroupMembershipOracle {
    group_repo: GroupRepository,
}

impl GroupMembershipOracle {
    #[must_use]
    pub const fn new(group_repo: GroupRepository) -> Self {
        Self { group_repo }
    }

    /// Whether `user_id` has a membership row in `group_id`.
    pub async fn is_member(&self, user_id: &str, group_id: &str) -> AppResult<bool> {
        self.group_repo.is_member(user_id, group_id).await
    }

    /// The live groups a user belongs to.
    pub async fn group_ids(&self, user_id: &str) -> AppResult<HashSet<String>> {
        Ok(self
            .group_repo
            .find_group_ids_for_user(user_id)
            .await?
            .into_iter()
            .collect())
    }

    /// Whether the two users have at least one live group in common.
    pub async fn share_group(&self, user_a: &str, user_b: &str) -> AppResult<bool> {
        let groups_a = self.group_ids(user_a).await?;
        if groups_a.is_empty() {
            return Ok(false);
        }
        let groups_b = self.group_ids(user_b).await?;
        Ok(intersects(&groups_a, &groups_b))
    }
}

/// Non-empty intersection test. Symmetric in its arguments.
#[must_use]
pub fn intersects(a: &HashSet<String>, b: &HashSet<String>) -> bool {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small.iter().any(|id| large.contains(id))
}
