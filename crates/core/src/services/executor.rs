//! Deferred execution of disposition plans.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use watchlog_common::AppResult;
use watchlog_db::entities::group;
use watchlog_db::repositories::{DispositionPlanRepository, GroupRepository, UserRepository};

use super::disposition::{DispositionDirective, EligibilityChecker, decode_directives};
use super::lifecycle::AccountState;

/// What happened to one directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum DirectiveOutcome {
    Deleted,
    Transferred,
    /// The transfer went stale since planning; the group was deleted instead.
    FallbackDeleted { reason: String },
    /// Nothing left to do for this group.
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectiveReport {
    pub directive: DispositionDirective,
    pub outcome: DirectiveOutcome,
}

/// Result of one executor run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub outcomes: Vec<DirectiveReport>,
    /// A plan was found but dropped unapplied because the account is no
    /// longer heading for deletion.
    pub discarded: bool,
}

impl ExecutionReport {
    /// True when there was no plan to run.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.outcomes.is_empty() && !self.discarded
    }
}

/// The group a directive targets, if it is still live and owned by the
/// user who issued the plan.
pub(crate) fn live_owned_group(
    group: Option<group::Model>,
    issuer_id: &str,
) -> Result<group::Model, String> {
    match group {
        None => Err("group no longer exists".to_string()),
        Some(g) if g.is_deleted() => Err("group is already deleted".to_string()),
        Some(g) if g.owner_id != issuer_id => Err("group is no longer owned by the user".to_string()),
        Some(g) => Ok(g),
    }
}

/// One async mutex per user id, dropped once nobody holds it.
#[derive(Clone, Default)]
pub(crate) struct UserLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl UserLocks {
    /// Wait for exclusive access to the user's plan and lifecycle state.
    pub(crate) async fn lock(&self, user_id: &str) -> UserLockGuard {
        let handle = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(user_id.to_string()).or_default().clone()
        };
        let guard = handle.lock_owned().await;

        UserLockGuard {
            locks: self.clone(),
            user_id: user_id.to_string(),
            guard: Some(guard),
        }
    }

    fn release(&self, user_id: &str) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if map.get(user_id).is_some_and(|h| Arc::strong_count(h) == 1) {
            map.remove(user_id);
        }
    }
}

/// Held for as long as one user's plan may be read or written.
pub(crate) struct UserLockGuard {
    locks: UserLocks,
    user_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.user_id);
    }
}

/// Applies stored disposition plans, re-checking each directive against
/// current state.
#[derive(Clone)]
pub struct DispositionExecutor {
    user_repo: UserRepository,
    group_repo: GroupRepository,
    plan_repo: DispositionPlanRepository,
    eligibility: EligibilityChecker,
    locks: UserLocks,
}

impl DispositionExecutor {
    #[must_use]
    pub fn new(
        user_repo: UserRepository,
        group_repo: GroupRepository,
        plan_repo: DispositionPlanRepository,
        eligibility: EligibilityChecker,
    ) -> Self {
        Self {
            user_repo,
            group_repo,
            plan_repo,
            eligibility,
            locks: UserLocks::default(),
        }
    }

    /// Run the user's pending plan, if any.
    ///
    /// Directives are applied independently and the plan is consumed once
    /// all of them have been handled. A persistence error aborts the run
    /// and leaves the plan in place for a later retry; directives applied
    /// before the error are skipped on that retry.
    pub async fn run_deferred_dispositions(&self, user_id: &str) -> AppResult<ExecutionReport> {
        let _guard = self.locks.lock(user_id).await;
        self.run_locked(user_id).await
    }

    /// Block plan runs for `user_id` while the guard lives.
    ///
    /// Must not be held across a call to
    /// [`run_deferred_dispositions`](Self::run_deferred_dispositions) for the
    /// same user.
    pub(crate) async fn lock_user(&self, user_id: &str) -> UserLockGuard {
        self.locks.lock(user_id).await
    }

    async fn run_locked(&self, user_id: &str) -> AppResult<ExecutionReport> {
        let Some(plan) = self.plan_repo.find_by_user_id(user_id).await? else {
            return Ok(ExecutionReport::default());
        };

        let heading_for_deletion = match self.user_repo.find_by_id(user_id).await? {
            Some(user) => matches!(
                AccountState::from_model(&user)?,
                AccountState::PendingDeletion { .. } | AccountState::Deleted
            ),
            None => false,
        };

        if !heading_for_deletion {
            if !self.plan_repo.consume(&plan.id).await? {
                tracing::warn!(user_id = user_id, plan_id = %plan.id, "Plan consumed concurrently");
            }
            tracing::info!(
                user_id = user_id,
                plan_id = %plan.id,
                "Discarded disposition plan of account not pending deletion"
            );
            return Ok(ExecutionReport {
                outcomes: Vec::new(),
                discarded: true,
            });
        }

        let directives = decode_directives(plan.directives)?;
        let mut outcomes = Vec::with_capacity(directives.len());

        for directive in directives {
            let outcome = self.apply(user_id, &directive).await?;

            match &outcome {
                DirectiveOutcome::FallbackDeleted { reason } => tracing::info!(
                    user_id = user_id,
                    group_id = directive.group_id(),
                    reason = %reason,
                    "Stale transfer directive, group deleted instead"
                ),
                DirectiveOutcome::Skipped { reason } => tracing::debug!(
                    user_id = user_id,
                    group_id = directive.group_id(),
                    reason = %reason,
                    "Directive skipped"
                ),
                DirectiveOutcome::Deleted | DirectiveOutcome::Transferred => tracing::info!(
                    user_id = user_id,
                    group_id = directive.group_id(),
                    outcome = ?outcome,
                    "Directive applied"
                ),
            }

            outcomes.push(DirectiveReport { directive, outcome });
        }

        if !self.plan_repo.consume(&plan.id).await? {
            tracing::warn!(user_id = user_id, plan_id = %plan.id, "Plan consumed concurrently");
        }

        tracing::info!(
            user_id = user_id,
            directives = outcomes.len(),
            "Disposition plan executed"
        );

        Ok(ExecutionReport {
            outcomes,
            discarded: false,
        })
    }

    async fn apply(
        &self,
        issuer_id: &str,
        directive: &DispositionDirective,
    ) -> AppResult<DirectiveOutcome> {
        let group = self.group_repo.find_by_id(directive.group_id()).await?;
        let group = match live_owned_group(group, issuer_id) {
            Ok(group) => group,
            Err(reason) => return Ok(DirectiveOutcome::Skipped { reason }),
        };

        match directive {
            DispositionDirective::Delete { .. } => self.delete(&group.id, None).await,
            DispositionDirective::Transfer { target_user_id, .. } => {
                match self.eligibility.check(&group, target_user_id, 0).await? {
                    Err(stale) => self.delete(&group.id, Some(stale.to_string())).await,
                    Ok(()) => {
                        if self
                            .group_repo
                            .transfer_ownership(&group.id, issuer_id, target_user_id)
                            .await?
                        {
                            Ok(DirectiveOutcome::Transferred)
                        } else {
                            Ok(DirectiveOutcome::Skipped {
                                reason: "ownership changed during transfer".to_string(),
                            })
                        }
                    }
                }
            }
        }
    }

    async fn delete(&self, group_id: &str, stale: Option<String>) -> AppResult<DirectiveOutcome> {
        if !self.group_repo.mark_deleted(group_id).await? {
            return Ok(DirectiveOutcome::Skipped {
                reason: "group is already deleted".to_string(),
            });
        }

        Ok(match stale {
            Some(reason) => DirectiveOutcome::FallbackDeleted { reason },
            None => DirectiveOutcome::Deleted,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use serde_json::json;
    use watchlog_db::entities::disposition_plan;
    use watchlog_db::entities::group_member::{self, GroupRole};
    use watchlog_db::test_utils::fixtures;

    use crate::services::lifecycle::LifecycleSettings;

    fn exec(rows_affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected,
        }
    }

    fn count(n: i64) -> std::collections::BTreeMap<&'static str, sea_orm::Value> {
        maplit::btreemap! { "num_items" => sea_orm::Value::BigInt(Some(n)) }
    }

    fn pending(id: &str) -> watchlog_db::entities::user::Model {
        fixtures::pending_deletion_user(id, Utc::now() - Duration::days(3))
    }

    fn executor(user_db: MockDatabase, group_db: MockDatabase, plan_db: MockDatabase) -> DispositionExecutor {
        let user_repo = UserRepository::new(Arc::new(user_db.into_connection()));
        let group_repo = GroupRepository::new(Arc::new(group_db.into_connection()));
        let plan_repo = DispositionPlanRepository::new(Arc::new(plan_db.into_connection()));
        let eligibility = EligibilityChecker::new(
            user_repo.clone(),
            group_repo.clone(),
            LifecycleSettings::default(),
        );
        DispositionExecutor::new(user_repo, group_repo, plan_repo, eligibility)
    }

    #[test]
    fn test_live_owned_group() {
        assert!(live_owned_group(None, "alice").is_err());

        let mut deleted = fixtures::group("g1", "alice");
        deleted.deleted_at = Some(Utc::now().into());
        assert!(live_owned_group(Some(deleted), "alice").is_err());

        let handed_over = fixtures::group("g1", "bob");
        assert!(live_owned_group(Some(handed_over), "alice").is_err());

        assert!(live_owned_group(Some(fixtures::group("g1", "alice")), "alice").is_ok());
    }

    #[tokio::test]
    async fn test_no_plan_is_noop() {
        let plan_db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<disposition_plan::Model>::new()]);

        let executor = executor(
            MockDatabase::new(DatabaseBackend::Postgres),
            MockDatabase::new(DatabaseBackend::Postgres),
            plan_db,
        );

        let report = executor.run_deferred_dispositions("alice").await.unwrap();
        assert!(report.is_noop());
    }

    #[tokio::test]
    async fn test_transfer_to_departed_member_falls_back_to_delete() {
        let plan = fixtures::plan(
            "plan1",
            "alice",
            json!([{"action": "transfer", "groupId": "g1", "targetUserId": "bob"}]),
        );

        let plan_db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[plan]])
            .append_exec_results([exec(1)]);
        let user_db =
            MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[pending("alice")]]);
        let group_db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::group("g1", "alice")]])
            .append_query_results([Vec::<group_member::Model>::new()])
            .append_exec_results([exec(1)]);

        let executor = executor(user_db, group_db, plan_db);
        let report = executor.run_deferred_dispositions("alice").await.unwrap();

        assert_eq!(report.outcomes.len(), 1);
        match &report.outcomes[0].outcome {
            DirectiveOutcome::FallbackDeleted { reason } => {
                assert!(reason.contains("not a member"));
            }
            other => panic!("Expected FallbackDeleted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transfer_to_inactive_target_falls_back_to_delete() {
        let plan = fixtures::plan(
            "plan1",
            "alice",
            json!([
                {"action": "transfer", "groupId": "g1", "targetUserId": "bob"},
                {"action": "transfer", "groupId": "g2", "targetUserId": "carol"}
            ]),
        );

        let plan_db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[plan]])
            .append_exec_results([exec(1)]);
        let user_db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[pending("alice")]])
            .append_query_results([[fixtures::deactivated_user("bob", Utc::now())]])
            .append_query_results([[fixtures::deleted_user("carol")]]);
        let group_db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::group("g1", "alice")]])
            .append_query_results([[fixtures::member("g1", "bob", GroupRole::Admin)]])
            .append_query_results([[fixtures::group("g2", "alice")]])
            .append_query_results([[fixtures::member("g2", "carol", GroupRole::Member)]])
            .append_exec_results([exec(1), exec(1)]);

        let executor = executor(user_db, group_db, plan_db);
        let report = executor.run_deferred_dispositions("alice").await.unwrap();

        let reasons: Vec<&str> = report
            .outcomes
            .iter()
            .map(|r| match &r.outcome {
                DirectiveOutcome::FallbackDeleted { reason } => reason.as_str(),
                other => panic!("Expected FallbackDeleted, got {other:?}"),
            })
            .collect();
        assert_eq!(
            reasons,
            ["target account is Deactivated", "target account is Deleted"]
        );
        assert!(!report.discarded);
    }

    #[tokio::test]
    async fn test_transfer_to_eligible_member() {
        let plan = fixtures::plan(
            "plan1",
            "alice",
            json!([{"action": "transfer", "groupId": "g1", "targetUserId": "bob"}]),
        );

        let plan_db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[plan]])
            .append_exec_results([exec(1)]);
        let user_db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[pending("alice")]])
            .append_query_results([[fixtures::user("bob")]]);
        let group_db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::group("g1", "alice")]])
            .append_query_results([[fixtures::member("g1", "bob", GroupRole::Member)]])
            .append_query_results([[count(0)]])
            .append_exec_results([exec(1), exec(1), exec(1)]);

        let executor = executor(user_db, group_db, plan_db);
        let report = executor.run_deferred_dispositions("alice").await.unwrap();

        assert_eq!(report.outcomes[0].outcome, DirectiveOutcome::Transferred);
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let plan = fixtures::plan("plan1", "alice", json!([{"action": "delete", "groupId": "g1"}]));

        let plan_db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[plan]])
            .append_exec_results([exec(1)])
            .append_query_results([Vec::<disposition_plan::Model>::new()]);
        let user_db =
            MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[pending("alice")]]);
        let group_db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::group("g1", "alice")]])
            .append_exec_results([exec(1)]);

        let executor = executor(user_db, group_db, plan_db);

        let first = executor.run_deferred_dispositions("alice").await.unwrap();
        assert_eq!(first.outcomes[0].outcome, DirectiveOutcome::Deleted);

        let second = executor.run_deferred_dispositions("alice").await.unwrap();
        assert!(second.is_noop());
    }

    #[tokio::test]
    async fn test_one_stale_directive_does_not_stop_the_rest() {
        let plan = fixtures::plan(
            "plan1",
            "alice",
            json!([
                {"action": "delete", "groupId": "gone"},
                {"action": "delete", "groupId": "g2"}
            ]),
        );

        let plan_db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[plan]])
            .append_exec_results([exec(1)]);
        let user_db =
            MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[pending("alice")]]);
        let group_db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<group::Model>::new()])
            .append_query_results([[fixtures::group("g2", "alice")]])
            .append_exec_results([exec(1)]);

        let executor = executor(user_db, group_db, plan_db);
        let report = executor.run_deferred_dispositions("alice").await.unwrap();

        assert!(matches!(
            report.outcomes[0].outcome,
            DirectiveOutcome::Skipped { .. }
        ));
        assert_eq!(report.outcomes[1].outcome, DirectiveOutcome::Deleted);
    }

    #[tokio::test]
    async fn test_plan_of_reactivated_account_is_discarded() {
        let plan = fixtures::plan("plan1", "alice", json!([{"action": "delete", "groupId": "g1"}]));

        let plan_db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[plan]])
            .append_exec_results([exec(1)]);
        let user_db =
            MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[fixtures::user("alice")]]);

        // No group results: touching a group would fail the run.
        let executor = executor(user_db, MockDatabase::new(DatabaseBackend::Postgres), plan_db);
        let report = executor.run_deferred_dispositions("alice").await.unwrap();

        assert!(report.discarded);
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_user_locks_are_released() {
        let locks = UserLocks::default();

        let alice = locks.lock("alice").await;
        let bob = locks.lock("bob").await;
        assert_eq!(locks.inner.lock().unwrap().len(), 2);

        drop(alice);
        assert!(!locks.inner.lock().unwrap().contains_key("alice"));
        drop(bob);
        assert!(locks.inner.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_plan_run_waits_for_held_user_lock() {
        let plan_db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<disposition_plan::Model>::new()]);
        let executor = executor(
            MockDatabase::new(DatabaseBackend::Postgres),
            MockDatabase::new(DatabaseBackend::Postgres),
            plan_db,
        );

        let guard = executor.lock_user("alice").await;
        let run = tokio::spawn({
            let executor = executor.clone();
            async move { executor.run_deferred_dispositions("alice").await }
        });

        tokio::task::yield_now().await;
        assert!(!run.is_finished());

        drop(guard);
        assert!(run.await.unwrap().unwrap().is_noop());
    }
}
