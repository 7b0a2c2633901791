//! Group disposition planning.
//!
//! Before an account may enter the deletion countdown, every group it owns
//! needs a directive: delete it, or hand it to an eligible member. The
//! accepted list is stored as one plan per user and executed later by
//! [`super::executor::DispositionExecutor`].

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use watchlog_common::{AppError, AppResult};
use watchlog_db::entities::group;
use watchlog_db::entities::user::AccountStatus;
use watchlog_db::repositories::{GroupRepository, UserRepository};

use super::lifecycle::LifecycleSettings;

/// What to do with one owned group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum DispositionDirective {
    #[serde(rename_all = "camelCase")]
    Delete { group_id: String },
    #[serde(rename_all = "camelCase")]
    Transfer {
        group_id: String,
        target_user_id: String,
    },
}

impl DispositionDirective {
    #[must_use]
    pub fn group_id(&self) -> &str {
        match self {
            Self::Delete { group_id } | Self::Transfer { group_id, .. } => group_id,
        }
    }
}

/// Serialize a directive list for storage, order preserved.
pub(crate) fn encode_directives(
    directives: &[DispositionDirective],
) -> AppResult<serde_json::Value> {
    serde_json::to_value(directives)
        .map_err(|e| AppError::Internal(format!("Failed to encode directives: {e}")))
}

/// Read back a stored directive list.
pub(crate) fn decode_directives(
    value: serde_json::Value,
) -> AppResult<Vec<DispositionDirective>> {
    serde_json::from_value(value)
        .map_err(|e| AppError::Internal(format!("Corrupt disposition plan: {e}")))
}

/// Why a member cannot receive ownership of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ineligibility {
    AlreadyOwner,
    NotMember,
    UnknownAccount,
    AccountInactive(AccountStatus),
    OwnershipLimitReached { owned: u64, limit: u64 },
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyOwner => write!(f, "target already owns the group"),
            Self::NotMember => write!(f, "target is not a member of the group"),
            Self::UnknownAccount => write!(f, "target account does not exist"),
            Self::AccountInactive(status) => write!(f, "target account is {status:?}"),
            Self::OwnershipLimitReached { owned, limit } => write!(
                f,
                "target owns {owned} group(s) and the free tier allows {limit}"
            ),
        }
    }
}

/// Decides whether a user may receive ownership of a group.
///
/// Planning, the UI helper and deferred execution all go through
/// [`EligibilityChecker::check`].
#[derive(Clone)]
pub struct EligibilityChecker {
    user_repo: UserRepository,
    group_repo: GroupRepository,
    settings: LifecycleSettings,
}

impl EligibilityChecker {
    #[must_use]
    pub const fn new(
        user_repo: UserRepository,
        group_repo: GroupRepository,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            user_repo,
            group_repo,
            settings,
        }
    }

    /// Check `target_id` against the current state of `group`.
    ///
    /// `incoming` counts transfers to the same target already accepted
    /// earlier in the batch being validated.
    pub async fn check(
        &self,
        group: &group::Model,
        target_id: &str,
        incoming: u64,
    ) -> AppResult<Result<(), Ineligibility>> {
        if group.owner_id == target_id {
            return Ok(Err(Ineligibility::AlreadyOwner));
        }

        if !self.group_repo.is_member(target_id, &group.id).await? {
            return Ok(Err(Ineligibility::NotMember));
        }

        let Some(target) = self.user_repo.find_by_id(target_id).await? else {
            return Ok(Err(Ineligibility::UnknownAccount));
        };
        if target.account_status != AccountStatus::Active {
            return Ok(Err(Ineligibility::AccountInactive(target.account_status)));
        }

        if !target.is_premium {
            let owned = self.group_repo.count_owned_by_user(target_id).await? + incoming;
            let limit = self.settings.free_tier_group_limit;
            if owned >= limit {
                return Ok(Err(Ineligibility::OwnershipLimitReached { owned, limit }));
            }
        }

        Ok(Ok(()))
    }
}

/// Eligibility of one member to take over a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberEligibility {
    pub user_id: String,
    pub is_eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// An owned group with the members who could take it over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedGroupEligibility {
    pub group_id: String,
    pub name: String,
    pub members: Vec<MemberEligibility>,
}

/// Structural checks that need no lookups: every directive names an owned
/// group, no group appears twice, every owned group is covered and nobody
/// transfers to themselves.
pub fn check_coverage(
    user_id: &str,
    owned_group_ids: &[String],
    directives: &[DispositionDirective],
) -> Result<(), String> {
    let owned: HashSet<&str> = owned_group_ids.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();

    for (index, directive) in directives.iter().enumerate() {
        let group_id = directive.group_id();

        if !owned.contains(group_id) {
            return Err(format!(
                "directive {index}: group {group_id} is not owned by the user"
            ));
        }
        if !seen.insert(group_id) {
            return Err(format!(
                "directive {index}: group {group_id} appears more than once"
            ));
        }
        if matches!(directive, DispositionDirective::Transfer { target_user_id, .. } if target_user_id == user_id)
        {
            return Err(format!(
                "directive {index}: cannot transfer group {group_id} to its owner"
            ));
        }
    }

    if let Some(missing) = owned_group_ids
        .iter()
        .find(|id| !seen.contains(id.as_str()))
    {
        return Err(format!("no directive for owned group {missing}"));
    }

    Ok(())
}

/// Validates disposition directives at deletion-request time.
#[derive(Clone)]
pub struct DispositionPlanner {
    user_repo: UserRepository,
    group_repo: GroupRepository,
    eligibility: EligibilityChecker,
}

impl DispositionPlanner {
    #[must_use]
    pub const fn new(
        user_repo: UserRepository,
        group_repo: GroupRepository,
        eligibility: EligibilityChecker,
    ) -> Self {
        Self {
            user_repo,
            group_repo,
            eligibility,
        }
    }

    /// Validate a full directive batch for `user_id`.
    ///
    /// Either every directive is acceptable or the whole batch is rejected
    /// with [`AppError::Validation`] naming the first failure. Nothing is
    /// written.
    pub async fn validate(
        &self,
        user_id: &str,
        directives: &[DispositionDirective],
    ) -> AppResult<()> {
        let owned = self.group_repo.find_owned_by_user(user_id).await?;
        let owned_ids: Vec<String> = owned.iter().map(|g| g.id.clone()).collect();

        check_coverage(user_id, &owned_ids, directives).map_err(AppError::Validation)?;

        let groups: HashMap<&str, &group::Model> =
            owned.iter().map(|g| (g.id.as_str(), g)).collect();
        let mut incoming: HashMap<&str, u64> = HashMap::new();

        for (index, directive) in directives.iter().enumerate() {
            let DispositionDirective::Transfer {
                group_id,
                target_user_id,
            } = directive
            else {
                continue;
            };

            let Some(group) = groups.get(group_id.as_str()) else {
                continue;
            };

            let already = incoming.get(target_user_id.as_str()).copied().unwrap_or(0);
            if let Err(reason) = self
                .eligibility
                .check(group, target_user_id, already)
                .await?
            {
                return Err(AppError::Validation(format!(
                    "directive {index}: cannot transfer group {group_id} to {target_user_id}: {reason}"
                )));
            }
            *incoming.entry(target_user_id.as_str()).or_insert(0) += 1;
        }

        Ok(())
    }

    /// Owned groups and, per member, whether they could take it over.
    ///
    /// Read-only; meant to be shown before directives are submitted.
    pub async fn get_owned_groups_with_eligibility(
        &self,
        user_id: &str,
    ) -> AppResult<Vec<OwnedGroupEligibility>> {
        self.user_repo.get_by_id(user_id).await?;

        let owned = self.group_repo.find_owned_by_user(user_id).await?;
        let mut result = Vec::with_capacity(owned.len());

        for group in owned {
            let members = self.group_repo.list_members(&group.id).await?;
            let mut candidates = Vec::with_capacity(members.len());

            for member in members.iter().filter(|m| m.user_id != group.owner_id) {
                let verdict = self.eligibility.check(&group, &member.user_id, 0).await?;
                candidates.push(MemberEligibility {
                    user_id: member.user_id.clone(),
                    is_eligible: verdict.is_ok(),
                    reason: verdict.err().map(|r| r.to_string()),
                });
            }

            result.push(OwnedGroupEligibility {
                group_id: group.id,
                name: group.name,
                members: candidates,
            });
        }

        Ok(result)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use serde_json::json;
    use std::sync::Arc;
    use watchlog_db::entities::group_member::{self, GroupRole};
    use watchlog_db::entities::user;
    use watchlog_db::test_utils::fixtures;

    fn delete(group_id: &str) -> DispositionDirective {
        DispositionDirective::Delete {
            group_id: group_id.to_string(),
        }
    }

    fn transfer(group_id: &str, target: &str) -> DispositionDirective {
        DispositionDirective::Transfer {
            group_id: group_id.to_string(),
            target_user_id: target.to_string(),
        }
    }

    fn owned(ids: &[&str]) -> Vec<String> {
        ids.iter().map(ToString::to_string).collect()
    }

    fn count(n: i64) -> std::collections::BTreeMap<&'static str, sea_orm::Value> {
        maplit::btreemap! { "num_items" => sea_orm::Value::BigInt(Some(n)) }
    }

    fn checker(user_db: MockDatabase, group_db: MockDatabase) -> EligibilityChecker {
        EligibilityChecker::new(
            UserRepository::new(Arc::new(user_db.into_connection())),
            GroupRepository::new(Arc::new(group_db.into_connection())),
            LifecycleSettings::default(),
        )
    }

    #[test]
    fn test_directive_wire_format() {
        let directives = vec![delete("g1"), transfer("g2", "bob")];
        let value = encode_directives(&directives).unwrap();

        assert_eq!(
            value,
            json!([
                {"action": "delete", "groupId": "g1"},
                {"action": "transfer", "groupId": "g2", "targetUserId": "bob"}
            ])
        );
        assert_eq!(decode_directives(value).unwrap(), directives);
    }

    #[test]
    fn test_decode_rejects_unknown_action() {
        let result = decode_directives(json!([{"action": "archive", "groupId": "g1"}]));
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[test]
    fn test_coverage_accepts_exact_cover() {
        let result = check_coverage(
            "alice",
            &owned(&["g1", "g2"]),
            &[transfer("g2", "bob"), delete("g1")],
        );
        assert!(result.is_ok());
        assert!(check_coverage("alice", &[], &[]).is_ok());
    }

    #[test]
    fn test_coverage_rejects_missing_group() {
        let err = check_coverage("alice", &owned(&["g1", "g2"]), &[delete("g1")]).unwrap_err();
        assert!(err.contains("g2"));
    }

    #[test]
    fn test_coverage_rejects_foreign_group() {
        let err = check_coverage("alice", &owned(&["g1"]), &[delete("g1"), delete("g9")])
            .unwrap_err();
        assert!(err.contains("not owned"));
    }

    #[test]
    fn test_coverage_rejects_duplicates() {
        let err = check_coverage(
            "alice",
            &owned(&["g1"]),
            &[delete("g1"), transfer("g1", "bob")],
        )
        .unwrap_err();
        assert!(err.contains("more than once"));
    }

    #[test]
    fn test_coverage_rejects_self_transfer() {
        let err = check_coverage("alice", &owned(&["g1"]), &[transfer("g1", "alice")]).unwrap_err();
        assert!(err.contains("to its owner"));
    }

    #[tokio::test]
    async fn test_check_owner_is_not_eligible() {
        let checker = checker(
            MockDatabase::new(DatabaseBackend::Postgres),
            MockDatabase::new(DatabaseBackend::Postgres),
        );
        let group = fixtures::group("g1", "alice");

        let verdict = checker.check(&group, "alice", 0).await.unwrap();
        assert_eq!(verdict, Err(Ineligibility::AlreadyOwner));
    }

    #[tokio::test]
    async fn test_check_non_member() {
        let group_db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<group_member::Model>::new()]);
        let checker = checker(MockDatabase::new(DatabaseBackend::Postgres), group_db);

        let verdict = checker
            .check(&fixtures::group("g1", "alice"), "bob", 0)
            .await
            .unwrap();
        assert_eq!(verdict, Err(Ineligibility::NotMember));
    }

    #[tokio::test]
    async fn test_check_deactivated_member() {
        let group_db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::member("g1", "bob", GroupRole::Member)]]);
        let user_db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::deactivated_user("bob", chrono::Utc::now())]]);
        let checker = checker(user_db, group_db);

        let verdict = checker
            .check(&fixtures::group("g1", "alice"), "bob", 0)
            .await
            .unwrap();
        assert_eq!(
            verdict,
            Err(Ineligibility::AccountInactive(AccountStatus::Deactivated))
        );
    }

    #[tokio::test]
    async fn test_free_tier_owner_of_one_group_is_never_eligible() {
        let group_db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::member("g1", "bob", GroupRole::Member)]])
            .append_query_results([[count(1)]]);
        let user_db =
            MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[fixtures::user("bob")]]);
        let checker = checker(user_db, group_db);

        let verdict = checker
            .check(&fixtures::group("g1", "alice"), "bob", 0)
            .await
            .unwrap();
        assert_eq!(
            verdict,
            Err(Ineligibility::OwnershipLimitReached { owned: 1, limit: 1 })
        );
    }

    #[tokio::test]
    async fn test_premium_member_skips_ownership_cap() {
        let group_db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::member("g1", "bob", GroupRole::Member)]]);
        let user_db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[
            user::Model {
                is_premium: true,
                ..fixtures::user("bob")
            },
        ]]);
        let checker = checker(user_db, group_db);

        let verdict = checker
            .check(&fixtures::group("g1", "alice"), "bob", 0)
            .await
            .unwrap();
        assert_eq!(verdict, Ok(()));
    }

    #[tokio::test]
    async fn test_incoming_transfers_count_toward_cap() {
        let group_db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::member("g2", "bob", GroupRole::Member)]])
            .append_query_results([[count(0)]]);
        let user_db =
            MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[fixtures::user("bob")]]);
        let checker = checker(user_db, group_db);

        let verdict = checker
            .check(&fixtures::group("g2", "alice"), "bob", 1)
            .await
            .unwrap();
        assert!(matches!(
            verdict,
            Err(Ineligibility::OwnershipLimitReached { owned: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_validate_rejects_transfer_to_non_member() {
        // The planner and the checker read the same group table in order.
        let group_db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[fixtures::group("g1", "alice")]])
                .append_query_results([Vec::<group_member::Model>::new()])
                .into_connection(),
        );
        let user_db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());

        let group_repo = GroupRepository::new(group_db);
        let user_repo = UserRepository::new(user_db);
        let planner = DispositionPlanner::new(
            user_repo.clone(),
            group_repo.clone(),
            EligibilityChecker::new(user_repo, group_repo, LifecycleSettings::default()),
        );

        let result = planner.validate("alice", &[transfer("g1", "mallory")]).await;
        match result {
            Err(AppError::Validation(msg)) => {
                assert!(msg.contains("not a member"));
            }
            other => panic!("Expected Validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_owned_groups_with_eligibility() {
        let group_db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[fixtures::group("g1", "alice")]])
                .append_query_results([[
                    fixtures::member("g1", "alice", GroupRole::Creator),
                    fixtures::member("g1", "bob", GroupRole::Member),
                ]])
                // bob: membership lookup, then owned-group count.
                .append_query_results([[fixtures::member("g1", "bob", GroupRole::Member)]])
                .append_query_results([[count(1)]])
                .into_connection(),
        );
        let user_db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[fixtures::user("alice")]])
                .append_query_results([[fixtures::user("bob")]])
                .into_connection(),
        );

        let group_repo = GroupRepository::new(group_db);
        let user_repo = UserRepository::new(user_db);
        let planner = DispositionPlanner::new(
            user_repo.clone(),
            group_repo.clone(),
            EligibilityChecker::new(user_repo, group_repo, LifecycleSettings::default()),
        );

        let groups = planner
            .get_owned_groups_with_eligibility("alice")
            .await
            .unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members.len(), 1);
        assert_eq!(groups[0].members[0].user_id, "bob");
        assert!(!groups[0].members[0].is_eligible);
        assert!(groups[0].members[0].reason.is_some());
    }
}
