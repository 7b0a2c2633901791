//! Account lifecycle: deactivation, deletion countdown, reactivation and
//! finalization.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use validator::Validate;
use watchlog_common::{AppError, AppResult, IdGenerator, LifecycleConfig};
use watchlog_db::entities::disposition_plan;
use watchlog_db::entities::user::{self, AccountStatus};
use watchlog_db::repositories::{GroupRepository, LifecycleColumns, UserRepository};

use super::credentials::CredentialVerifier;
use super::disposition::{
    DispositionDirective, DispositionPlanner, OwnedGroupEligibility, encode_directives,
};
use super::executor::{DispositionExecutor, ExecutionReport};

/// Tunables of the lifecycle workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// Days between a deletion request and finalization.
    pub deletion_grace_days: i64,
    /// Groups a non-premium account may own.
    pub free_tier_group_limit: u64,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            deletion_grace_days: 30,
            free_tier_group_limit: 1,
        }
    }
}

impl From<&LifecycleConfig> for LifecycleSettings {
    fn from(config: &LifecycleConfig) -> Self {
        Self {
            deletion_grace_days: config.deletion_grace_days,
            free_tier_group_limit: config.free_tier_group_limit,
        }
    }
}

/// Lifecycle state of an account with the timestamps each state needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Active,
    Deactivated {
        since: DateTime<Utc>,
    },
    PendingDeletion {
        deactivated_at: DateTime<Utc>,
        /// Start of the deletion countdown.
        anchor: DateTime<Utc>,
    },
    Deleted,
}

impl AccountState {
    /// Fold the stored status columns into a state.
    pub fn from_model(user: &user::Model) -> AppResult<Self> {
        let deactivated_at = user.deactivated_at.map(|t| t.with_timezone(&Utc));
        let anchor = user.deletion_requested_at.map(|t| t.with_timezone(&Utc));

        match (user.account_status, deactivated_at, anchor) {
            (AccountStatus::Active, _, _) => Ok(Self::Active),
            (AccountStatus::Deactivated, Some(since), _) => Ok(Self::Deactivated { since }),
            (AccountStatus::PendingDeletion, Some(deactivated_at), Some(anchor)) => {
                Ok(Self::PendingDeletion {
                    deactivated_at,
                    anchor,
                })
            }
            (AccountStatus::Deleted, _, _) => Ok(Self::Deleted),
            (status, _, _) => Err(AppError::Internal(format!(
                "User {} has status {status:?} with missing timestamps",
                user.id
            ))),
        }
    }

    /// Columns to persist for this state.
    #[must_use]
    pub const fn columns(&self) -> LifecycleColumns {
        match *self {
            Self::Active => LifecycleColumns {
                status: AccountStatus::Active,
                deactivated_at: None,
                deletion_requested_at: None,
            },
            Self::Deactivated { since } => LifecycleColumns {
                status: AccountStatus::Deactivated,
                deactivated_at: Some(since),
                deletion_requested_at: None,
            },
            Self::PendingDeletion {
                deactivated_at,
                anchor,
            } => LifecycleColumns {
                status: AccountStatus::PendingDeletion,
                deactivated_at: Some(deactivated_at),
                deletion_requested_at: Some(anchor),
            },
            Self::Deleted => LifecycleColumns {
                status: AccountStatus::Deleted,
                deactivated_at: None,
                deletion_requested_at: None,
            },
        }
    }

    pub fn deactivate(self, now: DateTime<Utc>) -> AppResult<Self> {
        match self {
            Self::Active => Ok(Self::Deactivated { since: now }),
            other => Err(AppError::InvalidState(format!(
                "cannot deactivate an account that is {}",
                other.label()
            ))),
        }
    }

    pub fn request_deletion(self, now: DateTime<Utc>) -> AppResult<Self> {
        match self {
            Self::Active | Self::Deactivated { .. } => Ok(Self::PendingDeletion {
                deactivated_at: now,
                anchor: now,
            }),
            other => Err(AppError::InvalidState(format!(
                "cannot request deletion of an account that is {}",
                other.label()
            ))),
        }
    }

    pub fn reactivate(self) -> AppResult<Self> {
        match self {
            Self::Deactivated { .. } | Self::PendingDeletion { .. } => Ok(Self::Active),
            other => Err(AppError::InvalidState(format!(
                "cannot reactivate an account that is {}",
                other.label()
            ))),
        }
    }

    /// Move to `Deleted` once the countdown has run out.
    pub fn finalize(self, now: DateTime<Utc>, grace_days: i64) -> AppResult<Self> {
        match self {
            Self::PendingDeletion { anchor, .. } => {
                if now < anchor + Duration::days(grace_days) {
                    return Err(AppError::InvalidState(format!(
                        "deletion grace period has {} day(s) left",
                        days_remaining(anchor, now, grace_days)
                    )));
                }
                Ok(Self::Deleted)
            }
            other => Err(AppError::InvalidState(format!(
                "cannot finalize deletion of an account that is {}",
                other.label()
            ))),
        }
    }

    const fn label(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deactivated { .. } => "deactivated",
            Self::PendingDeletion { .. } => "pending deletion",
            Self::Deleted => "deleted",
        }
    }
}

/// Whole days left in the countdown, never negative.
#[must_use]
pub fn days_remaining(anchor: DateTime<Utc>, now: DateTime<Utc>, grace_days: i64) -> i64 {
    (grace_days - (now - anchor).num_days()).max(0)
}

/// What a login should tell the user about their account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SessionStatus {
    Active,
    Deactivated,
    #[serde(rename_all = "camelCase")]
    PendingDeletion { days_remaining: i64 },
}

/// Input for requesting account deletion.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RequestDeletionInput {
    #[validate(length(min = 1, max = 256))]
    pub password: String,
    #[serde(default)]
    pub directives: Vec<DispositionDirective>,
}

/// Result of one finalization sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub finalized: u64,
    pub failed: u64,
}

/// Account lifecycle service.
#[derive(Clone)]
pub struct AccountService {
    user_repo: UserRepository,
    group_repo: GroupRepository,
    planner: DispositionPlanner,
    executor: DispositionExecutor,
    credentials: Arc<dyn CredentialVerifier>,
    settings: LifecycleSettings,
    id_gen: IdGenerator,
}

impl AccountService {
    /// Create a new account service.
    #[must_use]
    pub fn new(
        user_repo: UserRepository,
        group_repo: GroupRepository,
        planner: DispositionPlanner,
        executor: DispositionExecutor,
        credentials: Arc<dyn CredentialVerifier>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            user_repo,
            group_repo,
            planner,
            executor,
            credentials,
            settings,
            id_gen: IdGenerator::new(),
        }
    }

    async fn load(&self, user_id: &str) -> AppResult<(user::Model, AccountState)> {
        let user = self.user_repo.get_by_id(user_id).await?;
        let state = AccountState::from_model(&user)?;
        Ok((user, state))
    }

    async fn save(&self, user: user::Model, state: AccountState) -> AppResult<AccountState> {
        let saved = self.user_repo.save_lifecycle(user, state.columns()).await?;
        AccountState::from_model(&saved)
    }

    /// Hide the account without starting the deletion countdown.
    pub async fn deactivate_account(&self, user_id: &str) -> AppResult<AccountState> {
        let (user, state) = self.load(user_id).await?;
        let next = state.deactivate(Utc::now())?;
        let saved = self.save(user, next).await?;

        tracing::info!(user_id = user_id, "Account deactivated");

        Ok(saved)
    }

    /// Start the deletion countdown.
    ///
    /// The password must verify and the directives must cover every owned
    /// group with an acceptable disposition. On any failure nothing is
    /// written. The plan and the new status are stored in one transaction
    /// while plan runs for the user are held off.
    pub async fn request_deletion(
        &self,
        user_id: &str,
        input: RequestDeletionInput,
    ) -> AppResult<AccountState> {
        input.validate()?;

        let _lock = self.executor.lock_user(user_id).await;
        let (user, state) = self.load(user_id).await?;
        let next = state.request_deletion(Utc::now())?;

        if !self
            .credentials
            .verify_password(user_id, &input.password)
            .await?
        {
            return Err(AppError::Validation("Incorrect password".to_string()));
        }

        self.planner.validate(user_id, &input.directives).await?;

        let plan = if input.directives.is_empty() {
            None
        } else {
            Some(disposition_plan::ActiveModel {
                id: Set(self.id_gen.generate()),
                user_id: Set(user_id.to_string()),
                directives: Set(encode_directives(&input.directives)?),
                created_at: Set(Utc::now().into()),
            })
        };

        let (saved, _) = self
            .user_repo
            .save_lifecycle_with_plan(user, next.columns(), plan)
            .await?;
        let saved = AccountState::from_model(&saved)?;

        tracing::info!(
            user_id = user_id,
            directives = input.directives.len(),
            grace_days = self.settings.deletion_grace_days,
            "Account deletion requested"
        );

        Ok(saved)
    }

    /// Cancel deactivation or a pending deletion.
    ///
    /// Any stored plan is dropped unapplied; groups are not touched. Waits
    /// for a plan run already in progress to finish.
    pub async fn reactivate_account(&self, user_id: &str) -> AppResult<AccountState> {
        let _lock = self.executor.lock_user(user_id).await;
        let (user, state) = self.load(user_id).await?;
        let next = state.reactivate()?;

        let (saved, dropped) = self
            .user_repo
            .save_lifecycle_with_plan(user, next.columns(), None)
            .await?;
        let saved = AccountState::from_model(&saved)?;

        tracing::info!(
            user_id = user_id,
            dropped_plan = dropped > 0,
            "Account reactivated"
        );

        Ok(saved)
    }

    /// Account status for a login. Never changes state.
    pub async fn session_status(&self, user_id: &str) -> AppResult<SessionStatus> {
        let (_, state) = self.load(user_id).await?;
        session_status_at(state, Utc::now(), self.settings.deletion_grace_days)
    }

    /// Owned groups and who could take each one over.
    pub async fn get_owned_groups_with_eligibility(
        &self,
        user_id: &str,
    ) -> AppResult<Vec<OwnedGroupEligibility>> {
        self.planner.get_owned_groups_with_eligibility(user_id).await
    }

    /// Run the user's pending disposition plan.
    pub async fn run_deferred_dispositions(
        &self,
        user_id: &str,
    ) -> AppResult<ExecutionReport> {
        self.executor.run_deferred_dispositions(user_id).await
    }

    /// Finalize a deletion whose countdown has run out.
    pub async fn finalize_deletion(&self, user_id: &str) -> AppResult<AccountState> {
        self.finalize_at(user_id, Utc::now()).await
    }

    async fn finalize_at(&self, user_id: &str, now: DateTime<Utc>) -> AppResult<AccountState> {
        let (_, state) = self.load(user_id).await?;
        state.finalize(now, self.settings.deletion_grace_days)?;

        self.executor.run_deferred_dispositions(user_id).await?;

        let _lock = self.executor.lock_user(user_id).await;
        let remaining = self.group_repo.count_owned_by_user(user_id).await?;
        if remaining > 0 {
            return Err(AppError::InvalidState(format!(
                "user still owns {remaining} group(s)"
            )));
        }

        // Reload: the account may have been reactivated meanwhile.
        let (user, state) = self.load(user_id).await?;
        let next = state.finalize(now, self.settings.deletion_grace_days)?;
        let saved = self.save(user, next).await?;

        tracing::info!(user_id = user_id, "Account deletion finalized");

        Ok(saved)
    }

    /// Finalize up to `limit` accounts whose countdown ran out by `now`.
    ///
    /// A failure on one account is logged and counted; the rest still run.
    pub async fn finalize_due_deletions(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<SweepReport> {
        let cutoff = now - Duration::days(self.settings.deletion_grace_days);
        let due = self.user_repo.find_pending_deletion_due(cutoff, limit).await?;

        let mut report = SweepReport::default();
        for user in due {
            match self.finalize_at(&user.id, now).await {
                Ok(_) => report.finalized += 1,
                Err(e) => {
                    tracing::warn!(user_id = %user.id, error = %e, "Failed to finalize deletion");
                    report.failed += 1;
                }
            }
        }

        if report.finalized > 0 || report.failed > 0 {
            tracing::info!(
                finalized = report.finalized,
                failed = report.failed,
                "Deletion sweep finished"
            );
        }

        Ok(report)
    }
}

/// Map a state to what a login reports.
pub fn session_status_at(
    state: AccountState,
    now: DateTime<Utc>,
    grace_days: i64,
) -> AppResult<SessionStatus> {
    match state {
        AccountState::Active => Ok(SessionStatus::Active),
        AccountState::Deactivated { .. } => Ok(SessionStatus::Deactivated),
        AccountState::PendingDeletion { anchor, .. } => Ok(SessionStatus::PendingDeletion {
            days_remaining: days_remaining(anchor, now, grace_days),
        }),
        AccountState::Deleted => Err(AppError::AccountGone(
            "This account has been deleted".to_string(),
        )),
    }
}
