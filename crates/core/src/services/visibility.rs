//! Watch visibility policy.
//!
//! Every read path that shows a watch to someone other than its owner goes
//! through [`assess`]: single records, feeds and aggregate statistics all
//! share that one rule.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use watchlog_common::{AppError, AppResult};
use watchlog_db::entities::user::AccountStatus;
use watchlog_db::entities::{user, watch};
use watchlog_db::repositories::{GroupRepository, UserRepository, WatchRepository};

use super::membership::{GroupMembershipOracle, intersects};

/// Upper bound on a single feed page.
const MAX_FEED_LIMIT: u64 = 100;

/// Which facets of a watch a viewer may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchVisibility {
    pub visible: bool,
    pub rating: bool,
    pub notes: bool,
}

impl WatchVisibility {
    pub const HIDDEN: Self = Self {
        visible: false,
        rating: false,
        notes: false,
    };

    pub const FULL: Self = Self {
        visible: true,
        rating: true,
        notes: true,
    };
}

/// Outcome of the membership-independent part of the rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Settled without looking at group membership.
    Decided(WatchVisibility),
    /// These facets apply only if owner and viewer share a group.
    RequiresSharedGroup(WatchVisibility),
}

impl Verdict {
    /// Settle the verdict once co-membership is known.
    #[must_use]
    pub const fn resolve(self, shares_group: bool) -> WatchVisibility {
        match self {
            Self::Decided(visibility) => visibility,
            Self::RequiresSharedGroup(visibility) if shares_group => visibility,
            Self::RequiresSharedGroup(_) => WatchVisibility::HIDDEN,
        }
    }
}

/// Apply the visibility rule up to the shared-group check.
///
/// `owner` is the current row of the watch's owner, or `None` when it could
/// not be found. A mismatched owner row is treated as unknown.
#[must_use]
pub fn assess(watch: &watch::Model, owner: Option<&user::Model>, viewer_id: &str) -> Verdict {
    if watch.user_id == viewer_id {
        return Verdict::Decided(WatchVisibility::FULL);
    }

    let Some(owner) = owner.filter(|o| o.id == watch.user_id) else {
        return Verdict::Decided(WatchVisibility::HIDDEN);
    };
    if owner.account_status == AccountStatus::Deleted {
        return Verdict::Decided(WatchVisibility::HIDDEN);
    }

    if watch.is_private || !owner.share_watches {
        return Verdict::Decided(WatchVisibility::HIDDEN);
    }

    Verdict::RequiresSharedGroup(WatchVisibility {
        visible: true,
        rating: owner.share_ratings,
        notes: owner.share_notes,
    })
}

/// A watch as one viewer is allowed to see it.
///
/// Hidden records carry only their id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactedWatch {
    pub id: String,
    pub visible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movie_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watched_at: Option<DateTime<FixedOffset>>,
    pub rating: Option<i16>,
    pub notes: Option<String>,
}

impl RedactedWatch {
    #[must_use]
    pub fn new(watch: &watch::Model, visibility: WatchVisibility) -> Self {
        if !visibility.visible {
            return Self {
                id: watch.id.clone(),
                visible: false,
                user_id: None,
                movie_id: None,
                watched_at: None,
                rating: None,
                notes: None,
            };
        }

        Self {
            id: watch.id.clone(),
            visible: true,
            user_id: Some(watch.user_id.clone()),
            movie_id: Some(watch.movie_id.clone()),
            watched_at: Some(watch.watched_at),
            rating: watch.rating.filter(|_| visibility.rating),
            notes: watch.notes.clone().filter(|_| visibility.notes),
        }
    }
}

/// Aggregate statistics of a group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub total_watches: u64,
    pub unique_movies: u64,
    pub active_members: u64,
    pub average_rating: Option<f64>,
}

impl GroupStats {
    /// Aggregate over the watches a group as a whole can see.
    ///
    /// Only non-private watches of members who are not deleted and share
    /// their watches count. Ratings of members who hide their ratings are
    /// left out of the average but their watches still count.
    #[must_use]
    pub fn compute(members: &[user::Model], watches: &[watch::Model]) -> Self {
        let contributors: HashMap<&str, &user::Model> = members
            .iter()
            .filter(|m| m.account_status != AccountStatus::Deleted && m.share_watches)
            .map(|m| (m.id.as_str(), m))
            .collect();

        let mut total_watches = 0u64;
        let mut movies = HashSet::new();
        let mut active = HashSet::new();
        let mut rating_sum = 0i64;
        let mut rating_count = 0u64;

        for watch in watches.iter().filter(|w| !w.is_private) {
            let Some(owner) = contributors.get(watch.user_id.as_str()) else {
                continue;
            };

            total_watches += 1;
            movies.insert(watch.movie_id.as_str());
            active.insert(watch.user_id.as_str());

            if let Some(rating) = watch.rating.filter(|_| owner.share_ratings) {
                rating_sum += i64::from(rating);
                rating_count += 1;
            }
        }

        let average_rating =
            (rating_count > 0).then(|| rating_sum as f64 / rating_count as f64);

        Self {
            total_watches,
            unique_movies: movies.len() as u64,
            active_members: active.len() as u64,
            average_rating,
        }
    }
}

/// Applies the visibility rule against current database state.
#[derive(Clone)]
pub struct VisibilityService {
    user_repo: UserRepository,
    watch_repo: WatchRepository,
    group_repo: GroupRepository,
    oracle: GroupMembershipOracle,
}

impl VisibilityService {
    #[must_use]
    pub const fn new(
        user_repo: UserRepository,
        watch_repo: WatchRepository,
        group_repo: GroupRepository,
        oracle: GroupMembershipOracle,
    ) -> Self {
        Self {
            user_repo,
            watch_repo,
            group_repo,
            oracle,
        }
    }

    /// Redact a single watch for a viewer.
    pub async fn compute_visibility(
        &self,
        watch: &watch::Model,
        viewer_id: &str,
    ) -> AppResult<RedactedWatch> {
        let verdict = if watch.user_id == viewer_id {
            assess(watch, None, viewer_id)
        } else {
            let owner = self.user_repo.find_by_id(&watch.user_id).await?;
            assess(watch, owner.as_ref(), viewer_id)
        };

        let visibility = match verdict {
            Verdict::Decided(_) => verdict.resolve(false),
            Verdict::RequiresSharedGroup(_) => verdict.resolve(
                self.oracle
                    .share_group(&watch.user_id, viewer_id)
                    .await?,
            ),
        };

        Ok(RedactedWatch::new(watch, visibility))
    }

    /// Redact a batch of watches for one viewer, preserving order.
    ///
    /// Owners and group sets are loaded once per batch.
    pub async fn compute_visibility_batch(
        &self,
        watches: &[watch::Model],
        viewer_id: &str,
    ) -> AppResult<Vec<RedactedWatch>> {
        let owner_ids: Vec<String> = watches
            .iter()
            .map(|w| w.user_id.clone())
            .filter(|id| id != viewer_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let owners: HashMap<String, user::Model> = self
            .user_repo
            .find_by_ids(&owner_ids)
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();

        let mut viewer_groups: Option<HashSet<String>> = None;
        let mut owner_groups: HashMap<String, HashSet<String>> = HashMap::new();
        let mut redacted = Vec::with_capacity(watches.len());

        for watch in watches {
            let verdict = assess(watch, owners.get(&watch.user_id), viewer_id);

            let shares_group = match verdict {
                Verdict::Decided(_) => false,
                Verdict::RequiresSharedGroup(_) => {
                    if viewer_groups.is_none() {
                        viewer_groups = Some(self.oracle.group_ids(viewer_id).await?);
                    }
                    if !owner_groups.contains_key(&watch.user_id) {
                        let groups = self.oracle.group_ids(&watch.user_id).await?;
                        owner_groups.insert(watch.user_id.clone(), groups);
                    }
                    match (viewer_groups.as_ref(), owner_groups.get(&watch.user_id)) {
                        (Some(viewer), Some(owner)) => intersects(viewer, owner),
                        _ => false,
                    }
                }
            };

            redacted.push(RedactedWatch::new(watch, verdict.resolve(shares_group)));
        }

        Ok(redacted)
    }

    /// Look up one watch for a viewer.
    ///
    /// A watch the viewer may not see is reported as missing.
    pub async fn view_watch(&self, watch_id: &str, viewer_id: &str) -> AppResult<RedactedWatch> {
        let watch = self.watch_repo.get_by_id(watch_id).await?;
        let redacted = self.compute_visibility(&watch, viewer_id).await?;

        if !redacted.visible {
            return Err(AppError::NotFound(format!("Watch not found: {watch_id}")));
        }
        Ok(redacted)
    }

    /// Latest watches of a group's members as the viewer may see them.
    ///
    /// Records whose existence is hidden from the viewer are dropped, so a
    /// page can hold fewer than `limit` entries.
    pub async fn group_feed(
        &self,
        group_id: &str,
        viewer_id: &str,
        limit: u64,
    ) -> AppResult<Vec<RedactedWatch>> {
        let group = self.group_repo.get_by_id(group_id).await?;
        if group.is_deleted() {
            return Err(AppError::NotFound(format!("Group not found: {group_id}")));
        }

        if !self.oracle.is_member(viewer_id, group_id).await? {
            return Err(AppError::Forbidden(
                "Only members can view the group feed".to_string(),
            ));
        }

        let member_ids: Vec<String> = self
            .group_repo
            .list_members(group_id)
            .await?
            .into_iter()
            .map(|m| m.user_id)
            .collect();

        let watches = self
            .watch_repo
            .find_by_user_ids(&member_ids, limit.clamp(1, MAX_FEED_LIMIT))
            .await?;

        let redacted = self.compute_visibility_batch(&watches, viewer_id).await?;
        Ok(redacted.into_iter().filter(|w| w.visible).collect())
    }

    /// Aggregate statistics over a group's shared watches.
    pub async fn group_stats(&self, group_id: &str) -> AppResult<GroupStats> {
        let group = self.group_repo.get_by_id(group_id).await?;
        if group.is_deleted() {
            return Err(AppError::NotFound(format!("Group not found: {group_id}")));
        }

        let member_ids: Vec<String> = self
            .group_repo
            .list_members(group_id)
            .await?
            .into_iter()
            .map(|m| m.user_id)
            .collect();

        let members = self.user_repo.find_by_ids(&member_ids).await?;
        let contributor_ids: Vec<String> = members
            .iter()
            .filter(|m| m.account_status != AccountStatus::Deleted && m.share_watches)
            .map(|m| m.id.clone())
            .collect();

        let watches = self
            .watch_repo
            .find_non_private_by_user_ids(&contributor_ids)
            .await?;

        Ok(GroupStats::compute(&members, &watches))
    }
}
