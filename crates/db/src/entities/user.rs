//! User entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Stored lifecycle status of an account.
///
/// The timestamps that belong to each status live in their own columns;
/// the domain layer folds both into a single state value.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Normal account.
    #[default]
    #[sea_orm(string_value = "active")]
    Active,
    /// Hidden by the owner, no deletion countdown.
    #[sea_orm(string_value = "deactivated")]
    Deactivated,
    /// Deactivated with the deletion countdown running.
    #[sea_orm(string_value = "pending_deletion")]
    PendingDeletion,
    /// Terminal.
    #[sea_orm(string_value = "deleted")]
    Deleted,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(unique)]
    pub username: String,

    /// Argon2 PHC string
    #[sea_orm(nullable)]
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,

    /// Premium accounts are exempt from the free-tier group ownership cap
    #[sea_orm(default_value = false)]
    pub is_premium: bool,

    /// Share watch history with co-members
    #[sea_orm(default_value = true)]
    pub share_watches: bool,

    /// Share ratings on shared watches
    #[sea_orm(default_value = true)]
    pub share_ratings: bool,

    /// Share notes on shared watches
    #[sea_orm(default_value = false)]
    pub share_notes: bool,

    pub account_status: AccountStatus,

    #[sea_orm(nullable)]
    pub deactivated_at: Option<DateTimeWithTimeZone>,

    /// Countdown anchor for the deletion grace period, not the deletion time
    #[sea_orm(nullable)]
    pub deletion_requested_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::watch::Entity")]
    Watches,

    #[sea_orm(has_many = "super::group_member::Entity")]
    Memberships,

    #[sea_orm(has_one = "super::disposition_plan::Entity")]
    DispositionPlan,
}

impl Related<super::watch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Watches.def()
    }
}

impl Related<super::group_member::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Memberships.def()
    }
}

impl Related<super::disposition_plan::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DispositionPlan.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
