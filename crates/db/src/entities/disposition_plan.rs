//! Disposition plan entity.
//!
//! Holds the ordered group-disposition directives accepted when an account
//! requested deletion. At most one row per user; the row is removed once the
//! directives have been executed or the account is reactivated.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A pending disposition plan.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "disposition_plan")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Account the plan belongs to.
    #[sea_orm(unique)]
    pub user_id: String,

    /// Serialized directive list, order preserved.
    #[sea_orm(column_type = "JsonBinary")]
    pub directives: Json,

    /// When the plan was accepted.
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
