//! Watch entity - one logged viewing of a movie.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "watch")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Owner of the record.
    #[sea_orm(indexed)]
    pub user_id: String,

    /// External movie-metadata identifier.
    #[sea_orm(indexed)]
    pub movie_id: String,

    pub watched_at: DateTimeWithTimeZone,

    /// Rating from 1 to 10.
    #[sea_orm(nullable)]
    pub rating: Option<i16>,

    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,

    /// Hides this record from everyone but the owner.
    #[sea_orm(default_value = false)]
    pub is_private: bool,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
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
