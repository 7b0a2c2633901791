//! Database entities.

pub mod disposition_plan;
pub mod group;
pub mod group_member;
pub mod user;
pub mod watch;

pub use disposition_plan::Entity as DispositionPlan;
pub use group::Entity as Group;
pub use group_member::Entity as GroupMember;
pub use user::Entity as User;
pub use watch::Entity as Watch;
