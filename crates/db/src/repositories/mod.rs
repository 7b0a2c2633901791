//! Repositories: one per aggregate, each owning an `Arc<DatabaseConnection>`.

pub mod disposition_plan;
pub mod group;
pub mod user;
pub mod watch;

pub use disposition_plan::DispositionPlanRepository;
pub use group::GroupRepository;
pub use user::{LifecycleColumns, UserRepository};
pub use watch::WatchRepository;
