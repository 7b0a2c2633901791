//! Business logic services.

#![allow(missing_docs)]

pub mod credentials;
pub mod disposition;
pub mod executor;
pub mod lifecycle;
pub mod membership;
pub mod visibility;

pub use credentials::{Argon2CredentialVerifier, CredentialVerifier};
pub use disposition::{
    DispositionDirective, DispositionPlanner, EligibilityChecker, Ineligibility,
    MemberEligibility, OwnedGroupEligibility,
};
pub use executor::{DirectiveOutcome, DirectiveReport, DispositionExecutor, ExecutionReport};
pub use lifecycle::{
    AccountService, AccountState, LifecycleSettings, RequestDeletionInput, SessionStatus,
    SweepReport,
};
pub use membership::GroupMembershipOracle;
pub use visibility::{GroupStats, RedactedWatch, Verdict, VisibilityService, WatchVisibility};
