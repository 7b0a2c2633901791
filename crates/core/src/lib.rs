//! Core business logic for watchlog.

pub mod services;

pub use services::*;
