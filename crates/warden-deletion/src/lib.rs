//! # warden-deletion
//!
//! Deletion queue. Accounts marked for deletion wait out a seven day
//! cooling-off period during which the owner may cancel with a single-use
//! token; a sweep then claims due requests and purges the account.

#![warn(clippy::all)]

pub mod errors;
pub mod reminders;
pub mod service;
pub mod traits;
pub mod types;

#[cfg(test)]
mod tests;

pub use errors::{DeletionError, Result};
pub use reminders::{due_reminders, Reminder};
pub use service::{DeletionConfig, DeletionService};
pub use traits::{DeletionNotifier, LoggingNotifier};
pub use types::*;
