//! # warden-roles
//!
//! Role changes that need more than one person:
//!
//! - Promotion requests decided by a quorum of admin-tier votes
//! - Auto-approved site_admin grants by an existing site_admin
//! - Demotion back to the user tier
//!
//! Every vote, tally and resulting role assignment commits in one batch
//! under the request's row lock.

#![warn(clippy::all)]

pub mod errors;
pub mod quorum;
pub mod service;
pub mod types;

#[cfg(test)]
mod tests;

pub use errors::{Result, RoleError};
pub use quorum::{tally, Tally};
pub use service::RoleService;
pub use types::*;
