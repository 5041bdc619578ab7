//! # warden-identity
//!
//! User directory: accounts, username/email indexes, account status and
//! role assignments. Every other service resolves users through
//! [`UserDirectory`].

#![warn(clippy::all)]

pub mod assignments;
pub mod errors;
pub mod service;
pub mod traits;
pub mod types;

pub use errors::{IdentityError, Result};
pub use service::UserDirectoryService;
pub use traits::UserDirectory;
pub use types::*;
