//! # warden-policy
//!
//! Authorization and abuse controls.
//!
//! - A closed [`Role`] set with an explicit capability table
//! - [`is_authorized`], the single pure authorization function
//! - [`RateLimiter`] and [`CsrfGuard`] over an [`EphemeralStore`]

#![warn(clippy::all)]

pub mod capabilities;
pub mod csrf;
pub mod errors;
pub mod evaluator;
pub mod rate_limit;
pub mod store;
pub mod types;

pub use capabilities::Capabilities;
pub use csrf::CsrfGuard;
pub use errors::{PolicyError, Result};
pub use evaluator::is_authorized;
pub use rate_limit::{RateLimiter, RateRule};
pub use store::{Counter, EphemeralStore, InMemoryStore};
pub use types::*;
