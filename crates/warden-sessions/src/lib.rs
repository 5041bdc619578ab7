//! # warden-sessions
//!
//! Session manager: password login with optional TOTP second factor,
//! short-lived HS256 access tokens, rotating refresh tokens and immediate
//! server-side revocation.

#![warn(clippy::all)]

pub mod errors;
pub mod mfa;
pub mod registry;
pub mod service;
pub mod types;

#[cfg(test)]
mod tests;

pub use errors::{Result, SessionError};
pub use registry::{RevocationKind, SessionRegistry};
pub use service::SessionService;
pub use types::*;
