//! # warden-credentials
//!
//! Credential lifecycle manager.
//!
//! The server never sees a plaintext password. Clients send
//! `client_password_hash(password, client_salt)` and the server stores
//! `slow_hash(client_hash, server_salt)`. Temporary passwords generated by the
//! server are sealed under their single-use retrieval token.

#![warn(clippy::all)]

pub mod errors;
pub mod generator;
pub mod policy;
pub mod service;
pub mod tokens;
pub mod traits;
pub mod types;


pub use errors::{CredentialError, FieldError, Result};
pub use generator::generate_temporary_password;
pub use policy::PasswordPolicy;
pub use service::{CredentialConfig, CredentialService};
pub use tokens::TokenVault;
pub use traits::{CredentialNotifier, LoggingNotifier, SessionRevoker};
pub use types::*;
