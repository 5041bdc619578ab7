//! # warden-crypto
//!
//! Cryptographic primitives for the warden identity service.
//!
//! ## Security Properties
//!
//! - Passwords reach the server only as client-side hashes and are stored only
//!   as Argon2id output
//! - Secret comparisons are constant-time
//! - Randomness comes from the operating system; failures surface as errors
//! - Every derived key uses its own domain separation string

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constants;
pub mod encryption;
pub mod errors;
pub mod hashing;
pub mod random;
pub mod utils;

pub use constants::*;
pub use encryption::*;
pub use errors::{CryptoError, Result};
pub use hashing::*;
pub use random::*;
pub use utils::*;
