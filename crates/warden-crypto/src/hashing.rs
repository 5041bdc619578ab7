//! Hashing utilities: SHA-256, BLAKE3, HMAC and the Argon2id slow hash.

use crate::{constants::*, errors::*};
use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
use argon2::{Algorithm, Argon2, Params};
use blake3::Hasher as Blake3Hasher;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Compute SHA-256 of the given data
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash data using BLAKE3
///
/// Used for backup-code digests and fingerprints, never for passwords.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake3Hasher::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// HMAC-SHA256 over `data` keyed by `key`
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32]> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

/// Securely compare two byte slices in constant time
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Hash a password the way a client does before sending it.
///
/// The server never sees `password`; it only receives this hex digest together
/// with the user's client salt. The server uses it when it generates a
/// temporary password on the user's behalf.
pub fn client_password_hash(password: &str, client_salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(client_salt.as_bytes());
    hasher.update([0u8]);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlowHashParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of iterations
    pub time_cost: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for SlowHashParams {
    fn default() -> Self {
        Self {
            memory_kib: argon2_params::MEMORY_COST,
            time_cost: argon2_params::TIME_COST,
            parallelism: argon2_params::PARALLELISM,
        }
    }
}

impl SlowHashParams {
    /// Smallest parameters Argon2 accepts. Only for tests.
    pub fn minimal() -> Self {
        Self {
            memory_kib: 8,
            time_cost: 1,
            parallelism: 1,
        }
    }

    fn build(&self) -> Result<Argon2<'static>> {
        let params = Params::new(
            self.memory_kib,
            self.time_cost,
            self.parallelism,
            Some(argon2_params::OUTPUT_LENGTH),
        )
        .map_err(|e| CryptoError::Argon2Failed(e.to_string()))?;

        Ok(Argon2::new(
            Algorithm::Argon2id,
            argon2_params::VERSION,
            params,
        ))
    }
}

/// Generate a random server salt (base64, PHC alphabet)
pub fn generate_server_salt() -> String {
    SaltString::generate(&mut OsRng).as_str().to_string()
}

/// Compute `slowHash(client_hash + server_salt)`.
///
/// Returns the PHC-formatted Argon2id string.
pub fn slow_hash(client_hash: &str, server_salt: &str, params: &SlowHashParams) -> Result<String> {
    let salt = SaltString::from_b64(server_salt).map_err(|_| CryptoError::InvalidHashFormat)?;
    let argon2 = params.build()?;

    let hash = argon2
        .hash_password(client_hash.as_bytes(), &salt)
        .map_err(|e| CryptoError::Argon2Failed(e.to_string()))?;

    Ok(hash.to_string())
}

/// Recompute the slow hash and compare it to `stored_hash` in constant time.
pub fn verify_slow_hash(
    client_hash: &str,
    server_salt: &str,
    stored_hash: &str,
    params: &SlowHashParams,
) -> Result<bool> {
    let computed = slow_hash(client_hash, server_salt, params)?;
    Ok(constant_time_compare(
        computed.as_bytes(),
        stored_hash.as_bytes(),
    ))
}
