//! Randomness helpers backed by the operating system entropy source.

use crate::{constants::TOKEN_BYTES, errors::*, hashing::sha256};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};

/// Fill an array from the OS entropy source.
///
/// Fails with `RandomGenerationFailed` instead of panicking when the entropy
/// source is unavailable.
pub fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CryptoError::RandomGenerationFailed(e.to_string()))?;
    Ok(bytes)
}

/// A CSPRNG seeded once from the OS entropy source.
///
/// Use this when many samples are needed (password generation) so that the
/// entropy check happens exactly once, up front.
pub fn seeded_rng() -> Result<StdRng> {
    let seed = random_bytes::<32>()?;
    Ok(StdRng::from_seed(seed))
}

/// Base64url encode without padding
pub fn base64_url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Base64url decode without padding
pub fn base64_url_decode(data: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(data)
        .map_err(|e| CryptoError::InvalidInput(e.to_string()))
}

/// Generate a high-entropy opaque token.
///
/// Returns the raw (client-facing) value; persist only [`token_hash`] of it.
pub fn generate_token() -> Result<String> {
    let bytes = random_bytes::<TOKEN_BYTES>()?;
    Ok(base64_url_encode(&bytes))
}

/// Storage lookup key for a raw token
pub fn token_hash(raw_token: &str) -> [u8; 32] {
    sha256(raw_token.as_bytes())
}
