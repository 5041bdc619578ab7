//! Multi-factor authentication (TOTP) helpers.

use crate::errors::*;
use rand::Rng;
use totp_rs::{Algorithm, Secret, TOTP};
use warden_crypto::{blake3_hash, constant_time_compare, random_bytes, seeded_rng};
use zeroize::Zeroizing;

/// TOTP parameters
pub const TOTP_DIGITS: usize = 6;
pub const TOTP_STEP: u64 = 30;
const TOTP_SKEW: u8 = 1;

/// 160-bit seed, the usual TOTP size
const SECRET_BYTES: usize = 20;

pub const BACKUP_CODE_COUNT: usize = 10;
pub const BACKUP_CODE_LENGTH: usize = 8;

/// Fresh random TOTP seed
pub fn generate_secret() -> Result<Zeroizing<Vec<u8>>> {
    let bytes = random_bytes::<SECRET_BYTES>()
        .map_err(|e| SessionError::TokenGeneration(e.to_string()))?;
    Ok(Zeroizing::new(bytes.to_vec()))
}

fn build_totp(secret: &[u8]) -> Result<TOTP> {
    TOTP::new(
        Algorithm::SHA256,
        TOTP_DIGITS,
        TOTP_SKEW,
        TOTP_STEP,
        secret.to_vec(),
    )
    .map_err(|e| SessionError::Totp(e.to_string()))
}

/// Base32 form shown to the user
pub fn encode_secret(secret: &[u8]) -> String {
    Secret::Raw(secret.to_vec()).to_encoded().to_string()
}

/// Decode a base32 secret
pub fn decode_secret(encoded: &str) -> Result<Vec<u8>> {
    Secret::Encoded(encoded.to_string())
        .to_bytes()
        .map_err(|_| SessionError::Totp("Invalid secret encoding".to_string()))
}

/// Provisioning URL for authenticator apps
pub fn otpauth_url(issuer: &str, account: &str, secret_base32: &str) -> String {
    format!(
        "otpauth://totp/{}:{}?secret={}&issuer={}&algorithm=SHA256&digits={}&period={}",
        issuer, account, secret_base32, issuer, TOTP_DIGITS, TOTP_STEP
    )
}

/// Code for `time`. Used by clients and tests.
pub fn totp_code(secret: &[u8], time: u64) -> Result<String> {
    Ok(build_totp(secret)?.generate(time))
}

/// Time step `code` belongs to, allowing one step of clock skew
pub fn matching_step(secret: &[u8], code: &str, now: u64) -> Result<Option<u64>> {
    let totp = build_totp(secret)?;
    let current = now / TOTP_STEP;

    for step in [current.saturating_sub(1), current, current + 1] {
        let expected = totp.generate(step * TOTP_STEP);
        if constant_time_compare(expected.as_bytes(), code.as_bytes()) {
            return Ok(Some(step));
        }
    }
    Ok(None)
}

/// Generate backup codes
pub fn generate_backup_codes() -> Result<Vec<String>> {
    let mut rng = seeded_rng().map_err(|e| SessionError::TokenGeneration(e.to_string()))?;
    Ok((0..BACKUP_CODE_COUNT)
        .map(|_| {
            (0..BACKUP_CODE_LENGTH)
                .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
                .collect()
        })
        .collect())
}

/// Hash backup code for storage
pub fn hash_backup_code(code: &str) -> String {
    hex::encode(blake3_hash(code.trim().as_bytes()))
}

/// Position of the stored digest matching `code`
pub fn find_backup_code(code: &str, hashes: &[String]) -> Option<usize> {
    let computed = hash_backup_code(code);
    let mut found = None;
    for (i, hash) in hashes.iter().enumerate() {
        if constant_time_compare(computed.as_bytes(), hash.as_bytes()) && found.is_none() {
            found = Some(i);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_within_skew() {
        let secret = generate_secret().unwrap();
        let now = 1_700_000_000;
        let code = totp_code(&secret, now).unwrap();
        assert_eq!(code.len(), TOTP_DIGITS);

        assert_eq!(matching_step(&secret, &code, now).unwrap(), Some(now / TOTP_STEP));
        assert!(matching_step(&secret, &code, now + TOTP_STEP).unwrap().is_some());
        assert!(matching_step(&secret, &code, now + 3 * TOTP_STEP).unwrap().is_none());
    }

    #[test]
    fn test_secret_encoding_roundtrip() {
        let secret = generate_secret().unwrap();
        let encoded = encode_secret(&secret);
        assert!(encoded.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert_eq!(decode_secret(&encoded).unwrap(), secret.to_vec());
    }

    #[test]
    fn test_backup_codes() {
        let codes = generate_backup_codes().unwrap();
        assert_eq!(codes.len(), BACKUP_CODE_COUNT);
        assert!(codes
            .iter()
            .all(|c| c.len() == BACKUP_CODE_LENGTH && c.chars().all(|ch| ch.is_ascii_digit())));

        let hashes: Vec<String> = codes.iter().map(|c| hash_backup_code(c)).collect();
        assert_eq!(find_backup_code(&codes[3], &hashes), Some(3));
        assert_eq!(find_backup_code("not-a-code", &hashes), None);
    }

    #[test]
    fn test_otpauth_url() {
        let url = otpauth_url("warden", "alice", "JBSWY3DPEHPK3PXP");
        assert!(url.starts_with("otpauth://totp/warden:alice?secret=JBSWY3DPEHPK3PXP"));
        assert!(url.contains("algorithm=SHA256"));
    }
}
