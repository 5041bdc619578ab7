//! Cryptographic constants and domain separation strings.

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Size of raw single-use tokens before encoding
pub const TOKEN_BYTES: usize = 32;

/// Domain for sealing a temporary password under its retrieval token
pub const DOMAIN_TEMP_CREDENTIAL: &str = "warden:credential:temporary:v1";

/// Domain for the per-user MFA key-encryption key
pub const DOMAIN_MFA_KEK: &str = "warden:auth:mfa-kek:v1";

/// AAD prefix for sealed TOTP secrets
pub const DOMAIN_MFA_TOTP_AAD: &str = "warden:auth:mfa-totp:v1";

/// Domain for decoy client salts handed out for unknown usernames
pub const DOMAIN_DECOY_SALT: &str = "warden:auth:decoy-salt:v1";

/// Argon2id parameters for the server-side slow hash
pub mod argon2_params {
    use argon2::Version;

    /// Memory cost: 64 MiB
    pub const MEMORY_COST: u32 = 64 * 1024;

    /// Time cost: 3 iterations
    pub const TIME_COST: u32 = 3;

    /// Parallelism: 1 thread
    pub const PARALLELISM: u32 = 1;

    /// Output length: 32 bytes
    pub const OUTPUT_LENGTH: usize = 32;

    /// Argon2 version
    pub const VERSION: Version = Version::V0x13;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_strings_are_versioned() {
        for domain in [
            DOMAIN_TEMP_CREDENTIAL,
            DOMAIN_MFA_KEK,
            DOMAIN_MFA_TOTP_AAD,
            DOMAIN_DECOY_SALT,
        ] {
            assert!(domain.starts_with("warden:"));
            assert!(domain.ends_with(":v1"));
        }
    }
}
