//! Sealing secrets at rest with XChaCha20-Poly1305.

use crate::{constants::*, errors::*, random::random_bytes};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;
use zeroize::Zeroizing;

/// Ciphertext plus the nonce it was sealed with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSecret {
    /// Ciphertext with the 16-byte tag appended
    pub ciphertext: Vec<u8>,
    /// Random 24-byte nonce
    pub nonce: [u8; NONCE_SIZE],
}

/// Derive a 32-byte key with HKDF-SHA256
pub fn hkdf_derive_32(ikm: &[u8], info: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
    let hk = Hkdf::<Sha256>::new(None, ikm);
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(info, &mut okm[..])
        .map_err(|_| CryptoError::HkdfError)?;
    Ok(okm)
}

/// Encrypt `plaintext` under `key` with a fresh random nonce
pub fn seal(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<SealedSecret> {
    let nonce = random_bytes::<NONCE_SIZE>()?;
    let cipher = XChaCha20Poly1305::new(key.into());

    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    Ok(SealedSecret { ciphertext, nonce })
}

/// Decrypt a [`SealedSecret`]
pub fn open(key: &[u8; 32], sealed: &SealedSecret, aad: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = XChaCha20Poly1305::new(key.into());

    cipher
        .decrypt(
            XNonce::from_slice(&sealed.nonce),
            Payload {
                msg: &sealed.ciphertext,
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Seal a temporary password so that only the holder of `raw_token` can open it.
pub fn seal_with_token(raw_token: &str, plaintext: &[u8], user_id: &Uuid) -> Result<SealedSecret> {
    let key = hkdf_derive_32(raw_token.as_bytes(), DOMAIN_TEMP_CREDENTIAL.as_bytes())?;
    seal(&key, plaintext, user_id.as_bytes())
}

/// Open a secret sealed with [`seal_with_token`]
pub fn open_with_token(
    raw_token: &str,
    sealed: &SealedSecret,
    user_id: &Uuid,
) -> Result<Zeroizing<Vec<u8>>> {
    let key = hkdf_derive_32(raw_token.as_bytes(), DOMAIN_TEMP_CREDENTIAL.as_bytes())?;
    open(&key, sealed, user_id.as_bytes())
}

fn mfa_aad(user_id: &Uuid) -> Vec<u8> {
    let mut aad = Vec::with_capacity(DOMAIN_MFA_TOTP_AAD.len() + 16);
    aad.extend_from_slice(DOMAIN_MFA_TOTP_AAD.as_bytes());
    aad.extend_from_slice(user_id.as_bytes());
    aad
}

fn mfa_kek(master_key: &[u8; 32], user_id: &Uuid) -> Result<Zeroizing<[u8; 32]>> {
    let mut ikm = Zeroizing::new(Vec::with_capacity(48));
    ikm.extend_from_slice(master_key);
    ikm.extend_from_slice(user_id.as_bytes());
    hkdf_derive_32(&ikm, DOMAIN_MFA_KEK.as_bytes())
}

/// Seal a TOTP secret under a per-user key derived from the service master key
pub fn seal_mfa_secret(master_key: &[u8; 32], secret: &[u8], user_id: &Uuid) -> Result<SealedSecret> {
    let kek = mfa_kek(master_key, user_id)?;
    seal(&kek, secret, &mfa_aad(user_id))
}

/// Open a TOTP secret sealed with [`seal_mfa_secret`]
pub fn open_mfa_secret(
    master_key: &[u8; 32],
    sealed: &SealedSecret,
    user_id: &Uuid,
) -> Result<Zeroizing<Vec<u8>>> {
    let kek = mfa_kek(master_key, user_id)?;
    open(&kek, sealed, &mfa_aad(user_id))
}
