//! Temporary password generation.

use crate::{errors::*, policy::PasswordPolicy};
use rand::{seq::SliceRandom, Rng};
use warden_crypto::seeded_rng;
use zeroize::Zeroizing;

// Visually ambiguous characters (0/O, 1/l/I) are left out.
const LOWERCASE: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const DIGITS: &[u8] = b"23456789";
const SYMBOLS: &[u8] = b"!#$%&*+-=?@^_";

/// Generate a random password that satisfies `policy`.
///
/// Contains at least one character of every class, symbols included, so the
/// result meets the policy of every role. Fails with `TokenGeneration` when
/// the entropy source is unavailable.
pub fn generate_temporary_password(policy: &PasswordPolicy) -> Result<Zeroizing<String>> {
    let mut rng = seeded_rng().map_err(|e| CredentialError::TokenGeneration(e.to_string()))?;

    let classes = [LOWERCASE, UPPERCASE, DIGITS, SYMBOLS];
    let length = policy.temporary_length.max(classes.len());

    let mut chars: Zeroizing<Vec<u8>> = Zeroizing::new(Vec::with_capacity(length));
    for class in classes {
        chars.push(class[rng.gen_range(0..class.len())]);
    }

    let all: Vec<u8> = classes.concat();
    while chars.len() < length {
        chars.push(all[rng.gen_range(0..all.len())]);
    }
    chars.shuffle(&mut rng);

    let password: String = chars.iter().map(|&b| b as char).collect();
    Ok(Zeroizing::new(password))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PasswordCharacteristics;
    use warden_policy::Role;

    #[test]
    fn test_generated_password_meets_every_policy() {
        for role in Role::ALL {
            let policy = PasswordPolicy::for_role(role);
            let password = generate_temporary_password(&policy).unwrap();
            assert_eq!(password.len(), policy.temporary_length);
            assert!(policy
                .violations(&PasswordCharacteristics::of(&password))
                .is_empty());
        }
    }

    #[test]
    fn test_generated_passwords_differ() {
        let policy = PasswordPolicy::for_role(Role::User);
        let a = generate_temporary_password(&policy).unwrap();
        let b = generate_temporary_password(&policy).unwrap();
        assert_ne!(*a, *b);
    }
}
