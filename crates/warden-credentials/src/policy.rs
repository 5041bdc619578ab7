//! Role-specific password policies.

use crate::{errors::FieldError, types::PasswordCharacteristics};
use warden_crypto::DAY;
use warden_policy::Role;

/// Strength, history and age rules for one role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_symbol: bool,
    /// Retired passwords that may not be reused
    pub history_depth: usize,
    pub max_age_seconds: u64,
    /// Length of server-generated temporary passwords
    pub temporary_length: usize,
}

/// Upper bound applied to every role
pub const MAX_PASSWORD_LENGTH: usize = 128;

impl PasswordPolicy {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::User => Self {
                min_length: 12,
                require_symbol: false,
                history_depth: 3,
                max_age_seconds: 180 * DAY,
                temporary_length: 14,
            },
            Role::Admin => Self {
                min_length: 14,
                require_symbol: true,
                history_depth: 5,
                max_age_seconds: 90 * DAY,
                temporary_length: 18,
            },
            Role::SiteAdmin => Self {
                min_length: 16,
                require_symbol: true,
                history_depth: 10,
                max_age_seconds: 60 * DAY,
                temporary_length: 24,
            },
        }
    }

    /// Every rule the password breaks, empty when it passes
    pub fn violations(&self, chars: &PasswordCharacteristics) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if chars.length < self.min_length {
            errors.push(FieldError::new(
                "password",
                format!("must be at least {} characters", self.min_length),
            ));
        }
        if chars.length > MAX_PASSWORD_LENGTH {
            errors.push(FieldError::new(
                "password",
                format!("must be at most {} characters", MAX_PASSWORD_LENGTH),
            ));
        }
        if !chars.has_lowercase {
            errors.push(FieldError::new("password", "must contain a lowercase letter"));
        }
        if !chars.has_uppercase {
            errors.push(FieldError::new("password", "must contain an uppercase letter"));
        }
        if !chars.has_digit {
            errors.push(FieldError::new("password", "must contain a digit"));
        }
        if self.require_symbol && !chars.has_symbol {
            errors.push(FieldError::new("password", "must contain a symbol"));
        }

        errors
    }
}
