//! Role → capability table.

use crate::types::{Action, Role};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Capabilities granted by a role
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        /// Manage one's own account
        const SELF_SERVICE = 0b0000_0000_0001;
        /// Create and administer other accounts
        const MANAGE_USERS = 0b0000_0000_0010;
        const INITIATE_PROMOTION = 0b0000_0000_0100;
        const VOTE_PROMOTION = 0b0000_0000_1000;
        const DEMOTE = 0b0000_0001_0000;
        /// Request deletion of other accounts
        const DELETE_USERS = 0b0000_0010_0000;
        /// Skip the cooling-off period
        const OVERRIDE_DELETION = 0b0000_0100_0000;
        const VIEW_AUDIT = 0b0000_1000_0000;
        const EXPORT_AUDIT = 0b0001_0000_0000;
        const GRANT_SITE_ADMIN = 0b0010_0000_0000;

        const USER = Self::SELF_SERVICE.bits();

        const ADMIN = Self::USER.bits()
            | Self::MANAGE_USERS.bits()
            | Self::INITIATE_PROMOTION.bits()
            | Self::VOTE_PROMOTION.bits()
            | Self::DEMOTE.bits()
            | Self::DELETE_USERS.bits()
            | Self::VIEW_AUDIT.bits()
            | Self::EXPORT_AUDIT.bits();

        const SITE_ADMIN = Self::ADMIN.bits()
            | Self::OVERRIDE_DELETION.bits()
            | Self::GRANT_SITE_ADMIN.bits();
    }
}

impl Serialize for Capabilities {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Capabilities {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bits = u32::deserialize(deserializer)?;
        Ok(Capabilities::from_bits_truncate(bits))
    }
}

impl Role {
    /// Capabilities this role grants
    pub fn capabilities(self) -> Capabilities {
        match self {
            Role::User => Capabilities::USER,
            Role::Admin => Capabilities::ADMIN,
            Role::SiteAdmin => Capabilities::SITE_ADMIN,
        }
    }
}

impl Action {
    /// Capabilities needed to perform this action.
    ///
    /// `on_self` is true when the action targets the actor's own account.
    pub fn required_capabilities(self, on_self: bool) -> Capabilities {
        match self {
            Action::ManageAccount | Action::ViewUser | Action::ViewDeletionStatus => {
                if on_self {
                    Capabilities::SELF_SERVICE
                } else {
                    Capabilities::MANAGE_USERS
                }
            }
            Action::RequestDeletion | Action::CancelDeletion => {
                if on_self {
                    Capabilities::SELF_SERVICE
                } else {
                    Capabilities::DELETE_USERS
                }
            }
            Action::CreateUser | Action::IssueTemporaryCredential => Capabilities::MANAGE_USERS,
            Action::InitiatePromotion => Capabilities::INITIATE_PROMOTION,
            Action::GrantSiteAdmin => {
                Capabilities::INITIATE_PROMOTION | Capabilities::GRANT_SITE_ADMIN
            }
            Action::VotePromotion | Action::ViewPromotions => Capabilities::VOTE_PROMOTION,
            Action::Demote => Capabilities::DEMOTE,
            Action::OverrideDeletion => {
                Capabilities::DELETE_USERS | Capabilities::OVERRIDE_DELETION
            }
            Action::ViewAuditLog | Action::VerifyAuditLog => Capabilities::VIEW_AUDIT,
            Action::ExportAuditLog => Capabilities::EXPORT_AUDIT,
        }
    }
}

/// Describe capabilities as a comma-separated list of names
pub fn describe(caps: Capabilities) -> String {
    let names: Vec<&str> = caps.iter_names().map(|(name, _)| name).collect();
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiers_are_supersets() {
        assert!(Capabilities::ADMIN.contains(Capabilities::USER));
        assert!(Capabilities::SITE_ADMIN.contains(Capabilities::ADMIN));
        assert!(!Capabilities::ADMIN.contains(Capabilities::OVERRIDE_DELETION));
    }

    #[test]
    fn test_self_service_actions_need_more_for_others() {
        let own = Action::RequestDeletion.required_capabilities(true);
        let other = Action::RequestDeletion.required_capabilities(false);
        assert!(Role::User.capabilities().contains(own));
        assert!(!Role::User.capabilities().contains(other));
        assert!(Role::Admin.capabilities().contains(other));
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(Capabilities::empty()), "none");
        assert!(describe(Capabilities::DEMOTE).contains("DEMOTE"));
    }
}
