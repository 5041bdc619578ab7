//! The authorization function.

use crate::capabilities::describe;
use crate::types::*;

/// Decide whether `actor` may perform `action` on `resource`.
///
/// Checks run in order and the first failure wins:
/// 1. Self-targeting of actions that forbid it
/// 2. Tier guard: admin-tier actions never reach a higher-tier account
/// 3. Capability check against the actor's role
pub fn is_authorized(actor: &Actor, action: Action, resource: &Resource) -> AuthzDecision {
    let mut audit_tags = vec![
        format!("action:{:?}", action),
        format!("role:{}", actor.role),
    ];

    let on_self = match resource {
        Resource::Own => true,
        Resource::User { id, .. } => *id == actor.user_id,
        Resource::System => false,
    };
    let required = action.required_capabilities(on_self);
    let admin_tier = !Role::User.capabilities().contains(required);

    if on_self && action.forbids_self() {
        audit_tags.push("self_target".to_string());
        return deny(
            format!("{:?} cannot target the actor's own account", action),
            admin_tier,
            audit_tags,
        );
    }

    if let Resource::User { id, role } = resource {
        if *id != actor.user_id && role.tier() > actor.role.tier() {
            audit_tags.push(format!("target_role:{}", role));
            return deny(
                format!("{} cannot act on a {} account", actor.role, role),
                admin_tier,
                audit_tags,
            );
        }
    }

    let granted = actor.role.capabilities();
    if !granted.contains(required) {
        let missing = required.difference(granted);
        audit_tags.push(format!("missing_capabilities:{}", describe(missing)));
        return deny(
            format!("Role {} lacks capability {}", actor.role, describe(missing)),
            admin_tier,
            audit_tags,
        );
    }

    AuthzDecision {
        verdict: Verdict::Allow,
        reason: format!("{} permitted for {}", describe(required), actor.role),
        admin_tier,
        audit_tags,
    }
}

fn deny(reason: String, admin_tier: bool, audit_tags: Vec<String>) -> AuthzDecision {
    AuthzDecision {
        verdict: Verdict::Deny,
        reason,
        admin_tier,
        audit_tags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn actor(role: Role) -> Actor {
        Actor {
            user_id: Uuid::new_v4(),
            role,
        }
    }

    fn other(role: Role) -> Resource {
        Resource::User {
            id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn test_user_self_service_allowed() {
        let user = actor(Role::User);
        let decision = is_authorized(&user, Action::ManageAccount, &Resource::Own);
        assert!(decision.is_allowed());
        assert!(!decision.admin_tier);
        assert!(is_authorized(&user, Action::RequestDeletion, &Resource::Own).is_allowed());

        let own = Resource::User {
            id: user.user_id,
            role: Role::User,
        };
        assert!(is_authorized(&user, Action::CancelDeletion, &own).is_allowed());
    }

    #[test]
    fn test_user_cannot_touch_others() {
        let user = actor(Role::User);
        let decision = is_authorized(&user, Action::RequestDeletion, &other(Role::User));
        assert_eq!(decision.verdict, Verdict::Deny);
        assert!(decision.reason.contains("DELETE_USERS"));
        assert!(decision.admin_tier);
        assert!(!is_authorized(&user, Action::ViewAuditLog, &Resource::System).is_allowed());
    }

    #[test]
    fn test_admin_cannot_act_on_site_admin() {
        let admin = actor(Role::Admin);
        let decision = is_authorized(&admin, Action::Demote, &other(Role::SiteAdmin));
        assert!(!decision.is_allowed());
        assert!(decision.audit_tags.contains(&"target_role:site_admin".to_string()));

        assert!(is_authorized(&admin, Action::Demote, &other(Role::Admin)).is_allowed());
    }

    #[test]
    fn test_self_targeting_forbidden() {
        let admin = actor(Role::SiteAdmin);
        let decision = is_authorized(&admin, Action::Demote, &Resource::Own);
        assert!(!decision.is_allowed());
        assert!(decision.audit_tags.contains(&"self_target".to_string()));

        let own = Resource::User {
            id: admin.user_id,
            role: Role::SiteAdmin,
        };
        assert!(!is_authorized(&admin, Action::VotePromotion, &own).is_allowed());
    }

    #[test]
    fn test_override_and_site_admin_grant_need_site_admin() {
        let admin = actor(Role::Admin);
        let site = actor(Role::SiteAdmin);
        let target = other(Role::Admin);

        assert!(!is_authorized(&admin, Action::OverrideDeletion, &target).is_allowed());
        assert!(is_authorized(&site, Action::OverrideDeletion, &target).is_allowed());
        assert!(!is_authorized(&admin, Action::GrantSiteAdmin, &target).is_allowed());
        assert!(is_authorized(&site, Action::GrantSiteAdmin, &target).is_allowed());
    }

    #[test]
    fn test_decision_is_pure() {
        let admin = actor(Role::Admin);
        let target = other(Role::User);
        let a = is_authorized(&admin, Action::ViewUser, &target);
        let b = is_authorized(&admin, Action::ViewUser, &target);
        assert_eq!(a, b);
    }
}
