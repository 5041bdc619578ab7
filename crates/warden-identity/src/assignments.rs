//! Role assignment reads and staged writes.
//!
//! Writes are staged into a caller-owned [`Batch`] so a role change commits
//! together with whatever workflow state caused it.

use crate::{errors::Result, types::RoleAssignment};
use uuid::Uuid;
use warden_policy::Role;
use warden_storage::{child_key, Batch, BatchExt, Storage, CF_USER_ROLES};

/// Load every assignment (active or not) for `user_id`
pub async fn load<S: Storage + ?Sized>(storage: &S, user_id: Uuid) -> Result<Vec<RoleAssignment>> {
    let rows: Vec<(Vec<u8>, RoleAssignment)> = storage
        .get_by_prefix(CF_USER_ROLES, user_id.as_bytes())
        .await?;
    Ok(rows.into_iter().map(|(_, a)| a).collect())
}

/// Active roles, lowest tier first. The user tier is always present.
pub fn active_roles(assignments: &[RoleAssignment]) -> Vec<Role> {
    let mut roles: Vec<Role> = assignments
        .iter()
        .filter(|a| a.active)
        .map(|a| a.role)
        .collect();
    if !roles.contains(&Role::User) {
        roles.push(Role::User);
    }
    roles.sort();
    roles.dedup();
    roles
}

/// Highest active role
pub fn highest_role(assignments: &[RoleAssignment]) -> Role {
    active_roles(assignments)
        .into_iter()
        .max()
        .unwrap_or(Role::User)
}

/// Stage an active assignment of `role`, reactivating a previous one if present
pub fn stage_grant(
    batch: &mut dyn Batch,
    existing: &[RoleAssignment],
    user_id: Uuid,
    role: Role,
    granted_by: Option<Uuid>,
    now: u64,
) -> Result<RoleAssignment> {
    let assignment = match existing.iter().find(|a| a.role == role) {
        Some(prev) => RoleAssignment {
            active: true,
            granted_at: now,
            granted_by,
            revoked_at: None,
            ..prev.clone()
        },
        None => RoleAssignment {
            assignment_id: Uuid::new_v4(),
            user_id,
            role,
            active: true,
            granted_at: now,
            granted_by,
            revoked_at: None,
        },
    };

    batch.put(
        CF_USER_ROLES,
        &child_key(&user_id, &assignment.assignment_id),
        &assignment,
    )?;
    Ok(assignment)
}

/// Stage deactivation of `assignment`
pub fn stage_revoke(
    batch: &mut dyn Batch,
    assignment: &RoleAssignment,
    now: u64,
) -> Result<RoleAssignment> {
    let revoked = RoleAssignment {
        active: false,
        revoked_at: Some(now),
        ..assignment.clone()
    };
    batch.put(
        CF_USER_ROLES,
        &child_key(&assignment.user_id, &assignment.assignment_id),
        &revoked,
    )?;
    Ok(revoked)
}

/// Stage removal of every assignment row
pub fn stage_purge(batch: &mut dyn Batch, assignments: &[RoleAssignment]) -> Result<()> {
    for a in assignments {
        batch.delete(CF_USER_ROLES, &child_key(&a.user_id, &a.assignment_id))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(role: Role, active: bool) -> RoleAssignment {
        RoleAssignment {
            assignment_id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            role,
            active,
            granted_at: 0,
            granted_by: None,
            revoked_at: None,
        }
    }

    #[test]
    fn test_user_tier_always_active() {
        assert_eq!(active_roles(&[]), vec![Role::User]);
        assert_eq!(highest_role(&[assignment(Role::Admin, false)]), Role::User);
    }

    #[test]
    fn test_highest_role() {
        let roles = [
            assignment(Role::User, true),
            assignment(Role::Admin, true),
            assignment(Role::SiteAdmin, false),
        ];
        assert_eq!(highest_role(&roles), Role::Admin);
        assert_eq!(active_roles(&roles), vec![Role::User, Role::Admin]);
    }
}
