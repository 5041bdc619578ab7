//! Demotion tests.

use super::helpers::*;
use crate::*;
use warden_audit::events;
use warden_policy::Role;

#[tokio::test]
async fn test_site_admin_demotes_admin() {
    let h = harness();
    let root = create(&h, "root", Role::SiteAdmin).await;
    let admin = create(&h, "admin1", Role::Admin).await;

    let demotion = h.service.demote(&root, admin.user_id, None).await.unwrap();
    assert_eq!(demotion.revoked, vec![Role::Admin]);
    assert_eq!(demotion.remaining, Role::User);
    assert_eq!(role_of(&h, &admin).await, Role::User);

    let logged = events_of(&h, events::ROLE_DEMOTED).await;
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].actor_id, Some(root.user_id));
    assert_eq!(logged[0].target_id, Some(admin.user_id));
    assert_eq!(logged[0].detail_str("from_role").as_deref(), Some("admin"));
}

#[tokio::test]
async fn test_admin_demotes_peer() {
    let h = harness();
    let admin1 = create(&h, "admin1", Role::Admin).await;
    let admin2 = create(&h, "admin2", Role::Admin).await;

    h.service.demote(&admin1, admin2.user_id, None).await.unwrap();
    assert_eq!(role_of(&h, &admin2).await, Role::User);
    assert_eq!(role_of(&h, &admin1).await, Role::Admin);
}

#[tokio::test]
async fn test_cannot_demote_self() {
    let h = harness();
    let admin = create(&h, "admin1", Role::Admin).await;

    assert!(matches!(
        h.service.demote(&admin, admin.user_id, None).await,
        Err(RoleError::Forbidden(_))
    ));
    assert_eq!(role_of(&h, &admin).await, Role::Admin);
}

#[tokio::test]
async fn test_site_admin_is_never_demoted() {
    let h = harness();
    let root = create(&h, "root", Role::SiteAdmin).await;
    let other = create(&h, "root2", Role::SiteAdmin).await;
    let admin = create(&h, "admin1", Role::Admin).await;

    for actor in [&root, &admin] {
        assert!(matches!(
            h.service.demote(actor, other.user_id, None).await,
            Err(RoleError::InvalidOperation(_))
        ));
    }
    assert_eq!(role_of(&h, &other).await, Role::SiteAdmin);
    assert!(events_of(&h, events::ROLE_DEMOTED).await.is_empty());
}

#[tokio::test]
async fn test_plain_user_has_nothing_to_demote() {
    let h = harness();
    let admin = create(&h, "admin1", Role::Admin).await;
    let user = create(&h, "ursula", Role::User).await;

    assert!(matches!(
        h.service.demote(&admin, user.user_id, None).await,
        Err(RoleError::InvalidOperation(_))
    ));
}

#[tokio::test]
async fn test_user_cannot_demote() {
    let h = harness();
    let user = create(&h, "ursula", Role::User).await;
    let admin = create(&h, "admin1", Role::Admin).await;

    assert!(matches!(
        h.service.demote(&user, admin.user_id, None).await,
        Err(RoleError::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_demoted_admin_can_be_promoted_again() {
    let h = harness();
    let root = create(&h, "root", Role::SiteAdmin).await;
    let admin = create(&h, "admin1", Role::Admin).await;
    h.service.demote(&root, admin.user_id, None).await.unwrap();

    let request = h
        .service
        .initiate_promotion(&root, admin.user_id, Role::User, Role::Admin, None)
        .await
        .unwrap();
    let decided = h
        .service
        .vote(&root, request.request_id, VoteDecision::Approve, None)
        .await
        .unwrap();
    assert_eq!(decided.status, PromotionStatus::Approved);
    assert_eq!(role_of(&h, &admin).await, Role::Admin);
}
