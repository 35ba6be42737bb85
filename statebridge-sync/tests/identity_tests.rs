mod common;

use common::{alice, alice_credentials, count, count_from, pair};
use pretty_assertions::assert_eq;
use statebridge_diagnostics::HealthStatus;
use statebridge_sync::identity::{Credentials, IdentityField, IdentityStore, ProfileUpdate};
use statebridge_sync::{Reconciler, StoreError};
use statebridge_types::ErrorCode;

#[tokio::test]
async fn login_reaches_the_peer_before_returning() {
    let p = pair();
    let user = p.legacy.login(alice_credentials()).await.unwrap();
    assert_eq!(user, alice());

    // auth:login is high priority, so no flush is needed.
    let mirrored = p.modern_stores.identity.snapshot();
    assert!(mirrored.authenticated);
    assert_eq!(mirrored.user, Some(alice()));
    assert_eq!(mirrored.token, p.legacy_stores.identity.snapshot().token);

    p.bus.flush();
    assert_eq!(count(&p.bus, "auth:login"), 1);
    assert_eq!(count(&p.bus, "auth:updated"), 1);
    assert_eq!(p.modern.identity().pending(), 0);
    assert_eq!(count_from(&p.bus, "modern"), 0);
}

#[tokio::test]
async fn logout_clears_both_sides() {
    let p = pair();
    p.legacy.login(alice_credentials()).await.unwrap();
    p.bus.flush();

    p.modern.logout().await.unwrap();
    p.bus.flush();

    let legacy = p.legacy_stores.identity.snapshot();
    assert!(!legacy.authenticated);
    assert!(legacy.user.is_none());
    assert!(legacy.token.is_none());
    assert_eq!(p.legacy.identity().pending(), 0);
    let logout = p
        .bus
        .history()
        .into_iter()
        .find(|r| r.name == "auth:logout")
        .unwrap();
    assert_eq!(logout.payload["userId"], "u-1");
}

#[tokio::test]
async fn refreshed_token_is_mirrored() {
    let p = pair();
    p.legacy.login(alice_credentials()).await.unwrap();
    let token = p.legacy.refresh_token().await.unwrap();
    p.bus.flush();

    assert_eq!(p.modern_stores.identity.snapshot().token, Some(token));
    assert_eq!(count(&p.bus, "auth:tokenRefreshed"), 1);
}

#[tokio::test]
async fn profile_update_is_mirrored() {
    let p = pair();
    p.legacy.login(alice_credentials()).await.unwrap();
    let update = ProfileUpdate {
        name: Some("Alice B.".to_string()),
        ..Default::default()
    };
    let user = p.legacy.update_profile(update).await.unwrap();
    assert_eq!(user.name, "Alice B.");
    p.bus.flush();

    let mirrored = p.modern_stores.identity.snapshot().user.unwrap();
    assert_eq!(mirrored.name, "Alice B.");
}

#[tokio::test]
async fn loading_flag_stays_local() {
    let p = pair();
    p.legacy_stores.identity.set_loading(true);

    assert!(!p.legacy.identity().is_dirty(IdentityField::Loading));
    assert_eq!(p.legacy.identity().pending(), 0);
    assert!(!p.modern_stores.identity.snapshot().loading);
}

#[tokio::test]
async fn direct_store_login_is_marked_dirty() {
    let p = pair();
    p.legacy_stores
        .identity
        .login(&alice_credentials())
        .await
        .unwrap();

    assert!(p.legacy.identity().is_dirty(IdentityField::User));
    assert!(p.legacy.identity().is_dirty(IdentityField::Token));
    assert_eq!(p.legacy.identity().flush(), 1);
    p.bus.flush();
    assert!(p.modern_stores.identity.snapshot().authenticated);
}

#[tokio::test]
async fn wrong_password_is_a_failure_with_cause() {
    let p = pair();
    let err = p
        .legacy
        .login(Credentials::new("alice@example.com", "nope"))
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::AuthLogin);
    assert!(!err.recoverable);
    let cause = err.cause().unwrap().downcast_ref::<StoreError>().unwrap();
    assert_eq!(cause, &StoreError::Rejected("invalid credentials".to_string()));
    assert!(!p.modern_stores.identity.snapshot().authenticated);
    assert_eq!(count(&p.bus, "auth:login"), 0);
}

#[tokio::test]
async fn refresh_requires_a_session() {
    let p = pair();
    let err = p.legacy.refresh_token().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthRefresh);
    assert_eq!(
        p.legacy.status().components["identity:legacy"].status,
        HealthStatus::Healthy
    );
}

#[tokio::test(start_paused = true)]
async fn transient_login_failure_recovers() {
    let p = pair();
    p.legacy_stores
        .identity
        .faults()
        .fail_next(1, StoreError::Transient("timeout".to_string()));

    p.legacy.login(alice_credentials()).await.unwrap();
    assert_eq!(p.legacy_stores.identity.faults().calls(), 2);
    assert!(p.modern_stores.identity.snapshot().authenticated);
}

#[tokio::test]
async fn failed_patch_is_reported_and_not_echoed() {
    let p = pair();
    p.modern_stores
        .identity
        .patch_faults()
        .fail_next(1, StoreError::Rejected("locked".to_string()));

    p.legacy.login(alice_credentials()).await.unwrap();

    let component = p.modern.status().components["identity:modern"].clone();
    assert_eq!(component.status, HealthStatus::Degraded);
    assert_eq!(component.error.unwrap().code, ErrorCode::SyncFailed);

    // The queued auth:updated snapshot still converges the peer.
    p.bus.flush();
    assert!(p.modern_stores.identity.snapshot().authenticated);
    assert_eq!(p.modern.identity().pending(), 0);
    assert_eq!(count_from(&p.bus, "modern"), 0);
}

#[tokio::test]
async fn peer_snapshot_only_copies_changed_fields() {
    let p = pair();
    p.legacy.login(alice_credentials()).await.unwrap();
    p.bus.flush();

    let update = ProfileUpdate {
        name: Some("Alicia".to_string()),
        ..Default::default()
    };
    p.modern_stores.identity.update_profile(&update).await.unwrap();
    assert!(p.modern.identity().is_dirty(IdentityField::User));

    let token = p.legacy.refresh_token().await.unwrap();
    p.bus.flush();

    let modern = p.modern_stores.identity.snapshot();
    assert_eq!(modern.token, Some(token));
    assert_eq!(modern.user.unwrap().name, "Alicia");

    assert_eq!(p.modern.identity().flush(), 1);
    p.bus.flush();
    assert_eq!(p.legacy_stores.identity.snapshot().user.unwrap().name, "Alicia");
    assert_eq!(p.legacy.identity().pending(), 0);
}
