//! Sign-in, sign-out, restart and the services that follow the session.

#![allow(clippy::unwrap_used)]

use aurora_core::checkout::ShippingMethod;
use aurora_core::{OrderStatus, Price};
use aurora_integration_tests::{PASSWORD, TestContext, drain_notices, user_id_for};
use aurora_storefront::checkout::CheckoutRequest;
use aurora_storefront::error::AppError;
use aurora_storefront::local::{LocalStorage, SESSION_KEY};
use aurora_storefront::notice::NoticeLevel;
use aurora_storefront::remote::ProfileUpdate;
use aurora_storefront::session::AuthError;

const EMAIL: &str = "ana@example.com";

#[tokio::test]
async fn test_wrong_password_keeps_signed_out() {
    let ctx = TestContext::start();
    let mut notices = ctx.state.notices().subscribe();

    let result = ctx.sign_in(EMAIL, "nope").await;

    assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    assert!(ctx.state.session().current().is_none());
    assert!(ctx.storage.get(SESSION_KEY).unwrap().is_none());
    let levels: Vec<_> = drain_notices(&mut notices).into_iter().map(|n| n.level).collect();
    assert_eq!(levels, vec![NoticeLevel::Error]);
}

#[tokio::test]
async fn test_sign_in_creates_profile_and_persists_session() {
    let ctx = TestContext::start();
    let session = ctx.sign_in(EMAIL, PASSWORD).await.unwrap();

    assert_eq!(session.user_id, user_id_for(EMAIL));
    assert!(ctx.storage.get(SESSION_KEY).unwrap().is_some());

    let profile = ctx.state.profile().current().unwrap();
    assert_eq!(profile.email, EMAIL);
    assert_eq!(profile.full_name.as_deref(), Some("ana"));
    assert_eq!(ctx.store.profile(&session.user_id), Some(profile));
}

#[tokio::test]
async fn test_restart_restores_session() {
    let ctx = TestContext::start();
    ctx.sign_in(EMAIL, PASSWORD).await.unwrap();
    ctx.state
        .wishlist()
        .add_item(aurora_core::ProductId::new(2), true)
        .await
        .unwrap();

    let ctx = ctx.restart().await;

    let session = ctx.state.session().current().unwrap();
    assert_eq!(session.user_id, user_id_for(EMAIL));
    assert!(ctx.state.wishlist().is_in_wishlist(aurora_core::ProductId::new(2)));
    assert!(ctx.state.profile().current().is_some());
}

#[tokio::test]
async fn test_sign_out_forgets_user_state() {
    let ctx = TestContext::start();
    ctx.sign_in(EMAIL, PASSWORD).await.unwrap();
    ctx.sign_out().await.unwrap();

    assert!(ctx.state.session().current().is_none());
    assert!(ctx.storage.get(SESSION_KEY).unwrap().is_none());
    assert!(ctx.state.profile().current().is_none());
    assert!(matches!(
        ctx.state.orders().list().await,
        Err(AppError::NotAuthenticated)
    ));

    // Signing out twice is harmless.
    ctx.sign_out().await.unwrap();
}

#[tokio::test]
async fn test_profile_update_round_trips() {
    let ctx = TestContext::start();
    ctx.sign_in(EMAIL, PASSWORD).await.unwrap();

    let updated = ctx
        .state
        .profile()
        .update(&ProfileUpdate {
            full_name: Some("Ana Torres".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(updated.full_name.as_deref(), Some("Ana Torres"));
    assert_eq!(ctx.store.profile(&user_id_for(EMAIL)), Some(updated));
}

#[tokio::test]
async fn test_checkout_records_pending_order() {
    let ctx = TestContext::start();
    ctx.sign_in(EMAIL, PASSWORD).await.unwrap();
    ctx.state.cart().add_item(&ctx.product(1), "M", "Blanco");

    let outcome = ctx
        .state
        .checkout()
        .start(&CheckoutRequest {
            shipping: ShippingMethod::Standard,
            email: EMAIL.to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    // 19.99 + 5.99 shipping
    assert_eq!(outcome.summary.total, Price::from_cents(2598));
    assert_eq!(outcome.session.payment_url.host_str(), Some("pay.example.test"));
    let order = outcome.order.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);

    let orders = ctx.state.orders().list().await.unwrap();
    assert_eq!(orders, vec![order]);
    // The cart is kept until payment completes.
    assert_eq!(ctx.state.cart().total_items(), 1);
}

#[tokio::test]
async fn test_guest_checkout_records_nothing() {
    let ctx = TestContext::start();
    ctx.state.settle().await;
    ctx.state.cart().add_item(&ctx.product(3), "32", "Beige");

    let outcome = ctx
        .state
        .checkout()
        .start(&CheckoutRequest {
            email: "guest@example.com".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(outcome.order.is_none());
}
