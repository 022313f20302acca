//! Code request and verification flows through the auth service.

mod common;

use chrono::Duration;
use common::{TestApp, TEST_PHONE};
use field_auth::services::{AuthError, Clock, CodeStorage, UserDirectory};

#[tokio::test]
async fn wrong_code_is_unauthorized() {
    // Arrange
    let app = TestApp::spawn();
    let requested = app
        .auth()
        .request_verification_code(TEST_PHONE)
        .await
        .unwrap();
    assert!(!requested.verification_id.is_empty());

    // Pick a code that is guaranteed not to be the delivered one
    let wrong = if app.last_code() == "000000" { "111111" } else { "000000" };

    // Act
    let err = app
        .auth()
        .verify_code(&requested.verification_id, TEST_PHONE, wrong)
        .await
        .unwrap_err();

    // Assert
    assert!(matches!(err, AuthError::Unauthorized(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn delivered_code_is_the_stored_code() {
    // Arrange
    let app = TestApp::spawn();

    // Act
    let requested = app
        .auth()
        .request_verification_code("+1 (555) 123-4567")
        .await
        .unwrap();

    // Assert
    let delivery = app.notifier.last_delivery().unwrap();
    assert_eq!(delivery.phone_number, TEST_PHONE);
    assert_eq!(delivery.code.len(), 6);
    assert_eq!(delivery.expires_in, Duration::minutes(10));

    let record = app
        .storage
        .get(&requested.verification_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.code, delivery.code);
    assert_eq!(record.expires_at, requested.expires_at);
}

#[tokio::test]
async fn code_can_be_used_again_within_ttl() {
    // Arrange
    let app = TestApp::spawn();
    let requested = app
        .auth()
        .request_verification_code(TEST_PHONE)
        .await
        .unwrap();
    let code = app.last_code();

    // Act
    let first = app
        .auth()
        .verify_code(&requested.verification_id, TEST_PHONE, &code)
        .await;
    let second = app
        .auth()
        .verify_code(&requested.verification_id, TEST_PHONE, &code)
        .await;

    // Assert
    assert!(first.is_ok());
    assert!(second.is_ok());
}

#[tokio::test]
async fn code_expires_after_ttl() {
    // Arrange
    let app = TestApp::spawn();
    let requested = app
        .auth()
        .request_verification_code(TEST_PHONE)
        .await
        .unwrap();
    let code = app.last_code();

    // Act
    app.clock.advance(Duration::minutes(11));
    let err = app
        .auth()
        .verify_code(&requested.verification_id, TEST_PHONE, &code)
        .await
        .unwrap_err();

    // Assert
    assert!(matches!(err, AuthError::Unauthorized(_)));
    assert_eq!(app.storage.len().await.unwrap(), 0);
}

#[tokio::test]
async fn code_is_bound_to_the_requesting_phone() {
    // Arrange
    let app = TestApp::spawn();
    let requested = app
        .auth()
        .request_verification_code(TEST_PHONE)
        .await
        .unwrap();
    let code = app.last_code();

    // Act
    let err = app
        .auth()
        .verify_code(&requested.verification_id, "+15559876543", &code)
        .await
        .unwrap_err();

    // Assert
    assert!(matches!(err, AuthError::Unauthorized(_)));
    assert!(app.directory.is_empty());
}

#[tokio::test]
async fn first_verification_creates_active_identity() {
    // Arrange
    let app = TestApp::spawn();
    let before = app.clock.now();

    // Act
    let token = app.sign_in(TEST_PHONE).await;

    // Assert
    let claims = app.auth().jwt().decode_claims(&token, false).unwrap();
    let identity = app.directory.find_by_id(&claims.sub).await.unwrap().unwrap();
    assert!(identity.is_active);
    assert_eq!(identity.phone_number, TEST_PHONE);
    assert_eq!(identity.last_authenticated_at, before);
    assert_eq!(claims.phone, TEST_PHONE);
}

#[tokio::test]
async fn returning_user_keeps_identity() {
    // Arrange
    let app = TestApp::spawn();
    let first = app.sign_in(TEST_PHONE).await;

    // Act
    app.clock.advance(Duration::hours(1));
    let second = app.sign_in(TEST_PHONE).await;

    // Assert
    let jwt = app.auth().jwt();
    assert_eq!(
        jwt.extract_user_id(&first),
        jwt.extract_user_id(&second)
    );
    assert_eq!(app.directory.len(), 1);
}

#[tokio::test]
async fn delivery_failure_is_retryable_and_code_stays_stored() {
    // Arrange
    let app = TestApp::spawn();
    app.notifier.set_failing(true);

    // Act
    let err = app
        .auth()
        .request_verification_code(TEST_PHONE)
        .await
        .unwrap_err();

    // Assert
    assert!(matches!(err, AuthError::DependencyFailure { .. }));
    assert!(err.is_retryable());
    assert_eq!(app.storage.len().await.unwrap(), 1);
    assert_eq!(app.notifier.send_count(), 0);

    // The retained code is delivered once the notifier recovers, and it verifies
    let verification_id = err.verification_id().unwrap().to_string();
    app.notifier.set_failing(false);
    app.clock.advance(Duration::minutes(3));

    let resent = app
        .auth()
        .resend_verification_code(&verification_id, TEST_PHONE)
        .await
        .unwrap();
    assert_eq!(resent.verification_id, verification_id);
    assert_eq!(app.storage.len().await.unwrap(), 1);

    let delivery = app.notifier.last_delivery().unwrap();
    assert_eq!(delivery.expires_in, Duration::minutes(7));
    let stored = app.storage.get(&verification_id).await.unwrap().unwrap();
    assert_eq!(delivery.code, stored.code);
    assert_eq!(resent.expires_at, stored.expires_at);

    let token = app
        .auth()
        .verify_code(&verification_id, TEST_PHONE, &delivery.code)
        .await
        .unwrap();
    assert!(app.auth().validate_token(&token.token));
}

#[tokio::test]
async fn expired_code_cannot_be_resent() {
    // Arrange
    let app = TestApp::spawn();
    app.notifier.set_failing(true);
    let err = app
        .auth()
        .request_verification_code(TEST_PHONE)
        .await
        .unwrap_err();
    let verification_id = err.verification_id().unwrap().to_string();
    app.notifier.set_failing(false);
    app.clock.advance(Duration::minutes(10));

    // Act
    let err = app
        .auth()
        .resend_verification_code(&verification_id, TEST_PHONE)
        .await
        .unwrap_err();

    // Assert
    assert!(matches!(err, AuthError::Unauthorized(_)));
    assert_eq!(app.notifier.send_count(), 0);
    assert_eq!(app.storage.len().await.unwrap(), 0);
}

#[tokio::test]
async fn malformed_input_is_rejected_before_side_effects() {
    // Arrange
    let app = TestApp::spawn();

    // Act
    let bad_phone = app.auth().request_verification_code("555-1234").await;
    let bad_code = app.auth().verify_code("some-id", TEST_PHONE, "12345").await;
    let bad_id = app.auth().verify_code("", TEST_PHONE, "123456").await;

    // Assert
    assert!(matches!(bad_phone, Err(AuthError::Validation(_))));
    assert!(matches!(bad_code, Err(AuthError::Validation(_))));
    assert!(matches!(bad_id, Err(AuthError::Validation(_))));
    assert_eq!(app.notifier.send_count(), 0);
    assert_eq!(app.storage.len().await.unwrap(), 0);
}

#[tokio::test]
async fn sweep_leaves_live_codes_alone() {
    // Arrange
    let app = TestApp::spawn();
    app.auth()
        .request_verification_code(TEST_PHONE)
        .await
        .unwrap();
    app.clock.advance(Duration::minutes(6));
    let live = app
        .auth()
        .request_verification_code(TEST_PHONE)
        .await
        .unwrap();
    let live_code = app.last_code();

    // Act
    app.clock.advance(Duration::minutes(5));
    let removed = app.auth().codes().sweep_expired().await.unwrap();

    // Assert
    assert_eq!(removed, 1);
    assert!(app
        .auth()
        .codes()
        .validate_code(&live.verification_id, &live_code)
        .await
        .unwrap());
}
