mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

use route_pipeline::auth::{AuthError, AuthTokenService, TokenCodec};
use route_pipeline::config::AuthConfig;
use route_pipeline::logging::MemoryLog;

fn service(codec: TokenCodec) -> AuthTokenService {
    let mut config = AuthConfig::with_secret(common::SECRET);
    config.codec = codec;
    AuthTokenService::new(&config, Arc::new(MemoryLog::new())).expect("valid auth config")
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
        .block_on(future)
}

fn session_values() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[ -~]{0,24}".prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        proptest::collection::vec("[a-z]{0,6}".prop_map(Value::from), 0..4).prop_map(Value::Array),
    ]
}

fn session_data() -> impl Strategy<Value = Map<String, Value>> {
    proptest::collection::btree_map("[a-zA-Z_]{1,12}", session_values(), 0..8)
        .prop_map(|entries| entries.into_iter().collect())
}

fn codecs() -> impl Strategy<Value = TokenCodec> {
    prop_oneof![Just(TokenCodec::Signed), Just(TokenCodec::Encrypted)]
}

/// Replace the character at `at` with a different one
fn tamper(token: &str, at: usize) -> String {
    token
        .char_indices()
        .map(|(i, c)| match (i == at, c) {
            (true, 'A') => 'B',
            (true, _) => 'A',
            (false, c) => c,
        })
        .collect()
}

/// Sleep until just after the next whole second so `exp` lands a full second out
async fn sleep_past_second_boundary() {
    let into_second = u64::from(chrono::Utc::now().timestamp_subsec_millis().min(999));
    tokio::time::sleep(Duration::from_millis(1000 - into_second + 20)).await;
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn issued_tokens_verify_to_their_data(
        data in session_data(),
        max_age in 1u64..1_000_000,
        codec in codecs(),
    ) {
        let service = service(codec);
        let mut with_password = data.clone();
        with_password.insert("password".to_string(), json!("secret"));

        let token = service.issue(with_password, Some(max_age)).expect("issue");
        let decoded = block_on(service.verify(&token)).expect("verify");

        let mut expected = data;
        expected.remove("password");
        prop_assert_eq!(decoded, expected);
    }

    #[test]
    fn tampered_tokens_never_verify(
        data in session_data(),
        codec in codecs(),
        at in any::<proptest::sample::Index>(),
    ) {
        let service = service(codec);
        let token = service.issue(data, None).expect("issue");

        let tampered = tamper(&token, at.index(token.len()));
        prop_assert_ne!(&tampered, &token);
        prop_assert!(block_on(service.verify(&tampered)).is_err());
    }
}

#[tokio::test]
async fn short_lived_tokens_expire() -> Result<()> {
    for codec in [TokenCodec::Signed, TokenCodec::Encrypted] {
        let service = service(codec);
        sleep_past_second_boundary().await;
        let token = service.issue(json!({"user": "ada"}).as_object().cloned().unwrap_or_default(), Some(1))?;
        assert!(service.verify(&token).await.is_ok());

        // Past `exp` but inside the second after it
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(service.verify(&token).await, Err(AuthError::Expired));
    }
    Ok(())
}

#[tokio::test]
async fn tokens_from_another_secret_are_rejected() -> Result<()> {
    let mut config = AuthConfig::with_secret("some-other-secret");
    config.codec = TokenCodec::Signed;
    let foreign = AuthTokenService::new(&config, Arc::new(MemoryLog::new()))?;
    let token = foreign.issue(Map::new(), None)?;

    assert_eq!(
        service(TokenCodec::Signed).verify(&token).await,
        Err(AuthError::InvalidSignature)
    );
    Ok(())
}

#[tokio::test]
async fn login_then_read_session() -> Result<()> {
    let (app, _log) = common::app()?;
    let token = common::login(&app, "ada").await?;

    let (status, body) = common::send(&app, Method::GET, "/session", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "ada");
    assert!(body["session"].get("password").is_none(), "password leaked: {}", body);
    Ok(())
}

#[tokio::test]
async fn login_requires_a_username() -> Result<()> {
    let (app, _log) = common::app()?;

    let (status, body) = common::send(&app, Method::POST, "/session", None, Some(json!({}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "VALIDATION_ERROR");
    assert_eq!(body["message"], "username is required");
    Ok(())
}

#[tokio::test]
async fn tampered_tokens_are_unauthorized() -> Result<()> {
    let (app, log) = common::app()?;
    let token = common::login(&app, "ada").await?;

    let (status, body) = common::send(&app, Method::GET, "/session", Some(&tamper(&token, token.len() / 2)), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], true);
    assert_eq!(body["code"], 401);
    assert_eq!(body["type"], "AUTHENTICATION_ERROR");
    assert_eq!(log.errors().len(), 1);
    Ok(())
}

#[tokio::test]
async fn signed_tokens_are_refused_by_an_encrypting_service() -> Result<()> {
    let (app, _log) = common::app()?;
    let token = service(TokenCodec::Signed).issue(json!({"username": "ada"}).as_object().cloned().unwrap_or_default(), None)?;

    let (status, body) = common::send(&app, Method::GET, "/session", Some(&token), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["metaData"]["reason"], "decryption_failed");
    Ok(())
}

#[tokio::test]
async fn token_can_be_read_from_a_cookie() -> Result<()> {
    let config = common::config_with(&[("JWT_COOKIE", "sid"), ("JWT_CODEC", "signed")])?;
    let app = route_pipeline::handlers::app_with_log(&config, Arc::new(MemoryLog::new()))?;
    let token = common::login(&app, "ada").await?;

    let request = axum::http::Request::builder()
        .method(Method::GET)
        .uri("/session")
        .header(axum::http::header::COOKIE, format!("theme=dark; sid={}", token))
        .body(axum::body::Body::empty())?;
    let (status, body) = common::send_request(&app, request).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "ada");
    Ok(())
}
