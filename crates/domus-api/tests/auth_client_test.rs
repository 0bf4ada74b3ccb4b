#![allow(clippy::unwrap_used)]
// Integration tests for `AuthClient` using wiremock.

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use domus_api::{AuthClient, AuthConfig, AuthUser, Error, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, AuthClient) {
    let server = MockServer::start().await;
    let base = Url::parse(&format!("{}/", server.uri())).unwrap();
    let config = AuthConfig::new(SecretString::from("test-key"))
        .unwrap()
        .with_base_url(&base);
    let client = AuthClient::new(config, &TransportConfig::default()).unwrap();
    (server, client)
}

fn password(p: &str) -> SecretString {
    SecretString::from(p)
}

// ── Sign-in ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_sign_in_success_publishes_user_and_token() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/accounts:signInWithPassword"))
        .and(query_param("key", "test-key"))
        .and(body_partial_json(json!({
            "email": "owner@example.com",
            "password": "hunter22",
            "returnSecureToken": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "idToken": "id-token-1",
            "email": "owner@example.com",
            "refreshToken": "refresh-1",
            "expiresIn": "3600",
            "localId": "uid-42"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut state = client.state();
    assert!(state.borrow().is_none());

    let user = client
        .sign_in("owner@example.com", &password("hunter22"))
        .await
        .unwrap();

    assert_eq!(
        user,
        AuthUser {
            uid: "uid-42".into(),
            email: "owner@example.com".into(),
        }
    );
    state.changed().await.unwrap();
    assert_eq!(state.borrow().as_ref(), Some(&user));
    assert_eq!(
        client.token().get().unwrap().expose_secret(),
        "id-token-1"
    );

    client.sign_out().await;
    assert!(client.current_user().is_none());
    assert!(!client.token().is_set());
}

#[tokio::test]
async fn test_sign_in_wrong_password() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/accounts:signInWithPassword"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "INVALID_LOGIN_CREDENTIALS" }
        })))
        .mount(&server)
        .await;

    let result = client.sign_in("owner@example.com", &password("nope")).await;
    match result {
        Err(Error::Authentication { message }) => {
            assert_eq!(message, "INVALID_LOGIN_CREDENTIALS");
        }
        other => panic!("expected Authentication error, got: {other:?}"),
    }
    assert!(client.current_user().is_none());
}

#[tokio::test]
async fn test_sign_in_malformed_response() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/accounts:signInWithPassword"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let result = client.sign_in("owner@example.com", &password("x")).await;
    assert!(matches!(result, Err(Error::Deserialization { .. })));
}
