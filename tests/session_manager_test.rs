//! Tests for the session manager's authentication operations:
//! login (federated-first with password fallback), registration with role
//! normalization, interactive federated sign-in, logout, and profile refresh.

mod common;

use common::{auth_json, manager_with, user_json, StubIdentityProvider};
use counsel_session::session::storage::SessionStore;
use counsel_session::{ErrorCode, NewUser, Role, SessionError, SessionEvent, SessionStatus};
use mockito::Matcher;
use serde_json::json;

#[tokio::test]
async fn login_prefers_the_federated_path_and_persists_the_session() {
    let mut server = mockito::Server::new_async().await;
    let exchange = server
        .mock("POST", "/auth/google-login")
        .match_body(Matcher::PartialJson(json!({"idToken": "fed-token"})))
        .with_status(200)
        .with_body(auth_json("jwt-fed", "u-1", "Ada", "lawyer"))
        .create_async()
        .await;
    let password_login = server
        .mock("POST", "/auth/login")
        .expect(0)
        .create_async()
        .await;

    let provider = StubIdentityProvider::succeeding("fed-token");
    let (manager, store) = manager_with(&server, provider.clone());

    let user = manager.login("ada@example.com", "pw").await.unwrap();

    assert_eq!(user.id, "u-1");
    assert_eq!(manager.status().await, SessionStatus::Authenticated);
    // The store holds the token and a user whose id matches the returned one.
    assert_eq!(store.load_token().await.unwrap().unwrap(), "jwt-fed");
    assert_eq!(store.load_user().await.unwrap().unwrap().id, user.id);
    assert_eq!(provider.calls(), vec!["sign_in"]);

    exchange.assert_async().await;
    password_login.assert_async().await;
}

#[tokio::test]
async fn login_falls_back_to_password_when_the_provider_fails() {
    let mut server = mockito::Server::new_async().await;
    let exchange = server
        .mock("POST", "/auth/google-login")
        .expect(0)
        .create_async()
        .await;
    let password_login = server
        .mock("POST", "/auth/login")
        .match_body(Matcher::PartialJson(json!({"email": "ada@example.com"})))
        .with_status(200)
        .with_body(auth_json("jwt-pw", "u-1", "Ada", "lawyer"))
        .create_async()
        .await;

    let provider = StubIdentityProvider::failing("provider unreachable");
    let (manager, store) = manager_with(&server, provider.clone());

    let user = manager.login("ada@example.com", "pw").await.unwrap();

    assert_eq!(user.id, "u-1");
    assert_eq!(store.load_token().await.unwrap().unwrap(), "jwt-pw");
    assert_eq!(provider.calls(), vec!["sign_in"]);

    exchange.assert_async().await;
    password_login.assert_async().await;
}

#[tokio::test]
async fn login_falls_back_when_the_token_exchange_fails() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/auth/google-login")
        .with_status(500)
        .with_body(r#"{"message": "exchange broken"}"#)
        .create_async()
        .await;
    let password_login = server
        .mock("POST", "/auth/login")
        .with_status(200)
        .with_body(auth_json("jwt-pw", "u-1", "Ada", "client"))
        .create_async()
        .await;

    let provider = StubIdentityProvider::succeeding("fed-token");
    let (manager, _store) = manager_with(&server, provider);

    assert!(manager.login("ada@example.com", "pw").await.is_ok());
    password_login.assert_async().await;
}

#[tokio::test]
async fn login_surfaces_the_fallback_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/auth/login")
        .with_status(401)
        .with_body(r#"{"message": "Invalid email or password"}"#)
        .create_async()
        .await;

    let provider = StubIdentityProvider::failing("provider unreachable");
    let (manager, store) = manager_with(&server, provider);

    let err = manager.login("ada@example.com", "bad").await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::AuthenticationFailed);
    assert!(err.is_user_facing());
    match err {
        SessionError::Authentication { reason } => {
            assert_eq!(reason, "Invalid email or password")
        }
        other => panic!("expected Authentication, got {:?}", other),
    }
    assert!(store.load_token().await.unwrap().is_none());
}

#[tokio::test]
async fn register_coerces_unknown_roles_to_client() {
    let mut server = mockito::Server::new_async().await;
    // Echo-style stub: succeeds only if the payload already says "client".
    let register = server
        .mock("POST", "/auth/register")
        .match_body(Matcher::PartialJson(json!({
            "name": "A",
            "email": "a@x.com",
            "role": "client",
        })))
        .with_status(201)
        .with_body(auth_json("jwt-r", "u-9", "A", "client"))
        .create_async()
        .await;

    let provider = StubIdentityProvider::succeeding("fed-token");
    let (manager, store) = manager_with(&server, provider);

    let user = manager
        .register(NewUser {
            name: "A".into(),
            email: "a@x.com".into(),
            password: "p".into(),
            role: "admin".into(),
        })
        .await
        .unwrap();

    assert_eq!(user.role, Role::Client);
    assert_eq!(store.load_user().await.unwrap().unwrap().role, Role::Client);
    register.assert_async().await;
}

#[tokio::test]
async fn register_survives_provider_provisioning_failure() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/auth/register")
        .with_status(201)
        .with_body(auth_json("jwt-r", "u-9", "A", "client"))
        .create_async()
        .await;

    let provider = StubIdentityProvider::with_failing_sign_up("fed-token", "quota exhausted");
    let (manager, _store) = manager_with(&server, provider.clone());

    let user = manager
        .register(NewUser {
            name: "A".into(),
            email: "a@x.com".into(),
            password: "p".into(),
            role: "client".into(),
        })
        .await
        .unwrap();

    assert_eq!(user.id, "u-9");
    assert_eq!(provider.calls(), vec!["sign_up"]);
}

#[tokio::test]
async fn register_surfaces_backend_rejection() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/auth/register")
        .with_status(409)
        .with_body(r#"{"message": "Email already in use"}"#)
        .create_async()
        .await;

    let provider = StubIdentityProvider::succeeding("fed-token");
    let (manager, store) = manager_with(&server, provider);

    let err = manager
        .register(NewUser {
            name: "A".into(),
            email: "a@x.com".into(),
            password: "p".into(),
            role: "client".into(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::RegistrationFailed);
    match err {
        SessionError::Registration { reason } => assert_eq!(reason, "Email already in use"),
        other => panic!("expected Registration, got {:?}", other),
    }
    assert!(store.load_token().await.unwrap().is_none());
    assert_ne!(manager.status().await, SessionStatus::Authenticated);
}

#[tokio::test]
async fn google_login_publishes_the_prompt_and_authenticates() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/auth/google-login")
        .match_body(Matcher::PartialJson(json!({"idToken": "fed-token"})))
        .with_status(200)
        .with_body(auth_json("jwt-g", "u-5", "Grace", "client"))
        .create_async()
        .await;

    let provider = StubIdentityProvider::succeeding("fed-token");
    let (manager, store) = manager_with(&server, provider);

    let user = manager.login_with_google().await.unwrap();

    assert_eq!(user.id, "u-5");
    assert_eq!(store.load_token().await.unwrap().unwrap(), "jwt-g");

    let events = manager.subscribe().replay_buffer().await;
    assert!(events.iter().any(|event| matches!(
        event,
        SessionEvent::FederatedPromptReady { user_code, .. } if user_code == "WDJB-MJHT"
    )));
}

#[tokio::test]
async fn google_login_surfaces_exchange_rejection() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/auth/google-login")
        .with_status(401)
        .with_body(r#"{"message": "Google account not linked"}"#)
        .create_async()
        .await;

    let provider = StubIdentityProvider::succeeding("fed-token");
    let (manager, _store) = manager_with(&server, provider);

    let err = manager.login_with_google().await.unwrap_err();
    match err {
        SessionError::Authentication { reason } => {
            assert_eq!(reason, "Google account not linked")
        }
        other => panic!("expected Authentication, got {:?}", other),
    }
}

#[tokio::test]
async fn logout_clears_the_session_even_when_the_backend_fails() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/auth/google-login")
        .with_status(200)
        .with_body(auth_json("jwt-1", "u-1", "Ada", "lawyer"))
        .create_async()
        .await;
    server
        .mock("POST", "/auth/logout")
        .with_status(500)
        .create_async()
        .await;

    let provider = StubIdentityProvider::succeeding("fed-token");
    let (manager, store) = manager_with(&server, provider.clone());

    manager.login("ada@example.com", "pw").await.unwrap();
    manager.logout().await;

    assert!(store.load_token().await.unwrap().is_none());
    assert!(store.load_user().await.unwrap().is_none());
    assert_eq!(manager.status().await, SessionStatus::Unauthenticated);
    assert!(provider.calls().contains(&"sign_out"));
}

#[tokio::test]
async fn logout_without_a_session_still_resets_state() {
    let server = mockito::Server::new_async().await;
    let provider = StubIdentityProvider::succeeding("fed-token");
    let (manager, store) = manager_with(&server, provider);

    manager.logout().await;

    assert_eq!(manager.status().await, SessionStatus::Unauthenticated);
    assert!(store.load_token().await.unwrap().is_none());
}

#[tokio::test]
async fn refresh_user_overwrites_the_local_copy() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/auth/google-login")
        .with_status(200)
        .with_body(auth_json("jwt-1", "u-1", "Ada", "lawyer"))
        .create_async()
        .await;
    server
        .mock("GET", "/users/profile")
        .match_header("authorization", "Bearer jwt-1")
        .with_status(200)
        .with_body(json!({"data": user_json("u-1", "Ada Updated", "lawyer")}).to_string())
        .create_async()
        .await;

    let provider = StubIdentityProvider::succeeding("fed-token");
    let (manager, store) = manager_with(&server, provider);

    manager.login("ada@example.com", "pw").await.unwrap();
    manager.refresh_user().await;

    assert_eq!(manager.current_user().await.unwrap().name, "Ada Updated");
    assert_eq!(
        store.load_user().await.unwrap().unwrap().name,
        "Ada Updated"
    );

    let events = manager.subscribe().replay_buffer().await;
    assert!(events
        .iter()
        .any(|event| matches!(event, SessionEvent::ProfileRefreshed { .. })));
}

#[tokio::test]
async fn refresh_user_failure_leaves_the_session_untouched() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/auth/google-login")
        .with_status(200)
        .with_body(auth_json("jwt-1", "u-1", "Ada", "lawyer"))
        .create_async()
        .await;
    server
        .mock("GET", "/users/profile")
        .with_status(500)
        .create_async()
        .await;

    let provider = StubIdentityProvider::succeeding("fed-token");
    let (manager, store) = manager_with(&server, provider);

    manager.login("ada@example.com", "pw").await.unwrap();
    manager.refresh_user().await;

    // No partial overwrite: the persisted and in-memory user are unchanged.
    assert_eq!(manager.current_user().await.unwrap().name, "Ada");
    assert_eq!(store.load_user().await.unwrap().unwrap().name, "Ada");
    assert_eq!(manager.status().await, SessionStatus::Authenticated);
}

#[tokio::test]
async fn forgot_password_swallows_backend_failures() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/auth/forgot-password")
        .with_status(500)
        .create_async()
        .await;

    let provider = StubIdentityProvider::succeeding("fed-token");
    let (manager, _store) = manager_with(&server, provider);

    // Completes without error either way.
    manager.forgot_password("ada@example.com").await;
}
