//! HTTP-level tests of the login handshake, session cookie and guarded routes.

use axum::http::StatusCode;
use axum_extra::extract::cookie::Cookie;
use axum_test::TestServer;
use hb_server::{AppState, SESSION_COOKIE, ServerConfig, router};
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestApp {
    server: TestServer,
    provider: MockServer,
    _data_root: TempDir,
}

async fn test_app() -> TestApp {
    let provider = MockServer::start().await;
    let data_root = TempDir::new().unwrap();

    let oauth_dir = data_root.path().join("oauth");
    std::fs::create_dir_all(&oauth_dir).unwrap();
    let descriptor = json!({
        "type": "github",
        "shortName": "github",
        "displayName": "GitHub",
        "redirectURI": "http://localhost:8080/oauthclbk-github",
        "config": {
            "clientId": "client",
            "clientSecret": "secret",
            "authorizationEndpoint": format!("{}/login/oauth/authorize", provider.uri()),
            "tokenEndpoint": format!("{}/login/oauth/access_token", provider.uri()),
            "userinfoEndpoint": format!("{}/user", provider.uri())
        }
    });
    std::fs::write(
        oauth_dir.join("github.json"),
        serde_json::to_vec(&descriptor).unwrap(),
    )
    .unwrap();

    let config = ServerConfig {
        data_root: data_root.path().to_path_buf(),
        session_secret: "test-secret".to_string(),
        ..ServerConfig::default()
    };
    let state = AppState::build(&config).await.unwrap();

    TestApp {
        server: TestServer::new(router(state)).unwrap(),
        provider,
        _data_root: data_root,
    }
}

async fn mount_github_user(provider: &MockServer, code: &str, user_id: u64) {
    let access_token = format!("gho_{}", code);

    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .and(body_string_contains(format!("code={}", code)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": access_token,
            "token_type": "bearer"
        })))
        .mount(provider)
        .await;

    Mock::given(method("GET"))
        .and(path("/user"))
        .and(wiremock::matchers::header(
            "Authorization",
            format!("Bearer {}", access_token).as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": user_id })))
        .mount(provider)
        .await;
}

fn state_of(url: &str) -> String {
    url.split("state=")
        .nth(1)
        .and_then(|rest| rest.split('&').next())
        .unwrap()
        .to_string()
}

/// Runs a full login and returns the session cookie.
async fn login(app: &TestApp, payload: Value, code: &str, user_id: u64) -> Cookie<'static> {
    mount_github_user(&app.provider, code, user_id).await;

    let options: Vec<Value> = app.server.post("/api/login").json(&payload).await.json();
    let state = state_of(options[0]["url"].as_str().unwrap());

    let response = app
        .server
        .get("/oauthclbk-github")
        .add_query_param("state", &state)
        .add_query_param("code", code)
        .await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "/reroute.html");

    response.cookie(SESSION_COOKIE)
}

#[tokio::test]
async fn test_login_page_lists_configured_providers() {
    let app = test_app().await;

    let response = app.server.get("/api/login").await;
    response.assert_status_ok();

    let options: Vec<Value> = response.json();
    assert_eq!(options.len(), 1);
    assert_eq!(options[0]["label"], "Login with GitHub");
    let url = options[0]["url"].as_str().unwrap();
    assert!(url.starts_with(&format!("{}/login/oauth/authorize?", app.provider.uri())));
    assert!(url.contains("state="));
}

#[tokio::test]
async fn test_invalid_login_payload_is_rejected() {
    let app = test_app().await;

    app.server
        .post("/api/login")
        .text("{not json")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_handshake_sets_cookie_and_delivers_payload_once() {
    let app = test_app().await;
    let cookie = login(&app, json!({ "page": "home" }), "abc", 1001).await;
    assert!(cookie.http_only().unwrap_or(false));

    let first: Value = app
        .server
        .get("/api/logged")
        .add_cookie(cookie.clone())
        .await
        .json();
    assert_eq!(first, json!({ "page": "home", "logged": "@user1" }));

    let second: Value = app
        .server
        .get("/api/logged")
        .add_cookie(cookie)
        .await
        .json();
    assert_eq!(second, json!({ "logged": "@user1" }));
}

#[tokio::test]
async fn test_logged_without_session_is_empty() {
    let app = test_app().await;

    let response = app.server.get("/api/logged").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "");
}

#[tokio::test]
async fn test_callback_with_unknown_state_is_forbidden() {
    let app = test_app().await;

    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&app.provider)
        .await;

    app.server
        .get("/oauthclbk-github")
        .add_query_param("state", "forged")
        .add_query_param("code", "abc")
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_callback_with_rejected_code_is_forbidden() {
    let app = test_app().await;

    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad_verification_code"))
        .mount(&app.provider)
        .await;

    let options: Vec<Value> = app.server.get("/api/login").await.json();
    let state = state_of(options[0]["url"].as_str().unwrap());

    app.server
        .get("/oauthclbk-github")
        .add_query_param("state", &state)
        .add_query_param("code", "stale")
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_profile_lifecycle() {
    let app = test_app().await;
    let cookie = login(&app, json!({}), "abc", 1001).await;

    app.server
        .put("/api/user/@user1/profile/home")
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let created: Value = app
        .server
        .put("/api/user/@user1/profile/home")
        .add_cookie(cookie.clone())
        .await
        .json();
    assert_eq!(created["page"], json!({ "blocks": [] }));
    assert_eq!(created["logged"], "@user1");

    app.server
        .put("/api/user/@user1/profile/home")
        .add_cookie(cookie.clone())
        .await
        .assert_status(StatusCode::CONFLICT);

    let document = json!({ "blocks": [{ "type": "links", "title": "News" }] });
    app.server
        .post("/api/user/@user1/profile/home")
        .add_cookie(cookie)
        .json(&document)
        .await
        .assert_status_ok();

    let page: Value = app.server.get("/api/user/@user1/profile/home").await.json();
    assert_eq!(page["page"], document);
    assert_eq!(page["refUser"], "@user1");
    assert_eq!(page["logged"], Value::Null);

    let user: Value = app.server.get("/api/user/@user1").await.json();
    assert_eq!(user["profiles"], json!(["home"]));
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let app = test_app().await;

    app.server
        .get("/api/user/nobody")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_alias_change_follows_session() {
    let app = test_app().await;
    let alice = login(&app, json!({}), "alice", 1001).await;
    let bob = login(&app, json!({}), "bob", 2002).await;

    let applied = app
        .server
        .put("/api/alias/alice")
        .add_cookie(alice.clone())
        .await
        .text();
    assert_eq!(applied, "true");

    let taken = app
        .server
        .put("/api/alias/alice")
        .add_cookie(bob.clone())
        .await
        .text();
    assert_eq!(taken, "false");

    let reserved = app
        .server
        .put("/api/alias/@user9")
        .add_cookie(bob)
        .await
        .text();
    assert_eq!(reserved, "false");

    let user: Value = app
        .server
        .get("/api/user/alice")
        .add_cookie(alice)
        .await
        .json();
    assert_eq!(user["refUser"], "alice");
    assert_eq!(user["logged"], "alice");

    app.server
        .get("/api/user/@user1")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_alias_change_requires_session() {
    let app = test_app().await;

    app.server
        .put("/api/alias/alice")
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_logout_ends_session() {
    let app = test_app().await;
    let cookie = login(&app, json!({}), "abc", 1001).await;

    app.server
        .get("/api/logout")
        .add_cookie(cookie.clone())
        .await
        .assert_status_ok();

    let response = app.server.get("/api/logged").add_cookie(cookie).await;
    assert_eq!(response.text(), "");
}
