//! HTTP routes over the auth orchestrator and account service.

use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, put};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use hb_core::LoginOption;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::debug;

/// Cookie carrying the signed session token.
pub const SESSION_COOKIE: &str = "hb_session";

/// Path the provider redirects back to after authorization.
pub fn callback_path(provider: &str) -> String {
    format!("/oauthclbk-{}", provider)
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/api/login", get(login_options).post(login_with_payload))
        .route("/api/logout", get(logout))
        .route("/api/logged", get(logged))
        .route("/api/user/{user}", get(user_page))
        .route(
            "/api/user/{user}/profile/{name}",
            get(profile_page).put(create_profile).post(update_profile),
        )
        .route("/api/alias/{alias}", put(rename_alias));

    let providers: Vec<String> = state
        .orchestrator
        .providers()
        .iter()
        .map(|p| p.name().to_string())
        .collect();

    for provider in providers {
        let path = callback_path(&provider);
        debug!("Registering callback route {}", path);
        router = router.route(
            &path,
            get(
                move |State(state): State<AppState>,
                      jar: CookieJar,
                      Query(params): Query<CallbackParams>| async move {
                    provider_callback(state, jar, &provider, params).await
                },
            ),
        );
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

fn session_token(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE).map(|c| c.value().to_string())
}

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(state.config.secure_cookies)
        .same_site(SameSite::Lax)
        .build()
}

async fn login_options(State(state): State<AppState>) -> Result<Json<Vec<LoginOption>>, ApiError> {
    let options = state.orchestrator.start_login(json!({})).await?;
    Ok(Json(options))
}

async fn login_with_payload(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Vec<LoginOption>>, ApiError> {
    let payload = if body.iter().all(u8::is_ascii_whitespace) {
        json!({})
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid login payload: {}", e)))?
    };
    let options = state.orchestrator.start_login(payload).await?;
    Ok(Json(options))
}

async fn provider_callback(
    state: AppState,
    jar: CookieJar,
    provider: &str,
    params: CallbackParams,
) -> Result<(CookieJar, Redirect), ApiError> {
    let completion = state
        .orchestrator
        .handle_callback(provider, params.state.as_deref(), params.code.as_deref())
        .await?;

    let jar = jar.add(session_cookie(&state, completion.session_token));
    Ok((jar, Redirect::to(&state.config.post_login_redirect)))
}

async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, StatusCode) {
    state.orchestrator.logout(session_token(&jar).as_deref()).await;
    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        StatusCode::OK,
    )
}

async fn logged(State(state): State<AppState>, jar: CookieJar) -> Response {
    match state
        .orchestrator
        .query_logged_in(session_token(&jar).as_deref())
        .await
    {
        Some(logged) => Json(logged.to_json()).into_response(),
        None => StatusCode::OK.into_response(),
    }
}

async fn user_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(user): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let page = state.accounts.user_page(&user).await?;
    let logged = state
        .orchestrator
        .current_alias(session_token(&jar).as_deref())
        .await;

    Ok(Json(json!({
        "refUser": page.alias,
        "profiles": page.profiles,
        "logged": logged,
    })))
}

fn profile_body(user: &str, name: &str, page: Value, logged: Option<String>) -> Value {
    json!({
        "refUser": user,
        "profile": name,
        "page": page,
        "logged": logged,
    })
}

async fn profile_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Path((user, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let page = state.accounts.profile_page(&user, &name).await?;
    let logged = state
        .orchestrator
        .current_alias(session_token(&jar).as_deref())
        .await;
    Ok(Json(profile_body(&user, &name, page, logged)))
}

async fn create_profile(
    State(state): State<AppState>,
    jar: CookieJar,
    Path((user, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let session = session_token(&jar);
    let page = state
        .accounts
        .create_profile(session.as_deref(), &user, &name)
        .await?;
    let logged = state.orchestrator.current_alias(session.as_deref()).await;
    Ok(Json(profile_body(&user, &name, page, logged)))
}

async fn update_profile(
    State(state): State<AppState>,
    jar: CookieJar,
    Path((user, name)): Path<(String, String)>,
    Json(document): Json<Value>,
) -> Result<StatusCode, ApiError> {
    state
        .accounts
        .update_profile(session_token(&jar).as_deref(), &user, &name, document)
        .await?;
    Ok(StatusCode::OK)
}

async fn rename_alias(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(alias): Path<String>,
) -> Result<String, ApiError> {
    let change = state
        .accounts
        .rename_alias(session_token(&jar).as_deref(), &alias)
        .await?;
    Ok(change.applied.to_string())
}
