use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::instrument;

use crate::{
    error::AppError,
    state::AppState,
    users::{
        dto::SignupResponse, extractors::SignupPayload, manager::UserManager,
        signup::ValidSignup,
    },
};

pub fn signup_routes() -> Router<AppState> {
    Router::new().route("/signup", post(signup))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    SignupPayload(payload): SignupPayload,
) -> Result<(StatusCode, Json<SignupResponse>), AppError> {
    let valid = ValidSignup::validate(payload, &state.password_policy)?;
    let manager = UserManager::from_ref(&state);
    let user = valid.create(&manager).await?;
    Ok((StatusCode::CREATED, Json(SignupResponse::from(user))))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header::CONTENT_TYPE, Method, Request},
    };
    use std::sync::Arc;

    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::AppConfig,
        users::{policy::PasswordPolicy, repo::MemoryUserStore},
    };

    fn app() -> Router {
        signup_routes().with_state(AppState::fake())
    }

    fn app_with_store() -> (Router, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::new());
        let config = AppConfig::in_memory();
        let policy = PasswordPolicy::from_config(&config.password_policy).unwrap();
        let state = AppState::from_parts(store.clone(), Arc::new(config), Arc::new(policy));
        (signup_routes().with_state(state), store)
    }

    async fn post_json(app: Router, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/signup")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn ada() -> Value {
        json!({
            "first_name": "Ada",
            "last_name": "Lovelace",
            "email": "ada@example.com",
            "password": "Str0ngP@ssw0rd!"
        })
    }

    #[tokio::test]
    async fn signup_returns_created_user_without_password() {
        let (status, body) = post_json(app(), ada()).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["id"].as_str().unwrap().parse::<uuid::Uuid>().is_ok());
        assert_eq!(body["email"], "ada@example.com");
        assert_eq!(body["first_name"], "Ada");
        assert_eq!(body["last_name"], "Lovelace");
        assert!(body.get("password").is_none());
        assert!(body.get("password_hash").is_none());
        assert!(!body.to_string().contains("Str0ngP@ssw0rd!"));
    }

    #[tokio::test]
    async fn short_password_is_a_field_error() {
        let mut req = ada();
        req["password"] = json!("Xq7!");
        let (status, body) = post_json(app(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
        assert_eq!(
            body["fields"]["password"][0],
            "This password is too short. It must contain at least 8 characters."
        );
    }

    #[tokio::test]
    async fn rejected_signups_persist_nothing() {
        let (app, store) = app_with_store();

        let mut weak = ada();
        weak["password"] = json!("Xq7!");
        let (status, _) = post_json(app.clone(), weak).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut bad_email = ada();
        bad_email["email"] = json!("ada.example.com");
        let (status, body) = post_json(app, bad_email).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["fields"]["email"][0], "Enter a valid email address.");

        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn null_character_is_a_validation_error() {
        let (app, store) = app_with_store();
        let mut req = ada();
        req["first_name"] = json!("A\0");
        let (status, body) = post_json(app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
        assert_eq!(body["fields"]["first_name"][0], "Null characters are not allowed.");
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let app = app();
        let (first, _) = post_json(app.clone(), ada()).await;
        assert_eq!(first, StatusCode::CREATED);

        let mut again = ada();
        again["email"] = json!("ada@EXAMPLE.com");
        let (status, body) = post_json(app, again).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "conflict");
    }

    #[tokio::test]
    async fn missing_fields_are_listed() {
        let (status, body) = post_json(app(), json!({ "email": "x@example.com" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        for field in ["first_name", "last_name", "password"] {
            assert_eq!(body["fields"][field][0], "This field is required.");
        }
        assert!(body["fields"].get("email").is_none());
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/signup")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let resp = app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "bad_request");
    }

    #[tokio::test]
    async fn form_body_is_accepted() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/signup")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(
                "first_name=Grace&last_name=Hopper&email=grace%40example.com&password=Str0ngP%40ssw0rd%21",
            ))
            .unwrap();
        let resp = app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["email"], "grace@example.com");
    }

    #[tokio::test]
    async fn only_create_is_exposed() {
        for method in [Method::GET, Method::PUT, Method::PATCH, Method::DELETE] {
            let req = Request::builder()
                .method(method.clone())
                .uri("/signup")
                .body(Body::empty())
                .unwrap();
            let resp = app().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED, "{method}");
        }
    }
}
