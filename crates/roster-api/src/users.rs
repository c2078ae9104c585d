use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use roster_store::Store;
use roster_types::api::{
    ActivateQuery, RegisterRequest, RegisterResponse, StatusResponse, UserProfile,
};
use roster_users::UserService;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::ApiError;

pub const MSG_USER_CREATED: &str = "UserCreated";
pub const MSG_USER_ACTIVATED: &str = "MsgUserActivated";
pub const ERR_EMAIL_EMPTY: &str = "EmailIsEmpty";
pub const ERR_TOKEN_EMPTY: &str = "TokenIsEmpty";

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub users: UserService<Arc<dyn Store>>,
    pub user_table: String,
    /// Cancelled on shutdown; each request works under a child token.
    pub shutdown: CancellationToken,
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let cancel = state.shutdown.child_token();
    let user = state
        .users
        .create(&cancel, &state.user_table, &req)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            status: StatusCode::CREATED.as_u16(),
            message: MSG_USER_CREATED.into(),
            user: Some(user.into()),
        }),
    ))
}

/// Target of the activation link: `GET /users/activate?email=..&token=..`.
pub async fn activate(
    State(state): State<AppState>,
    Query(query): Query<ActivateQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let email = query
        .email
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, ERR_EMAIL_EMPTY))?
        .to_lowercase();
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, ERR_TOKEN_EMPTY))?;

    info!("Activating account: {}", email);

    let cancel = state.shutdown.child_token();
    state
        .users
        .activate(&cancel, &state.user_table, &email, &token)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(StatusResponse {
            status: StatusCode::CREATED.as_u16(),
            message: MSG_USER_ACTIVATED.into(),
        }),
    ))
}

/// Public view of a user. The activation token is never returned here.
pub async fn get_user(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    let cancel = state.shutdown.child_token();
    let user = state
        .users
        .load(&cancel, &state.user_table, &email)
        .await?;
    Ok(Json(user.into()))
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, Response};
    use roster_store::MemoryStore;
    use serde_json::Value;
    use tower::ServiceExt;

    fn state() -> AppState {
        Arc::new(AppStateInner {
            users: UserService::new(Arc::new(MemoryStore::new()) as Arc<dyn Store>),
            user_table: "User".into(),
            shutdown: CancellationToken::new(),
        })
    }

    /// The token as the mailbox owner would receive it.
    async fn mailed_token(state: &AppState, email: &str) -> String {
        state
            .users
            .load(&CancellationToken::new(), &state.user_table, email)
            .await
            .unwrap()
            .id
            .to_string()
    }

    async fn json(resp: Response<Body>) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn register_request(body: &str) -> Request<Body> {
        Request::post("/users")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn register_then_activate() {
        let state = state();
        let app = crate::router(state.clone());

        let resp = app
            .clone()
            .oneshot(register_request(
                r#"{"email":"Test@User.com","firstName":"Test","lastName":"User"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = json(resp).await;
        assert_eq!(body["message"], MSG_USER_CREATED);
        assert_eq!(body["user"]["email"], "test@user.com");
        assert_eq!(body["user"]["active"], false);
        assert!(body["user"].get("id").is_none());
        let token = mailed_token(&state, "test@user.com").await;

        let resp = app
            .clone()
            .oneshot(get(&format!("/users/activate?email=TEST%40user.com&token={token}")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(json(resp).await["message"], MSG_USER_ACTIVATED);

        let resp = app.oneshot(get("/users/test@user.com")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json(resp).await["active"], true);
    }

    #[tokio::test]
    async fn register_reports_validation_code() {
        let app = crate::router(state());
        let resp = app
            .oneshot(register_request(r#"{"email":"test@user.com","lastName":"User"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json(resp).await["message"], "FirstNameIsEmpty");
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let app = crate::router(state());
        let body = r#"{"email":"test@user.com","firstName":"Test","lastName":"User"}"#;

        let resp = app.clone().oneshot(register_request(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = app.oneshot(register_request(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(json(resp).await["message"], "DuplicateUser");
    }

    #[tokio::test]
    async fn activate_requires_email_and_token() {
        let app = crate::router(state());

        let resp = app.clone().oneshot(get("/users/activate?token=abc")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json(resp).await["message"], ERR_EMAIL_EMPTY);

        let resp = app
            .oneshot(get("/users/activate?email=test%40user.com"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json(resp).await["message"], ERR_TOKEN_EMPTY);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let app = crate::router(state());
        let resp = app.oneshot(get("/users/nobody@user.com")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(resp).await["message"], "UserNotFound");
    }

    #[tokio::test]
    async fn lookup_does_not_expose_the_token() {
        let state = state();
        let app = crate::router(state.clone());
        let resp = app
            .clone()
            .oneshot(register_request(
                r#"{"email":"victim@user.com","firstName":"Vic","lastName":"Tim"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let token = mailed_token(&state, "victim@user.com").await;

        let resp = app.oneshot(get("/users/victim@user.com")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json(resp).await;
        assert!(body.get("id").is_none());
        assert!(!body.to_string().contains(&token));
        assert_eq!(body["email"], "victim@user.com");
        assert_eq!(body["active"], false);
    }

    #[tokio::test]
    async fn malformed_body_gets_status_envelope() {
        let app = crate::router(state());

        for body in [r#"{"email":"#, r#"{"email":"a@b.co","role":"admin"}"#] {
            let resp = app.clone().oneshot(register_request(body)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
            let body = json(resp).await;
            assert_eq!(body["status"], 422);
            assert!(!body["message"].as_str().unwrap().is_empty());
        }
    }
}
