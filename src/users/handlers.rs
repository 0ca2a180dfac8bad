use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    state::AppState,
    users::{
        dto::{DeletedResponse, NewUser, User, UserPatch, VerifyPassword, VerifyResponse},
        error::UserError,
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/:id/verify", post(verify_user_password))
}

fn bad_body(rejection: JsonRejection) -> UserError {
    warn!(error = %rejection.body_text(), "rejected request body");
    UserError::Validation(rejection.body_text())
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, UserError> {
    Ok(Json(state.users.list().await?))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> Result<Json<User>, UserError> {
    let Json(payload) = payload.map_err(bad_body)?;
    let user = state.users.create(payload).await?;
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, UserError> {
    let key = state.users.parse_key(&id)?;
    Ok(Json(state.users.get(&key).await?))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UserPatch>, JsonRejection>,
) -> Result<Json<User>, UserError> {
    let key = state.users.parse_key(&id)?;
    let Json(patch) = payload.map_err(bad_body)?;
    Ok(Json(state.users.update(&key, patch).await?))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, UserError> {
    let key = state.users.parse_key(&id)?;
    state.users.delete(&key).await?;
    Ok(Json(DeletedResponse {
        success: "User deleted",
    }))
}

#[instrument(skip(state, payload))]
pub async fn verify_user_password(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<VerifyPassword>, JsonRejection>,
) -> Result<Json<VerifyResponse>, UserError> {
    let key = state.users.parse_key(&id)?;
    let Json(body) = payload.map_err(bad_body)?;
    let valid = state.users.verify_password(&key, &body.password).await?;
    Ok(Json(VerifyResponse { valid }))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{app::build_app, state::AppState, users::keys::KeyScheme};

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn crud_over_http_with_email_keys() {
        let app = build_app(AppState::fake(KeyScheme::Email));

        let (status, body) = send(
            &app,
            "POST",
            "/users",
            Some(json!({"name": "Ada", "email": "ada@x.io", "password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "ada@x.io");
        assert!(body.get("password").is_none());
        assert!(!body.to_string().contains("secret1"));

        let (status, body) = send(&app, "GET", "/users/ada@x.io", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Ada");

        let (status, _) = send(
            &app,
            "PUT",
            "/users/ada@x.io",
            Some(json!({"password": "secret2"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "GET", "/users", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(1));

        let (status, body) = send(&app, "DELETE", "/users/ada@x.io", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], "User deleted");

        let (status, body) = send(&app, "GET", "/users/ada@x.io", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "User not found");
        assert!(body["details"].is_string());

        let (status, _) = send(&app, "DELETE", "/users/ada@x.io", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn surrogate_ids_in_paths() {
        let app = build_app(AppState::fake(KeyScheme::SurrogateId));

        let (status, body) = send(
            &app,
            "POST",
            "/users",
            Some(json!({"email": "grace@x.io", "password": "pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = body["id"].as_i64().expect("numeric id");

        let (status, body) = send(&app, "GET", &format!("/users/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "grace@x.io");

        let (status, body) = send(&app, "GET", "/users/grace@x.io", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Bad request");

        let (status, _) = send(&app, "PUT", "/users/404", Some(json!({"name": "x"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unassigned_numeric_ids_are_not_found() {
        let app = build_app(AppState::fake(KeyScheme::SurrogateId));
        for id in ["0", "-3"] {
            let (status, body) = send(&app, "GET", &format!("/users/{id}"), None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "GET /users/{id}");
            assert_eq!(body["error"], "User not found");

            let (status, _) = send(&app, "DELETE", &format!("/users/{id}"), None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "DELETE /users/{id}");
        }
    }

    #[tokio::test]
    async fn malformed_bodies_are_bad_requests() {
        let app = build_app(AppState::fake(KeyScheme::Email));

        let (status, body) = send(&app, "POST", "/users", Some(json!({"name": "no email"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Bad request");

        let (status, _) = send(
            &app,
            "POST",
            "/users",
            Some(json!({"email": "bad", "password": "pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn duplicate_create_is_conflict() {
        let app = build_app(AppState::fake(KeyScheme::Email));
        let payload = json!({"email": "ada@x.io", "password": "secret1"});
        let (status, _) = send(&app, "POST", "/users", Some(payload.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&app, "POST", "/users", Some(payload)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "User already exists");
    }

    #[tokio::test]
    async fn verify_checks_the_stored_digest() {
        let app = build_app(AppState::fake(KeyScheme::Email));
        send(
            &app,
            "POST",
            "/users",
            Some(json!({"email": "ada@x.io", "password": "secret1"})),
        )
        .await;

        let (status, body) = send(
            &app,
            "POST",
            "/users/ada@x.io/verify",
            Some(json!({"password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], true);

        let (_, body) = send(
            &app,
            "POST",
            "/users/ada@x.io/verify",
            Some(json!({"password": "nope"})),
        )
        .await;
        assert_eq!(body["valid"], false);

        let (status, _) = send(
            &app,
            "POST",
            "/users/ghost@x.io/verify",
            Some(json!({"password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = build_app(AppState::fake(KeyScheme::Email));
        let res = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
