pub mod application;
pub mod domain;
pub mod infrastructure;

use application::commands::{
    AppState, AuthenticationResponse, complete_authentication_impl, ensure_authenticated_impl,
    logout_impl, run_workflow_impl,
};
use axum::extract::{Form, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use domain::models::WorkflowState;
use infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

const WORKSPACE_ENV: &str = "DAYBOOK_WORKSPACE";

const INDEX_HTML: &str = r#"<!doctype html>
<html>
  <head><meta charset="utf-8"><title>Daybook</title></head>
  <body>
    <h1>Plan today</h1>
    <form method="post" action="/">
      <textarea name="text_input" rows="6" cols="60" placeholder="What should today look like?"></textarea>
      <br>
      <button type="submit">Generate schedule</button>
    </form>
    <p><a href="/auth">Check Google sign-in</a></p>
  </body>
</html>
"#;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

struct CommandError {
    status: StatusCode,
    message: String,
}

impl CommandError {
    fn new(state: &AppState, command: &str, error: InfraError) -> Self {
        let status = match &error {
            InfraError::OAuth(_) => StatusCode::BAD_REQUEST,
            InfraError::Authentication(_) => StatusCode::UNAUTHORIZED,
            InfraError::Api(_) | InfraError::Generation(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: state.command_error(command, &error),
        }
    }
}

impl IntoResponse for CommandError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
struct WorkflowForm {
    #[serde(default)]
    text_input: String,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn run_workflow(
    State(state): State<Arc<AppState>>,
    Form(form): Form<WorkflowForm>,
) -> Json<WorkflowState> {
    Json(run_workflow_impl(&state, &form.text_input).await)
}

async fn ensure_authenticated(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AuthenticationResponse>, CommandError> {
    ensure_authenticated_impl(&state)
        .await
        .map(Json)
        .map_err(|error| CommandError::new(&state, "ensure_authenticated", error))
}

async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<AuthenticationResponse>, CommandError> {
    if let Some(denied) = query.error {
        return Err(CommandError::new(
            &state,
            "complete_authentication",
            InfraError::OAuth(format!("authorization was not granted: {denied}")),
        ));
    }
    let code = query.code.unwrap_or_default();
    let returned_state = query.state.unwrap_or_default();
    complete_authentication_impl(&state, &code, &returned_state)
        .await
        .map(Json)
        .map_err(|error| CommandError::new(&state, "complete_authentication", error))
}

async fn logout(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AuthenticationResponse>, CommandError> {
    logout_impl(&state)
        .map(Json)
        .map_err(|error| CommandError::new(&state, "logout", error))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index).post(run_workflow))
        .route("/auth", get(ensure_authenticated))
        .route("/oauth2/callback", get(oauth_callback))
        .route("/auth/logout", post(logout))
        .with_state(state)
}

pub fn workspace_root() -> Result<PathBuf, InfraError> {
    match std::env::var(WORKSPACE_ENV) {
        Ok(value) if !value.trim().is_empty() => Ok(PathBuf::from(value.trim())),
        _ => Ok(std::env::current_dir()?),
    }
}

pub async fn run() -> Result<(), InfraError> {
    let app_state = Arc::new(AppState::new(workspace_root()?)?);
    let listen_address = app_state.settings().listen_address.clone();
    app_state.log_info("server", &format!("listening on http://{listen_address}"));

    let listener = tokio::net::TcpListener::bind(&listen_address).await?;
    println!("daybook-agent listening on http://{listen_address}");
    axum::serve(listener, router(app_state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use std::fs;
    use tower::ServiceExt;

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new(name: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "daybook-router-tests-{}-{name}",
                std::process::id()
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        fn router(&self) -> Router {
            let state = AppState::new(self.path.clone())
                .expect("initialize app state")
                .with_env_lookup(Arc::new(|key: &str| match key {
                    "DAYBOOK_GOOGLE_CLIENT_ID" => Some("client-id".to_string()),
                    "DAYBOOK_GOOGLE_CLIENT_SECRET" => Some("client-secret".to_string()),
                    _ => None,
                }));
            router(Arc::new(state))
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn index_serves_the_form() {
        let workspace = TempWorkspace::new("index");
        let response = workspace
            .router()
            .oneshot(Request::get("/").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        assert!(String::from_utf8_lossy(&bytes).contains("name=\"text_input\""));
    }

    #[tokio::test]
    async fn posting_the_form_returns_workflow_state() {
        let workspace = TempWorkspace::new("post");
        let response = workspace
            .router()
            .oneshot(
                Request::post("/")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("text_input=plan+my+day"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let state = body_json(response).await;
        assert_eq!(state["step_fetch"], false);
        assert_eq!(state["messages"][0]["level"], "error");
    }

    #[tokio::test]
    async fn callback_with_forged_state_is_a_bad_request() {
        let workspace = TempWorkspace::new("callback");
        let response = workspace
            .router()
            .oneshot(
                Request::get("/oauth2/callback?code=abc&state=forged")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().expect("error text").contains("pending sign-in"));
    }

    #[tokio::test]
    async fn auth_status_without_credential_offers_authorization_url() {
        let workspace = TempWorkspace::new("auth");
        let response = workspace
            .router()
            .oneshot(Request::get("/auth").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "authorization_required");
        assert!(body["authorization_url"].as_str().is_some());
    }
}
