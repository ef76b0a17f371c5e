//! # HTTP Front End
//!
//! Serves the single-page UI and a JSON API over per-user [`Session`](crate::session::Session)s.
//!
//! | Method | Path | Action |
//! |---|---|---|
//! | `GET` | `/` | UI page |
//! | `POST` | `/api/sessions` | create a session |
//! | `DELETE` | `/api/sessions/:session` | close a session |
//! | `POST` | `/api/sessions/:session/files` | upload one or more files (multipart) |
//! | `GET` | `/api/sessions/:session/files` | snapshots of every file |
//! | `GET`/`DELETE` | `/api/sessions/:session/files/:file` | one file |
//! | `POST` | `/api/sessions/:session/files/:file/events` | apply an [`Event`](crate::session::Event) |
//! | `GET` | `/api/sessions/:session/files/:file/download` | converted file |
//!
//! Sessions idle for longer than [`Config::session_ttl`] are dropped, and at most
//! [`Config::max_sessions`] are kept. Malformed requests get a 400 with a JSON body.
mod handlers;
pub mod store;

use crate::config::Config;
use crate::error::SweeperError;
use crate::server::store::SessionStore;
use axum::extract::DefaultBodyLimit;
use axum::routing::delete;
use axum::routing::get;
use axum::routing::post;
use axum::Router;
use std::sync::Arc;
use std::sync::Mutex;
use tokio::net::TcpListener;
use tracing::info;

pub use handlers::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<Mutex<SessionStore>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let sessions = SessionStore::new(config.session_ttl, config.max_sessions);
        AppState {
            config: Arc::new(config),
            sessions: Arc::new(Mutex::new(sessions)),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/api/sessions", post(handlers::create_session))
        .route("/api/sessions/:session", delete(handlers::delete_session))
        .route(
            "/api/sessions/:session/files",
            post(handlers::upload_files).get(handlers::list_files),
        )
        .route(
            "/api/sessions/:session/files/:file",
            get(handlers::get_file).delete(handlers::delete_file),
        )
        .route("/api/sessions/:session/files/:file/events", post(handlers::apply_event))
        .route("/api/sessions/:session/files/:file/download", get(handlers::download))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Binds the configured address and serves until Ctrl-C.
pub async fn serve(config: Config) -> Result<(), SweeperError> {
    let address = config.address();
    let app = build_router(AppState::new(config));
    let listener = TcpListener::bind(&address).await?;
    info!("Data Sweeper listening on http://{address}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::body::Body;
    use axum::http::header;
    use axum::http::Request;
    use axum::http::StatusCode;
    use axum::response::Response;
    use serde_json::json;
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    const BOUNDARY: &str = "sweeper-boundary";

    fn app() -> Router {
        build_router(AppState::new(Config::default()))
    }

    fn multipart(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    async fn create_session(app: &Router) -> String {
        let response = send(app, Request::post("/api/sessions").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await["session_id"].as_str().unwrap().to_owned()
    }

    async fn upload(app: &Router, session: &str, files: &[(&str, &[u8])]) -> Value {
        let request = Request::post(format!("/api/sessions/{session}/files"))
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(multipart(files)))
            .unwrap();
        let response = send(app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        json_body(response).await
    }

    async fn event(app: &Router, session: &str, file: &str, event: Value) -> Value {
        let request = Request::post(format!("/api/sessions/{session}/files/{file}/events"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(event.to_string()))
            .unwrap();
        let response = send(app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        json_body(response).await
    }

    #[tokio::test]
    async fn health_and_index() {
        let app = app();
        let response = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(json_body(response).await, json!({ "status": "ok" }));

        let response = send(&app, Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("Data Sweeper"));
    }

    #[tokio::test]
    async fn upload_clean_convert_and_download() {
        let app = app();
        let session = create_session(&app).await;
        let outcomes = upload(
            &app,
            &session,
            &[("sales.csv", b"a,b,c\n1,2,\n1,2,4\n1,2,4\n"), ("notes.txt", b"hello")],
        )
        .await;
        assert_eq!(outcomes[0]["status"], "accepted");
        assert_eq!(outcomes[1]["status"], "rejected");
        assert_eq!(outcomes[1]["error"], "notes.txt: Unsupported file type: .txt");

        let file = outcomes[0]["snapshot"]["id"].as_str().unwrap().to_owned();
        event(&app, &session, &file, json!({ "type": "set_cleaning", "enabled": true })).await;
        let snapshot = event(&app, &session, &file, json!({ "type": "remove_duplicates" })).await;
        assert_eq!(snapshot["rows"], 2);
        let snapshot = event(&app, &session, &file, json!({ "type": "fill_missing" })).await;
        assert_eq!(snapshot["preview"][0][2], 4.0);
        event(&app, &session, &file, json!({ "type": "select_columns", "columns": ["c", "a"] })).await;
        let snapshot = event(&app, &session, &file, json!({ "type": "convert" })).await;
        assert_eq!(snapshot["artifact"]["file_name"], "sales.csv");

        let request = Request::get(format!("/api/sessions/{session}/files/{file}/download"))
            .body(Body::empty())
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
        assert!(response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("attachment; filename=\"sales.csv\""));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"c,a\n4.0,1\n4.0,1\n");
    }

    #[tokio::test]
    async fn unknown_sessions_and_files_are_not_found() {
        let app = app();
        let missing = Uuid::new_v4();
        let response = send(
            &app,
            Request::get(format!("/api/sessions/{missing}/files")).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], format!("Session '{missing}' not found"));

        let session = create_session(&app).await;
        let request = Request::delete(format!("/api/sessions/{session}/files/{missing}"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, request).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn download_requires_a_conversion() {
        let app = app();
        let session = create_session(&app).await;
        let outcomes = upload(&app, &session, &[("data.csv", b"x,y\n1,2\n")]).await;
        let file = outcomes[0]["snapshot"]["id"].as_str().unwrap();

        let request = Request::get(format!("/api/sessions/{session}/files/{file}/download"))
            .body(Body::empty())
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "No converted file is ready for 'data.csv'");

        let request = Request::delete(format!("/api/sessions/{session}/files/{file}"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, request).await.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn malformed_requests_get_json_errors() {
        let app = app();
        let session = create_session(&app).await;
        let outcomes = upload(&app, &session, &[("data.csv", b"x,y\n1,2\n")]).await;
        let file = outcomes[0]["snapshot"]["id"].as_str().unwrap().to_owned();
        let uri = format!("/api/sessions/{session}/files/{file}/events");

        for body in [r#"{"type":"bogus"}"#, "not json"] {
            let request = Request::post(&uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap();
            let response = send(&app, request).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert!(json_body(response).await["error"].is_string());
        }

        let request = Request::post(&uri).body(Body::from("{}")).unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());

        let response = send(
            &app,
            Request::get("/api/sessions/not-a-uuid/files").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());

        let request = Request::post(format!("/api/sessions/{session}/files"))
            .body(Body::from("plain"))
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn closed_sessions_are_freed() {
        let app = app();
        let session = create_session(&app).await;
        let request = Request::delete(format!("/api/sessions/{session}")).body(Body::empty()).unwrap();
        assert_eq!(send(&app, request).await.status(), StatusCode::NO_CONTENT);

        let request = Request::get(format!("/api/sessions/{session}/files")).body(Body::empty()).unwrap();
        assert_eq!(send(&app, request).await.status(), StatusCode::NOT_FOUND);
        let request = Request::delete(format!("/api/sessions/{session}")).body(Body::empty()).unwrap();
        assert_eq!(send(&app, request).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn session_limit_evicts_the_oldest() {
        let config = Config {
            max_sessions: 1,
            ..Config::default()
        };
        let app = build_router(AppState::new(config));
        let first = create_session(&app).await;
        let second = create_session(&app).await;

        let request = Request::get(format!("/api/sessions/{first}/files")).body(Body::empty()).unwrap();
        assert_eq!(send(&app, request).await.status(), StatusCode::NOT_FOUND);
        let request = Request::get(format!("/api/sessions/{second}/files")).body(Body::empty()).unwrap();
        assert_eq!(send(&app, request).await.status(), StatusCode::OK);
    }
}
