use crate::server::store::SessionStore;
use crate::server::AppState;
use crate::session::Event;
use crate::session::ParsedUpload;
use crate::session::Session;
use crate::session::SessionError;
use crate::session::Snapshot;
use crate::session::UploadOutcome;
use crate::spreadsheet::UploadedFile;
use axum::extract::multipart::MultipartError;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::rejection::PathRejection;
use axum::extract::Multipart;
use axum::extract::Path;
use axum::extract::State;
use axum::http::header;
use axum::http::StatusCode;
use axum::response::Html;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use serde_json::json;
use serde_json::Value;
use std::sync::MutexGuard;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

const INDEX_HTML: &str = include_str!("index.html");

/// Errors surfaced to HTTP clients as `{"error": message}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Session '{0}' not found")]
    SessionNotFound(Uuid),

    #[error("{0}")]
    Session(#[from] SessionError),

    #[error("Invalid upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("{0}")]
    InvalidJson(#[from] JsonRejection),

    #[error("{0}")]
    InvalidPath(#[from] PathRejection),

    #[error("{0}")]
    InvalidMultipart(#[from] MultipartRejection),

    #[error("Session registry is unavailable")]
    Poisoned,

    #[error("Upload worker failed: {0}")]
    Worker(#[from] JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::SessionNotFound(_) | ApiError::Session(_) => StatusCode::NOT_FOUND,
            ApiError::Multipart(error) => error.status(),
            ApiError::InvalidJson(_) | ApiError::InvalidPath(_) | ApiError::InvalidMultipart(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Poisoned | ApiError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("request failed: {self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type Sessions<'a> = MutexGuard<'a, SessionStore>;
type PathParam<T> = Result<Path<T>, PathRejection>;

fn lock(state: &AppState) -> Result<Sessions<'_>, ApiError> {
    state.sessions.lock().map_err(|_| ApiError::Poisoned)
}

fn session<'a>(sessions: &'a mut Sessions<'_>, id: Uuid) -> Result<&'a mut Session, ApiError> {
    sessions.get_mut(id, Instant::now()).ok_or(ApiError::SessionNotFound(id))
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn create_session(State(state): State<AppState>) -> Result<(StatusCode, Json<Value>), ApiError> {
    let id = lock(&state)?.create(Session::new(state.config.preview_rows), Instant::now());
    info!(session = %id, "created session");
    Ok((StatusCode::CREATED, Json(json!({ "session_id": id }))))
}

pub async fn delete_session(State(state): State<AppState>, path: PathParam<Uuid>) -> Result<StatusCode, ApiError> {
    let Path(session_id) = path?;
    if !lock(&state)?.remove(session_id) {
        return Err(ApiError::SessionNotFound(session_id));
    }
    info!(session = %session_id, "closed session");
    Ok(StatusCode::NO_CONTENT)
}

/// Accepts one multipart part per file; each file is ingested independently.
/// Files are parsed on a blocking worker before the session registry is locked.
pub async fn upload_files(
    State(state): State<AppState>,
    path: PathParam<Uuid>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Vec<UploadOutcome>>, ApiError> {
    let Path(session_id) = path?;
    let mut multipart = multipart?;
    {
        let mut sessions = lock(&state)?;
        session(&mut sessions, session_id)?;
    }

    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let name = field
            .file_name()
            .or_else(|| field.name())
            .unwrap_or("upload")
            .to_owned();
        let bytes = field.bytes().await?;
        info!(session = %session_id, file = %name, size = bytes.len(), "received upload");
        files.push(UploadedFile::new(name, bytes.to_vec()));
    }
    let parsed = tokio::task::spawn_blocking(move || {
        files.into_iter().map(ParsedUpload::read).collect::<Vec<_>>()
    })
    .await?;

    let mut sessions = lock(&state)?;
    let session = session(&mut sessions, session_id)?;
    let outcomes = parsed.into_iter().map(|upload| session.accept(upload)).collect();
    Ok(Json(outcomes))
}

pub async fn list_files(
    State(state): State<AppState>,
    path: PathParam<Uuid>,
) -> Result<Json<Vec<Snapshot>>, ApiError> {
    let Path(session_id) = path?;
    let mut sessions = lock(&state)?;
    Ok(Json(session(&mut sessions, session_id)?.snapshots()))
}

pub async fn get_file(
    State(state): State<AppState>,
    path: PathParam<(Uuid, Uuid)>,
) -> Result<Json<Snapshot>, ApiError> {
    let Path((session_id, file_id)) = path?;
    let mut sessions = lock(&state)?;
    Ok(Json(session(&mut sessions, session_id)?.snapshot(file_id)?))
}

pub async fn apply_event(
    State(state): State<AppState>,
    path: PathParam<(Uuid, Uuid)>,
    event: Result<Json<Event>, JsonRejection>,
) -> Result<Json<Snapshot>, ApiError> {
    let Path((session_id, file_id)) = path?;
    let Json(event) = event?;
    let mut sessions = lock(&state)?;
    Ok(Json(session(&mut sessions, session_id)?.apply(file_id, event)?))
}

pub async fn delete_file(
    State(state): State<AppState>,
    path: PathParam<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let Path((session_id, file_id)) = path?;
    let mut sessions = lock(&state)?;
    session(&mut sessions, session_id)?.remove(file_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn download(
    State(state): State<AppState>,
    path: PathParam<(Uuid, Uuid)>,
) -> Result<Response, ApiError> {
    let Path((session_id, file_id)) = path?;
    let mut sessions = lock(&state)?;
    let artifact = session(&mut sessions, session_id)?.artifact(file_id)?;
    let headers = [
        (header::CONTENT_TYPE, artifact.media_type.to_owned()),
        (header::CONTENT_DISPOSITION, content_disposition(&artifact.file_name)),
    ];
    Ok((headers, artifact.bytes.to_vec()).into_response())
}

/// `attachment` disposition with an ASCII fallback name and the exact UTF-8 name.
fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' || c == ' ' { c } else { '_' })
        .collect();
    let encoded: String = file_name
        .bytes()
        .map(|byte| match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'-' | b'_' | b'~' => (byte as char).to_string(),
            _ => format!("%{byte:02X}"),
        })
        .collect();
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}
