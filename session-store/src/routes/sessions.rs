//! Session record endpoints.
//!
//! Blobs are raw `application/octet-stream` bodies; `lastCheck` and
//! `authenticated` travel in the `x-last-check` / `x-authenticated` headers.

use crate::error::AppError;
use crate::models::session_record::{self, normalize_timestamp, RecordFields, SessionSummary};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

pub const HEADER_MANAGER_ID: &str = "x-manager-id";
pub const HEADER_LAST_CHECK: &str = "x-last-check";
pub const HEADER_AUTHENTICATED: &str = "x-authenticated";

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/sessions", get(list_sessions))
        .route(
            "/api/sessions/{manager_id}",
            get(get_session)
                .post(put_session)
                .patch(update_session)
                .delete(delete_session),
        )
}

fn validate_id(manager_id: &str) -> Result<(), AppError> {
    let valid = !manager_id.is_empty()
        && manager_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest(
            "Invalid managerId. Only alphanumeric characters, underscores and hyphens are allowed.".into(),
        ))
    }
}

fn read_body(body: Result<Bytes, BytesRejection>) -> Result<Bytes, AppError> {
    body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge("Session exceeds the configured size limit".into())
        } else {
            AppError::BadRequest(rejection.body_text())
        }
    })
}

fn last_check_header(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    let Some(value) = headers.get(HEADER_LAST_CHECK) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| Some(normalize_timestamp(&dt.with_timezone(&Utc))))
        .ok_or_else(|| AppError::BadRequest(format!("{} must be an RFC 3339 timestamp", HEADER_LAST_CHECK)))
}

fn authenticated_header(headers: &HeaderMap) -> Result<Option<bool>, AppError> {
    match headers.get(HEADER_AUTHENTICATED).map(|v| v.to_str()) {
        None => Ok(None),
        Some(Ok("true")) => Ok(Some(true)),
        Some(Ok("false")) => Ok(Some(false)),
        Some(_) => Err(AppError::BadRequest(format!("{} must be true or false", HEADER_AUTHENTICATED))),
    }
}

async fn list_sessions(State(state): State<Arc<AppState>>) -> Result<Json<Vec<SessionSummary>>, AppError> {
    let db = state.db.clone();
    let sessions = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        session_record::find_all(&conn)
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??;
    Ok(Json(sessions))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(manager_id): Path<String>,
) -> Result<Response, AppError> {
    validate_id(&manager_id)?;

    let db = state.db.clone();
    let id = manager_id.clone();
    let record = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        session_record::find_by_id(&conn, &id)
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??
    .ok_or_else(|| AppError::NotFound(format!("No session for {}", manager_id)))?;

    let metadata = [
        (HEADER_MANAGER_ID, record.manager_id),
        (HEADER_LAST_CHECK, record.last_check),
        (HEADER_AUTHENTICATED, record.authenticated.to_string()),
    ];
    Ok((
        [(CONTENT_TYPE, "application/octet-stream")],
        metadata,
        record.session,
    )
        .into_response())
}

async fn put_session(
    State(state): State<Arc<AppState>>,
    Path(manager_id): Path<String>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<SessionSummary>), AppError> {
    validate_id(&manager_id)?;
    let session = read_body(body)?;
    if session.is_empty() {
        return Err(AppError::BadRequest("Session body is required".into()));
    }
    let last_check = last_check_header(&headers)?.unwrap_or_else(session_record::now);
    let authenticated = authenticated_header(&headers)?.unwrap_or(true);

    let db = state.db.clone();
    let id = manager_id.clone();
    let (created, summary) = tokio::task::spawn_blocking(move || {
        let mut conn = db.get()?;
        let created = session_record::upsert(&mut conn, &id, &session, &last_check, authenticated)?;
        let summary = session_record::find_summary(&conn, &id)?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve stored session"))?;
        anyhow::Ok((created, summary))
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??;

    tracing::info!(manager_id = %manager_id, bytes = summary.size, created, "Session stored");
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(summary)))
}

async fn update_session(
    State(state): State<Arc<AppState>>,
    Path(manager_id): Path<String>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<SessionSummary>, AppError> {
    validate_id(&manager_id)?;
    let session = read_body(body)?;
    let fields = RecordFields {
        session: (!session.is_empty()).then(|| session.to_vec()),
        last_check: last_check_header(&headers)?,
        authenticated: authenticated_header(&headers)?,
    };

    let db = state.db.clone();
    let id = manager_id.clone();
    let summary = tokio::task::spawn_blocking(move || {
        let mut conn = db.get()?;
        if !session_record::update_fields(&mut conn, &id, &fields)? {
            return anyhow::Ok(None);
        }
        session_record::find_summary(&conn, &id)
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??
    .ok_or_else(|| AppError::NotFound(format!("No session for {}", manager_id)))?;

    tracing::debug!(manager_id = %manager_id, bytes = summary.size, "Session updated");
    Ok(Json(summary))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(manager_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    validate_id(&manager_id)?;

    let db = state.db.clone();
    let id = manager_id.clone();
    let deleted = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        session_record::delete(&conn, &id)
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??;

    tracing::info!(manager_id = %manager_id, deleted, "Session deleted");
    Ok(Json(json!({ "deleted": deleted })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::connection::create_pool;
    use crate::db::migrate::migrate;
    use crate::routes::create_router;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app(configure: impl FnOnce(&mut AppConfig)) -> (TempDir, Router) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = AppConfig::for_tests(temp_dir.path());
        configure(&mut config);
        let pool = create_pool(config.db_path.to_str().unwrap()).unwrap();
        migrate(&pool).unwrap();
        let router = create_router(Arc::new(AppState::new(pool, config)));
        (temp_dir, router)
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    async fn body_bytes(response: Response) -> Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    fn post(id: &str, blob: &'static [u8]) -> Request<Body> {
        Request::post(format!("/api/sessions/{}", id))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(Body::from(blob))
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (_dir, app) = app(|_| {});

        let response = send(&app, post("alice", b"zip-bytes")).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let summary = body_json(response).await;
        assert_eq!(summary["managerId"], "alice");
        assert_eq!(summary["size"], 9);

        let response = send(&app, post("alice", b"newer-zip")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, Request::get("/api/sessions/alice").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[HEADER_MANAGER_ID], "alice");
        assert_eq!(response.headers()[HEADER_AUTHENTICATED], "true");
        assert!(response.headers().contains_key(HEADER_LAST_CHECK));
        assert_eq!(&body_bytes(response).await[..], b"newer-zip");
    }

    #[tokio::test]
    async fn test_get_missing_is_404() {
        let (_dir, app) = app(|_| {});
        let response = send(&app, Request::get("/api/sessions/ghost").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_patch_without_body_keeps_blob() {
        let (_dir, app) = app(|_| {});
        send(&app, post("alice", b"blob")).await;

        let later = (Utc::now() + chrono::Duration::seconds(5)).to_rfc3339();
        let request = Request::patch("/api/sessions/alice")
            .header(HEADER_LAST_CHECK, later)
            .header(HEADER_AUTHENTICATED, "false")
            .body(Body::empty())
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let summary = body_json(response).await;
        assert_eq!(summary["size"], 4);
        assert_eq!(summary["authenticated"], false);
    }

    #[tokio::test]
    async fn test_patch_missing_is_404() {
        let (_dir, app) = app(|_| {});
        let request = Request::patch("/api/sessions/ghost").body(Body::from("blob")).unwrap();
        assert_eq!(send(&app, request).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let (_dir, app) = app(|_| {});
        send(&app, post("alice", b"blob")).await;

        let delete = || Request::delete("/api/sessions/alice").body(Body::empty()).unwrap();
        assert_eq!(body_json(send(&app, delete()).await).await["deleted"], 1);
        assert_eq!(body_json(send(&app, delete()).await).await["deleted"], 0);
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let (_dir, app) = app(|_| {});

        let response = send(&app, post("bad.id", b"blob")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&app, post("alice", b"")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = Request::post("/api/sessions/alice")
            .header(HEADER_LAST_CHECK, "yesterday")
            .body(Body::from("blob"))
            .unwrap();
        assert_eq!(send(&app, request).await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_body_limit() {
        let (_dir, app) = app(|config| config.max_session_bytes = 16);
        let response = send(&app, post("alice", &[7u8; 64])).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_bearer_token() {
        let (_dir, app) = app(|config| config.store_token = Some("secret".into()));

        let response = send(&app, post("alice", b"blob")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = Request::post("/api/sessions/alice")
            .header("authorization", "Bearer secret")
            .body(Body::from("blob"))
            .unwrap();
        assert_eq!(send(&app, request).await.status(), StatusCode::CREATED);

        // Health stays open
        let response = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_list_and_health() {
        let (_dir, app) = app(|_| {});
        send(&app, post("alice", b"one")).await;
        send(&app, post("bob", b"two")).await;

        let list = body_json(send(&app, Request::get("/api/sessions").body(Body::empty()).unwrap()).await).await;
        assert_eq!(list.as_array().unwrap().len(), 2);
        assert!(list[0].get("session").is_none());

        let health = body_json(send(&app, Request::get("/health").body(Body::empty()).unwrap()).await).await;
        assert_eq!(health["status"], "ok");
        assert_eq!(health["records"], 2);
    }
}
