//! HTTP client for the `session-store` service.
//!
//! Session blobs travel as raw `application/octet-stream` bodies; record
//! metadata travels in headers:
//!
//! | Operation | Request                                   | Response                      |
//! |-----------|-------------------------------------------|-------------------------------|
//! | get       | `GET /api/sessions/{id}`                  | 200 blob + headers, or 404    |
//! | put       | `POST /api/sessions/{id}` blob + headers  | 200/201                       |
//! | update    | `PATCH /api/sessions/{id}` [blob] headers | 200, or 404 if nothing matched|
//! | delete    | `DELETE /api/sessions/{id}`               | 200 `{"deleted": n}`          |
//!
//! An empty PATCH body leaves the stored blob untouched.

use super::{RecordUpdate, RemoteSessionRecord, SessionStore};
use crate::utils::{Result, SyncError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const HEADER_MANAGER_ID: &str = "x-manager-id";
pub const HEADER_LAST_CHECK: &str = "x-last-check";
pub const HEADER_AUTHENTICATED: &str = "x-authenticated";

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Deserialize)]
struct DeleteResponse {
    deleted: u64,
}

pub struct HttpStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpStore {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn url(&self, manager_id: &str) -> String {
        format!("{}/api/sessions/{}", self.base_url, manager_id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        Ok(self.authorize(request).send().await?)
    }
}

/// Map a non-success status to an error, keeping the body for context.
async fn unavailable(response: Response) -> SyncError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    SyncError::RemoteUnavailable(format!("session store returned {}: {}", status, body))
}

fn parse_record(manager_id: &str, headers: &HeaderMap, session: bytes::Bytes) -> Result<RemoteSessionRecord> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let last_check = header(HEADER_LAST_CHECK)
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            SyncError::RemoteUnavailable(format!("missing or invalid {} header", HEADER_LAST_CHECK))
        })?;
    let authenticated = header(HEADER_AUTHENTICATED) == Some("true");
    let manager_id = header(HEADER_MANAGER_ID).unwrap_or(manager_id).to_string();

    Ok(RemoteSessionRecord {
        manager_id,
        session,
        last_check,
        authenticated,
    })
}

#[async_trait]
impl SessionStore for HttpStore {
    async fn get(&self, manager_id: &str) -> Result<Option<RemoteSessionRecord>> {
        let response = self.send(self.client.get(self.url(manager_id))).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let headers = response.headers().clone();
                let body = response.bytes().await?;
                debug!(manager_id, bytes = body.len(), "Fetched remote session");
                parse_record(manager_id, &headers, body).map(Some)
            }
            _ => Err(unavailable(response).await),
        }
    }

    async fn put(&self, record: RemoteSessionRecord) -> Result<()> {
        let request = self
            .client
            .post(self.url(&record.manager_id))
            .header(CONTENT_TYPE, OCTET_STREAM)
            .header(HEADER_LAST_CHECK, record.last_check.to_rfc3339())
            .header(HEADER_AUTHENTICATED, record.authenticated.to_string())
            .body(record.session);
        let response = self.send(request).await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(unavailable(response).await)
        }
    }

    async fn update(&self, manager_id: &str, update: RecordUpdate) -> Result<bool> {
        let mut request = self
            .client
            .patch(self.url(manager_id))
            .header(CONTENT_TYPE, OCTET_STREAM);
        if let Some(last_check) = update.last_check {
            request = request.header(HEADER_LAST_CHECK, last_check.to_rfc3339());
        }
        if let Some(authenticated) = update.authenticated {
            request = request.header(HEADER_AUTHENTICATED, authenticated.to_string());
        }
        if let Some(session) = update.session {
            request = request.body(session);
        }
        let response = self.send(request).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            _ => Err(unavailable(response).await),
        }
    }

    async fn delete(&self, manager_id: &str) -> Result<u64> {
        let response = self.send(self.client.delete(self.url(manager_id))).await?;

        if !response.status().is_success() {
            return Err(unavailable(response).await);
        }
        let body: DeleteResponse = response.json().await?;
        Ok(body.deleted)
    }
}
