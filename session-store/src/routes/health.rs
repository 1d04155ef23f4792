use crate::error::AppError;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let db = state.db.clone();
    let records: i64 = tokio::task::spawn_blocking(move || -> anyhow::Result<i64> {
        let conn = db.get()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM session_records", [], |row| row.get(0))?)
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??;

    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "records": records,
    })))
}
