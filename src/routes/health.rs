use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use std::time::Duration;

use crate::state::AppState;

/// Liveness/readiness probe. The DB check is bounded by a short timeout
/// so the endpoint answers quickly even when the pool cannot connect.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let db_ok = match &state.db_pool {
        Some(pool) => ping_database(pool).await,
        None => true, // no DB configured, nothing to probe
    };

    Json(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "service": state.config.app_name,
        "now": Utc::now().to_rfc3339(),
        "db": db_ok,
    }))
}

async fn ping_database(pool: &sqlx::PgPool) -> bool {
    match tokio::time::timeout(
        Duration::from_secs(3),
        sqlx::query("SELECT 1").fetch_one(pool),
    )
    .await
    {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Health check DB query failed");
            false
        }
        Err(_) => {
            tracing::error!("Health check DB query timed out (3s)");
            false
        }
    }
}
