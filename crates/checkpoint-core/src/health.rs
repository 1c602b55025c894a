use axum::http::StatusCode;
use sea_orm::DatabaseConnection;

/// Liveness probe for `GET /healthz`.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe body: `200` when the database answers a ping, `503` otherwise.
pub async fn database_ready(db: &DatabaseConnection) -> StatusCode {
    match db.ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "readiness ping failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
