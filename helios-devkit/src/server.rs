/*!
Serveur HTTP de test - expose une `MockFleet` avec le contrat REST du registre

Routes servies (JSON, snake_case) :
- GET/POST /inverters, GET/DELETE /inverters/{id}
- POST /inverters/{id}/start, POST /inverters/{id}/stop
- GET /inverters/{id}/status, GET /inverters/{id}/logs
- GET /templates

Écoute sur 127.0.0.1 avec un port éphémère ; arrêté au drop.
*/

use crate::mock_fleet::MockFleet;
use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use helios_console::api::FleetApi;
use helios_console::error::ApiError;
use helios_console::models::{
    InverterConfig, InverterId, InverterRecord, LogsReport, StatusReport, TemplatesReport,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Traduit une erreur injectée en réponse HTTP
struct MockFailure(ApiError);

impl IntoResponse for MockFailure {
    fn into_response(self) -> Response {
        let code = match &self.0 {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Status { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::Transport(_) => StatusCode::BAD_GATEWAY,
            ApiError::Decode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (code, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

impl From<ApiError> for MockFailure {
    fn from(err: ApiError) -> Self {
        MockFailure(err)
    }
}

type MockResult<T> = Result<Json<T>, MockFailure>;

pub fn build_router(fleet: MockFleet) -> Router {
    Router::new()
        .route("/inverters", get(list_inverters).post(create_inverter))
        .route("/inverters/{id}", get(get_inverter).delete(delete_inverter))
        .route("/inverters/{id}/start", post(start_worker))
        .route("/inverters/{id}/stop", post(stop_worker))
        .route("/inverters/{id}/status", get(worker_status))
        .route("/inverters/{id}/logs", get(worker_logs))
        .route("/templates", get(list_templates))
        .with_state(fleet)
}

async fn list_inverters(State(fleet): State<MockFleet>) -> MockResult<Vec<InverterRecord>> {
    Ok(Json(fleet.list_inverters().await?))
}

async fn create_inverter(
    State(fleet): State<MockFleet>,
    Json(config): Json<InverterConfig>,
) -> MockResult<InverterRecord> {
    Ok(Json(fleet.create_inverter(&config).await?))
}

async fn get_inverter(State(fleet): State<MockFleet>, Path(id): Path<String>) -> MockResult<InverterRecord> {
    Ok(Json(fleet.get_inverter(&InverterId::from(id)).await?))
}

async fn delete_inverter(State(fleet): State<MockFleet>, Path(id): Path<String>) -> MockResult<Value> {
    fleet.delete_inverter(&InverterId::from(id)).await?;
    Ok(Json(json!({ "message": "Inverter deleted successfully" })))
}

async fn start_worker(State(fleet): State<MockFleet>, Path(id): Path<String>) -> MockResult<Value> {
    fleet.start_worker(&InverterId::from(id)).await?;
    Ok(Json(json!({ "message": "Container started successfully" })))
}

async fn stop_worker(State(fleet): State<MockFleet>, Path(id): Path<String>) -> MockResult<Value> {
    fleet.stop_worker(&InverterId::from(id)).await?;
    Ok(Json(json!({ "message": "Container stopped successfully" })))
}

async fn worker_status(State(fleet): State<MockFleet>, Path(id): Path<String>) -> MockResult<StatusReport> {
    let status = fleet.worker_status(&InverterId::from(id)).await?;
    Ok(Json(StatusReport { status }))
}

async fn worker_logs(State(fleet): State<MockFleet>, Path(id): Path<String>) -> MockResult<LogsReport> {
    let logs = fleet.worker_logs(&InverterId::from(id)).await?;
    Ok(Json(LogsReport { logs }))
}

async fn list_templates(State(fleet): State<MockFleet>) -> MockResult<TemplatesReport> {
    let templates = fleet.list_templates().await?;
    Ok(Json(TemplatesReport { templates }))
}

/// Serveur axum en tâche de fond
pub struct MockServer {
    addr: SocketAddr,
    fleet: MockFleet,
    task: JoinHandle<()>,
}

impl MockServer {
    /// Démarre le serveur sur un port libre
    pub async fn start(fleet: MockFleet) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("Failed to bind mock server")?;
        let addr = listener.local_addr()?;
        let app = build_router(fleet.clone());

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("❌ [MOCK] server stopped: {}", e);
            }
        });

        log::info!("🌐 [MOCK] fleet API listening on {}", addr);
        Ok(Self { addr, fleet, task })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn fleet(&self) -> &MockFleet {
        &self.fleet
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::RecordBuilder;

    #[tokio::test]
    async fn test_routes_over_http() {
        let fleet = MockFleet::with_records(vec![RecordBuilder::new("4").name("Barn").build()]);
        let server = MockServer::start(fleet).await.unwrap();
        let client = reqwest::Client::new();

        let list: Value = client
            .get(format!("{}/inverters", server.base_url()))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(list[0]["name"], "Barn");
        assert_eq!(list[0]["interval"], 300);

        let missing = client
            .get(format!("{}/inverters/99", server.base_url()))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        let started = client
            .post(format!("{}/inverters/4/start", server.base_url()))
            .send()
            .await
            .unwrap();
        assert!(started.status().is_success());
        assert_eq!(server.fleet().count(crate::mock_fleet::CallKind::Start), 1);
    }
}
