//! Fleet API contract and its HTTP implementation
//!
//! Three collaborators sit behind one trait:
//! - Agent Registry: CRUD over inverter records
//! - Worker Control: start/stop, acknowledges acceptance only
//! - Worker Observability: live status and a recent log excerpt
//!
//! All freshness is pull-based; there is no push channel from the workers.

use crate::error::ApiError;
use crate::models::{
    InverterConfig, InverterId, InverterRecord, LogsReport, StatusReport, TemplatesReport,
};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait FleetApi: Send + Sync {
    // Agent Registry

    async fn list_inverters(&self) -> Result<Vec<InverterRecord>, ApiError>;

    async fn get_inverter(&self, id: &InverterId) -> Result<InverterRecord, ApiError>;

    async fn create_inverter(&self, config: &InverterConfig) -> Result<InverterRecord, ApiError>;

    async fn delete_inverter(&self, id: &InverterId) -> Result<(), ApiError>;

    async fn list_templates(&self) -> Result<Vec<String>, ApiError>;

    // Worker Control. `Ok` means accepted, not completed.

    async fn start_worker(&self, id: &InverterId) -> Result<(), ApiError>;

    async fn stop_worker(&self, id: &InverterId) -> Result<(), ApiError>;

    // Worker Observability

    async fn worker_status(&self, id: &InverterId) -> Result<String, ApiError>;

    async fn worker_logs(&self, id: &InverterId) -> Result<String, ApiError>;
}

/// reqwest-backed client for the registry backend
#[derive(Clone)]
pub struct HttpFleetApi {
    client: Client,
    base_url: String,
}

impl HttpFleetApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("helios-console/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!("GET {}", path);
        let response = self.client.get(self.url(path)).send().await?;
        let response = check_status(response, path).await?;
        Ok(response.json::<T>().await?)
    }

    /// POST whose answer body carries no guarantee
    async fn post_ack(&self, path: &str) -> Result<(), ApiError> {
        debug!("POST {}", path);
        let response = self.client.post(self.url(path)).send().await?;
        check_status(response, path).await?;
        Ok(())
    }
}

/// Maps non-2xx answers onto `ApiError`, keeping the body for diagnostics
async fn check_status(response: Response, path: &str) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound(format!("{path}: {body}")));
    }
    Err(ApiError::Status { status: status.as_u16(), body })
}

#[async_trait]
impl FleetApi for HttpFleetApi {
    async fn list_inverters(&self) -> Result<Vec<InverterRecord>, ApiError> {
        self.get_json("/inverters").await
    }

    async fn get_inverter(&self, id: &InverterId) -> Result<InverterRecord, ApiError> {
        self.get_json(&format!("/inverters/{id}")).await
    }

    async fn create_inverter(&self, config: &InverterConfig) -> Result<InverterRecord, ApiError> {
        debug!("POST /inverters ({})", config.name);
        let response = self
            .client
            .post(self.url("/inverters"))
            .json(config)
            .send()
            .await?;
        let response = check_status(response, "/inverters").await?;
        Ok(response.json::<InverterRecord>().await?)
    }

    async fn delete_inverter(&self, id: &InverterId) -> Result<(), ApiError> {
        let path = format!("/inverters/{id}");
        debug!("DELETE {}", path);
        let response = self.client.delete(self.url(&path)).send().await?;
        check_status(response, &path).await?;
        Ok(())
    }

    async fn list_templates(&self) -> Result<Vec<String>, ApiError> {
        let report: TemplatesReport = self.get_json("/templates").await?;
        Ok(report.templates)
    }

    async fn start_worker(&self, id: &InverterId) -> Result<(), ApiError> {
        self.post_ack(&format!("/inverters/{id}/start")).await
    }

    async fn stop_worker(&self, id: &InverterId) -> Result<(), ApiError> {
        self.post_ack(&format!("/inverters/{id}/stop")).await
    }

    async fn worker_status(&self, id: &InverterId) -> Result<String, ApiError> {
        let report: StatusReport = self.get_json(&format!("/inverters/{id}/status")).await?;
        Ok(report.status)
    }

    async fn worker_logs(&self, id: &InverterId) -> Result<String, ApiError> {
        let report: LogsReport = self.get_json(&format!("/inverters/{id}/logs")).await?;
        Ok(report.logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalised() {
        let api = HttpFleetApi::new("http://localhost:8000/", Duration::from_secs(5)).unwrap();
        assert_eq!(api.base_url(), "http://localhost:8000");
        assert_eq!(api.url("/inverters"), "http://localhost:8000/inverters");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        // nothing listens on the discard port
        let api = HttpFleetApi::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = api.list_inverters().await.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {err:?}");
    }
}
