//! Blocking HTTP client for the row-validation endpoint.

use std::time::Duration;

use serde::Serialize;

use rowbench_engine::results::RowResultNode;
use rowbench_engine::validation::{CellSubmission, RowValidator, ValidationError};

/// Row-validation API client (blocking).
#[derive(Clone)]
pub struct ValidatorClient {
    http: reqwest::blocking::Client,
    api_base: String,
    dataset_id: i64,
}

/// Error type for validation calls.
#[derive(Debug)]
pub enum ClientError {
    /// Network error
    Network(String),
    /// HTTP error with status code
    Http(u16, String),
    /// JSON parsing error
    Parse(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Network(msg) => write!(f, "Network error: {}", msg),
            ClientError::Http(code, msg) => write!(f, "HTTP {}: {}", code, msg),
            ClientError::Parse(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {}

#[derive(Serialize)]
struct RowPayload<'a> {
    row: usize,
    cells: &'a [CellSubmission],
}

impl ValidatorClient {
    /// Create a client for one dataset on the service at `api_base`.
    pub fn new(api_base: impl Into<String>, dataset_id: i64) -> Self {
        let http = reqwest::blocking::Client::builder()
            .user_agent(format!("rowbench/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");

        Self { http, api_base: api_base.into(), dataset_id }
    }

    /// Validate one row against the service.
    pub fn post_row(
        &self,
        physical_row: usize,
        cells: &[CellSubmission],
    ) -> Result<RowResultNode, ClientError> {
        let url = format!(
            "{}/api/workbench/validate_row/{}/",
            self.api_base, self.dataset_id
        );
        log::debug!("validating row {} against {}", physical_row, url);

        let response = self
            .http
            .post(&url)
            .json(&RowPayload { row: physical_row, cells })
            .send()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().unwrap_or_default();
            log::warn!("row {} validation failed: HTTP {}", physical_row, status);
            return Err(ClientError::Http(status, body));
        }

        response
            .json::<RowResultNode>()
            .map_err(|e| ClientError::Parse(e.to_string()))
    }
}

impl RowValidator for ValidatorClient {
    fn validate_row(
        &self,
        physical_row: usize,
        cells: &[CellSubmission],
    ) -> Result<RowResultNode, ValidationError> {
        self.post_row(physical_row, cells).map_err(|err| match err {
            // An unparseable result tree is a broken service contract, not
            // a transient failure
            ClientError::Parse(detail) => ValidationError::Protocol { row: physical_row, detail },
            other => ValidationError::Transport(other.to_string()),
        })
    }
}
