//! Backend HTTP API client

use crate::config::ConductorConfig;
use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Project metadata listed by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl ProjectSummary {
    /// Entries without a usable `id` yield `None`
    fn from_json(value: &Value) -> Option<Self> {
        let entry = value.as_object()?;
        let id = match entry.get("id")? {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let text = |key: &str| entry.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            id,
            name: text("name"),
            description: text("description"),
        })
    }
}

/// Minimal client for the backend REST endpoints
pub struct BackendApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendApiClient {
    pub fn new(config: &ConductorConfig) -> Result<Self> {
        Self::with_timeout(config, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(config: &ConductorConfig, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.agent_token))
            .map_err(|e| Error::Config(format!("Invalid agent token: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .no_proxy()
            .build()?;

        Ok(Self {
            http,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /projects`; malformed entries are skipped
    pub async fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        let (status, data) = self.get_json("/projects").await?;
        let Value::Array(entries) = data else {
            return Err(Error::BackendApi {
                message: "Invalid projects response: expected list".to_string(),
                status_code: Some(status),
                details: Some(data),
            });
        };

        let projects: Vec<ProjectSummary> =
            entries.iter().filter_map(ProjectSummary::from_json).collect();
        tracing::debug!(count = projects.len(), "Listed backend projects");
        Ok(projects)
    }

    async fn get_json(&self, path: &str) -> Result<(u16, Value)> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.get(&url).send().await.map_err(|e| Error::BackendApi {
            message: format!("Backend request failed: {}", e),
            status_code: None,
            details: None,
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| Error::BackendApi {
            message: format!("Backend request failed: {}", e),
            status_code: Some(status.as_u16()),
            details: None,
        })?;
        let parsed = serde_json::from_str::<Value>(&body);

        if !status.is_success() {
            let details = parsed.unwrap_or(Value::String(body));
            return Err(Error::BackendApi {
                message: format!("Backend responded with {}", status.as_u16()),
                status_code: Some(status.as_u16()),
                details: Some(details),
            });
        }

        let data = parsed.map_err(|e| Error::BackendApi {
            message: format!("Invalid JSON from backend: {}", e),
            status_code: Some(status.as_u16()),
            details: Some(Value::String(body.clone())),
        })?;
        Ok((status.as_u16(), data))
    }
}
