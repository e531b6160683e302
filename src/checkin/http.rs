//! HTTP visit recorder
//!
//! POSTs `{"customer_ref": ...}` to `<endpoint>/visits` on the loyalty
//! back-end. 404 means the customer is unknown, any other non-success status
//! is a rejection, and connection failures or timeouts are transport errors.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::recorder::VisitRecorder;
use super::types::VisitOutcome;
use crate::config::RecorderConfig;
use crate::error::{AppError, ResolveError, Result};

#[derive(Debug, Serialize)]
struct VisitRequest<'a> {
    customer_ref: &'a str,
}

/// Fields the back-end may return; everything is optional
#[derive(Debug, Default, Deserialize)]
struct VisitResponse {
    #[serde(default)]
    visit_id: Option<String>,
    #[serde(default)]
    customer_name: Option<String>,
}

pub struct HttpVisitRecorder {
    client: reqwest::Client,
    visits_url: String,
    api_token: Option<String>,
}

impl HttpVisitRecorder {
    pub fn new(config: &RecorderConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| AppError::Config("recorder endpoint is not set".to_string()))?;

        let visits_url = visits_url(endpoint)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(config.timeout_ms.min(5000)))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        info!("Visit recorder posting to {}", visits_url);
        Ok(Self {
            client,
            visits_url,
            api_token: config.api_token.clone(),
        })
    }

    pub fn visits_url(&self) -> &str {
        &self.visits_url
    }
}

fn visits_url(endpoint: &str) -> Result<String> {
    let parsed = url::Url::parse(endpoint)
        .map_err(|e| AppError::Config(format!("Invalid recorder endpoint: {}", e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::Config(format!(
            "Recorder endpoint must be http(s): {}",
            endpoint
        )));
    }
    Ok(format!("{}/visits", endpoint.trim_end_matches('/')))
}

fn status_error(status: StatusCode, customer_ref: &str, body: &str) -> ResolveError {
    let detail = body.trim();
    match status {
        StatusCode::NOT_FOUND => ResolveError::NotFound(customer_ref.to_string()),
        _ if detail.is_empty() => ResolveError::Rejected(status.to_string()),
        _ => ResolveError::Rejected(format!("{}: {}", status, detail)),
    }
}

#[async_trait]
impl VisitRecorder for HttpVisitRecorder {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn resolve_and_record_visit(&self, customer_ref: &str) -> std::result::Result<VisitOutcome, ResolveError> {
        let mut request = self
            .client
            .post(&self.visits_url)
            .json(&VisitRequest { customer_ref });
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ResolveError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ResolveError::Transport(e.to_string()))?;
        debug!("Visit recorder answered {} for {}", status, customer_ref);

        if !status.is_success() {
            return Err(status_error(status, customer_ref, &body));
        }

        let parsed: VisitResponse = serde_json::from_str(&body).unwrap_or_default();
        Ok(VisitOutcome {
            customer_ref: customer_ref.to_string(),
            visit_id: parsed.visit_id,
            customer_name: parsed.customer_name,
            recorded_at: Utc::now(),
        })
    }
}
