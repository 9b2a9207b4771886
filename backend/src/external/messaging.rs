//! WhatsApp messaging gateway client
//!
//! Forwards rendered report bodies to the external gateway. The gateway owns
//! templating and delivery; this client only relays and classifies failures.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::MessagingConfig;
use crate::error::{AppError, AppResult};

/// Client for the WhatsApp gateway
#[derive(Clone)]
pub struct WhatsAppClient {
    endpoint: String,
    auth_key: String,
    http_client: Client,
}

/// A report forward request
#[derive(Debug, Serialize, Deserialize)]
pub struct ReportMessage {
    /// Recipient numbers in international format
    pub recipients: Vec<String>,
    /// Rendered report text
    pub message: String,
    /// Optional link to the full report download
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GatewayReceipt {
    pub request_id: String,
    pub accepted: u32,
}

impl WhatsAppClient {
    pub fn new(config: &MessagingConfig) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            auth_key: config.auth_key.clone(),
            http_client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty()
    }

    /// Forward a report body to the gateway
    pub async fn send_report(&self, message: &ReportMessage) -> AppResult<GatewayReceipt> {
        if !self.is_configured() {
            return Err(AppError::Configuration(
                "messaging gateway not configured".to_string(),
            ));
        }
        if message.recipients.is_empty() {
            return Err(AppError::ValidationError(
                "At least one recipient is required".to_string(),
            ));
        }

        let response = self
            .http_client
            .post(format!("{}/messages/report", self.endpoint))
            .header("authkey", &self.auth_key)
            .json(message)
            .send()
            .await
            .map_err(|e| AppError::Messaging(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Messaging(format!(
                "Gateway returned {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Messaging(format!("Failed to parse response: {}", e)))
    }
}
