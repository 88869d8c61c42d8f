//! QRIS aggregator client.
//!
//! Thin reqwest wrapper over the aggregator's REST API: create a scannable
//! code with an expiry, check whether it has been paid, and void it.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

use super::{CodeCreated, GatewayStatus, PaymentGateway};

#[derive(Debug, Serialize)]
struct CreateCodeRequest {
    amount: i64,
    /// Minutes until the code stops being payable
    expiry: i64,
}

#[derive(Debug, Deserialize)]
struct CreateCodeResponse {
    data: CodeData,
}

#[derive(Debug, Deserialize)]
struct CodeData {
    id: String,
    qris_content: String,
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    data: StatusData,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    status: String,
}

#[derive(Debug, Clone)]
pub struct QrisClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl QrisClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl PaymentGateway for QrisClient {
    async fn create_code(&self, amount: i64, duration_minutes: i64) -> Result<CodeCreated> {
        let response = self
            .client
            .post(format!("{}/v1/qris", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&CreateCodeRequest {
                amount,
                expiry: duration_minutes,
            })
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("create_code request failed: {}", e)))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!("create_code rejected: {}", body)));
        }

        let parsed: CreateCodeResponse = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("create_code bad payload: {}", e)))?;

        Ok(CodeCreated {
            gateway_ref: parsed.data.id,
            code_payload: parsed.data.qris_content,
            total_amount: parsed.data.amount,
        })
    }

    async fn check_status(&self, gateway_ref: &str) -> Result<GatewayStatus> {
        let response = self
            .client
            .get(format!("{}/v1/qris/{}", self.base_url, gateway_ref))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("check_status request failed: {}", e)))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!("check_status rejected: {}", body)));
        }

        let parsed: StatusResponse = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("check_status bad payload: {}", e)))?;

        match parsed.data.status.to_ascii_uppercase().as_str() {
            "PAID" | "SETTLED" => Ok(GatewayStatus::Paid),
            _ => Ok(GatewayStatus::Unpaid),
        }
    }

    async fn cancel(&self, gateway_ref: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/v1/qris/{}", self.base_url, gateway_ref))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("cancel request failed: {}", e)))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!("cancel rejected: {}", body)));
        }
        Ok(())
    }
}
