//! Razorpay orders API client.

use async_trait::async_trait;
use serde::Deserialize;

use super::{GatewayOrder, IntegrationError, OrderRequest, PaymentGateway};
use crate::config::RazorpayConfig;

const RAZORPAY_API: &str = "https://api.razorpay.com";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    description: Option<String>,
}

pub struct RazorpayClient {
    client: reqwest::Client,
    key_id: String,
    key_secret: String,
}

impl RazorpayClient {
    pub fn new(config: &RazorpayConfig) -> Result<Self, IntegrationError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_order(&self, order: &OrderRequest) -> Result<GatewayOrder, IntegrationError> {
        let response = self
            .client
            .post(format!("{}/v1/orders", RAZORPAY_API))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(order)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<GatewayOrder>().await?);
        }

        let text = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            return Err(IntegrationError::Transport(format!(
                "gateway returned {}",
                status
            )));
        }

        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|body| body.error.description)
            .unwrap_or_else(|| format!("Payment gateway refused the order ({})", status));
        Err(IntegrationError::Rejected(message))
    }
}
