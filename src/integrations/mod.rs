//! Clients for third-party services.
//!
//! Each service sits behind an async trait so handlers hold `Arc<dyn ...>`
//! and tests can substitute their own implementation.

mod geocoder;
mod messenger;
mod razorpay;

pub use geocoder::*;
pub use messenger::*;
pub use razorpay::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::AppError;
use crate::models::Place;

/// Failure talking to a third-party service.
#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("request failed: {0}")]
    Transport(String),
    /// The service answered and refused the request.
    #[error("{0}")]
    Rejected(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for IntegrationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            IntegrationError::Decode(err.to_string())
        } else {
            IntegrationError::Transport(err.to_string())
        }
    }
}

impl From<IntegrationError> for AppError {
    fn from(err: IntegrationError) -> Self {
        match err {
            IntegrationError::Transport(msg) => AppError::Network(msg),
            IntegrationError::Rejected(msg) => AppError::Rejected(msg),
            IntegrationError::Decode(msg) => AppError::Network(format!("Unexpected response: {}", msg)),
        }
    }
}

/// Order to create at the payment gateway.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    /// Smallest currency unit (paise for INR)
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
}

/// Order as created by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    pub status: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key id handed to the checkout.
    fn key_id(&self) -> &str;

    async fn create_order(&self, order: &OrderRequest) -> Result<GatewayOrder, IntegrationError>;
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn reverse(&self, lat: f64, lng: f64) -> Result<Place, IntegrationError>;
}

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a WhatsApp text to a phone number in E.164 form.
    async fn send_whatsapp(&self, phone: &str, text: &str) -> Result<(), IntegrationError>;
}
