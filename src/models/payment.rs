//! Subscription payment orders.

use serde::{Deserialize, Serialize};

/// Request body for `create-razorpay-order`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentOrderRequest {
    /// Amount in rupees
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub dealer_id: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
}

/// A stored order, mirroring what the gateway created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOrder {
    pub id: String,
    pub gateway_order_id: String,
    pub dealer_id: String,
    pub plan: String,
    pub amount_paise: i64,
    pub currency: String,
    pub receipt: String,
    pub status: String,
    pub created_at: String,
}

/// What the checkout needs to open the gateway's payment sheet.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOrder {
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub key_id: String,
}
