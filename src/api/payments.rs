//! `create-razorpay-order`.

use axum::extract::State;
use chrono::Utc;

use super::extract::Json;
use super::{optional, required, success, ApiResult};
use crate::cache::Mutation;
use crate::db::timestamp;
use crate::errors::AppError;
use crate::integrations::OrderRequest;
use crate::models::{CheckoutOrder, CreatePaymentOrderRequest, PaymentOrder};
use crate::AppState;

/// Largest order accepted, in rupees (one crore).
const MAX_ORDER_RUPEES: f64 = 10_000_000.0;

/// POST /functions/create-razorpay-order - Create a subscription order at the
/// gateway and record it. Unavailable until gateway credentials are configured.
pub async fn create_razorpay_order(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentOrderRequest>,
) -> ApiResult<CheckoutOrder> {
    let Some(gateway) = state.payments.clone() else {
        return Err(AppError::NotConfigured(
            "Payments are not configured".to_string(),
        ));
    };

    let amount = request
        .amount
        .ok_or_else(|| AppError::Validation("amount is required".to_string()))?;
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::Validation(
            "amount must be greater than zero".to_string(),
        ));
    }
    if amount > MAX_ORDER_RUPEES {
        return Err(AppError::Validation(format!(
            "amount must not exceed {} rupees",
            MAX_ORDER_RUPEES
        )));
    }
    let amount_paise = (amount * 100.0).round() as i64;

    let dealer_id = required(request.dealer_id, "dealerId")?;
    let plan = required(request.plan, "plan")?;
    let currency = optional(request.currency)
        .map(|c| c.to_ascii_uppercase())
        .unwrap_or_else(|| "INR".to_string());
    let receipt = optional(request.receipt).unwrap_or_else(|| {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("rcpt_{}", &id[..8])
    });

    if state.repo.get_dealer(&dealer_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Dealer {} not found", dealer_id)));
    }

    let created = gateway
        .create_order(&OrderRequest {
            amount: amount_paise,
            currency,
            receipt: receipt.clone(),
        })
        .await?;

    let order = PaymentOrder {
        id: uuid::Uuid::new_v4().to_string(),
        gateway_order_id: created.id.clone(),
        dealer_id,
        plan,
        amount_paise: created.amount,
        currency: created.currency.clone(),
        receipt: created.receipt.clone().unwrap_or(receipt),
        status: created.status.clone(),
        created_at: timestamp(Utc::now()),
    };

    state
        .cache
        .mutate(
            Mutation::CreatePaymentOrder,
            state.repo.create_payment_order(&order),
        )
        .await?;

    tracing::info!(
        order = %order.gateway_order_id,
        dealer = %order.dealer_id,
        plan = %order.plan,
        amount_paise = order.amount_paise,
        "Payment order created"
    );

    success(CheckoutOrder {
        order_id: order.gateway_order_id,
        amount: order.amount_paise,
        currency: order.currency,
        receipt: order.receipt,
        key_id: gateway.key_id().to_string(),
    })
}
