//! Customer enquiries (leads).

use axum::{extract::State, Extension};
use serde::Serialize;

use super::extract::{Json, Path};
use super::dealers::dealer_in_scope;
use super::notify::{notify_dealer_best_effort, whatsapp_dealer};
use super::success;
use super::ApiResult;
use crate::access::Module;
use crate::auth::Caller;
use crate::cache::Mutation;
use crate::effects::SideEffect;
use crate::errors::AppError;
use crate::models::{
    CreateEnquiryRequest, Enquiry, ListingStatus, NotificationKind, UpdateEnquiryStatusRequest,
};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnquiryCreated {
    pub enquiry: Enquiry,
    pub notification: SideEffect,
    pub whatsapp: SideEffect,
}

/// POST /api/enquiries - A customer asks about a listing.
pub async fn create_enquiry(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<CreateEnquiryRequest>,
) -> ApiResult<EnquiryCreated> {
    if request.listing_id.trim().is_empty() {
        return Err(AppError::Validation("listingId is required".to_string()));
    }
    if request.customer_name.trim().is_empty() {
        return Err(AppError::Validation("customerName is required".to_string()));
    }

    let listing = state
        .repo
        .get_listing(request.listing_id.trim())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Listing {} not found", request.listing_id)))?;

    if listing.status != ListingStatus::Active {
        return Err(AppError::Conflict(
            "Listing is no longer available".to_string(),
        ));
    }

    let enquiry = state
        .cache
        .mutate(
            Mutation::CreateEnquiry,
            state.repo.create_enquiry(&listing, &request),
        )
        .await?;

    tracing::info!(
        enquiry = %enquiry.id,
        listing = %listing.id,
        user = %caller.user_id,
        "Enquiry created"
    );

    let mut body = format!("{} enquired about {}", enquiry.customer_name, listing.title);
    if let Some(message) = enquiry.message.as_deref().filter(|m| !m.trim().is_empty()) {
        body.push_str(&format!(": {}", message.trim()));
    }

    let notification =
        notify_dealer_best_effort(&state, &listing.dealer_id, NotificationKind::Enquiry, &body)
            .await;
    let whatsapp = match state.repo.get_dealer(&listing.dealer_id).await {
        Ok(Some(dealer)) => {
            whatsapp_dealer(&state, &dealer, NotificationKind::Enquiry, &body).await
        }
        Ok(None) => SideEffect::skipped("dealer not found"),
        Err(e) => {
            tracing::warn!("Dealer lookup for WhatsApp alert failed: {}", e);
            SideEffect::Failed(e.to_string())
        }
    };

    success(EnquiryCreated {
        enquiry,
        notification,
        whatsapp,
    })
}

/// PUT /api/enquiries/{id}/status - Move a lead along the pipeline.
pub async fn update_enquiry_status(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Json(request): Json<UpdateEnquiryStatusRequest>,
) -> ApiResult<Enquiry> {
    caller.require_module(Module::Leads)?;

    let enquiry = state
        .repo
        .get_enquiry(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Enquiry {} not found", id)))?;

    dealer_in_scope(&state, &caller, &enquiry.dealer_id).await?;

    let updated = state
        .cache
        .mutate(
            Mutation::UpdateEnquiryStatus,
            state.repo.update_enquiry_status(&id, request.status),
        )
        .await?;

    tracing::info!(
        enquiry = %updated.id,
        status = updated.status.as_str(),
        "Enquiry status updated"
    );
    success(updated)
}
