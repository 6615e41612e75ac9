//! `notify-dealer` and the dealer alert helpers shared with other writes.

use axum::{extract::State, Extension};

use super::extract::Json;
use super::{optional, required, success, ApiResult};
use crate::cache::Mutation;
use crate::auth::Caller;
use crate::effects::{best_effort, SideEffect};
use crate::errors::AppError;
use crate::models::{
    Dealer, DealerNotified, NewNotification, Notification, NotificationKind, NotifyDealerRequest,
};
use crate::AppState;

/// POST /functions/notify-dealer - Record a dealer notification and
/// WhatsApp the dealer when they opted in.
pub async fn notify_dealer(
    State(state): State<AppState>,
    Json(request): Json<NotifyDealerRequest>,
) -> ApiResult<DealerNotified> {
    let dealer_id = required(request.dealer_id, "dealerId")?;
    let message = required(request.message, "message")?;
    let kind = match optional(request.kind) {
        None => NotificationKind::Enquiry,
        Some(kind) => NotificationKind::parse(&kind)
            .filter(|k| *k != NotificationKind::LoanStatus)
            .ok_or_else(|| AppError::Validation(format!("Unknown notification kind: {}", kind)))?,
    };

    let dealer = state
        .repo
        .get_dealer(&dealer_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Dealer {} not found", dealer_id)))?;

    let mut body = message;
    if let Some(name) = optional(request.customer_name) {
        body.push_str(&format!("\nCustomer: {}", name));
    }
    if let Some(phone) = optional(request.customer_phone) {
        body.push_str(&format!("\nPhone: {}", phone));
    }
    if let Some(listing_id) = optional(request.listing_id) {
        body.push_str(&format!("\nListing: {}", listing_id));
    }

    let notification = state
        .cache
        .mutate(
            Mutation::NotifyDealer,
            state.repo.create_notification(&NewNotification {
                recipient_id: dealer.id.clone(),
                kind,
                body: body.clone(),
            }),
        )
        .await?;

    let whatsapp = whatsapp_dealer(&state, &dealer, kind, &body).await;

    tracing::info!(
        dealer = %dealer.id,
        kind = kind.as_str(),
        whatsapp = whatsapp.label(),
        "Dealer notified"
    );

    success(DealerNotified {
        notification_id: notification.id,
        whatsapp,
    })
}

/// GET /api/notifications - The caller's inbox, including alerts for the
/// dealerships they own. Newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Vec<Notification>> {
    let mut notifications = state.repo.list_notifications(&caller.user_id).await?;
    for dealer in state.repo.list_dealers_owned_by(&caller.user_id).await? {
        notifications.extend(state.repo.list_notifications(&dealer.id).await?);
    }
    notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    success(notifications)
}

/// Best-effort notification row for a dealer.
pub(crate) async fn notify_dealer_best_effort(
    state: &AppState,
    dealer_id: &str,
    kind: NotificationKind,
    body: &str,
) -> SideEffect {
    best_effort(
        "dealer-notification",
        state.cache.mutate(
            Mutation::NotifyDealer,
            state.repo.create_notification(&NewNotification {
                recipient_id: dealer_id.to_string(),
                kind,
                body: body.to_string(),
            }),
        ),
    )
    .await
}

/// Best-effort WhatsApp alert; skipped unless the dealer opted in with a phone.
pub(crate) async fn whatsapp_dealer(
    state: &AppState,
    dealer: &Dealer,
    kind: NotificationKind,
    body: &str,
) -> SideEffect {
    if !dealer.whatsapp_opt_in {
        return SideEffect::skipped("dealer has not opted in to WhatsApp");
    }
    let Some(phone) = dealer.phone.as_deref().filter(|p| !p.trim().is_empty()) else {
        return SideEffect::skipped("dealer has no phone number");
    };

    let text = format!("CarMart: {}\n{}", kind.title(), body);
    best_effort("whatsapp", state.messenger.send_whatsapp(phone, &text)).await
}
