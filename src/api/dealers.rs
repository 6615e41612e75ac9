//! Dealer onboarding and the dealer dashboard.

use axum::{extract::State, Extension};
use chrono::{Duration, Utc};

use super::extract::Json;
use super::{success, ApiResult};
use crate::access::{Module, Role};
use crate::auth::Caller;
use crate::cache::{CacheKey, Mutation, Resource};
use crate::errors::AppError;
use crate::intelligence::{dealer_metrics, DealerMetrics};
use crate::models::{CreateDealerRequest, Dealer};
use crate::AppState;

/// Window for "recent" enquiries on the dashboard.
const RECENT_DAYS: i64 = 30;

/// POST /api/dealers - Onboard a dealership.
pub async fn create_dealer(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<CreateDealerRequest>,
) -> ApiResult<Dealer> {
    caller.require_module(Module::DealerOnboarding)?;

    if request.name.trim().is_empty() {
        return Err(AppError::Validation("name is required".to_string()));
    }

    let dealer = state
        .cache
        .mutate(Mutation::CreateDealer, state.repo.create_dealer(&request))
        .await?;

    tracing::info!(dealer = %dealer.id, by = %caller.user_id, "Dealer onboarded");
    success(dealer)
}

/// GET /api/dealer/metrics - Dashboard figures for the caller's dealerships.
pub async fn get_dealer_metrics(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Vec<DealerMetrics>> {
    caller.require_module(Module::DealerDashboard)?;

    let dealers = state.repo.list_dealers_owned_by(&caller.user_id).await?;

    let mut metrics = Vec::with_capacity(dealers.len());
    for dealer in dealers {
        let key = CacheKey::new(Resource::DealerMetrics).param("dealer", &dealer.id);
        let repo = state.repo.clone();
        let value = state
            .cache
            .fetch(&key, || {
                let repo = repo.clone();
                let dealer = dealer.clone();
                async move {
                    let since = Utc::now() - Duration::days(RECENT_DAYS);
                    let counts = repo.dealer_counts(&dealer.id, since).await?;
                    Ok(dealer_metrics(&dealer, &counts))
                }
            })
            .await?;
        metrics.push(value);
    }

    success(metrics)
}

/// Load a dealer the caller may act for.
///
/// Callers whose only console role is `dealer` are limited to dealerships
/// they own; sales staff and the super-admin act for any dealer.
pub(crate) async fn dealer_in_scope(
    state: &AppState,
    caller: &Caller,
    dealer_id: &str,
) -> Result<Dealer, AppError> {
    let dealer = state
        .repo
        .get_dealer(dealer_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Dealer {} not found", dealer_id)))?;

    let roles = caller.roles();
    if roles.is_superadmin() || roles.contains(Role::Sales) {
        return Ok(dealer);
    }

    if dealer.owner_user_id.as_deref() == Some(caller.user_id.as_str()) {
        Ok(dealer)
    } else {
        Err(AppError::Forbidden(
            "You can only manage your own dealership".to_string(),
        ))
    }
}
