//! PowerDesk console reads and role management.

use axum::{extract::State, Extension};
use chrono::{Duration, Utc};
use serde::Deserialize;

use super::extract::{Json, Path, Query};
use super::access::parse_roles;
use super::{success, ApiResult};
use crate::access::{Module, Role, RoleSet};
use crate::auth::Caller;
use crate::cache::{CacheKey, Mutation, Resource};
use crate::errors::AppError;
use crate::intelligence::{funnel_summary, rank_leads, FunnelSummary, TopLead};
use crate::models::{LoanApplication, LoanDocument, LoanFilter, SessionInfo, SetRolesRequest};
use crate::AppState;

/// Engagement window used by lead scoring.
const ENGAGEMENT_DAYS: i64 = 7;
const MAX_TOP_LEADS: usize = 100;
const MAX_FUNNEL_DAYS: i64 = 365;

#[derive(Debug, Deserialize)]
pub struct TopLeadsQuery {
    #[serde(default = "default_top_leads")]
    pub limit: usize,
}

fn default_top_leads() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct FunnelQuery {
    #[serde(default = "default_funnel_days")]
    pub days: i64,
}

fn default_funnel_days() -> i64 {
    7
}

/// GET /api/powerdesk/leads/top - Open leads ranked by score.
pub async fn top_leads(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(params): Query<TopLeadsQuery>,
) -> ApiResult<Vec<TopLead>> {
    caller.require_module(Module::Leads)?;

    let scope = lead_scope(&state, &caller).await?;
    if scope.as_ref().is_some_and(Vec::is_empty) {
        return success(Vec::new());
    }

    let limit = params.limit.clamp(1, MAX_TOP_LEADS);
    let key = CacheKey::new(Resource::Leads)
        .param("limit", limit)
        .opt_param("dealers", scope.as_ref().map(|ids| ids.join(",")));
    let repo = state.repo.clone();

    let leads = state
        .cache
        .fetch(&key, || {
            let repo = repo.clone();
            let scope = scope.clone();
            async move {
                let now = Utc::now();
                let mut rows = repo.list_open_leads().await?;
                if let Some(dealer_ids) = &scope {
                    rows.retain(|row| dealer_ids.contains(&row.enquiry.dealer_id));
                }
                let interactions = repo
                    .count_listing_interactions_since(now - Duration::days(ENGAGEMENT_DAYS))
                    .await?;
                Ok(rank_leads(rows, &interactions, now, limit))
            }
        })
        .await?;

    success(leads)
}

/// Dealer ids whose leads the caller may read; `None` means every dealer.
async fn lead_scope(state: &AppState, caller: &Caller) -> Result<Option<Vec<String>>, AppError> {
    let roles = caller.roles();
    if roles.is_superadmin() || roles.contains(Role::Sales) {
        return Ok(None);
    }

    let mut dealer_ids: Vec<String> = state
        .repo
        .list_dealers_owned_by(&caller.user_id)
        .await?
        .into_iter()
        .map(|dealer| dealer.id)
        .collect();
    dealer_ids.sort();
    Ok(Some(dealer_ids))
}

/// GET /api/powerdesk/loans - Loan applications for the finance team.
pub async fn list_loans(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(filter): Query<LoanFilter>,
) -> ApiResult<Vec<LoanApplication>> {
    caller.require_module(Module::Finance)?;

    let key = CacheKey::new(Resource::LoanApplications)
        .opt_param("status", filter.status.map(|s| s.as_str()));
    let repo = state.repo.clone();

    let loans = state
        .cache
        .fetch(&key, || {
            let repo = repo.clone();
            async move { repo.list_loan_applications(filter.status).await }
        })
        .await?;

    success(loans)
}

/// GET /api/powerdesk/loans/{id}/documents - Documents uploaded for an application.
pub async fn list_loan_documents(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(application_id): Path<String>,
) -> ApiResult<Vec<LoanDocument>> {
    caller.require_module(Module::Finance)?;

    if state
        .repo
        .get_loan_application(&application_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound(format!(
            "Loan application {} not found",
            application_id
        )));
    }

    success(state.repo.list_loan_documents(&application_id).await?)
}

/// GET /api/powerdesk/funnel - Enquiry funnel over the last `days` days.
pub async fn funnel(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(params): Query<FunnelQuery>,
) -> ApiResult<FunnelSummary> {
    caller.require_module(Module::Analytics)?;

    if !(1..=MAX_FUNNEL_DAYS).contains(&params.days) {
        return Err(AppError::Validation(format!(
            "days must be between 1 and {}",
            MAX_FUNNEL_DAYS
        )));
    }
    let days = params.days;
    let key = CacheKey::new(Resource::Funnel).param("days", days);
    let repo = state.repo.clone();

    let summary = state
        .cache
        .fetch(&key, || {
            let repo = repo.clone();
            async move {
                let counts = repo
                    .count_events_since(Utc::now() - Duration::days(days))
                    .await?;
                Ok(funnel_summary(days, &counts))
            }
        })
        .await?;

    success(summary)
}

/// PUT /api/powerdesk/users/{id}/roles - Replace a user's roles.
pub async fn set_user_roles(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(user_id): Path<String>,
    Json(request): Json<SetRolesRequest>,
) -> ApiResult<SessionInfo> {
    caller.require_module(Module::UserManagement)?;

    let roles: RoleSet = parse_roles(&request.roles)?;

    let roles = state
        .cache
        .mutate(
            Mutation::GrantRoles,
            state.repo.set_user_roles(&user_id, roles),
        )
        .await?;

    tracing::info!(
        user = %user_id,
        roles = ?roles.to_tags(),
        by = %caller.user_id,
        "Roles updated"
    );

    success(SessionInfo { user_id, roles })
}
