//! Session issuance, lookup and logout.

use axum::{extract::State, Extension};

use super::extract::Json;
use super::{required, success, ApiResult};
use crate::auth::Caller;
use crate::cache::Mutation;
use crate::models::{IssueSessionRequest, Session, SessionInfo};
use crate::AppState;

/// POST /api/sessions - Issue a session for a user (API key required).
pub async fn issue_session(
    State(state): State<AppState>,
    Json(request): Json<IssueSessionRequest>,
) -> ApiResult<Session> {
    let user_id = required(request.user_id, "userId")?;

    let session = state
        .cache
        .mutate(
            Mutation::IssueSession,
            state
                .repo
                .create_session(&user_id, state.config.session_ttl_hours),
        )
        .await?;

    tracing::info!(user = %session.user_id, "Session issued");
    success(session)
}

/// GET /api/session - The caller's identity and roles.
pub async fn get_session(Extension(caller): Extension<Caller>) -> ApiResult<SessionInfo> {
    success(SessionInfo {
        user_id: caller.user_id.clone(),
        roles: caller.roles(),
    })
}

/// DELETE /api/session - Log out.
pub async fn end_session(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<()> {
    state
        .cache
        .mutate(Mutation::EndSession, state.repo.delete_session(&caller.token))
        .await?;

    tracing::info!(user = %caller.user_id, "Session ended");
    success(())
}
