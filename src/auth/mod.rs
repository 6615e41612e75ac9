//! Request authentication.
//!
//! Two layers: the API-key layer guarding the function endpoints (constant-time
//! comparison to mitigate timing attacks), and the session layer that resolves
//! a bearer session token into a [`Caller`] with its role set.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::access::{Gate, GateOutcome, Module, OnDeny, Requirement, RoleSet, RoleState};
use crate::cache::{CacheKey, Resource};
use crate::errors::AppError;
use crate::AppState;

/// Header names accepted for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";
pub const APIKEY_HEADER: &str = "apikey";

/// API key authentication layer function that takes the expected key as a parameter.
pub async fn api_key_layer(expected: String, request: Request, next: Next) -> Response {
    let provided = request
        .headers()
        .get(APIKEY_HEADER)
        .or_else(|| request.headers().get(API_KEY_HEADER))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .or_else(|| bearer_token(request.headers()));

    match provided {
        Some(key) if constant_time_compare(&key, &expected) => next.run(request).await,
        Some(_) => AppError::Unauthorized("Invalid API key".to_string()).into_response(),
        None => AppError::Unauthorized("Missing API key".to_string()).into_response(),
    }
}

/// The authenticated user behind a session-authenticated request.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub token: String,
    pub roles: RoleState,
}

impl Caller {
    /// Pass the gate or fail with 403. A role lookup that did not complete
    /// never passes.
    pub fn require(&self, requirement: Requirement) -> Result<(), AppError> {
        match Gate::new(requirement)
            .on_deny(OnDeny::Notice)
            .decide(&self.roles)
        {
            GateOutcome::Render => Ok(()),
            GateOutcome::Nothing => Err(AppError::Forbidden(
                "Roles could not be resolved".to_string(),
            )),
            GateOutcome::Fallback | GateOutcome::AccessDenied => Err(AppError::Forbidden(
                "You do not have access to this area".to_string(),
            )),
        }
    }

    pub fn require_module(&self, module: Module) -> Result<(), AppError> {
        self.require(Requirement::module(module))
    }

    pub fn roles(&self) -> RoleSet {
        match self.roles {
            RoleState::Ready(roles) => roles,
            RoleState::Loading => RoleSet::empty(),
        }
    }
}

/// Cache key for a user's role set.
pub fn roles_key(user_id: &str) -> CacheKey {
    CacheKey::new(Resource::UserRoles).param("user", user_id)
}

/// Session layer: resolves `Authorization: Bearer <token>` into a [`Caller`]
/// request extension, or answers 401.
pub async fn session_layer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(request.headers()) else {
        return AppError::Unauthorized("Missing session token".to_string()).into_response();
    };

    let session = match state.repo.get_active_session(&token).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            return AppError::Unauthorized("Session is invalid or expired".to_string())
                .into_response()
        }
        Err(e) => return e.into_response(),
    };

    let repo = state.repo.clone();
    let user_id = session.user_id.clone();
    let roles = match state
        .cache
        .fetch(&roles_key(&session.user_id), || {
            let repo = repo.clone();
            let user_id = user_id.clone();
            async move { repo.get_user_roles(&user_id).await }
        })
        .await
    {
        Ok(roles) => RoleState::Ready(roles),
        Err(e) => {
            tracing::warn!(user = %session.user_id, "Role lookup failed: {}", e);
            RoleState::Loading
        }
    };

    request.extensions_mut().insert(Caller {
        user_id: session.user_id,
        token,
        roles,
    });

    next.run(request).await
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
