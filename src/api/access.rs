//! Gate decisions for the web client.

use axum::Extension;
use serde::{Deserialize, Serialize};

use super::extract::Json;
use super::{success, ApiResult};
use crate::access::{Gate, GateOutcome, MatchMode, Module, OnDeny, Requirement, Role, RoleSet};
use crate::auth::Caller;
use crate::errors::AppError;

/// Either a module or an explicit role list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCheckRequest {
    #[serde(default)]
    pub module: Option<Module>,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
    #[serde(default)]
    pub mode: MatchMode,
    #[serde(default)]
    pub on_deny: OnDeny,
}

#[derive(Debug, Serialize)]
pub struct AccessDecision {
    pub granted: bool,
    pub outcome: GateOutcome,
}

/// POST /api/access/check - Evaluate a gate against the caller's roles.
pub async fn check_access(
    Extension(caller): Extension<Caller>,
    Json(request): Json<AccessCheckRequest>,
) -> ApiResult<AccessDecision> {
    let requirement = match (request.module, request.roles) {
        (Some(module), None) => Requirement::module(module),
        (None, Some(tags)) => {
            let roles = parse_roles(&tags)?;
            match request.mode {
                MatchMode::Any => Requirement::any(roles),
                MatchMode::All => Requirement::all(roles),
            }
        }
        _ => {
            return Err(AppError::Validation(
                "Provide exactly one of module or roles".to_string(),
            ))
        }
    };

    let outcome = Gate::new(requirement)
        .on_deny(request.on_deny)
        .decide(&caller.roles);

    success(AccessDecision {
        granted: outcome.is_granted(),
        outcome,
    })
}

/// Parse role tags strictly: an unknown tag is a client error.
pub(crate) fn parse_roles(tags: &[String]) -> Result<RoleSet, AppError> {
    tags.iter()
        .map(|tag| {
            Role::parse(tag).ok_or_else(|| AppError::Validation(format!("Unknown role: {}", tag)))
        })
        .collect()
}
