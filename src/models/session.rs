//! Sessions and role assignments.

use serde::{Deserialize, Serialize};

use crate::access::RoleSet;

/// An authenticated session issued by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub created_at: String,
    pub expires_at: String,
}

/// Request body for issuing a session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueSessionRequest {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// The caller's identity and roles.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub user_id: String,
    pub roles: RoleSet,
}

/// Request body replacing a user's roles.
#[derive(Debug, Clone, Deserialize)]
pub struct SetRolesRequest {
    pub roles: Vec<String>,
}
