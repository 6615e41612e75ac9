//! HTTP handlers.
//!
//! `/functions/*` are the API-key guarded request handlers the web client
//! calls directly; `/api/*` is the session-authenticated app API.

mod access;
mod dealers;
mod enquiries;
mod extract;
mod geocode;
mod listings;
mod loans;
mod notify;
mod payments;
mod powerdesk;
mod session;
mod tracking;

pub use access::*;
pub use dealers::*;
pub use enquiries::*;
pub use geocode::*;
pub use listings::*;
pub use loans::*;
pub use notify::*;
pub use payments::*;
pub use powerdesk::*;
pub use session::*;
pub use tracking::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// A required string field: present and not blank. Returns it trimmed.
pub(crate) fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{} is required", field)))
}

/// An optional string field; blank counts as absent.
pub(crate) fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
