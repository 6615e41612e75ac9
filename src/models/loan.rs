//! Car loan application models.

use serde::{Deserialize, Serialize};

/// Processing state of a loan application.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Submitted,
    UnderReview,
    Approved,
    Rejected,
    Disbursed,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Submitted => "submitted",
            LoanStatus::UnderReview => "under_review",
            LoanStatus::Approved => "approved",
            LoanStatus::Rejected => "rejected",
            LoanStatus::Disbursed => "disbursed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "submitted" => Some(LoanStatus::Submitted),
            "under_review" => Some(LoanStatus::UnderReview),
            "approved" => Some(LoanStatus::Approved),
            "rejected" => Some(LoanStatus::Rejected),
            "disbursed" => Some(LoanStatus::Disbursed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Rejected | LoanStatus::Disbursed)
    }

    /// Allowed moves: forward one step, or to rejected from any open state.
    pub fn can_transition_to(&self, next: LoanStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (LoanStatus::Submitted, LoanStatus::UnderReview)
                | (LoanStatus::UnderReview, LoanStatus::Approved)
                | (LoanStatus::Approved, LoanStatus::Disbursed)
                | (_, LoanStatus::Rejected)
        )
    }
}

/// A customer's application for financing a listed car.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanApplication {
    pub id: String,
    pub listing_id: String,
    pub dealer_id: String,
    pub applicant_name: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Requested amount in rupees
    pub loan_amount: i64,
    pub tenure_months: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_income: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employment_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applicant_user_id: Option<String>,
    pub status: LoanStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for `create-loan-application`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLoanApplicationRequest {
    #[serde(default)]
    pub listing_id: Option<String>,
    #[serde(default)]
    pub applicant_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub loan_amount: Option<i64>,
    #[serde(default)]
    pub tenure_months: Option<i32>,
    #[serde(default)]
    pub monthly_income: Option<i64>,
    #[serde(default)]
    pub employment_type: Option<String>,
    #[serde(default)]
    pub applicant_user_id: Option<String>,
}

/// Validated fields for inserting an application.
#[derive(Debug, Clone)]
pub struct NewLoanApplication {
    pub listing_id: String,
    pub dealer_id: String,
    pub applicant_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub loan_amount: i64,
    pub tenure_months: i32,
    pub monthly_income: Option<i64>,
    pub employment_type: Option<String>,
    pub applicant_user_id: Option<String>,
}

/// Request body for `update-loan-status`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLoanStatusRequest {
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Request body for `generate-loan-upload-link`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateUploadLinkRequest {
    #[serde(default)]
    pub application_id: Option<String>,
}

/// A time-limited link an applicant uses to upload documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadLink {
    pub token: String,
    pub application_id: String,
    pub url: String,
    pub expires_at: String,
}

/// Request body for `upload-loan-document`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadLoanDocumentRequest {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub content_base64: Option<String>,
}

/// A stored supporting document for an application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanDocument {
    pub id: String,
    pub application_id: String,
    pub document_type: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_path: String,
    pub uploaded_at: String,
}

/// Filter for the finance console.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanFilter {
    #[serde(default)]
    pub status: Option<LoanStatus>,
}
