//! Customer enquiry (lead) model.

use serde::{Deserialize, Serialize};

/// Where a lead is in the sales pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnquiryStatus {
    New,
    Contacted,
    Negotiating,
    Converted,
    Lost,
}

impl EnquiryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnquiryStatus::New => "new",
            EnquiryStatus::Contacted => "contacted",
            EnquiryStatus::Negotiating => "negotiating",
            EnquiryStatus::Converted => "converted",
            EnquiryStatus::Lost => "lost",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(EnquiryStatus::New),
            "contacted" => Some(EnquiryStatus::Contacted),
            "negotiating" => Some(EnquiryStatus::Negotiating),
            "converted" => Some(EnquiryStatus::Converted),
            "lost" => Some(EnquiryStatus::Lost),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(
            self,
            EnquiryStatus::New | EnquiryStatus::Contacted | EnquiryStatus::Negotiating
        )
    }
}

/// A customer's enquiry about a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enquiry {
    pub id: String,
    pub listing_id: String,
    pub dealer_id: String,
    pub customer_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status: EnquiryStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for a new enquiry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEnquiryRequest {
    pub listing_id: String,
    pub customer_name: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Request body for moving a lead along the pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEnquiryStatusRequest {
    pub status: EnquiryStatus,
}
