//! Interaction events used for funnel analytics and lead engagement.

use serde::{Deserialize, Serialize};

/// Tracked customer events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PageView,
    ListingView,
    Search,
    FilterApply,
    EnquiryStart,
    EnquirySubmit,
    CallClick,
    WhatsappClick,
    LoanStart,
    LoanSubmit,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PageView => "page_view",
            EventType::ListingView => "listing_view",
            EventType::Search => "search",
            EventType::FilterApply => "filter_apply",
            EventType::EnquiryStart => "enquiry_start",
            EventType::EnquirySubmit => "enquiry_submit",
            EventType::CallClick => "call_click",
            EventType::WhatsappClick => "whatsapp_click",
            EventType::LoanStart => "loan_start",
            EventType::LoanSubmit => "loan_submit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "page_view" => Some(EventType::PageView),
            "listing_view" => Some(EventType::ListingView),
            "search" => Some(EventType::Search),
            "filter_apply" => Some(EventType::FilterApply),
            "enquiry_start" => Some(EventType::EnquiryStart),
            "enquiry_submit" => Some(EventType::EnquirySubmit),
            "call_click" => Some(EventType::CallClick),
            "whatsapp_click" => Some(EventType::WhatsappClick),
            "loan_start" => Some(EventType::LoanStart),
            "loan_submit" => Some(EventType::LoanSubmit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub id: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: String,
}

/// Request body for `track-interaction`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInteractionRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}
