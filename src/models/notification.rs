//! In-app notifications and dealer alerts.

use serde::{Deserialize, Serialize};

use crate::effects::SideEffect;

/// Why a dealer is being alerted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    #[default]
    Enquiry,
    Booking,
    TestDrive,
    Loan,
    LoanStatus,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Enquiry => "enquiry",
            NotificationKind::Booking => "booking",
            NotificationKind::TestDrive => "test_drive",
            NotificationKind::Loan => "loan",
            NotificationKind::LoanStatus => "loan_status",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "enquiry" => Some(NotificationKind::Enquiry),
            "booking" => Some(NotificationKind::Booking),
            "test_drive" => Some(NotificationKind::TestDrive),
            "loan" => Some(NotificationKind::Loan),
            "loan_status" => Some(NotificationKind::LoanStatus),
            _ => None,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            NotificationKind::Enquiry => "New enquiry",
            NotificationKind::Booking => "New booking",
            NotificationKind::TestDrive => "Test drive requested",
            NotificationKind::Loan => "New loan application",
            NotificationKind::LoanStatus => "Loan application updated",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    /// Dealer id or user id, depending on the kind
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: String,
}

/// Fields for a new notification row.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub body: String,
}

/// Request body for `notify-dealer`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyDealerRequest {
    #[serde(default)]
    pub dealer_id: Option<String>,
    #[serde(default)]
    pub listing_id: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
}

/// Result of `notify-dealer`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DealerNotified {
    pub notification_id: String,
    pub whatsapp: SideEffect,
}
