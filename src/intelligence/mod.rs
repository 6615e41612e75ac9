//! Lead scoring, dealer metrics and funnel summaries.
//!
//! Pure arithmetic over rows the repository has already aggregated. Nothing
//! here is persisted; results are recomputed on every uncached fetch.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{parse_timestamp, DealerCounts, LeadRow};
use crate::models::{Dealer, EnquiryStatus, EventType};

/// Engagement points per listing interaction, and their cap.
const POINTS_PER_INTERACTION: i64 = 2;
const MAX_ENGAGEMENT_POINTS: i64 = 20;
const PHONE_POINTS: i64 = 10;

pub const HOT_THRESHOLD: u8 = 70;
pub const WARM_THRESHOLD: u8 = 40;

/// Stages of the enquiry funnel, in order.
pub const FUNNEL_STAGES: [EventType; 3] = [
    EventType::ListingView,
    EventType::EnquiryStart,
    EventType::EnquirySubmit,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Temperature {
    Hot,
    Warm,
    Cold,
}

impl Temperature {
    pub fn from_score(score: u8) -> Self {
        if score >= HOT_THRESHOLD {
            Temperature::Hot
        } else if score >= WARM_THRESHOLD {
            Temperature::Warm
        } else {
            Temperature::Cold
        }
    }
}

/// An open lead ranked for the sales team.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopLead {
    pub enquiry_id: String,
    pub listing_id: String,
    pub listing_title: String,
    pub dealer_id: String,
    pub dealer_name: String,
    pub customer_name: String,
    pub status: EnquiryStatus,
    pub score: u8,
    pub temperature: Temperature,
    pub created_at: String,
}

/// Score an open lead. Closed leads score zero.
pub fn score_lead(
    status: EnquiryStatus,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    listing_interactions: i64,
    has_phone: bool,
) -> u8 {
    let base = match status {
        EnquiryStatus::New => 40,
        EnquiryStatus::Contacted => 30,
        EnquiryStatus::Negotiating => 60,
        EnquiryStatus::Converted | EnquiryStatus::Lost => return 0,
    };

    let age = now.signed_duration_since(created_at);
    let recency = if age < Duration::hours(24) {
        30
    } else if age < Duration::hours(72) {
        15
    } else if age < Duration::days(7) {
        5
    } else {
        0
    };

    let engagement =
        (listing_interactions.max(0) * POINTS_PER_INTERACTION).min(MAX_ENGAGEMENT_POINTS);
    let phone = if has_phone { PHONE_POINTS } else { 0 };

    (base + recency + engagement + phone).clamp(0, 100) as u8
}

/// Rank open leads, highest score first and newest first on ties.
pub fn rank_leads(
    rows: Vec<LeadRow>,
    interactions: &HashMap<String, i64>,
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<TopLead> {
    let mut leads: Vec<TopLead> = rows
        .into_iter()
        .filter(|row| row.enquiry.status.is_open())
        .map(|row| {
            let enquiry = row.enquiry;
            let created = parse_timestamp(&enquiry.created_at).unwrap_or(now);
            let has_phone = enquiry
                .customer_phone
                .as_deref()
                .is_some_and(|p| !p.trim().is_empty());
            let score = score_lead(
                enquiry.status,
                created,
                now,
                interactions.get(&enquiry.listing_id).copied().unwrap_or(0),
                has_phone,
            );
            TopLead {
                enquiry_id: enquiry.id,
                listing_id: enquiry.listing_id,
                listing_title: row.listing_title,
                dealer_id: enquiry.dealer_id,
                dealer_name: row.dealer_name,
                customer_name: enquiry.customer_name,
                status: enquiry.status,
                score,
                temperature: Temperature::from_score(score),
                created_at: enquiry.created_at,
            }
        })
        .collect();

    leads.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    leads.truncate(limit);
    leads
}

/// Dashboard figures for one dealership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DealerMetrics {
    pub dealer_id: String,
    pub dealer_name: String,
    pub active_listings: i64,
    pub inventory_value: i64,
    pub total_enquiries: i64,
    pub recent_enquiries: i64,
    pub converted: i64,
    /// converted / total, 0 when there are no enquiries
    pub conversion_rate: f64,
    pub loan_applications: i64,
}

pub fn dealer_metrics(dealer: &Dealer, counts: &DealerCounts) -> DealerMetrics {
    DealerMetrics {
        dealer_id: dealer.id.clone(),
        dealer_name: dealer.name.clone(),
        active_listings: counts.active_listings,
        inventory_value: counts.inventory_value,
        total_enquiries: counts.enquiries_total,
        recent_enquiries: counts.enquiries_recent,
        converted: counts.converted,
        conversion_rate: ratio(counts.converted, counts.enquiries_total),
        loan_applications: counts.loan_applications,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunnelStep {
    pub event: EventType,
    pub count: i64,
    /// Share of the previous stage that reached this one; absent on the first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunnelSummary {
    pub days: i64,
    pub steps: Vec<FunnelStep>,
    /// listing_view to enquiry_submit
    pub overall_conversion: f64,
}

pub fn funnel_summary(days: i64, counts: &HashMap<EventType, i64>) -> FunnelSummary {
    let count = |event: &EventType| counts.get(event).copied().unwrap_or(0);

    let steps = FUNNEL_STAGES
        .iter()
        .enumerate()
        .map(|(i, event)| FunnelStep {
            event: *event,
            count: count(event),
            conversion: (i > 0).then(|| ratio(count(event), count(&FUNNEL_STAGES[i - 1]))),
        })
        .collect();

    FunnelSummary {
        days,
        steps,
        overall_conversion: ratio(
            count(&EventType::EnquirySubmit),
            count(&EventType::ListingView),
        ),
    }
}

fn ratio(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
