//! Loan application handlers: create, status updates, upload links and
//! document uploads.

use axum::extract::State;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde::Serialize;

use super::extract::Json;
use super::notify::{notify_dealer_best_effort, whatsapp_dealer};
use super::{optional, required, success, ApiResult};
use crate::cache::Mutation;
use crate::db::{hours_after, parse_timestamp, timestamp};
use crate::effects::{best_effort, SideEffect};
use crate::errors::AppError;
use crate::models::{
    CreateLoanApplicationRequest, GenerateUploadLinkRequest, LoanApplication, LoanDocument,
    LoanStatus, NewLoanApplication, NewNotification, NotificationKind, UpdateLoanStatusRequest,
    UploadLink, UploadLoanDocumentRequest,
};
use crate::AppState;

const MIN_TENURE_MONTHS: i32 = 6;
const MAX_TENURE_MONTHS: i32 = 84;
const DEFAULT_TENURE_MONTHS: i32 = 60;

/// Accepted document types.
const ALLOWED_CONTENT_TYPES: [&str; 3] = ["application/pdf", "image/jpeg", "image/png"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanApplicationCreated {
    pub application: LoanApplication,
    pub notification: SideEffect,
    pub whatsapp: SideEffect,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanStatusUpdated {
    pub application: LoanApplication,
    pub notification: SideEffect,
}

/// POST /functions/create-loan-application
pub async fn create_loan_application(
    State(state): State<AppState>,
    Json(request): Json<CreateLoanApplicationRequest>,
) -> ApiResult<LoanApplicationCreated> {
    let listing_id = required(request.listing_id, "listingId")?;
    let applicant_name = required(request.applicant_name, "applicantName")?;
    let phone = required(request.phone, "phone")?;

    let loan_amount = request
        .loan_amount
        .ok_or_else(|| AppError::Validation("loanAmount is required".to_string()))?;
    if loan_amount <= 0 {
        return Err(AppError::Validation(
            "loanAmount must be greater than zero".to_string(),
        ));
    }

    let tenure_months = request.tenure_months.unwrap_or(DEFAULT_TENURE_MONTHS);
    if !(MIN_TENURE_MONTHS..=MAX_TENURE_MONTHS).contains(&tenure_months) {
        return Err(AppError::Validation(format!(
            "tenureMonths must be between {} and {}",
            MIN_TENURE_MONTHS, MAX_TENURE_MONTHS
        )));
    }

    if request.monthly_income.is_some_and(|income| income < 0) {
        return Err(AppError::Validation(
            "monthlyIncome cannot be negative".to_string(),
        ));
    }

    let listing = state
        .repo
        .get_listing(&listing_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Listing {} not found", listing_id)))?;

    let new = NewLoanApplication {
        listing_id: listing.id.clone(),
        dealer_id: listing.dealer_id.clone(),
        applicant_name,
        phone,
        email: optional(request.email),
        loan_amount,
        tenure_months,
        monthly_income: request.monthly_income,
        employment_type: optional(request.employment_type),
        applicant_user_id: optional(request.applicant_user_id),
    };

    let application = state
        .cache
        .mutate(
            Mutation::CreateLoanApplication,
            state.repo.create_loan_application(&new),
        )
        .await?;

    tracing::info!(
        application = %application.id,
        dealer = %application.dealer_id,
        "Loan application submitted"
    );

    let body = format!(
        "{} applied for a loan of Rs {} over {} months on {}",
        application.applicant_name, application.loan_amount, application.tenure_months, listing.title
    );
    let notification =
        notify_dealer_best_effort(&state, &listing.dealer_id, NotificationKind::Loan, &body).await;

    let whatsapp = match state.repo.get_dealer(&listing.dealer_id).await {
        Ok(Some(dealer)) => whatsapp_dealer(&state, &dealer, NotificationKind::Loan, &body).await,
        Ok(None) => SideEffect::skipped("dealer not found"),
        Err(e) => {
            tracing::warn!("Dealer lookup for WhatsApp alert failed: {}", e);
            SideEffect::Failed(e.to_string())
        }
    };

    success(LoanApplicationCreated {
        application,
        notification,
        whatsapp,
    })
}

/// POST /functions/update-loan-status
pub async fn update_loan_status(
    State(state): State<AppState>,
    Json(request): Json<UpdateLoanStatusRequest>,
) -> ApiResult<LoanStatusUpdated> {
    let application_id = required(request.application_id, "applicationId")?;
    let raw_status = required(request.status, "status")?;
    let next = LoanStatus::parse(&raw_status)
        .ok_or_else(|| AppError::Validation(format!("Unknown loan status: {}", raw_status)))?;

    let current = state
        .repo
        .get_loan_application(&application_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Loan application {} not found", application_id))
        })?;

    if !current.status.can_transition_to(next) {
        return Err(AppError::Conflict(format!(
            "Cannot move a loan application from {} to {}",
            current.status.as_str(),
            next.as_str()
        )));
    }

    let application = state
        .cache
        .mutate(
            Mutation::UpdateLoanStatus,
            state
                .repo
                .update_loan_status(&application_id, current.status, next),
        )
        .await?;

    tracing::info!(
        application = %application.id,
        from = current.status.as_str(),
        to = next.as_str(),
        "Loan status updated"
    );

    let notification = match application.applicant_user_id.as_deref() {
        None => SideEffect::skipped("applicant has no account"),
        Some(user_id) => {
            let mut body = format!(
                "Your loan application is now {}",
                next.as_str().replace('_', " ")
            );
            if let Some(note) = optional(request.note) {
                body.push_str(&format!(": {}", note));
            }
            best_effort(
                "applicant-notification",
                state.cache.mutate(
                    Mutation::NotifyDealer,
                    state.repo.create_notification(&NewNotification {
                        recipient_id: user_id.to_string(),
                        kind: NotificationKind::LoanStatus,
                        body,
                    }),
                ),
            )
            .await
        }
    };

    success(LoanStatusUpdated {
        application,
        notification,
    })
}

/// POST /functions/generate-loan-upload-link
pub async fn generate_loan_upload_link(
    State(state): State<AppState>,
    Json(request): Json<GenerateUploadLinkRequest>,
) -> ApiResult<UploadLink> {
    let application_id = required(request.application_id, "applicationId")?;

    let application = state
        .repo
        .get_loan_application(&application_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Loan application {} not found", application_id))
        })?;

    if application.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "Loan application is already {}",
            application.status.as_str()
        )));
    }

    let expires_at = hours_after(Utc::now(), state.config.upload_link_ttl_hours)?;
    let link = state
        .cache
        .mutate(
            Mutation::CreateUploadLink,
            state.repo.create_upload_link(&application.id, expires_at),
        )
        .await?;

    success(UploadLink {
        url: format!(
            "{}/loan-documents/upload?token={}",
            state.config.public_url, link.token
        ),
        token: link.token,
        application_id: link.application_id,
        expires_at: link.expires_at,
    })
}

/// POST /functions/upload-loan-document
pub async fn upload_loan_document(
    State(state): State<AppState>,
    Json(request): Json<UploadLoanDocumentRequest>,
) -> ApiResult<LoanDocument> {
    let token = required(request.token, "token")?;
    let document_type = required(request.document_type, "documentType")?;
    let file_name = required(request.file_name, "fileName")?;
    let content_type = required(request.content_type, "contentType")?.to_ascii_lowercase();
    let content = required(request.content_base64, "contentBase64")?;

    let link = state
        .repo
        .get_upload_link(&token)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Upload link is invalid".to_string()))?;

    let expired = parse_timestamp(&link.expires_at).map_or(true, |at| at <= Utc::now());
    if expired {
        return Err(AppError::Unauthorized("Upload link has expired".to_string()));
    }

    if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
        return Err(AppError::Validation(format!(
            "Unsupported contentType {}; expected one of {}",
            content_type,
            ALLOWED_CONTENT_TYPES.join(", ")
        )));
    }

    let bytes = decode_content(&content)?;
    if bytes.is_empty() {
        return Err(AppError::Validation("Document is empty".to_string()));
    }
    if bytes.len() > state.config.max_document_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "Document is {} bytes; the limit is {}",
            bytes.len(),
            state.config.max_document_bytes
        )));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let dir = state.config.document_dir.join(&link.application_id);
    let path = dir.join(format!("{}-{}", id, sanitize_file_name(&file_name)));

    tokio::fs::create_dir_all(&dir).await?;
    tokio::fs::write(&path, &bytes).await?;

    let document = LoanDocument {
        id,
        application_id: link.application_id.clone(),
        document_type,
        file_name,
        content_type,
        size_bytes: bytes.len() as i64,
        storage_path: path.to_string_lossy().into_owned(),
        uploaded_at: timestamp(Utc::now()),
    };

    let stored = state
        .cache
        .mutate(
            Mutation::UploadLoanDocument,
            state.repo.create_loan_document(&document),
        )
        .await;

    if let Err(e) = stored {
        if let Err(cleanup) = tokio::fs::remove_file(&path).await {
            tracing::warn!("Failed to remove orphaned document {:?}: {}", path, cleanup);
        }
        return Err(e);
    }

    tracing::info!(
        application = %document.application_id,
        size = document.size_bytes,
        "Loan document uploaded"
    );

    success(document)
}

/// Decode base64 content, accepting a `data:<type>;base64,` prefix.
fn decode_content(content: &str) -> Result<Vec<u8>, AppError> {
    let payload = match content.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => content,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| AppError::Validation(format!("contentBase64 is not valid base64: {}", e)))
}

/// Reduce a client-supplied file name to a safe single path component.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.chars().take(100).collect()
    }
}
