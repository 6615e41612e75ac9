//! Database repository for all marketplace reads and writes.
//!
//! Uses prepared statements, and transactions where a write spans statements.

use std::collections::HashMap;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};

use crate::access::RoleSet;
use crate::errors::AppError;
use crate::models::{
    CreateDealerRequest, CreateEnquiryRequest, CreateListingRequest, Dealer, Enquiry,
    EnquiryStatus, EventType, Interaction, Listing, ListingStatus, LoanApplication, LoanDocument,
    LoanStatus, NewLoanApplication, NewNotification, Notification, NotificationKind,
    PaymentOrder, Session,
};

/// Format a timestamp so that string order matches time order.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn now() -> String {
    timestamp(Utc::now())
}

/// The instant `hours` from `from`, or an error when it cannot be represented.
pub fn hours_after(from: DateTime<Utc>, hours: i64) -> Result<DateTime<Utc>, AppError> {
    Duration::try_hours(hours)
        .and_then(|ttl| from.checked_add_signed(ttl))
        .ok_or_else(|| AppError::Internal(format!("Expiry {} hours out is out of range", hours)))
}

/// Parse a stored timestamp.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// An upload link as stored.
#[derive(Debug, Clone)]
pub struct StoredUploadLink {
    pub token: String,
    pub application_id: String,
    pub expires_at: String,
}

/// Raw per-dealer counts used to build dashboard metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DealerCounts {
    pub active_listings: i64,
    pub inventory_value: i64,
    pub enquiries_total: i64,
    pub enquiries_recent: i64,
    pub converted: i64,
    pub loan_applications: i64,
}

/// An open lead joined with its listing and dealer names.
#[derive(Debug, Clone)]
pub struct LeadRow {
    pub enquiry: Enquiry,
    pub listing_title: String,
    pub dealer_name: String,
}

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== SESSION OPERATIONS ====================

    /// Issue a session for a user.
    pub async fn create_session(&self, user_id: &str, ttl_hours: i64) -> Result<Session, AppError> {
        let token = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        let created = Utc::now();
        let session = Session {
            token,
            user_id: user_id.to_string(),
            created_at: timestamp(created),
            expires_at: timestamp(hours_after(created, ttl_hours)?),
        };

        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&session.token)
        .bind(&session.user_id)
        .bind(&session.created_at)
        .bind(&session.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(session)
    }

    /// Get an unexpired session by token.
    pub async fn get_active_session(&self, token: &str) -> Result<Option<Session>, AppError> {
        let row = sqlx::query(
            "SELECT token, user_id, created_at, expires_at FROM sessions WHERE token = ? AND expires_at > ?",
        )
        .bind(token)
        .bind(now())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(|row| Session {
            token: row.get("token"),
            user_id: row.get("user_id"),
            created_at: row.get("created_at"),
            expires_at: row.get("expires_at"),
        }))
    }

    /// Delete a session. Returns whether one existed.
    pub async fn delete_session(&self, token: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== ROLE OPERATIONS ====================

    /// Get the roles granted to a user.
    pub async fn get_user_roles(&self, user_id: &str) -> Result<RoleSet, AppError> {
        let rows = sqlx::query("SELECT role FROM user_roles WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        let tags: Vec<String> = rows.iter().map(|row| row.get("role")).collect();
        Ok(RoleSet::from_tags(tags))
    }

    /// Replace the roles granted to a user.
    pub async fn set_user_roles(&self, user_id: &str, roles: RoleSet) -> Result<RoleSet, AppError> {
        let now = now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for tag in roles.to_tags() {
            sqlx::query("INSERT INTO user_roles (user_id, role, granted_at) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(tag)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(roles)
    }

    // ==================== DEALER OPERATIONS ====================

    /// Onboard a dealership.
    pub async fn create_dealer(&self, request: &CreateDealerRequest) -> Result<Dealer, AppError> {
        let dealer = Dealer {
            id: uuid::Uuid::new_v4().to_string(),
            name: request.name.trim().to_string(),
            phone: request.phone.clone(),
            whatsapp_opt_in: request.whatsapp_opt_in,
            city: request.city.clone(),
            owner_user_id: request.owner_user_id.clone(),
            created_at: now(),
        };

        sqlx::query(
            "INSERT INTO dealers (id, name, phone, whatsapp_opt_in, city, owner_user_id, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&dealer.id)
        .bind(&dealer.name)
        .bind(&dealer.phone)
        .bind(dealer.whatsapp_opt_in as i32)
        .bind(&dealer.city)
        .bind(&dealer.owner_user_id)
        .bind(&dealer.created_at)
        .execute(&self.pool)
        .await?;

        Ok(dealer)
    }

    /// Get a dealer by ID.
    pub async fn get_dealer(&self, id: &str) -> Result<Option<Dealer>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, phone, whatsapp_opt_in, city, owner_user_id, created_at FROM dealers WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(dealer_from_row))
    }

    /// List the dealerships a user owns.
    pub async fn list_dealers_owned_by(&self, user_id: &str) -> Result<Vec<Dealer>, AppError> {
        let rows = sqlx::query(
            "SELECT id, name, phone, whatsapp_opt_in, city, owner_user_id, created_at FROM dealers WHERE owner_user_id = ? ORDER BY name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(dealer_from_row).collect())
    }

    /// Counts behind a dealer's dashboard.
    pub async fn dealer_counts(
        &self,
        dealer_id: &str,
        recent_since: DateTime<Utc>,
    ) -> Result<DealerCounts, AppError> {
        let listings = sqlx::query(
            "SELECT COUNT(*) AS n, COALESCE(SUM(price), 0) AS value FROM listings WHERE dealer_id = ? AND status = 'active'",
        )
        .bind(dealer_id)
        .fetch_one(&self.pool)
        .await?;

        let enquiries = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COALESCE(SUM(CASE WHEN created_at >= ? THEN 1 ELSE 0 END), 0) AS recent,
                   COALESCE(SUM(CASE WHEN status = 'converted' THEN 1 ELSE 0 END), 0) AS converted
            FROM enquiries WHERE dealer_id = ?
            "#,
        )
        .bind(timestamp(recent_since))
        .bind(dealer_id)
        .fetch_one(&self.pool)
        .await?;

        let loans = sqlx::query("SELECT COUNT(*) AS n FROM loan_applications WHERE dealer_id = ?")
            .bind(dealer_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(DealerCounts {
            active_listings: listings.get("n"),
            inventory_value: listings.get("value"),
            enquiries_total: enquiries.get("total"),
            enquiries_recent: enquiries.get("recent"),
            converted: enquiries.get("converted"),
            loan_applications: loans.get("n"),
        })
    }

    // ==================== LISTING OPERATIONS ====================

    /// Create a new listing.
    pub async fn create_listing(&self, request: &CreateListingRequest) -> Result<Listing, AppError> {
        let listing = Listing {
            id: uuid::Uuid::new_v4().to_string(),
            dealer_id: request.dealer_id.clone(),
            title: request.title.trim().to_string(),
            make: request.make.trim().to_string(),
            model: request.model.trim().to_string(),
            year: request.year,
            price: request.price,
            km_driven: request.km_driven,
            fuel_type: request.fuel_type.clone(),
            city: request.city.clone(),
            description: request.description.clone(),
            status: ListingStatus::Active,
            created_at: now(),
        };

        sqlx::query(
            "INSERT INTO listings (id, dealer_id, title, make, model, year, price, km_driven, fuel_type, city, description, status, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&listing.id)
        .bind(&listing.dealer_id)
        .bind(&listing.title)
        .bind(&listing.make)
        .bind(&listing.model)
        .bind(listing.year)
        .bind(listing.price)
        .bind(listing.km_driven)
        .bind(&listing.fuel_type)
        .bind(&listing.city)
        .bind(&listing.description)
        .bind(listing.status.as_str())
        .bind(&listing.created_at)
        .execute(&self.pool)
        .await?;

        Ok(listing)
    }

    /// Get a listing by ID.
    pub async fn get_listing(&self, id: &str) -> Result<Option<Listing>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM listings WHERE id = ?", LISTING_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(listing_from_row))
    }

    /// List active listings, newest first, optionally narrowed by city or dealer.
    pub async fn list_listings(
        &self,
        city: Option<&str>,
        dealer_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Listing>, AppError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM listings
            WHERE status = 'active'
              AND (? IS NULL OR city = ? COLLATE NOCASE)
              AND (? IS NULL OR dealer_id = ?)
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
            LISTING_COLUMNS
        ))
        .bind(city)
        .bind(city)
        .bind(dealer_id)
        .bind(dealer_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(listing_from_row).collect())
    }

    /// All active listings, for rebuilding the search index.
    pub async fn list_active_listings(&self) -> Result<Vec<Listing>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM listings WHERE status = 'active' ORDER BY created_at",
            LISTING_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(listing_from_row).collect())
    }

    // ==================== ENQUIRY OPERATIONS ====================

    /// Record a customer enquiry against a listing's dealer.
    pub async fn create_enquiry(
        &self,
        listing: &Listing,
        request: &CreateEnquiryRequest,
    ) -> Result<Enquiry, AppError> {
        let now = now();
        let enquiry = Enquiry {
            id: uuid::Uuid::new_v4().to_string(),
            listing_id: listing.id.clone(),
            dealer_id: listing.dealer_id.clone(),
            customer_name: request.customer_name.trim().to_string(),
            customer_phone: request.customer_phone.clone(),
            message: request.message.clone(),
            status: EnquiryStatus::New,
            created_at: now.clone(),
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO enquiries (id, listing_id, dealer_id, customer_name, customer_phone, message, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&enquiry.id)
        .bind(&enquiry.listing_id)
        .bind(&enquiry.dealer_id)
        .bind(&enquiry.customer_name)
        .bind(&enquiry.customer_phone)
        .bind(&enquiry.message)
        .bind(enquiry.status.as_str())
        .bind(&enquiry.created_at)
        .bind(&enquiry.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(enquiry)
    }

    /// Get an enquiry by ID.
    pub async fn get_enquiry(&self, id: &str) -> Result<Option<Enquiry>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM enquiries WHERE id = ?", ENQUIRY_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(enquiry_from_row))
    }

    /// Move an enquiry to a new pipeline status.
    pub async fn update_enquiry_status(
        &self,
        id: &str,
        status: EnquiryStatus,
    ) -> Result<Enquiry, AppError> {
        let result = sqlx::query("UPDATE enquiries SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Enquiry {} not found", id)));
        }

        self.get_enquiry(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Enquiry {} not found", id)))
    }

    /// Open enquiries with their listing title and dealer name.
    pub async fn list_open_leads(&self) -> Result<Vec<LeadRow>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT e.id, e.listing_id, e.dealer_id, e.customer_name, e.customer_phone, e.message,
                   e.status, e.created_at, e.updated_at,
                   l.title AS listing_title, d.name AS dealer_name
            FROM enquiries e
            JOIN listings l ON l.id = e.listing_id
            JOIN dealers d ON d.id = e.dealer_id
            WHERE e.status IN ('new', 'contacted', 'negotiating')
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| LeadRow {
                enquiry: enquiry_from_row(row),
                listing_title: row.get("listing_title"),
                dealer_name: row.get("dealer_name"),
            })
            .collect())
    }

    // ==================== LOAN OPERATIONS ====================

    /// Insert a new loan application in `submitted` state.
    pub async fn create_loan_application(
        &self,
        new: &NewLoanApplication,
    ) -> Result<LoanApplication, AppError> {
        let now = now();
        let application = LoanApplication {
            id: uuid::Uuid::new_v4().to_string(),
            listing_id: new.listing_id.clone(),
            dealer_id: new.dealer_id.clone(),
            applicant_name: new.applicant_name.clone(),
            phone: new.phone.clone(),
            email: new.email.clone(),
            loan_amount: new.loan_amount,
            tenure_months: new.tenure_months,
            monthly_income: new.monthly_income,
            employment_type: new.employment_type.clone(),
            applicant_user_id: new.applicant_user_id.clone(),
            status: LoanStatus::Submitted,
            created_at: now.clone(),
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO loan_applications (id, listing_id, dealer_id, applicant_name, phone, email, loan_amount, tenure_months, monthly_income, employment_type, applicant_user_id, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&application.id)
        .bind(&application.listing_id)
        .bind(&application.dealer_id)
        .bind(&application.applicant_name)
        .bind(&application.phone)
        .bind(&application.email)
        .bind(application.loan_amount)
        .bind(application.tenure_months)
        .bind(application.monthly_income)
        .bind(&application.employment_type)
        .bind(&application.applicant_user_id)
        .bind(application.status.as_str())
        .bind(&application.created_at)
        .bind(&application.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(application)
    }

    /// Get a loan application by ID.
    pub async fn get_loan_application(&self, id: &str) -> Result<Option<LoanApplication>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM loan_applications WHERE id = ?",
            LOAN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(loan_from_row))
    }

    /// Move an application from `from` to `to`.
    ///
    /// The update is conditional on the stored status still being `from`, so two
    /// concurrent reviewers cannot both apply a transition.
    pub async fn update_loan_status(
        &self,
        id: &str,
        from: LoanStatus,
        to: LoanStatus,
    ) -> Result<LoanApplication, AppError> {
        let result = sqlx::query(
            "UPDATE loan_applications SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(now())
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "Loan application {} is no longer {}",
                id,
                from.as_str()
            )));
        }

        self.get_loan_application(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan application {} not found", id)))
    }

    /// List loan applications, newest first.
    pub async fn list_loan_applications(
        &self,
        status: Option<LoanStatus>,
    ) -> Result<Vec<LoanApplication>, AppError> {
        let status = status.map(|s| s.as_str());
        let rows = sqlx::query(&format!(
            "SELECT {} FROM loan_applications WHERE (? IS NULL OR status = ?) ORDER BY created_at DESC",
            LOAN_COLUMNS
        ))
        .bind(status)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(loan_from_row).collect())
    }

    /// Store a new upload token for an application.
    pub async fn create_upload_link(
        &self,
        application_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<StoredUploadLink, AppError> {
        let link = StoredUploadLink {
            token: uuid::Uuid::new_v4().simple().to_string(),
            application_id: application_id.to_string(),
            expires_at: timestamp(expires_at),
        };

        sqlx::query(
            "INSERT INTO loan_upload_links (token, application_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&link.token)
        .bind(&link.application_id)
        .bind(now())
        .bind(&link.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(link)
    }

    /// Look up an upload token, expired or not.
    pub async fn get_upload_link(&self, token: &str) -> Result<Option<StoredUploadLink>, AppError> {
        let row = sqlx::query(
            "SELECT token, application_id, expires_at FROM loan_upload_links WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(|row| StoredUploadLink {
            token: row.get("token"),
            application_id: row.get("application_id"),
            expires_at: row.get("expires_at"),
        }))
    }

    /// Record a stored document.
    pub async fn create_loan_document(&self, document: &LoanDocument) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO loan_documents (id, application_id, document_type, file_name, content_type, size_bytes, storage_path, uploaded_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&document.id)
        .bind(&document.application_id)
        .bind(&document.document_type)
        .bind(&document.file_name)
        .bind(&document.content_type)
        .bind(document.size_bytes)
        .bind(&document.storage_path)
        .bind(&document.uploaded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// List the documents uploaded for an application.
    pub async fn list_loan_documents(
        &self,
        application_id: &str,
    ) -> Result<Vec<LoanDocument>, AppError> {
        let rows = sqlx::query(
            "SELECT id, application_id, document_type, file_name, content_type, size_bytes, storage_path, uploaded_at FROM loan_documents WHERE application_id = ? ORDER BY uploaded_at",
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| LoanDocument {
                id: row.get("id"),
                application_id: row.get("application_id"),
                document_type: row.get("document_type"),
                file_name: row.get("file_name"),
                content_type: row.get("content_type"),
                size_bytes: row.get("size_bytes"),
                storage_path: row.get("storage_path"),
                uploaded_at: row.get("uploaded_at"),
            })
            .collect())
    }

    // ==================== NOTIFICATION OPERATIONS ====================

    /// Insert an unread notification.
    pub async fn create_notification(
        &self,
        new: &NewNotification,
    ) -> Result<Notification, AppError> {
        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            recipient_id: new.recipient_id.clone(),
            kind: new.kind,
            title: new.kind.title().to_string(),
            body: new.body.clone(),
            read: false,
            created_at: now(),
        };

        sqlx::query(
            "INSERT INTO notifications (id, recipient_id, kind, title, body, read, created_at) VALUES (?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&notification.id)
        .bind(&notification.recipient_id)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(&notification.created_at)
        .execute(&self.pool)
        .await?;

        Ok(notification)
    }

    /// Notifications for a recipient, newest first.
    pub async fn list_notifications(&self, recipient_id: &str) -> Result<Vec<Notification>, AppError> {
        let rows = sqlx::query(
            "SELECT id, recipient_id, kind, title, body, read, created_at FROM notifications WHERE recipient_id = ? ORDER BY created_at DESC",
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let kind: String = row.get("kind");
                let read: i32 = row.get("read");
                Notification {
                    id: row.get("id"),
                    recipient_id: row.get("recipient_id"),
                    kind: NotificationKind::parse(&kind).unwrap_or_default(),
                    title: row.get("title"),
                    body: row.get("body"),
                    read: read != 0,
                    created_at: row.get("created_at"),
                }
            })
            .collect())
    }

    // ==================== INTERACTION OPERATIONS ====================

    /// Record a tracked event.
    pub async fn create_interaction(&self, interaction: &Interaction) -> Result<(), AppError> {
        let metadata = interaction
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT INTO interactions (id, session_id, user_id, event_type, entity_type, entity_id, metadata, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&interaction.id)
        .bind(&interaction.session_id)
        .bind(&interaction.user_id)
        .bind(interaction.event_type.as_str())
        .bind(&interaction.entity_type)
        .bind(&interaction.entity_id)
        .bind(&metadata)
        .bind(&interaction.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Count events per type since `since`.
    pub async fn count_events_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<HashMap<EventType, i64>, AppError> {
        let rows = sqlx::query(
            "SELECT event_type, COUNT(*) AS n FROM interactions WHERE created_at >= ? GROUP BY event_type",
        )
        .bind(timestamp(since))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let event: String = row.get("event_type");
                EventType::parse(&event).map(|event| (event, row.get::<i64, _>("n")))
            })
            .collect())
    }

    /// Count listing-scoped events per listing since `since`.
    pub async fn count_listing_interactions_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<HashMap<String, i64>, AppError> {
        let rows = sqlx::query(
            "SELECT entity_id, COUNT(*) AS n FROM interactions WHERE entity_type = 'listing' AND entity_id IS NOT NULL AND created_at >= ? GROUP BY entity_id",
        )
        .bind(timestamp(since))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get("entity_id"), row.get("n")))
            .collect())
    }

    // ==================== PAYMENT OPERATIONS ====================

    /// Store an order created at the gateway.
    pub async fn create_payment_order(&self, order: &PaymentOrder) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO payment_orders (id, gateway_order_id, dealer_id, plan, amount_paise, currency, receipt, status, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&order.id)
        .bind(&order.gateway_order_id)
        .bind(&order.dealer_id)
        .bind(&order.plan)
        .bind(order.amount_paise)
        .bind(&order.currency)
        .bind(&order.receipt)
        .bind(&order.status)
        .bind(&order.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// Helper functions for row conversion

const LISTING_COLUMNS: &str = "id, dealer_id, title, make, model, year, price, km_driven, fuel_type, city, description, status, created_at";

const ENQUIRY_COLUMNS: &str = "id, listing_id, dealer_id, customer_name, customer_phone, message, status, created_at, updated_at";

const LOAN_COLUMNS: &str = "id, listing_id, dealer_id, applicant_name, phone, email, loan_amount, tenure_months, monthly_income, employment_type, applicant_user_id, status, created_at, updated_at";

fn dealer_from_row(row: &sqlx::sqlite::SqliteRow) -> Dealer {
    let whatsapp_opt_in: i32 = row.get("whatsapp_opt_in");
    Dealer {
        id: row.get("id"),
        name: row.get("name"),
        phone: row.get("phone"),
        whatsapp_opt_in: whatsapp_opt_in != 0,
        city: row.get("city"),
        owner_user_id: row.get("owner_user_id"),
        created_at: row.get("created_at"),
    }
}

fn listing_from_row(row: &sqlx::sqlite::SqliteRow) -> Listing {
    let status: String = row.get("status");
    Listing {
        id: row.get("id"),
        dealer_id: row.get("dealer_id"),
        title: row.get("title"),
        make: row.get("make"),
        model: row.get("model"),
        year: row.get("year"),
        price: row.get("price"),
        km_driven: row.get("km_driven"),
        fuel_type: row.get("fuel_type"),
        city: row.get("city"),
        description: row.get("description"),
        status: ListingStatus::parse(&status).unwrap_or(ListingStatus::Archived),
        created_at: row.get("created_at"),
    }
}

fn enquiry_from_row(row: &sqlx::sqlite::SqliteRow) -> Enquiry {
    let status: String = row.get("status");
    Enquiry {
        id: row.get("id"),
        listing_id: row.get("listing_id"),
        dealer_id: row.get("dealer_id"),
        customer_name: row.get("customer_name"),
        customer_phone: row.get("customer_phone"),
        message: row.get("message"),
        status: EnquiryStatus::parse(&status).unwrap_or(EnquiryStatus::New),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn loan_from_row(row: &sqlx::sqlite::SqliteRow) -> LoanApplication {
    let status: String = row.get("status");
    LoanApplication {
        id: row.get("id"),
        listing_id: row.get("listing_id"),
        dealer_id: row.get("dealer_id"),
        applicant_name: row.get("applicant_name"),
        phone: row.get("phone"),
        email: row.get("email"),
        loan_amount: row.get("loan_amount"),
        tenure_months: row.get("tenure_months"),
        monthly_income: row.get("monthly_income"),
        employment_type: row.get("employment_type"),
        applicant_user_id: row.get("applicant_user_id"),
        status: LoanStatus::parse(&status).unwrap_or(LoanStatus::Submitted),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
