//! Listing browse, search and create.

use axum::{extract::State, Extension};
use chrono::{Datelike, Utc};

use super::extract::{Json, Query};
use super::dealers::dealer_in_scope;
use super::{optional, success, ApiResult};
use crate::access::Module;
use crate::auth::Caller;
use crate::cache::{CacheKey, Mutation, Resource};
use crate::errors::AppError;
use crate::models::{CreateListingRequest, Listing, ListingFilter, ListingStatus};
use crate::search::SearchFilter;
use crate::AppState;

/// Maximum number of listings per page.
const MAX_PAGE_SIZE: usize = 100;
const OLDEST_MODEL_YEAR: i32 = 1980;

/// GET /api/listings - Browse active listings, with full-text search when `q` is set.
pub async fn list_listings(
    State(state): State<AppState>,
    Query(filter): Query<ListingFilter>,
) -> ApiResult<Vec<Listing>> {
    let limit = filter.limit.clamp(1, MAX_PAGE_SIZE);
    let offset = filter.offset;
    let q = optional(filter.q);
    let city = optional(filter.city);
    let dealer_id = optional(filter.dealer_id);

    let key = CacheKey::new(Resource::Listings)
        .opt_param("q", q.as_deref())
        .opt_param("city", city.as_deref())
        .opt_param("dealer", dealer_id.as_deref())
        .param("limit", limit)
        .param("offset", offset);

    let listings = state
        .cache
        .fetch(&key, || {
            let state = state.clone();
            let (q, city, dealer_id) = (q.clone(), city.clone(), dealer_id.clone());
            async move {
                match q {
                    Some(q) => {
                        search_listings(&state, &q, city.as_deref(), dealer_id.as_deref(), limit, offset)
                            .await
                    }
                    None => {
                        state
                            .repo
                            .list_listings(city.as_deref(), dealer_id.as_deref(), limit, offset)
                            .await
                    }
                }
            }
        })
        .await?;

    success(listings)
}

async fn search_listings(
    state: &AppState,
    q: &str,
    city: Option<&str>,
    dealer_id: Option<&str>,
    limit: usize,
    offset: usize,
) -> Result<Vec<Listing>, AppError> {
    let filter = SearchFilter { city, dealer_id };
    let hits = state.search.search(q, &filter, limit, offset)?;
    tracing::debug!(
        query = q,
        hits = hits.len(),
        top_score = hits.first().map(|h| h.score),
        "Listing search"
    );

    let mut listings = Vec::with_capacity(hits.len());
    for hit in hits {
        let Some(listing) = state.repo.get_listing(&hit.listing_id).await? else {
            continue;
        };
        if listing.status == ListingStatus::Active {
            listings.push(listing);
        }
    }
    Ok(listings)
}

/// POST /api/listings - Create a listing for a dealership.
pub async fn create_listing(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<CreateListingRequest>,
) -> ApiResult<Listing> {
    caller.require_module(Module::Listings)?;

    for (value, field) in [
        (&request.title, "title"),
        (&request.make, "make"),
        (&request.model, "model"),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{} is required", field)));
        }
    }
    if request.price <= 0 {
        return Err(AppError::Validation(
            "price must be greater than zero".to_string(),
        ));
    }
    if request.km_driven < 0 {
        return Err(AppError::Validation("kmDriven cannot be negative".to_string()));
    }
    let newest_year = Utc::now().year() + 1;
    if !(OLDEST_MODEL_YEAR..=newest_year).contains(&request.year) {
        return Err(AppError::Validation(format!(
            "year must be between {} and {}",
            OLDEST_MODEL_YEAR, newest_year
        )));
    }

    dealer_in_scope(&state, &caller, &request.dealer_id).await?;

    // Indexed inside the write so the invalidation lands after the index sees it.
    let listing = state
        .cache
        .mutate(Mutation::CreateListing, async {
            let listing = state.repo.create_listing(&request).await?;
            if let Err(e) = state.search.index_listing(&listing).await {
                tracing::warn!("Failed to index listing {}: {}", listing.id, e);
            }
            Ok(listing)
        })
        .await?;

    tracing::info!(listing = %listing.id, dealer = %listing.dealer_id, "Listing created");
    success(listing)
}
