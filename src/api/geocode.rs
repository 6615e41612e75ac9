//! `reverse-geocode`.

use axum::extract::State;

use super::extract::Json;
use super::{success, ApiResult};
use crate::cache::{CacheKey, Resource};
use crate::errors::AppError;
use crate::models::{Place, ReverseGeocodeRequest};
use crate::AppState;

/// POST /functions/reverse-geocode - Resolve a coordinate to a place.
///
/// Results are cached per coordinate rounded to four decimals (about 11 m).
pub async fn reverse_geocode(
    State(state): State<AppState>,
    Json(request): Json<ReverseGeocodeRequest>,
) -> ApiResult<Place> {
    let lat = coordinate(request.lat, "lat", 90.0)?;
    let lng = coordinate(request.lng, "lng", 180.0)?;

    let (lat, lng) = (round4(lat), round4(lng));
    let key = CacheKey::new(Resource::Geocode)
        .param("lat", format!("{:.4}", lat))
        .param("lng", format!("{:.4}", lng));

    let geocoder = state.geocoder.clone();
    let place = state
        .cache
        .fetch(&key, || {
            let geocoder = geocoder.clone();
            async move { geocoder.reverse(lat, lng).await.map_err(AppError::from) }
        })
        .await?;

    success(place)
}

fn coordinate(value: Option<f64>, field: &str, limit: f64) -> Result<f64, AppError> {
    let value = value.ok_or_else(|| AppError::Validation(format!("{} is required", field)))?;
    if !value.is_finite() || value.abs() > limit {
        return Err(AppError::Validation(format!(
            "{} must be between -{} and {}",
            field, limit, limit
        )));
    }
    Ok(value)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
