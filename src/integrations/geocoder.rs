//! Reverse geocoding against a Nominatim-compatible endpoint.

use async_trait::async_trait;
use serde::Deserialize;

use super::{Geocoder, IntegrationError};
use crate::models::Place;

const USER_AGENT: &str = concat!("carmart-backend/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    address: Address,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Address {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    state_district: Option<String>,
    state: Option<String>,
    postcode: Option<String>,
    country: Option<String>,
}

impl ReverseResponse {
    fn into_place(self) -> Result<Place, IntegrationError> {
        if let Some(error) = self.error {
            return Err(IntegrationError::Rejected(error));
        }
        let address = self.address;
        Ok(Place {
            display_name: self.display_name.unwrap_or_default(),
            city: address
                .city
                .or(address.town)
                .or(address.village)
                .or(address.state_district),
            state: address.state,
            postcode: address.postcode,
            country: address.country,
        })
    }
}

pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str) -> Result<Self, IntegrationError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse(&self, lat: f64, lng: f64) -> Result<Place, IntegrationError> {
        let response = self
            .client
            .get(format!("{}/reverse", self.base_url))
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", lat.to_string()),
                ("lon", lng.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IntegrationError::Transport(format!(
                "geocoder returned {}",
                response.status()
            )));
        }

        response.json::<ReverseResponse>().await?.into_place()
    }
}
