//! Reverse geocoding: convert coordinates to city and country names.
//! Uses Nominatim (OpenStreetMap) - free, no API key required.

use std::future::Future;
use std::time::Duration;

use qibla_core::ReqwestErrorExt;
use reqwest::Client;
use serde::Deserialize;

use crate::types::{Coordinate, GeocodeError, Place, PlaceName};

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
const REQUEST_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = concat!("qibla/", env!("CARGO_PKG_VERSION"));

/// Place-name lookup for a coordinate.
pub trait ReverseGeocoder: Send + Sync {
    fn lookup(
        &self,
        coordinate: &Coordinate,
    ) -> impl Future<Output = Result<Place, GeocodeError>> + Send;
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    address: Option<NominatimAddress>,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    county: Option<String>,
    country: Option<String>,
}

impl NominatimAddress {
    /// Prefer city > town > village > county for the place name; blank
    /// fields are skipped
    fn into_place(self) -> Place {
        let city = non_blank(self.city)
            .or_else(|| non_blank(self.town))
            .or_else(|| non_blank(self.village))
            .or_else(|| non_blank(self.county));
        Place {
            city: PlaceName::from(city),
            country: PlaceName::from(self.country),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Nominatim-backed reverse geocoder.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

impl NominatimGeocoder {
    /// Geocoder against the public Nominatim instance.
    ///
    /// # Errors
    /// Fails if the HTTP client cannot be built.
    pub fn new() -> Result<Self, GeocodeError> {
        Self::with_options(
            NOMINATIM_URL,
            USER_AGENT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        )
    }

    /// Geocoder against any Nominatim-compatible endpoint.
    ///
    /// # Errors
    /// Fails if the HTTP client cannot be built.
    pub fn with_options(
        base_url: &str,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| GeocodeError::Network(e.into_network_error()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn reverse(&self, coordinate: Coordinate) -> Result<Place, GeocodeError> {
        let url = format!("{}/reverse", self.base_url);
        let latitude = coordinate.latitude().to_string();
        let longitude = coordinate.longitude().to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("format", "json"),
                ("lat", latitude.as_str()),
                ("lon", longitude.as_str()),
                ("addressdetails", "1"),
            ])
            .send()
            .await
            .map_err(|e| GeocodeError::Network(e.into_network_error()))?;

        if !response.status().is_success() {
            tracing::debug!("Reverse geocode returned status {}", response.status());
            return Err(GeocodeError::Status(response.status().as_u16()));
        }

        let body: NominatimResponse = response
            .json()
            .await
            .map_err(|e| GeocodeError::Parse(e.to_string()))?;

        let place = body.address.unwrap_or_default().into_place();
        tracing::info!("Reverse geocoded {} to: {}, {}", coordinate, place.city, place.country);
        Ok(place)
    }
}

impl ReverseGeocoder for NominatimGeocoder {
    fn lookup(
        &self,
        coordinate: &Coordinate,
    ) -> impl Future<Output = Result<Place, GeocodeError>> + Send {
        self.reverse(*coordinate)
    }
}

/// Geocoder used when lookups are turned off; every lookup fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGeocoder;

impl ReverseGeocoder for DisabledGeocoder {
    fn lookup(
        &self,
        _coordinate: &Coordinate,
    ) -> impl Future<Output = Result<Place, GeocodeError>> + Send {
        async { Err(GeocodeError::Parse("reverse geocoding disabled".to_string())) }
    }
}
