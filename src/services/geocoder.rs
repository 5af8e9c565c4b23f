//! Reverse-geocoding client (Kakao Local `coord2regioncode`).
//!
//! See: https://developers.kakao.com/docs/latest/en/local/dev-guide#coord-to-district

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;

use crate::errors::AppError;
use crate::services::classify::{AddressInfo, ReverseGeocoder};

const REGION_CODE_PATH: &str = "/v2/local/geo/coord2regioncode.json";

/// Client for the reverse-geocoding API.
#[derive(Debug, Clone)]
pub struct GeocoderClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

// --- API response types ---

#[derive(Debug, Deserialize)]
struct RegionResponse {
    #[serde(default)]
    documents: Vec<RegionDocument>,
}

#[derive(Debug, Deserialize)]
struct RegionDocument {
    /// "H" = administrative dong, "B" = legal dong
    region_type: Option<String>,
    region_2depth_name: Option<String>,
    region_3depth_name: Option<String>,
}

impl GeocoderClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

impl ReverseGeocoder for GeocoderClient {
    async fn lookup(&self, lon: f64, lat: f64) -> Result<AddressInfo, AppError> {
        let url = format!("{}{}", self.base_url, REGION_CODE_PATH);

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("KakaoAK {}", self.api_key))
                .map_err(|e| AppError::Config(format!("Invalid geocoder API key: {}", e)))?,
        );

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .query(&[("x", lon.to_string()), ("y", lat.to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::ExternalServiceError(format!(
                "geocoder returned HTTP {}",
                response.status()
            )));
        }

        let body: RegionResponse = response.json().await.map_err(|e| {
            AppError::ExternalServiceError(format!("geocoder JSON parse error: {}", e))
        })?;

        Ok(pick_address(body.documents))
    }
}

/// Prefer the administrative ("H") region, fall back to the first document.
fn pick_address(documents: Vec<RegionDocument>) -> AddressInfo {
    let position = documents
        .iter()
        .position(|d| d.region_type.as_deref() == Some("H"))
        .unwrap_or(0);

    documents
        .into_iter()
        .nth(position)
        .map(|d| AddressInfo {
            district_name: d.region_2depth_name.filter(|s| !s.trim().is_empty()),
            sub_district_name: d.region_3depth_name.filter(|s| !s.trim().is_empty()),
        })
        .unwrap_or_default()
}
