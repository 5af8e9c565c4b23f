//! Course-list feed client (Korea Tourism Organization "Durunubi" API).
//!
//! Fetches course pages and the GPX files they link to. The API wraps its
//! payload in a `response.header` / `response.body` envelope; an empty page
//! comes back with `items` as an empty string rather than an object.

use serde::Deserialize;
use serde_json::Value;

use crate::errors::AppError;
use crate::models::{FeedItem, FeedPage};
use crate::services::reconcile::{FeedSource, GpxSource};

const COURSE_LIST_PATH: &str = "/courseList";
const SUCCESS_CODE: &str = "0000";
const MOBILE_APP: &str = "course-sync";

/// Client for the course feed and GPX downloads.
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

// --- Feed JSON envelope ---

#[derive(Debug, Deserialize)]
struct FeedEnvelope {
    response: FeedResponse,
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    header: FeedHeader,
    body: Option<FeedBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedHeader {
    result_code: String,
    result_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedBody {
    #[serde(default)]
    items: Value,
    #[serde(default)]
    total_count: Value,
}

impl FeedClient {
    pub fn new(base_url: &str, service_key: &str) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        })
    }
}

impl FeedSource for FeedClient {
    async fn fetch_page(&self, page_no: u32, page_size: u32) -> Result<FeedPage, AppError> {
        let url = format!("{}{}", self.base_url, COURSE_LIST_PATH);
        let page_no_str = page_no.to_string();
        let page_size_str = page_size.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("serviceKey", self.service_key.as_str()),
                ("pageNo", page_no_str.as_str()),
                ("numOfRows", page_size_str.as_str()),
                ("MobileOS", "ETC"),
                ("MobileApp", MOBILE_APP),
                ("_type", "json"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::ExternalServiceError(format!(
                "feed returned HTTP {} for page {}",
                response.status(),
                page_no
            )));
        }

        let body = response.text().await?;
        parse_feed_page(&body)
    }
}

impl GpxSource for FeedClient {
    async fn fetch_gpx(&self, url: &str) -> Result<Vec<u8>, AppError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::ExternalServiceError(format!(
                "GPX download returned HTTP {} for {}",
                response.status(),
                url
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Parse one feed page body.
pub(crate) fn parse_feed_page(body: &str) -> Result<FeedPage, AppError> {
    let envelope: FeedEnvelope = serde_json::from_str(body)
        .map_err(|e| AppError::BadFeedResponse(format!("unexpected page body: {}", e)))?;
    let response = envelope.response;

    if response.header.result_code != SUCCESS_CODE {
        return Err(AppError::BadFeedResponse(format!(
            "result code {} ({})",
            response.header.result_code,
            response.header.result_msg.unwrap_or_default()
        )));
    }

    let Some(body) = response.body else {
        return Err(AppError::BadFeedResponse("missing body".to_string()));
    };

    let total_count = value_to_string(&body.total_count)
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| AppError::BadFeedResponse("missing totalCount".to_string()))?;

    // `items.item` is an array, a lone object for single-item pages, or absent.
    let items = match body.items.get("item") {
        Some(Value::Array(list)) => list.iter().map(feed_item_from_value).collect(),
        Some(obj @ Value::Object(_)) => vec![feed_item_from_value(obj)],
        _ => Vec::new(),
    };

    Ok(FeedPage { total_count, items })
}

fn feed_item_from_value(v: &Value) -> FeedItem {
    let field = |key: &str| v.get(key).and_then(value_to_string);
    FeedItem {
        external_id: field("crsIdx"),
        name: field("crsKorNm"),
        distance: field("crsDstnc"),
        duration: field("crsTotlRqrmHour"),
        level: field("crsLevel"),
        region: field("sigun"),
        description: field("crsContents"),
        gpx_url: field("gpxpath"),
    }
}

/// Feed fields are usually strings but numbers show up too.
fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
