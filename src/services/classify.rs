//! Area and theme classification for a course start point.
//!
//! One reverse-geocoding lookup per course yields a district (gu) and a
//! sub-district (dong) name. The district selects the planning zone and any
//! number of theme tags from static membership tables. Nothing here fails:
//! an unknown district is `Area::Etc` with no themes.

use std::collections::BTreeSet;
use std::future::Future;

use crate::errors::AppError;
use crate::models::{Area, GeoPoint, Theme};

/// Administrative names returned by the reverse geocoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressInfo {
    pub district_name: Option<String>,
    pub sub_district_name: Option<String>,
}

/// Reverse-geocoding collaborator.
pub trait ReverseGeocoder {
    fn lookup(
        &self,
        lon: f64,
        lat: f64,
    ) -> impl Future<Output = Result<AddressInfo, AppError>> + Send;
}

/// Area and themes resolved for one point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub area: Area,
    pub themes: BTreeSet<Theme>,
    /// The geocoder call failed, so `area` and `themes` are placeholders.
    pub lookup_failed: bool,
}

const AREA_TABLE: &[(Area, &[&str])] = &[
    (Area::Downtown, &["종로구", "중구", "용산구"]),
    (
        Area::Northeast,
        &[
            "성동구", "광진구", "동대문구", "중랑구", "성북구", "강북구", "도봉구", "노원구",
        ],
    ),
    (Area::Northwest, &["은평구", "서대문구", "마포구"]),
    (
        Area::Southwest,
        &["양천구", "강서구", "구로구", "금천구", "영등포구", "동작구", "관악구"],
    ),
    (Area::Southeast, &["서초구", "강남구", "송파구", "강동구"]),
];

const THEME_TABLE: &[(Theme, &[&str])] = &[
    (
        Theme::HanRiver,
        &[
            "강서구", "마포구", "영등포구", "용산구", "동작구", "성동구", "광진구", "서초구",
            "강남구", "송파구", "강동구",
        ],
    ),
    (
        Theme::Mountain,
        &["도봉구", "노원구", "강북구", "성북구", "종로구", "은평구", "관악구"],
    ),
    (Theme::Stream, &["종로구", "중구", "성동구", "동대문구", "양천구", "구로구"]),
    (Theme::Park, &["마포구", "용산구", "송파구", "광진구", "강동구"]),
];

/// District whose sub-district prefix forms its own zone.
const OVERRIDE_DISTRICT: &str = "영등포구";
const OVERRIDE_SUB_DISTRICT_PREFIX: &str = "여의";

/// Zone for a geocoded address. Never fails.
pub fn area_for(address: &AddressInfo) -> Area {
    let Some(district) = address.district_name.as_deref().map(str::trim) else {
        return Area::Etc;
    };

    let in_override = address
        .sub_district_name
        .as_deref()
        .is_some_and(|sub| sub.trim().starts_with(OVERRIDE_SUB_DISTRICT_PREFIX));
    if district == OVERRIDE_DISTRICT && in_override {
        return Area::Yeouido;
    }

    AREA_TABLE
        .iter()
        .find(|(_, districts)| districts.contains(&district))
        .map(|(area, _)| *area)
        .unwrap_or(Area::Etc)
}

/// Every theme bucket the district belongs to.
pub fn themes_for(district_name: &str) -> BTreeSet<Theme> {
    let district = district_name.trim();
    THEME_TABLE
        .iter()
        .filter(|(_, districts)| districts.contains(&district))
        .map(|(theme, _)| *theme)
        .collect()
}

/// Look up the zone of a coordinate.
pub async fn classify<G: ReverseGeocoder>(lat: f64, lon: f64, geocoder: &G) -> Area {
    locate(GeoPoint { lat, lon }, geocoder).await.area
}

/// Resolve area and themes with a single geocoder call.
///
/// A failed lookup is logged and treated as an unknown district, with
/// `lookup_failed` set so callers holding an earlier result can keep it.
pub async fn locate<G: ReverseGeocoder>(point: GeoPoint, geocoder: &G) -> Classification {
    let mut lookup_failed = false;
    let address = match geocoder.lookup(point.lon, point.lat).await {
        Ok(address) => address,
        Err(e) => {
            lookup_failed = true;
            tracing::warn!(
                "Reverse geocoding failed for ({}, {}): {}",
                point.lat,
                point.lon,
                e
            );
            AddressInfo::default()
        }
    };

    let area = area_for(&address);
    let themes = address
        .district_name
        .as_deref()
        .map(themes_for)
        .unwrap_or_default();

    if area == Area::Etc {
        tracing::debug!(
            "No area for ({}, {}) district={:?}",
            point.lat,
            point.lon,
            address.district_name
        );
    }

    Classification {
        area,
        themes,
        lookup_failed,
    }
}
