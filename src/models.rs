use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A single point along a course, ordered by `sequence` (1-based, gap-free).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    /// Latitude (WGS84)
    pub lat: f64,
    /// Longitude (WGS84)
    pub lon: f64,
    /// Elevation in metres above sea level
    pub elevation: f64,
    /// Position along the course, starting at 1
    pub sequence: u32,
}

/// A latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl From<&TrackPoint> for GeoPoint {
    fn from(p: &TrackPoint) -> Self {
        Self {
            lat: p.lat,
            lon: p.lon,
        }
    }
}

/// Difficulty level as published by the course feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseLevel {
    Easy,
    Moderate,
    Hard,
}

impl FromStr for CourseLevel {
    type Err = String;

    /// Accepts the feed's numeric codes (`1`..`3`) as well as the level words.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "easy" | "하" => Ok(CourseLevel::Easy),
            "2" | "moderate" | "medium" | "중" => Ok(CourseLevel::Moderate),
            "3" | "hard" | "상" => Ok(CourseLevel::Hard),
            other => Err(format!("unknown course level '{}'", other)),
        }
    }
}

/// Planning zone a course starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Area {
    Downtown,
    Northeast,
    Northwest,
    Southwest,
    Southeast,
    /// Yeouido is administratively part of Yeongdeungpo-gu but treated as its own zone.
    Yeouido,
    /// No zone matched.
    Etc,
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Area::Downtown => "downtown",
            Area::Northeast => "northeast",
            Area::Northwest => "northwest",
            Area::Southwest => "southwest",
            Area::Southeast => "southeast",
            Area::Yeouido => "yeouido",
            Area::Etc => "etc",
        };
        f.write_str(s)
    }
}

/// Non-exclusive scenery tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    HanRiver,
    Mountain,
    Stream,
    Park,
}

/// A running course as handed to the storage collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseRecord {
    /// Feed provider's course index. `None` for user uploads.
    pub external_id: Option<String>,
    pub name: String,
    pub distance_km: f64,
    pub duration_min: i32,
    pub level: CourseLevel,
    pub area: Area,
    pub themes: BTreeSet<Theme>,
    /// Where the GPX came from (feed URL or upload path)
    pub gpx_path: String,
    pub start_point: GeoPoint,
    pub min_elevation: f64,
    pub max_elevation: f64,
    /// Full-resolution track. May be empty when loaded without points.
    #[serde(default)]
    pub track_points: Vec<TrackPoint>,
}

/// Raw course item from the external feed. Nothing here has been validated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub external_id: Option<String>,
    pub name: Option<String>,
    pub distance: Option<String>,
    pub duration: Option<String>,
    pub level: Option<String>,
    /// Free-text locale, e.g. "서울 강남구"
    pub region: Option<String>,
    pub description: Option<String>,
    pub gpx_url: Option<String>,
}

/// One page of the course feed.
#[derive(Debug, Clone, Default)]
pub struct FeedPage {
    /// Total number of items the feed reports across all pages
    pub total_count: usize,
    pub items: Vec<FeedItem>,
}

/// A persisted course paired with its replacement from the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseUpdate {
    pub existing: CourseRecord,
    pub incoming: CourseRecord,
}

/// Insert/update/delete sets produced by reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    pub to_insert: Vec<CourseRecord>,
    pub to_update: Vec<CourseUpdate>,
    pub to_delete: Vec<CourseRecord>,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}
