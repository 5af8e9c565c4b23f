//! Course records for user-uploaded GPX files.
//!
//! Uploads have no feed entry, so distance and duration come from the track
//! itself: haversine length and a configured running pace.

use crate::errors::AppError;
use crate::models::{CourseLevel, CourseRecord, GeoPoint};
use crate::services::classify::{locate, ReverseGeocoder};
use crate::services::geo::{duration_minutes, max_elevation, min_elevation, total_distance_km};
use crate::services::gpx::parse_track_points;

/// What the uploader supplies alongside the GPX bytes.
#[derive(Debug, Clone)]
pub struct CourseUpload {
    pub name: String,
    pub level: CourseLevel,
    /// Where the storage collaborator keeps the uploaded file.
    pub gpx_path: String,
}

/// Build a course from an uploaded GPX document.
pub async fn build_uploaded_course<R: ReverseGeocoder>(
    upload: CourseUpload,
    gpx: &[u8],
    geocoder: &R,
    speed_kmh: f64,
) -> Result<CourseRecord, AppError> {
    let name = upload.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidUpload("course name is blank".to_string()));
    }

    let track_points = parse_track_points(gpx)?;
    let Some(first) = track_points.first() else {
        return Err(AppError::InvalidUpload(
            "GPX contains no track or route points".to_string(),
        ));
    };

    let start_point = GeoPoint::from(first);
    let distance_km = total_distance_km(&track_points);
    let location = locate(start_point, geocoder).await;

    tracing::info!(
        "Built uploaded course '{}': {:.2} km, {} points, area {}",
        name,
        distance_km,
        track_points.len(),
        location.area
    );

    Ok(CourseRecord {
        external_id: None,
        name: name.to_string(),
        distance_km,
        duration_min: duration_minutes(distance_km, speed_kmh),
        level: upload.level,
        area: location.area,
        themes: location.themes,
        gpx_path: upload.gpx_path,
        start_point,
        min_elevation: min_elevation(&track_points),
        max_elevation: max_elevation(&track_points),
        track_points,
    })
}
