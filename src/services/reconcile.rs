//! Feed reconciliation.
//!
//! Pages through the course feed, turns each in-region item into a candidate
//! `CourseRecord` (downloading and parsing its GPX, classifying its start
//! point) and diffs the candidates against the persisted courses.
//!
//! The result is a `ReconciliationPlan`; nothing here touches storage.
//!
//! Failure policy:
//! - a bad item (missing field, unreadable GPX) is logged and skipped
//! - a failure on the first page returns an empty plan
//! - a failure on a later page keeps what was built but plans no deletions,
//!   since courses on the unread pages would otherwise look deleted

use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;

use crate::errors::AppError;
use crate::helpers::{nearly_equal, parse_distance_km, parse_duration_min, required_str};
use crate::models::{
    CourseLevel, CourseRecord, CourseUpdate, FeedItem, FeedPage, GeoPoint, ReconciliationPlan,
};
use crate::services::classify::{locate, ReverseGeocoder};
use crate::services::geo::{max_elevation, min_elevation};
use crate::services::gpx::parse_track_points;

/// Paginated course feed collaborator.
pub trait FeedSource {
    fn fetch_page(
        &self,
        page_no: u32,
        page_size: u32,
    ) -> impl Future<Output = Result<FeedPage, AppError>> + Send;
}

/// Source of raw GPX bytes for a feed item's URL.
pub trait GpxSource {
    fn fetch_gpx(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, AppError>> + Send;
}

/// Tunables for a reconciliation run.
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub page_size: u32,
    /// Items whose region field does not start with this are ignored.
    pub region_prefix: String,
    /// Concurrent GPX downloads. Results are merged in feed order regardless.
    pub gpx_fetch_concurrency: usize,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            page_size: 50,
            region_prefix: "서울".to_string(),
            gpx_fetch_concurrency: 8,
        }
    }
}

/// Counters describing one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub pages_fetched: u32,
    pub items_fetched: usize,
    pub out_of_region: usize,
    pub duplicates: usize,
    pub skipped: usize,
    /// Pagination stopped early on an error; deletions were withheld.
    pub partial: bool,
    /// The first page could not be read; the plan is empty.
    pub aborted: bool,
}

/// Feed items that survived the region filter, keyed by external id.
struct CollectedFeed {
    items: BTreeMap<String, FeedItem>,
    partial: bool,
}

/// A built course and whether its area lookup failed.
struct Candidate {
    course: CourseRecord,
    lookup_failed: bool,
}

/// Diffs the external course feed against persisted courses.
pub struct FeedReconciler<'a, F, G, R> {
    feed: &'a F,
    gpx: &'a G,
    geocoder: &'a R,
    settings: ReconcileSettings,
}

impl<'a, F, G, R> FeedReconciler<'a, F, G, R>
where
    F: FeedSource,
    G: GpxSource,
    R: ReverseGeocoder,
{
    pub fn new(feed: &'a F, gpx: &'a G, geocoder: &'a R, settings: ReconcileSettings) -> Self {
        Self {
            feed,
            gpx,
            geocoder,
            settings,
        }
    }

    /// Build the insert/update/delete plan for `existing`.
    pub async fn reconcile(&self, existing: &[CourseRecord]) -> ReconciliationPlan {
        self.reconcile_with_stats(existing).await.0
    }

    pub async fn reconcile_with_stats(
        &self,
        existing: &[CourseRecord],
    ) -> (ReconciliationPlan, ReconcileStats) {
        let mut stats = ReconcileStats::default();

        let Some(collected) = self.collect_feed(&mut stats).await else {
            stats.aborted = true;
            return (ReconciliationPlan::default(), stats);
        };
        stats.partial = collected.partial;

        let seen: HashSet<String> = collected.items.keys().cloned().collect();

        let concurrency = self.settings.gpx_fetch_concurrency.max(1);
        let candidates: Vec<Option<Candidate>> = stream::iter(collected.items.into_values())
            .map(|item| self.build_candidate(item))
            .buffered(concurrency)
            .collect()
            .await;

        let existing_by_id: HashMap<&str, &CourseRecord> = existing
            .iter()
            .filter_map(|c| c.external_id.as_deref().map(|id| (id, c)))
            .collect();

        let mut plan = ReconciliationPlan::default();
        for candidate in candidates {
            let Some(Candidate {
                course: mut incoming,
                lookup_failed,
            }) = candidate
            else {
                stats.skipped += 1;
                continue;
            };
            let id = incoming.external_id.as_deref().unwrap_or_default();
            match existing_by_id.get(id) {
                Some(current) => {
                    // A geocoder outage must not look like an area change
                    if lookup_failed {
                        incoming.area = current.area;
                        incoming.themes = current.themes.clone();
                    }
                    let changed = changed_fields(current, &incoming);
                    if !changed.is_empty() {
                        tracing::info!("Course {} changed: {}", id, changed.join(", "));
                        plan.to_update.push(CourseUpdate {
                            existing: (*current).clone(),
                            incoming,
                        });
                    }
                }
                None => {
                    tracing::info!(
                        "Course {} is new ({} points)",
                        id,
                        incoming.track_points.len()
                    );
                    plan.to_insert.push(incoming);
                }
            }
        }

        if stats.partial {
            tracing::warn!(
                "Feed pagination stopped early, withholding deletions for this run"
            );
        } else {
            plan.to_delete = existing
                .iter()
                .filter(|c| {
                    c.external_id
                        .as_deref()
                        .is_some_and(|id| !seen.contains(id))
                })
                .cloned()
                .collect();
        }

        tracing::info!(
            "Reconciled {} feed items over {} pages: {} inserts, {} updates, {} deletes \
             ({} skipped, {} out of region, {} duplicates)",
            stats.items_fetched,
            stats.pages_fetched,
            plan.to_insert.len(),
            plan.to_update.len(),
            plan.to_delete.len(),
            stats.skipped,
            stats.out_of_region,
            stats.duplicates,
        );

        (plan, stats)
    }

    /// Page through the feed and keep in-region items, last occurrence winning.
    ///
    /// Returns `None` when the first page is unusable.
    async fn collect_feed(&self, stats: &mut ReconcileStats) -> Option<CollectedFeed> {
        let page_size = self.settings.page_size.max(1);
        let mut items: BTreeMap<String, FeedItem> = BTreeMap::new();
        let mut partial = false;
        let mut page_no: u32 = 1;

        loop {
            let page = match self.feed.fetch_page(page_no, page_size).await {
                Ok(page) => page,
                Err(e) if page_no == 1 => {
                    tracing::warn!("Feed sync aborted, first page failed: {}", e);
                    return None;
                }
                Err(e) => {
                    tracing::warn!("Feed page {} failed, stopping pagination: {}", page_no, e);
                    partial = true;
                    break;
                }
            };

            if page.items.is_empty() {
                if page_no == 1 {
                    tracing::warn!("Feed sync aborted, first page returned no items");
                    return None;
                }
                tracing::debug!("Feed page {} is empty, stopping pagination", page_no);
                break;
            }

            stats.pages_fetched += 1;
            stats.items_fetched += page.items.len();

            for item in page.items {
                self.ingest(item, &mut items, stats);
            }

            if stats.items_fetched >= page.total_count {
                break;
            }
            page_no += 1;
        }

        Some(CollectedFeed { items, partial })
    }

    fn ingest(
        &self,
        item: FeedItem,
        items: &mut BTreeMap<String, FeedItem>,
        stats: &mut ReconcileStats,
    ) {
        let in_region = item
            .region
            .as_deref()
            .is_some_and(|r| r.trim().starts_with(&self.settings.region_prefix));
        if !in_region {
            stats.out_of_region += 1;
            return;
        }

        let Ok(id) = required_str("external id", item.external_id.as_deref()) else {
            tracing::warn!("Skipping feed item without an external id: {:?}", item.name);
            stats.skipped += 1;
            return;
        };
        let id = id.to_string();

        if items.insert(id.clone(), item).is_some() {
            tracing::warn!("Duplicate feed item {}, keeping the later occurrence", id);
            stats.duplicates += 1;
        }
    }

    /// Turn a feed item into a full course record, or `None` if it must be skipped.
    async fn build_candidate(&self, item: FeedItem) -> Option<Candidate> {
        let id = item.external_id.clone().unwrap_or_default();
        match self.try_build_candidate(item).await {
            Ok(candidate) => Some(candidate),
            Err(reason) => {
                tracing::warn!("Skipping feed item {}: {}", id, reason);
                None
            }
        }
    }

    async fn try_build_candidate(&self, item: FeedItem) -> Result<Candidate, String> {
        let external_id = required_str("external id", item.external_id.as_deref())?.to_string();
        let name = required_str("name", item.name.as_deref())?.to_string();
        let distance_km = parse_distance_km(item.distance.as_deref())?;
        let duration_min = parse_duration_min(item.duration.as_deref())?;
        let level: CourseLevel = required_str("level", item.level.as_deref())?.parse()?;
        let gpx_path = required_str("gpx url", item.gpx_url.as_deref())?.to_string();

        let bytes = self
            .gpx
            .fetch_gpx(&gpx_path)
            .await
            .map_err(|e| format!("GPX download failed: {}", e))?;
        let track_points =
            parse_track_points(&bytes).map_err(|e| format!("GPX unreadable: {}", e))?;
        let Some(first) = track_points.first() else {
            return Err("GPX has no track points".to_string());
        };

        let start_point = GeoPoint::from(first);
        let location = locate(start_point, self.geocoder).await;

        let course = CourseRecord {
            external_id: Some(external_id),
            name,
            distance_km,
            duration_min,
            level,
            area: location.area,
            themes: location.themes,
            gpx_path,
            start_point,
            min_elevation: min_elevation(&track_points),
            max_elevation: max_elevation(&track_points),
            track_points,
        };
        Ok(Candidate {
            course,
            lookup_failed: location.lookup_failed,
        })
    }
}

/// Names of the diffed fields that differ between the stored and incoming course.
pub fn changed_fields(existing: &CourseRecord, incoming: &CourseRecord) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if existing.name != incoming.name {
        changed.push("name");
    }
    if !nearly_equal(existing.distance_km, incoming.distance_km) {
        changed.push("distance");
    }
    if existing.duration_min != incoming.duration_min {
        changed.push("duration");
    }
    if existing.level != incoming.level {
        changed.push("level");
    }
    if existing.area != incoming.area {
        changed.push("area");
    }
    if existing.gpx_path != incoming.gpx_path {
        changed.push("gpx path");
    }
    changed
}
