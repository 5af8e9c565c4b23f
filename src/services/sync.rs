//! Course sync runner.
//!
//! Wraps one reconciliation in the steps around it:
//! - load persisted courses from the store
//! - reconcile against the feed
//! - derive the display route and the LLM prompt for every changed course
//! - hand plan and routes to the store
//!
//! Only one run may be active at a time; an overlapping trigger is skipped.
//! State is in-memory (`Arc<RwLock<SyncState>>`) so callers can report on it.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::errors::AppError;
use crate::models::{CourseRecord, ReconciliationPlan, TrackPoint};
use crate::services::budget::fit_rendered;
use crate::services::classify::ReverseGeocoder;
use crate::services::prompt::{course_description_prompt, serialize_route, TokenEstimator};
use crate::services::reconcile::{
    FeedReconciler, FeedSource, GpxSource, ReconcileSettings, ReconcileStats,
};
use crate::services::simplify::simplify;
use crate::services::store::{CourseRoutes, CourseStore};

/// Minimum sleep between periodic runs (seconds).
const SYNC_MIN_INTERVAL_SECS: u64 = 60;

/// Simplification settings for derived routes.
#[derive(Debug, Clone)]
pub struct RouteSettings {
    pub display_tolerance_deg: f64,
    pub prompt_max_tokens: usize,
    pub prompt_initial_tolerance_deg: f64,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            display_tolerance_deg: 0.0001,
            prompt_max_tokens: 4000,
            prompt_initial_tolerance_deg: 0.00001,
        }
    }
}

/// Outcome of one completed run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub partial: bool,
    pub aborted: bool,
    /// Changed courses whose route did not fit the prompt budget
    pub prompt_failures: usize,
}

/// Runner status, readable while a run is in progress.
#[derive(Debug, Clone, Serialize)]
pub struct SyncState {
    pub running: bool,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub total_runs: u64,
    /// "ok", "skipped", or "error: ..."
    pub last_result: String,
    pub last_summary: Option<SyncSummary>,
}

impl SyncState {
    pub fn new() -> Self {
        Self {
            running: false,
            last_started_at: None,
            last_completed_at: None,
            last_duration_ms: None,
            next_run_at: None,
            total_runs: 0,
            last_result: "pending".to_string(),
            last_summary: None,
        }
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared sync state handle.
pub type SharedSyncState = Arc<RwLock<SyncState>>;

/// Runs reconciliation end to end, one run at a time.
pub struct SyncRunner<F, G, R, S, E> {
    feed: F,
    gpx: G,
    geocoder: R,
    store: S,
    estimator: E,
    reconcile_settings: ReconcileSettings,
    route_settings: RouteSettings,
    run_lock: Mutex<()>,
    state: SharedSyncState,
}

impl<F, G, R, S, E> SyncRunner<F, G, R, S, E>
where
    F: FeedSource,
    G: GpxSource,
    R: ReverseGeocoder,
    S: CourseStore,
    E: TokenEstimator,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        feed: F,
        gpx: G,
        geocoder: R,
        store: S,
        estimator: E,
        reconcile_settings: ReconcileSettings,
        route_settings: RouteSettings,
    ) -> Self {
        Self {
            feed,
            gpx,
            geocoder,
            store,
            estimator,
            reconcile_settings,
            route_settings,
            run_lock: Mutex::new(()),
            state: Arc::new(RwLock::new(SyncState::new())),
        }
    }

    pub fn state(&self) -> SharedSyncState {
        self.state.clone()
    }

    /// Run one sync. Returns `Ok(None)` when another run is already active.
    pub async fn run_once(&self) -> Result<Option<SyncSummary>, AppError> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            tracing::warn!("Sync already running, skipping this trigger");
            self.state.write().await.last_result = "skipped".to_string();
            return Ok(None);
        };

        let started = Utc::now();
        {
            let mut s = self.state.write().await;
            s.running = true;
            s.last_started_at = Some(started);
        }

        let result = self.sync().await;

        let duration_ms = (Utc::now() - started).num_milliseconds().max(0) as u64;
        {
            let mut s = self.state.write().await;
            s.running = false;
            s.last_completed_at = Some(Utc::now());
            s.last_duration_ms = Some(duration_ms);
            s.total_runs += 1;
            match &result {
                Ok(summary) => {
                    s.last_result = "ok".to_string();
                    s.last_summary = Some(summary.clone());
                }
                Err(e) => s.last_result = format!("error: {}", e),
            }
        }

        match &result {
            Ok(summary) => tracing::info!(
                "Sync complete in {}ms: {} inserted, {} updated, {} deleted",
                duration_ms,
                summary.inserted,
                summary.updated,
                summary.deleted
            ),
            Err(e) => tracing::error!("Sync failed after {}ms: {}", duration_ms, e),
        }

        result.map(Some)
    }

    /// Run forever, sleeping `interval_secs` between runs.
    pub async fn run_loop(&self, interval_secs: u64) {
        let interval = interval_secs.max(SYNC_MIN_INTERVAL_SECS);
        tracing::info!("Sync loop started, interval {}s", interval);
        loop {
            // Errors are recorded in the state and logged by run_once.
            let _ = self.run_once().await;
            self.state.write().await.next_run_at = next_run_after(Utc::now(), interval);
            tokio::time::sleep(std::time::Duration::from_secs(interval)).await;
        }
    }

    async fn sync(&self) -> Result<SyncSummary, AppError> {
        let existing = self.store.load_courses().await?;
        tracing::info!("Loaded {} persisted courses", existing.len());

        let reconciler = FeedReconciler::new(
            &self.feed,
            &self.gpx,
            &self.geocoder,
            self.reconcile_settings.clone(),
        );
        let (plan, stats) = reconciler.reconcile_with_stats(&existing).await;

        let routes = self.derive_routes(&plan);
        let prompt_failures = routes.iter().filter(|r| r.prompt.is_none()).count();

        if !plan.is_empty() {
            self.store.apply_plan(&plan, &routes).await?;
        } else {
            tracing::info!("Nothing to apply");
        }

        Ok(summarize(&plan, &stats, prompt_failures))
    }

    /// Display route and prompt for every inserted or updated course.
    fn derive_routes(&self, plan: &ReconciliationPlan) -> Vec<CourseRoutes> {
        plan.to_insert
            .iter()
            .chain(plan.to_update.iter().map(|u| &u.incoming))
            .map(|course| derive_course_routes(course, &self.estimator, &self.route_settings))
            .collect()
    }
}

/// Derive both simplified representations of one course.
///
/// A route that cannot fit the prompt budget gets no prompt and a recorded error;
/// the display route is always produced.
pub fn derive_course_routes<E: TokenEstimator + ?Sized>(
    course: &CourseRecord,
    estimator: &E,
    settings: &RouteSettings,
) -> CourseRoutes {
    let display_route = simplify(&course.track_points, settings.display_tolerance_deg);

    let render = |points: &[TrackPoint]| course_description_prompt(course, &serialize_route(points));
    let (prompt, prompt_error) = match fit_rendered(
        &course.track_points,
        render,
        estimator,
        settings.prompt_max_tokens,
        settings.prompt_initial_tolerance_deg,
    ) {
        Ok(points) => (Some(render(&points)), None),
        Err(e) => {
            tracing::warn!(
                "No prompt for course {:?} ({}): {}",
                course.external_id,
                course.name,
                e
            );
            (None, Some(e.to_string()))
        }
    };

    CourseRoutes {
        external_id: course.external_id.clone(),
        gpx_path: course.gpx_path.clone(),
        display_route,
        prompt,
        prompt_error,
    }
}

/// `None` when the interval is too large to represent as a timestamp.
fn next_run_after(now: DateTime<Utc>, interval_secs: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(interval_secs).ok()?;
    now.checked_add_signed(Duration::try_seconds(secs)?)
}

fn summarize(
    plan: &ReconciliationPlan,
    stats: &ReconcileStats,
    prompt_failures: usize,
) -> SyncSummary {
    SyncSummary {
        inserted: plan.to_insert.len(),
        updated: plan.to_update.len(),
        deleted: plan.to_delete.len(),
        skipped: stats.skipped,
        partial: stats.partial,
        aborted: stats.aborted,
        prompt_failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Area, CourseLevel, FeedItem, FeedPage, GeoPoint};
    use crate::services::classify::AddressInfo;
    use crate::services::prompt::CharRatioEstimator;
    use std::collections::BTreeSet;
    use std::sync::Mutex as StdMutex;

    struct OnePageFeed;

    impl FeedSource for OnePageFeed {
        async fn fetch_page(&self, _page_no: u32, _page_size: u32) -> Result<FeedPage, AppError> {
            Ok(FeedPage {
                total_count: 1,
                items: vec![FeedItem {
                    external_id: Some("S1".to_string()),
                    name: Some("Seoul Forest loop".to_string()),
                    distance: Some("4.2".to_string()),
                    duration: Some("40".to_string()),
                    level: Some("1".to_string()),
                    region: Some("서울 성동구".to_string()),
                    description: None,
                    gpx_url: Some("https://feed.example/S1.gpx".to_string()),
                }],
            })
        }
    }

    impl GpxSource for OnePageFeed {
        async fn fetch_gpx(&self, _url: &str) -> Result<Vec<u8>, AppError> {
            let mut gpx = String::from("<gpx><trk><trkseg>");
            for i in 0..50 {
                gpx.push_str(&format!(
                    r#"<trkpt lat="{}" lon="{}"><ele>{}</ele></trkpt>"#,
                    37.54 + (i as f64 * 0.5).sin() * 0.002,
                    127.04 + i as f64 * 0.0004,
                    15 + i % 3
                ));
            }
            gpx.push_str("</trkseg></trk></gpx>");
            Ok(gpx.into_bytes())
        }
    }

    struct SeongdongGeocoder;

    impl ReverseGeocoder for SeongdongGeocoder {
        async fn lookup(&self, _lon: f64, _lat: f64) -> Result<AddressInfo, AppError> {
            Ok(AddressInfo {
                district_name: Some("성동구".to_string()),
                sub_district_name: Some("성수1가1동".to_string()),
            })
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        courses: StdMutex<Vec<CourseRecord>>,
        applied: StdMutex<Vec<(ReconciliationPlan, Vec<CourseRoutes>)>>,
    }

    impl CourseStore for MemoryStore {
        async fn load_courses(&self) -> Result<Vec<CourseRecord>, AppError> {
            Ok(self.courses.lock().unwrap().clone())
        }

        async fn apply_plan(
            &self,
            plan: &ReconciliationPlan,
            routes: &[CourseRoutes],
        ) -> Result<(), AppError> {
            let current = self.courses.lock().unwrap().clone();
            *self.courses.lock().unwrap() = crate::services::store::apply_to(current, plan);
            self.applied
                .lock()
                .unwrap()
                .push((plan.clone(), routes.to_vec()));
            Ok(())
        }
    }

    fn runner(
        estimator: CharRatioEstimator,
    ) -> SyncRunner<OnePageFeed, OnePageFeed, SeongdongGeocoder, MemoryStore, CharRatioEstimator>
    {
        SyncRunner::new(
            OnePageFeed,
            OnePageFeed,
            SeongdongGeocoder,
            MemoryStore::default(),
            estimator,
            ReconcileSettings::default(),
            RouteSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_run_once_applies_then_idles() {
        let runner = runner(CharRatioEstimator::default());

        let first = runner.run_once().await.unwrap().unwrap();
        assert_eq!(first.inserted, 1);
        assert_eq!(first.prompt_failures, 0);
        assert_eq!(runner.store.courses.lock().unwrap().len(), 1);

        let second = runner.run_once().await.unwrap().unwrap();
        assert_eq!(second.inserted + second.updated + second.deleted, 0);
        // The empty plan is not applied
        assert_eq!(runner.store.applied.lock().unwrap().len(), 1);

        let state = runner.state();
        let s = state.read().await;
        assert_eq!(s.total_runs, 2);
        assert_eq!(s.last_result, "ok");
        assert!(!s.running);
    }

    #[tokio::test]
    async fn test_routes_are_derived_for_inserted_courses() {
        let runner = runner(CharRatioEstimator::default());
        runner.run_once().await.unwrap();

        let applied = runner.store.applied.lock().unwrap();
        let routes = &applied[0].1;
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].external_id.as_deref(), Some("S1"));
        assert!(routes[0].display_route.len() >= 2);
        assert!(routes[0].prompt.as_deref().unwrap().contains("Seoul Forest loop"));
    }

    #[tokio::test]
    async fn test_overlapping_run_is_skipped() {
        let runner = runner(CharRatioEstimator::default());
        let _held = runner.run_lock.lock().await;
        assert!(runner.run_once().await.unwrap().is_none());
        assert_eq!(runner.state().read().await.last_result, "skipped");
    }

    fn sample_course(points: Vec<TrackPoint>) -> CourseRecord {
        CourseRecord {
            external_id: Some("X".to_string()),
            name: "Sample".to_string(),
            distance_km: 1.0,
            duration_min: 7,
            level: CourseLevel::Easy,
            area: Area::Etc,
            themes: BTreeSet::new(),
            gpx_path: "x.gpx".to_string(),
            start_point: GeoPoint::default(),
            min_elevation: 0.0,
            max_elevation: 0.0,
            track_points: points,
        }
    }

    #[test]
    fn test_next_run_after_overflow_is_none() {
        let now = Utc::now();
        assert_eq!(next_run_after(now, 60), Some(now + Duration::seconds(60)));
        assert_eq!(next_run_after(now, u64::MAX), None);
        assert_eq!(next_run_after(now, 9_300_000_000_000_000), None);
    }

    #[test]
    fn test_prompt_sent_stays_within_budget() {
        let points: Vec<TrackPoint> = (1..=400)
            .map(|i| TrackPoint {
                lat: 37.5 + (i as f64 * 0.7).sin() * 0.01,
                lon: 127.0 + i as f64 * 0.0005,
                elevation: 20.0 + (i as f64 * 0.3).cos() * 5.0,
                sequence: i,
            })
            .collect();
        let course = sample_course(points);
        let settings = RouteSettings {
            prompt_max_tokens: 400,
            ..RouteSettings::default()
        };
        let lines = |text: &str| text.lines().count();
        let routes = derive_course_routes(&course, &lines, &settings);
        let prompt = routes.prompt.unwrap();
        assert!(lines(&prompt) <= 400, "prompt is {} lines", lines(&prompt));
        assert!(prompt.contains("Sample"));
    }

    #[test]
    fn test_budget_failure_recorded_not_fatal() {
        let points: Vec<TrackPoint> = (1..=20)
            .map(|i| TrackPoint {
                lat: 37.0 + i as f64 * 0.001,
                lon: 127.0 + (i % 2) as f64 * 0.001,
                elevation: 0.0,
                sequence: i,
            })
            .collect();
        let course = sample_course(points);
        let settings = RouteSettings {
            prompt_max_tokens: 1,
            ..RouteSettings::default()
        };
        let routes = derive_course_routes(&course, &CharRatioEstimator::default(), &settings);
        assert!(routes.prompt.is_none());
        assert!(routes.prompt_error.unwrap().contains("two points"));
        assert!(!routes.display_route.is_empty());
    }
}
