// Course Sync v0.1
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use course_sync::config::AppConfig;
use course_sync::errors::AppError;
use course_sync::models::{CourseLevel, ReconciliationPlan};
use course_sync::services::feed::FeedClient;
use course_sync::services::geocoder::GeocoderClient;
use course_sync::services::prompt::CharRatioEstimator;
use course_sync::services::reconcile::ReconcileSettings;
use course_sync::services::store::{CourseStore, JsonFileStore};
use course_sync::services::sync::{derive_course_routes, RouteSettings, SyncRunner};
use course_sync::services::upload::{build_uploaded_course, CourseUpload};

const USAGE: &str = "usage: course-sync [upload <gpx-file> <name> [level]]";

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "course_sync=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match args.first().map(String::as_str) {
        None => sync(AppConfig::from_env()).await,
        Some("upload") => upload(AppConfig::from_env(), &args[1..]).await,
        Some(other) => Err(AppError::Config(format!(
            "unknown command '{}'\n{}",
            other, USAGE
        ))),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Reconcile the feed once, or forever when an interval is configured.
async fn sync(config: Result<AppConfig, AppError>) -> Result<(), AppError> {
    let config = config?;

    let feed = FeedClient::new(&config.feed_base_url, &config.feed_service_key)?;
    let geocoder = GeocoderClient::new(&config.geocoder_base_url, &config.geocoder_api_key)?;
    let store = JsonFileStore::new(&config.course_store_path);

    let runner = SyncRunner::new(
        feed.clone(),
        feed,
        geocoder,
        store,
        CharRatioEstimator::default(),
        ReconcileSettings {
            page_size: config.feed_page_size,
            region_prefix: config.target_region_prefix.clone(),
            gpx_fetch_concurrency: config.gpx_fetch_concurrency,
        },
        route_settings(&config),
    );

    match config.sync_interval_secs {
        Some(interval) => {
            runner.run_loop(interval).await;
            Ok(())
        }
        None => runner.run_once().await.map(|_| ()),
    }
}

/// Build a course from a local GPX file and add it to the store.
async fn upload(config: Result<AppConfig, AppError>, args: &[String]) -> Result<(), AppError> {
    let config = config?;
    let (path, name) = match args {
        [path, name, ..] => (path, name),
        _ => return Err(AppError::Config(USAGE.to_string())),
    };
    let level = match args.get(2) {
        Some(raw) => raw.parse::<CourseLevel>().map_err(AppError::InvalidUpload)?,
        None => CourseLevel::Easy,
    };

    let gpx = tokio::fs::read(path).await?;
    let geocoder = GeocoderClient::new(&config.geocoder_base_url, &config.geocoder_api_key)?;
    let course = build_uploaded_course(
        CourseUpload {
            name: name.clone(),
            level,
            gpx_path: path.clone(),
        },
        &gpx,
        &geocoder,
        config.running_speed_kmh,
    )
    .await?;

    let routes = derive_course_routes(
        &course,
        &CharRatioEstimator::default(),
        &route_settings(&config),
    );
    let plan = ReconciliationPlan {
        to_insert: vec![course],
        ..Default::default()
    };
    JsonFileStore::new(&config.course_store_path)
        .apply_plan(&plan, &[routes])
        .await
}

fn route_settings(config: &AppConfig) -> RouteSettings {
    RouteSettings {
        display_tolerance_deg: config.display_tolerance_deg,
        prompt_max_tokens: config.prompt_max_tokens,
        prompt_initial_tolerance_deg: config.prompt_initial_tolerance_deg,
    }
}
