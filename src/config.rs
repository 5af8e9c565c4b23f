use crate::errors::AppError;

/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub feed_base_url: String,
    pub feed_service_key: String,
    pub feed_page_size: u32,
    /// Feed items whose region does not start with this are ignored.
    pub target_region_prefix: String,
    pub geocoder_base_url: String,
    pub geocoder_api_key: String,
    /// Pace used to estimate duration for uploaded courses.
    pub running_speed_kmh: f64,
    pub display_tolerance_deg: f64,
    pub prompt_max_tokens: usize,
    pub prompt_initial_tolerance_deg: f64,
    pub gpx_fetch_concurrency: usize,
    /// JSON snapshot used as the course store.
    pub course_store_path: String,
    /// `None` runs a single sync and exits.
    pub sync_interval_secs: Option<u64>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            feed_base_url: env_or("FEED_BASE_URL", "https://apis.data.go.kr/B551011/Durunubi"),
            feed_service_key: required("FEED_SERVICE_KEY")?,
            feed_page_size: parsed("FEED_PAGE_SIZE", 50)?,
            target_region_prefix: env_or("TARGET_REGION_PREFIX", "서울"),
            geocoder_base_url: env_or("GEOCODER_BASE_URL", "https://dapi.kakao.com"),
            geocoder_api_key: required("GEOCODER_API_KEY")?,
            running_speed_kmh: parsed("RUNNING_SPEED_KMH", 9.0)?,
            display_tolerance_deg: parsed("DISPLAY_TOLERANCE_DEG", 0.0001)?,
            prompt_max_tokens: parsed("PROMPT_MAX_TOKENS", 4000)?,
            prompt_initial_tolerance_deg: parsed("PROMPT_INITIAL_TOLERANCE_DEG", 0.00001)?,
            gpx_fetch_concurrency: parsed("GPX_FETCH_CONCURRENCY", 8)?,
            course_store_path: env_or("COURSE_STORE_PATH", "./data/courses.json"),
            sync_interval_secs: match std::env::var("SYNC_INTERVAL_SECS") {
                Ok(v) => Some(v.parse().map_err(|_| {
                    AppError::Config(format!("SYNC_INTERVAL_SECS must be an integer, got '{}'", v))
                })?),
                Err(_) => None,
            },
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn required(key: &str) -> Result<String, AppError> {
    std::env::var(key).map_err(|_| AppError::Config(format!("{} must be set", key)))
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: '{}'", key, v))),
        Err(_) => Ok(default),
    }
}
