//! Storage collaborator.
//!
//! Reconciliation only computes a plan; applying it is a short storage-side
//! step behind `CourseStore`. `JsonFileStore` keeps courses in a JSON
//! snapshot, which is what the binary uses.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};

use crate::errors::AppError;
use crate::models::{CourseRecord, ReconciliationPlan, TrackPoint};

/// Simplified representations derived for one changed course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseRoutes {
    pub external_id: Option<String>,
    /// Identifies uploaded courses, which have no external id
    #[serde(default)]
    pub gpx_path: String,
    /// Route for client rendering (fixed tolerance)
    pub display_route: Vec<TrackPoint>,
    /// Prompt text for the language model, when the route fit the budget
    pub prompt: Option<String>,
    /// Why no prompt could be built
    pub prompt_error: Option<String>,
}

pub trait CourseStore {
    fn load_courses(&self) -> impl Future<Output = Result<Vec<CourseRecord>, AppError>> + Send;

    fn apply_plan(
        &self,
        plan: &ReconciliationPlan,
        routes: &[CourseRoutes],
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

impl CourseRoutes {
    /// Feed courses match on external id, uploads on their GPX path.
    pub fn belongs_to(&self, course: &CourseRecord) -> bool {
        match &self.external_id {
            Some(_) => self.external_id == course.external_id,
            None => course.external_id.is_none() && self.gpx_path == course.gpx_path,
        }
    }

    fn same_course(&self, other: &CourseRoutes) -> bool {
        match &self.external_id {
            Some(_) => self.external_id == other.external_id,
            None => other.external_id.is_none() && self.gpx_path == other.gpx_path,
        }
    }
}

/// Courses stored as a JSON array, with derived routes in a sibling file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn routes_path(&self) -> PathBuf {
        self.path.with_extension("routes.json")
    }
}

impl CourseStore for JsonFileStore {
    async fn load_courses(&self) -> Result<Vec<CourseRecord>, AppError> {
        if !tokio::fs::try_exists(&self.path).await? {
            tracing::warn!(
                "Course store {} does not exist, starting empty",
                self.path.display()
            );
            return Ok(Vec::new());
        }
        let raw = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn apply_plan(
        &self,
        plan: &ReconciliationPlan,
        routes: &[CourseRoutes],
    ) -> Result<(), AppError> {
        let courses = apply_to(self.load_courses().await?, plan);
        write_json_atomic(&self.path, &courses).await?;

        let mut stored_routes: Vec<CourseRoutes> = match tokio::fs::read(self.routes_path()).await {
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        stored_routes.retain(|r| {
            courses.iter().any(|c| r.belongs_to(c)) && !routes.iter().any(|n| n.same_course(r))
        });
        stored_routes.extend(routes.iter().cloned());
        write_json_atomic(&self.routes_path(), &stored_routes).await?;

        tracing::info!(
            "Applied plan to {}: {} courses stored",
            self.path.display(),
            courses.len()
        );
        Ok(())
    }
}

/// Apply a plan to an in-memory course list.
///
/// Deletes and updates match on external id; uploads (no external id) are untouched.
pub fn apply_to(mut courses: Vec<CourseRecord>, plan: &ReconciliationPlan) -> Vec<CourseRecord> {
    let deleted: Vec<&str> = plan
        .to_delete
        .iter()
        .filter_map(|c| c.external_id.as_deref())
        .collect();
    courses.retain(|c| {
        c.external_id
            .as_deref()
            .map_or(true, |id| !deleted.contains(&id))
    });

    for update in &plan.to_update {
        match courses
            .iter_mut()
            .find(|c| c.external_id.is_some() && c.external_id == update.incoming.external_id)
        {
            Some(slot) => *slot = update.incoming.clone(),
            None => courses.push(update.incoming.clone()),
        }
    }

    courses.extend(plan.to_insert.iter().cloned());
    courses
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, serde_json::to_vec_pretty(value)?).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
