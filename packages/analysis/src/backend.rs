//! The remote compute seam.
//!
//! A [`QueryBackend`] evaluates one [`Submission`] and either returns the
//! reduced values or fails with one of three [`BackendError`] classes.
//! The class decides what the executor does next: downscale, back off, or
//! give up. Backends never retry on their own.

use std::collections::BTreeMap;

use geo::MultiPolygon;
use indiageo_analysis_models::{DateRange, QueryPlan, Reducer};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::{DatasetAdapter, VisualizationParams};

/// Messages the backend uses when a computation exceeds its quota.
pub const QUOTA_MESSAGES: &[&str] = &[
    "too many pixels",
    "user memory limit exceeded",
    "computation timed out",
];

/// Failure classes reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The computation was rejected as over the pixel or compute quota.
    #[error("Resource exceeded: {message}")]
    ResourceExceeded {
        /// Backend message.
        message: String,
    },

    /// Timeout, rate limit or connection failure. Worth retrying as-is.
    #[error("Transient backend error: {message}")]
    Transient {
        /// Backend message.
        message: String,
    },

    /// Any other failure. Retrying will not help.
    #[error("Compute error: {message}")]
    Compute {
        /// Backend message.
        message: String,
    },
}

impl BackendError {
    /// Classifies a free-form backend error message: quota messages are
    /// [`Self::ResourceExceeded`], everything else [`Self::Compute`].
    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if QUOTA_MESSAGES.iter().any(|m| lower.contains(m)) {
            Self::ResourceExceeded { message }
        } else {
            Self::Compute { message }
        }
    }
}

/// One computation request as sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// Dataset identifier.
    pub dataset_id: String,
    /// Backend asset identifier.
    pub asset: String,
    /// Whether the asset is an image collection.
    pub collection: bool,
    /// Region geometry.
    pub geometry: geojson::Geometry,
    /// Bands to reduce.
    pub bands: Vec<String>,
    /// Aggregation to apply.
    pub reducer: Reducer,
    /// Temporal filter, for collections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    /// Thumbnail parameters, when a visualization is wanted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization: Option<VisualizationParams>,
    /// Scale, pixel ceiling and best-effort flag for this attempt.
    #[serde(flatten)]
    pub plan: QueryPlan,
}

impl Submission {
    /// Builds the submission for the first plan of a request.
    #[must_use]
    pub fn new(
        dataset: &dyn DatasetAdapter,
        geometry: &MultiPolygon<f64>,
        bands: Vec<String>,
        reducer: Reducer,
        date_range: Option<DateRange>,
        with_visualization: bool,
        plan: QueryPlan,
    ) -> Self {
        Self {
            dataset_id: dataset.id().to_string(),
            asset: dataset.asset().to_string(),
            collection: dataset.is_collection(),
            geometry: geojson::Geometry::new(geojson::Value::from(geometry)),
            bands,
            reducer,
            date_range,
            visualization: if with_visualization {
                dataset.visualization().cloned()
            } else {
                None
            },
            plan,
        }
    }

    /// The same computation under a different plan.
    #[must_use]
    pub fn with_plan(&self, plan: QueryPlan) -> Self {
        Self {
            plan,
            ..self.clone()
        }
    }
}

/// Values returned by a successful computation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    /// Reduced value per band. `None` when the reducer saw no valid pixel.
    #[serde(default)]
    pub values: BTreeMap<String, Option<f64>>,
    /// Thumbnail URL, if one was requested and rendered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization: Option<String>,
}

/// A remote compute service.
#[async_trait::async_trait]
pub trait QueryBackend: Send + Sync {
    /// Evaluates one submission.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] classified by what the caller should do
    /// next.
    async fn submit(&self, submission: &Submission) -> Result<RawResult, BackendError>;
}
