#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the india-geo server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the region and analysis types to allow independent evolution of
//! the API contract.

use std::collections::BTreeMap;

use indiageo_analysis_models::{DateRange, PlanAttempt, QueryPlan, Reducer};
use indiageo_region_models::{
    AdminLevel, BoundingBox, RegionCandidate, RegionDescriptor, RegionSource,
};
use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the server is healthy.
    pub healthy: bool,
    /// Server version.
    pub version: String,
    /// Number of administrative records currently indexed.
    pub administrative_records: usize,
    /// Number of datasets available for analysis.
    pub datasets: usize,
}

/// A band in a dataset's catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiBand {
    /// Band name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Unit of the band values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Physically valid `[min, max]` range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_range: Option<[f64; 2]>,
}

/// A dataset as listed by `GET /api/datasets`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDataset {
    /// Stable identifier used in analysis paths.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Native resolution in metres per pixel.
    pub native_scale_meters: f64,
    /// Whether the dataset accepts a date range.
    pub collection: bool,
    /// Band catalog.
    pub bands: Vec<ApiBand>,
    /// Bands used when a request names none.
    pub default_bands: Vec<String>,
    /// Supported reducer families (e.g. `"mean"`, `"percentile"`).
    pub reducers: Vec<String>,
    /// Whether thumbnails can be requested.
    pub visualization: bool,
}

/// A predefined region as listed by `GET /api/regions/available`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAvailableRegion {
    /// Lookup key.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Short description.
    pub description: String,
    /// `[west, south, east, north]`.
    pub bounds: [f64; 4],
    /// Suggested map zoom.
    pub zoom: u8,
}

/// Query parameters for `GET /api/regions/search`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionSearchParams {
    /// Substring to search for.
    pub q: String,
    /// Maximum number of hits. Defaults to 20.
    pub limit: Option<usize>,
    /// `state`, `district`, or `both` (the default).
    pub level: Option<String>,
}

/// One administrative search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSearchHit {
    /// Unit name.
    pub name: String,
    /// GAUL code.
    pub code: String,
    /// Hierarchy level.
    pub level: AdminLevel,
    /// Name of the enclosing unit.
    pub parent_name: Option<String>,
    /// Surface area in square kilometres.
    pub area_km2: f64,
    /// Descriptor to resolve this hit, qualified only when the name is
    /// shared across parents.
    pub descriptor: RegionDescriptor,
}

/// A resolved region.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRegion {
    /// Human-readable label.
    pub label: String,
    /// Which lookup produced the geometry.
    pub source: RegionSource,
    /// Envelope of the geometry.
    pub bounds: BoundingBox,
    /// `[longitude, latitude]` of the centroid.
    pub centroid: [f64; 2],
    /// Surface area in square kilometres.
    pub area_km2: f64,
    /// GAUL codes of the merged records.
    pub codes: Vec<String>,
    /// Suggested map zoom.
    pub zoom: u8,
    /// GeoJSON geometry, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<serde_json::Value>,
}

/// Body of `POST /api/datasets/{dataset}/analysis`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisBody {
    /// Where to run the analysis.
    pub region: RegionDescriptor,
    /// Bands to reduce. Empty means the dataset defaults.
    #[serde(default)]
    pub bands: Vec<String>,
    /// Reducer to apply.
    #[serde(default)]
    pub reducer: Reducer,
    /// Optional time window.
    #[serde(default)]
    pub date_range: Option<DateRange>,
    /// Echo the region geometry as GeoJSON.
    #[serde(default)]
    pub include_geometry: bool,
    /// Ask for a thumbnail URL.
    #[serde(default)]
    pub include_visualization: bool,
}

/// Plan diagnostics attached to every analysis response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPlan {
    /// The plan that produced the statistics (or the last one tried).
    pub scale_meters: f64,
    /// Whether best-effort mode was used.
    pub best_effort: bool,
    /// Downscale rung, 0 for native resolution.
    pub step_index: u32,
    /// Every plan considered, in order.
    pub attempts: Vec<PlanAttempt>,
}

impl ApiPlan {
    /// Diagnostics for the final plan and its trace.
    #[must_use]
    pub fn new(plan: &QueryPlan, attempts: Vec<PlanAttempt>) -> Self {
        Self {
            scale_meters: plan.scale_meters,
            best_effort: plan.best_effort,
            step_index: plan.step_index,
            attempts,
        }
    }
}

/// Response of `POST /api/datasets/{dataset}/analysis`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAnalysis {
    /// Dataset id.
    pub dataset: String,
    /// The resolved region.
    pub region: ApiRegion,
    /// Reducer outputs. `null` means no valid value.
    pub statistics: BTreeMap<String, Option<f64>>,
    /// Thumbnail URL, when requested and available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization: Option<String>,
    /// Degradation and data-quality notes.
    pub warnings: Vec<String>,
    /// Whether the backend rejected every plan and the statistics are
    /// unavailable.
    pub partial: bool,
    /// Plan diagnostics.
    pub plan: ApiPlan,
}

/// Error body returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error kind (e.g. `"ambiguous_region"`).
    pub kind: String,
    /// Human-readable message.
    pub error: String,
    /// Matching units for an ambiguous name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<RegionCandidate>,
}

impl ApiError {
    /// An error without candidates.
    #[must_use]
    pub fn new(kind: &str, error: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            error: error.into(),
            candidates: Vec::new(),
        }
    }
}
