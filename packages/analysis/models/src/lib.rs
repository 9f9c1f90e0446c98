#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Analysis request, query plan, and result types.
//!
//! An [`AnalysisRequest`] names a dataset, the bands to reduce, and how to
//! reduce them. The executor turns it into a sequence of [`QueryPlan`]s,
//! each a `(scale, pixel ceiling, best-effort)` triple, and records what
//! happened to each as a [`PlanAttempt`]. The final [`AnalysisResult`] is
//! the uniform response shape shared by every dataset.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Family of a [`Reducer`], used in dataset capability lists.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReducerKind {
    /// Arithmetic mean.
    Mean,
    /// Median.
    Median,
    /// Maximum.
    Max,
    /// Minimum.
    Min,
    /// Sum.
    Sum,
    /// Any percentile.
    Percentile,
}

/// Aggregation applied over the pixels of a region.
///
/// Serialized as its label: `"mean"`, `"median"`, `"max"`, `"min"`,
/// `"sum"`, or `"p<N>"` for the N-th percentile (e.g. `"p90"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Reducer {
    /// Arithmetic mean.
    #[default]
    Mean,
    /// Median.
    Median,
    /// Maximum.
    Max,
    /// Minimum.
    Min,
    /// Sum.
    Sum,
    /// N-th percentile. Values above 100 parse but fail request validation.
    Percentile(u16),
}

impl Reducer {
    /// Statistic label used in result keys (`"mean"`, `"p90"`, ...).
    #[must_use]
    pub fn label(self) -> String {
        match self {
            Self::Percentile(p) => format!("p{p}"),
            other => other.kind().to_string(),
        }
    }

    /// The reducer family.
    #[must_use]
    pub const fn kind(self) -> ReducerKind {
        match self {
            Self::Mean => ReducerKind::Mean,
            Self::Median => ReducerKind::Median,
            Self::Max => ReducerKind::Max,
            Self::Min => ReducerKind::Min,
            Self::Sum => ReducerKind::Sum,
            Self::Percentile(_) => ReducerKind::Percentile,
        }
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Error returned when a reducer label cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseReducerError {
    /// The rejected input.
    pub input: String,
}

impl fmt::Display for ParseReducerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown reducer '{}' (expected mean, median, max, min, sum, or p<N>)",
            self.input
        )
    }
}

impl std::error::Error for ParseReducerError {}

impl FromStr for Reducer {
    type Err = ParseReducerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_ascii_lowercase();
        let err = || ParseReducerError {
            input: s.to_string(),
        };

        if let Some(digits) = trimmed.strip_prefix('p') {
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                return digits.parse().map(Self::Percentile).map_err(|_| err());
            }
        }

        match trimmed.parse::<ReducerKind>().map_err(|_| err())? {
            ReducerKind::Mean => Ok(Self::Mean),
            ReducerKind::Median => Ok(Self::Median),
            ReducerKind::Max => Ok(Self::Max),
            ReducerKind::Min => Ok(Self::Min),
            ReducerKind::Sum => Ok(Self::Sum),
            ReducerKind::Percentile => Err(err()),
        }
    }
}

impl TryFrom<String> for Reducer {
    type Error = ParseReducerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Reducer> for String {
    fn from(reducer: Reducer) -> Self {
        reducer.label()
    }
}

/// Inclusive date range for time-series datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First day (inclusive).
    pub start: NaiveDate,
    /// Last day (inclusive).
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a date range. Ordering is checked at request validation.
    #[must_use]
    pub const fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }
}

/// A statistics request for one dataset over one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    /// Dataset identifier (e.g. `"ndvi-proxy"`).
    pub dataset_id: String,
    /// Bands to reduce. Empty means the dataset's default bands.
    #[serde(default)]
    pub bands: Vec<String>,
    /// Aggregation to apply.
    #[serde(default)]
    pub reducer: Reducer,
    /// Optional temporal filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    /// Echo the resolved geometry as `GeoJSON` in the result.
    #[serde(default)]
    pub include_geometry: bool,
    /// Ask the backend for a rendered thumbnail URL.
    #[serde(default)]
    pub include_visualization: bool,
}

impl AnalysisRequest {
    /// A request for the dataset's default bands, reduced with `reducer`.
    #[must_use]
    pub fn new(dataset_id: impl Into<String>, reducer: Reducer) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            bands: Vec::new(),
            reducer,
            date_range: None,
            include_geometry: false,
            include_visualization: false,
        }
    }
}

/// One execution plan for a backend computation.
///
/// Fully determined by the native scale, the downscale factor and
/// `step_index`; the executor never mutates a plan, it derives the next
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlan {
    /// Ground sampling distance in metres per pixel.
    pub scale_meters: f64,
    /// Pixel ceiling passed to the backend.
    pub max_pixels: u64,
    /// Whether the backend may trade accuracy for completion.
    pub best_effort: bool,
    /// Number of downscale steps taken from the native scale.
    pub step_index: u32,
}

impl QueryPlan {
    /// The plan at `step_index` on the downscale ladder:
    /// `native_scale * factor^step_index`.
    #[must_use]
    pub fn at_step(native_scale: f64, factor: f64, step_index: u32, max_pixels: u64) -> Self {
        let exponent = i32::try_from(step_index).unwrap_or(i32::MAX);
        Self {
            scale_meters: native_scale * factor.powi(exponent),
            max_pixels,
            best_effort: false,
            step_index,
        }
    }

    /// The same plan in best-effort mode.
    #[must_use]
    pub const fn best_effort(self) -> Self {
        Self {
            best_effort: true,
            ..self
        }
    }

    /// Local pixel estimate: `area_km2 * 1e6 / scale²`.
    #[must_use]
    pub fn estimated_pixels(&self, area_km2: f64) -> f64 {
        area_km2 * 1e6 / (self.scale_meters * self.scale_meters)
    }

    /// Whether the local estimate already exceeds the pixel ceiling.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn exceeds_ceiling(&self, area_km2: f64) -> bool {
        self.estimated_pixels(area_km2) > self.max_pixels as f64
    }
}

/// What happened to one [`QueryPlan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Not submitted: the local estimate exceeded the pixel ceiling.
    SkippedByEstimate,
    /// The backend rejected the plan as over quota.
    ResourceExceeded {
        /// Backend message.
        message: String,
    },
    /// The backend call failed transiently (timeout, rate limit).
    Transient {
        /// Backend message.
        message: String,
    },
    /// The backend returned a result.
    Succeeded,
}

/// A plan together with its outcome, in attempt order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanAttempt {
    /// The plan considered.
    pub plan: QueryPlan,
    /// Local pixel estimate for the plan.
    pub estimated_pixels: f64,
    /// What happened.
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

/// Uniform analysis response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Reduced values keyed by statistic name. `None` means the reducer had
    /// no valid pixels to work with.
    pub statistics: BTreeMap<String, Option<f64>>,
    /// The analysed geometry as `GeoJSON`, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_echo: Option<serde_json::Value>,
    /// Thumbnail URL, when requested and available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization: Option<String>,
    /// Degradation and data-quality notes, in the order they arose.
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reducer_labels_round_trip_through_strings() {
        for (input, expected) in [
            ("mean", Reducer::Mean),
            ("MEDIAN", Reducer::Median),
            (" max ", Reducer::Max),
            ("min", Reducer::Min),
            ("sum", Reducer::Sum),
            ("p90", Reducer::Percentile(90)),
            ("P5", Reducer::Percentile(5)),
        ] {
            assert_eq!(input.parse::<Reducer>().unwrap(), expected, "{input:?}");
        }
        assert_eq!(Reducer::Percentile(90).label(), "p90");
        assert_eq!(Reducer::Median.to_string(), "median");
    }

    #[test]
    fn unknown_reducers_are_rejected() {
        for input in ["avg", "percentile", "p", "p-5", "pnine", ""] {
            assert!(input.parse::<Reducer>().is_err(), "{input:?} should not parse");
        }
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let request: AnalysisRequest =
            serde_json::from_str(r#"{"datasetId":"ndvi-proxy"}"#).unwrap();
        assert_eq!(request, AnalysisRequest::new("ndvi-proxy", Reducer::Mean));

        let request: AnalysisRequest = serde_json::from_str(
            r#"{"datasetId":"jrc-water","bands":["occurrence"],"reducer":"p75",
                "dateRange":{"start":"2020-01-01","end":"2020-12-31"}}"#,
        )
        .unwrap();
        assert_eq!(request.reducer, Reducer::Percentile(75));
        assert_eq!(
            request.date_range.unwrap().start,
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
        );
    }

    #[test]
    fn plan_ladder_is_geometric() {
        let scales: Vec<f64> = (0..4)
            .map(|step| QueryPlan::at_step(30.0, 2.0, step, 100_000_000).scale_meters)
            .collect();
        assert_eq!(scales, vec![30.0, 60.0, 120.0, 240.0]);
    }

    #[test]
    fn pixel_estimate_uses_square_metres() {
        let plan = QueryPlan::at_step(10.0, 2.0, 0, 1_000_000);
        // 1 km² at 10 m = 10,000 pixels.
        assert!((plan.estimated_pixels(1.0) - 10_000.0).abs() < 1e-9);
        assert!(!plan.exceeds_ceiling(100.0));
        assert!(plan.exceeds_ceiling(100.1));
    }

    #[test]
    fn attempt_outcome_is_flattened_into_the_attempt() {
        let attempt = PlanAttempt {
            plan: QueryPlan::at_step(30.0, 2.0, 1, 10),
            estimated_pixels: 5.0,
            outcome: AttemptOutcome::ResourceExceeded {
                message: "Too many pixels".to_string(),
            },
        };
        let json = serde_json::to_value(&attempt).unwrap();
        assert_eq!(json["outcome"], "resource_exceeded");
        assert_eq!(json["message"], "Too many pixels");
        assert_eq!(json["plan"]["scaleMeters"], 60.0);
    }

    #[test]
    fn null_statistics_serialize_as_null() {
        let mut result = AnalysisResult::default();
        result.statistics.insert("mean".to_string(), None);
        let json = serde_json::to_value(&result).unwrap();
        assert!(json["statistics"]["mean"].is_null());
        assert!(json.get("geometryEcho").is_none());
    }
}
