#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Quota-aware analysis execution over remote geospatial datasets.
//!
//! A request flows through four stages:
//!
//! 1. **Validation** ([`validate`]): bands, reducer and date range are
//!    checked against the dataset's [`DatasetAdapter`] before anything
//!    leaves the process.
//! 2. **Planning and execution** ([`executor`]): the
//!    [`AdaptiveQueryExecutor`] walks a deterministic downscale ladder,
//!    skipping plans whose local pixel estimate is already over quota,
//!    falls back to best-effort mode, and retries transient failures with
//!    capped exponential backoff on a separate budget.
//! 3. **Backend call** ([`backend`], [`http`]): one [`Submission`] per
//!    plan, classified into resource-exceeded, transient or compute
//!    failures.
//! 4. **Aggregation** ([`aggregator`]): raw values become the uniform
//!    [`AnalysisResult`], with degradation reported as warnings.
//!
//! Dataset metadata lives in TOML files under `datasets/`, loaded by the
//! [`registry`].

pub mod aggregator;
pub mod backend;
pub mod config;
pub mod dataset;
pub mod executor;
pub mod http;
pub mod registry;
pub mod validate;

pub use backend::{BackendError, QueryBackend, RawResult, Submission};
pub use config::{ConfigError, ExecutorConfig};
pub use dataset::{DatasetAdapter, DatasetDefinition};
pub use executor::{AdaptiveQueryExecutor, AnalysisOutcome};
pub use http::HttpBackend;
pub use indiageo_analysis_models::{
    AnalysisRequest, AnalysisResult, AttemptOutcome, DateRange, PlanAttempt, QueryPlan, Reducer,
};
pub use registry::DatasetRegistry;

use thiserror::Error;

/// Errors surfaced by [`AdaptiveQueryExecutor::run_analysis`].
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The request does not fit the dataset.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// What is wrong with the request.
        message: String,
    },

    /// The backend rejected every plan, best-effort included. The result
    /// carries null statistics and warnings explaining why.
    #[error(
        "Partial result: backend rejected the computation down to {}m",
        plan.scale_meters
    )]
    PartialResult {
        /// The last plan attempted.
        plan: QueryPlan,
        /// The degraded result.
        result: Box<AnalysisResult>,
        /// Every plan considered, in order.
        attempts: Vec<PlanAttempt>,
    },

    /// Transient failures used up the retry budget.
    #[error("Backend unavailable after {attempts} attempts: {last_error}")]
    BackendUnavailable {
        /// Backend calls that failed transiently.
        attempts: u32,
        /// Message from the last failure.
        last_error: String,
    },

    /// The backend failed in a way retrying cannot fix.
    #[error("Backend computation failed: {message}")]
    Compute {
        /// Backend message.
        message: String,
    },

    /// The caller cancelled the request.
    #[error("Analysis cancelled")]
    Cancelled,
}
