//! Adaptive, quota-aware query execution.
//!
//! # Plan ladder
//!
//! Plans are taken from a fixed ladder of `max_downscale_steps` rungs,
//! rung `i` having scale `native * factor^i`. For the default 4 steps and
//! factor 2 that is `S0, 2·S0, 4·S0, 8·S0`. The ladder depends only on the
//! dataset and the configuration, so two runs for the same region and
//! request consider the same plans in the same order.
//!
//! # Loop
//!
//! 1. A plan whose local pixel estimate exceeds the ceiling is skipped
//!    without a backend call, unless it is the last rung.
//! 2. `ResourceExceeded` from the backend moves to the next rung; past the
//!    last rung the same scale is retried once in best-effort mode. If
//!    that is rejected too the request ends as a partial result.
//! 3. Transient failures (including per-attempt timeouts) retry the same
//!    plan after a capped exponential backoff. The transient budget is per
//!    request and independent of the ladder.
//! 4. Compute errors end the request immediately.
//!
//! Attempts within a request are strictly sequential. Across requests a
//! semaphore bounds the number of backend calls in flight.

use std::sync::Arc;

use indiageo_analysis_models::{
    AnalysisRequest, AnalysisResult, AttemptOutcome, PlanAttempt, QueryPlan,
};
use indiageo_region_models::ResolvedRegion;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::AnalysisError;
use crate::aggregator::ResultAggregator;
use crate::backend::{BackendError, QueryBackend, RawResult, Submission};
use crate::config::{ConfigError, ExecutorConfig};
use crate::dataset::DatasetAdapter;
use crate::registry::DatasetRegistry;
use crate::validate::validate_request;

/// A completed analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutcome {
    /// The uniform result.
    pub result: AnalysisResult,
    /// The plan that produced it.
    pub plan: QueryPlan,
    /// Every plan considered, in order.
    pub attempts: Vec<PlanAttempt>,
}

/// How the plan loop ended when it did not produce a result.
enum Failure {
    /// Every rung and the best-effort retry were rejected as over quota.
    Exhausted {
        plan: QueryPlan,
        attempts: Vec<PlanAttempt>,
    },
    /// Anything that ends the request outright.
    Fatal(AnalysisError),
}

/// Runs analysis requests against a [`QueryBackend`] within its quotas.
pub struct AdaptiveQueryExecutor {
    backend: Arc<dyn QueryBackend>,
    datasets: DatasetRegistry,
    config: ExecutorConfig,
    permits: Semaphore,
}

impl std::fmt::Debug for AdaptiveQueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveQueryExecutor")
            .field("datasets", &self.datasets)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AdaptiveQueryExecutor {
    /// Creates an executor over a backend and a dataset registry.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `config` fails
    /// [`ExecutorConfig::validate`].
    pub fn new(
        backend: Arc<dyn QueryBackend>,
        datasets: DatasetRegistry,
        config: ExecutorConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let permits = config
            .max_concurrent_backend_calls
            .min(Semaphore::MAX_PERMITS);
        Ok(Self {
            backend,
            datasets,
            config,
            permits: Semaphore::new(permits),
        })
    }

    /// The executor's configuration.
    #[must_use]
    pub const fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// The datasets this executor can run.
    #[must_use]
    pub const fn datasets(&self) -> &DatasetRegistry {
        &self.datasets
    }

    /// The downscale ladder for a dataset, native scale first. Never empty.
    #[must_use]
    pub fn plan_ladder(&self, dataset: &dyn DatasetAdapter) -> Vec<QueryPlan> {
        let max_pixels = dataset.max_pixels().unwrap_or(self.config.max_pixels);
        (0..self.config.max_downscale_steps.max(1))
            .map(|step| {
                QueryPlan::at_step(
                    dataset.native_scale_meters(),
                    self.config.downscale_factor,
                    step,
                    max_pixels,
                )
            })
            .collect()
    }

    /// Runs `request` over `region`.
    ///
    /// Dropping the returned future, or cancelling `cancel`, abandons any
    /// in-flight backend call or backoff sleep.
    ///
    /// # Errors
    ///
    /// * [`AnalysisError::InvalidRequest`] if the request does not fit the
    ///   dataset (no backend call is made)
    /// * [`AnalysisError::PartialResult`] if every plan was rejected as
    ///   over quota
    /// * [`AnalysisError::BackendUnavailable`] if transient failures used
    ///   up the retry budget
    /// * [`AnalysisError::Compute`] on a non-retryable backend failure
    /// * [`AnalysisError::Cancelled`] if `cancel` fired first
    pub async fn run_analysis(
        &self,
        region: &ResolvedRegion,
        request: &AnalysisRequest,
        cancel: &CancellationToken,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let dataset = self
            .datasets
            .get(&request.dataset_id)
            .ok_or_else(|| AnalysisError::InvalidRequest {
                message: format!("Unknown dataset '{}'", request.dataset_id),
            })?;
        let validated = validate_request(dataset.as_ref(), request)?;

        log::info!(
            "Running {} {} over {} ({:.1} km², bands: {})",
            dataset.id(),
            request.reducer,
            region.label,
            region.area_km2,
            validated.bands.join(", ")
        );

        let ladder = self.plan_ladder(dataset.as_ref());
        let submission = Submission::new(
            dataset.as_ref(),
            &region.geometry,
            validated.bands.clone(),
            request.reducer,
            validated.date_range,
            request.include_visualization,
            ladder[0],
        );

        let aggregator =
            ResultAggregator::new(dataset.as_ref(), region, &validated.bands, request.reducer);

        match self
            .execute(&ladder, region.area_km2, &submission, cancel)
            .await
        {
            Ok((raw, plan, attempts)) => {
                let result = aggregator.aggregate(
                    &raw,
                    &plan,
                    &validated.notes,
                    request.include_geometry,
                    request.include_visualization,
                );
                log::info!(
                    "Completed {} over {} at {}m after {} plan(s), {} warning(s)",
                    dataset.id(),
                    region.label,
                    plan.scale_meters,
                    attempts.len(),
                    result.warnings.len()
                );
                Ok(AnalysisOutcome {
                    result,
                    plan,
                    attempts,
                })
            }
            Err(Failure::Exhausted { plan, attempts }) => {
                log::warn!(
                    "Backend rejected {} over {} at every plan down to {}m",
                    dataset.id(),
                    region.label,
                    plan.scale_meters
                );
                let result =
                    aggregator.unavailable(&plan, &validated.notes, request.include_geometry);
                Err(AnalysisError::PartialResult {
                    plan,
                    result: Box::new(result),
                    attempts,
                })
            }
            Err(Failure::Fatal(e)) => Err(e),
        }
    }

    /// The plan loop. `ladder` is never empty.
    async fn execute(
        &self,
        ladder: &[QueryPlan],
        area_km2: f64,
        submission: &Submission,
        cancel: &CancellationToken,
    ) -> Result<(RawResult, QueryPlan, Vec<PlanAttempt>), Failure> {
        let max_retries = self.config.max_transient_retries;
        let last_rung = ladder.len().saturating_sub(1);

        let mut rung = 0;
        let mut plan = ladder[0];
        let mut attempts = Vec::new();
        let mut transient_failures: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(Failure::Fatal(AnalysisError::Cancelled));
            }

            let estimated_pixels = plan.estimated_pixels(area_km2);

            // The last rung is always submitted; only the backend can reject it.
            if !plan.best_effort && rung < last_rung && plan.exceeds_ceiling(area_km2) {
                log::debug!(
                    "Skipping {}m: estimated {estimated_pixels:.0} pixels exceeds {}",
                    plan.scale_meters,
                    plan.max_pixels
                );
                attempts.push(PlanAttempt {
                    plan,
                    estimated_pixels,
                    outcome: AttemptOutcome::SkippedByEstimate,
                });
                rung += 1;
                plan = ladder[rung];
                continue;
            }

            let attempt = submission.with_plan(plan);
            let call = self.submit(&attempt);
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    log::debug!("Analysis cancelled during backend call at {}m", plan.scale_meters);
                    return Err(Failure::Fatal(AnalysisError::Cancelled));
                }
                result = call => result,
            };

            match result {
                Ok(raw) => {
                    attempts.push(PlanAttempt {
                        plan,
                        estimated_pixels,
                        outcome: AttemptOutcome::Succeeded,
                    });
                    return Ok((raw, plan, attempts));
                }
                Err(BackendError::ResourceExceeded { message }) => {
                    log::warn!(
                        "Backend rejected {}m{} as over quota: {message}",
                        plan.scale_meters,
                        if plan.best_effort { " (best effort)" } else { "" }
                    );
                    attempts.push(PlanAttempt {
                        plan,
                        estimated_pixels,
                        outcome: AttemptOutcome::ResourceExceeded { message },
                    });

                    if plan.best_effort {
                        return Err(Failure::Exhausted { plan, attempts });
                    }
                    if rung < last_rung {
                        rung += 1;
                        plan = ladder[rung];
                        log::info!("  downscaling to {}m", plan.scale_meters);
                    } else {
                        plan = plan.best_effort();
                        log::info!("  retrying {}m in best-effort mode", plan.scale_meters);
                    }
                }
                Err(BackendError::Transient { message }) => {
                    log::warn!("  transient error: {message}");
                    attempts.push(PlanAttempt {
                        plan,
                        estimated_pixels,
                        outcome: AttemptOutcome::Transient {
                            message: message.clone(),
                        },
                    });

                    transient_failures += 1;
                    if transient_failures > max_retries {
                        log::error!(
                            "Backend unavailable after {transient_failures} transient failures"
                        );
                        return Err(Failure::Fatal(AnalysisError::BackendUnavailable {
                            attempts: transient_failures,
                            last_error: message,
                        }));
                    }

                    let delay = self.config.backoff_delay(transient_failures);
                    log::warn!("  retry {transient_failures}/{max_retries} in {delay:?}...");
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            return Err(Failure::Fatal(AnalysisError::Cancelled));
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Err(BackendError::Compute { message }) => {
                    log::error!("Backend computation failed at {}m: {message}", plan.scale_meters);
                    return Err(Failure::Fatal(AnalysisError::Compute { message }));
                }
            }
        }
    }

    /// One backend call under a concurrency permit and the per-attempt
    /// timeout. A timeout counts as a transient failure.
    async fn submit(&self, submission: &Submission) -> Result<RawResult, BackendError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| BackendError::Transient {
                message: e.to_string(),
            })?;

        let timeout = self.config.attempt_timeout;
        tokio::time::timeout(timeout, self.backend.submit(submission))
            .await
            .unwrap_or_else(|_| {
                Err(BackendError::Transient {
                    message: format!("no response within {timeout:?}"),
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use indiageo_analysis_models::Reducer;
    use indiageo_region::{AdministrativeIndex, RegionDescriptor, RegionResolver};
    use indiageo_region_models::{BoundingBox, RegionSource};

    use crate::dataset::fixtures::index_dataset;
    use crate::dataset::DatasetDefinition;

    type Script = Box<dyn Fn(usize, &Submission) -> Result<RawResult, BackendError> + Send + Sync>;

    /// Backend that answers from a script and records every submission.
    struct ScriptedBackend {
        script: Script,
        delay: Option<Duration>,
        calls: Mutex<Vec<Submission>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(
            script: impl Fn(usize, &Submission) -> Result<RawResult, BackendError>
            + Send
            + Sync
            + 'static,
        ) -> Arc<Self> {
            Self::with_delay(None, script)
        }

        fn with_delay(
            delay: Option<Duration>,
            script: impl Fn(usize, &Submission) -> Result<RawResult, BackendError>
            + Send
            + Sync
            + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                script: Box::new(script),
                delay,
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> Vec<Submission> {
            self.calls.lock().unwrap().clone()
        }

        fn scales(&self) -> Vec<(f64, bool)> {
            self.calls()
                .iter()
                .map(|s| (s.plan.scale_meters, s.plan.best_effort))
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl QueryBackend for ScriptedBackend {
        async fn submit(&self, submission: &Submission) -> Result<RawResult, BackendError> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(submission.clone());
                calls.len() - 1
            };
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            (self.script)(n, submission)
        }
    }

    fn ok(values: &[(&str, f64)]) -> Result<RawResult, BackendError> {
        Ok(RawResult {
            values: values
                .iter()
                .map(|(k, v)| ((*k).to_string(), Some(*v)))
                .collect(),
            visualization: None,
        })
    }

    fn over_quota() -> Result<RawResult, BackendError> {
        Err(BackendError::ResourceExceeded {
            message: "Too many pixels in the region".to_string(),
        })
    }

    fn rate_limited() -> Result<RawResult, BackendError> {
        Err(BackendError::Transient {
            message: "HTTP 429: rate limited".to_string(),
        })
    }

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig {
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(4),
            ..ExecutorConfig::default()
        }
    }

    fn executor(backend: Arc<ScriptedBackend>, datasets: Vec<DatasetDefinition>) -> AdaptiveQueryExecutor {
        executor_with(backend, datasets, fast_config())
    }

    fn executor_with(
        backend: Arc<ScriptedBackend>,
        datasets: Vec<DatasetDefinition>,
        config: ExecutorConfig,
    ) -> AdaptiveQueryExecutor {
        AdaptiveQueryExecutor::new(
            backend,
            DatasetRegistry::from_adapters(
                datasets
                    .into_iter()
                    .map(|d| Arc::new(d) as Arc<dyn DatasetAdapter>),
            ),
            config,
        )
        .unwrap()
    }

    /// A custom-box region with an exact area, for estimate arithmetic.
    fn region_with_area(area_km2: f64) -> ResolvedRegion {
        let resolver = RegionResolver::new(Arc::new(AdministrativeIndex::default()));
        let mut region = resolver
            .resolve(&RegionDescriptor::bbox(BoundingBox::new(77.0, 12.0, 78.0, 13.0)))
            .unwrap();
        region.area_km2 = area_km2;
        region
    }

    fn scales_of(attempts: &[PlanAttempt]) -> Vec<f64> {
        attempts.iter().map(|a| a.plan.scale_meters).collect()
    }

    #[tokio::test]
    async fn mumbai_ndvi_succeeds_at_native_scale() {
        let backend = ScriptedBackend::new(|_, _| ok(&[("NDVI", 0.31)]));
        let executor = AdaptiveQueryExecutor::new(
            backend.clone(),
            DatasetRegistry::builtin(),
            fast_config(),
        )
        .unwrap();
        let resolver = RegionResolver::new(Arc::new(AdministrativeIndex::default()));
        let region = resolver.resolve(&RegionDescriptor::city("Mumbai")).unwrap();
        assert_eq!(region.source, RegionSource::City);

        let outcome = executor
            .run_analysis(
                &region,
                &AnalysisRequest::new("ndvi-proxy", Reducer::Mean),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.result.statistics.len(), 1);
        let mean = outcome.result.statistics["mean"].unwrap();
        assert!((-1.0..=1.0).contains(&mean));
        assert!(outcome.result.warnings.is_empty());
        assert_eq!(outcome.plan.step_index, 0);
        assert!((outcome.plan.scale_meters - 10.0).abs() < f64::EPSILON);
        assert_eq!(backend.calls().len(), 1);
        assert_eq!(backend.calls()[0].asset, "COPERNICUS/S2_SR_HARMONIZED");
    }

    #[tokio::test]
    async fn rejected_plans_walk_the_ladder_then_best_effort() {
        let backend = ScriptedBackend::new(|_, _| over_quota());
        let executor = executor(backend.clone(), vec![index_dataset("d", 30.0)]);

        let err = executor
            .run_analysis(
                &region_with_area(10.0),
                &AnalysisRequest::new("d", Reducer::Mean),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(
            backend.scales(),
            vec![
                (30.0, false),
                (60.0, false),
                (120.0, false),
                (240.0, false),
                (240.0, true),
            ]
        );

        let AnalysisError::PartialResult {
            plan,
            result,
            attempts,
        } = err
        else {
            panic!("expected PartialResult, got {err:?}");
        };
        assert!(plan.best_effort);
        assert!((plan.scale_meters - 240.0).abs() < f64::EPSILON);
        assert_eq!(result.statistics["mean"], None);
        assert!(!result.warnings.is_empty());
        assert_eq!(attempts.len(), 5);
        assert!(
            attempts
                .iter()
                .all(|a| matches!(a.outcome, AttemptOutcome::ResourceExceeded { .. }))
        );
    }

    #[tokio::test]
    async fn scale_never_decreases_across_attempts() {
        let backend = ScriptedBackend::new(|n, _| if n < 2 { over_quota() } else { ok(&[("NDVI", 0.2)]) });
        let executor = executor(backend, vec![index_dataset("d", 30.0)]);

        let outcome = executor
            .run_analysis(
                &region_with_area(10.0),
                &AnalysisRequest::new("d", Reducer::Mean),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let scales = scales_of(&outcome.attempts);
        assert_eq!(scales, vec![30.0, 60.0, 120.0]);
        assert!(scales.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(
            outcome.result.warnings,
            vec!["result computed at reduced resolution 120m (native 30m) due to area size"]
        );
    }

    #[tokio::test]
    async fn plans_over_the_local_estimate_are_skipped_without_a_call() {
        let backend = ScriptedBackend::new(|_, _| ok(&[("NDVI", 0.5)]));
        let executor = executor(backend.clone(), vec![index_dataset("d", 10.0)]);

        // 1e5 km² at 10 m is 1e9 pixels: 10x the default ceiling.
        let outcome = executor
            .run_analysis(
                &region_with_area(100_000.0),
                &AnalysisRequest::new("d", Reducer::Mean),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(backend.scales(), vec![(40.0, false)]);
        assert_eq!(scales_of(&outcome.attempts), vec![10.0, 20.0, 40.0]);
        assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::SkippedByEstimate);
        assert_eq!(outcome.attempts[1].outcome, AttemptOutcome::SkippedByEstimate);
        assert_eq!(outcome.attempts[2].outcome, AttemptOutcome::Succeeded);
        assert!(outcome.plan.scale_meters >= 20.0);
        assert!(!outcome.result.warnings.is_empty());
        assert_eq!(outcome.result.statistics["mean"], Some(0.5));
    }

    #[tokio::test]
    async fn last_rung_is_submitted_even_when_over_the_estimate() {
        let backend = ScriptedBackend::new(|_, _| ok(&[("NDVI", 0.5)]));
        let executor = executor(backend.clone(), vec![index_dataset("d", 0.5)]);

        let outcome = executor
            .run_analysis(
                &region_with_area(3_000.0),
                &AnalysisRequest::new("d", Reducer::Mean),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(backend.scales(), vec![(4.0, false)]);
        assert!(outcome.plan.exceeds_ceiling(3_000.0));
        assert_eq!(outcome.attempts.len(), 4);
    }

    #[tokio::test]
    async fn dataset_pixel_ceiling_overrides_the_default() {
        let backend = ScriptedBackend::new(|_, _| ok(&[("NDVI", 0.5)]));
        let mut dataset = index_dataset("d", 10.0);
        dataset.max_pixels = Some(1_000);
        let executor = executor(backend.clone(), vec![dataset]);

        // 1 km² at 10 m is 10,000 pixels; at 40 m it is 625.
        executor
            .run_analysis(
                &region_with_area(1.0),
                &AnalysisRequest::new("d", Reducer::Mean),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].plan.max_pixels, 1_000);
        assert!((calls[0].plan.scale_meters - 40.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn identical_requests_produce_identical_plans_and_warnings() {
        let script = |n: usize, s: &Submission| {
            if s.plan.scale_meters < 50.0 || n % 10 == 1 {
                over_quota()
            } else {
                ok(&[("NDVI", 0.25)])
            }
        };
        let region = region_with_area(50_000.0);
        let request = AnalysisRequest::new("d", Reducer::Mean);

        let mut runs = Vec::new();
        for _ in 0..2 {
            let backend = ScriptedBackend::new(script);
            let executor = executor(backend, vec![index_dataset("d", 10.0)]);
            runs.push(
                executor
                    .run_analysis(&region, &request, &CancellationToken::new())
                    .await
                    .unwrap(),
            );
        }

        assert_eq!(runs[0].attempts, runs[1].attempts);
        assert_eq!(runs[0].result.warnings, runs[1].result.warnings);
        assert_eq!(runs[0], runs[1]);
    }

    #[tokio::test]
    async fn transient_failures_retry_the_same_plan() {
        let backend =
            ScriptedBackend::new(|n, _| if n < 2 { rate_limited() } else { ok(&[("NDVI", 0.1)]) });
        let executor = executor(backend.clone(), vec![index_dataset("d", 30.0)]);

        let outcome = executor
            .run_analysis(
                &region_with_area(10.0),
                &AnalysisRequest::new("d", Reducer::Mean),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(backend.scales(), vec![(30.0, false); 3]);
        assert_eq!(outcome.plan.step_index, 0);
        assert!(outcome.result.warnings.is_empty());
        assert!(matches!(outcome.attempts[0].outcome, AttemptOutcome::Transient { .. }));
    }

    #[tokio::test]
    async fn exhausted_transient_budget_is_backend_unavailable() {
        let backend = ScriptedBackend::new(|_, _| rate_limited());
        let executor = executor(backend.clone(), vec![index_dataset("d", 30.0)]);

        let err = executor
            .run_analysis(
                &region_with_area(10.0),
                &AnalysisRequest::new("d", Reducer::Mean),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(
            matches!(
                err,
                AnalysisError::BackendUnavailable { attempts: 4, ref last_error }
                    if last_error.contains("429")
            ),
            "{err:?}"
        );
        assert_eq!(backend.calls().len(), 4);
    }

    #[tokio::test]
    async fn transient_budget_is_separate_from_the_ladder() {
        // Alternate: transient, over quota, transient, over quota, ... then success.
        let backend = ScriptedBackend::new(|n, _| match n {
            0 | 2 | 4 => rate_limited(),
            1 | 3 => over_quota(),
            _ => ok(&[("NDVI", 0.3)]),
        });
        let executor = executor(backend.clone(), vec![index_dataset("d", 30.0)]);

        let outcome = executor
            .run_analysis(
                &region_with_area(10.0),
                &AnalysisRequest::new("d", Reducer::Mean),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            backend.scales(),
            vec![
                (30.0, false),
                (30.0, false),
                (60.0, false),
                (60.0, false),
                (120.0, false),
                (120.0, false),
            ]
        );
        assert_eq!(outcome.plan.step_index, 2);
    }

    #[tokio::test]
    async fn compute_errors_are_not_retried() {
        let backend = ScriptedBackend::new(|_, _| {
            Err(BackendError::Compute {
                message: "Image.select: band not found".to_string(),
            })
        });
        let executor = executor(backend.clone(), vec![index_dataset("d", 30.0)]);

        let err = executor
            .run_analysis(
                &region_with_area(10.0),
                &AnalysisRequest::new("d", Reducer::Mean),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Compute { .. }));
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn slow_calls_time_out_as_transient() {
        let backend =
            ScriptedBackend::with_delay(Some(Duration::from_secs(10)), |_, _| ok(&[("NDVI", 0.1)]));
        let config = ExecutorConfig {
            attempt_timeout: Duration::from_millis(20),
            max_transient_retries: 1,
            ..fast_config()
        };
        let executor = executor_with(backend.clone(), vec![index_dataset("d", 30.0)], config);

        let err = executor
            .run_analysis(
                &region_with_area(10.0),
                &AnalysisRequest::new("d", Reducer::Mean),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(
            matches!(err, AnalysisError::BackendUnavailable { attempts: 2, .. }),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn cancellation_abandons_the_in_flight_call() {
        let backend =
            ScriptedBackend::with_delay(Some(Duration::from_secs(10)), |_, _| ok(&[("NDVI", 0.1)]));
        let executor = executor(backend.clone(), vec![index_dataset("d", 30.0)]);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = executor
            .run_analysis(
                &region_with_area(10.0),
                &AnalysisRequest::new("d", Reducer::Mean),
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(executor.permits.available_permits(), 8);
    }

    #[tokio::test]
    async fn cancelled_requests_never_reach_the_backend() {
        let backend = ScriptedBackend::new(|_, _| ok(&[("NDVI", 0.1)]));
        let executor = executor(backend.clone(), vec![index_dataset("d", 30.0)]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = executor
            .run_analysis(
                &region_with_area(10.0),
                &AnalysisRequest::new("d", Reducer::Mean),
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Cancelled));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_requests_never_reach_the_backend() {
        let backend = ScriptedBackend::new(|_, _| ok(&[("NDVI", 0.1)]));
        let executor = executor(backend.clone(), vec![index_dataset("d", 30.0)]);
        let region = region_with_area(10.0);

        for request in [
            AnalysisRequest::new("missing", Reducer::Mean),
            AnalysisRequest::new("d", Reducer::Sum),
            AnalysisRequest {
                bands: vec!["B4".to_string()],
                ..AnalysisRequest::new("d", Reducer::Mean)
            },
        ] {
            let err = executor
                .run_analysis(&region, &request, &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, AnalysisError::InvalidRequest { .. }), "{err:?}");
        }
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn backend_concurrency_is_bounded() {
        let backend =
            ScriptedBackend::with_delay(Some(Duration::from_millis(20)), |_, _| ok(&[("NDVI", 0.1)]));
        let config = ExecutorConfig {
            max_concurrent_backend_calls: 1,
            ..fast_config()
        };
        let executor = executor_with(backend.clone(), vec![index_dataset("d", 30.0)], config);
        let region = region_with_area(10.0);
        let request = AnalysisRequest::new("d", Reducer::Mean);
        let cancel = CancellationToken::new();

        let (a, b, c) = tokio::join!(
            executor.run_analysis(&region, &request, &cancel),
            executor.run_analysis(&region, &request, &cancel),
            executor.run_analysis(&region, &request, &cancel),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(backend.calls().len(), 3);
        assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ladder_has_one_rung_per_step() {
        let backend = ScriptedBackend::new(|_, _| ok(&[]));
        let executor = executor(backend, vec![]);
        let ladder = executor.plan_ladder(&index_dataset("d", 30.0));
        assert_eq!(scales_of_plans(&ladder), vec![30.0, 60.0, 120.0, 240.0]);
        assert!(ladder.iter().all(|p| !p.best_effort));
    }

    #[test]
    fn shrinking_downscale_factor_is_rejected_at_construction() {
        for factor in [0.5, 1.0, f64::NAN] {
            let config = ExecutorConfig {
                downscale_factor: factor,
                ..fast_config()
            };
            let err = AdaptiveQueryExecutor::new(
                ScriptedBackend::new(|_, _| ok(&[])),
                DatasetRegistry::builtin(),
                config,
            )
            .unwrap_err();
            let ConfigError::Invalid { key, .. } = err;
            assert_eq!(key, "INDIAGEO_DOWNSCALE_FACTOR");
        }
    }

    #[test]
    fn zero_concurrency_is_rejected_at_construction() {
        let config = ExecutorConfig {
            max_concurrent_backend_calls: 0,
            ..fast_config()
        };
        assert!(
            AdaptiveQueryExecutor::new(
                ScriptedBackend::new(|_, _| ok(&[])),
                DatasetRegistry::builtin(),
                config,
            )
            .is_err()
        );
    }

    fn scales_of_plans(plans: &[QueryPlan]) -> Vec<f64> {
        plans.iter().map(|p| p.scale_meters).collect()
    }
}
