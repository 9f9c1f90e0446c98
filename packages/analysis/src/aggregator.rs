//! Shapes raw backend output into an [`AnalysisResult`].
//!
//! Missing reducer outputs stay `None`; they are never turned into zero.
//! Any degradation the executor applied is reported as a warning on an
//! otherwise normal result.

use indiageo_analysis_models::{AnalysisResult, QueryPlan, Reducer};
use indiageo_region_models::ResolvedRegion;

use crate::backend::RawResult;
use crate::dataset::DatasetAdapter;

/// Statistic key for `band` under `reducer`: the bare reducer label when
/// only one band was requested, `<band>_<label>` otherwise.
#[must_use]
pub fn statistic_key(band: &str, reducer: Reducer, band_count: usize) -> String {
    if band_count == 1 {
        reducer.label()
    } else {
        format!("{band}_{}", reducer.label())
    }
}

/// Warnings describing how `plan` departs from native-resolution,
/// exact computation.
#[must_use]
pub fn degradation_warnings(native_scale_meters: f64, plan: &QueryPlan) -> Vec<String> {
    let mut warnings = Vec::new();

    if plan.step_index > 0 {
        warnings.push(format!(
            "result computed at reduced resolution {}m (native {native_scale_meters}m) due to area size",
            plan.scale_meters
        ));
    }
    if plan.best_effort {
        warnings.push(format!(
            "result computed in best-effort mode at {}m; values may be approximate",
            plan.scale_meters
        ));
    }

    warnings
}

/// Builds uniform results from backend output.
#[derive(Debug, Clone, Copy)]
pub struct ResultAggregator<'a> {
    dataset: &'a dyn DatasetAdapter,
    region: &'a ResolvedRegion,
    bands: &'a [String],
    reducer: Reducer,
}

impl<'a> ResultAggregator<'a> {
    /// An aggregator for one request.
    #[must_use]
    pub const fn new(
        dataset: &'a dyn DatasetAdapter,
        region: &'a ResolvedRegion,
        bands: &'a [String],
        reducer: Reducer,
    ) -> Self {
        Self {
            dataset,
            region,
            bands,
            reducer,
        }
    }

    /// Result for a successful computation under `plan`.
    ///
    /// `notes` are carried over from request validation and come after the
    /// degradation warnings.
    #[must_use]
    pub fn aggregate(
        &self,
        raw: &RawResult,
        plan: &QueryPlan,
        notes: &[String],
        include_geometry: bool,
        include_visualization: bool,
    ) -> AnalysisResult {
        let mut warnings = degradation_warnings(self.dataset.native_scale_meters(), plan);
        warnings.extend(notes.iter().cloned());

        let mut statistics = std::collections::BTreeMap::new();
        for band in self.bands {
            let key = statistic_key(band, self.reducer, self.bands.len());
            let value = match raw.values.get(band).copied().flatten() {
                None => {
                    warnings.push(format!("no valid pixels for band {band} in {}", self.region.label));
                    None
                }
                Some(v) if !v.is_finite() => {
                    warnings.push(format!("{key} is not a finite number; reported as missing"));
                    None
                }
                Some(v) => self.check_range(band, &key, v, &mut warnings),
            };
            statistics.insert(key, value);
        }

        let visualization = if include_visualization {
            if raw.visualization.is_none() && self.dataset.visualization().is_some() {
                warnings.push("backend returned no visualization".to_string());
            }
            raw.visualization.clone()
        } else {
            None
        };

        AnalysisResult {
            statistics,
            geometry_echo: include_geometry.then(|| self.geometry_echo()),
            visualization,
            warnings,
        }
    }

    /// Result for a computation the backend rejected at every plan: every
    /// statistic is missing and the warnings say why.
    #[must_use]
    pub fn unavailable(
        &self,
        last_plan: &QueryPlan,
        notes: &[String],
        include_geometry: bool,
    ) -> AnalysisResult {
        let mut warnings = degradation_warnings(self.dataset.native_scale_meters(), last_plan);
        warnings.extend(notes.iter().cloned());
        warnings.push(format!(
            "backend rejected the computation at every resolution down to {}m, including \
             best-effort mode; statistics are unavailable",
            last_plan.scale_meters
        ));

        AnalysisResult {
            statistics: self
                .bands
                .iter()
                .map(|band| (statistic_key(band, self.reducer, self.bands.len()), None))
                .collect(),
            geometry_echo: include_geometry.then(|| self.geometry_echo()),
            visualization: None,
            warnings,
        }
    }

    /// Values outside the band's physical range are reported as missing.
    /// Sums are exempt since they scale with pixel count.
    fn check_range(&self, band: &str, key: &str, value: f64, warnings: &mut Vec<String>) -> Option<f64> {
        if self.reducer == Reducer::Sum {
            return Some(value);
        }
        match self.dataset.band(band).and_then(|b| b.valid_range) {
            Some([lo, hi]) if value < lo || value > hi => {
                warnings.push(format!(
                    "{key} value {value} is outside the valid range [{lo}, {hi}] for band {band}; \
                     reported as missing"
                ));
                None
            }
            _ => Some(value),
        }
    }

    fn geometry_echo(&self) -> serde_json::Value {
        let geometry = geojson::Geometry::new(geojson::Value::from(&self.region.geometry));
        serde_json::Value::Object(geojson::JsonObject::from(&geometry))
    }
}
