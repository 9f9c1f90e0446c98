//! Request checks that run before any backend call.

use indiageo_analysis_models::{AnalysisRequest, DateRange, Reducer};

use crate::AnalysisError;
use crate::dataset::DatasetAdapter;

/// A request that has passed validation against its dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    /// Bands to reduce, defaults substituted.
    pub bands: Vec<String>,
    /// Date range to send, `None` for single-image datasets.
    pub date_range: Option<DateRange>,
    /// Notes about parts of the request that were ignored.
    pub notes: Vec<String>,
}

/// Checks a request against the dataset's band catalog and capabilities.
///
/// # Errors
///
/// Returns [`AnalysisError::InvalidRequest`] for unknown or repeated
/// bands, unsupported reducers, percentiles above 100, and date ranges
/// that end before they start.
pub fn validate_request(
    dataset: &dyn DatasetAdapter,
    request: &AnalysisRequest,
) -> Result<ValidatedRequest, AnalysisError> {
    let invalid = |message: String| AnalysisError::InvalidRequest { message };

    let bands = if request.bands.is_empty() {
        dataset.default_bands().to_vec()
    } else {
        request.bands.clone()
    };

    for (i, band) in bands.iter().enumerate() {
        if dataset.band(band).is_none() {
            let known: Vec<&str> = dataset.bands().iter().map(|b| b.name.as_str()).collect();
            return Err(invalid(format!(
                "Unknown band '{band}' for dataset {} (available: {})",
                dataset.id(),
                known.join(", ")
            )));
        }
        if bands[..i].contains(band) {
            return Err(invalid(format!("Band '{band}' requested more than once")));
        }
    }

    if let Reducer::Percentile(p) = request.reducer {
        if p > 100 {
            return Err(invalid(format!("Percentile must be within 0..=100, got {p}")));
        }
    }

    if !dataset.supports(request.reducer.kind()) {
        return Err(invalid(format!(
            "Dataset {} does not support the {} reducer",
            dataset.id(),
            request.reducer
        )));
    }

    let mut notes = Vec::new();

    let date_range = match request.date_range {
        Some(range) if range.start > range.end => {
            return Err(invalid(format!(
                "Date range starts after it ends ({} > {})",
                range.start, range.end
            )));
        }
        Some(range) if !dataset.is_collection() => {
            notes.push(format!(
                "dataset {} is a single image; date range {}..{} ignored",
                dataset.id(),
                range.start,
                range.end
            ));
            None
        }
        other => other,
    };

    if request.include_visualization && dataset.visualization().is_none() {
        notes.push(format!(
            "dataset {} has no visualization parameters; no thumbnail rendered",
            dataset.id()
        ));
    }

    Ok(ValidatedRequest {
        bands,
        date_range,
        notes,
    })
}
