//! HTTP handler functions for the india-geo API.

use actix_web::{HttpResponse, http::header, web};
use indiageo_analysis::{AnalysisError, AnalysisOutcome, AnalysisRequest, DatasetAdapter};
use indiageo_region::{RegionError, SearchOptions, gazetteer, load_index};
use indiageo_region_models::{AdminLevel, RegionDescriptor, ResolvedRegion};
use indiageo_server_models::{
    AnalysisBody, ApiAnalysis, ApiAvailableRegion, ApiBand, ApiDataset, ApiError, ApiHealth,
    ApiPlan, ApiRegion, ApiSearchHit, RegionSearchParams,
};
use tokio_util::sync::CancellationToken;

use crate::AppState;

const DEFAULT_SEARCH_LIMIT: usize = 20;
const MAX_SEARCH_LIMIT: usize = 100;

/// Seconds a client should wait before retrying after the backend was
/// unreachable.
const RETRY_AFTER_SECS: u64 = 60;

/// `GET /api/health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        administrative_records: state.index.snapshot().len(),
        datasets: state.executor.datasets().len(),
    })
}

/// `GET /api/datasets`
///
/// Lists every dataset with its band catalog and supported reducers.
pub async fn datasets(state: web::Data<AppState>) -> HttpResponse {
    let list: Vec<ApiDataset> = state
        .executor
        .datasets()
        .iter()
        .map(|dataset| api_dataset(dataset.as_ref()))
        .collect();

    HttpResponse::Ok().json(list)
}

/// `GET /api/regions/available`
///
/// Lists the predefined city regions.
pub async fn available_regions() -> HttpResponse {
    let regions: Vec<ApiAvailableRegion> = gazetteer::available_regions()
        .iter()
        .map(|region| ApiAvailableRegion {
            key: region.key.to_string(),
            name: region.name.to_string(),
            description: region.description.to_string(),
            bounds: region.bounds.to_array(),
            zoom: region.zoom,
        })
        .collect();

    HttpResponse::Ok().json(regions)
}

/// `GET /api/regions/search`
///
/// Ranked substring search over states and districts. Each hit carries a
/// descriptor that can be posted back to resolve it.
pub async fn search_regions(
    state: web::Data<AppState>,
    params: web::Query<RegionSearchParams>,
) -> HttpResponse {
    let level = match parse_level(params.level.as_deref()) {
        Ok(level) => level,
        Err(message) => {
            return HttpResponse::BadRequest().json(ApiError::new("invalid_request", message));
        }
    };

    let index = state.index.snapshot();
    let options = SearchOptions {
        level,
        limit: Some(
            params
                .limit
                .unwrap_or(DEFAULT_SEARCH_LIMIT)
                .min(MAX_SEARCH_LIMIT),
        ),
    };

    let hits: Vec<ApiSearchHit> = index
        .search_with(&params.q, options)
        .into_iter()
        .map(|record| ApiSearchHit {
            name: record.name.clone(),
            code: record.code.clone(),
            level: record.level,
            parent_name: index.parent_name(record).map(str::to_string),
            area_km2: record.area_km2,
            descriptor: index.descriptor_for(record),
        })
        .collect();

    HttpResponse::Ok().json(hits)
}

/// `POST /api/regions/resolve`
///
/// Resolves a region descriptor and returns its geometry.
pub async fn resolve_region(
    state: web::Data<AppState>,
    descriptor: web::Json<RegionDescriptor>,
) -> HttpResponse {
    match state.resolver().resolve(&descriptor) {
        Ok(region) => HttpResponse::Ok().json(api_region(&region, true)),
        Err(e) => region_error_response(&e),
    }
}

/// `POST /api/regions/reload`
///
/// Rebuilds the administrative index from the boundary file and swaps it
/// in. Requests already running keep the index they started with.
pub async fn reload_regions(state: web::Data<AppState>) -> HttpResponse {
    let Some(path) = state.boundaries_path.clone() else {
        return HttpResponse::Conflict().json(ApiError::new(
            "index_error",
            "No boundary file is configured",
        ));
    };

    match web::block(move || load_index(&path)).await {
        Ok(Ok(index)) => {
            let count = index.len();
            let previous = state.index.replace(index);
            log::info!(
                "Reloaded administrative index: {} -> {count} records",
                previous.len()
            );
            HttpResponse::Ok().json(serde_json::json!({ "administrativeRecords": count }))
        }
        Ok(Err(e)) => region_error_response(&e),
        Err(e) => {
            log::error!("Boundary reload task failed: {e}");
            HttpResponse::InternalServerError()
                .json(ApiError::new("index_error", "Failed to reload boundaries"))
        }
    }
}

/// `POST /api/datasets/{dataset}/analysis`
///
/// Resolves the region, then runs the analysis through the adaptive
/// executor. A result degraded by downscaling is a normal `200`; a
/// computation the backend rejected at every plan is a `200` with
/// `partial: true` and null statistics.
pub async fn run_analysis(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<AnalysisBody>,
) -> HttpResponse {
    let dataset_id = path.into_inner();
    if state.executor.datasets().get(&dataset_id).is_none() {
        return HttpResponse::NotFound().json(ApiError::new(
            "not_found",
            format!("Unknown dataset '{dataset_id}'"),
        ));
    }

    let body = body.into_inner();
    let region = match state.resolver().resolve(&body.region) {
        Ok(region) => region,
        Err(e) => return region_error_response(&e),
    };

    let request = AnalysisRequest {
        dataset_id,
        bands: body.bands,
        reducer: body.reducer,
        date_range: body.date_range,
        include_geometry: body.include_geometry,
        include_visualization: body.include_visualization,
    };

    // Dropping this future (client disconnect) abandons the backend call.
    let cancel = CancellationToken::new();
    let outcome = state
        .executor
        .run_analysis(&region, &request, &cancel)
        .await;

    analysis_response(&request.dataset_id, &region, outcome)
}

fn analysis_response(
    dataset_id: &str,
    region: &ResolvedRegion,
    outcome: Result<AnalysisOutcome, AnalysisError>,
) -> HttpResponse {
    let (result, plan, attempts, partial) = match outcome {
        Ok(outcome) => (outcome.result, outcome.plan, outcome.attempts, false),
        Err(AnalysisError::PartialResult {
            plan,
            result,
            attempts,
        }) => (*result, plan, attempts, true),
        Err(e @ AnalysisError::InvalidRequest { .. }) => {
            return HttpResponse::BadRequest().json(ApiError::new("invalid_request", e.to_string()));
        }
        Err(e @ AnalysisError::BackendUnavailable { .. }) => {
            log::error!("Analysis of {dataset_id} over {} failed: {e}", region.label);
            return HttpResponse::ServiceUnavailable()
                .insert_header((header::RETRY_AFTER, RETRY_AFTER_SECS.to_string()))
                .json(ApiError::new("backend_unavailable", e.to_string()));
        }
        Err(e @ AnalysisError::Compute { .. }) => {
            log::error!("Analysis of {dataset_id} over {} failed: {e}", region.label);
            return HttpResponse::BadGateway().json(ApiError::new("compute_failed", e.to_string()));
        }
        Err(e @ AnalysisError::Cancelled) => {
            return HttpResponse::ServiceUnavailable().json(ApiError::new("cancelled", e.to_string()));
        }
    };

    let mut api_region = api_region(region, false);
    api_region.geometry = result.geometry_echo;

    HttpResponse::Ok().json(ApiAnalysis {
        dataset: dataset_id.to_string(),
        region: api_region,
        statistics: result.statistics,
        visualization: result.visualization,
        warnings: result.warnings,
        partial,
        plan: ApiPlan::new(&plan, attempts),
    })
}

fn region_error_response(e: &RegionError) -> HttpResponse {
    match e {
        RegionError::InvalidBounds { .. } => {
            HttpResponse::BadRequest().json(ApiError::new("invalid_bounds", e.to_string()))
        }
        RegionError::NotFound { .. } => {
            HttpResponse::NotFound().json(ApiError::new("not_found", e.to_string()))
        }
        RegionError::Ambiguous { candidates, .. } => HttpResponse::Conflict().json(ApiError {
            kind: "ambiguous_region".to_string(),
            error: e.to_string(),
            candidates: candidates.clone(),
        }),
        RegionError::Index { .. } | RegionError::Boundary(_) => {
            log::error!("Region index error: {e}");
            HttpResponse::InternalServerError().json(ApiError::new("index_error", e.to_string()))
        }
    }
}

/// Parses the `level` search filter: `state`, `district`, `country`, or
/// `both`/absent for no filter.
fn parse_level(level: Option<&str>) -> Result<Option<AdminLevel>, String> {
    match level.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) if s.eq_ignore_ascii_case("both") => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| format!("Unknown level '{s}' (expected state, district, or both)")),
    }
}

fn api_dataset(dataset: &dyn DatasetAdapter) -> ApiDataset {
    ApiDataset {
        id: dataset.id().to_string(),
        name: dataset.name().to_string(),
        native_scale_meters: dataset.native_scale_meters(),
        collection: dataset.is_collection(),
        bands: dataset
            .bands()
            .iter()
            .map(|band| ApiBand {
                name: band.name.clone(),
                description: band.description.clone(),
                unit: band.unit.clone(),
                valid_range: band.valid_range,
            })
            .collect(),
        default_bands: dataset.default_bands().to_vec(),
        reducers: dataset
            .supported_reducers()
            .iter()
            .map(ToString::to_string)
            .collect(),
        visualization: dataset.visualization().is_some(),
    }
}

fn api_region(region: &ResolvedRegion, include_geometry: bool) -> ApiRegion {
    ApiRegion {
        label: region.label.clone(),
        source: region.source,
        bounds: region.bounds,
        centroid: [region.centroid.x(), region.centroid.y()],
        area_km2: region.area_km2,
        codes: region.codes.clone(),
        zoom: region.zoom,
        geometry: include_geometry.then(|| {
            let geometry = geojson::Geometry::new(geojson::Value::from(&region.geometry));
            serde_json::Value::Object(geojson::JsonObject::from(&geometry))
        }),
    }
}
