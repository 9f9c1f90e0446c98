#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for India region resolution and dataset analysis.
//!
//! A thin layer over [`indiageo_region`] and [`indiageo_analysis`]: it
//! resolves region descriptors against the administrative index loaded
//! at startup and runs analyses through the adaptive executor, mapping
//! their errors onto HTTP status codes.

mod handlers;

use std::path::PathBuf;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use indiageo_analysis::{AdaptiveQueryExecutor, DatasetRegistry, ExecutorConfig, HttpBackend};
use indiageo_region::{AdministrativeIndex, RegionResolver, SharedIndex, load_index};

/// Boundary file used when `INDIAGEO_BOUNDARIES_PATH` is unset.
const DEFAULT_BOUNDARIES_PATH: &str = "data/boundaries/gaul_india.geojson";

/// Compute endpoint used when `INDIAGEO_BACKEND_URL` is unset.
const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8090/v1/compute";

/// Shared application state.
pub struct AppState {
    /// Current administrative index. Swapped on reload.
    pub index: SharedIndex,
    /// Analysis executor, owning the dataset registry and backend.
    pub executor: AdaptiveQueryExecutor,
    /// Boundary file the index was loaded from, if any.
    pub boundaries_path: Option<PathBuf>,
}

impl AppState {
    /// A resolver over the current index snapshot.
    #[must_use]
    pub fn resolver(&self) -> RegionResolver {
        RegionResolver::new(self.index.snapshot())
    }
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/datasets", web::get().to(handlers::datasets))
            .route(
                "/datasets/{dataset}/analysis",
                web::post().to(handlers::run_analysis),
            )
            .route(
                "/regions/available",
                web::get().to(handlers::available_regions),
            )
            .route("/regions/search", web::get().to(handlers::search_regions))
            .route("/regions/resolve", web::post().to(handlers::resolve_region))
            .route("/regions/reload", web::post().to(handlers::reload_regions)),
    );
}

/// Starts the india-geo API server.
///
/// Loads the administrative boundaries, reads the executor configuration
/// and backend endpoint from the environment, and starts the Actix-Web
/// HTTP server. The caller provides the async runtime (e.g. via
/// `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the boundary file cannot be
/// loaded, the executor configuration is invalid, or the HTTP server
/// fails to bind or encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let boundaries_path = std::env::var("INDIAGEO_BOUNDARIES_PATH")
        .map_or_else(|_| PathBuf::from(DEFAULT_BOUNDARIES_PATH), PathBuf::from);
    let (index, boundaries_path) = if boundaries_path.exists() {
        let index = load_index(&boundaries_path).map_err(std::io::Error::other)?;
        (index, Some(boundaries_path))
    } else {
        log::warn!(
            "Boundary file {} not found; only cities and bounding boxes will resolve",
            boundaries_path.display()
        );
        (AdministrativeIndex::default(), None)
    };
    log::info!("Indexed {} administrative records", index.len());

    let config = ExecutorConfig::from_env().map_err(std::io::Error::other)?;
    log::info!("Executor configuration: {config:?}");

    let backend_url =
        std::env::var("INDIAGEO_BACKEND_URL").unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string());
    let token = std::env::var("INDIAGEO_BACKEND_TOKEN")
        .ok()
        .filter(|t| !t.is_empty());
    if token.is_none() {
        log::warn!("INDIAGEO_BACKEND_TOKEN is not set; backend requests are unauthenticated");
    }
    log::info!("Using compute backend at {backend_url}");

    let datasets = DatasetRegistry::builtin();
    log::info!("Loaded {} datasets", datasets.len());

    let executor = AdaptiveQueryExecutor::new(
        Arc::new(HttpBackend::new(backend_url, token)),
        datasets,
        config,
    )
    .map_err(std::io::Error::other)?;

    let state = web::Data::new(AppState {
        index: SharedIndex::new(index),
        executor,
        boundaries_path,
    });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
