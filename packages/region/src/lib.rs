#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Region resolution for Indian administrative units and cities.
//!
//! Turns a [`RegionDescriptor`] into a [`ResolvedRegion`] with concrete
//! geometry. Three sources are consulted, selected by descriptor variant:
//!
//! 1. **Custom bounding box**: validated and used directly.
//! 2. **City gazetteer** ([`gazetteer`]): a fixed list of predefined
//!    city boxes, matched exactly and case-insensitively.
//! 3. **Administrative index** ([`index`]): GAUL states and districts
//!    loaded once at startup via [`boundary`], looked up by normalized
//!    name and optionally qualified by parent.
//!
//! Duplicate district names across states are surfaced as
//! [`RegionError::Ambiguous`] with the full candidate list, never resolved
//! silently.

pub mod boundary;
pub mod gazetteer;
pub mod geometry;
pub mod index;
pub mod normalize;
pub mod resolver;

pub use boundary::BoundaryLoadError;
pub use index::{AdministrativeIndex, SearchOptions, SharedIndex};
pub use indiageo_region_models::{
    AdminLevel, AdministrativeRecord, BoundingBox, RegionCandidate, RegionDescriptor,
    RegionSource, ResolvedRegion,
};
pub use resolver::RegionResolver;

use thiserror::Error;

/// Errors from region resolution.
#[derive(Debug, Error)]
pub enum RegionError {
    /// A bounding box failed validation.
    #[error(
        "Invalid bounds [{}, {}, {}, {}]: {reason}",
        bbox.west,
        bbox.south,
        bbox.east,
        bbox.north
    )]
    InvalidBounds {
        /// The rejected box.
        bbox: BoundingBox,
        /// Which constraint was violated.
        reason: String,
    },

    /// No city or administrative unit matches the descriptor.
    #[error("Region not found: {descriptor}")]
    NotFound {
        /// The descriptor that failed to match.
        descriptor: RegionDescriptor,
    },

    /// The name matches units under more than one parent.
    #[error("'{name}' is ambiguous: {} matching units", candidates.len())]
    Ambiguous {
        /// The name as supplied.
        name: String,
        /// Every matching unit, ordered by parent name then code.
        candidates: Vec<RegionCandidate>,
    },

    /// The boundary table could not be indexed.
    #[error("Index error: {message}")]
    Index {
        /// Description of the problem.
        message: String,
    },

    /// The boundary data source could not be loaded.
    #[error(transparent)]
    Boundary(#[from] BoundaryLoadError),
}

/// Loads a boundary file and builds an index from it.
///
/// # Errors
///
/// Returns [`RegionError::Boundary`] if the file cannot be loaded, or
/// [`RegionError::Index`] if the records cannot be indexed.
pub fn load_index(path: &std::path::Path) -> Result<AdministrativeIndex, RegionError> {
    let records = boundary::load_file(path)?;
    AdministrativeIndex::build(records)
}
