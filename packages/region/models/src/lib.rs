#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Region descriptor, administrative boundary, and resolved region types.
//!
//! A caller describes *where* an analysis should run with a
//! [`RegionDescriptor`]. The resolver turns that into a
//! [`ResolvedRegion`] backed by a concrete geometry, drawing either on the
//! fixed city gazetteer or on the table of [`AdministrativeRecord`]s
//! loaded from the FAO GAUL boundaries at startup.

use std::fmt;

use geo::{MultiPolygon, Point};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A geographic bounding box in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western longitude boundary.
    pub west: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Northern latitude boundary.
    pub north: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Creates a bounding box from a `[west, south, east, north]` array.
    #[must_use]
    pub const fn from_array(coords: [f64; 4]) -> Self {
        Self::new(coords[0], coords[1], coords[2], coords[3])
    }

    /// Returns the coordinates as `[west, south, east, north]`.
    #[must_use]
    pub const fn to_array(self) -> [f64; 4] {
        [self.west, self.south, self.east, self.north]
    }

    /// Geographic center of the box.
    #[must_use]
    pub fn center(self) -> Point<f64> {
        Point::new(
            f64::midpoint(self.west, self.east),
            f64::midpoint(self.south, self.north),
        )
    }
}

/// Administrative hierarchy level of a GAUL boundary.
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
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AdminLevel {
    /// ADM0: the country itself.
    Country,
    /// ADM1: state or union territory.
    State,
    /// ADM2: district.
    District,
}

/// An administrative unit loaded from the boundary data source.
///
/// Immutable once loaded. Several records may share a `name` under
/// different parents (duplicate district names across states are common
/// in GAUL), which is expected and resolved by parent qualification.
#[derive(Debug, Clone, PartialEq)]
pub struct AdministrativeRecord {
    /// GAUL code (e.g. `"17102"`).
    pub code: String,
    /// Display name as it appears in the source (e.g. `"Tumkur"`).
    pub name: String,
    /// Code of the enclosing unit, `None` for the country.
    pub parent_code: Option<String>,
    /// Hierarchy level.
    pub level: AdminLevel,
    /// Boundary polygon(s) in WGS84.
    pub geometry: MultiPolygon<f64>,
    /// Surface area in square kilometres. Always positive.
    pub area_km2: f64,
}

/// Caller-supplied description of the region to analyse.
///
/// Exactly one variant is active per request. Matched exhaustively at the
/// single resolution entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegionDescriptor {
    /// One of the predefined cities in the gazetteer (e.g. `"Mumbai"`).
    #[serde(rename = "city")]
    NamedCity {
        /// City name, matched case-insensitively.
        name: String,
    },
    /// A GAUL state or district name, optionally qualified by its parent.
    #[serde(rename = "administrative")]
    AdministrativeName {
        /// State or district name.
        name: String,
        /// Name of the enclosing unit (e.g. the state of a district).
        #[serde(default, alias = "state_name", skip_serializing_if = "Option::is_none")]
        parent: Option<String>,
    },
    /// A raw WGS84 bounding box.
    #[serde(rename = "bbox")]
    BoundingBox {
        /// Western longitude boundary.
        west: f64,
        /// Southern latitude boundary.
        south: f64,
        /// Eastern longitude boundary.
        east: f64,
        /// Northern latitude boundary.
        north: f64,
    },
}

impl RegionDescriptor {
    /// Convenience constructor for [`Self::NamedCity`].
    #[must_use]
    pub fn city(name: impl Into<String>) -> Self {
        Self::NamedCity { name: name.into() }
    }

    /// Convenience constructor for an unqualified [`Self::AdministrativeName`].
    #[must_use]
    pub fn administrative(name: impl Into<String>) -> Self {
        Self::AdministrativeName {
            name: name.into(),
            parent: None,
        }
    }

    /// Convenience constructor for a parent-qualified [`Self::AdministrativeName`].
    #[must_use]
    pub fn administrative_in(name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self::AdministrativeName {
            name: name.into(),
            parent: Some(parent.into()),
        }
    }

    /// Convenience constructor for [`Self::BoundingBox`].
    #[must_use]
    pub const fn bbox(bbox: BoundingBox) -> Self {
        Self::BoundingBox {
            west: bbox.west,
            south: bbox.south,
            east: bbox.east,
            north: bbox.north,
        }
    }
}

impl fmt::Display for RegionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NamedCity { name } => write!(f, "city '{name}'"),
            Self::AdministrativeName { name, parent: None } => {
                write!(f, "administrative unit '{name}'")
            }
            Self::AdministrativeName {
                name,
                parent: Some(parent),
            } => write!(f, "administrative unit '{name}' in '{parent}'"),
            Self::BoundingBox {
                west,
                south,
                east,
                north,
            } => write!(f, "bbox [{west}, {south}, {east}, {north}]"),
        }
    }
}

/// Where a [`ResolvedRegion`]'s geometry came from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RegionSource {
    /// Predefined city gazetteer.
    City,
    /// GAUL ADM0 (the whole country).
    GaulCountry,
    /// GAUL ADM1 state.
    GaulState,
    /// GAUL ADM2 district.
    GaulDistrict,
    /// Caller-supplied bounding box.
    Custom,
}

impl From<AdminLevel> for RegionSource {
    fn from(level: AdminLevel) -> Self {
        match level {
            AdminLevel::Country => Self::GaulCountry,
            AdminLevel::State => Self::GaulState,
            AdminLevel::District => Self::GaulDistrict,
        }
    }
}

/// One of several administrative units matching an ambiguous name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionCandidate {
    /// Unit name.
    pub name: String,
    /// Name of the enclosing unit, if any.
    pub parent_name: Option<String>,
    /// GAUL code.
    pub code: String,
    /// Hierarchy level.
    pub level: AdminLevel,
}

/// A region descriptor turned into concrete geometry.
///
/// Created per request and discarded once the response is produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRegion {
    /// Human-readable label (e.g. `"Mumbai"`, `"Tumkur, Karnataka"`).
    pub label: String,
    /// Region geometry in WGS84.
    pub geometry: MultiPolygon<f64>,
    /// Centroid of the geometry.
    pub centroid: Point<f64>,
    /// Envelope of the geometry.
    pub bounds: BoundingBox,
    /// Surface area in square kilometres. Always positive.
    pub area_km2: f64,
    /// Which lookup produced the geometry.
    pub source: RegionSource,
    /// GAUL codes of the records merged into this region (empty for
    /// cities and custom boxes).
    pub codes: Vec<String>,
    /// Suggested map zoom level for displaying the region.
    pub zoom: u8,
}
