//! Boundary data source loading.
//!
//! The administrative table is read in full at startup from a GeoJSON
//! `FeatureCollection`. Two layouts are accepted:
//!
//! * **Flat**: one feature per unit with `code`, `name`, `level`,
//!   optional `parent_code` and optional `area_km2` properties.
//! * **GAUL level 2**: a raw FAO GAUL ADM2 export (`ADM0_*`, `ADM1_*`,
//!   `ADM2_*` properties). District records are taken as-is; state and
//!   country records are derived by collecting their districts' polygons
//!   and summing their areas. Only features with `ADM0_NAME == "India"`
//!   are kept.
//!
//! Features that cannot be converted are logged and skipped rather than
//! failing the whole load.

use std::collections::BTreeMap;
use std::path::Path;

use geo::{MultiPolygon, Polygon};
use geojson::{Feature, GeoJson, JsonObject};
use indiageo_region_models::{AdminLevel, AdministrativeRecord};
use thiserror::Error;

use crate::geometry::geodesic_area_km2;

/// Country name used to filter GAUL exports.
pub const GAUL_COUNTRY: &str = "India";

/// Errors that can occur while loading boundary data.
#[derive(Debug, Error)]
pub enum BoundaryLoadError {
    /// Reading the boundary file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid GeoJSON.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The GeoJSON is valid but not usable as a boundary table.
    #[error("Invalid boundary data: {message}")]
    Invalid {
        /// Description of what went wrong.
        message: String,
    },
}

/// Reads and parses a boundary file.
///
/// # Errors
///
/// Returns [`BoundaryLoadError`] if the file cannot be read, is not
/// GeoJSON, or is not a `FeatureCollection`.
pub fn load_file(path: &Path) -> Result<Vec<AdministrativeRecord>, BoundaryLoadError> {
    log::info!("Loading administrative boundaries from {}", path.display());
    let text = std::fs::read_to_string(path)?;
    parse_str(&text)
}

/// Parses a boundary table from GeoJSON text, detecting the layout from
/// the first feature's properties.
///
/// # Errors
///
/// Returns [`BoundaryLoadError`] if the text is not a GeoJSON
/// `FeatureCollection`.
pub fn parse_str(text: &str) -> Result<Vec<AdministrativeRecord>, BoundaryLoadError> {
    let geojson: GeoJson = text.parse()?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(BoundaryLoadError::Invalid {
            message: "expected a FeatureCollection".to_string(),
        });
    };

    let is_gaul = collection
        .features
        .first()
        .and_then(|f| f.properties.as_ref())
        .is_some_and(|props| props.contains_key("ADM2_NAME"));

    let records = if is_gaul {
        records_from_gaul(collection.features)
    } else {
        records_from_flat(collection.features)
    };

    log::info!(
        "Parsed {} administrative records ({} layout)",
        records.len(),
        if is_gaul { "GAUL level 2" } else { "flat" }
    );

    Ok(records)
}

fn records_from_flat(features: Vec<Feature>) -> Vec<AdministrativeRecord> {
    let mut records = Vec::with_capacity(features.len());

    for feature in features {
        let Some(props) = feature.properties.as_ref() else {
            log::warn!("Skipping boundary feature without properties");
            continue;
        };

        let (Some(code), Some(name)) = (property_string(props, "code"), property_string(props, "name"))
        else {
            log::warn!("Skipping boundary feature without code/name");
            continue;
        };

        let Some(level) =
            property_string(props, "level").and_then(|l| l.parse::<AdminLevel>().ok())
        else {
            log::warn!("Skipping boundary {code}: missing or unknown level");
            continue;
        };

        let Some(geometry) = feature.geometry.and_then(to_multipolygon) else {
            log::warn!("Failed to parse GeoJSON for boundary {code}");
            continue;
        };

        let area_km2 = props
            .get("area_km2")
            .and_then(serde_json::Value::as_f64)
            .filter(|a| *a > 0.0)
            .unwrap_or_else(|| geodesic_area_km2(&geometry));

        if area_km2 <= 0.0 {
            log::warn!("Skipping boundary {code}: zero area");
            continue;
        }

        records.push(AdministrativeRecord {
            code,
            name,
            parent_code: property_string(props, "parent_code"),
            level,
            geometry,
            area_km2,
        });
    }

    records
}

/// A state or country being assembled from its districts.
struct Aggregate {
    name: String,
    parent_code: Option<String>,
    polygons: Vec<Polygon<f64>>,
    area_km2: f64,
}

impl Aggregate {
    const fn new(name: String, parent_code: Option<String>) -> Self {
        Self {
            name,
            parent_code,
            polygons: Vec::new(),
            area_km2: 0.0,
        }
    }

    fn absorb(&mut self, geometry: &MultiPolygon<f64>, area_km2: f64) {
        self.polygons.extend(geometry.0.iter().cloned());
        self.area_km2 += area_km2;
    }

    fn into_record(self, code: String, level: AdminLevel) -> AdministrativeRecord {
        AdministrativeRecord {
            code,
            name: self.name,
            parent_code: self.parent_code,
            level,
            geometry: MultiPolygon(self.polygons),
            area_km2: self.area_km2,
        }
    }
}

fn records_from_gaul(features: Vec<Feature>) -> Vec<AdministrativeRecord> {
    let mut country: Option<(String, Aggregate)> = None;
    let mut states: BTreeMap<String, Aggregate> = BTreeMap::new();
    let mut districts = Vec::new();
    let mut skipped_other_countries = 0usize;

    for feature in features {
        let Some(props) = feature.properties.as_ref() else {
            continue;
        };

        if property_string(props, "ADM0_NAME").as_deref() != Some(GAUL_COUNTRY) {
            skipped_other_countries += 1;
            continue;
        }

        let (Some(adm0_code), Some(adm1_code), Some(adm1_name), Some(adm2_code), Some(adm2_name)) = (
            property_string(props, "ADM0_CODE"),
            property_string(props, "ADM1_CODE"),
            property_string(props, "ADM1_NAME"),
            property_string(props, "ADM2_CODE"),
            property_string(props, "ADM2_NAME"),
        ) else {
            log::warn!("Skipping GAUL feature with incomplete ADM properties");
            continue;
        };

        let Some(geometry) = feature.geometry.and_then(to_multipolygon) else {
            log::warn!("Failed to parse GeoJSON for GAUL district {adm2_code}");
            continue;
        };

        let area_km2 = geodesic_area_km2(&geometry);
        if area_km2 <= 0.0 {
            log::warn!("Skipping GAUL district {adm2_code}: zero area");
            continue;
        }

        country
            .get_or_insert_with(|| {
                (
                    adm0_code.clone(),
                    Aggregate::new(GAUL_COUNTRY.to_string(), None),
                )
            })
            .1
            .absorb(&geometry, area_km2);

        states
            .entry(adm1_code.clone())
            .or_insert_with(|| Aggregate::new(adm1_name, Some(adm0_code)))
            .absorb(&geometry, area_km2);

        districts.push(AdministrativeRecord {
            code: adm2_code,
            name: adm2_name,
            parent_code: Some(adm1_code),
            level: AdminLevel::District,
            geometry,
            area_km2,
        });
    }

    if skipped_other_countries > 0 {
        log::debug!("Ignored {skipped_other_countries} GAUL features outside {GAUL_COUNTRY}");
    }

    let mut records = Vec::with_capacity(1 + states.len() + districts.len());
    if let Some((code, aggregate)) = country {
        records.push(aggregate.into_record(code, AdminLevel::Country));
    }
    records.extend(
        states
            .into_iter()
            .map(|(code, aggregate)| aggregate.into_record(code, AdminLevel::State)),
    );
    records.extend(districts);
    records
}

/// Converts a GeoJSON geometry into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn to_multipolygon(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Reads a property as a trimmed, non-empty string. GAUL codes are
/// numeric in some exports, so integral numbers are accepted too.
fn property_string(props: &JsonObject, key: &str) -> Option<String> {
    match props.get(key)? {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        serde_json::Value::Number(n) => Some(
            n.as_i64()
                .map_or_else(|| n.to_string(), |i| i.to_string()),
        ),
        _ => None,
    }
}
