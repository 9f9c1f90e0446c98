//! Per-dataset metadata and the [`DatasetAdapter`] seam.
//!
//! The executor never branches on a dataset id. Everything it needs to
//! know about a dataset (native resolution, which bands exist, which
//! reducers make sense, how values should be validated and rendered)
//! comes through [`DatasetAdapter`]. The built-in datasets are
//! [`DatasetDefinition`]s deserialized from the TOML files in
//! `datasets/` (see [`crate::registry`]).

use indiageo_analysis_models::ReducerKind;
use serde::{Deserialize, Serialize};

/// A band in a dataset's catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandInfo {
    /// Band name as known to the backend (e.g. `"treecover2000"`).
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Unit of the band values, if meaningful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Physically valid `[min, max]` range. Reduced values outside it are
    /// reported as missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_range: Option<[f64; 2]>,
}

/// Rendering parameters for thumbnails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationParams {
    /// Band to render.
    pub band: String,
    /// Value mapped to the first palette colour.
    pub min: f64,
    /// Value mapped to the last palette colour.
    pub max: f64,
    /// Colour ramp.
    pub palette: Vec<String>,
}

/// Everything the executor needs to know about one dataset.
pub trait DatasetAdapter: std::fmt::Debug + Send + Sync {
    /// Stable identifier used in request paths (e.g. `"jrc-water"`).
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Backend asset identifier.
    fn asset(&self) -> &str;

    /// Whether the asset is a time series that accepts a date range.
    fn is_collection(&self) -> bool;

    /// Native ground sampling distance in metres per pixel.
    fn native_scale_meters(&self) -> f64;

    /// The band catalog.
    fn bands(&self) -> &[BandInfo];

    /// Bands used when a request names none.
    fn default_bands(&self) -> &[String];

    /// Reducer families this dataset supports.
    fn supported_reducers(&self) -> &[ReducerKind];

    /// Per-dataset pixel ceiling, overriding the executor default.
    fn max_pixels(&self) -> Option<u64>;

    /// Thumbnail rendering parameters.
    fn visualization(&self) -> Option<&VisualizationParams>;

    /// Looks up a band in the catalog.
    fn band(&self, name: &str) -> Option<&BandInfo> {
        self.bands().iter().find(|b| b.name == name)
    }

    /// Whether the dataset supports a reducer family.
    fn supports(&self, kind: ReducerKind) -> bool {
        self.supported_reducers().contains(&kind)
    }
}

/// A dataset described by a TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDefinition {
    /// Stable identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Short description.
    pub description: String,
    /// Backend asset identifier.
    pub asset: String,
    /// Whether the asset is an image collection (time series).
    #[serde(default)]
    pub collection: bool,
    /// Native resolution in metres per pixel.
    pub native_scale_meters: f64,
    /// Bands used when a request names none.
    pub default_bands: Vec<String>,
    /// Supported reducer families.
    pub reducers: Vec<ReducerKind>,
    /// Optional per-dataset pixel ceiling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pixels: Option<u64>,
    /// Band catalog.
    pub bands: Vec<BandInfo>,
    /// Thumbnail rendering parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization: Option<VisualizationParams>,
}

impl DatasetAdapter for DatasetDefinition {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn asset(&self) -> &str {
        &self.asset
    }

    fn is_collection(&self) -> bool {
        self.collection
    }

    fn native_scale_meters(&self) -> f64 {
        self.native_scale_meters
    }

    fn bands(&self) -> &[BandInfo] {
        &self.bands
    }

    fn default_bands(&self) -> &[String] {
        &self.default_bands
    }

    fn supported_reducers(&self) -> &[ReducerKind] {
        &self.reducers
    }

    fn max_pixels(&self) -> Option<u64> {
        self.max_pixels
    }

    fn visualization(&self) -> Option<&VisualizationParams> {
        self.visualization.as_ref()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A single-band dataset with a `[-1, 1]` valid range.
    pub fn index_dataset(id: &str, native_scale_meters: f64) -> DatasetDefinition {
        DatasetDefinition {
            id: id.to_string(),
            name: format!("{id} test dataset"),
            description: String::new(),
            asset: format!("TEST/{id}"),
            collection: false,
            native_scale_meters,
            default_bands: vec!["NDVI".to_string()],
            reducers: vec![ReducerKind::Mean, ReducerKind::Max, ReducerKind::Percentile],
            max_pixels: None,
            bands: vec![
                BandInfo {
                    name: "NDVI".to_string(),
                    description: "Vegetation index".to_string(),
                    unit: None,
                    valid_range: Some([-1.0, 1.0]),
                },
                BandInfo {
                    name: "EVI".to_string(),
                    description: "Enhanced vegetation index".to_string(),
                    unit: None,
                    valid_range: None,
                },
            ],
            visualization: Some(VisualizationParams {
                band: "NDVI".to_string(),
                min: -1.0,
                max: 1.0,
                palette: vec!["red".to_string(), "green".to_string()],
            }),
        }
    }
}
