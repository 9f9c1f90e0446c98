//! Compile-time registry of dataset definitions.
//!
//! Each entry is a `(name, toml_content)` pair embedded via `include_str!`.
//! Adding a dataset requires creating a TOML file in `datasets/` and adding
//! a corresponding entry here.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::dataset::{DatasetAdapter, DatasetDefinition};

/// Number of registered datasets. Enforced by a test.
#[cfg(test)]
const EXPECTED_DATASET_COUNT: usize = 7;

/// Embedded TOML dataset definitions.
const DATASET_TOMLS: &[(&str, &str)] = &[
    ("hansen-forest", include_str!("../datasets/hansen-forest.toml")),
    ("jrc-water", include_str!("../datasets/jrc-water.toml")),
    ("merit-hydro", include_str!("../datasets/merit-hydro.toml")),
    (
        "viirs-vegetation",
        include_str!("../datasets/viirs-vegetation.toml"),
    ),
    ("open-buildings", include_str!("../datasets/open-buildings.toml")),
    (
        "open-buildings-temporal",
        include_str!("../datasets/open-buildings-temporal.toml"),
    ),
    ("ndvi-proxy", include_str!("../datasets/ndvi-proxy.toml")),
];

/// Returns all built-in dataset definitions.
///
/// # Panics
///
/// Panics if any embedded TOML file fails to parse. Since these are
/// compile-time constants, parse failures indicate a development error
/// and are caught during CI.
#[must_use]
pub fn all_datasets() -> Vec<DatasetDefinition> {
    DATASET_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse dataset '{name}': {e}"))
        })
        .collect()
}

/// Lookup table from dataset id to adapter.
#[derive(Debug, Clone, Default)]
pub struct DatasetRegistry {
    datasets: BTreeMap<String, Arc<dyn DatasetAdapter>>,
}

impl DatasetRegistry {
    /// The registry of built-in datasets.
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_adapters(
            all_datasets()
                .into_iter()
                .map(|d| Arc::new(d) as Arc<dyn DatasetAdapter>),
        )
    }

    /// Builds a registry from arbitrary adapters. Later adapters replace
    /// earlier ones with the same id.
    pub fn from_adapters(adapters: impl IntoIterator<Item = Arc<dyn DatasetAdapter>>) -> Self {
        Self {
            datasets: adapters
                .into_iter()
                .map(|a| (a.id().to_string(), a))
                .collect(),
        }
    }

    /// Looks up a dataset by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn DatasetAdapter>> {
        self.datasets.get(id).cloned()
    }

    /// All datasets, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn DatasetAdapter>> {
        self.datasets.values()
    }

    /// Number of datasets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}
