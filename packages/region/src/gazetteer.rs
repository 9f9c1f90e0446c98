//! Fixed gazetteer of predefined regions.
//!
//! A small, closed list of city (and whole-country) bounding boxes. City
//! lookups are exact and case-insensitive. Partial-name discovery goes
//! through the administrative search instead.

use indiageo_region_models::BoundingBox;
use serde::Serialize;

use crate::normalize::normalize_name;

/// A predefined region in the gazetteer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredefinedRegion {
    /// Lookup key (lowercase).
    pub key: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Short description.
    pub description: &'static str,
    /// Bounding box in WGS84.
    pub bounds: BoundingBox,
    /// Suggested map zoom level.
    pub zoom: u8,
}

/// Whole-country box, also the map's default view.
pub const INDIA_BOUNDS: BoundingBox = BoundingBox::new(68.0, 6.0, 97.0, 37.0);

const fn region(
    key: &'static str,
    name: &'static str,
    description: &'static str,
    bounds: [f64; 4],
    zoom: u8,
) -> PredefinedRegion {
    PredefinedRegion {
        key,
        name,
        description,
        bounds: BoundingBox::from_array(bounds),
        zoom,
    }
}

const REGIONS: &[PredefinedRegion] = &[
    PredefinedRegion {
        key: "india",
        name: "India",
        description: "Entire India",
        bounds: INDIA_BOUNDS,
        zoom: 5,
    },
    region("mumbai", "Mumbai", "Mumbai metropolitan area", [72.7, 18.8, 73.2, 19.3], 10),
    region("delhi", "Delhi", "Delhi NCR", [76.8, 28.4, 77.5, 28.9], 10),
    region("bangalore", "Bangalore", "Bangalore/Bengaluru city", [77.4, 12.8, 77.8, 13.2], 10),
    region("kolkata", "Kolkata", "Kolkata metropolitan area", [88.2, 22.4, 88.5, 22.7], 10),
    region("chennai", "Chennai", "Chennai city", [80.1, 12.8, 80.3, 13.2], 10),
    region("hyderabad", "Hyderabad", "Hyderabad city", [78.3, 17.3, 78.6, 17.5], 10),
    region("pune", "Pune", "Pune city", [73.7, 18.4, 73.9, 18.6], 10),
    region("ahmedabad", "Ahmedabad", "Ahmedabad city", [72.4, 23.0, 72.7, 23.1], 10),
    region("jaipur", "Jaipur", "Jaipur city", [75.7, 26.8, 75.9, 27.0], 10),
];

/// Alternate spellings mapped onto gazetteer keys.
const ALIASES: &[(&str, &str)] = &[("bengaluru", "bangalore")];

/// Returns every predefined region, in gazetteer order.
#[must_use]
pub const fn available_regions() -> &'static [PredefinedRegion] {
    REGIONS
}

/// Exact, case-insensitive lookup of a predefined region.
#[must_use]
pub fn lookup(name: &str) -> Option<&'static PredefinedRegion> {
    let key = normalize_name(name);
    let key = ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map_or(key.as_str(), |(_, target)| *target);
    REGIONS.iter().find(|r| r.key == key)
}
