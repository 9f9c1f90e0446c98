//! Region resolution: descriptor in, geometry out.
//!
//! [`RegionResolver::resolve`] is the single entry point and matches the
//! closed [`RegionDescriptor`] variant set exhaustively. Resolution never
//! retries and never falls back to a default region: a name that does not
//! match is a [`RegionError::NotFound`], a name that matches under several
//! parents is a [`RegionError::Ambiguous`] carrying the candidates a
//! disambiguation UI needs.

use std::collections::BTreeSet;
use std::sync::Arc;

use geo::MultiPolygon;
use indiageo_region_models::{
    AdminLevel, AdministrativeRecord, BoundingBox, RegionCandidate, RegionDescriptor,
    RegionSource, ResolvedRegion,
};

use crate::RegionError;
use crate::gazetteer;
use crate::geometry::{bbox_area_km2, bbox_polygon, centroid, envelope};
use crate::index::AdministrativeIndex;
use crate::normalize::normalize_name;

/// Zoom used for administrative units and custom boxes.
const DEFAULT_ZOOM: u8 = 8;

/// Zoom used when the whole country is selected.
const COUNTRY_ZOOM: u8 = 5;

/// Resolves [`RegionDescriptor`]s against an administrative index and the
/// city gazetteer.
///
/// Cheap to construct; holds only a snapshot of the shared index.
#[derive(Debug, Clone)]
pub struct RegionResolver {
    index: Arc<AdministrativeIndex>,
}

impl RegionResolver {
    /// Creates a resolver over an index snapshot.
    #[must_use]
    pub const fn new(index: Arc<AdministrativeIndex>) -> Self {
        Self { index }
    }

    /// The index this resolver reads from.
    #[must_use]
    pub fn index(&self) -> &AdministrativeIndex {
        &self.index
    }

    /// Resolves a descriptor into a region with geometry.
    ///
    /// # Errors
    ///
    /// * [`RegionError::InvalidBounds`] for an inverted, degenerate,
    ///   non-finite or out-of-range bounding box
    /// * [`RegionError::NotFound`] when a city or administrative name has
    ///   no match
    /// * [`RegionError::Ambiguous`] when an unqualified administrative name
    ///   matches units under more than one parent
    pub fn resolve(&self, descriptor: &RegionDescriptor) -> Result<ResolvedRegion, RegionError> {
        let resolved = match descriptor {
            RegionDescriptor::BoundingBox {
                west,
                south,
                east,
                north,
            } => {
                let bbox = validate_bounds(BoundingBox::new(*west, *south, *east, *north))?;
                region_from_bbox("custom".to_string(), bbox, RegionSource::Custom, DEFAULT_ZOOM)
            }
            RegionDescriptor::NamedCity { name } => {
                let city = gazetteer::lookup(name).ok_or_else(|| RegionError::NotFound {
                    descriptor: descriptor.clone(),
                })?;
                region_from_bbox(city.name.to_string(), city.bounds, RegionSource::City, city.zoom)
            }
            RegionDescriptor::AdministrativeName { name, parent } => {
                self.resolve_administrative(descriptor, name, parent.as_deref())?
            }
        };

        log::debug!(
            "Resolved {descriptor} -> {} ({}, {:.1} km²)",
            resolved.label,
            resolved.source,
            resolved.area_km2
        );

        Ok(resolved)
    }

    fn resolve_administrative(
        &self,
        descriptor: &RegionDescriptor,
        name: &str,
        parent: Option<&str>,
    ) -> Result<ResolvedRegion, RegionError> {
        let matches = match parent {
            Some(parent) if !normalize_name(parent).is_empty() => {
                self.index.named_under(name, parent)
            }
            _ => self.index.by_exact_name(name),
        };

        if matches.is_empty() {
            return Err(RegionError::NotFound {
                descriptor: descriptor.clone(),
            });
        }

        let parents: BTreeSet<Option<&str>> =
            matches.iter().map(|r| r.parent_code.as_deref()).collect();

        if parents.len() > 1 {
            let mut candidates: Vec<RegionCandidate> = matches
                .iter()
                .map(|record| RegionCandidate {
                    name: record.name.clone(),
                    parent_name: self.index.parent_name(record).map(ToString::to_string),
                    code: record.code.clone(),
                    level: record.level,
                })
                .collect();
            candidates.sort_by(|a, b| {
                let key = |c: &RegionCandidate| c.parent_name.as_deref().map(normalize_name);
                key(a).cmp(&key(b)).then_with(|| a.code.cmp(&b.code))
            });

            log::debug!(
                "'{name}' is ambiguous across {} parents",
                candidates.len()
            );

            return Err(RegionError::Ambiguous {
                name: name.to_string(),
                candidates,
            });
        }

        self.region_from_records(&matches)
    }

    /// Builds a region from one or more records sharing a parent. Several
    /// records only occur when the source splits a unit into multiple
    /// features; their polygons are collected and areas summed.
    fn region_from_records(
        &self,
        records: &[&AdministrativeRecord],
    ) -> Result<ResolvedRegion, RegionError> {
        let Some(first) = records.first() else {
            return Err(RegionError::Index {
                message: "no records to build a region from".to_string(),
            });
        };

        let geometry = if records.len() == 1 {
            first.geometry.clone()
        } else {
            MultiPolygon(
                records
                    .iter()
                    .flat_map(|r| r.geometry.0.iter().cloned())
                    .collect(),
            )
        };
        let area_km2: f64 = records.iter().map(|r| r.area_km2).sum();

        let bounds = envelope(&geometry).ok_or_else(|| RegionError::Index {
            message: format!("administrative unit {} has empty geometry", first.code),
        })?;
        let center = centroid(&geometry).unwrap_or_else(|| bounds.center());

        let label = match self.index.parent_of(first) {
            Some(parent) if first.level != AdminLevel::State => {
                format!("{}, {}", first.name, parent.name)
            }
            _ => first.name.clone(),
        };

        Ok(ResolvedRegion {
            label,
            geometry,
            centroid: center,
            bounds,
            area_km2,
            source: RegionSource::from(first.level),
            codes: records.iter().map(|r| r.code.clone()).collect(),
            zoom: if first.level == AdminLevel::Country {
                COUNTRY_ZOOM
            } else {
                DEFAULT_ZOOM
            },
        })
    }
}

/// Checks a bounding box against the absolute WGS84 range and ordering.
///
/// # Errors
///
/// Returns [`RegionError::InvalidBounds`] describing the first violated
/// constraint.
pub fn validate_bounds(bbox: BoundingBox) -> Result<BoundingBox, RegionError> {
    let invalid = |reason: &str| RegionError::InvalidBounds {
        bbox,
        reason: reason.to_string(),
    };

    if !bbox.to_array().iter().all(|c| c.is_finite()) {
        return Err(invalid("coordinates must be finite numbers"));
    }
    if !(-180.0..=180.0).contains(&bbox.west) || !(-180.0..=180.0).contains(&bbox.east) {
        return Err(invalid("longitude must be within [-180, 180]"));
    }
    if !(-90.0..=90.0).contains(&bbox.south) || !(-90.0..=90.0).contains(&bbox.north) {
        return Err(invalid("latitude must be within [-90, 90]"));
    }
    if bbox.west >= bbox.east {
        return Err(invalid("west must be less than east"));
    }
    if bbox.south >= bbox.north {
        return Err(invalid("south must be less than north"));
    }
    if bbox_area_km2(bbox) <= 0.0 {
        return Err(invalid("box has no measurable area"));
    }

    Ok(bbox)
}

fn region_from_bbox(
    label: String,
    bbox: BoundingBox,
    source: RegionSource,
    zoom: u8,
) -> ResolvedRegion {
    ResolvedRegion {
        label,
        geometry: bbox_polygon(bbox),
        centroid: bbox.center(),
        bounds: bbox,
        area_km2: bbox_area_km2(bbox),
        source,
        codes: Vec::new(),
        zoom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{self, fixtures};

    fn resolver() -> RegionResolver {
        let records = boundary::parse_str(&fixtures::flat_india()).unwrap();
        RegionResolver::new(Arc::new(AdministrativeIndex::build(records).unwrap()))
    }

    #[test]
    fn custom_boxes_resolve_with_positive_area() {
        let resolver = resolver();
        let boxes = [
            (77.0, 12.5, 78.0, 13.5),
            (-180.0, -90.0, 180.0, 90.0),
            (179.9, 89.9, 180.0, 90.0),
            (0.0, 89.999_999_9, 1.0, 90.0),
            (10.0, 89.999_999_99, 20.0, 90.0),
            (-0.0001, -0.0001, 0.0001, 0.0001),
            (68.0, 6.0, 97.0, 37.0),
        ];
        for (w, s, e, n) in boxes {
            let region = resolver
                .resolve(&RegionDescriptor::bbox(BoundingBox::new(w, s, e, n)))
                .unwrap();
            assert_eq!(region.source, RegionSource::Custom);
            assert!(region.area_km2 > 0.0, "area for {w},{s},{e},{n}");
            assert!(region.codes.is_empty());
        }
    }

    #[test]
    fn invalid_boxes_are_rejected() {
        let resolver = resolver();
        let boxes = [
            (78.0, 12.5, 77.0, 13.5),
            (77.0, 13.5, 78.0, 12.5),
            (77.0, 12.5, 77.0, 13.5),
            (-181.0, 0.0, 10.0, 10.0),
            (0.0, -91.0, 10.0, 10.0),
            (0.0, 0.0, 10.0, 90.5),
            (f64::NAN, 0.0, 10.0, 10.0),
            (0.0, 0.0, f64::INFINITY, 10.0),
        ];
        for (w, s, e, n) in boxes {
            let err = resolver
                .resolve(&RegionDescriptor::bbox(BoundingBox::new(w, s, e, n)))
                .unwrap_err();
            assert!(
                matches!(err, RegionError::InvalidBounds { .. }),
                "expected InvalidBounds for {w},{s},{e},{n}, got {err:?}"
            );
        }
    }

    #[test]
    fn mumbai_resolves_to_gazetteer_box() {
        let region = resolver().resolve(&RegionDescriptor::city("Mumbai")).unwrap();
        assert_eq!(region.source, RegionSource::City);
        assert_eq!(region.bounds, BoundingBox::new(72.7, 18.8, 73.2, 19.3));
        assert_eq!(region.label, "Mumbai");
        assert_eq!(region.zoom, 10);
        assert!(region.area_km2 > 2_500.0 && region.area_km2 < 3_200.0);
    }

    #[test]
    fn unknown_city_is_not_found() {
        let err = resolver()
            .resolve(&RegionDescriptor::city("Atlantis"))
            .unwrap_err();
        assert!(matches!(
            err,
            RegionError::NotFound {
                descriptor: RegionDescriptor::NamedCity { .. }
            }
        ));
    }

    #[test]
    fn city_names_do_not_fall_through_to_districts() {
        // "Patna" is a district in the index but not a gazetteer city.
        let err = resolver()
            .resolve(&RegionDescriptor::city("Patna"))
            .unwrap_err();
        assert!(matches!(err, RegionError::NotFound { .. }));
    }

    #[test]
    fn unique_name_resolves_regardless_of_qualifier() {
        let resolver = resolver();
        let bare = resolver
            .resolve(&RegionDescriptor::administrative("Tumkur"))
            .unwrap();
        let qualified = resolver
            .resolve(&RegionDescriptor::administrative_in("Tumkur", "Karnataka"))
            .unwrap();

        assert_eq!(bare, qualified);
        assert_eq!(bare.source, RegionSource::GaulDistrict);
        assert_eq!(bare.codes, vec!["17102"]);
        assert_eq!(bare.label, "Tumkur, Karnataka");
        assert!(bare.area_km2 > 0.0);
    }

    #[test]
    fn lookups_ignore_case_and_whitespace() {
        let resolver = resolver();
        let regions: Vec<ResolvedRegion> = ["karnataka", "Karnataka ", " KARNATAKA"]
            .into_iter()
            .map(|n| resolver.resolve(&RegionDescriptor::administrative(n)).unwrap())
            .collect();
        assert!(regions.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(regions[0].source, RegionSource::GaulState);
        assert_eq!(regions[0].label, "Karnataka");
    }

    #[test]
    fn duplicate_name_without_qualifier_is_ambiguous() {
        let err = resolver()
            .resolve(&RegionDescriptor::administrative("aurangabad"))
            .unwrap_err();
        let RegionError::Ambiguous { name, candidates } = err else {
            panic!("expected Ambiguous, got {err:?}");
        };
        assert_eq!(name, "aurangabad");
        let parents: Vec<Option<&str>> =
            candidates.iter().map(|c| c.parent_name.as_deref()).collect();
        assert_eq!(parents, vec![Some("Bihar"), Some("Maharashtra")]);
        assert_eq!(candidates[0].code, "40001");
        assert!(candidates.iter().all(|c| c.level == AdminLevel::District));
    }

    #[test]
    fn qualifier_selects_one_of_the_duplicates() {
        let region = resolver()
            .resolve(&RegionDescriptor::administrative_in("Aurangabad", " maharashtra"))
            .unwrap();
        assert_eq!(region.codes, vec!["70001"]);
    }

    #[test]
    fn state_and_district_sharing_a_name_are_ambiguous() {
        let err = resolver()
            .resolve(&RegionDescriptor::administrative("Delhi"))
            .unwrap_err();
        let RegionError::Ambiguous { candidates, .. } = err else {
            panic!("expected Ambiguous");
        };
        let parents: Vec<Option<&str>> =
            candidates.iter().map(|c| c.parent_name.as_deref()).collect();
        assert_eq!(parents, vec![Some("Delhi"), Some("India")]);
    }

    #[test]
    fn wrong_qualifier_is_not_found() {
        let err = resolver()
            .resolve(&RegionDescriptor::administrative_in("Tumkur", "Bihar"))
            .unwrap_err();
        assert!(matches!(err, RegionError::NotFound { .. }));
    }

    #[test]
    fn blank_qualifier_behaves_as_unqualified() {
        let region = resolver()
            .resolve(&RegionDescriptor::administrative_in("Patna", "  "))
            .unwrap();
        assert_eq!(region.codes, vec!["40002"]);
    }

    #[test]
    fn country_resolves_with_country_zoom() {
        let region = resolver()
            .resolve(&RegionDescriptor::administrative("India"))
            .unwrap();
        assert_eq!(region.source, RegionSource::GaulCountry);
        assert_eq!(region.zoom, 5);
        assert_eq!(region.label, "India");
    }

    #[test]
    fn split_units_under_one_parent_are_merged() {
        let mut records = boundary::parse_str(&fixtures::flat_india()).unwrap();
        let mut piece = records
            .iter()
            .find(|r| r.code == "70002")
            .unwrap()
            .clone();
        piece.code = "70003".to_string();
        piece.geometry = bbox_polygon(BoundingBox::new(74.6, 18.0, 74.8, 18.2));
        records.push(piece);
        let resolver = RegionResolver::new(Arc::new(AdministrativeIndex::build(records).unwrap()));

        let region = resolver
            .resolve(&RegionDescriptor::administrative("Pune"))
            .unwrap();
        assert_eq!(region.codes, vec!["70002", "70003"]);
        assert_eq!(region.geometry.0.len(), 2);
        assert!(region.bounds.east > 74.7);
    }
}
