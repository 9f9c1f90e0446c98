//! Small geometry helpers shared by boundary loading and resolution.

use geo::{BoundingRect, Centroid, GeodesicArea, MultiPolygon, Point, Rect, coord};
use indiageo_region_models::BoundingBox;

/// Mean Earth radius (IUGG) in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6_371.008_8;

/// Exact spherical area of a latitude/longitude rectangle.
///
/// `R² · Δλ · (sin φ_north − sin φ_south)`. Unlike a geodesic polygon
/// area this stays correct for boxes spanning the full longitude range,
/// whose edges are parallels rather than great circles.
#[must_use]
pub fn bbox_area_km2(bbox: BoundingBox) -> f64 {
    let d_lon = (bbox.east - bbox.west).to_radians();
    // Sum-to-product form; the plain sine difference cancels to zero near
    // the poles.
    let mid = f64::midpoint(bbox.north, bbox.south).to_radians();
    let half_span = ((bbox.north - bbox.south) / 2.0).to_radians();
    let band = 2.0 * mid.cos() * half_span.sin();
    EARTH_RADIUS_KM * EARTH_RADIUS_KM * d_lon * band
}

/// Converts a bounding box into a single-rectangle [`MultiPolygon`].
#[must_use]
pub fn bbox_polygon(bbox: BoundingBox) -> MultiPolygon<f64> {
    let rect = Rect::new(
        coord! { x: bbox.west, y: bbox.south },
        coord! { x: bbox.east, y: bbox.north },
    );
    MultiPolygon(vec![rect.to_polygon()])
}

/// Geodesic (WGS84 ellipsoid) area of a polygon set in square kilometres.
#[must_use]
pub fn geodesic_area_km2(geometry: &MultiPolygon<f64>) -> f64 {
    geometry.geodesic_area_unsigned() / 1_000_000.0
}

/// Envelope of a polygon set, `None` when it is empty.
#[must_use]
pub fn envelope(geometry: &MultiPolygon<f64>) -> Option<BoundingBox> {
    geometry
        .bounding_rect()
        .map(|rect| BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y))
}

/// Planar centroid, falling back to the envelope center for degenerate
/// geometries.
#[must_use]
pub fn centroid(geometry: &MultiPolygon<f64>) -> Option<Point<f64>> {
    geometry
        .centroid()
        .or_else(|| envelope(geometry).map(BoundingBox::center))
}
