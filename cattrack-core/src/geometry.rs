//! GeoJSON geometry decoding and validation
//!
//! Everything is planar lon/lat. Only `Polygon` and `MultiPolygon` are
//! decoded; other geometry types are reported as `None` so callers can skip
//! them without treating them as malformed.

use crate::error::{CoreError, CoreResult};
use geo::{BoundingRect, Coord, LineString, MultiPolygon, Polygon, Rect};
use serde_json::Value;

type Ring = Vec<Vec<f64>>;

/// Decode a GeoJSON geometry object.
///
/// Returns `Ok(None)` for non-polygonal geometry types and `Err` for
/// polygonal geometries whose coordinates cannot be decoded or are invalid.
pub fn multipolygon_from_geojson(value: &Value) -> CoreResult<Option<MultiPolygon<f64>>> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::geometry("geometry has no type"))?;
    let coordinates = value.get("coordinates").cloned().unwrap_or(Value::Null);

    let polygons = match kind {
        "Polygon" => {
            let rings: Vec<Ring> = serde_json::from_value(coordinates)
                .map_err(|e| CoreError::geometry(format!("bad Polygon coordinates: {}", e)))?;
            vec![polygon_from_rings(rings)?]
        }
        "MultiPolygon" => {
            let parts: Vec<Vec<Ring>> = serde_json::from_value(coordinates).map_err(|e| {
                CoreError::geometry(format!("bad MultiPolygon coordinates: {}", e))
            })?;
            parts
                .into_iter()
                .map(polygon_from_rings)
                .collect::<CoreResult<Vec<_>>>()?
        }
        _ => return Ok(None),
    };

    let multi = MultiPolygon::new(polygons);
    validate_multipolygon(&multi)?;
    Ok(Some(multi))
}

fn polygon_from_rings(rings: Vec<Ring>) -> CoreResult<Polygon<f64>> {
    let mut rings = rings.into_iter();
    let exterior = rings
        .next()
        .ok_or_else(|| CoreError::geometry("polygon has no exterior ring"))?;
    let exterior = ring_to_linestring(exterior)?;
    let interiors = rings
        .map(ring_to_linestring)
        .collect::<CoreResult<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn ring_to_linestring(ring: Ring) -> CoreResult<LineString<f64>> {
    let coords = ring
        .into_iter()
        .map(|position| match position.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err(CoreError::geometry("position has fewer than two values")),
        })
        .collect::<CoreResult<Vec<_>>>()?;
    Ok(LineString::new(coords))
}

/// Check that a geometry can take part in containment tests and return its
/// bounding box.
///
/// Every part needs a closed exterior ring of at least four positions and
/// every coordinate must be finite.
pub fn validate_multipolygon(geometry: &MultiPolygon<f64>) -> CoreResult<Rect<f64>> {
    if geometry.0.is_empty() {
        return Err(CoreError::geometry("geometry has no parts"));
    }

    for polygon in geometry.iter() {
        let exterior = polygon.exterior();
        if exterior.0.len() < 4 {
            return Err(CoreError::geometry(format!(
                "exterior ring has {} positions, need at least 4",
                exterior.0.len()
            )));
        }
        let rings = std::iter::once(exterior).chain(polygon.interiors().iter());
        for ring in rings {
            if ring.coords().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
                return Err(CoreError::geometry("ring contains a non-finite coordinate"));
            }
        }
    }

    geometry
        .bounding_rect()
        .ok_or_else(|| CoreError::geometry("geometry has no bounding box"))
}
