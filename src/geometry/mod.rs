//! Planar polygon helpers shared by the engines.
//!
//! Polygons are `geo` polygons in map units; vector math goes through
//! bevy's `DVec2`.

use std::panic::{catch_unwind, AssertUnwindSafe};

use bevy::math::DVec2;
use geo::line_intersection::{line_intersection, LineIntersection};
use geo::orient::{Direction, Orient};
use geo::{
    Area, BooleanOps, Coord, Euclidean, InteriorPoint, Length, Line, LineString, MultiPolygon, Polygon,
};

use crate::error::FabricError;

pub mod index;
pub mod obb;
pub mod split;

pub use index::PolygonIndex;
pub use obb::OrientedBoundingBox;
pub use split::{split_by_line, CutLine, SplitParts};

/// Below this area a boolean-op output component is numerical noise.
pub const AREA_EPSILON: f64 = 1e-6;

pub fn to_dvec(c: Coord<f64>) -> DVec2 {
    DVec2::new(c.x, c.y)
}

pub fn to_coord(v: DVec2) -> Coord<f64> {
    Coord { x: v.x, y: v.y }
}

/// Exterior ring vertices without the closing duplicate.
pub fn ring_points(polygon: &Polygon<f64>) -> Vec<DVec2> {
    let mut points: Vec<DVec2> = polygon.exterior().coords().map(|c| to_dvec(*c)).collect();
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

/// Build a hole-free polygon from an open vertex list.
pub fn polygon_from_points(points: &[DVec2]) -> Polygon<f64> {
    let ring: Vec<Coord<f64>> = points.iter().map(|p| to_coord(*p)).collect();
    Polygon::new(LineString::from(ring), vec![])
}

pub fn polygon_area(polygon: &Polygon<f64>) -> f64 {
    polygon.unsigned_area()
}

pub fn total_area(polygons: &[Polygon<f64>]) -> f64 {
    polygons.iter().map(polygon_area).sum()
}

/// Length of the exterior ring.
pub fn perimeter(polygon: &Polygon<f64>) -> f64 {
    polygon.exterior().length::<Euclidean>()
}

/// A point guaranteed to lie inside the polygon, falling back to the first vertex.
pub fn inner_point(polygon: &Polygon<f64>) -> DVec2 {
    polygon
        .interior_point()
        .map(|p| DVec2::new(p.x(), p.y()))
        .or_else(|| ring_points(polygon).first().copied())
        .unwrap_or(DVec2::ZERO)
}

/// Reject polygons the engines cannot handle.
///
/// Holes are refused unless `allow_holes` is set; the exterior must have
/// three distinct vertices, a non-zero area and no self-intersection.
pub fn validate_polygon(polygon: &Polygon<f64>, allow_holes: bool) -> Result<(), FabricError> {
    if !allow_holes && !polygon.interiors().is_empty() {
        return Err(FabricError::Geometry("holes unsupported".to_string()));
    }

    let mut points = ring_points(polygon);
    points.dedup();
    if points.len() < 3 {
        return Err(FabricError::Geometry(format!(
            "ring has {} distinct vertices",
            points.len()
        )));
    }
    if polygon_area(polygon) <= AREA_EPSILON {
        return Err(FabricError::Geometry("zero-area polygon".to_string()));
    }
    if ring_self_intersects(polygon.exterior()) {
        return Err(FabricError::Geometry("self-intersecting ring".to_string()));
    }
    Ok(())
}

fn ring_self_intersects(ring: &LineString<f64>) -> bool {
    let segments: Vec<Line<f64>> = ring.lines().filter(|l| l.start != l.end).collect();
    let n = segments.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let neighbours = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(segments[i], segments[j]) {
                None => {}
                // Neighbouring segments meet at their shared vertex.
                Some(LineIntersection::SinglePoint { is_proper, .. }) => {
                    if is_proper || !neighbours {
                        return true;
                    }
                }
                Some(LineIntersection::Collinear { .. }) => return true,
            }
        }
    }
    false
}

/// Snap every vertex to a grid of `grid` map units.
///
/// Consecutive duplicates created by snapping are removed. Returns `None`
/// when the ring collapses below three vertices.
pub fn reduce_precision(polygon: &Polygon<f64>, grid: f64) -> Option<Polygon<f64>> {
    if grid <= 0.0 {
        return Some(polygon.clone());
    }
    let snap = |v: DVec2| (v / grid).round() * grid;

    let mut points: Vec<DVec2> = ring_points(polygon).into_iter().map(snap).collect();
    points.dedup();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    if points.len() < 3 {
        return None;
    }
    Some(polygon_from_points(&points).orient(Direction::Default))
}

/// Length of the boundary that two closed rings share.
///
/// Two segments count as shared where they are collinear within
/// `tolerance` and their projections overlap.
pub fn shared_length(a: &[DVec2], b: &[DVec2], tolerance: f64) -> f64 {
    let mut total = 0.0;
    let (na, nb) = (a.len(), b.len());
    for i in 0..na {
        let (p1, p2) = (a[i], a[(i + 1) % na]);
        let len = p1.distance(p2);
        if len <= tolerance {
            continue;
        }
        let dir = (p2 - p1) / len;
        for j in 0..nb {
            let (q1, q2) = (b[j], b[(j + 1) % nb]);
            if dir.perp_dot(q1 - p1).abs() > tolerance || dir.perp_dot(q2 - p1).abs() > tolerance {
                continue;
            }
            let (t1, t2) = (dir.dot(q1 - p1), dir.dot(q2 - p1));
            let lo = t1.min(t2).max(0.0);
            let hi = t1.max(t2).min(len);
            if hi > lo {
                total += hi - lo;
            }
        }
    }
    total
}

/// Boundary length of `polygon` lying on the exterior ring of any of `others`.
pub fn contact_length(polygon: &Polygon<f64>, others: &[Polygon<f64>], tolerance: f64) -> f64 {
    let ring = ring_points(polygon);
    others
        .iter()
        .map(|other| shared_length(&ring, &ring_points(other), tolerance))
        .sum()
}

/// Run a boolean operation, turning a panic inside the clipper into a
/// geometry error.
pub fn guarded<F>(operation: &str, f: F) -> Result<MultiPolygon<f64>, FabricError>
where
    F: FnOnce() -> MultiPolygon<f64>,
{
    catch_unwind(AssertUnwindSafe(f))
        .map_err(|_| FabricError::Geometry(format!("{operation} failed on degenerate input")))
}

/// Components of a boolean-op result, counter-clockwise, noise dropped.
pub fn components(multi: MultiPolygon<f64>) -> Vec<Polygon<f64>> {
    multi
        .into_iter()
        .filter(|p| polygon_area(p) > AREA_EPSILON)
        .map(|p| p.orient(Direction::Default))
        .collect()
}

pub fn intersection(a: &Polygon<f64>, b: &Polygon<f64>) -> Result<Vec<Polygon<f64>>, FabricError> {
    guarded("intersection", || a.intersection(b)).map(components)
}

pub fn difference(a: &Polygon<f64>, b: &Polygon<f64>) -> Result<Vec<Polygon<f64>>, FabricError> {
    guarded("difference", || a.difference(b)).map(components)
}

/// Union of a polygon set. Touching polygons fuse, disjoint ones stay apart.
pub fn union_all(polygons: &[Polygon<f64>]) -> Result<Vec<Polygon<f64>>, FabricError> {
    let mut acc = MultiPolygon::new(vec![]);
    for polygon in polygons {
        let next = MultiPolygon::new(vec![polygon.clone()]);
        acc = guarded("union", || acc.union(&next))?;
    }
    Ok(components(acc))
}
