//! Cutting a polygon along a straight line, optionally leaving a strip.

use bevy::math::DVec2;
use geo::{BoundingRect, Polygon};

use super::{intersection, polygon_from_points, to_dvec};
use crate::error::FabricError;

/// An infinite line through `origin` running along `direction`.
#[derive(Clone, Copy, Debug)]
pub struct CutLine {
    pub origin: DVec2,
    pub direction: DVec2,
}

impl CutLine {
    pub fn new(origin: DVec2, direction: DVec2) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Unit normal pointing to the "left" side.
    pub fn normal(&self) -> DVec2 {
        self.direction.perp()
    }

    /// Signed distance of `point` from the line, positive on the left.
    pub fn side(&self, point: DVec2) -> f64 {
        (point - self.origin).dot(self.normal())
    }
}

/// Pieces on each side of a cut plus the strip between them.
///
/// Each side may hold several components when the input is concave.
#[derive(Clone, Debug, Default)]
pub struct SplitParts {
    pub left: Vec<Polygon<f64>>,
    pub right: Vec<Polygon<f64>>,
    pub strip: Vec<Polygon<f64>>,
}

/// Split `polygon` along `line`, removing a strip of width `gap` centred on it.
///
/// `gap == 0` is a plain cut whose two sides share the cut as a boundary.
pub fn split_by_line(
    polygon: &Polygon<f64>,
    line: &CutLine,
    gap: f64,
) -> Result<SplitParts, FabricError> {
    if line.direction == DVec2::ZERO {
        return Err(FabricError::Geometry("cut line has no direction".to_string()));
    }
    let bounds = polygon
        .bounding_rect()
        .ok_or_else(|| FabricError::Geometry("empty polygon".to_string()))?;
    let reach = to_dvec(bounds.min()).distance(to_dvec(bounds.max()))
        + to_dvec(bounds.center()).distance(line.origin)
        + gap
        + 1.0;

    let half_gap = gap.max(0.0) * 0.5;
    let left = band(line, half_gap, half_gap + reach, reach);
    let right = band(line, -half_gap - reach, -half_gap, reach);

    let mut parts = SplitParts {
        left: intersection(polygon, &left)?,
        right: intersection(polygon, &right)?,
        strip: Vec::new(),
    };
    if half_gap > 0.0 {
        let strip = band(line, -half_gap, half_gap, reach);
        parts.strip = intersection(polygon, &strip)?;
    }
    Ok(parts)
}

/// Rectangle covering normal offsets `[from, to]` along the whole line.
fn band(line: &CutLine, from: f64, to: f64, reach: f64) -> Polygon<f64> {
    let d = line.direction * reach;
    let n = line.normal();
    polygon_from_points(&[
        line.origin + n * from - d,
        line.origin + n * from + d,
        line.origin + n * to + d,
        line.origin + n * to - d,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::tests::rect;
    use crate::geometry::{polygon_area, total_area};

    #[test]
    fn plain_cut_halves_a_rectangle() {
        let block = rect(0.0, 0.0, 100.0, 50.0);
        let line = CutLine::new(DVec2::new(50.0, 25.0), DVec2::Y);
        let parts = split_by_line(&block, &line, 0.0).unwrap();

        assert_eq!(parts.left.len(), 1);
        assert_eq!(parts.right.len(), 1);
        assert!(parts.strip.is_empty());
        assert!((polygon_area(&parts.left[0]) - 2500.0).abs() < 1e-6);
        assert!((polygon_area(&parts.right[0]) - 2500.0).abs() < 1e-6);
    }

    #[test]
    fn street_cut_conserves_area() {
        let block = rect(0.0, 0.0, 100.0, 50.0);
        let line = CutLine::new(DVec2::new(40.0, 0.0), DVec2::Y);
        let parts = split_by_line(&block, &line, 6.0).unwrap();

        let street = total_area(&parts.strip);
        assert!((street - 300.0).abs() < 1e-6);
        let sum = total_area(&parts.left) + total_area(&parts.right) + street;
        assert!((sum - 5000.0).abs() < 1e-6);
    }

    #[test]
    fn concave_polygon_yields_several_components() {
        // U-shape opening upwards, cut horizontally through both arms.
        let u_shape = polygon_from_points(&[
            DVec2::new(0.0, 0.0),
            DVec2::new(30.0, 0.0),
            DVec2::new(30.0, 30.0),
            DVec2::new(20.0, 30.0),
            DVec2::new(20.0, 10.0),
            DVec2::new(10.0, 10.0),
            DVec2::new(10.0, 30.0),
            DVec2::new(0.0, 30.0),
        ]);
        let line = CutLine::new(DVec2::new(15.0, 20.0), DVec2::X);
        let parts = split_by_line(&u_shape, &line, 0.0).unwrap();

        assert_eq!(parts.left.len(), 2);
        assert_eq!(parts.right.len(), 1);
    }

    #[test]
    fn side_sign_follows_normal() {
        let line = CutLine::new(DVec2::ZERO, DVec2::X);
        assert!(line.side(DVec2::new(3.0, 2.0)) > 0.0);
        assert!(line.side(DVec2::new(3.0, -2.0)) < 0.0);
    }
}
