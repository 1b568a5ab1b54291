//! Oriented bounding boxes.

use bevy::math::DVec2;
use geo::{MinimumRotatedRect, Polygon};

use super::ring_points;

/// An oriented bounding box. `half_extents.x` runs along the major axis.
#[derive(Clone, Copy, Debug)]
pub struct OrientedBoundingBox {
    pub center: DVec2,
    pub half_extents: DVec2,
    pub rotation: f64,
}

impl OrientedBoundingBox {
    /// Minimum-area rectangle enclosing the polygon.
    ///
    /// Falls back to the principal-axes box when the rotating-calipers
    /// rectangle cannot be computed (collinear or empty input).
    pub fn of_polygon(polygon: &Polygon<f64>) -> Option<Self> {
        if let Some(rect) = polygon.minimum_rotated_rect() {
            let corners = ring_points(&rect);
            if corners.len() >= 4 {
                return Some(Self::from_corners(corners[0], corners[1], corners[2]));
            }
        }
        Self::from_principal_axes(&ring_points(polygon))
    }

    /// Box from three consecutive rectangle corners.
    fn from_corners(c0: DVec2, c1: DVec2, c2: DVec2) -> Self {
        let a = c1 - c0;
        let b = c2 - c1;
        let (major, minor) = if a.length() >= b.length() { (a, b) } else { (b, a) };
        Self {
            center: (c0 + c2) * 0.5,
            half_extents: DVec2::new(major.length() * 0.5, minor.length() * 0.5),
            rotation: major.y.atan2(major.x),
        }
    }

    fn from_principal_axes(vertices: &[DVec2]) -> Option<Self> {
        if vertices.is_empty() {
            return None;
        }
        let centroid = vertices.iter().copied().sum::<DVec2>() / vertices.len() as f64;

        let mut cxx = 0.0;
        let mut cyy = 0.0;
        let mut cxy = 0.0;
        for v in vertices {
            let d = *v - centroid;
            cxx += d.x * d.x;
            cyy += d.y * d.y;
            cxy += d.x * d.y;
        }

        let angle = 0.5 * (2.0 * cxy).atan2(cxx - cyy);
        let axis = DVec2::new(angle.cos(), angle.sin());
        let perp = axis.perp();

        let mut min_major = f64::MAX;
        let mut max_major = f64::MIN;
        let mut min_minor = f64::MAX;
        let mut max_minor = f64::MIN;
        for v in vertices {
            let d = *v - centroid;
            min_major = min_major.min(d.dot(axis));
            max_major = max_major.max(d.dot(axis));
            min_minor = min_minor.min(d.dot(perp));
            max_minor = max_minor.max(d.dot(perp));
        }

        let center = centroid
            + axis * ((min_major + max_major) * 0.5)
            + perp * ((min_minor + max_minor) * 0.5);
        let extents = DVec2::new((max_major - min_major) * 0.5, (max_minor - min_minor) * 0.5);

        Some(if extents.x >= extents.y {
            Self { center, half_extents: extents, rotation: angle }
        } else {
            Self {
                center,
                half_extents: DVec2::new(extents.y, extents.x),
                rotation: perp.y.atan2(perp.x),
            }
        })
    }

    /// Unit vector along the long side.
    pub fn major_axis(&self) -> DVec2 {
        DVec2::new(self.rotation.cos(), self.rotation.sin())
    }

    /// Unit vector along the short side.
    pub fn minor_axis(&self) -> DVec2 {
        self.major_axis().perp()
    }

    pub fn long_side(&self) -> f64 {
        self.half_extents.x * 2.0
    }

    pub fn short_side(&self) -> f64 {
        self.half_extents.y * 2.0
    }

    /// Short over long side, in `[0, 1]`.
    pub fn aspect_ratio(&self) -> f64 {
        if self.half_extents.x <= 0.0 {
            0.0
        } else {
            self.half_extents.y / self.half_extents.x
        }
    }
}
