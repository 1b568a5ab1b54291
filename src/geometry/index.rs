//! Envelope index over a polygon layer.

use bevy::math::DVec2;
use geo::{BoundingRect, Polygon};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};

type Entry = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// R-tree of polygon bounding boxes, answering with positions in the
/// indexed slice.
pub struct PolygonIndex {
    tree: RTree<Entry>,
}

impl PolygonIndex {
    pub fn new<'a, I>(polygons: I) -> Self
    where
        I: IntoIterator<Item = &'a Polygon<f64>>,
    {
        let entries = polygons
            .into_iter()
            .enumerate()
            .filter_map(|(i, polygon)| {
                let rect = polygon.bounding_rect()?;
                Some(Entry::new(
                    Rectangle::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                    i,
                ))
            })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Indices whose envelope intersects the envelope of `polygon`, grown by `margin`.
    pub fn candidates(&self, polygon: &Polygon<f64>, margin: f64) -> Vec<usize> {
        let Some(rect) = polygon.bounding_rect() else {
            return Vec::new();
        };
        let envelope = AABB::from_corners(
            [rect.min().x - margin, rect.min().y - margin],
            [rect.max().x + margin, rect.max().y + margin],
        );
        let mut found: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.data)
            .collect();
        found.sort_unstable();
        found
    }

    /// Indices whose envelope contains `point`.
    pub fn at_point(&self, point: DVec2) -> Vec<usize> {
        let mut found: Vec<usize> = self
            .tree
            .locate_all_at_point(&[point.x, point.y])
            .map(|entry| entry.data)
            .collect();
        found.sort_unstable();
        found
    }
}
