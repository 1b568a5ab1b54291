//! Flag split: a front lot kept on the road, a shared driveway, and a row
//! of rear lots served by it.
//!
//! Everything is laid out in a frame attached to the islet's oriented
//! bounding box: `x` runs along the front, `d` runs from the front into
//! the depth of the islet.
//!
//! ```text
//!   d = D  +----+----+----+----+
//!          |rear|rear|rear|rear|
//!  L + w   +----+----+----+----+
//!          |     branch        |
//!      L   +--+----------------+
//!          |p |    front       |
//!      0   +--+----------------+
//!          x=0                x=W
//! ```

use std::ops::RangeInclusive;
use std::time::Duration;

use bevy::log::{debug, warn};
use bevy::math::DVec2;
use geo::{Intersects, Polygon};

use super::Deadline;
use crate::error::FabricError;
use crate::geometry::{
    intersection, polygon_area, polygon_from_points, reduce_precision, total_area, union_all,
    validate_polygon, OrientedBoundingBox, AREA_EPSILON,
};
use crate::topology::{FaceId, FaceKind, Graph, HalfEdgeId};

/// How far clipping rectangles reach past the OBB, so islet edges are
/// never clipped by rounding.
const OVERSHOOT: f64 = 1.0;

/// Share of the depth checked for road contact when picking the front.
const FRONT_BAND: f64 = 0.1;

#[derive(Clone, Debug)]
pub struct FlagSplitConfig {
    /// Upper bound on the area of a rear lot.
    pub max_area: f64,
    /// Minimum width of a rear lot along the driveway.
    pub min_frontage_width: f64,
    /// Depth of the front lot, i.e. the length of the pole.
    pub driveway_length: f64,
    pub driveway_width: f64,
    /// Pieces below this area abort the split unless explicitly allowed.
    pub min_area: f64,
    /// Roads used to find the front of the islet.
    pub existing_roads: Vec<Polygon<f64>>,
    pub precision: f64,
    /// Wall-clock budget for the whole split.
    pub deadline: Option<Duration>,
}

impl Default for FlagSplitConfig {
    fn default() -> Self {
        Self {
            max_area: 500.0,
            min_frontage_width: 10.0,
            driveway_length: 20.0,
            driveway_width: 3.0,
            min_area: 150.0,
            existing_roads: Vec::new(),
            precision: 0.01,
            deadline: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FlagOutcome {
    Split,
    /// The islet was returned whole.
    Reverted(FabricError),
}

#[derive(Clone, Debug)]
pub struct FlagSplit {
    /// Front lot first, then the rear lots along the driveway.
    pub parcels: Vec<Polygon<f64>>,
    pub driveway: Option<Polygon<f64>>,
    pub outcome: FlagOutcome,
    /// Length of the driveway measured along its inner boundary.
    pub driveway_length: f64,
}

impl FlagSplit {
    fn reverted(islet: &Polygon<f64>, reason: FabricError) -> Self {
        Self {
            parcels: vec![islet.clone()],
            driveway: None,
            outcome: FlagOutcome::Reverted(reason),
            driveway_length: 0.0,
        }
    }

    pub fn is_split(&self) -> bool {
        self.outcome == FlagOutcome::Split
    }
}

/// Cut `islet` into a front lot, a driveway and rear lots.
///
/// The split is all or nothing: when any lot would fall under `min_area`
/// or lack frontage on the driveway, and `allow_isolated` does not accept
/// it, the result holds exactly the input islet. The same happens when the
/// rear zone cannot be cut into lots of at most `max_area` that each keep
/// `min_frontage_width` on the driveway, or when the deadline passes.
pub fn flag_split<F>(
    islet: &Polygon<f64>,
    buildings: &[Polygon<f64>],
    config: &FlagSplitConfig,
    allow_isolated: F,
) -> FlagSplit
where
    F: Fn(&Polygon<f64>) -> bool,
{
    match try_flag_split(islet, buildings, config, &allow_isolated) {
        Ok(split) => split,
        Err(reason) => {
            debug!("flag split reverted: {reason}");
            FlagSplit::reverted(islet, reason)
        }
    }
}

fn try_flag_split<F>(
    islet: &Polygon<f64>,
    buildings: &[Polygon<f64>],
    config: &FlagSplitConfig,
    allow_isolated: &F,
) -> Result<FlagSplit, FabricError>
where
    F: Fn(&Polygon<f64>) -> bool,
{
    let deadline = Deadline::after(config.deadline);
    deadline.check()?;
    validate_polygon(islet, false)?;
    if !(config.driveway_width > 0.0
        && config.driveway_length > 0.0
        && config.max_area > 0.0
        && config.min_frontage_width > 0.0)
    {
        return Err(FabricError::Infeasible("invalid flag split configuration".to_string()));
    }
    let obb = OrientedBoundingBox::of_polygon(islet)
        .ok_or_else(|| FabricError::Geometry("islet has no bounding box".to_string()))?;
    let frame = Frame::front_of(&obb, &config.existing_roads)?;

    let (length, width) = (config.driveway_length, config.driveway_width);
    let rear_start = length + width;
    if rear_start >= frame.depth {
        return Err(FabricError::Infeasible(format!(
            "islet depth {:.1} leaves no room behind a {:.1} driveway",
            frame.depth, rear_start
        )));
    }

    let nearby: Vec<&Polygon<f64>> = buildings.iter().filter(|b| b.intersects(islet)).collect();
    let pole_side = pick_pole_side(islet, &frame, &nearby, length, width)?;

    let (pole_x, front_x) = match pole_side {
        PoleSide::Start => ((-OVERSHOOT, width), (width, frame.width + OVERSHOOT)),
        PoleSide::End => (
            (frame.width - width, frame.width + OVERSHOOT),
            (-OVERSHOOT, frame.width - width),
        ),
    };
    let clip = |rect: Polygon<f64>| -> Result<Vec<Polygon<f64>>, FabricError> {
        Ok(intersection(islet, &rect)?
            .iter()
            .filter_map(|p| reduce_precision(p, config.precision))
            .collect())
    };

    let pole = clip(frame.rect(pole_x.0, pole_x.1, -OVERSHOOT, length))?;
    let branch = clip(frame.rect(-OVERSHOOT, frame.width + OVERSHOOT, length, rear_start))?;
    let driveway = match union_all(&[pole, branch].concat())?.as_slice() {
        [single] => reduce_precision(single, config.precision)
            .ok_or_else(|| FabricError::Geometry("driveway collapsed".to_string()))?,
        _ => return Err(FabricError::Infeasible("driveway is not connected".to_string())),
    };

    let front = match clip(frame.rect(front_x.0, front_x.1, -OVERSHOOT, length))?.as_slice() {
        [single] => single.clone(),
        _ => return Err(FabricError::Infeasible("front lot is not one piece".to_string())),
    };

    let rear_zone = clip(frame.rect(-OVERSHOOT, frame.width + OVERSHOOT, rear_start, frame.depth + OVERSHOOT))?;
    let rear_area = total_area(&rear_zone);
    // Snapping may move each cut by one grid step over the whole depth.
    let slack = config.precision * frame.depth;
    let mut rear = None;
    for strips in strip_range(rear_area, frame.width, config) {
        deadline.check()?;
        let strip_width = frame.width / strips as f64;
        let mut lots = Vec::with_capacity(strips);
        for i in 0..strips {
            let x0 = if i == 0 { -OVERSHOOT } else { i as f64 * strip_width };
            let x1 = if i + 1 == strips { frame.width + OVERSHOOT } else { (i + 1) as f64 * strip_width };
            lots.extend(clip(frame.rect(x0, x1, rear_start, frame.depth + OVERSHOOT))?);
        }
        if lots.iter().all(|lot| polygon_area(lot) <= config.max_area + slack) {
            rear = Some(lots);
            break;
        }
        debug!("{strips} rear strips leave a lot over {:.1}", config.max_area);
    }
    let rear = rear.ok_or_else(|| {
        FabricError::Infeasible(format!(
            "a {rear_area:.1} rear zone {:.1} wide has no lots under {:.1} at least {:.1} wide",
            frame.width, config.max_area, config.min_frontage_width
        ))
    })?;

    let mut pieces = Vec::with_capacity(rear.len() + 2);
    pieces.push(front);
    pieces.extend(rear);
    check_buildings(&nearby, &pieces, &driveway)?;

    // Measure rear frontage and the driveway through the shared topology.
    let faces = pieces
        .iter()
        .map(|p| (p, FaceKind::Parcel))
        .chain(std::iter::once((&driveway, FaceKind::Driveway)));
    deadline.check()?;
    let graph = Graph::build_with_kinds(faces, (config.precision * 0.5).max(1e-6))?;
    let driveway_face = FaceId(pieces.len() as u32);

    let tolerance = (config.precision * 2.0).max(1e-6);
    for (i, piece) in pieces.iter().enumerate() {
        let area = polygon_area(piece);
        let access = if i == 0 {
            f64::INFINITY
        } else {
            graph.frontage(FaceId(i as u32), |other| {
                matches!(other, Some(f) if f.kind == FaceKind::Driveway)
            })
        };
        let deficient = area < config.min_area || access < config.min_frontage_width - tolerance;
        if deficient && !allow_isolated(piece) {
            return Err(FabricError::Infeasible(format!(
                "lot {i} has area {area:.1} and driveway frontage {access:.1}"
            )));
        }
    }

    let driveway_length = measure_driveway(&graph, driveway_face, FaceId(0), &frame, pole_side)
        .unwrap_or_else(|| {
            warn!("driveway length could not be traced through the topology");
            0.0
        });

    debug!(
        "flag split: front {:.1}, {} rear lots, driveway {:.1} long",
        polygon_area(&pieces[0]),
        pieces.len() - 1,
        driveway_length
    );
    Ok(FlagSplit {
        parcels: pieces,
        driveway: Some(driveway),
        outcome: FlagOutcome::Split,
        driveway_length,
    })
}

/// Strip counts worth trying for a rear zone of `area`: from the fewest that
/// could bring each lot under `max_area` to the most that keep every lot
/// `min_frontage_width` wide. Empty when no count does both.
fn strip_range(area: f64, width: f64, config: &FlagSplitConfig) -> RangeInclusive<usize> {
    let wanted = (area / config.max_area).ceil().max(1.0) as usize;
    let fitting = (width / config.min_frontage_width).floor().max(1.0) as usize;
    wanted..=fitting
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PoleSide {
    /// Along `x = 0`.
    Start,
    /// Along `x = W`.
    End,
}

fn pick_pole_side(
    islet: &Polygon<f64>,
    frame: &Frame,
    buildings: &[&Polygon<f64>],
    length: f64,
    width: f64,
) -> Result<PoleSide, FabricError> {
    for side in [PoleSide::Start, PoleSide::End] {
        let (x0, x1) = match side {
            PoleSide::Start => (-OVERSHOOT, width),
            PoleSide::End => (frame.width - width, frame.width + OVERSHOOT),
        };
        let pole = frame.rect(x0, x1, -OVERSHOOT, length);
        let mut blocked = false;
        for building in buildings.iter().filter(|b| b.intersects(&pole)) {
            let footprint = intersection(islet, building)?;
            let mut hit = 0.0;
            for part in &footprint {
                hit += total_area(&intersection(part, &pole)?);
            }
            if hit > AREA_EPSILON {
                blocked = true;
                break;
            }
        }
        if !blocked {
            return Ok(side);
        }
        debug!("pole on the {side:?} side crosses a building");
    }
    Err(FabricError::Infeasible("buildings block both pole positions".to_string()))
}

/// Every building must stay within a single lot and off the driveway.
fn check_buildings(
    buildings: &[&Polygon<f64>],
    pieces: &[Polygon<f64>],
    driveway: &Polygon<f64>,
) -> Result<(), FabricError> {
    for building in buildings {
        if total_area(&intersection(building, driveway)?) > AREA_EPSILON {
            return Err(FabricError::Infeasible("the driveway crosses a building".to_string()));
        }
        let mut touched = 0;
        for piece in pieces.iter().filter(|p| p.intersects(*building)) {
            if total_area(&intersection(building, piece)?) > AREA_EPSILON {
                touched += 1;
            }
        }
        if touched > 1 {
            return Err(FabricError::Infeasible("a lot boundary crosses a building".to_string()));
        }
    }
    Ok(())
}

/// Walk the driveway side facing the front lot, from the road to the far
/// end of the branch.
fn measure_driveway(
    graph: &Graph,
    driveway: FaceId,
    front: FaceId,
    frame: &Frame,
    pole_side: PoleSide,
) -> Option<f64> {
    let shared: Vec<HalfEdgeId> = graph
        .face_edges(driveway)
        .into_iter()
        .filter(|&e| {
            graph
                .half_edge(e)
                .and_then(|he| he.twin)
                .and_then(|t| graph.half_edge(t))
                .is_some_and(|twin| twin.face == front)
        })
        .collect();

    let ends = |e: HalfEdgeId| -> Option<(DVec2, DVec2)> {
        let he = graph.half_edge(e)?;
        Some((
            frame.local(graph.node(he.origin)?.position),
            frame.local(graph.node(he.target)?.position),
        ))
    };
    let reach = |p: DVec2| match pole_side {
        PoleSide::Start => p.x,
        PoleSide::End => frame.width - p.x,
    };

    let start = shared.iter().copied().min_by(|&a, &b| {
        let depth = |e| ends(e).map_or(f64::MAX, |(o, t)| o.y.min(t.y));
        depth(a).total_cmp(&depth(b))
    })?;
    let end = shared.iter().copied().max_by(|&a, &b| {
        let far = |e| ends(e).map_or(f64::MIN, |(o, t)| reach(o).max(reach(t)));
        far(a).total_cmp(&far(b))
    })?;

    graph.shortest_path(start, end).map(|path| path.length())
}

/// The islet's bounding box seen from its front.
#[derive(Clone, Copy, Debug)]
struct Frame {
    origin: DVec2,
    along: DVec2,
    into: DVec2,
    width: f64,
    depth: f64,
}

impl Frame {
    fn facing(obb: &OrientedBoundingBox, into: DVec2) -> Self {
        let along = -into.perp();
        let (width, depth) = if into.dot(obb.major_axis()).abs() > 0.5 {
            (obb.short_side(), obb.long_side())
        } else {
            (obb.long_side(), obb.short_side())
        };
        Self {
            origin: obb.center - into * (depth * 0.5) - along * (width * 0.5),
            along,
            into,
            width,
            depth,
        }
    }

    /// The side with the most road contact, or the low end of the long axis.
    fn front_of(obb: &OrientedBoundingBox, roads: &[Polygon<f64>]) -> Result<Self, FabricError> {
        let (u, v) = (obb.major_axis(), obb.minor_axis());
        let mut best = Self::facing(obb, u);
        let mut best_contact = best.road_contact(roads)?;
        for into in [-u, v, -v] {
            let frame = Self::facing(obb, into);
            let contact = frame.road_contact(roads)?;
            if contact > best_contact + AREA_EPSILON {
                best = frame;
                best_contact = contact;
            }
        }
        Ok(best)
    }

    fn road_contact(&self, roads: &[Polygon<f64>]) -> Result<f64, FabricError> {
        let band = self.rect(0.0, self.width, -OVERSHOOT, self.depth * FRONT_BAND);
        let mut contact = 0.0;
        for road in roads.iter().filter(|r| r.intersects(&band)) {
            contact += total_area(&intersection(&band, road)?);
        }
        Ok(contact)
    }

    fn world(&self, x: f64, d: f64) -> DVec2 {
        self.origin + self.along * x + self.into * d
    }

    fn local(&self, point: DVec2) -> DVec2 {
        let offset = point - self.origin;
        DVec2::new(offset.dot(self.along), offset.dot(self.into))
    }

    fn rect(&self, x0: f64, x1: f64, d0: f64, d1: f64) -> Polygon<f64> {
        polygon_from_points(&[
            self.world(x0, d0),
            self.world(x1, d0),
            self.world(x1, d1),
            self.world(x0, d1),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::tests::rect;
    use geo::{Contains, Point};

    fn config() -> FlagSplitConfig {
        FlagSplitConfig {
            max_area: 400.0,
            min_frontage_width: 10.0,
            driveway_length: 20.0,
            driveway_width: 4.0,
            min_area: 100.0,
            existing_roads: vec![rect(0.0, -10.0, 40.0, 0.0)],
            precision: 0.01,
            deadline: None,
        }
    }

    fn islet() -> Polygon<f64> {
        rect(0.0, 0.0, 40.0, 60.0)
    }

    fn front_house() -> Vec<Polygon<f64>> {
        vec![rect(25.0, 5.0, 35.0, 15.0)]
    }

    #[test]
    fn splits_behind_the_front_lot() {
        let result = flag_split(&islet(), &front_house(), &config(), |_| false);

        assert_eq!(result.outcome, FlagOutcome::Split);
        assert_eq!(result.parcels.len(), 5);
        assert!((polygon_area(&result.parcels[0]) - 720.0).abs() < 0.5);
        for rear in &result.parcels[1..] {
            assert!((polygon_area(rear) - 360.0).abs() < 0.5);
        }

        let driveway = result.driveway.as_ref().unwrap();
        assert!((polygon_area(driveway) - 240.0).abs() < 0.5);
        assert!(driveway.contains(&Point::new(2.0, 10.0)));
        assert!((result.driveway_length - 56.0).abs() < 0.1);

        let total = total_area(&result.parcels) + polygon_area(driveway);
        assert!((total - 2400.0).abs() < 0.5);
    }

    #[test]
    fn undersized_lot_reverts_to_the_islet() {
        let strict = FlagSplitConfig {
            min_area: 400.0,
            ..config()
        };
        let result = flag_split(&islet(), &front_house(), &strict, |_| false);

        assert!(matches!(result.outcome, FlagOutcome::Reverted(FabricError::Infeasible(_))));
        assert_eq!(result.parcels, vec![islet()]);
        assert!(result.driveway.is_none());
    }

    #[test]
    fn allowed_isolated_lots_are_kept() {
        let strict = FlagSplitConfig {
            min_area: 400.0,
            ..config()
        };
        let result = flag_split(&islet(), &front_house(), &strict, |_| true);
        assert!(result.is_split());
        assert_eq!(result.parcels.len(), 5);
    }

    #[test]
    fn pole_moves_away_from_a_building() {
        let buildings = vec![rect(1.0, 5.0, 3.0, 15.0)];
        let result = flag_split(&islet(), &buildings, &config(), |_| false);

        assert!(result.is_split());
        let driveway = result.driveway.as_ref().unwrap();
        assert!(driveway.contains(&Point::new(38.0, 10.0)));
        assert!(!driveway.contains(&Point::new(2.0, 10.0)));
        assert!((result.driveway_length - 56.0).abs() < 0.1);
    }

    #[test]
    fn buildings_on_both_sides_are_infeasible() {
        let buildings = vec![rect(1.0, 5.0, 3.0, 10.0), rect(37.0, 5.0, 39.0, 10.0)];
        let result = flag_split(&islet(), &buildings, &config(), |_| false);
        assert!(!result.is_split());
        assert_eq!(result.parcels, vec![islet()]);
    }

    #[test]
    fn building_across_a_rear_cut_is_infeasible() {
        let buildings = vec![rect(8.0, 40.0, 12.0, 50.0)];
        let result = flag_split(&islet(), &buildings, &config(), |_| false);
        assert!(!result.is_split());
    }

    #[test]
    fn shallow_islet_is_infeasible() {
        let shallow = rect(0.0, 0.0, 40.0, 22.0);
        let result = flag_split(&shallow, &[], &config(), |_| false);
        assert!(matches!(result.outcome, FlagOutcome::Reverted(FabricError::Infeasible(_))));
        assert_eq!(result.parcels, vec![shallow]);
    }

    #[test]
    fn islet_with_hole_is_rejected() {
        let outer = islet();
        let holed = Polygon::new(
            outer.exterior().clone(),
            vec![rect(10.0, 30.0, 20.0, 40.0).exterior().clone()],
        );
        let result = flag_split(&holed, &[], &config(), |_| false);
        assert!(matches!(result.outcome, FlagOutcome::Reverted(FabricError::Geometry(_))));
    }

    #[test]
    fn strip_range_respects_frontage() {
        let config = config();
        assert_eq!(strip_range(1440.0, 40.0, &config), 4..=4);
        assert!(strip_range(1440.0, 25.0, &config).is_empty());
        assert_eq!(strip_range(100.0, 40.0, &config), 1..=4);
    }

    #[test]
    fn deep_narrow_islet_reverts_instead_of_oversizing() {
        // 40 wide leaves room for four lots, but the rear zone needs eighteen.
        let deep = rect(0.0, 0.0, 40.0, 200.0);
        let config = FlagSplitConfig {
            existing_roads: Vec::new(),
            ..config()
        };
        let result = flag_split(&deep, &[], &config, |_| false);

        assert!(matches!(result.outcome, FlagOutcome::Reverted(FabricError::Infeasible(_))));
        assert_eq!(result.parcels, vec![deep]);
        assert!(result.driveway.is_none());
    }

    #[test]
    fn uneven_rear_zone_gets_an_extra_strip() {
        // The rear zone deepens to the right: three strips would leave the
        // last one at 435.6, four keep every lot under 400.
        let islet = polygon_from_points(&[
            DVec2::new(0.0, 0.0),
            DVec2::new(40.0, 0.0),
            DVec2::new(40.0, 60.0),
            DVec2::new(0.0, 40.0),
        ]);
        let result = flag_split(&islet, &[], &config(), |_| false);

        assert!(result.is_split());
        assert_eq!(result.parcels.len(), 5);
        for rear in &result.parcels[1..] {
            assert!(polygon_area(rear) <= 400.0 + 0.5);
        }
        assert!((polygon_area(&result.parcels[4]) - 335.0).abs() < 0.5);
    }

    #[test]
    fn expired_deadline_reverts() {
        let config = FlagSplitConfig {
            deadline: Some(Duration::ZERO),
            ..config()
        };
        let result = flag_split(&islet(), &front_house(), &config, |_| false);
        assert_eq!(
            result.outcome,
            FlagOutcome::Reverted(FabricError::Infeasible("deadline exceeded".to_string()))
        );
        assert_eq!(result.parcels, vec![islet()]);
    }
}
