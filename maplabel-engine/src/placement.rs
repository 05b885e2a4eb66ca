use maplabel_core::geometry::{
    Bounds2D, Point2, Polygon, Vector2, convex_hull, oriented_rect, point_along, polyline_length,
    support_point, upright_angle,
};
use maplabel_core::label::{FeatureGeometry, LeaderLine, PlacementState};
use tracing::debug;

use crate::command::{
    AreaPlacementCommand, AreaStrategy, Compass, FailureAction, FailureCommand, LeaderCommand,
    LeaderTiming, LinePlacementCommand, LineSide, PointPlacementCommand,
};
use crate::context::ExecutionContext;
use crate::errors::EngineError;

const EPSILON: f64 = 1e-9;

/// 一个候选注记框：中心、尺寸与旋转角（弧度）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub center: Point2,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
    pub corners: [Point2; 4],
    pub bounds: Bounds2D,
}

impl Candidate {
    pub fn new(center: Point2, width: f64, height: f64, angle: f64) -> Self {
        let corners = oriented_rect(center, width, height, angle);
        Self {
            center,
            width,
            height,
            angle,
            corners,
            bounds: Bounds2D::from_points(&corners),
        }
    }

    pub fn translated(&self, offset: Vector2) -> Self {
        Self::new(self.center.translate(offset), self.width, self.height, self.angle)
    }

    pub fn outline(&self) -> Polygon {
        Polygon::new(self.corners.to_vec())
    }
}

fn rotate_vector(vector: Vector2, angle: f64) -> Vector2 {
    let (sin, cos) = angle.sin_cos();
    Vector2::new(
        vector.x() * cos - vector.y() * sin,
        vector.x() * sin + vector.y() * cos,
    )
}

fn compass_unit(position: Compass) -> (f64, f64) {
    let (dx, dy) = position.direction();
    (f64::from(dx), f64::from(dy))
}

/// 在锚点（或符号凸包的支撑点）外侧按方位摆放注记框。
fn compass_candidate(
    point: Point2,
    hull: Option<&[Point2]>,
    position: Compass,
    width: f64,
    height: f64,
    offset: f64,
    angle: f64,
) -> Candidate {
    let hull = hull.filter(|hull| !hull.is_empty());
    if position == Compass::OnPoint {
        let center = hull.map_or(point, |hull| Bounds2D::from_points(hull).center());
        return Candidate::new(center, width, height, angle);
    }
    let (dx, dy) = compass_unit(position);
    let anchor = hull
        .and_then(|hull| {
            let direction = rotate_vector(Vector2::new(dx, dy), angle).normalize()?;
            support_point(hull, direction)
        })
        .unwrap_or(point);
    let local = Vector2::new(dx * (width * 0.5 + offset), dy * (height * 0.5 + offset));
    Candidate::new(
        anchor.translate(rotate_vector(local, angle)),
        width,
        height,
        angle,
    )
}

impl PointPlacementCommand {
    pub(crate) fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<bool, EngineError> {
        let point = match &ctx.request().geometry {
            FeatureGeometry::Point(point) => *point,
            _ => return Ok(false),
        };
        let hull = match &ctx.request().symbol {
            Some(symbol) => Some(symbol.convex_hull()?.to_vec()),
            None => None,
        };
        let (width, height) = ctx.label_extent();
        let angle = self.angle().to_radians();
        let base_offset = ctx.options().point_offset;

        for factor in ctx.relaxations.offset_factors() {
            for &position in self.positions() {
                let candidate = compass_candidate(
                    point,
                    hull.as_deref(),
                    position,
                    width,
                    height,
                    base_offset * factor,
                    angle,
                );
                ctx.note_ideal(&candidate);
                if let Some(resolved) = ctx.resolve(candidate) {
                    debug!(
                        request = ctx.request().id().get(),
                        position = ?position,
                        "点注记放置成功"
                    );
                    ctx.place(&resolved, PlacementState::Placed, None);
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

/// 沿线搜索顺序：理想位置，然后向两侧交替扩展；每侧最后一个位置落在范围端点上。
fn search_positions(initial: f64, min: f64, max: f64, step: f64) -> Vec<f64> {
    let mut positions = vec![initial];
    let mut ahead_open = initial < max - EPSILON;
    let mut behind_open = initial > min + EPSILON;
    let mut k = 1.0;
    while ahead_open || behind_open {
        if ahead_open {
            let ahead = initial + k * step;
            if ahead >= max - EPSILON {
                positions.push(max);
                ahead_open = false;
            } else {
                positions.push(ahead);
            }
        }
        if behind_open {
            let behind = initial - k * step;
            if behind <= min + EPSILON {
                positions.push(min);
                behind_open = false;
            } else {
                positions.push(behind);
            }
        }
        k += 1.0;
    }
    positions
}

fn line_candidate(
    side: LineSide,
    anchor: Point2,
    tangent: Vector2,
    width: f64,
    height: f64,
    gap: f64,
) -> Candidate {
    let angle = upright_angle(tangent.angle());
    let normal = Vector2::new(angle.cos(), angle.sin()).perp();
    match side {
        LineSide::Above => Candidate::new(
            anchor.translate(normal.scale(height * 0.5 + gap)),
            width,
            height,
            angle,
        ),
        LineSide::Below => Candidate::new(
            anchor.translate(normal.scale(-(height * 0.5 + gap))),
            width,
            height,
            angle,
        ),
        LineSide::Middle => Candidate::new(anchor, width, height, angle),
        LineSide::Left => Candidate::new(
            anchor.translate(Vector2::new(-(width * 0.5 + gap), 0.0)),
            width,
            height,
            0.0,
        ),
        LineSide::Right => Candidate::new(
            anchor.translate(Vector2::new(width * 0.5 + gap, 0.0)),
            width,
            height,
            0.0,
        ),
    }
}

impl LinePlacementCommand {
    pub(crate) fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<bool, EngineError> {
        let points = match &ctx.request().geometry {
            FeatureGeometry::Line(points) => points.clone(),
            _ => return Ok(false),
        };
        let length = polyline_length(&points);
        if length <= EPSILON {
            return Ok(false);
        }
        let (width, height) = ctx.label_extent();
        let first = self.min_position().resolve(length);
        let second = self.max_position().resolve(length);
        let (min, max) = (first.min(second), first.max(second));
        let initial = self.initial_position().resolve(length).clamp(min, max);
        let step = (width * ctx.options().line_search_step).max(length / 100.0);
        let overhang = ctx
            .relaxations
            .overhang
            .map_or(0.0, |percent| width * percent / 100.0);
        let base_gap = ctx.options().point_offset;

        for factor in ctx.relaxations.offset_factors() {
            for distance in search_positions(initial, min, max, step) {
                let start = distance - width * 0.5;
                let end = distance + width * 0.5;
                if start < -overhang - EPSILON || end > length + overhang + EPSILON {
                    continue;
                }
                let Some((anchor, tangent)) = point_along(&points, distance) else {
                    continue;
                };
                let candidate = line_candidate(
                    self.place_where(),
                    anchor,
                    tangent,
                    width,
                    height,
                    base_gap * factor,
                );
                ctx.note_ideal(&candidate);
                if let Some(resolved) = ctx.resolve(candidate) {
                    debug!(
                        request = ctx.request().id().get(),
                        distance,
                        "线注记放置成功"
                    );
                    ctx.place(&resolved, PlacementState::Placed, None);
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

/// 凸包最长边的方向，规范为正向可读的角度。
pub fn dominant_angle(hull: &[Point2]) -> f64 {
    let count = hull.len();
    if count < 2 {
        return 0.0;
    }
    (0..count)
        .map(|i| Vector2::from_points(hull[i], hull[(i + 1) % count]))
        .max_by(|a, b| a.length_squared().total_cmp(&b.length_squared()))
        .map_or(0.0, |edge| upright_angle(edge.angle()))
}

fn interior_candidates(
    polygon: &Polygon,
    width: f64,
    height: f64,
    angle: f64,
    grid: usize,
) -> Vec<Candidate> {
    let Some(centroid) = polygon.centroid() else {
        return Vec::new();
    };
    let bounds = polygon.bounds();
    let grid = grid.max(1);
    let mut centers = vec![centroid];
    for row in 0..grid {
        for column in 0..grid {
            let x = bounds.min().x() + bounds.width() * (column as f64 + 0.5) / grid as f64;
            let y = bounds.min().y() + bounds.height() * (row as f64 + 0.5) / grid as f64;
            let center = Point2::new(x, y);
            if polygon.contains(center) {
                centers.push(center);
            }
        }
    }
    centers[1..].sort_by(|a, b| a.distance(centroid).total_cmp(&b.distance(centroid)));
    centers
        .into_iter()
        .map(|center| Candidate::new(center, width, height, angle))
        .collect()
}

fn exterior_candidates(
    hull: &[Point2],
    fallback: Point2,
    width: f64,
    height: f64,
    angle: f64,
    offset: f64,
) -> Vec<Candidate> {
    Compass::AROUND
        .iter()
        .map(|&position| {
            compass_candidate(fallback, Some(hull), position, width, height, offset, angle)
        })
        .collect()
}

// 上方的边优先，便于注记压在面的上沿。
fn straddle_candidates(polygon: &Polygon, width: f64, height: f64) -> Vec<Candidate> {
    let mut midpoints: Vec<Point2> = polygon
        .edges()
        .map(|(a, b)| Point2::new((a.x() + b.x()) * 0.5, (a.y() + b.y()) * 0.5))
        .collect();
    midpoints.sort_by(|a, b| b.y().total_cmp(&a.y()));
    midpoints
        .into_iter()
        .map(|center| Candidate::new(center, width, height, 0.0))
        .collect()
}

fn fits_area(
    strategy: AreaStrategy,
    polygon: &Polygon,
    candidate: &Candidate,
    overregion: bool,
) -> bool {
    let outline = candidate.outline();
    let swallows_vertex = polygon
        .vertices()
        .iter()
        .any(|vertex| outline.contains(*vertex));
    if strategy.is_interior() {
        if overregion {
            return polygon.contains(candidate.center);
        }
        candidate.corners.iter().all(|corner| polygon.contains(*corner)) && !swallows_vertex
    } else if strategy.is_exterior() {
        !candidate.corners.iter().any(|corner| polygon.contains(*corner)) && !swallows_vertex
    } else {
        true
    }
}

impl AreaPlacementCommand {
    pub(crate) fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<bool, EngineError> {
        let polygon = match &ctx.request().geometry {
            FeatureGeometry::Area(polygon) => polygon.clone(),
            _ => return Ok(false),
        };
        if polygon.vertices().len() < 3 {
            return Ok(false);
        }
        let (width, height) = ctx.label_extent();
        let hull = convex_hull(polygon.vertices());
        let strategy = self.place_how();
        let angle = match strategy {
            AreaStrategy::InteriorHorizontal
            | AreaStrategy::ExteriorHorizontal
            | AreaStrategy::BoundaryStraddle => 0.0,
            AreaStrategy::InteriorDominantAngle | AreaStrategy::ExteriorDominantAngle => {
                dominant_angle(&hull)
            }
            AreaStrategy::InteriorArbitraryAngle | AreaStrategy::ExteriorArbitraryAngle => {
                self.angle().to_radians()
            }
        };

        let candidates = if strategy.is_interior() {
            interior_candidates(&polygon, width, height, angle, ctx.options().area_grid)
        } else if strategy.is_exterior() {
            let fallback = polygon.centroid().unwrap_or_else(|| polygon.bounds().center());
            ctx.relaxations
                .offset_factors()
                .iter()
                .flat_map(|factor| {
                    exterior_candidates(
                        &hull,
                        fallback,
                        width,
                        height,
                        angle,
                        ctx.options().point_offset * factor,
                    )
                })
                .collect()
        } else {
            straddle_candidates(&polygon, width, height)
        };

        let overregion = ctx.relaxations.overregion;
        for candidate in candidates {
            ctx.note_ideal(&candidate);
            if !fits_area(strategy, &polygon, &candidate, overregion) {
                continue;
            }
            let Some(resolved) = ctx.resolve(candidate) else {
                continue;
            };
            if resolved != candidate && !fits_area(strategy, &polygon, &resolved, overregion) {
                continue;
            }
            debug!(
                request = ctx.request().id().get(),
                strategy = ?strategy,
                "面注记放置成功"
            );
            ctx.place(&resolved, PlacementState::Placed, None);
            return Ok(true);
        }
        Ok(false)
    }
}

fn nearest_point_on_bounds(point: Point2, bounds: &Bounds2D) -> Point2 {
    Point2::new(
        point.x().clamp(bounds.min().x(), bounds.max().x()),
        point.y().clamp(bounds.min().y(), bounds.max().y()),
    )
}

/// 以要素锚点为圆心逐圈外扩，寻找带引线的无冲突位置。
pub fn find_leader_position(
    ctx: &ExecutionContext<'_>,
    max_length: Option<f64>,
) -> Option<(Candidate, LeaderLine)> {
    let anchor = ctx.request().geometry.anchor()?;
    let (width, height) = ctx.label_extent();
    let options = ctx.options();
    let max_length = max_length.unwrap_or(options.leader_max_length);
    let step = options.leader_step;
    if step <= 0.0 || max_length <= 0.0 {
        return None;
    }

    let mut radius = step;
    while radius <= max_length + EPSILON {
        for position in Compass::AROUND {
            let (dx, dy) = compass_unit(position);
            let Some(direction) = Vector2::new(dx, dy).normalize() else {
                continue;
            };
            let center = anchor
                .translate(direction.scale(radius))
                .translate(Vector2::new(dx * width * 0.5, dy * height * 0.5));
            if let Some(resolved) = ctx.resolve(Candidate::new(center, width, height, 0.0)) {
                let to = nearest_point_on_bounds(anchor, &resolved.bounds);
                return Some((resolved, LeaderLine { from: anchor, to }));
            }
        }
        radius += step;
    }
    None
}

/// 搜索引线位置并落位，找不到时不修改请求。
pub fn place_with_leader(
    ctx: &mut ExecutionContext<'_>,
    max_length: Option<f64>,
    state: PlacementState,
) -> bool {
    match find_leader_position(ctx, max_length) {
        Some((candidate, leader)) => {
            ctx.place(&candidate, state, Some(leader));
            true
        }
        None => false,
    }
}

impl LeaderCommand {
    pub(crate) fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<bool, EngineError> {
        match self.timing() {
            LeaderTiming::Immediate => Ok(place_with_leader(
                ctx,
                self.max_length(),
                PlacementState::PlacedWithLeader,
            )),
            LeaderTiming::Deferred => {
                let request = ctx.request().id();
                ctx.workspace_mut().defer_leader(request, self.max_length());
                ctx.request_mut().set_state(PlacementState::LeaderDeferred);
                debug!(request = request.get(), "引线放置延后到主流程结束");
                Ok(true)
            }
        }
    }
}

fn ideal_candidate(ctx: &ExecutionContext<'_>) -> Option<Candidate> {
    if let Some(candidate) = ctx.ideal() {
        return Some(*candidate);
    }
    let anchor = ctx.request().geometry.anchor()?;
    let (width, height) = ctx.label_extent();
    Some(Candidate::new(anchor, width, height, 0.0))
}

impl FailureCommand {
    pub(crate) fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<bool, EngineError> {
        let forced = match self.action() {
            FailureAction::Suppress => None,
            FailureAction::Force => {
                ideal_candidate(ctx).map(|candidate| (candidate, PlacementState::Forced, None))
            }
            FailureAction::ForceWithLeader => find_leader_position(ctx, None)
                .map(|(candidate, leader)| (candidate, Some(leader)))
                .or_else(|| {
                    let candidate = ideal_candidate(ctx)?;
                    let anchor = ctx.request().geometry.anchor()?;
                    let to = nearest_point_on_bounds(anchor, &candidate.bounds);
                    Some((candidate, Some(LeaderLine { from: anchor, to })))
                })
                .map(|(candidate, leader)| (candidate, PlacementState::ForcedWithLeader, leader)),
        };

        match forced {
            Some((candidate, state, leader)) => ctx.place(&candidate, state, leader),
            None => {
                ctx.request_mut().set_state(PlacementState::Suppressed);
                debug!(request = ctx.request().id().get(), "注记被抑制");
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use maplabel_core::label::{FeatureId, LabelContent, LabelRequest, LabelStyle, RequestId};
    use maplabel_core::symbol::PointSymbol;

    use super::*;
    use crate::command::LinePosition;
    use crate::context::{PlacementOptions, PlacementWorkspace};
    use crate::index::{IndexEntry, IndexKey};

    fn request(geometry: FeatureGeometry) -> LabelRequest {
        LabelRequest::new(
            RequestId::new(1),
            FeatureId::new(1),
            "test",
            geometry,
            LabelContent::single("Abcde"),
            LabelStyle::default(),
        )
    }

    fn block(workspace: &mut PlacementWorkspace, id: u64, min: (f64, f64), max: (f64, f64)) {
        workspace.index.insert(IndexEntry {
            key: IndexKey::Label(RequestId::new(id)),
            bounds: Bounds2D::new(Point2::new(min.0, min.1), Point2::new(max.0, max.1)),
        });
    }

    #[test]
    fn point_uses_first_free_position() {
        let mut workspace = PlacementWorkspace::new(PlacementOptions::default());
        // 挡住东北方向
        block(&mut workspace, 50, (0.5, 0.5), (40.0, 30.0));
        let mut label = request(FeatureGeometry::Point(Point2::new(0.0, 0.0)));
        let command = PointPlacementCommand::new(vec![Compass::NE, Compass::SW], 0.0);
        let mut ctx = ExecutionContext::new(&mut workspace, &mut label);
        assert!(command.execute(&mut ctx).unwrap());
        let ideal = ctx.ideal().copied().unwrap();
        assert!(ideal.center.x() > 0.0);
        let placement = label.placement().unwrap();
        assert!(placement.bounds.max().x() < 0.0);
        assert!(placement.bounds.max().y() < 0.0);
        assert_eq!(label.state(), PlacementState::Placed);
    }

    #[test]
    fn point_anchor_uses_symbol_hull() {
        let mut workspace = PlacementWorkspace::new(PlacementOptions::default());
        let symbol = PointSymbol::rectangle(Point2::new(0.0, 0.0), 10.0, 10.0).unwrap();
        let mut label = request(FeatureGeometry::Point(Point2::new(0.0, 0.0))).with_symbol(symbol);
        let command = PointPlacementCommand::new(vec![Compass::E], 0.0);
        let mut ctx = ExecutionContext::new(&mut workspace, &mut label);
        assert!(command.execute(&mut ctx).unwrap());
        let bounds = label.placement().unwrap().bounds;
        // 符号右缘 5，再加偏移 1
        assert!((bounds.min().x() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn offset_relaxation_moves_further_out() {
        let mut workspace = PlacementWorkspace::new(PlacementOptions::default());
        let mut label = request(FeatureGeometry::Point(Point2::new(0.0, 0.0)));
        let command = PointPlacementCommand::new(vec![Compass::E], 0.0);
        let mut ctx = ExecutionContext::new(&mut workspace, &mut label);
        ctx.relaxations.offset = true;
        assert!(command.execute(&mut ctx).unwrap());
        let bounds = label.placement().unwrap().bounds;
        assert!((bounds.min().x() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn line_search_steps_away_from_blocked_ideal() {
        let mut workspace = PlacementWorkspace::new(PlacementOptions::default());
        let mut label = request(FeatureGeometry::Line(vec![
            Point2::new(0.0, 0.0),
            Point2::new(200.0, 0.0),
        ]));
        // 挡住线段中部
        block(&mut workspace, 60, (90.0, 0.0), (110.0, 30.0));
        let command = LinePlacementCommand::new(LineSide::Above);
        let mut ctx = ExecutionContext::new(&mut workspace, &mut label);
        assert!(command.execute(&mut ctx).unwrap());
        let placement = label.placement().unwrap();
        assert!(placement.angle.abs() < 1e-9);
        assert!(placement.bounds.min().y() >= 1.0 - 1e-9);
        assert!(
            placement.bounds.max().x() <= 89.0 || placement.bounds.min().x() >= 111.0,
            "{:?}",
            placement.bounds
        );
    }

    #[test]
    fn line_search_reaches_upper_range_endpoint() {
        let mut workspace = PlacementWorkspace::new(PlacementOptions::default());
        let mut label = request(FeatureGeometry::Line(vec![
            Point2::new(0.0, 0.0),
            Point2::new(200.0, 0.0),
        ]));
        // 只在距离 120（范围上端）处留出空隙，步长 7.5 落不到这里
        block(&mut workspace, 61, (0.0, 0.0), (103.0, 40.0));
        block(&mut workspace, 62, (137.0, 0.0), (200.0, 40.0));
        let command = LinePlacementCommand::new(LineSide::Above).with_positions(
            LinePosition::percent(50.0),
            LinePosition::percent(10.0),
            LinePosition::percent(60.0),
        );
        let mut ctx = ExecutionContext::new(&mut workspace, &mut label);
        assert!(command.execute(&mut ctx).unwrap());
        let bounds = label.placement().unwrap().bounds;
        assert!((bounds.center().x() - 120.0).abs() < 1e-6, "{bounds:?}");
    }

    #[test]
    fn short_line_needs_overhang() {
        let mut workspace = PlacementWorkspace::new(PlacementOptions::default());
        // 注记宽 30，线长 20
        let mut label = request(FeatureGeometry::Line(vec![
            Point2::new(0.0, 0.0),
            Point2::new(20.0, 0.0),
        ]));
        let command = LinePlacementCommand::new(LineSide::Middle);
        let mut ctx = ExecutionContext::new(&mut workspace, &mut label);
        assert!(!command.execute(&mut ctx).unwrap());
        ctx.relaxations.overhang = Some(50.0);
        assert!(command.execute(&mut ctx).unwrap());
    }

    fn square(size: f64) -> Polygon {
        Polygon::new(vec![
            Point2::new(0.0, 0.0),
            Point2::new(size, 0.0),
            Point2::new(size, size),
            Point2::new(0.0, size),
        ])
    }

    #[test]
    fn interior_label_stays_inside() {
        let mut workspace = PlacementWorkspace::new(PlacementOptions::default());
        let mut label = request(FeatureGeometry::Area(square(100.0)));
        let command = AreaPlacementCommand::new(AreaStrategy::InteriorHorizontal);
        let mut ctx = ExecutionContext::new(&mut workspace, &mut label);
        assert!(command.execute(&mut ctx).unwrap());
        let bounds = label.placement().unwrap().bounds;
        assert!((bounds.center().x() - 50.0).abs() < 1e-9);
        assert!((bounds.center().y() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn interior_label_too_big_needs_overregion() {
        let mut workspace = PlacementWorkspace::new(PlacementOptions::default());
        let mut label = request(FeatureGeometry::Area(square(10.0)));
        let command = AreaPlacementCommand::new(AreaStrategy::InteriorHorizontal);
        let mut ctx = ExecutionContext::new(&mut workspace, &mut label);
        assert!(!command.execute(&mut ctx).unwrap());
        ctx.relaxations.overregion = true;
        assert!(command.execute(&mut ctx).unwrap());
    }

    #[test]
    fn exterior_label_stays_outside() {
        let mut workspace = PlacementWorkspace::new(PlacementOptions::default());
        let mut label = request(FeatureGeometry::Area(square(10.0)));
        let command = AreaPlacementCommand::new(AreaStrategy::ExteriorHorizontal);
        let mut ctx = ExecutionContext::new(&mut workspace, &mut label);
        assert!(command.execute(&mut ctx).unwrap());
        let placement = label.placement().unwrap();
        let polygon = square(10.0);
        assert!(placement.corners.iter().all(|corner| !polygon.contains(*corner)));
    }

    #[test]
    fn dominant_angle_follows_longest_edge() {
        let hull = convex_hull(&[
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(9.0, 11.0),
            Point2::new(-1.0, 1.0),
        ]);
        let angle = dominant_angle(&hull);
        assert!((angle - std::f64::consts::FRAC_PI_4).abs() < 1e-9);
    }

    #[test]
    fn leader_and_failure_commands() {
        let mut workspace = PlacementWorkspace::new(PlacementOptions::default());
        block(&mut workspace, 70, (-4.0, -4.0), (4.0, 4.0));
        let mut label = request(FeatureGeometry::Point(Point2::new(0.0, 0.0)));
        let mut ctx = ExecutionContext::new(&mut workspace, &mut label);

        let leader = LeaderCommand::new(LeaderTiming::Immediate);
        assert!(leader.execute(&mut ctx).unwrap());
        assert_eq!(ctx.request().state(), PlacementState::PlacedWithLeader);
        let line = ctx.request().placement().unwrap().leader.unwrap();
        assert!(line.from.distance(line.to) <= 30.0 + 1e-9);

        let deferred = LeaderCommand::new(LeaderTiming::Deferred);
        assert!(deferred.execute(&mut ctx).unwrap());
        assert_eq!(ctx.request().state(), PlacementState::LeaderDeferred);
        assert_eq!(ctx.workspace().deferred().len(), 1);

        let suppress = FailureCommand::new(FailureAction::Suppress);
        assert!(suppress.execute(&mut ctx).unwrap());
        assert_eq!(ctx.request().state(), PlacementState::Suppressed);
    }

    #[test]
    fn force_uses_first_attempted_candidate() {
        let mut workspace = PlacementWorkspace::new(PlacementOptions::default());
        block(&mut workspace, 80, (-100.0, -100.0), (100.0, 100.0));
        let mut label = request(FeatureGeometry::Point(Point2::new(0.0, 0.0)));
        let mut ctx = ExecutionContext::new(&mut workspace, &mut label);
        let point = PointPlacementCommand::new(vec![Compass::N, Compass::S], 0.0);
        assert!(!point.execute(&mut ctx).unwrap());
        let ideal = *ctx.ideal().unwrap();

        let force = FailureCommand::new(FailureAction::Force);
        assert!(force.execute(&mut ctx).unwrap());
        assert_eq!(ctx.request().state(), PlacementState::Forced);
        assert_eq!(ctx.request().placement().unwrap().bounds, ideal.bounds);
    }

    #[test]
    fn search_positions_alternate_and_stay_in_range() {
        let positions = search_positions(5.0, 0.0, 8.0, 2.0);
        assert_eq!(positions, vec![5.0, 7.0, 3.0, 8.0, 1.0, 0.0]);
    }

    #[test]
    fn search_positions_end_on_range_endpoints_without_duplicates() {
        assert_eq!(
            search_positions(4.0, 0.0, 8.0, 2.0),
            vec![4.0, 6.0, 2.0, 8.0, 0.0]
        );
        // 理想位置已在端点上时只向另一侧搜索
        assert_eq!(search_positions(8.0, 0.0, 8.0, 3.0), vec![8.0, 5.0, 2.0, 0.0]);
        assert_eq!(search_positions(3.0, 3.0, 3.0, 1.0), vec![3.0]);
    }
}
