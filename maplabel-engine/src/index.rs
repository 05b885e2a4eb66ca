use maplabel_core::errors::GeometryError;
use maplabel_core::geometry::{Bounds2D, Point2};
use maplabel_core::label::{FeatureGeometry, FeatureId, RequestId};
use maplabel_core::symbol::PointSymbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObstacleKind {
    Point,
    LineSegment,
    AreaEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Label(RequestId),
    Feature { feature: FeatureId, kind: ObstacleKind },
}

impl IndexKey {
    pub fn feature(&self) -> Option<FeatureId> {
        match self {
            IndexKey::Feature { feature, .. } => Some(*feature),
            IndexKey::Label(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexEntry {
    pub key: IndexKey,
    pub bounds: Bounds2D,
}

/// 放置引擎使用的空间查询服务。
pub trait SpatialIndex {
    fn insert(&mut self, entry: IndexEntry);

    /// 移除某个注记已登记的全部条目，返回移除数量。
    fn remove_label(&mut self, request: RequestId) -> usize;

    /// 返回与 `area` 内部重叠的条目。
    fn query(&self, area: &Bounds2D) -> Vec<IndexEntry>;

    fn nearest(&self, point: Point2) -> Option<IndexEntry>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 线性扫描的参考实现，适合小规模地图与测试。
#[derive(Debug, Clone, Default)]
pub struct BoundsIndex {
    entries: Vec<IndexEntry>,
}

impl BoundsIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }
}

impl SpatialIndex for BoundsIndex {
    fn insert(&mut self, entry: IndexEntry) {
        self.entries.push(entry);
    }

    fn remove_label(&mut self, request: RequestId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.key != IndexKey::Label(request));
        before - self.entries.len()
    }

    fn query(&self, area: &Bounds2D) -> Vec<IndexEntry> {
        self.entries
            .iter()
            .filter(|entry| area.intersects(&entry.bounds))
            .copied()
            .collect()
    }

    fn nearest(&self, point: Point2) -> Option<IndexEntry> {
        self.entries
            .iter()
            .min_by(|a, b| {
                distance_to_bounds(point, &a.bounds).total_cmp(&distance_to_bounds(point, &b.bounds))
            })
            .copied()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

fn distance_to_bounds(point: Point2, bounds: &Bounds2D) -> f64 {
    if bounds.is_empty() {
        return f64::INFINITY;
    }
    let clamped = Point2::new(
        point.x().clamp(bounds.min().x(), bounds.max().x()),
        point.y().clamp(bounds.min().y(), bounds.max().y()),
    );
    point.distance(clamped)
}

/// 将要素几何拆成障碍条目：点（或其符号外框）、线的每一段、面的每条边。
pub fn feature_obstacles(
    feature: FeatureId,
    geometry: &FeatureGeometry,
    symbol: Option<&PointSymbol>,
) -> Result<Vec<IndexEntry>, GeometryError> {
    let entries = match geometry {
        FeatureGeometry::Point(_) => {
            let bounds = match symbol {
                Some(symbol) => symbol.bounding_box()?,
                None => geometry.bounds(),
            };
            vec![IndexEntry {
                key: IndexKey::Feature {
                    feature,
                    kind: ObstacleKind::Point,
                },
                bounds,
            }]
        }
        FeatureGeometry::Line(points) => points
            .windows(2)
            .map(|segment| IndexEntry {
                key: IndexKey::Feature {
                    feature,
                    kind: ObstacleKind::LineSegment,
                },
                bounds: Bounds2D::from_points(segment),
            })
            .collect(),
        FeatureGeometry::Area(polygon) => polygon
            .edges()
            .map(|(a, b)| IndexEntry {
                key: IndexKey::Feature {
                    feature,
                    kind: ObstacleKind::AreaEdge,
                },
                bounds: Bounds2D::from_points([&a, &b]),
            })
            .collect(),
    };
    Ok(entries)
}
