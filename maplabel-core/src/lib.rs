pub mod label;
pub mod symbol;

pub mod errors {
    use thiserror::Error;

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    pub enum GeometryError {
        #[error("polygon {index} has no vertices")]
        NoVerticesPresent { index: usize },
        #[error("outline contains no polygons")]
        EmptyOutline,
    }
}

pub mod geometry {
    use std::f64::consts::{FRAC_PI_2, PI};

    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示，全部使用地图坐标（双精度）。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn vector_to(self, other: Point2) -> Vector2 {
            Vector2(other.0 - self.0)
        }

        #[inline]
        pub fn distance(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }

        /// 绕 `center` 逆时针旋转 `angle`（弧度）。
        pub fn rotate_about(self, center: Point2, angle: f64) -> Self {
            let rotation = DVec2::from_angle(angle);
            Self(center.0 + rotation.rotate(self.0 - center.0))
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_points(start: Point2, end: Point2) -> Self {
            Self(end.0 - start.0)
        }

        #[inline]
        pub fn length_squared(self) -> f64 {
            self.0.length_squared()
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        #[inline]
        pub fn scale(self, factor: f64) -> Self {
            Self(self.0 * factor)
        }

        #[inline]
        pub fn normalize(self) -> Option<Self> {
            let len = self.0.length();
            if len <= f64::EPSILON {
                None
            } else {
                Some(Self(self.0 / len))
            }
        }

        /// 左手法向量（逆时针旋转 90°）。
        #[inline]
        pub fn perp(self) -> Self {
            Self(self.0.perp())
        }

        #[inline]
        pub fn angle(self) -> f64 {
            self.0.y.atan2(self.0.x)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 轴对齐边界框，用于碰撞检测与空间索引。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        /// 以中心点与宽高构造边界框。
        pub fn from_center_size(center: Point2, width: f64, height: f64) -> Self {
            let half = DVec2::new(width.abs() * 0.5, height.abs() * 0.5);
            Self {
                min: Point2::from_vec(center.0 - half),
                max: Point2::from_vec(center.0 + half),
            }
        }

        pub fn from_points<'a, I>(points: I) -> Self
        where
            I: IntoIterator<Item = &'a Point2>,
        {
            let mut bounds = Self::empty();
            for point in points {
                bounds.include_point(*point);
            }
            bounds
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        #[inline]
        pub fn width(&self) -> f64 {
            if self.is_empty() {
                0.0
            } else {
                self.max.x() - self.min.x()
            }
        }

        #[inline]
        pub fn height(&self) -> f64 {
            if self.is_empty() {
                0.0
            } else {
                self.max.y() - self.min.y()
            }
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        pub fn include_bounds(&mut self, other: &Bounds2D) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            debug_assert!(!self.is_empty());
            let min_vec = self.min.as_vec2();
            let max_vec = self.max.as_vec2();
            let center = (min_vec + max_vec) * 0.5;
            Point2::from_vec(center)
        }

        /// 向四周扩张 `margin`；负值收缩，收缩过度时退化为中心点。
        pub fn expanded(&self, margin: f64) -> Self {
            if self.is_empty() {
                return *self;
            }
            let delta = DVec2::splat(margin);
            let min = self.min.as_vec2() - delta;
            let max = self.max.as_vec2() + delta;
            if min.x > max.x || min.y > max.y {
                let center = self.center();
                return Self::new(center, center);
            }
            Self::new(Point2::from_vec(min), Point2::from_vec(max))
        }

        pub fn translated(&self, offset: Vector2) -> Self {
            if self.is_empty() {
                return *self;
            }
            Self::new(self.min.translate(offset), self.max.translate(offset))
        }

        /// 判断两个框的内部是否重叠，仅接触边界不算重叠。
        pub fn intersects(&self, other: &Bounds2D) -> bool {
            if self.is_empty() || other.is_empty() {
                return false;
            }
            !(self.max.x() <= other.min.x()
                || other.max.x() <= self.min.x()
                || self.max.y() <= other.min.y()
                || other.max.y() <= self.min.y())
        }

        pub fn contains_point(&self, point: Point2) -> bool {
            !self.is_empty()
                && point.x() >= self.min.x()
                && point.x() <= self.max.x()
                && point.y() >= self.min.y()
                && point.y() <= self.max.y()
        }
    }

    /// 简单多边形，缓存自身的包围盒。顶点按顺序首尾相连，不重复首点。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Polygon {
        vertices: Vec<Point2>,
        bounds: Bounds2D,
    }

    impl Polygon {
        pub fn new(vertices: Vec<Point2>) -> Self {
            let bounds = Bounds2D::from_points(&vertices);
            Self { vertices, bounds }
        }

        #[inline]
        pub fn vertices(&self) -> &[Point2] {
            &self.vertices
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.vertices.is_empty()
        }

        #[inline]
        pub fn bounds(&self) -> Bounds2D {
            self.bounds
        }

        /// 顶点被外部修改后重新计算包围盒。
        pub fn update_bounds(&mut self) {
            self.bounds = Bounds2D::from_points(&self.vertices);
        }

        pub fn translate(&mut self, offset: Vector2) {
            for vertex in &mut self.vertices {
                *vertex = vertex.translate(offset);
            }
            self.bounds = self.bounds.translated(offset);
        }

        pub fn rotate_about(&mut self, center: Point2, angle: f64) {
            for vertex in &mut self.vertices {
                *vertex = vertex.rotate_about(center, angle);
            }
            self.update_bounds();
        }

        /// 依次返回每条边（含闭合边）。
        pub fn edges(&self) -> impl Iterator<Item = (Point2, Point2)> + '_ {
            let count = self.vertices.len();
            (0..count).map(move |i| (self.vertices[i], self.vertices[(i + 1) % count]))
        }

        /// 有向面积，逆时针为正。
        pub fn signed_area(&self) -> f64 {
            self.edges()
                .map(|(a, b)| a.x() * b.y() - b.x() * a.y())
                .sum::<f64>()
                * 0.5
        }

        /// 面积加权质心；退化多边形回退到包围盒中心。
        pub fn centroid(&self) -> Option<Point2> {
            if self.vertices.is_empty() {
                return None;
            }
            let area = self.signed_area();
            if area.abs() <= f64::EPSILON {
                return Some(self.bounds.center());
            }
            let mut acc = DVec2::ZERO;
            for (a, b) in self.edges() {
                let cross = a.x() * b.y() - b.x() * a.y();
                acc += (a.as_vec2() + b.as_vec2()) * cross;
            }
            Some(Point2::from_vec(acc / (6.0 * area)))
        }

        /// 射线法判断点是否位于多边形内部。
        pub fn contains(&self, point: Point2) -> bool {
            if !self.bounds.contains_point(point) {
                return false;
            }
            let mut inside = false;
            for (a, b) in self.edges() {
                if (a.y() > point.y()) != (b.y() > point.y()) {
                    let t = (point.y() - a.y()) / (b.y() - a.y());
                    let x = a.x() + t * (b.x() - a.x());
                    if point.x() < x {
                        inside = !inside;
                    }
                }
            }
            inside
        }
    }

    fn cross(o: DVec2, a: DVec2, b: DVec2) -> f64 {
        (a - o).perp_dot(b - o)
    }

    /// Andrew 单调链凸包，返回逆时针顶点序列（不含共线点）。
    pub fn convex_hull(points: &[Point2]) -> Vec<Point2> {
        let mut sorted: Vec<DVec2> = points.iter().map(|p| p.as_vec2()).collect();
        sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
        sorted.dedup();
        if sorted.len() < 3 {
            return sorted.into_iter().map(Point2::from_vec).collect();
        }

        let mut lower: Vec<DVec2> = Vec::with_capacity(sorted.len());
        for &p in &sorted {
            while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0
            {
                lower.pop();
            }
            lower.push(p);
        }
        let mut upper: Vec<DVec2> = Vec::with_capacity(sorted.len());
        for &p in sorted.iter().rev() {
            while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0
            {
                upper.pop();
            }
            upper.push(p);
        }
        lower.pop();
        upper.pop();
        lower.extend(upper);
        lower.into_iter().map(Point2::from_vec).collect()
    }

    /// 凸包在方向 `direction` 上的支撑点（投影最远的顶点）。
    pub fn support_point(hull: &[Point2], direction: Vector2) -> Option<Point2> {
        hull.iter()
            .copied()
            .max_by(|a, b| {
                a.as_vec2()
                    .dot(direction.0)
                    .total_cmp(&b.as_vec2().dot(direction.0))
            })
    }

    pub fn polyline_length(points: &[Point2]) -> f64 {
        points.windows(2).map(|w| w[0].distance(w[1])).sum()
    }

    /// 沿折线前进 `distance` 后的位置及该处单位切向量。超出范围时夹取到端点。
    pub fn point_along(points: &[Point2], distance: f64) -> Option<(Point2, Vector2)> {
        let mut remaining = distance.max(0.0);
        let mut last = None;
        for window in points.windows(2) {
            let (start, end) = (window[0], window[1]);
            let segment = Vector2::from_points(start, end);
            let Some(direction) = segment.normalize() else {
                continue;
            };
            let length = segment.length();
            if remaining <= length {
                return Some((start.translate(direction.scale(remaining)), direction));
            }
            remaining -= length;
            last = Some((end, direction));
        }
        last
    }

    /// 将角度规范到 (-π/2, π/2]，保证文字不倒置。
    pub fn upright_angle(angle: f64) -> f64 {
        let mut result = angle % PI;
        if result > FRAC_PI_2 {
            result -= PI;
        } else if result <= -FRAC_PI_2 {
            result += PI;
        }
        result
    }

    /// 以中心、宽高和旋转角构造有向矩形的四个角点（逆时针）。
    pub fn oriented_rect(center: Point2, width: f64, height: f64, angle: f64) -> [Point2; 4] {
        let (hw, hh) = (width * 0.5, height * 0.5);
        [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)].map(|(x, y)| {
            Point2::new(center.x() + x, center.y() + y).rotate_about(center, angle)
        })
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn square(size: f64) -> Polygon {
            Polygon::new(vec![
                Point2::new(0.0, 0.0),
                Point2::new(size, 0.0),
                Point2::new(size, size),
                Point2::new(0.0, size),
            ])
        }

        #[test]
        fn hull_drops_interior_points() {
            let points = [
                Point2::new(0.0, 0.0),
                Point2::new(4.0, 0.0),
                Point2::new(2.0, 1.0),
                Point2::new(4.0, 4.0),
                Point2::new(0.0, 4.0),
                Point2::new(2.0, 2.0),
            ];
            let hull = convex_hull(&points);
            assert_eq!(hull.len(), 4);
            assert!(!hull.contains(&Point2::new(2.0, 2.0)));
            assert!(Polygon::new(hull).signed_area() > 0.0);
        }

        #[test]
        fn polygon_contains_and_centroid() {
            let poly = square(10.0);
            assert!(poly.contains(Point2::new(5.0, 5.0)));
            assert!(!poly.contains(Point2::new(11.0, 5.0)));
            let centroid = poly.centroid().unwrap();
            assert!((centroid.x() - 5.0).abs() < 1e-9);
            assert!((centroid.y() - 5.0).abs() < 1e-9);
        }

        #[test]
        fn point_along_walks_segments() {
            let line = [
                Point2::new(0.0, 0.0),
                Point2::new(10.0, 0.0),
                Point2::new(10.0, 10.0),
            ];
            assert!((polyline_length(&line) - 20.0).abs() < 1e-9);
            let (point, tangent) = point_along(&line, 15.0).unwrap();
            assert!((point.x() - 10.0).abs() < 1e-9);
            assert!((point.y() - 5.0).abs() < 1e-9);
            assert!((tangent.y() - 1.0).abs() < 1e-9);

            let (end, _) = point_along(&line, 99.0).unwrap();
            assert!((end.y() - 10.0).abs() < 1e-9);
        }

        #[test]
        fn bounds_intersection_excludes_touching_edges() {
            let a = Bounds2D::new(Point2::new(0.0, 0.0), Point2::new(1.0, 1.0));
            let b = Bounds2D::new(Point2::new(1.0, 0.0), Point2::new(2.0, 1.0));
            assert!(!a.intersects(&b));
            assert!(a.expanded(0.1).intersects(&b));
        }

        #[test]
        fn upright_angle_flips_reversed_text() {
            assert!((upright_angle(PI) - 0.0).abs() < 1e-9);
            assert!(upright_angle(-PI).abs() < 1e-9);
            assert!((upright_angle(FRAC_PI_2 + 0.25) - (0.25 - FRAC_PI_2)).abs() < 1e-9);
        }
    }
}
