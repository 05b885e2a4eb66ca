use std::cell::OnceCell;

use serde::{Deserialize, Serialize};

use crate::errors::GeometryError;
use crate::geometry::{Bounds2D, Point2, Polygon, Vector2, convex_hull};

/// 点符号派生几何量：凸包、包围盒与中心点。
///
/// 由 [`PointSymbol`] 持有，轮廓变化时失效，下次读取时重新生成。
#[derive(Debug, Clone, PartialEq)]
pub struct GeometricProperties {
    convex_hull: Vec<Point2>,
    center: Point2,
    bounding_box: Bounds2D,
}

impl GeometricProperties {
    fn generate(outline: &[Polygon]) -> Result<Self, GeometryError> {
        check_outline(outline)?;
        let vertices: Vec<Point2> = outline
            .iter()
            .flat_map(|polygon| polygon.vertices().iter().copied())
            .collect();
        let convex_hull = convex_hull(&vertices);

        let mut bounding_box = Bounds2D::empty();
        for polygon in outline {
            bounding_box.include_bounds(&polygon.bounds());
        }
        let center = bounding_box.center();

        Ok(Self {
            convex_hull,
            center,
            bounding_box,
        })
    }

    fn translate(&mut self, offset: Vector2) {
        for vertex in &mut self.convex_hull {
            *vertex = vertex.translate(offset);
        }
        self.center = self.center.translate(offset);
        self.bounding_box = self.bounding_box.translated(offset);
    }

    // 旋转后凸包仍是凸包，包围盒由凸包顶点即可得到。
    fn rotate(&mut self, angle: f64, about: Point2) {
        for vertex in &mut self.convex_hull {
            *vertex = vertex.rotate_about(about, angle);
        }
        self.bounding_box = Bounds2D::from_points(&self.convex_hull);
        self.center = self.bounding_box.center();
    }

    #[inline]
    pub fn convex_hull(&self) -> &[Point2] {
        &self.convex_hull
    }

    #[inline]
    pub fn center(&self) -> Point2 {
        self.center
    }

    #[inline]
    pub fn bounding_box(&self) -> Bounds2D {
        self.bounding_box
    }
}

fn check_outline(outline: &[Polygon]) -> Result<(), GeometryError> {
    if outline.is_empty() {
        return Err(GeometryError::EmptyOutline);
    }
    if let Some(index) = outline.iter().position(Polygon::is_empty) {
        return Err(GeometryError::NoVerticesPresent { index });
    }
    Ok(())
}

/// 点要素的符号外形，由若干多边形组成（地图坐标）。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointSymbol {
    outline: Vec<Polygon>,
    #[serde(skip)]
    properties: OnceCell<GeometricProperties>,
}

// 缓存是否已生成不影响相等性。
impl PartialEq for PointSymbol {
    fn eq(&self, other: &Self) -> bool {
        self.outline == other.outline
    }
}

impl PointSymbol {
    pub fn new(outline: Vec<Polygon>) -> Result<Self, GeometryError> {
        let mut symbol = Self::default();
        symbol.set_outline(outline)?;
        Ok(symbol)
    }

    /// 以中心点和宽高构造矩形符号，常用于测试与演示。
    pub fn rectangle(center: Point2, width: f64, height: f64) -> Result<Self, GeometryError> {
        let bounds = Bounds2D::from_center_size(center, width, height);
        let (min, max) = (bounds.min(), bounds.max());
        Self::new(vec![Polygon::new(vec![
            min,
            Point2::new(max.x(), min.y()),
            max,
            Point2::new(min.x(), max.y()),
        ])])
    }

    /// 替换外形并立即重新生成派生几何量。
    pub fn set_outline(&mut self, mut outline: Vec<Polygon>) -> Result<(), GeometryError> {
        check_outline(&outline)?;
        for polygon in &mut outline {
            polygon.update_bounds();
        }
        let properties = GeometricProperties::generate(&outline)?;
        self.outline = outline;
        self.properties = OnceCell::from(properties);
        Ok(())
    }

    /// 外形以符号局部坐标给出，先平移到 `origin` 再替换。
    pub fn set_client_outline(
        &mut self,
        mut outline: Vec<Polygon>,
        origin: Point2,
    ) -> Result<(), GeometryError> {
        let offset = Point2::new(0.0, 0.0).vector_to(origin);
        for polygon in &mut outline {
            polygon.translate(offset);
        }
        self.set_outline(outline)
    }

    #[inline]
    pub fn outline(&self) -> &[Polygon] {
        &self.outline
    }

    /// 可变访问外形；缓存随即失效，下次读取时重新生成。
    pub fn outline_mut(&mut self) -> &mut Vec<Polygon> {
        self.properties.take();
        &mut self.outline
    }

    /// 平移外形，缓存按增量更新而非重新生成。
    pub fn translate(&mut self, offset: Vector2) {
        for polygon in &mut self.outline {
            polygon.translate(offset);
        }
        if let Some(properties) = self.properties.get_mut() {
            properties.translate(offset);
        }
    }

    /// 绕 `about` 旋转 `angle`（弧度），缓存按增量更新。
    pub fn rotate(&mut self, angle: f64, about: Point2) {
        for polygon in &mut self.outline {
            polygon.rotate_about(about, angle);
        }
        if let Some(properties) = self.properties.get_mut() {
            properties.rotate(angle, about);
        }
    }

    #[inline]
    pub fn is_cached(&self) -> bool {
        self.properties.get().is_some()
    }

    pub fn properties(&self) -> Result<&GeometricProperties, GeometryError> {
        if let Some(properties) = self.properties.get() {
            return Ok(properties);
        }
        let generated = GeometricProperties::generate(&self.outline)?;
        Ok(self.properties.get_or_init(|| generated))
    }

    pub fn convex_hull(&self) -> Result<&[Point2], GeometryError> {
        Ok(self.properties()?.convex_hull())
    }

    pub fn center(&self) -> Result<Point2, GeometryError> {
        Ok(self.properties()?.center())
    }

    pub fn bounding_box(&self) -> Result<Bounds2D, GeometryError> {
        Ok(self.properties()?.bounding_box())
    }
}
