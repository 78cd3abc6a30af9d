//! 几何图元定义
//!
//! 支持的图元：
//! - 点 (Point)
//! - 线段 (Line)
//! - 圆 (Circle)
//! - 圆弧 (Arc)
//! - 轻量多段线 (Polyline)
//! - 单行文本 (Text)
//! - 块参照 (Insert)
//! - 视口 (Viewport)
//! - 其他未建模实体 (Raw)，按组码原样保留

use crate::document::BlockId;
use crate::math::{BoundingBox2, Point2, Vector2, EPSILON};
use crate::transform::Transform2D;
use serde::{Deserialize, Serialize};

/// 几何类型枚举
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Point(Point),
    Line(Line),
    Circle(Circle),
    Arc(Arc),
    Polyline(Polyline),
    Text(Text),
    Insert(Insert),
    Viewport(Viewport),
    Raw(RawEntity),
}

impl Geometry {
    /// DXF 实体类型名
    pub fn type_name(&self) -> &str {
        match self {
            Geometry::Point(_) => "POINT",
            Geometry::Line(_) => "LINE",
            Geometry::Circle(_) => "CIRCLE",
            Geometry::Arc(_) => "ARC",
            Geometry::Polyline(_) => "LWPOLYLINE",
            Geometry::Text(_) => "TEXT",
            Geometry::Insert(_) => "INSERT",
            Geometry::Viewport(_) => "VIEWPORT",
            Geometry::Raw(raw) => &raw.type_name,
        }
    }

    /// 获取几何的包围盒；块参照与原样实体无法独立计算，返回空包围盒
    pub fn bounding_box(&self) -> BoundingBox2 {
        match self {
            Geometry::Point(p) => BoundingBox2::new(p.position, p.position),
            Geometry::Line(l) => l.bounding_box(),
            Geometry::Circle(c) => c.bounding_box(),
            Geometry::Arc(a) => a.bounding_box(),
            Geometry::Polyline(pl) => pl.bounding_box(),
            Geometry::Text(t) => t.bounding_box(),
            Geometry::Viewport(vp) => vp.paper_bounds(),
            Geometry::Insert(_) | Geometry::Raw(_) => BoundingBox2::empty(),
        }
    }

    /// 应用仿射变换，返回世界坐标下的几何
    ///
    /// 块参照、视口和原样实体不参与变换，返回 `None`。
    pub fn transformed(&self, t: &Transform2D) -> Option<Geometry> {
        let geometry = match self {
            Geometry::Point(p) => Geometry::Point(Point::from_point2(t.apply(&p.position))),
            Geometry::Line(l) => Geometry::Line(Line::new(t.apply(&l.start), t.apply(&l.end))),
            Geometry::Circle(c) => {
                Geometry::Circle(Circle::new(t.apply(&c.center), c.radius * t.mean_scale()))
            }
            Geometry::Arc(a) => Geometry::Arc(a.transformed(t)),
            Geometry::Polyline(pl) => {
                let mirrored = t.is_mirrored();
                let vertices = pl
                    .vertices
                    .iter()
                    .map(|v| {
                        let bulge = if mirrored { -v.bulge } else { v.bulge };
                        PolylineVertex::with_bulge(t.apply(&v.point), bulge)
                    })
                    .collect();
                Geometry::Polyline(Polyline::new(vertices, pl.closed))
            }
            Geometry::Text(text) => {
                let mut out = text.clone();
                out.position = t.apply(&text.position);
                out.height = text.height * t.mean_scale();
                out.rotation = text.rotation + t.rotation_angle();
                Geometry::Text(out)
            }
            Geometry::Insert(_) | Geometry::Viewport(_) | Geometry::Raw(_) => return None,
        };
        Some(geometry)
    }

    /// 代表点：用于对齐校验（点的位置、线段起点、圆心、文本插入点等）
    pub fn anchor(&self) -> Option<Point2> {
        match self {
            Geometry::Point(p) => Some(p.position),
            Geometry::Line(l) => Some(l.start),
            Geometry::Circle(c) => Some(c.center),
            Geometry::Arc(a) => Some(a.center),
            Geometry::Polyline(pl) => pl.vertices.first().map(|v| v.point),
            Geometry::Text(t) => Some(t.position),
            Geometry::Insert(i) => Some(i.position),
            Geometry::Viewport(vp) => Some(vp.center),
            Geometry::Raw(_) => None,
        }
    }
}

/// 点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub position: Point2,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            position: Point2::new(x, y),
        }
    }

    pub fn from_point2(position: Point2) -> Self {
        Self { position }
    }
}

/// 线段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub start: Point2,
    pub end: Point2,
}

impl Line {
    pub fn new(start: Point2, end: Point2) -> Self {
        Self { start, end }
    }

    pub fn bounding_box(&self) -> BoundingBox2 {
        BoundingBox2::from_points([self.start, self.end])
    }
}

/// 圆
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Point2,
    pub radius: f64,
}

impl Circle {
    pub fn new(center: Point2, radius: f64) -> Self {
        Self { center, radius }
    }

    pub fn bounding_box(&self) -> BoundingBox2 {
        BoundingBox2::new(
            Point2::new(self.center.x - self.radius, self.center.y - self.radius),
            Point2::new(self.center.x + self.radius, self.center.y + self.radius),
        )
    }
}

/// 圆弧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arc {
    pub center: Point2,
    pub radius: f64,
    /// 起始角度（弧度）
    pub start_angle: f64,
    /// 终止角度（弧度）
    pub end_angle: f64,
}

impl Arc {
    pub fn new(center: Point2, radius: f64, start_angle: f64, end_angle: f64) -> Self {
        Self {
            center,
            radius,
            start_angle,
            end_angle,
        }
    }

    /// 获取起点
    pub fn start_point(&self) -> Point2 {
        Point2::new(
            self.center.x + self.radius * self.start_angle.cos(),
            self.center.y + self.radius * self.start_angle.sin(),
        )
    }

    /// 获取终点
    pub fn end_point(&self) -> Point2 {
        Point2::new(
            self.center.x + self.radius * self.end_angle.cos(),
            self.center.y + self.radius * self.end_angle.sin(),
        )
    }

    /// 变换后的圆弧；镜像时起止点互换以保持逆时针方向
    fn transformed(&self, t: &Transform2D) -> Arc {
        let center = t.apply(&self.center);
        let mut start = t.apply(&self.start_point());
        let mut end = t.apply(&self.end_point());
        if t.is_mirrored() {
            std::mem::swap(&mut start, &mut end);
        }
        Arc::new(
            center,
            self.radius * t.mean_scale(),
            (start.y - center.y).atan2(start.x - center.x),
            (end.y - center.y).atan2(end.x - center.x),
        )
    }

    pub fn bounding_box(&self) -> BoundingBox2 {
        // 简化：使用整圆包围盒
        Circle::new(self.center, self.radius).bounding_box()
    }
}

/// 多段线顶点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolylineVertex {
    pub point: Point2,
    /// 凸度（bulge）- 用于弧线段，0表示直线
    pub bulge: f64,
}

impl PolylineVertex {
    pub fn new(point: Point2) -> Self {
        Self { point, bulge: 0.0 }
    }

    pub fn with_bulge(point: Point2, bulge: f64) -> Self {
        Self { point, bulge }
    }
}

/// 多段线
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    pub vertices: Vec<PolylineVertex>,
    /// 是否闭合
    pub closed: bool,
}

impl Polyline {
    pub fn new(vertices: Vec<PolylineVertex>, closed: bool) -> Self {
        Self { vertices, closed }
    }

    /// 从点列表创建（所有顶点都是直线连接）
    pub fn from_points(points: impl IntoIterator<Item = Point2>, closed: bool) -> Self {
        Self {
            vertices: points.into_iter().map(PolylineVertex::new).collect(),
            closed,
        }
    }

    pub fn bounding_box(&self) -> BoundingBox2 {
        if self.vertices.is_empty() {
            return BoundingBox2::empty();
        }
        BoundingBox2::from_points(self.vertices.iter().map(|v| v.point))
    }
}

/// 单行文本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    /// 插入点
    pub position: Point2,
    /// 文本内容
    pub content: String,
    /// 文本高度
    pub height: f64,
    /// 旋转角度（弧度）
    pub rotation: f64,
}

impl Text {
    pub fn new(position: Point2, content: impl Into<String>, height: f64) -> Self {
        Self {
            position,
            content: content.into(),
            height,
            rotation: 0.0,
        }
    }

    /// 估算包围盒（每个字符约为高度的0.6倍宽，忽略旋转）
    pub fn bounding_box(&self) -> BoundingBox2 {
        let width = self.content.chars().count() as f64 * self.height * 0.6;
        BoundingBox2::new(
            self.position,
            Point2::new(self.position.x + width, self.position.y + self.height),
        )
    }
}

/// 块参照
///
/// `block` 指向同一文档块表中的条目，跨文档复制时必须重映射。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insert {
    pub block: BlockId,
    pub position: Point2,
    /// x/y 方向缩放
    pub scale: Vector2,
    /// 旋转角度（度，与 DXF 一致）
    pub rotation: f64,
}

impl Insert {
    pub fn new(block: BlockId, position: Point2) -> Self {
        Self {
            block,
            position,
            scale: Vector2::new(1.0, 1.0),
            rotation: 0.0,
        }
    }

    pub fn with_uniform_scale(mut self, scale: f64) -> Self {
        self.scale = Vector2::new(scale, scale);
        self
    }

    pub fn with_rotation(mut self, degrees: f64) -> Self {
        self.rotation = degrees;
        self
    }

    /// 平移后的副本
    pub fn offset(&self, dx: f64, dy: f64) -> Insert {
        let mut moved = self.clone();
        moved.position = Point2::new(self.position.x + dx, self.position.y + dy);
        moved
    }
}

/// 视口：图纸空间矩形区域与模型空间区域的对应关系
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// 中心点（图纸空间）
    pub center: Point2,
    /// 宽度（图纸空间）
    pub width: f64,
    /// 高度（图纸空间）
    pub height: f64,
    /// 视图中心（模型空间）
    pub view_center: Point2,
    /// 视图高度（模型空间）
    pub view_height: f64,
    /// 视口 ID；1 为整张图纸的总视口
    pub id: i32,
}

impl Viewport {
    pub fn new(center: Point2, width: f64, height: f64, view_center: Point2, view_height: f64) -> Self {
        Self {
            center,
            width,
            height,
            view_center,
            view_height,
            id: 2,
        }
    }

    /// 是否为图纸空间总视口
    pub fn is_overall(&self) -> bool {
        self.id == 1
    }

    /// 视口在图纸上的外框
    pub fn paper_bounds(&self) -> BoundingBox2 {
        let half = Vector2::new(self.width / 2.0, self.height / 2.0);
        BoundingBox2::new(self.center - half, self.center + half)
    }

    /// 模型空间到图纸空间的对齐参数
    ///
    /// `vp_scale = view_height / height`，均匀缩放 `1 / vp_scale`，
    /// 平移 `center - view_center / vp_scale`。不处理视口扭转。
    /// 高度为零或非有限值时返回 `None`。
    pub fn alignment(&self) -> Option<ViewportAlignment> {
        if !self.height.is_finite()
            || !self.view_height.is_finite()
            || !self.center.coords.iter().all(|c| c.is_finite())
            || !self.view_center.coords.iter().all(|c| c.is_finite())
            || self.height.abs() < EPSILON
            || self.view_height.abs() < EPSILON
        {
            return None;
        }
        let vp_scale = self.view_height / self.height;
        Some(ViewportAlignment {
            scale: 1.0 / vp_scale,
            translation: Vector2::new(
                self.center.x - self.view_center.x / vp_scale,
                self.center.y - self.view_center.y / vp_scale,
            ),
        })
    }

    /// 模型空间到图纸空间的对齐变换
    pub fn model_to_paper(&self) -> Option<Transform2D> {
        self.alignment().map(|a| a.transform())
    }
}

/// 视口对齐：先均匀缩放，再平移
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportAlignment {
    pub scale: f64,
    pub translation: Vector2,
}

impl ViewportAlignment {
    pub fn transform(&self) -> Transform2D {
        Transform2D::scale(self.scale, self.scale)
            .then(&Transform2D::translation(self.translation.x, self.translation.y))
    }
}

/// 未建模的实体，保留类型名与组码
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntity {
    pub type_name: String,
    pub codes: Vec<(i32, String)>,
}

impl RawEntity {
    pub fn new(type_name: impl Into<String>, codes: Vec<(i32, String)>) -> Self {
        Self {
            type_name: type_name.into(),
            codes,
        }
    }
}
