//! ZCAD 核心图纸模型
//!
//! 提供二维几何图元、仿射变换，以及以块表为核心的图纸文档。
//!
//! # 架构设计
//!
//! - `Document`: 块表 (arena) + 布局 + 图层表
//! - `Entity`: 通用属性（图层、颜色、线型）+ `Geometry`
//! - `Insert`: 通过 `BlockId` 引用同一文档中的块
//! - `SymbolTables`: 线型、文字样式、标注样式，随实体跨文档复制
//!
//! # 示例
//!
//! ```rust
//! use zcad_core::prelude::*;
//!
//! let mut doc = Document::new();
//! let model = doc.model_block().unwrap();
//! let line = Line::new(Point2::origin(), Point2::new(100.0, 50.0));
//! doc.add_entity(model, Entity::new(Geometry::Line(line))).unwrap();
//! assert!(doc.validate().is_ok());
//! ```

pub mod document;
pub mod entity;
pub mod geometry;
pub mod layer;
pub mod math;
pub mod symbols;
pub mod transform;

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::document::{
        Block, BlockId, BlockRemap, Document, DocumentError, Layout, MODEL_LAYOUT, MODEL_SPACE,
        PAPER_SPACE,
    };
    pub use crate::entity::Entity;
    pub use crate::geometry::{
        Arc, Circle, Geometry, Insert, Line, Point, Polyline, PolylineVertex, RawEntity, Text,
        Viewport, ViewportAlignment,
    };
    pub use crate::layer::{Layer, LayerTable};
    pub use crate::math::{BoundingBox2, Point2, Vector2, EPSILON};
    pub use crate::symbols::{SymbolTable, SymbolTables, TableRecord};
    pub use crate::transform::Transform2D;
}
