//! 实体 = 通用属性 + 几何

use crate::geometry::{Geometry, Insert, Viewport};
use serde::{Deserialize, Serialize};

/// 默认图层名
pub const DEFAULT_LAYER: &str = "0";

/// 图元
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// 所在图层
    pub layer: String,
    /// ACI 颜色，`None` 表示随层
    pub color: Option<i16>,
    /// 线型名，`None` 表示随层
    pub linetype: Option<String>,
    /// 线宽（百分之一毫米），`None` 表示随层
    pub lineweight: Option<i16>,
    /// 未解析的组码，保存时原样写回
    pub extra: Vec<(i32, String)>,
    pub geometry: Geometry,
}

impl Entity {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            layer: DEFAULT_LAYER.to_string(),
            color: None,
            linetype: None,
            lineweight: None,
            extra: Vec::new(),
            geometry,
        }
    }

    pub fn on_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = layer.into();
        self
    }

    pub fn with_color(mut self, aci: i16) -> Self {
        self.color = Some(aci);
        self
    }

    pub fn as_insert(&self) -> Option<&Insert> {
        match &self.geometry {
            Geometry::Insert(insert) => Some(insert),
            _ => None,
        }
    }

    pub fn as_insert_mut(&mut self) -> Option<&mut Insert> {
        match &mut self.geometry {
            Geometry::Insert(insert) => Some(insert),
            _ => None,
        }
    }

    pub fn as_viewport(&self) -> Option<&Viewport> {
        match &self.geometry {
            Geometry::Viewport(vp) => Some(vp),
            _ => None,
        }
    }

    pub fn is_viewport(&self) -> bool {
        self.as_viewport().is_some()
    }

    /// 复制通用属性，替换几何
    pub fn with_geometry(&self, geometry: Geometry) -> Entity {
        Entity {
            layer: self.layer.clone(),
            color: self.color,
            linetype: self.linetype.clone(),
            lineweight: self.lineweight,
            extra: self.extra.clone(),
            geometry,
        }
    }
}
