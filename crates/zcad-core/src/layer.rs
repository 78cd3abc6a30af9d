//! 图层表

use crate::entity::DEFAULT_LAYER;
use serde::{Deserialize, Serialize};

/// DXF 图层标志位
const FLAG_LOCKED: i16 = 4;

/// 图层
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    /// ACI 颜色；负值表示图层关闭
    pub color: i16,
    pub linetype: String,
    /// 组码 70 标志位
    pub flags: i16,
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: 7,
            linetype: "Continuous".to_string(),
            flags: 0,
        }
    }

    pub fn with_color(mut self, color: i16) -> Self {
        self.color = color;
        self
    }

    pub fn locked(mut self) -> Self {
        self.set_locked(true);
        self
    }

    pub fn is_locked(&self) -> bool {
        self.flags & FLAG_LOCKED != 0
    }

    pub fn set_locked(&mut self, locked: bool) {
        if locked {
            self.flags |= FLAG_LOCKED;
        } else {
            self.flags &= !FLAG_LOCKED;
        }
    }
}

/// 图层表，名称大小写不敏感，始终包含图层 "0"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerTable {
    layers: Vec<Layer>,
}

impl Default for LayerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerTable {
    pub fn new() -> Self {
        Self {
            layers: vec![Layer::new(DEFAULT_LAYER)],
        }
    }

    /// 添加或替换同名图层
    pub fn add(&mut self, layer: Layer) {
        match self.position(&layer.name) {
            Some(index) => self.layers[index] = layer,
            None => self.layers.push(layer),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Layer> {
        self.position(name).map(|index| &self.layers[index])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// 图层是否锁定；未知图层返回 `None`
    pub fn is_locked(&self, name: &str) -> Option<bool> {
        self.get(name).map(Layer::is_locked)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.layers
            .iter()
            .position(|l| l.name.eq_ignore_ascii_case(name))
    }
}
