//! 图纸文档
//!
//! 文档以块表为核心（arena）：
//! - 所有块存放在同一个数组中，通过 [`BlockId`] 引用，名称索引大小写不敏感
//! - 每个布局（模型/图纸）关联一个块，布局中的实体即该块的实体
//! - 块参照 ([`Insert`]) 只能引用同一文档中的块
//!
//! 跨文档复制统一走“复制子图 -> 重映射引用 -> 写入目标块表”，
//! 名称冲突时重命名，绝不覆盖已有块。

use crate::entity::Entity;
use crate::geometry::{Geometry, RawEntity};
use crate::layer::LayerTable;
use crate::math::{BoundingBox2, Point2};
use crate::symbols::SymbolTables;
use crate::transform::Transform2D;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

/// 模型空间块名
pub const MODEL_SPACE: &str = "*Model_Space";
/// 图纸空间块名（第一个图纸布局）
pub const PAPER_SPACE: &str = "*Paper_Space";
/// 模型布局名
pub const MODEL_LAYOUT: &str = "Model";

/// 块展开的最大嵌套深度
const MAX_NESTING: usize = 64;

/// 块在文档块表中的索引
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(usize);

impl BlockId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// 文档结构错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    #[error("duplicate block name: {0}")]
    DuplicateBlock(String),

    #[error("duplicate layout name: {0}")]
    DuplicateLayout(String),

    #[error("block id {0} does not exist in this document")]
    UnknownBlock(usize),

    #[error("model layout references a missing block")]
    MissingModelBlock,

    #[error("more than one model layout")]
    MultipleModelLayouts,

    #[error("insert in block '{owner}' references missing block id {block}")]
    DanglingInsert { owner: String, block: usize },

    #[error("block nesting too deep (cyclic reference?) at '{0}'")]
    NestingTooDeep(String),
}

/// 块定义
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: String,
    pub base_point: Point2,
    pub entities: Vec<Entity>,
}

impl Block {
    pub fn new(name: impl Into<String>, base_point: Point2) -> Self {
        Self {
            name: name.into(),
            base_point,
            entities: Vec::new(),
        }
    }

    /// 以 `*` 开头的保留块（布局块、匿名块）
    pub fn is_reserved(&self) -> bool {
        self.name.starts_with('*')
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// 布局
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub name: String,
    pub block: BlockId,
    pub tab_order: i32,
    pub is_model: bool,
    /// 图纸宽度（毫米）
    pub paper_width: f64,
    /// 图纸高度（毫米）
    pub paper_height: f64,
}

impl Layout {
    pub fn model(block: BlockId) -> Self {
        Self {
            name: MODEL_LAYOUT.to_string(),
            block,
            tab_order: 0,
            is_model: true,
            paper_width: 0.0,
            paper_height: 0.0,
        }
    }

    pub fn paper(name: impl Into<String>, block: BlockId, tab_order: i32) -> Self {
        Self {
            name: name.into(),
            block,
            tab_order,
            is_model: false,
            // A3
            paper_width: 420.0,
            paper_height: 297.0,
        }
    }
}

/// 源文档块 -> 目标文档块的映射，仅对一对文档有效
#[derive(Debug, Default, Clone)]
pub struct BlockRemap {
    map: HashMap<BlockId, BlockId>,
}

impl BlockRemap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source: BlockId) -> Option<BlockId> {
        self.map.get(&source).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn insert(&mut self, source: BlockId, target: BlockId) {
        self.map.insert(source, target);
    }
}

/// 图纸文档
#[derive(Debug, Clone, Default)]
pub struct Document {
    blocks: Vec<Block>,
    names: HashMap<String, BlockId>,
    layouts: Vec<Layout>,
    pub layers: LayerTable,
    pub symbols: SymbolTables,
}

impl Document {
    /// 只含模型布局与空模型空间块的新文档
    pub fn new() -> Self {
        let mut doc = Self::empty();
        doc.ensure_model_layout();
        doc
    }

    /// 没有任何块和布局的文档（供读取器逐步构建）
    pub fn empty() -> Self {
        Self {
            blocks: Vec::new(),
            names: HashMap::new(),
            layouts: Vec::new(),
            layers: LayerTable::new(),
            symbols: SymbolTables::default(),
        }
    }

    // ========== 块表 ==========

    /// 添加块，名称已存在时报错
    pub fn add_block(&mut self, block: Block) -> Result<BlockId, DocumentError> {
        if self.has_block(&block.name) {
            return Err(DocumentError::DuplicateBlock(block.name));
        }
        Ok(self.push_block(block))
    }

    /// 以不冲突的名称添加空块
    pub fn add_block_unique(&mut self, base_name: &str, base_point: Point2) -> BlockId {
        let name = self.unique_block_name(base_name);
        self.push_block(Block::new(name, base_point))
    }

    pub fn has_block(&self, name: &str) -> bool {
        self.names.contains_key(&name_key(name))
    }

    pub fn find_block(&self, name: &str) -> Option<BlockId> {
        self.names.get(&name_key(name)).copied()
    }

    pub fn block(&self, id: BlockId) -> Result<&Block, DocumentError> {
        self.blocks.get(id.0).ok_or(DocumentError::UnknownBlock(id.0))
    }

    pub fn block_mut(&mut self, id: BlockId) -> Result<&mut Block, DocumentError> {
        self.blocks
            .get_mut(id.0)
            .ok_or(DocumentError::UnknownBlock(id.0))
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks.iter().enumerate().map(|(i, b)| (BlockId(i), b))
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// 生成块表中不存在的名称
    ///
    /// 普通块追加 8 位随机后缀；保留块（`*` 开头）改用下一个空闲的 `*U{n}`。
    pub fn unique_block_name(&self, base: &str) -> String {
        let base = if base.trim().is_empty() { "BLOCK" } else { base };
        if !self.has_block(base) {
            return base.to_string();
        }
        if base.starts_with('*') {
            let mut n = self.blocks.len();
            loop {
                let candidate = format!("*U{n}");
                if !self.has_block(&candidate) {
                    return candidate;
                }
                n += 1;
            }
        }
        loop {
            let candidate = format!("{base}_{}", short_token());
            if !self.has_block(&candidate) {
                return candidate;
            }
        }
    }

    /// 添加实体，块参照必须指向本文档中的块
    pub fn add_entity(&mut self, block: BlockId, entity: Entity) -> Result<(), DocumentError> {
        if let Some(insert) = entity.as_insert() {
            self.block(insert.block)?;
        }
        self.block_mut(block)?.entities.push(entity);
        Ok(())
    }

    /// 合并时选取的内容块：第一个非保留的非空块，否则为非空的模型空间块
    pub fn content_block(&self) -> Option<BlockId> {
        self.blocks()
            .find(|(_, b)| !b.is_reserved() && !b.is_empty())
            .map(|(id, _)| id)
            .or_else(|| {
                self.model_block()
                    .filter(|id| self.blocks.get(id.0).is_some_and(|b| !b.is_empty()))
            })
    }

    fn push_block(&mut self, block: Block) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.names.insert(name_key(&block.name), id);
        self.blocks.push(block);
        id
    }

    // ========== 布局 ==========

    pub fn add_layout(&mut self, layout: Layout) -> Result<(), DocumentError> {
        self.block(layout.block)?;
        if self.layout(&layout.name).is_some() {
            return Err(DocumentError::DuplicateLayout(layout.name));
        }
        if layout.is_model && self.model_layout().is_some() {
            return Err(DocumentError::MultipleModelLayouts);
        }
        self.layouts.push(layout);
        Ok(())
    }

    pub fn layouts(&self) -> &[Layout] {
        &self.layouts
    }

    pub fn layout(&self, name: &str) -> Option<&Layout> {
        self.layouts
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
    }

    pub fn model_layout(&self) -> Option<&Layout> {
        self.layouts.iter().find(|l| l.is_model)
    }

    pub fn model_block(&self) -> Option<BlockId> {
        self.model_layout().map(|l| l.block)
    }

    /// 非模型布局，按标签顺序排列
    pub fn paper_layouts(&self) -> Vec<&Layout> {
        let mut layouts: Vec<&Layout> = self.layouts.iter().filter(|l| !l.is_model).collect();
        layouts.sort_by_key(|l| l.tab_order);
        layouts
    }

    pub fn first_paper_layout(&self) -> Option<&Layout> {
        self.paper_layouts().into_iter().next()
    }

    /// 确保存在模型布局并返回其块
    pub fn ensure_model_layout(&mut self) -> BlockId {
        if let Some(id) = self.model_block() {
            return id;
        }
        let id = match self.find_block(MODEL_SPACE) {
            Some(id) => id,
            None => self.push_block(Block::new(MODEL_SPACE, Point2::origin())),
        };
        self.layouts.insert(0, Layout::model(id));
        id
    }

    /// 移除所有非模型布局；未被任何块参照引用的布局块一并删除
    ///
    /// 返回移除的布局数量。
    pub fn strip_paper_layouts(&mut self) -> usize {
        let before = self.layouts.len();
        let removed: Vec<BlockId> = self
            .layouts
            .iter()
            .filter(|l| !l.is_model)
            .map(|l| l.block)
            .collect();
        self.layouts.retain(|l| l.is_model);

        let referenced = self.referenced_blocks();
        let kept: HashSet<BlockId> = self.layouts.iter().map(|l| l.block).collect();
        let doomed: HashSet<BlockId> = removed
            .into_iter()
            .filter(|id| !referenced.contains(id) && !kept.contains(id))
            .collect();
        self.remove_blocks(&doomed);
        before - self.layouts.len()
    }

    // ========== 跨文档复制 ==========

    /// 深拷贝 `src` 中的块（连同其引用的所有块）到本文档
    ///
    /// 名称冲突时自动重命名；已复制过的块直接复用映射结果。
    pub fn import_block(
        &mut self,
        src: &Document,
        src_id: BlockId,
        remap: &mut BlockRemap,
    ) -> Result<BlockId, DocumentError> {
        if let Some(id) = remap.get(src_id) {
            return Ok(id);
        }
        let source = src.block(src_id)?;
        let name = self.unique_block_name(&importable_name(&source.name));
        self.import_block_named(src, src_id, name, remap)
    }

    /// 以指定名称（冲突时重命名）深拷贝块
    pub fn import_block_as(
        &mut self,
        src: &Document,
        src_id: BlockId,
        name: &str,
        remap: &mut BlockRemap,
    ) -> Result<BlockId, DocumentError> {
        let name = self.unique_block_name(name);
        self.import_block_named(src, src_id, name, remap)
    }

    /// 深拷贝单个实体，块参照指向的块会先被复制并重映射
    pub fn import_entity(
        &mut self,
        src: &Document,
        entity: &Entity,
        remap: &mut BlockRemap,
    ) -> Result<Entity, DocumentError> {
        let geometry = match &entity.geometry {
            Geometry::Insert(insert) => {
                let mut copy = insert.clone();
                copy.block = self.import_block(src, insert.block, remap)?;
                Geometry::Insert(copy)
            }
            Geometry::Raw(raw) if raw.type_name.eq_ignore_ascii_case("DIMENSION") => {
                Geometry::Raw(self.import_dimension(src, raw, remap)?)
            }
            other => other.clone(),
        };
        if !self.layers.contains(&entity.layer) {
            if let Some(layer) = src.layers.get(&entity.layer) {
                self.layers.add(layer.clone());
                self.symbols
                    .linetypes
                    .copy_missing(&src.symbols.linetypes, &layer.linetype);
            }
        }
        self.import_symbols(src, entity);
        Ok(entity.with_geometry(geometry))
    }

    /// 复制实体引用而本文档缺少的线型、文字样式与标注样式
    fn import_symbols(&mut self, src: &Document, entity: &Entity) {
        let symbols = &mut self.symbols;
        if let Some(linetype) = &entity.linetype {
            symbols.linetypes.copy_missing(&src.symbols.linetypes, linetype);
        }
        let (kind, codes) = match &entity.geometry {
            Geometry::Raw(raw) => (raw.type_name.as_str(), raw.codes.as_slice()),
            other => (other.type_name(), entity.extra.as_slice()),
        };
        // 标注与引线的组码 3 是标注样式名
        let dimensioned =
            kind.eq_ignore_ascii_case("DIMENSION") || kind.eq_ignore_ascii_case("LEADER");
        for (code, value) in codes {
            match code {
                7 => {
                    symbols.text_styles.copy_missing(&src.symbols.text_styles, value.trim());
                }
                3 if dimensioned => {
                    symbols.dim_styles.copy_missing(&src.symbols.dim_styles, value.trim());
                }
                _ => {}
            }
        }
    }

    fn import_block_named(
        &mut self,
        src: &Document,
        src_id: BlockId,
        name: String,
        remap: &mut BlockRemap,
    ) -> Result<BlockId, DocumentError> {
        let source = src.block(src_id)?;
        // 先登记映射再复制实体，自引用的块不会无限递归
        let id = self.push_block(Block::new(name, source.base_point));
        remap.insert(src_id, id);

        let mut entities = Vec::with_capacity(source.entities.len());
        for entity in &source.entities {
            entities.push(self.import_entity(src, entity, remap)?);
        }
        self.block_mut(id)?.entities = entities;

        debug!(
            "Imported block '{}' as '{}' ({} entities)",
            source.name,
            self.block(id)?.name,
            source.entities.len()
        );
        Ok(id)
    }

    /// 标注实体通过组码 2 按名称引用匿名块
    fn import_dimension(
        &mut self,
        src: &Document,
        raw: &RawEntity,
        remap: &mut BlockRemap,
    ) -> Result<RawEntity, DocumentError> {
        let mut copy = raw.clone();
        for (code, value) in copy.codes.iter_mut() {
            if *code != 2 {
                continue;
            }
            if let Some(src_id) = src.find_block(value.trim()) {
                let target = self.import_block(src, src_id, remap)?;
                *value = self.block(target)?.name.clone();
            }
        }
        Ok(copy)
    }

    // ========== 校验与展开 ==========

    /// 结构校验：模型布局的块存在，且没有悬空的块参照
    pub fn validate(&self) -> Result<(), DocumentError> {
        if self.layouts.iter().filter(|l| l.is_model).count() > 1 {
            return Err(DocumentError::MultipleModelLayouts);
        }
        if let Some(model) = self.model_layout() {
            if model.block.0 >= self.blocks.len() {
                return Err(DocumentError::MissingModelBlock);
            }
        }
        for layout in &self.layouts {
            self.block(layout.block)?;
        }
        for block in &self.blocks {
            for entity in &block.entities {
                if let Some(insert) = entity.as_insert() {
                    if insert.block.0 >= self.blocks.len() {
                        return Err(DocumentError::DanglingInsert {
                            owner: block.name.clone(),
                            block: insert.block.0,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// 将块递归展开为世界坐标下的实体
    ///
    /// 视口与原样实体无法变换，不包含在结果中。
    pub fn world_geometry(&self, block: BlockId) -> Result<Vec<Entity>, DocumentError> {
        let mut out = Vec::new();
        self.flatten_into(block, &Transform2D::identity(), 0, &mut out)?;
        Ok(out)
    }

    /// 模型空间内容的世界坐标范围；没有可计算范围的实体时返回 `None`
    pub fn model_extents(&self) -> Result<Option<BoundingBox2>, DocumentError> {
        let Some(model) = self.model_block() else {
            return Ok(None);
        };
        let extents = self
            .world_geometry(model)?
            .iter()
            .fold(BoundingBox2::empty(), |acc, e| acc.union(&e.geometry.bounding_box()));
        Ok((!extents.is_empty()).then_some(extents))
    }

    fn flatten_into(
        &self,
        block: BlockId,
        transform: &Transform2D,
        depth: usize,
        out: &mut Vec<Entity>,
    ) -> Result<(), DocumentError> {
        let source = self.block(block)?;
        if depth > MAX_NESTING {
            return Err(DocumentError::NestingTooDeep(source.name.clone()));
        }
        for entity in &source.entities {
            match &entity.geometry {
                Geometry::Insert(insert) => {
                    let target = self.block(insert.block)?;
                    let placement = Transform2D::placement(
                        insert.position,
                        insert.scale,
                        insert.rotation,
                        target.base_point,
                    );
                    self.flatten_into(insert.block, &placement.then(transform), depth + 1, out)?;
                }
                geometry => {
                    if let Some(world) = geometry.transformed(transform) {
                        out.push(entity.with_geometry(world));
                    }
                }
            }
        }
        Ok(())
    }

    /// 所有被块参照引用的块
    pub fn referenced_blocks(&self) -> HashSet<BlockId> {
        self.blocks
            .iter()
            .flat_map(|b| b.entities.iter())
            .filter_map(|e| e.as_insert().map(|i| i.block))
            .collect()
    }

    /// 删除指定块并压缩块表，重写所有引用
    ///
    /// 调用方须保证被删块不再被引用；残留引用保持原样，由 [`Document::validate`] 报告。
    fn remove_blocks(&mut self, doomed: &HashSet<BlockId>) {
        if doomed.is_empty() {
            return;
        }
        let old = std::mem::take(&mut self.blocks);
        let mut mapping: Vec<Option<BlockId>> = vec![None; old.len()];
        for (index, block) in old.into_iter().enumerate() {
            if doomed.contains(&BlockId(index)) {
                continue;
            }
            mapping[index] = Some(BlockId(self.blocks.len()));
            self.blocks.push(block);
        }
        let remap = |id: BlockId| mapping.get(id.0).copied().flatten().unwrap_or(BlockId(usize::MAX));
        for block in &mut self.blocks {
            for entity in &mut block.entities {
                if let Some(insert) = entity.as_insert_mut() {
                    insert.block = remap(insert.block);
                }
            }
        }
        for layout in &mut self.layouts {
            layout.block = remap(layout.block);
        }
        self.names = self
            .blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (name_key(&b.name), BlockId(i)))
            .collect();
    }
}

/// 块名索引键（大小写不敏感）
fn name_key(name: &str) -> String {
    name.trim().to_uppercase()
}

/// 布局块复制为普通块时去掉 `*` 前缀
fn importable_name(name: &str) -> String {
    let upper = name.to_uppercase();
    if upper.starts_with("*MODEL_SPACE") || upper.starts_with("*PAPER_SPACE") {
        name.trim_start_matches('*').to_string()
    } else {
        name.to_string()
    }
}

/// 8 位十六进制随机标记
fn short_token() -> String {
    let mut token = uuid::Uuid::new_v4().simple().to_string();
    token.truncate(8);
    token
}
