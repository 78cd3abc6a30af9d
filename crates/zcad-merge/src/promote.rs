//! 图纸空间提升
//!
//! 把导出文件中第一个图纸布局的内容按视口对齐，整理成纯模型空间的新文档：
//!
//! ```text
//! *Model_Space
//!   └─ INSERT {name} @ (0, 0)
//!        ├─ 图纸布局中的非视口实体（原坐标，content_only 时省略）
//!        └─ INSERT {name}_MODEL @ (dx, dy) 缩放 s
//!             └─ 原模型空间实体
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zcad_core::document::{BlockId, BlockRemap, Document, DocumentError};
use zcad_core::entity::Entity;
use zcad_core::geometry::{Geometry, Insert};
use zcad_core::math::Point2;

use crate::error::MergeError;
use crate::file_name::block_name_from_path;

/// 提升结果
#[derive(Debug, Clone)]
pub enum Promotion {
    /// 按视口对齐后的新文档
    Promoted(Document),
    /// 没有视口，只保留图纸布局内容的新文档
    PaperOnly(Document),
    /// 没有图纸布局，原文件不变
    NoPaperLayout,
    /// 没有视口且只要内容，原文件不变
    NoViewport,
}

impl Promotion {
    pub fn document(&self) -> Option<&Document> {
        match self {
            Promotion::Promoted(doc) | Promotion::PaperOnly(doc) => Some(doc),
            Promotion::NoPaperLayout | Promotion::NoViewport => None,
        }
    }

    pub fn outcome(&self) -> PromotionOutcome {
        match self {
            Promotion::Promoted(_) => PromotionOutcome::Promoted,
            Promotion::PaperOnly(_) => PromotionOutcome::PaperOnly,
            Promotion::NoPaperLayout => PromotionOutcome::NoPaperLayout,
            Promotion::NoViewport => PromotionOutcome::NoViewport,
        }
    }
}

/// 提升结果（不含文档），用于报告
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionOutcome {
    Promoted,
    PaperOnly,
    NoPaperLayout,
    NoViewport,
}

impl PromotionOutcome {
    /// 文件是否被重写
    pub fn rewritten(self) -> bool {
        matches!(self, PromotionOutcome::Promoted | PromotionOutcome::PaperOnly)
    }
}

/// 提升文档
///
/// `name` 为组合块的名称，`content_only` 为真时不保留图纸布局中的实体（如图框）。
pub fn promote_document(
    source: &Document,
    name: &str,
    content_only: bool,
) -> Result<Promotion, MergeError> {
    let Some(paper) = source.first_paper_layout() else {
        debug!("No paper layout, nothing to promote");
        return Ok(Promotion::NoPaperLayout);
    };
    let paper_block = source.block(paper.block)?;

    let viewport = paper_block
        .entities
        .iter()
        .filter_map(Entity::as_viewport)
        .find(|vp| !vp.is_overall());
    let paper_entities: Vec<&Entity> = paper_block
        .entities
        .iter()
        .filter(|e| !e.is_viewport())
        .collect();

    let Some(viewport) = viewport else {
        if content_only {
            warn!("Layout '{}' has no viewport, file left unchanged", paper.name);
            return Ok(Promotion::NoViewport);
        }
        warn!(
            "Layout '{}' has no viewport, keeping {} paper entities only",
            paper.name,
            paper_entities.len()
        );
        let mut target = new_target(source);
        let mut remap = BlockRemap::new();
        let combined = target.add_block_unique(name, Point2::origin());
        copy_entities(&mut target, source, &paper_entities, combined, &mut remap)?;
        insert_at_origin(&mut target, combined)?;
        target.validate()?;
        return Ok(Promotion::PaperOnly(target));
    };

    let alignment = viewport
        .alignment()
        .ok_or_else(|| MergeError::DegenerateViewport(paper.name.clone()))?;
    let model_source = source.model_block().ok_or(DocumentError::MissingModelBlock)?;

    let mut target = new_target(source);
    let mut remap = BlockRemap::new();

    // 组合块最先创建，合并时作为内容块被选中
    let combined = target.add_block_unique(name, Point2::origin());
    if !content_only {
        copy_entities(&mut target, source, &paper_entities, combined, &mut remap)?;
    }

    let model_copy =
        target.import_block_as(source, model_source, &format!("{name}_MODEL"), &mut remap)?;
    let placement = Insert::new(
        model_copy,
        Point2::new(alignment.translation.x, alignment.translation.y),
    )
    .with_uniform_scale(alignment.scale);
    target.add_entity(combined, Entity::new(Geometry::Insert(placement)))?;

    insert_at_origin(&mut target, combined)?;
    target.validate()?;

    info!(
        "Promoted layout '{}' (scale {:.6}, offset {:.3}, {:.3})",
        paper.name, alignment.scale, alignment.translation.x, alignment.translation.y
    );
    Ok(Promotion::Promoted(target))
}

/// 提升文件并在产生新文档时覆盖写回
pub fn promote_file(path: &Path, content_only: bool) -> Result<PromotionOutcome, MergeError> {
    let source = zcad_file::load(path)?;
    let name = block_name_from_path(path);
    let promotion = promote_document(&source, &name, content_only)?;
    if let Some(document) = promotion.document() {
        zcad_file::save(document, path)?;
        info!("Rewrote {} as model space only", path.display());
    }
    Ok(promotion.outcome())
}

/// 只含模型布局的新文档，沿用源文档图层表与样式表
fn new_target(source: &Document) -> Document {
    let mut target = Document::new();
    target.layers = source.layers.clone();
    target.symbols = source.symbols.clone();
    target
}

fn copy_entities(
    target: &mut Document,
    source: &Document,
    entities: &[&Entity],
    into: BlockId,
    remap: &mut BlockRemap,
) -> Result<(), DocumentError> {
    for entity in entities {
        let copy = target.import_entity(source, entity, remap)?;
        target.add_entity(into, copy)?;
    }
    Ok(())
}

fn insert_at_origin(target: &mut Document, combined: BlockId) -> Result<(), DocumentError> {
    let model = target.ensure_model_layout();
    target.add_entity(
        model,
        Entity::new(Geometry::Insert(Insert::new(combined, Point2::origin()))),
    )
}
