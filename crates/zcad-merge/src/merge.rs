//! 多图合并
//!
//! 两种方式：
//! - [`merge_flat`]：各源文件的内容块依次沿 X 轴排开，写入新文档
//! - [`merge_into_template`]：先在内存中排开（中间文档，不落盘），
//!   再整体复制进模板的模型空间，并清理模板图纸布局中未锁定图层上的实体
//!
//! 单个源文件缺失、无法读取或没有内容块时跳过并记录，不影响其他源文件。

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use zcad_core::document::{BlockId, BlockRemap, Document, DocumentError};
use zcad_core::entity::Entity;
use zcad_core::geometry::{Geometry, Insert};
use zcad_core::layer::LayerTable;
use zcad_core::math::{Point2, Vector2};

use crate::error::MergeError;
use crate::file_name::block_name_from_path;

/// 已放置的源文件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedSource {
    pub source: PathBuf,
    /// 目标文档中的块名
    pub block: String,
    pub position: (f64, f64),
}

/// 被跳过的源文件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSource {
    pub source: PathBuf,
    pub reason: String,
}

/// 合并报告
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    pub placed: Vec<PlacedSource>,
    pub skipped: Vec<SkippedSource>,
    pub warnings: Vec<String>,
    /// 从模板图纸布局中清除的实体数
    pub removed_paper_entities: usize,
}

impl MergeReport {
    fn skip(&mut self, source: &Path, reason: String) {
        warn!("Skipping {}: {}", source.display(), reason);
        self.skipped.push(SkippedSource {
            source: source.to_path_buf(),
            reason,
        });
    }
}

/// 合并到新文档
pub fn merge_flat<P: AsRef<Path>>(
    sources: &[P],
    output: &Path,
    spacing: f64,
) -> Result<MergeReport, MergeError> {
    let mut report = MergeReport::default();
    let target = flatten_sources(sources, spacing, &mut report);
    if report.placed.is_empty() {
        return Err(MergeError::NothingToMerge(output.to_path_buf()));
    }

    zcad_file::save(&target, output)?;
    info!(
        "Merged {} of {} sources into {}",
        report.placed.len(),
        sources.len(),
        output.display()
    );
    Ok(report)
}

/// 合并并套入模板
///
/// 模板文件只读取，不修改；输出路径不能与模板相同。
pub fn merge_into_template<P: AsRef<Path>>(
    sources: &[P],
    template: &Path,
    output: &Path,
    spacing: f64,
    offset_x: f64,
    offset_y: f64,
) -> Result<MergeReport, MergeError> {
    if !template.is_file() {
        return Err(MergeError::TemplateMissing(template.to_path_buf()));
    }
    if same_file(template, output) {
        return Err(MergeError::TemplateOverwrite(output.to_path_buf()));
    }

    let mut report = MergeReport::default();
    let mut intermediate = flatten_sources(sources, spacing, &mut report);
    if report.placed.is_empty() {
        return Err(MergeError::NothingToMerge(output.to_path_buf()));
    }
    intermediate.strip_paper_layouts();

    let mut target = zcad_file::load(template)?;
    // 合并前的图层锁定状态
    let template_layers = target.layers.clone();

    inject(&mut target, &intermediate, Vector2::new(offset_x, offset_y))?;
    report.removed_paper_entities =
        purge_paper_layouts(&mut target, &template_layers, &mut report.warnings)?;

    target.validate()?;
    zcad_file::save(&target, output)?;
    info!(
        "Merged {} of {} sources into template {} -> {} ({} paper entities removed)",
        report.placed.len(),
        sources.len(),
        template.display(),
        output.display(),
        report.removed_paper_entities
    );
    Ok(report)
}

/// 把各源文件的内容块依次放入新文档的模型空间
fn flatten_sources<P: AsRef<Path>>(
    sources: &[P],
    spacing: f64,
    report: &mut MergeReport,
) -> Document {
    let mut target = Document::new();
    for source in sources {
        let path = source.as_ref();
        let document = match zcad_file::load(path) {
            Ok(document) => document,
            Err(err) => {
                report.skip(path, err.to_string());
                continue;
            }
        };
        let Some(content) = document.content_block() else {
            report.skip(path, "no content block".to_string());
            continue;
        };

        // 只按实际放置的源文件计数
        let x = report.placed.len() as f64 * spacing;
        match place(&mut target, &document, content, path, x) {
            Ok(placed) => {
                debug!("Placed {} as '{}' at x={}", path.display(), placed.block, x);
                report.placed.push(placed);
            }
            Err(err) => report.skip(path, err.to_string()),
        }
    }
    target
}

fn place(
    target: &mut Document,
    source: &Document,
    content: BlockId,
    path: &Path,
    x: f64,
) -> Result<PlacedSource, DocumentError> {
    let mut remap = BlockRemap::new();
    let block = target.import_block_as(source, content, &block_name_from_path(path), &mut remap)?;
    let model = target.ensure_model_layout();
    let position = Point2::new(x, 0.0);
    target.add_entity(model, Entity::new(Geometry::Insert(Insert::new(block, position))))?;
    Ok(PlacedSource {
        source: path.to_path_buf(),
        block: target.block(block)?.name.clone(),
        position: (position.x, position.y),
    })
}

/// 把中间文档的全部块复制进模板，并在模板模型空间重建块参照
fn inject(
    target: &mut Document,
    intermediate: &Document,
    offset: Vector2,
) -> Result<(), DocumentError> {
    let source_model = intermediate
        .model_block()
        .ok_or(DocumentError::MissingModelBlock)?;
    let mut remap = BlockRemap::new();

    for (id, _) in intermediate.blocks() {
        if id != source_model {
            target.import_block(intermediate, id, &mut remap)?;
        }
    }

    let model = target.ensure_model_layout();
    for entity in &intermediate.block(source_model)?.entities {
        let Some(insert) = entity.as_insert() else {
            continue;
        };
        let mut moved = insert.offset(offset.x, offset.y);
        moved.block = target.import_block(intermediate, insert.block, &mut remap)?;
        target.add_entity(model, entity.with_geometry(Geometry::Insert(moved)))?;
    }
    debug!("Injected {} blocks into template", remap.len());
    Ok(())
}

/// 模板图纸布局只保留锁定图层上的实体，返回删除数
///
/// 不在图层表中的图层按未锁定处理并记录警告。
fn purge_paper_layouts(
    target: &mut Document,
    layers: &LayerTable,
    warnings: &mut Vec<String>,
) -> Result<usize, DocumentError> {
    let paper_blocks: BTreeSet<BlockId> = target.paper_layouts().iter().map(|l| l.block).collect();
    let mut unknown: BTreeSet<String> = BTreeSet::new();
    let mut removed = 0;

    for id in paper_blocks {
        let block = target.block_mut(id)?;
        let before = block.entities.len();
        block.entities.retain(|entity| match layers.is_locked(&entity.layer) {
            Some(locked) => locked,
            None => {
                unknown.insert(entity.layer.clone());
                false
            }
        });
        let count = before - block.entities.len();
        debug!("Removed {} entities from '{}'", count, block.name);
        removed += count;
    }

    for layer in unknown {
        let message =
            format!("Layer '{layer}' is missing from the template layer table, treated as unlocked");
        warn!("{}", message);
        warnings.push(message);
    }
    Ok(removed)
}

/// 两个路径是否指向同一文件（输出文件可能尚不存在）
fn same_file(a: &Path, b: &Path) -> bool {
    resolve(a) == resolve(b)
}

fn resolve(path: &Path) -> PathBuf {
    if let Ok(resolved) = fs::canonicalize(path) {
        return resolved;
    }
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (fs::canonicalize(parent), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zcad_core::prelude::*;

    /// 已提升的图纸：组合块（名为 `COMMON`）内一条线
    fn promoted(dir: &Path, file: &str, length: f64) -> PathBuf {
        let mut doc = Document::new();
        let block = doc.add_block(Block::new("COMMON", Point2::origin())).unwrap();
        doc.add_entity(
            block,
            Entity::new(Geometry::Line(Line::new(Point2::origin(), Point2::new(length, 0.0))))
                .on_layer("GEOM"),
        )
        .unwrap();
        doc.layers.add(Layer::new("GEOM"));
        let model = doc.model_block().unwrap();
        doc.add_entity(model, Entity::new(Geometry::Insert(Insert::new(block, Point2::origin()))))
            .unwrap();
        let path = dir.join(file);
        zcad_file::save(&doc, &path).unwrap();
        path
    }

    /// 模板：自带一个 `COMMON` 块，图纸布局上锁定/未锁定图层各一个实体，外加一个视口
    fn template(dir: &Path) -> PathBuf {
        let mut doc = Document::new();
        doc.layers.add(Layer::new("FRAME").locked());
        doc.layers.add(Layer::new("NOTES"));
        let common = doc.add_block(Block::new("COMMON", Point2::origin())).unwrap();
        doc.add_entity(common, Entity::new(Geometry::Point(Point::new(0.0, 0.0))))
            .unwrap();

        let paper = doc.add_block(Block::new(PAPER_SPACE, Point2::origin())).unwrap();
        doc.add_layout(Layout::paper("A1", paper, 1)).unwrap();
        doc.add_entity(
            paper,
            Entity::new(Geometry::Line(Line::new(Point2::origin(), Point2::new(841.0, 0.0))))
                .on_layer("FRAME"),
        )
        .unwrap();
        doc.add_entity(
            paper,
            Entity::new(Geometry::Text(Text::new(Point2::new(5.0, 5.0), "draft", 3.0)))
                .on_layer("NOTES"),
        )
        .unwrap();
        doc.add_entity(
            paper,
            Entity::new(Geometry::Viewport(Viewport::new(
                Point2::new(400.0, 300.0),
                800.0,
                500.0,
                Point2::origin(),
                5000.0,
            ))),
        )
        .unwrap();
        let path = dir.join("template.dxf");
        zcad_file::save(&doc, &path).unwrap();
        path
    }

    fn model_inserts(doc: &Document) -> Vec<Insert> {
        doc.block(doc.model_block().unwrap())
            .unwrap()
            .entities
            .iter()
            .filter_map(|e| e.as_insert().cloned())
            .collect()
    }

    #[test]
    fn test_merge_flat_spacing() {
        let dir = tempfile::tempdir().unwrap();
        let sources = vec![
            promoted(dir.path(), "a.dxf", 10.0),
            promoted(dir.path(), "b.dxf", 20.0),
            promoted(dir.path(), "c.dxf", 30.0),
        ];
        let output = dir.path().join("out.dxf");
        let report = merge_flat(&sources, &output, 1000.0).unwrap();
        assert_eq!(report.placed.len(), 3);

        let merged = zcad_file::load(&output).unwrap();
        let inserts = model_inserts(&merged);
        let xs: Vec<f64> = inserts.iter().map(|i| i.position.x).collect();
        assert_eq!(xs, vec![0.0, 1000.0, 2000.0]);
        assert!(inserts.iter().all(|i| i.position.y == 0.0));

        let names: BTreeSet<String> = inserts
            .iter()
            .map(|i| merged.block(i.block).unwrap().name.clone())
            .collect();
        assert_eq!(names.len(), 3);
        assert!(names.contains("a"));
    }

    #[test]
    fn test_merge_flat_skips_missing_sources() {
        let dir = tempfile::tempdir().unwrap();
        let sources = vec![
            dir.path().join("missing.dxf"),
            promoted(dir.path(), "b.dxf", 20.0),
            promoted(dir.path(), "c.dxf", 30.0),
        ];
        let output = dir.path().join("out.dxf");
        let report = merge_flat(&sources, &output, 500.0).unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].source, sources[0]);

        let xs: Vec<f64> = model_inserts(&zcad_file::load(&output).unwrap())
            .iter()
            .map(|i| i.position.x)
            .collect();
        assert_eq!(xs, vec![0.0, 500.0]);
    }

    #[test]
    fn test_merge_flat_skips_empty_documents() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.dxf");
        zcad_file::save(&Document::new(), &empty).unwrap();
        let output = dir.path().join("out.dxf");

        let result = merge_flat(&[empty], &output, 100.0);
        assert!(matches!(result, Err(MergeError::NothingToMerge(_))));
        assert!(!output.exists());
    }

    #[test]
    fn test_merge_into_template() {
        let dir = tempfile::tempdir().unwrap();
        // 第一个源文件的块名与模板中的 COMMON 冲突
        let sources = vec![
            promoted(dir.path(), "common.dxf", 10.0),
            promoted(dir.path(), "b.dxf", 20.0),
        ];
        let template = template(dir.path());
        let template_before = fs::read_to_string(&template).unwrap();
        let output = dir.path().join("merged.dxf");

        let report =
            merge_into_template(&sources, &template, &output, 1000.0, 50.0, -25.0).unwrap();
        assert_eq!(report.placed.len(), 2);
        assert_eq!(report.removed_paper_entities, 2);
        assert!(report.warnings.is_empty());

        // 模板未被修改
        assert_eq!(fs::read_to_string(&template).unwrap(), template_before);

        let merged = zcad_file::load(&output).unwrap();
        let inserts = model_inserts(&merged);
        let positions: Vec<(f64, f64)> =
            inserts.iter().map(|i| (i.position.x, i.position.y)).collect();
        assert_eq!(positions, vec![(50.0, -25.0), (1050.0, -25.0)]);

        // 块名互不重复，模板自带的 COMMON 块保留原样
        let mut seen = BTreeSet::new();
        for (_, block) in merged.blocks() {
            assert!(seen.insert(block.name.to_uppercase()), "duplicate {}", block.name);
        }
        let common = merged.find_block("COMMON").unwrap();
        assert!(matches!(
            merged.block(common).unwrap().entities[0].geometry,
            Geometry::Point(_)
        ));
        // 源文件的块被重命名后仍然可达
        let renamed = merged.block(inserts[0].block).unwrap();
        assert!(renamed.name.to_uppercase().starts_with("COMMON_"));
        let world = merged.world_geometry(merged.model_block().unwrap()).unwrap();
        let lines = world
            .iter()
            .filter(|e| matches!(e.geometry, Geometry::Line(_)))
            .count();
        assert_eq!(lines, 2);

        // 图纸布局只剩锁定图层上的实体
        let paper = merged.first_paper_layout().unwrap();
        let remaining = &merged.block(paper.block).unwrap().entities;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].layer, "FRAME");
        assert!(merged.layers.contains("GEOM"));
    }

    #[test]
    fn test_unknown_layer_counts_as_unlocked() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = Document::new();
        let paper = doc.add_block(Block::new(PAPER_SPACE, Point2::origin())).unwrap();
        doc.add_layout(Layout::paper("A1", paper, 1)).unwrap();
        doc.add_entity(
            paper,
            Entity::new(Geometry::Point(Point::new(1.0, 1.0))).on_layer("GHOST"),
        )
        .unwrap();
        let template = dir.path().join("t.dxf");
        zcad_file::save(&doc, &template).unwrap();

        let sources = vec![promoted(dir.path(), "a.dxf", 10.0)];
        let output = dir.path().join("o.dxf");
        let report = merge_into_template(&sources, &template, &output, 100.0, 0.0, 0.0).unwrap();
        assert_eq!(report.removed_paper_entities, 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("GHOST"));
    }

    #[test]
    fn test_template_preconditions() {
        let dir = tempfile::tempdir().unwrap();
        let sources = vec![promoted(dir.path(), "a.dxf", 10.0)];
        let output = dir.path().join("o.dxf");

        let missing = dir.path().join("nope.dxf");
        let result = merge_into_template(&sources, &missing, &output, 100.0, 0.0, 0.0);
        assert!(matches!(result, Err(MergeError::TemplateMissing(_))));
        assert!(!output.exists());

        let template = template(dir.path());
        let result = merge_into_template(&sources, &template, &template, 100.0, 0.0, 0.0);
        assert!(matches!(result, Err(MergeError::TemplateOverwrite(_))));
    }
}
