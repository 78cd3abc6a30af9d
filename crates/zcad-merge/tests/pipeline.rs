//! 整理流程端到端测试：导出 -> 分组 -> 提升 -> 合并 -> 清理

use std::fs;
use std::path::{Path, PathBuf};

use zcad_core::prelude::*;
use zcad_merge::{
    ConsolidateOptions, Consolidator, DeliverableKind, ExportError, SheetExporter, SheetInfo,
    Spacing, Stage,
};

/// 模拟宿主导出：每张图纸一个 DXF，模型空间一条线，图纸布局一个视口和一个图框
struct FakeHost {
    exported: Vec<String>,
}

fn exported_sheet(id: &str) -> Document {
    let mut doc = Document::new();
    doc.layers.add(Layer::new("FRAME"));
    let model = doc.model_block().unwrap();
    doc.add_entity(
        model,
        Entity::new(Geometry::Line(Line::new(
            Point2::new(1000.0, 1000.0),
            Point2::new(2000.0, 1000.0),
        ))),
    )
    .unwrap();

    let paper = doc.add_block(Block::new(PAPER_SPACE, Point2::origin())).unwrap();
    doc.add_layout(Layout::paper("A3", paper, 1)).unwrap();
    doc.add_entity(
        paper,
        Entity::new(Geometry::Viewport(Viewport::new(
            Point2::new(210.0, 148.5),
            400.0,
            280.0,
            Point2::new(1500.0, 1000.0),
            2800.0,
        ))),
    )
    .unwrap();
    doc.add_entity(
        paper,
        Entity::new(Geometry::Text(Text::new(Point2::new(380.0, 10.0), id, 3.5)))
            .on_layer("FRAME"),
    )
    .unwrap();
    doc
}

impl SheetExporter<SheetInfo> for FakeHost {
    fn export(&mut self, sheets: &[&SheetInfo], dest: &Path) -> Result<(), ExportError> {
        for sheet in sheets {
            let path = dest.join(format!("PRJ - {} - Sheet.dxf", sheet.identifier));
            zcad_file::save(&exported_sheet(&sheet.identifier), &path)?;
            self.exported.push(sheet.identifier.clone());
        }
        Ok(())
    }
}

fn template(dir: &Path) -> PathBuf {
    let mut doc = Document::new();
    doc.layers.add(Layer::new("BORDER").locked());
    let paper = doc.add_block(Block::new(PAPER_SPACE, Point2::origin())).unwrap();
    doc.add_layout(Layout::paper("Print", paper, 1)).unwrap();
    doc.add_entity(
        paper,
        Entity::new(Geometry::Polyline(Polyline::from_points(
            [
                Point2::new(0.0, 0.0),
                Point2::new(420.0, 0.0),
                Point2::new(420.0, 297.0),
                Point2::new(0.0, 297.0),
            ],
            true,
        )))
        .on_layer("BORDER"),
    )
    .unwrap();
    doc.add_entity(
        paper,
        Entity::new(Geometry::Viewport(Viewport::new(
            Point2::new(210.0, 148.5),
            400.0,
            280.0,
            Point2::origin(),
            280.0,
        ))),
    )
    .unwrap();
    let path = dir.join("template.dxf");
    zcad_file::save(&doc, &path).unwrap();
    path
}

fn sheets() -> Vec<SheetInfo> {
    vec![
        SheetInfo::new("A-1").with_outline(420.0, 297.0),
        SheetInfo::new("B-7-01_Foo--1").with_outline(420.0, 297.0),
        SheetInfo::new("C-7-01_Bar--2").with_outline(594.0, 420.0),
        SheetInfo::new("D-2").with_outline(420.0, 297.0),
    ]
}

#[test]
fn consolidates_singles_and_groups() {
    let dir = tempfile::tempdir().unwrap();
    let output_dir = dir.path().join("out");
    let work_root = dir.path().join("work");
    fs::create_dir_all(&work_root).unwrap();

    let mut options = ConsolidateOptions::new(&output_dir);
    options.spacing = Spacing::Auto;
    options.temp_root = Some(work_root.clone());
    let mut consolidator = Consolidator::new(options);
    let mut host = FakeHost { exported: Vec::new() };

    let report = consolidator.run(&sheets(), &mut host).unwrap();
    assert_eq!(consolidator.stage(), Stage::Done);
    assert_eq!(host.exported.len(), 4);
    assert!(report.all_succeeded(), "{:#?}", report.deliverables);
    assert_eq!(report.deliverables.len(), 3);

    // 单张图纸沿用导出文件名，并已提升为纯模型空间
    let single = output_dir.join("PRJ - A-1 - Sheet.dxf");
    let doc = zcad_file::load(&single).unwrap();
    assert!(doc.paper_layouts().is_empty());
    let world = doc.world_geometry(doc.model_block().unwrap()).unwrap();
    let line = world
        .iter()
        .find_map(|e| match &e.geometry {
            Geometry::Line(l) => Some(l.clone()),
            _ => None,
        })
        .unwrap();
    // 视口缩放 0.1：(1000, 1000) -> (210 - 50, 148.5)
    assert!((line.start - Point2::new(160.0, 148.5)).norm() < 1e-6);
    assert!(output_dir.join("PRJ - D-2 - Sheet.dxf").exists());

    // 分组文件按代表图号命名，间距按最大图框宽度自动计算
    let group = report
        .deliverables
        .iter()
        .find(|d| matches!(d.kind, DeliverableKind::Group { .. }))
        .unwrap();
    assert_eq!(group.name, "B-7-01_Foo");
    let merged_path = output_dir.join("B-7-01_Foo.dxf");
    assert_eq!(group.output.as_deref(), Some(merged_path.as_path()));

    let merged = zcad_file::load(&merged_path).unwrap();
    let model = merged.block(merged.model_block().unwrap()).unwrap();
    let xs: Vec<f64> = model
        .entities
        .iter()
        .filter_map(|e| e.as_insert().map(|i| i.position.x))
        .collect();
    assert_eq!(xs.len(), 2);
    assert!((xs[1] - xs[0] - 594.0 * 1.1).abs() < 1e-6);

    // 临时目录已删除，导出结果不残留
    assert_eq!(fs::read_dir(&work_root).unwrap().count(), 0);
}

#[test]
fn merges_groups_into_template() {
    let dir = tempfile::tempdir().unwrap();
    let template = template(dir.path());
    let output_dir = dir.path().join("out");

    let mut options = ConsolidateOptions::new(&output_dir);
    options.template = Some(template.clone());
    options.insert_offset = (100.0, 50.0);
    options.temp_root = Some(dir.path().to_path_buf());
    let mut consolidator = Consolidator::new(options);
    let mut host = FakeHost { exported: Vec::new() };

    let report = consolidator.run(&sheets(), &mut host).unwrap();
    assert!(report.all_succeeded(), "{:#?}", report.deliverables);

    let merged = zcad_file::load(&output_dir.join("B-7-01_Foo.dxf")).unwrap();
    let paper = merged.first_paper_layout().unwrap();
    assert_eq!(paper.name, "Print");
    let paper_entities = &merged.block(paper.block).unwrap().entities;
    // 未锁定图层上的视口被清除，锁定图层上的图框保留
    assert_eq!(paper_entities.len(), 1);
    assert_eq!(paper_entities[0].layer, "BORDER");

    let model = merged.block(merged.model_block().unwrap()).unwrap();
    let positions: Vec<(f64, f64)> = model
        .entities
        .iter()
        .filter_map(|e| e.as_insert().map(|i| (i.position.x, i.position.y)))
        .collect();
    assert_eq!(positions, vec![(100.0, 50.0), (1100.0, 50.0)]);
}
