//! DXF文件导入/导出
//!
//! 在原始组码之上构建 [`Document`]：
//! - TABLES：图层（含锁定标志）、块记录，以及线型、文字样式、标注样式表项
//! - BLOCKS：全部块定义
//! - ENTITIES：模型空间与当前图纸空间（组码 67 = 1）的实体
//! - OBJECTS：LAYOUT 对象（布局名、标签顺序、关联块记录、图纸尺寸）
//!
//! 未建模的实体类型与组码原样保留；句柄在写出时重新分配，
//! 因此读入时丢弃所有句柄/指针组码。

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};
use zcad_core::document::{Block, BlockId, Document, Layout, MODEL_LAYOUT, MODEL_SPACE, PAPER_SPACE};
use zcad_core::entity::Entity;
use zcad_core::geometry::{
    Arc, Circle, Geometry, Insert, Line, Point, Polyline, PolylineVertex, RawEntity, Text, Viewport,
};
use zcad_core::layer::Layer;
use zcad_core::math::{Point2, Vector2};
use zcad_core::symbols::{SymbolTable, TableRecord};

use crate::dxf_raw::{records, DxfPair, DxfRawParser, DxfRecord, DxfWriter};
use crate::codepage::WRITE_CODEPAGE;
use crate::error::FileError;

/// 写出的 DXF 版本（AutoCAD 2000）
const ACAD_VERSION: &str = "AC1015";

/// 文字样式与标注样式表中必须存在的表项
const STANDARD: &str = "Standard";

/// 从DXF文件加载
pub fn load(path: &Path) -> Result<Document, FileError> {
    if !path.is_file() {
        return Err(FileError::NotFound(path.to_path_buf()));
    }
    let parser = DxfRawParser::load(path)?;
    let document = read_document(&parser)?;

    info!(
        "Loaded {} blocks, {} layouts, {} layers from {}",
        document.block_count(),
        document.layouts().len(),
        document.layers.len(),
        path.display()
    );
    Ok(document)
}

/// 保存为DXF文件
pub fn save(document: &Document, path: &Path) -> Result<(), FileError> {
    let content = write_document(document)?;
    fs::write(path, content)?;

    info!(
        "Saved {} blocks, {} layouts to {}",
        document.block_count(),
        document.layouts().len(),
        path.display()
    );
    Ok(())
}

// ========== 读取 ==========

/// 从已解析的组码构建文档
pub fn read_document(parser: &DxfRawParser) -> Result<Document, FileError> {
    let mut document = Document::empty();
    // 块记录句柄 -> 块名
    let mut record_names: HashMap<String, String> = HashMap::new();

    if let Some(tables) = parser.section("TABLES") {
        read_tables(tables, &mut document, &mut record_names);
    }

    // 第一遍：声明所有块，使块参照可以引用后定义的块
    let block_records = parser.section("BLOCKS").map(records).unwrap_or_default();
    let mut declared: Vec<Option<BlockId>> = Vec::new();
    for record in block_records.iter().filter(|r| r.kind.eq_ignore_ascii_case("BLOCK")) {
        let name = record
            .text(2)
            .or_else(|| record.text(3))
            .filter(|n| !n.is_empty())
            .ok_or_else(|| FileError::InvalidFormat("BLOCK without a name".to_string()))?;

        if document.has_block(name) {
            warn!("Duplicate block definition '{}' ignored", name);
            declared.push(None);
            continue;
        }
        let id = document.add_block(Block::new(name, record.point(10)))?;
        if let Some(owner) = record.text(330) {
            record_names
                .entry(owner.to_uppercase())
                .or_insert_with(|| name.to_string());
        }
        declared.push(Some(id));
    }
    if !document.has_block(MODEL_SPACE) {
        document.add_block(Block::new(MODEL_SPACE, Point2::origin()))?;
    }

    // 第二遍：填充块内实体
    let mut current: Option<BlockId> = None;
    let mut occurrence = 0;
    for record in &block_records {
        if record.kind.eq_ignore_ascii_case("BLOCK") {
            current = declared.get(occurrence).copied().flatten();
            occurrence += 1;
        } else if record.kind.eq_ignore_ascii_case("ENDBLK") {
            current = None;
        } else if let Some(id) = current {
            let entity = parse_entity(record, &document)?;
            document.block_mut(id)?.entities.push(entity);
        }
    }

    if let Some(entities) = parser.section("ENTITIES") {
        read_entities(entities, &mut document)?;
    }

    if let Some(objects) = parser.section("OBJECTS") {
        read_layouts(objects, &mut document, &record_names)?;
    }
    finish_layouts(&mut document)?;

    document.validate()?;
    Ok(document)
}

fn read_tables(
    pairs: &[DxfPair],
    document: &mut Document,
    record_names: &mut HashMap<String, String>,
) {
    let mut table = String::new();
    for record in records(pairs) {
        let kind = record.kind.to_uppercase();
        match kind.as_str() {
            "TABLE" => table = record.text(2).unwrap_or_default().to_uppercase(),
            "ENDTAB" => table.clear(),
            "LAYER" if table == "LAYER" => {
                let Some(name) = record.text(2).filter(|n| !n.is_empty()) else {
                    continue;
                };
                let mut layer = Layer::new(name);
                if let Some(color) = record.first(62).and_then(|p| p.as_i16()) {
                    layer.color = color;
                }
                if let Some(linetype) = record.text(6).filter(|l| !l.is_empty()) {
                    layer.linetype = linetype.to_string();
                }
                layer.flags = record.first(70).and_then(|p| p.as_i16()).unwrap_or(0);
                debug!("Layer '{}' flags={} locked={}", layer.name, layer.flags, layer.is_locked());
                document.layers.add(layer);
            }
            "LTYPE" if table == "LTYPE" => {
                add_table_record(&record, &mut document.symbols.linetypes)
            }
            "STYLE" if table == "STYLE" => {
                add_table_record(&record, &mut document.symbols.text_styles)
            }
            "DIMSTYLE" if table == "DIMSTYLE" => {
                add_table_record(&record, &mut document.symbols.dim_styles)
            }
            "BLOCK_RECORD" if table == "BLOCK_RECORD" => {
                if let (Some(handle), Some(name)) = (record.text(5), record.text(2)) {
                    record_names.insert(handle.to_uppercase(), name.to_string());
                }
            }
            _ => {}
        }
    }
}

/// 保留表项的数据组码；名称单独存放，句柄、子类标记、扩展字典与扩展数据丢弃
fn add_table_record(record: &DxfRecord<'_>, table: &mut SymbolTable) {
    let Some(name) = record.text(2).filter(|n| !n.is_empty()) else {
        return;
    };
    let mut codes = Vec::new();
    let mut in_group = false;
    let mut named = false;
    for pair in record.codes {
        if in_group {
            if pair.code == 102 && pair.text() == "}" {
                in_group = false;
            }
            continue;
        }
        match pair.code {
            102 if pair.text().starts_with('{') => in_group = true,
            2 if !named => named = true,
            100 => {}
            code if code >= 1000 || is_pointer_code(code) => {}
            code => codes.push((code, pair.value.clone())),
        }
    }
    table.add(TableRecord::new(name, codes));
}

fn read_entities(pairs: &[DxfPair], document: &mut Document) -> Result<(), FileError> {
    let model = document
        .find_block(MODEL_SPACE)
        .ok_or_else(|| FileError::InvalidFormat("missing *Model_Space block".to_string()))?;

    for record in records(pairs) {
        let in_paper = record.first(67).and_then(|p| p.as_i32()) == Some(1);
        let target = if in_paper {
            match document.find_block(PAPER_SPACE) {
                Some(id) => id,
                None => document.add_block(Block::new(PAPER_SPACE, Point2::origin()))?,
            }
        } else {
            model
        };
        let entity = parse_entity(&record, document)?;
        document.block_mut(target)?.entities.push(entity);
    }
    Ok(())
}

fn read_layouts(
    pairs: &[DxfPair],
    document: &mut Document,
    record_names: &HashMap<String, String>,
) -> Result<(), FileError> {
    for record in records(pairs) {
        if !record.kind.eq_ignore_ascii_case("LAYOUT") {
            continue;
        }
        // 布局名与块记录都取最后一次出现（前面的属于 AcDbPlotSettings / 所属字典）
        let name = record.last(1).map(|p| p.text()).unwrap_or_default();
        let block_name = record
            .last(330)
            .and_then(|p| record_names.get(&p.text().to_uppercase()));
        let Some(block) = block_name.and_then(|n| document.find_block(n)) else {
            warn!("Layout '{}' references an unknown block record, skipped", name);
            continue;
        };

        let is_model = name.eq_ignore_ascii_case(MODEL_LAYOUT)
            || document.block(block)?.name.eq_ignore_ascii_case(MODEL_SPACE);
        if is_model && document.model_layout().is_some() {
            warn!("Second model layout '{}' ignored", name);
            continue;
        }
        if document.layout(name).is_some() {
            warn!("Duplicate layout '{}' ignored", name);
            continue;
        }

        let tab_order = record.first(71).and_then(|p| p.as_i32()).unwrap_or(1);
        let mut layout = if is_model {
            Layout::model(block)
        } else {
            Layout::paper(name, block, tab_order)
        };
        layout.paper_width = record.f64_or(44, layout.paper_width);
        layout.paper_height = record.f64_or(45, layout.paper_height);
        document.add_layout(layout)?;
    }
    Ok(())
}

/// 没有 LAYOUT 对象的旧文件：补出模型布局，以及含内容的 *Paper_Space 对应的图纸布局
fn finish_layouts(document: &mut Document) -> Result<(), FileError> {
    document.ensure_model_layout();
    if document.paper_layouts().is_empty() {
        if let Some(paper) = document.find_block(PAPER_SPACE) {
            if !document.block(paper)?.is_empty() {
                document.add_layout(Layout::paper("Layout1", paper, 1))?;
            }
        }
    }
    Ok(())
}

/// 句柄与指针组码，写出时重新生成
fn is_pointer_code(code: i32) -> bool {
    matches!(code, 5 | 105 | 320..=369 | 390..=399 | 480..=481 | 1005)
}

/// 由本模块显式建模的实体类型
fn is_modeled(kind: &str) -> bool {
    matches!(
        kind,
        "LINE" | "POINT" | "CIRCLE" | "ARC" | "LWPOLYLINE" | "TEXT" | "INSERT" | "VIEWPORT"
    )
}

fn parse_entity(record: &DxfRecord<'_>, document: &Document) -> Result<Entity, FileError> {
    let kind = record.kind.to_uppercase();
    let modeled = is_modeled(&kind);

    let mut layer = String::from("0");
    let mut linetype = None;
    let mut color = None;
    let mut lineweight = None;
    let mut rest: Vec<(i32, String)> = Vec::new();
    let mut in_group = false;

    for pair in record.codes {
        if in_group {
            if pair.code == 102 && pair.text() == "}" {
                in_group = false;
            }
            continue;
        }
        match pair.code {
            102 if pair.text().starts_with('{') => in_group = true,
            67 => {}
            code if is_pointer_code(code) => {}
            100 if modeled || pair.text().eq_ignore_ascii_case("AcDbEntity") => {}
            8 => layer = pair.text().to_string(),
            6 => linetype = Some(pair.text().to_string()),
            62 => color = pair.as_i16(),
            370 => lineweight = pair.as_i16(),
            code => rest.push((code, pair.value.clone())),
        }
    }

    let geometry = match kind.as_str() {
        "LINE" => Geometry::Line(Line::new(
            take_point(&mut rest, 10),
            take_point(&mut rest, 11),
        )),
        "POINT" => Geometry::Point(Point::from_point2(take_point(&mut rest, 10))),
        "CIRCLE" => {
            let center = take_point(&mut rest, 10);
            Geometry::Circle(Circle::new(center, take_f64(&mut rest, 40, 0.0)))
        }
        "ARC" => {
            let center = take_point(&mut rest, 10);
            let radius = take_f64(&mut rest, 40, 0.0);
            let start = take_f64(&mut rest, 50, 0.0).to_radians();
            let end = take_f64(&mut rest, 51, 360.0).to_radians();
            Geometry::Arc(Arc::new(center, radius, start, end))
        }
        "LWPOLYLINE" => Geometry::Polyline(take_lwpolyline(&mut rest)),
        "TEXT" => {
            let position = take_point(&mut rest, 10);
            let height = take_f64(&mut rest, 40, 2.5);
            let content = take(&mut rest, 1).unwrap_or_default();
            let mut text = Text::new(position, content, height);
            text.rotation = take_f64(&mut rest, 50, 0.0).to_radians();
            Geometry::Text(text)
        }
        "INSERT" => {
            let name = take(&mut rest, 2).unwrap_or_default();
            let block = document.find_block(name.trim()).ok_or_else(|| {
                FileError::InvalidFormat(format!("INSERT references undefined block '{}'", name))
            })?;
            let mut insert = Insert::new(block, take_point(&mut rest, 10));
            insert.scale = Vector2::new(take_f64(&mut rest, 41, 1.0), take_f64(&mut rest, 42, 1.0));
            take(&mut rest, 43);
            insert.rotation = take_f64(&mut rest, 50, 0.0);
            Geometry::Insert(insert)
        }
        "VIEWPORT" => {
            let center = take_point(&mut rest, 10);
            let width = take_f64(&mut rest, 40, 0.0);
            let height = take_f64(&mut rest, 41, 0.0);
            let id = take(&mut rest, 69)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(2);
            let view_center = Point2::new(take_f64(&mut rest, 12, 0.0), take_f64(&mut rest, 22, 0.0));
            let view_height = take_f64(&mut rest, 45, height);
            let mut viewport = Viewport::new(center, width, height, view_center, view_height);
            viewport.id = id;
            Geometry::Viewport(viewport)
        }
        _ => Geometry::Raw(RawEntity::new(record.kind.trim(), std::mem::take(&mut rest))),
    };

    Ok(Entity {
        layer,
        color,
        linetype,
        lineweight,
        extra: rest,
        geometry,
    })
}

/// 取出第一个指定组码的值
fn take(rest: &mut Vec<(i32, String)>, code: i32) -> Option<String> {
    let index = rest.iter().position(|(c, _)| *c == code)?;
    Some(rest.remove(index).1)
}

fn take_f64(rest: &mut Vec<(i32, String)>, code: i32, default: f64) -> f64 {
    take(rest, code)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// 取出二维点（x_code / x_code+10），丢弃 z
fn take_point(rest: &mut Vec<(i32, String)>, x_code: i32) -> Point2 {
    let x = take_f64(rest, x_code, 0.0);
    let y = take_f64(rest, x_code + 10, 0.0);
    take(rest, x_code + 20);
    Point2::new(x, y)
}

/// 轻量多段线顶点按顺序出现：10, 20, [40, 41,] [42]
fn take_lwpolyline(rest: &mut Vec<(i32, String)>) -> Polyline {
    let flags = take(rest, 70)
        .and_then(|v| v.trim().parse::<i32>().ok())
        .unwrap_or(0);
    take(rest, 90);

    let mut vertices: Vec<PolylineVertex> = Vec::new();
    let mut remaining = Vec::with_capacity(rest.len());
    for (code, value) in rest.drain(..) {
        let number = value.trim().parse::<f64>().unwrap_or(0.0);
        match code {
            10 => vertices.push(PolylineVertex::new(Point2::new(number, 0.0))),
            20 => {
                if let Some(v) = vertices.last_mut() {
                    v.point.y = number;
                }
            }
            42 => {
                if let Some(v) = vertices.last_mut() {
                    v.bulge = number;
                }
            }
            // 逐顶点线宽不保留
            40 | 41 | 91 => {}
            _ => remaining.push((code, value)),
        }
    }
    *rest = remaining;
    Polyline::new(vertices, flags & 1 != 0)
}

// ========== 写出 ==========

/// 序列化文档为 DXF 文本
pub fn write_document(document: &Document) -> Result<String, FileError> {
    document.validate()?;

    let mut body = DxfWriter::new();
    let handles = Handles::allocate(&mut body, document);

    write_tables(&mut body, document, &handles)?;
    write_blocks(&mut body, document, &handles)?;
    write_entities(&mut body, document, &handles)?;
    write_objects(&mut body, document, &handles);

    let mut out = DxfWriter::new();
    out.begin_section("HEADER");
    out.write_pair(9, "$ACADVER");
    out.write_pair(1, ACAD_VERSION);
    out.write_pair(9, "$DWGCODEPAGE");
    out.write_pair(3, WRITE_CODEPAGE);
    out.write_pair(9, "$HANDSEED");
    out.write_pair(5, body.handle_seed());
    out.end_section();
    out.append(body);
    Ok(out.finish())
}

/// 预先分配的句柄（块记录与布局之间相互引用）
struct Handles {
    root_dictionary: String,
    layout_dictionary: String,
    block_records: Vec<String>,
    layouts: Vec<String>,
}

impl Handles {
    fn allocate(writer: &mut DxfWriter, document: &Document) -> Self {
        Self {
            root_dictionary: writer.new_handle(),
            layout_dictionary: writer.new_handle(),
            block_records: (0..document.block_count()).map(|_| writer.new_handle()).collect(),
            layouts: document.layouts().iter().map(|_| writer.new_handle()).collect(),
        }
    }

    fn record(&self, id: BlockId) -> &str {
        self.block_records
            .get(id.index())
            .map(String::as_str)
            .unwrap_or("0")
    }
}

/// 写在 ENTITIES 段而不是块定义中的块：模型空间与当前图纸空间
fn is_entities_section_block(name: &str) -> bool {
    name.eq_ignore_ascii_case(MODEL_SPACE) || name.eq_ignore_ascii_case(PAPER_SPACE)
}

fn begin_table(w: &mut DxfWriter, name: &str, count: usize) -> String {
    let handle = w.new_handle();
    w.write_pair(0, "TABLE");
    w.write_pair(2, name);
    w.write_pair(5, &handle);
    w.write_pair(330, "0");
    w.write_pair(100, "AcDbSymbolTable");
    w.write_pair(70, count);
    handle
}

fn begin_table_entry(w: &mut DxfWriter, kind: &str, table: &str, subclass: &str) {
    let handle = w.new_handle();
    w.write_pair(0, kind);
    w.write_pair(5, handle);
    w.write_pair(330, table);
    w.write_pair(100, "AcDbSymbolTableRecord");
    w.write_pair(100, subclass);
}

fn write_tables(w: &mut DxfWriter, document: &Document, handles: &Handles) -> Result<(), FileError> {
    w.begin_section("TABLES");

    let table = begin_table(w, "VPORT", 1);
    begin_table_entry(w, "VPORT", &table, "AcDbViewportTableRecord");
    w.write_pair(2, "*Active");
    w.write_pair(70, 0);
    w.write_point(10, Point2::origin());
    w.write_point(11, Point2::new(1.0, 1.0));
    w.write_f64(40, 1000.0);
    w.write_f64(41, 1.5);
    w.write_pair(0, "ENDTAB");

    let linetypes = collect_linetypes(document);
    let table = begin_table(w, "LTYPE", linetypes.len());
    for name in &linetypes {
        begin_table_entry(w, "LTYPE", &table, "AcDbLinetypeTableRecord");
        w.write_pair(2, name);
        match document.symbols.linetypes.get(name) {
            Some(record) => write_codes(w, &record.codes),
            None => {
                w.write_pair(70, 0);
                w.write_pair(3, "");
                w.write_pair(72, 65);
                w.write_pair(73, 0);
                w.write_f64(40, 0.0);
            }
        }
    }
    w.write_pair(0, "ENDTAB");

    let table = begin_table(w, "LAYER", document.layers.len());
    for layer in document.layers.iter() {
        begin_table_entry(w, "LAYER", &table, "AcDbLayerTableRecord");
        w.write_pair(2, &layer.name);
        w.write_pair(70, layer.flags);
        w.write_pair(62, layer.color);
        w.write_pair(6, &layer.linetype);
    }
    w.write_pair(0, "ENDTAB");

    let styles = &document.symbols.text_styles;
    let default_style = !styles.contains(STANDARD);
    let table = begin_table(w, "STYLE", styles.len() + usize::from(default_style));
    if default_style {
        begin_table_entry(w, "STYLE", &table, "AcDbTextStyleTableRecord");
        w.write_pair(2, STANDARD);
        w.write_pair(70, 0);
        w.write_f64(40, 0.0);
        w.write_f64(41, 1.0);
        w.write_f64(50, 0.0);
        w.write_pair(71, 0);
        w.write_f64(42, 2.5);
        w.write_pair(3, "txt");
        w.write_pair(4, "");
    }
    for record in styles.iter() {
        begin_table_entry(w, "STYLE", &table, "AcDbTextStyleTableRecord");
        w.write_pair(2, &record.name);
        write_codes(w, &record.codes);
    }
    w.write_pair(0, "ENDTAB");

    for name in ["VIEW", "UCS"] {
        begin_table(w, name, 0);
        w.write_pair(0, "ENDTAB");
    }

    let table = begin_table(w, "APPID", 1);
    begin_table_entry(w, "APPID", &table, "AcDbRegAppTableRecord");
    w.write_pair(2, "ACAD");
    w.write_pair(70, 0);
    w.write_pair(0, "ENDTAB");

    let dim_styles = &document.symbols.dim_styles;
    let default_dim_style = !dim_styles.contains(STANDARD);
    let table = begin_table(w, "DIMSTYLE", dim_styles.len() + usize::from(default_dim_style));
    w.write_pair(100, "AcDbDimStyleTable");
    if default_dim_style {
        begin_dim_style_entry(w, &table);
        w.write_pair(2, STANDARD);
        w.write_pair(70, 0);
    }
    for record in dim_styles.iter() {
        begin_dim_style_entry(w, &table);
        w.write_pair(2, &record.name);
        write_codes(w, &record.codes);
    }
    w.write_pair(0, "ENDTAB");

    let table = begin_table(w, "BLOCK_RECORD", document.block_count());
    for (id, block) in document.blocks() {
        w.write_pair(0, "BLOCK_RECORD");
        w.write_pair(5, handles.record(id));
        w.write_pair(330, &table);
        w.write_pair(100, "AcDbSymbolTableRecord");
        w.write_pair(100, "AcDbBlockTableRecord");
        w.write_pair(2, &block.name);
        let layout = document
            .layouts()
            .iter()
            .position(|l| l.block == id)
            .and_then(|i| handles.layouts.get(i))
            .map(String::as_str)
            .unwrap_or("0");
        w.write_pair(340, layout);
    }
    w.write_pair(0, "ENDTAB");

    w.end_section();
    Ok(())
}

/// DIMSTYLE 表项使用组码 105 作为句柄
fn begin_dim_style_entry(w: &mut DxfWriter, table: &str) {
    let handle = w.new_handle();
    w.write_pair(0, "DIMSTYLE");
    w.write_pair(105, handle);
    w.write_pair(330, table);
    w.write_pair(100, "AcDbSymbolTableRecord");
    w.write_pair(100, "AcDbDimStyleTableRecord");
}

fn write_codes(w: &mut DxfWriter, codes: &[(i32, String)]) {
    for (code, value) in codes {
        w.write_pair(*code, value);
    }
}

/// 表中必须存在所有被引用的线型
fn collect_linetypes(document: &Document) -> Vec<String> {
    let mut names: BTreeSet<String> = BTreeSet::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut add = |name: &str| {
        if !name.is_empty() && seen.insert(name.to_uppercase()) {
            names.insert(name.to_string());
        }
    };
    for name in ["ByBlock", "ByLayer", "Continuous"] {
        add(name);
    }
    for record in document.symbols.linetypes.iter() {
        add(&record.name);
    }
    for layer in document.layers.iter() {
        add(&layer.linetype);
    }
    for (_, block) in document.blocks() {
        for entity in &block.entities {
            if let Some(linetype) = &entity.linetype {
                add(linetype);
            }
        }
    }
    names.into_iter().collect()
}

fn write_blocks(w: &mut DxfWriter, document: &Document, handles: &Handles) -> Result<(), FileError> {
    w.begin_section("BLOCKS");
    for (id, block) in document.blocks() {
        let record = handles.record(id);
        let paper = block.name.to_uppercase().starts_with("*PAPER_SPACE");

        let handle = w.new_handle();
        w.write_pair(0, "BLOCK");
        w.write_pair(5, handle);
        w.write_pair(330, record);
        w.write_pair(100, "AcDbEntity");
        if paper {
            w.write_pair(67, 1);
        }
        w.write_pair(8, "0");
        w.write_pair(100, "AcDbBlockBegin");
        w.write_pair(2, &block.name);
        w.write_pair(70, if block.is_reserved() && !is_layout_block(&block.name) { 1 } else { 0 });
        w.write_point(10, block.base_point);
        w.write_pair(3, &block.name);
        w.write_pair(1, "");

        if !is_entities_section_block(&block.name) {
            for entity in &block.entities {
                write_entity(w, document, entity, record, false)?;
            }
        }

        let handle = w.new_handle();
        w.write_pair(0, "ENDBLK");
        w.write_pair(5, handle);
        w.write_pair(330, record);
        w.write_pair(100, "AcDbEntity");
        if paper {
            w.write_pair(67, 1);
        }
        w.write_pair(8, "0");
        w.write_pair(100, "AcDbBlockEnd");
    }
    w.end_section();
    Ok(())
}

fn is_layout_block(name: &str) -> bool {
    let upper = name.to_uppercase();
    upper.starts_with("*MODEL_SPACE") || upper.starts_with("*PAPER_SPACE")
}

fn write_entities(w: &mut DxfWriter, document: &Document, handles: &Handles) -> Result<(), FileError> {
    w.begin_section("ENTITIES");
    for (id, block) in document.blocks() {
        if !is_entities_section_block(&block.name) {
            continue;
        }
        let paper = block.name.eq_ignore_ascii_case(PAPER_SPACE);
        for entity in &block.entities {
            write_entity(w, document, entity, handles.record(id), paper)?;
        }
    }
    w.end_section();
    Ok(())
}

fn write_entity(
    w: &mut DxfWriter,
    document: &Document,
    entity: &Entity,
    owner: &str,
    paper: bool,
) -> Result<(), FileError> {
    let handle = w.new_handle();
    w.write_pair(0, entity.geometry.type_name());
    w.write_pair(5, handle);
    w.write_pair(330, owner);
    w.write_pair(100, "AcDbEntity");
    if paper {
        w.write_pair(67, 1);
    }
    w.write_pair(8, &entity.layer);
    if let Some(linetype) = &entity.linetype {
        w.write_pair(6, linetype);
    }
    if let Some(color) = entity.color {
        w.write_pair(62, color);
    }
    if let Some(lineweight) = entity.lineweight {
        w.write_pair(370, lineweight);
    }

    match &entity.geometry {
        Geometry::Line(line) => {
            w.write_pair(100, "AcDbLine");
            w.write_point(10, line.start);
            w.write_point(11, line.end);
        }
        Geometry::Point(point) => {
            w.write_pair(100, "AcDbPoint");
            w.write_point(10, point.position);
        }
        Geometry::Circle(circle) => {
            w.write_pair(100, "AcDbCircle");
            w.write_point(10, circle.center);
            w.write_f64(40, circle.radius);
        }
        Geometry::Arc(arc) => {
            w.write_pair(100, "AcDbCircle");
            w.write_point(10, arc.center);
            w.write_f64(40, arc.radius);
            w.write_pair(100, "AcDbArc");
            w.write_f64(50, arc.start_angle.to_degrees());
            w.write_f64(51, arc.end_angle.to_degrees());
        }
        Geometry::Polyline(polyline) => {
            w.write_pair(100, "AcDbPolyline");
            w.write_pair(90, polyline.vertices.len());
            w.write_pair(70, if polyline.closed { 1 } else { 0 });
            for vertex in &polyline.vertices {
                w.write_f64(10, vertex.point.x);
                w.write_f64(20, vertex.point.y);
                if vertex.bulge != 0.0 {
                    w.write_f64(42, vertex.bulge);
                }
            }
        }
        Geometry::Text(text) => {
            w.write_pair(100, "AcDbText");
            w.write_point(10, text.position);
            w.write_f64(40, text.height);
            w.write_pair(1, &text.content);
            w.write_f64(50, text.rotation.to_degrees());
            // 组码 73 属于第二个 AcDbText 子类，扩展数据放在最后
            let trailing = |code: i32| code == 73 || code >= 1000;
            for (code, value) in entity.extra.iter().filter(|(c, _)| !trailing(*c)) {
                w.write_pair(*code, value);
            }
            w.write_pair(100, "AcDbText");
            for (code, value) in entity.extra.iter().filter(|(c, _)| trailing(*c)) {
                w.write_pair(*code, value);
            }
            return Ok(());
        }
        Geometry::Insert(insert) => {
            let block = document.block(insert.block)?;
            w.write_pair(100, "AcDbBlockReference");
            w.write_pair(2, &block.name);
            w.write_point(10, insert.position);
            w.write_f64(41, insert.scale.x);
            w.write_f64(42, insert.scale.y);
            w.write_f64(43, 1.0);
            w.write_f64(50, insert.rotation);
        }
        Geometry::Viewport(vp) => {
            w.write_pair(100, "AcDbViewport");
            w.write_point(10, vp.center);
            w.write_f64(40, vp.width);
            w.write_f64(41, vp.height);
            w.write_pair(69, vp.id);
            w.write_f64(12, vp.view_center.x);
            w.write_f64(22, vp.view_center.y);
            w.write_f64(45, vp.view_height);
        }
        Geometry::Raw(raw) => write_codes(w, &raw.codes),
    }

    write_codes(w, &entity.extra);
    Ok(())
}

fn write_objects(w: &mut DxfWriter, document: &Document, handles: &Handles) {
    w.begin_section("OBJECTS");

    w.write_pair(0, "DICTIONARY");
    w.write_pair(5, &handles.root_dictionary);
    w.write_pair(330, "0");
    w.write_pair(100, "AcDbDictionary");
    w.write_pair(281, 1);
    w.write_pair(3, "ACAD_LAYOUT");
    w.write_pair(350, &handles.layout_dictionary);

    w.write_pair(0, "DICTIONARY");
    w.write_pair(5, &handles.layout_dictionary);
    w.write_pair(330, &handles.root_dictionary);
    w.write_pair(100, "AcDbDictionary");
    w.write_pair(281, 1);
    for (layout, handle) in document.layouts().iter().zip(&handles.layouts) {
        w.write_pair(3, &layout.name);
        w.write_pair(350, handle);
    }

    for (layout, handle) in document.layouts().iter().zip(&handles.layouts) {
        w.write_pair(0, "LAYOUT");
        w.write_pair(5, handle);
        w.write_pair(330, &handles.layout_dictionary);
        w.write_pair(100, "AcDbPlotSettings");

        // 图纸设置
        w.write_pair(1, ""); // 页面设置名
        w.write_pair(2, "none_device"); // 打印机名
        w.write_pair(4, ""); // 图纸尺寸名
        w.write_pair(6, "");
        w.write_f64(40, 0.0);
        w.write_f64(41, 0.0);
        w.write_f64(42, 0.0);
        w.write_f64(43, 0.0);
        w.write_f64(44, layout.paper_width);
        w.write_f64(45, layout.paper_height);
        w.write_pair(70, 688);
        w.write_pair(72, 1);

        w.write_pair(100, "AcDbLayout");
        w.write_pair(1, &layout.name);
        w.write_pair(70, 1);
        w.write_pair(71, layout.tab_order);
        w.write_f64(10, 0.0);
        w.write_f64(20, 0.0);
        w.write_f64(11, layout.paper_width);
        w.write_f64(21, layout.paper_height);
        w.write_pair(330, handles.record(layout.block));
    }

    w.end_section();
}

#[cfg(test)]
mod tests {
    use super::*;
    use zcad_core::math::EPSILON;

    fn sample_document() -> Document {
        let mut doc = Document::new();
        doc.layers.add(Layer::new("TITLE").with_color(2).locked());
        doc.layers.add(Layer::new("GEOM"));

        let bolt = doc.add_block(Block::new("Bolt", Point2::new(1.0, 1.0))).unwrap();
        doc.add_entity(
            bolt,
            Entity::new(Geometry::Circle(Circle::new(Point2::new(1.0, 1.0), 0.5))),
        )
        .unwrap();

        let model = doc.model_block().unwrap();
        doc.add_entity(
            model,
            Entity::new(Geometry::Line(Line::new(Point2::new(0.0, 0.0), Point2::new(100.0, 50.0))))
                .on_layer("GEOM")
                .with_color(3),
        )
        .unwrap();
        let insert = Insert::new(bolt, Point2::new(10.0, 20.0))
            .with_uniform_scale(2.0)
            .with_rotation(30.0);
        doc.add_entity(model, Entity::new(Geometry::Insert(insert))).unwrap();

        let paper = doc.add_block(Block::new(PAPER_SPACE, Point2::origin())).unwrap();
        doc.add_layout(Layout::paper("Sheet", paper, 1)).unwrap();
        doc.add_entity(
            paper,
            Entity::new(Geometry::Viewport(Viewport::new(
                Point2::new(200.0, 150.0),
                300.0,
                200.0,
                Point2::new(50.0, 25.0),
                2000.0,
            ))),
        )
        .unwrap();
        doc.add_entity(
            paper,
            Entity::new(Geometry::Text(Text::new(Point2::new(10.0, 10.0), "E-7-05", 3.5)))
                .on_layer("TITLE"),
        )
        .unwrap();
        doc
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roundtrip.dxf");
        let doc = sample_document();
        save(&doc, &path).expect("Failed to save");

        let loaded = load(&path).expect("Failed to load");
        assert!(loaded.layers.get("TITLE").unwrap().is_locked());
        assert_eq!(loaded.layers.get("TITLE").unwrap().color, 2);
        assert!(!loaded.layers.get("GEOM").unwrap().is_locked());

        let model = loaded.model_block().unwrap();
        let model_entities = &loaded.block(model).unwrap().entities;
        assert_eq!(model_entities.len(), 2);
        assert_eq!(model_entities[0].layer, "GEOM");
        assert_eq!(model_entities[0].color, Some(3));

        let insert = model_entities[1].as_insert().unwrap();
        assert_eq!(loaded.block(insert.block).unwrap().name, "Bolt");
        assert!((insert.scale.x - 2.0).abs() < EPSILON);
        assert!((insert.rotation - 30.0).abs() < EPSILON);
        assert_eq!(loaded.block(insert.block).unwrap().base_point, Point2::new(1.0, 1.0));

        let paper = loaded.first_paper_layout().expect("paper layout");
        assert_eq!(paper.name, "Sheet");
        let paper_entities = &loaded.block(paper.block).unwrap().entities;
        assert_eq!(paper_entities.len(), 2);
        let vp = paper_entities[0].as_viewport().unwrap();
        assert!((vp.view_height - 2000.0).abs() < EPSILON);
        assert!((vp.height - 200.0).abs() < EPSILON);
        assert_eq!(vp.view_center, Point2::new(50.0, 25.0));
        match &paper_entities[1].geometry {
            Geometry::Text(text) => assert_eq!(text.content, "E-7-05"),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_styles_and_text_roundtrip() {
        use zcad_core::symbols::TableRecord;

        fn codes(list: &[(i32, &str)]) -> Vec<(i32, String)> {
            list.iter().map(|(c, v)| (*c, v.to_string())).collect()
        }

        let mut doc = Document::new();
        let dashed = codes(&[
            (70, "0"),
            (3, "__ __ __"),
            (72, "65"),
            (73, "2"),
            (40, "15.0"),
            (49, "10.0"),
            (74, "0"),
            (49, "-5.0"),
            (74, "0"),
        ]);
        doc.symbols.linetypes.add(TableRecord::new("DASHED", dashed.clone()));
        doc.symbols.text_styles.add(TableRecord::new(
            "HZ",
            codes(&[(70, "0"), (41, "0.8"), (3, "gbenor.shx"), (4, "gbcbig.shx")]),
        ));
        doc.symbols
            .dim_styles
            .add(TableRecord::new("ISO-25", codes(&[(70, "0"), (41, "2.5")])));

        let extra = codes(&[
            (7, "HZ"),
            (72, "1"),
            (11, "5.0"),
            (21, "5.0"),
            (31, "0.0"),
            (73, "2"),
        ]);
        let mut text = Entity::new(Geometry::Text(Text::new(Point2::new(5.0, 5.0), "图纸", 3.5)));
        text.extra = extra.clone();
        let model = doc.model_block().unwrap();
        doc.add_entity(model, text).unwrap();

        let written = write_document(&doc).unwrap();
        assert!(written.is_ascii());
        assert!(written.contains("$DWGCODEPAGE\n  3\nANSI_1252"));
        let lines: Vec<&str> = written.lines().collect();
        let markers: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == "AcDbText")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(markers.len(), 2);
        assert_eq!(lines[markers[1] + 1..markers[1] + 3], [" 73", "2"]);

        let loaded = read_document(&DxfRawParser::parse(&written).unwrap()).unwrap();
        assert_eq!(loaded.symbols.linetypes.get("dashed").unwrap().codes, dashed);
        assert!(loaded.symbols.linetypes.contains("Continuous"));
        let hz = loaded.symbols.text_styles.get("HZ").unwrap();
        assert!(hz.codes.contains(&(4, "gbcbig.shx".to_string())));
        assert!(loaded.symbols.text_styles.contains(STANDARD));
        assert!(loaded.symbols.dim_styles.contains("ISO-25"));
        assert!(loaded.symbols.dim_styles.contains(STANDARD));

        let entity = &loaded.block(loaded.model_block().unwrap()).unwrap().entities[0];
        assert_eq!(entity.extra, extra);
        match &entity.geometry {
            Geometry::Text(text) => assert_eq!(text.content, "图纸"),
            other => panic!("expected text, got {:?}", other),
        }

        // 再次写出时沿用读入的 Standard，不重复添加
        let rewritten = write_document(&loaded).unwrap();
        let standard_styles = rewritten
            .lines()
            .filter(|l| *l == "AcDbTextStyleTableRecord")
            .count();
        assert_eq!(standard_styles, 2);
    }

    #[test]
    fn test_gbk_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gbk.dxf");
        let mut bytes =
            b"0\nSECTION\n2\nHEADER\n9\n$ACADVER\n1\nAC1015\n9\n$DWGCODEPAGE\n3\nANSI_936\n0\nENDSEC\n0\nSECTION\n2\nENTITIES\n0\nTEXT\n8\n0\n10\n0\n20\n0\n40\n2.5\n1\n"
                .to_vec();
        bytes.extend_from_slice(&[0xCD, 0xBC, 0xD6, 0xBD]);
        bytes.extend_from_slice(b"\n0\nENDSEC\n0\nEOF\n");
        fs::write(&path, bytes).unwrap();

        let doc = load(&path).unwrap();
        let entity = &doc.block(doc.model_block().unwrap()).unwrap().entities[0];
        match &entity.geometry {
            Geometry::Text(text) => assert_eq!(text.content, "图纸"),
            other => panic!("expected text, got {:?}", other),
        }

        // 写出再读回不丢字
        let copy = dir.path().join("copy.dxf");
        save(&doc, &copy).unwrap();
        assert!(fs::read(&copy).unwrap().is_ascii());
        let reloaded = load(&copy).unwrap();
        let entity = &reloaded.block(reloaded.model_block().unwrap()).unwrap().entities[0];
        assert!(matches!(&entity.geometry, Geometry::Text(t) if t.content == "图纸"));
    }

    #[test]
    fn test_raw_entities_pass_through() {
        let text = "\
  0
SECTION
  2
ENTITIES
  0
MTEXT
  5
2A
330
1F
100
AcDbEntity
  8
NOTES
100
AcDbMText
 10
5.0
 20
6.0
  1
Hello
1001
ACAD
1000
meta
  0
ENDSEC
  0
EOF
";
        let parser = DxfRawParser::parse(text).unwrap();
        let doc = read_document(&parser).unwrap();
        let model = doc.model_block().unwrap();
        let entity = &doc.block(model).unwrap().entities[0];
        assert_eq!(entity.layer, "NOTES");
        let Geometry::Raw(raw) = &entity.geometry else {
            panic!("expected raw entity");
        };
        assert_eq!(raw.type_name, "MTEXT");
        assert!(raw.codes.iter().all(|(c, _)| *c != 5 && *c != 330));
        assert_eq!(raw.codes.first(), Some(&(100, "AcDbMText".to_string())));
        assert_eq!(raw.codes.last(), Some(&(1000, "meta".to_string())));

        let written = write_document(&doc).unwrap();
        assert!(written.contains("AcDbMText"));
        assert!(written.contains("Hello"));
    }

    #[test]
    fn test_legacy_paper_space_gets_layout() {
        let text = "\
0
SECTION
2
ENTITIES
0
LINE
67
1
8
0
10
0
20
0
11
10
21
0
0
ENDSEC
0
EOF
";
        let doc = read_document(&DxfRawParser::parse(text).unwrap()).unwrap();
        let paper = doc.first_paper_layout().expect("synthesised paper layout");
        assert_eq!(paper.name, "Layout1");
        assert_eq!(doc.block(paper.block).unwrap().entities.len(), 1);
        assert!(doc.block(doc.model_block().unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_undefined_block_reference_is_error() {
        let text = "0\nSECTION\n2\nENTITIES\n0\nINSERT\n2\nMISSING\n10\n0\n20\n0\n0\nENDSEC\n0\nEOF\n";
        let result = read_document(&DxfRawParser::parse(text).unwrap());
        assert!(matches!(result, Err(FileError::InvalidFormat(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = load(Path::new("/nonexistent/zcad/missing.dxf"));
        assert!(matches!(result, Err(FileError::NotFound(_))));
    }
}
