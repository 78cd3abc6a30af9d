//! 基于目录的图纸导出器
//!
//! 宿主已经把每张图纸导出为 `{项目} - {图号} - {标题}.dxf` 时，
//! 直接从输入目录复制对应文件到工作目录。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use zcad_merge::locate::FileLocator;
use zcad_merge::{ExportError, Sheet, SheetExporter, SheetInfo};

/// 文件名中项目、图号、标题之间的分隔符
const SEGMENT_SEPARATOR: &str = " - ";

#[derive(Debug, Clone)]
pub struct DirectoryExporter {
    input: PathBuf,
    extension: String,
}

impl DirectoryExporter {
    pub fn new(input: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            extension: extension.into(),
        }
    }
}

impl<S: Sheet + ?Sized> SheetExporter<S> for DirectoryExporter {
    fn export(&mut self, sheets: &[&S], dest: &Path) -> Result<(), ExportError> {
        let mut locator = FileLocator::scan(&self.input, &self.extension)?;
        let mut missing = Vec::new();
        for sheet in sheets {
            let id = sheet.identifier();
            let Some(source) = locator.claim(id) else {
                missing.push(id.to_string());
                continue;
            };
            let Some(file_name) = source.file_name() else {
                missing.push(id.to_string());
                continue;
            };
            fs::copy(&source, dest.join(file_name))?;
            debug!("Exported '{}' from {}", id, source.display());
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "no file in {} for sheets: {}",
                self.input.display(),
                missing.join(", ")
            )
            .into())
        }
    }
}

/// 从文件名推导图号：取 `" - "` 分隔的中间段，不足三段时用整个文件名
pub fn sheet_id_from_file_name(stem: &str) -> Option<String> {
    let segments: Vec<&str> = stem.split(SEGMENT_SEPARATOR).collect();
    let id = match segments.as_slice() {
        [_, middle @ .., _] if !middle.is_empty() => middle.join(SEGMENT_SEPARATOR),
        _ => stem.to_string(),
    };
    let id = id.trim();
    (!id.is_empty()).then(|| id.to_string())
}

/// 为图号附上图框尺寸：取输入目录中对应文件第一个图纸布局的纸张大小
///
/// 找不到文件或文件无法读取时不带尺寸，自动间距退回默认值。
pub fn describe_sheets(input: &Path, extension: &str, ids: &[String]) -> Vec<SheetInfo> {
    let locator = match FileLocator::scan(input, extension) {
        Ok(locator) => locator,
        Err(err) => {
            warn!(path = %input.display(), error = %err, "无法列出输入目录");
            return ids.iter().map(SheetInfo::new).collect();
        }
    };
    ids.iter()
        .map(|id| match locator.find(id) {
            Some(path) => sheet_info_from_file(id, path),
            None => SheetInfo::new(id),
        })
        .collect()
}

/// 读取单个文件的图框尺寸
///
/// 优先取第一个图纸布局的纸张大小；提升后的文件没有图纸布局，
/// 此时退回模型空间内容的范围。
pub fn sheet_info_from_file(id: impl Into<String>, path: &Path) -> SheetInfo {
    let info = SheetInfo::new(id);
    let doc = match zcad_file::load(path) {
        Ok(doc) => doc,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "无法读取图框尺寸");
            return info;
        }
    };
    if let Some(layout) = doc.first_paper_layout() {
        return info.with_outline(layout.paper_width, layout.paper_height);
    }
    match doc.model_extents() {
        Ok(Some(extents)) => info.with_outline(extents.width(), extents.height()),
        Ok(None) => info,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "无法计算模型范围");
            info
        }
    }
}

/// 列出目录中所有导出文件对应的图号（排序去重）
pub fn sheet_ids_in_dir(dir: &Path, extension: &str) -> io::Result<Vec<String>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .extension()
            .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(extension));
        if !matches || !path.is_file() {
            continue;
        }
        if let Some(id) = path
            .file_stem()
            .and_then(|stem| sheet_id_from_file_name(&stem.to_string_lossy()))
        {
            ids.push(id);
        }
    }
    ids.sort();
    ids.dedup();
    Ok(ids)
}
