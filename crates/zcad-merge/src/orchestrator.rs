//! 整理流程编排
//!
//! 状态依次为 `Idle → Partitioning → Exporting → Promoting → Merging → Cleanup → Done`，
//! 前置条件不满足时进入 `Failed`。单张图纸或单个分组失败只记录在报告中，
//! 不影响其他交付物；临时目录无论成败都会尝试删除。

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::MergeError;
use crate::file_name::build_combined_name;
use crate::locate::FileLocator;
use crate::merge::{merge_flat, merge_into_template, MergeReport};
use crate::partition::{partition, GroupEntry, Partition, Sheet};
use crate::promote::promote_file;
use crate::report::{ConsolidationReport, Deliverable};

/// 默认合并间距
pub const DEFAULT_SPACING: f64 = 1000.0;

/// 自动间距相对最大图框宽度的放大系数
const AUTO_SPACING_FACTOR: f64 = 1.1;

/// 导出错误
pub type ExportError = Box<dyn std::error::Error + Send + Sync>;

/// 图纸导出器：把一批图纸各自导出为文件
pub trait SheetExporter<S: ?Sized> {
    fn export(&mut self, sheets: &[&S], dest: &Path) -> Result<(), ExportError>;
}

/// 流程阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Partitioning,
    Exporting,
    Promoting,
    Merging,
    Cleanup,
    Done,
    Failed,
}

/// 合并间距
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Spacing {
    Fixed(f64),
    /// 按组内最大图框宽度计算
    Auto,
}

impl Default for Spacing {
    fn default() -> Self {
        Spacing::Fixed(DEFAULT_SPACING)
    }
}

impl Spacing {
    /// 计算一个分组的间距
    pub fn resolve<S: Sheet + ?Sized>(self, sheets: &[&S]) -> f64 {
        match self {
            Spacing::Fixed(value) if value.is_finite() && value > 0.0 => value,
            Spacing::Fixed(_) => DEFAULT_SPACING,
            Spacing::Auto => sheets
                .iter()
                .filter_map(|s| s.outline_size())
                .map(|(width, _)| width)
                .filter(|w| w.is_finite() && *w > 0.0)
                .reduce(f64::max)
                .map_or(DEFAULT_SPACING, |w| w * AUTO_SPACING_FACTOR),
        }
    }
}

/// 整理选项
#[derive(Debug, Clone)]
pub struct ConsolidateOptions {
    pub output_dir: PathBuf,
    pub template: Option<PathBuf>,
    pub spacing: Spacing,
    pub insert_offset: (f64, f64),
    pub content_only_singles: bool,
    pub content_only_groups: bool,
    /// 导出文件与合并文件的扩展名（不含点）
    pub extension: String,
    /// 保留临时目录（调试用）
    pub keep_workdir: bool,
    /// 临时目录的父目录，默认系统临时目录
    pub temp_root: Option<PathBuf>,
}

impl ConsolidateOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            template: None,
            spacing: Spacing::default(),
            insert_offset: (0.0, 0.0),
            content_only_singles: false,
            content_only_groups: true,
            extension: "dxf".to_string(),
            keep_workdir: false,
            temp_root: None,
        }
    }
}

/// 整理流程
#[derive(Debug)]
pub struct Consolidator {
    options: ConsolidateOptions,
    stage: Stage,
}

impl Consolidator {
    pub fn new(options: ConsolidateOptions) -> Self {
        Self {
            options,
            stage: Stage::Idle,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn options(&self) -> &ConsolidateOptions {
        &self.options
    }

    /// 执行一次完整整理
    pub fn run<S, E>(
        &mut self,
        sheets: &[S],
        exporter: &mut E,
    ) -> Result<ConsolidationReport, MergeError>
    where
        S: Sheet,
        E: SheetExporter<S> + ?Sized,
    {
        let mut report = ConsolidationReport::new();

        self.enter(Stage::Partitioning);
        if let Err(err) = self.check_preconditions() {
            self.enter(Stage::Failed);
            return Err(err);
        }
        let partition = partition(sheets);
        for sheet in &partition.unmatched_orders {
            report.warn(format!(
                "Sheet '{}' has a merge order but no group key, exported as a single sheet",
                sheet.identifier()
            ));
        }
        info!(
            "{} sheets: {} singles, {} groups",
            partition.len(),
            partition.singles.len(),
            partition.groups.len()
        );

        self.enter(Stage::Exporting);
        let workdir = match WorkDir::create(self.options.temp_root.as_deref()) {
            Ok(workdir) => workdir,
            Err(err) => {
                self.enter(Stage::Failed);
                return Err(err);
            }
        };

        let result = self.process(&partition, exporter, workdir.path(), &mut report);

        self.enter(Stage::Cleanup);
        workdir.cleanup(self.options.keep_workdir, &mut report);

        match result {
            Ok(()) => {
                self.enter(Stage::Done);
                report.stage = Stage::Done;
                report.finished_at = Some(Utc::now());
                info!(
                    "Consolidation finished: {} succeeded, {} failed",
                    report.succeeded().count(),
                    report.failed().count()
                );
                Ok(report)
            }
            Err(err) => {
                self.enter(Stage::Failed);
                Err(err)
            }
        }
    }

    fn enter(&mut self, stage: Stage) {
        debug!("Stage {:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }

    fn check_preconditions(&self) -> Result<(), MergeError> {
        if let Some(template) = &self.options.template {
            if !template.is_file() {
                return Err(MergeError::TemplateMissing(template.clone()));
            }
        }
        fs::create_dir_all(&self.options.output_dir)
            .map_err(MergeError::io(&self.options.output_dir))
    }

    fn process<S, E>(
        &mut self,
        partition: &Partition<'_, S>,
        exporter: &mut E,
        workdir: &Path,
        report: &mut ConsolidationReport,
    ) -> Result<(), MergeError>
    where
        S: Sheet,
        E: SheetExporter<S> + ?Sized,
    {
        let groups = partition.sorted_groups();
        let mut all: Vec<&S> = partition.singles.clone();
        all.extend(groups.iter().flat_map(|(_, entries)| entries.iter().map(|e| e.sheet)));

        if let Err(err) = exporter.export(&all, workdir) {
            report.warn(format!("Sheet export reported an error: {err}"));
        }

        self.enter(Stage::Promoting);
        let mut locator =
            FileLocator::scan(workdir, &self.options.extension).map_err(MergeError::io(workdir))?;
        debug!("{} exported files in {}", locator.len(), workdir.display());

        for sheet in &partition.singles {
            let deliverable = self.deliver_single(sheet.identifier(), &mut locator);
            report.deliverables.push(deliverable);
        }

        let mut prepared = Vec::with_capacity(groups.len());
        for (key, entries) in &groups {
            prepared.push(self.prepare_group(key, entries, &mut locator));
        }

        self.enter(Stage::Merging);
        for group in prepared {
            let deliverable = self.merge_group(group);
            report.deliverables.push(deliverable);
        }
        Ok(())
    }

    /// 单张图纸：提升后复制到输出目录，沿用导出文件名
    fn deliver_single(&self, id: &str, locator: &mut FileLocator) -> Deliverable {
        let mut deliverable = Deliverable::single(id);
        let Some(exported) = locator.claim(id) else {
            return deliverable.fail(format!("No exported file found for sheet '{id}'"));
        };
        let Some(file_name) = exported.file_name() else {
            return deliverable.fail(format!(
                "Exported path {} has no file name",
                exported.display()
            ));
        };
        let output = self.options.output_dir.join(file_name);

        match promote_file(&exported, self.options.content_only_singles) {
            Ok(outcome) => deliverable.note(format!("promotion: {outcome:?}")),
            Err(err) => return deliverable.fail(format!("Promotion failed: {err}")),
        }
        match fs::copy(&exported, &output) {
            Ok(_) => {
                info!("Single sheet '{}' -> {}", id, output.display());
                deliverable.succeed(output)
            }
            Err(err) => deliverable.fail(format!("Cannot write {}: {err}", output.display())),
        }
    }

    /// 分组：逐个查找并提升组内图纸
    fn prepare_group<'s, S: Sheet>(
        &self,
        key: &str,
        entries: &[GroupEntry<'s, S>],
        locator: &mut FileLocator,
    ) -> PreparedGroup<'s, S> {
        let members: Vec<String> = entries
            .iter()
            .map(|e| e.sheet.identifier().to_string())
            .collect();
        let name = entries
            .first()
            .map(|e| build_combined_name(e.sheet.identifier(), key))
            .unwrap_or_else(|| format!("Group-{key}"));

        let mut deliverable = Deliverable::group(name, key, members);
        let mut sources = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = entry.sheet.identifier();
            let Some(exported) = locator.claim(id) else {
                deliverable.note(format!("No exported file found for sheet '{id}', skipped"));
                continue;
            };
            match promote_file(&exported, self.options.content_only_groups) {
                Ok(outcome) => {
                    debug!("Group {} member '{}' promotion: {:?}", key, id, outcome);
                    sources.push(exported);
                }
                Err(err) => deliverable.note(format!("Promotion of '{id}' failed, skipped: {err}")),
            }
        }

        PreparedGroup {
            deliverable,
            sheets: entries.iter().map(|e| e.sheet).collect(),
            sources,
        }
    }

    fn merge_group<S: Sheet>(&self, group: PreparedGroup<'_, S>) -> Deliverable {
        let PreparedGroup {
            mut deliverable,
            sheets,
            sources,
        } = group;
        let output = self
            .options
            .output_dir
            .join(format!("{}.{}", deliverable.name, self.options.extension));
        let spacing = self.options.spacing.resolve(&sheets);
        let (offset_x, offset_y) = self.options.insert_offset;

        let result = match &self.options.template {
            Some(template) => {
                merge_into_template(&sources, template, &output, spacing, offset_x, offset_y)
            }
            None => merge_flat(&sources, &output, spacing),
        };
        match result {
            Ok(merge) => {
                record_merge(&mut deliverable, &merge);
                info!(
                    "Group '{}' -> {} ({} sheets)",
                    deliverable.name,
                    output.display(),
                    merge.placed.len()
                );
                deliverable.succeed(output)
            }
            Err(err) => deliverable.fail(format!("Merge failed: {err}")),
        }
    }
}

/// 提升完成、等待合并的分组
struct PreparedGroup<'s, S> {
    deliverable: Deliverable,
    sheets: Vec<&'s S>,
    sources: Vec<PathBuf>,
}

fn record_merge(deliverable: &mut Deliverable, merge: &MergeReport) {
    for skipped in &merge.skipped {
        deliverable.note(format!(
            "{} skipped: {}",
            skipped.source.display(),
            skipped.reason
        ));
    }
    for warning in &merge.warnings {
        deliverable.note(warning.clone());
    }
}

/// 本次调用私有的临时目录
struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    fn create(root: Option<&Path>) -> Result<Self, MergeError> {
        let root = root.map(Path::to_path_buf).unwrap_or_else(env::temp_dir);
        let path = root.join(format!("zcad-consolidate-{}", Uuid::new_v4().simple()));
        fs::create_dir_all(&path).map_err(MergeError::io(&path))?;
        debug!("Working directory {}", path.display());
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn cleanup(self, keep: bool, report: &mut ConsolidationReport) {
        if keep {
            info!("Keeping working directory {}", self.path.display());
            return;
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed working directory {}", self.path.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("Working directory {} already gone", self.path.display());
            }
            Err(err) => report.warn(format!(
                "Cannot remove working directory {}: {err}",
                self.path.display()
            )),
        }
    }
}
