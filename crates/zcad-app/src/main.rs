//! ZCAD 图纸整理命令行入口
//!
//! 子命令：
//! - `plan`：只做分组，打印每个交付文件的名称与成员
//! - `promote`：把一个文件的图纸布局提升到模型空间（原地改写）
//! - `merge`：合并若干文件，可选套入模板
//! - `consolidate`：完整流程，从导出目录到输出目录
//! - `inspect`：查看文件的布局、块与实体数量

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use zcad_merge::file_name::build_combined_name;
use zcad_merge::{
    merge_flat, merge_into_template, partition, promote_file, Consolidator, SheetInfo, Spacing,
};

mod config;
mod exporter;

use config::{AppConfig, ConfigError};
use exporter::{describe_sheets, sheet_ids_in_dir, sheet_info_from_file, DirectoryExporter};

#[derive(Parser)]
#[command(name = "zcad-consolidate", version, about = "按图号分组整理导出的 DXF 图纸")]
struct Cli {
    /// 配置文件路径，默认读取 `ZCAD_CONFIG` 或 `./config/consolidate.toml`
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// 把结果以 JSON 写入该文件
    #[arg(long, global = true, value_name = "FILE")]
    report: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 打印分组计划
    Plan {
        #[arg(required = true)]
        sheets: Vec<String>,
    },
    /// 把图纸布局内容提升到模型空间
    Promote {
        file: PathBuf,
        /// 只保留视口内容，丢弃图框等图纸空间实体
        #[arg(long)]
        content_only: bool,
    },
    /// 合并多个文件
    Merge {
        output: PathBuf,
        #[arg(required = true)]
        sources: Vec<PathBuf>,
        #[arg(long)]
        template: Option<PathBuf>,
        /// 间距，数值或 `auto`
        #[arg(long, value_parser = parse_spacing)]
        spacing: Option<Spacing>,
        #[arg(long, allow_negative_numbers = true)]
        offset_x: Option<f64>,
        #[arg(long, allow_negative_numbers = true)]
        offset_y: Option<f64>,
    },
    /// 完整整理流程
    Consolidate {
        /// 已导出图纸所在目录
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// 要整理的图号，缺省时取输入目录中的全部文件
        #[arg(long = "sheet", value_name = "ID")]
        sheets: Vec<String>,
        #[arg(long)]
        template: Option<PathBuf>,
        #[arg(long, value_parser = parse_spacing)]
        spacing: Option<Spacing>,
        #[arg(long)]
        keep_workdir: bool,
    },
    /// 查看文件结构
    Inspect { file: PathBuf },
}

fn parse_spacing(value: &str) -> Result<Spacing, String> {
    if value.trim().eq_ignore_ascii_case("auto") {
        return Ok(Spacing::Auto);
    }
    match value.trim().parse::<f64>() {
        Ok(spacing) if spacing.is_finite() && spacing > 0.0 => Ok(Spacing::Fixed(spacing)),
        _ => Err(format!("expected a positive number or `auto`, got `{value}`")),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, config_error) = load_configuration(cli.config.as_deref());
    init_logging(&config);
    if let Some(err) = config_error {
        match &err {
            ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                warn!(path = %path.display(), error = %err, "加载配置失败，使用内建默认值");
            }
            ConfigError::Context { .. } => {
                warn!(error = %err, "加载配置失败，使用内建默认值");
            }
        }
    }

    let report = cli.report.as_deref();
    match cli.command {
        Command::Plan { sheets } => plan(&sheets, report),
        Command::Promote { file, content_only } => promote(&file, content_only, report),
        Command::Merge {
            output,
            sources,
            template,
            spacing,
            offset_x,
            offset_y,
        } => {
            let template = template.or_else(|| config.merge.template.clone());
            let spacing = spacing.unwrap_or_else(|| config.merge.spacing.into());
            let offset = (
                offset_x.unwrap_or(config.merge.insert_offset[0]),
                offset_y.unwrap_or(config.merge.insert_offset[1]),
            );
            merge(&output, &sources, template.as_deref(), spacing, offset, report)
        }
        Command::Consolidate {
            input,
            output,
            sheets,
            template,
            spacing,
            keep_workdir,
        } => {
            let mut options = config.to_options(output);
            if template.is_some() {
                options.template = template;
            }
            if let Some(spacing) = spacing {
                options.spacing = spacing;
            }
            options.keep_workdir |= keep_workdir;
            consolidate(&input, sheets, options, report)
        }
        Command::Inspect { file } => inspect(&file, report),
    }
}

fn load_configuration(path: Option<&Path>) -> (AppConfig, Option<ConfigError>) {
    let loaded = match path {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::discover(),
    };
    match loaded {
        Ok(config) => (config, None),
        Err(err) => (AppConfig::default(), Some(err)),
    }
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if let Err(err) = subscriber.try_init() {
        eprintln!("日志初始化失败：{err}");
    }
}

fn write_report<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let json = serde_json::to_string_pretty(value).context("序列化报告失败")?;
    fs::write(path, json).with_context(|| format!("写入报告 {} 失败", path.display()))?;
    info!("Report written to {}", path.display());
    Ok(())
}

#[derive(Debug, Serialize)]
struct PlannedGroup {
    key: String,
    name: String,
    members: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Plan {
    singles: Vec<String>,
    groups: Vec<PlannedGroup>,
    unmatched_orders: Vec<String>,
}

fn plan(sheets: &[String], report: Option<&Path>) -> Result<()> {
    let result = partition(sheets);
    let plan = Plan {
        singles: result.singles.iter().map(|s| s.to_string()).collect(),
        groups: result
            .sorted_groups()
            .into_iter()
            .map(|(key, entries)| PlannedGroup {
                key: key.to_string(),
                name: entries
                    .first()
                    .map(|e| build_combined_name(e.sheet, key))
                    .unwrap_or_else(|| format!("Group-{key}")),
                members: entries.iter().map(|e| e.sheet.to_string()).collect(),
            })
            .collect(),
        unmatched_orders: result.unmatched_orders.iter().map(|s| s.to_string()).collect(),
    };

    for single in &plan.singles {
        println!("single  {single}");
    }
    for group in &plan.groups {
        println!("group   {} -> {}", group.key, group.name);
        for member in &group.members {
            println!("          {member}");
        }
    }
    for sheet in &plan.unmatched_orders {
        println!("warning '{sheet}' has a merge order but no group key");
    }
    write_report(report, &plan)
}

fn promote(file: &Path, content_only: bool, report: Option<&Path>) -> Result<()> {
    let outcome = promote_file(file, content_only)
        .with_context(|| format!("提升 {} 失败", file.display()))?;
    println!("{}: {:?}", file.display(), outcome);
    write_report(report, &outcome)
}

fn merge(
    output: &Path,
    sources: &[PathBuf],
    template: Option<&Path>,
    spacing: Spacing,
    (offset_x, offset_y): (f64, f64),
    report: Option<&Path>,
) -> Result<()> {
    let sheets: Vec<SheetInfo> = sources
        .iter()
        .map(|path| sheet_info_from_file(path.display().to_string(), path))
        .collect();
    let refs: Vec<&SheetInfo> = sheets.iter().collect();
    let spacing = spacing.resolve(&refs);

    let result = match template {
        Some(template) => {
            merge_into_template(sources, template, output, spacing, offset_x, offset_y)
        }
        None => merge_flat(sources, output, spacing),
    }
    .with_context(|| format!("合并到 {} 失败", output.display()))?;

    for placed in &result.placed {
        println!(
            "placed  {} as '{}' at ({}, {})",
            placed.source.display(),
            placed.block,
            placed.position.0,
            placed.position.1
        );
    }
    for skipped in &result.skipped {
        println!("skipped {}: {}", skipped.source.display(), skipped.reason);
    }
    for warning in &result.warnings {
        println!("warning {warning}");
    }
    write_report(report, &result)
}

fn consolidate(
    input: &Path,
    sheets: Vec<String>,
    options: zcad_merge::ConsolidateOptions,
    report: Option<&Path>,
) -> Result<()> {
    let ids = if sheets.is_empty() {
        sheet_ids_in_dir(input, &options.extension)
            .with_context(|| format!("无法读取输入目录 {}", input.display()))?
    } else {
        sheets
    };
    if ids.is_empty() {
        bail!("{} 中没有可整理的图纸", input.display());
    }

    let sheets = describe_sheets(input, &options.extension, &ids);
    let mut exporter = DirectoryExporter::new(input, options.extension.clone());
    let mut consolidator = Consolidator::new(options);
    let result = consolidator.run(&sheets, &mut exporter)?;

    for deliverable in &result.deliverables {
        let status = if deliverable.success { "ok" } else { "FAILED" };
        match &deliverable.output {
            Some(output) => println!("{status:<6} {} -> {}", deliverable.name, output.display()),
            None => println!("{status:<6} {}", deliverable.name),
        }
        for message in &deliverable.messages {
            println!("         {message}");
        }
    }
    for warning in &result.warnings {
        println!("warning {warning}");
    }
    write_report(report, &result)?;

    let failed = result.failed().count();
    if failed > 0 {
        bail!("{failed} 个交付文件失败");
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct LayoutSummary {
    name: String,
    tab_order: i32,
    block: String,
    entities: usize,
    viewports: usize,
}

#[derive(Debug, Serialize)]
struct Inspection {
    layers: usize,
    layouts: Vec<LayoutSummary>,
    blocks: Vec<String>,
    content_block: Option<String>,
    world_entities: usize,
    /// `[min_x, min_y, max_x, max_y]`
    model_extents: Option<[f64; 4]>,
}

fn inspect(file: &Path, report: Option<&Path>) -> Result<()> {
    let doc = zcad_file::load(file).with_context(|| format!("读取 {} 失败", file.display()))?;

    let mut layouts = Vec::new();
    for layout in doc.layouts() {
        let block = doc.block(layout.block)?;
        layouts.push(LayoutSummary {
            name: layout.name.clone(),
            tab_order: layout.tab_order,
            block: block.name.clone(),
            entities: block.entities.len(),
            viewports: block.entities.iter().filter(|e| e.is_viewport()).count(),
        });
    }
    let content_block = match doc.content_block() {
        Some(id) => Some(doc.block(id)?.name.clone()),
        None => None,
    };
    let world_entities = match doc.model_block() {
        Some(model) => doc.world_geometry(model)?.len(),
        None => 0,
    };
    let model_extents = doc
        .model_extents()?
        .map(|b| [b.min.x, b.min.y, b.max.x, b.max.y]);
    let inspection = Inspection {
        layers: doc.layers.len(),
        layouts,
        blocks: doc
            .blocks()
            .filter(|(_, b)| !b.is_reserved())
            .map(|(_, b)| b.name.clone())
            .collect(),
        content_block,
        world_entities,
        model_extents,
    };

    println!("{}", file.display());
    println!("  layers: {}", inspection.layers);
    for layout in &inspection.layouts {
        println!(
            "  layout '{}' (tab {}) block '{}': {} entities, {} viewports",
            layout.name, layout.tab_order, layout.block, layout.entities, layout.viewports
        );
    }
    println!("  blocks: {}", inspection.blocks.join(", "));
    if let Some(name) = &inspection.content_block {
        println!("  content block: {name}");
    }
    println!("  model space entities (world): {}", inspection.world_entities);
    if let Some([x0, y0, x1, y1]) = inspection.model_extents {
        println!("  model extents: ({x0:.3}, {y0:.3}) - ({x1:.3}, {y1:.3})");
    }
    write_report(report, &inspection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_init_logging_twice() {
        let config = AppConfig::default();
        init_logging(&config);
        init_logging(&config);
        tracing::info!("logging initialised");
    }

    #[test]
    fn test_parse_spacing() {
        assert_eq!(parse_spacing("auto"), Ok(Spacing::Auto));
        assert_eq!(parse_spacing(" AUTO "), Ok(Spacing::Auto));
        assert_eq!(parse_spacing("750"), Ok(Spacing::Fixed(750.0)));
        assert!(parse_spacing("0").is_err());
        assert!(parse_spacing("wide").is_err());
    }

    #[test]
    fn test_consolidate_arguments() {
        let cli = Cli::parse_from([
            "zcad-consolidate",
            "consolidate",
            "--input",
            "in",
            "--output",
            "out",
            "--sheet",
            "A-1",
            "--sheet",
            "B-7-01_Foo--1",
            "--spacing",
            "auto",
            "--report",
            "report.json",
        ]);
        assert_eq!(cli.report, Some(PathBuf::from("report.json")));
        match cli.command {
            Command::Consolidate {
                sheets, spacing, ..
            } => {
                assert_eq!(sheets, vec!["A-1".to_string(), "B-7-01_Foo--1".to_string()]);
                assert_eq!(spacing, Some(Spacing::Auto));
            }
            _ => panic!("expected consolidate"),
        }
    }

    #[test]
    fn test_merge_accepts_negative_offsets() {
        let cli = Cli::parse_from([
            "zcad-consolidate",
            "merge",
            "out.dxf",
            "a.dxf",
            "b.dxf",
            "--offset-y",
            "-25",
        ]);
        match cli.command {
            Command::Merge {
                sources, offset_y, ..
            } => {
                assert_eq!(sources.len(), 2);
                assert_eq!(offset_y, Some(-25.0));
            }
            _ => panic!("expected merge"),
        }
    }

    #[test]
    fn test_inspect_reports_model_extents() {
        use zcad_core::prelude::*;

        let dir = tempfile::tempdir().unwrap();
        let mut doc = Document::new();
        let model = doc.model_block().unwrap();
        let line = Line::new(Point2::new(10.0, 20.0), Point2::new(110.0, 70.0));
        doc.add_entity(model, Entity::new(Geometry::Line(line))).unwrap();
        let file = dir.path().join("sheet.dxf");
        zcad_file::save(&doc, &file).unwrap();

        let report = dir.path().join("inspect.json");
        inspect(&file, Some(report.as_path())).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
        assert_eq!(json["world_entities"], 1);
        assert_eq!(
            json["model_extents"],
            serde_json::json!([10.0, 20.0, 110.0, 70.0])
        );
    }
}
