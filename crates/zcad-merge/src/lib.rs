//! ZCAD 图纸合并流水线
//!
//! 把逐张导出的图纸文件整理成更少的交付文件：
//! 1. 按图号命名规则分组（[`naming`], [`partition`]）
//! 2. 把图纸布局内容按视口对齐提升到模型空间（[`promote`]）
//! 3. 同组图纸合并为一个文件，可选套入模板（[`merge`]）
//! 4. [`orchestrator`] 串联以上步骤并负责临时目录
//!
//! # 示例
//!
//! ```rust
//! use zcad_merge::partition::partition;
//!
//! let sheets = ["A-1", "B-7-01_Foo--1", "C-7-01_Bar--2", "D-2"];
//! let result = partition(&sheets);
//! assert_eq!(result.singles.len(), 2);
//! assert_eq!(result.groups["01"].len(), 2);
//! assert_eq!(zcad_merge::file_name::build_combined_name("B-7-01_Foo--1", "01"), "B-7-01_Foo");
//! ```

pub mod error;
pub mod file_name;
pub mod locate;
pub mod merge;
pub mod naming;
pub mod orchestrator;
pub mod partition;
pub mod promote;
pub mod report;

pub use error::MergeError;
pub use merge::{merge_flat, merge_into_template, MergeReport};
pub use orchestrator::{
    ConsolidateOptions, Consolidator, ExportError, SheetExporter, Spacing, Stage, DEFAULT_SPACING,
};
pub use partition::{partition, GroupEntry, Partition, Sheet, SheetInfo};
pub use promote::{promote_document, promote_file, Promotion, PromotionOutcome};
pub use report::{ConsolidationReport, Deliverable, DeliverableKind};
