//! 整理结果报告

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::orchestrator::Stage;

/// 交付物类型
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliverableKind {
    Single { sheet: String },
    Group { key: String, members: Vec<String> },
}

/// 一个交付文件（单张图纸或一个分组）
#[derive(Debug, Clone, Serialize)]
pub struct Deliverable {
    pub name: String,
    pub kind: DeliverableKind,
    pub output: Option<PathBuf>,
    pub success: bool,
    /// 处理过程中记录的消息
    pub messages: Vec<String>,
}

impl Deliverable {
    pub fn single(sheet: &str) -> Self {
        Self {
            name: sheet.to_string(),
            kind: DeliverableKind::Single {
                sheet: sheet.to_string(),
            },
            output: None,
            success: false,
            messages: Vec::new(),
        }
    }

    pub fn group(name: impl Into<String>, key: &str, members: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: DeliverableKind::Group {
                key: key.to_string(),
                members,
            },
            output: None,
            success: false,
            messages: Vec::new(),
        }
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub(crate) fn succeed(mut self, output: PathBuf) -> Self {
        self.output = Some(output);
        self.success = true;
        self
    }

    pub(crate) fn fail(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::warn!("{}: {}", self.name, message);
        self.messages.push(message);
        self.success = false;
        self
    }
}

/// 一次整理的完整报告
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidationReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stage: Stage,
    pub deliverables: Vec<Deliverable>,
    pub warnings: Vec<String>,
}

impl Default for ConsolidationReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsolidationReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            stage: Stage::Idle,
            deliverables: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &Deliverable> {
        self.deliverables.iter().filter(|d| d.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &Deliverable> {
        self.deliverables.iter().filter(|d| !d.success)
    }

    /// 所有交付物都成功
    pub fn all_succeeded(&self) -> bool {
        self.deliverables.iter().all(|d| d.success)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
