//! 命令行配置文件

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use zcad_merge::{ConsolidateOptions, Spacing, DEFAULT_SPACING};

/// 配置根结构
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl AppConfig {
    /// 从显式路径加载配置
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `ZCAD_CONFIG`，否则寻找
    /// `./config/consolidate.toml`，都不存在时返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("ZCAD_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("consolidate.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }

    /// 转换为整理选项
    pub fn to_options(&self, output_dir: impl Into<PathBuf>) -> ConsolidateOptions {
        let mut options = ConsolidateOptions::new(output_dir);
        options.template = self.merge.template.clone();
        options.spacing = self.merge.spacing.into();
        options.insert_offset = (self.merge.insert_offset[0], self.merge.insert_offset[1]);
        options.content_only_singles = self.merge.content_only_singles;
        options.content_only_groups = self.merge.content_only_groups;
        options.extension = self.output.extension.trim_start_matches('.').to_string();
        options.keep_workdir = self.output.keep_workdir;
        options.temp_root = self.output.temp_root.clone();
        options
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 间距：数值或 `"auto"`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SpacingSetting {
    Fixed(f64),
    Keyword(SpacingKeyword),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpacingKeyword {
    Auto,
}

impl Default for SpacingSetting {
    fn default() -> Self {
        SpacingSetting::Fixed(DEFAULT_SPACING)
    }
}

impl From<SpacingSetting> for Spacing {
    fn from(setting: SpacingSetting) -> Self {
        match setting {
            SpacingSetting::Fixed(value) => Spacing::Fixed(value),
            SpacingSetting::Keyword(SpacingKeyword::Auto) => Spacing::Auto,
        }
    }
}

/// 合并配置
#[derive(Debug, Clone, Deserialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub template: Option<PathBuf>,
    #[serde(default)]
    pub spacing: SpacingSetting,
    #[serde(default)]
    pub insert_offset: [f64; 2],
    #[serde(default)]
    pub content_only_singles: bool,
    #[serde(default = "MergeConfig::default_content_only_groups")]
    pub content_only_groups: bool,
}

impl MergeConfig {
    fn default_content_only_groups() -> bool {
        true
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            template: None,
            spacing: SpacingSetting::default(),
            insert_offset: [0.0, 0.0],
            content_only_singles: false,
            content_only_groups: Self::default_content_only_groups(),
        }
    }
}

/// 输出配置
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "OutputConfig::default_extension")]
    pub extension: String,
    #[serde(default)]
    pub keep_workdir: bool,
    #[serde(default)]
    pub temp_root: Option<PathBuf>,
}

impl OutputConfig {
    fn default_extension() -> String {
        "dxf".to_string()
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            extension: Self::default_extension(),
            keep_workdir: false,
            temp_root: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.merge.spacing, SpacingSetting::Fixed(1000.0));
        assert!(cfg.merge.template.is_none());
        assert!(!cfg.merge.content_only_singles);
        assert!(cfg.merge.content_only_groups);
        assert_eq!(cfg.output.extension, "dxf");

        let options = cfg.to_options("out");
        assert_eq!(options.output_dir, PathBuf::from("out"));
        assert_eq!(options.spacing, Spacing::Fixed(1000.0));
        assert_eq!(options.insert_offset, (0.0, 0.0));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [logging]
            level = "debug"

            [merge]
            template = "templates/A1.dxf"
            spacing = "auto"
            insert_offset = [50.0, -25.0]
            content_only_groups = false

            [output]
            extension = ".DXF"
            keep_workdir = true
            temp_root = "/var/tmp"
            "#
        )
        .unwrap();

        let cfg = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.merge.spacing, SpacingSetting::Keyword(SpacingKeyword::Auto));
        assert!(!cfg.merge.content_only_groups);

        let options = cfg.to_options("out");
        assert_eq!(options.template, Some(PathBuf::from("templates/A1.dxf")));
        assert_eq!(options.spacing, Spacing::Auto);
        assert_eq!(options.insert_offset, (50.0, -25.0));
        assert_eq!(options.extension, "DXF");
        assert!(options.keep_workdir);
        assert_eq!(options.temp_root, Some(PathBuf::from("/var/tmp")));
    }

    #[test]
    fn test_numeric_spacing_and_partial_file() {
        let cfg: AppConfig = toml::from_str("[merge]\nspacing = 420\n").unwrap();
        assert_eq!(cfg.merge.spacing, SpacingSetting::Fixed(420.0));
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.merge.content_only_groups);
    }

    #[test]
    fn test_parse_error_keeps_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[merge]\nspacing = \"wide\"").unwrap();
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { ref path, .. } if path == file.path()));
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::from_file("/nonexistent/consolidate.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
