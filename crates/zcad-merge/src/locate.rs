//! 按图号查找导出文件
//!
//! 导出文件名通常形如 `{项目} - {图号} - {标题}.dxf`：
//! 先找包含 `" - {图号} - "` 的文件，再退而求其次找以完整图号出现的文件
//! （图号前后不能紧接字母数字，之后也不能紧接 `-` 或 `.`，`A-1` 不会匹配 `A-10`）。
//! 已被其他图纸认领的文件不会再次返回。

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct FileLocator {
    files: Vec<PathBuf>,
    claimed: HashSet<usize>,
}

impl FileLocator {
    pub fn new(mut files: Vec<PathBuf>) -> Self {
        files.sort();
        Self {
            files,
            claimed: HashSet::new(),
        }
    }

    /// 列出目录中指定扩展名的文件（扩展名不区分大小写）
    pub fn scan(dir: &Path, extension: &str) -> io::Result<Self> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let matches = path
                .extension()
                .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(extension));
            if matches && path.is_file() {
                files.push(path);
            }
        }
        Ok(Self::new(files))
    }

    /// 查找但不认领
    pub fn find(&self, identifier: &str) -> Option<&Path> {
        self.position(identifier).map(|i| self.files[i].as_path())
    }

    /// 查找并认领
    pub fn claim(&mut self, identifier: &str) -> Option<PathBuf> {
        let index = self.position(identifier)?;
        self.claimed.insert(index);
        Some(self.files[index].clone())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn position(&self, identifier: &str) -> Option<usize> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return None;
        }
        let delimited = format!(" - {identifier} - ");
        self.first_unclaimed(|name| name.contains(&delimited))
            .or_else(|| self.first_unclaimed(|name| contains_whole(name, identifier)))
    }

    fn first_unclaimed(&self, matches: impl Fn(&str) -> bool) -> Option<usize> {
        self.files.iter().enumerate().position(|(i, path)| {
            !self.claimed.contains(&i)
                && path
                    .file_stem()
                    .is_some_and(|stem| matches(&stem.to_string_lossy()))
        })
    }
}

/// `haystack` 中是否有一处完整的 `identifier`
fn contains_whole(haystack: &str, identifier: &str) -> bool {
    haystack.match_indices(identifier).any(|(start, matched)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + matched.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric)
            && !after.is_some_and(|c| c.is_alphanumeric() || c == '-' || c == '.')
    })
}
