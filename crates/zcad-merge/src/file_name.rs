//! 输出文件命名

use std::path::Path;

use crate::naming::{normalize_dashes, parse_name_parts, strip_illegal, trim_separators};

/// DXF 块名中不允许出现的字符
const ILLEGAL_BLOCK_CHARS: &[char] = &['<', '>', '/', '\\', '"', ':', ';', '?', '*', '|', ',', '=', '`'];

/// 由组内代表图号生成合并文件名（不含扩展名）
///
/// - 能完整拆分时：`{前缀}-7-{组号}_{标题}`，组号取自图号本身
/// - 否则图号中 `-7-` 之前有内容时：`{前缀}-7-{group_key}`
/// - 其余情况：`Group-{group_key}`
///
/// 结果不会为空。
pub fn build_combined_name(representative: &str, group_key: &str) -> String {
    if let Some(parts) = parse_name_parts(representative) {
        let prefix = strip_illegal(&parts.prefix);
        let prefix = trim_separators(&prefix);
        if !prefix.is_empty() {
            return format!("{}-7-{}_{}", prefix, parts.group, parts.title);
        }
    }

    let key = strip_illegal(group_key);
    let key = trim_separators(&key);
    let normalized = normalize_dashes(representative);
    if let Some(position) = normalized.find("-7-").filter(|&p| p > 0) {
        let prefix = strip_illegal(&normalized[..position]);
        let prefix = trim_separators(&prefix);
        if !prefix.is_empty() {
            return format!("{prefix}-7-{key}");
        }
    }
    format!("Group-{key}")
}

/// 由文件路径生成块名：取文件名主干，替换块名非法字符
pub fn block_name_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name: String = stem
        .trim()
        .trim_start_matches('*')
        .chars()
        .map(|c| {
            if c.is_control() || ILLEGAL_BLOCK_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();
    if name.is_empty() {
        "SHEET".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_name_from_parts() {
        assert_eq!(build_combined_name("E-7-05_PanelLayout--2", "05"), "E-7-05_PanelLayout");
        assert_eq!(build_combined_name("B-7-01_Foo--1", "01"), "B-7-01_Foo");
        // 破折号统一为 ASCII
        assert_eq!(
            build_combined_name("E\u{2013}7\u{2013}05_PanelLayout--2", "05"),
            "E-7-05_PanelLayout"
        );
    }

    #[test]
    fn test_combined_name_fallbacks() {
        // 标题为空，拆分失败，但 `-7-` 前有前缀
        assert_eq!(build_combined_name("B-7-01_--1", "01"), "B-7-01");
        assert_eq!(build_combined_name(" B. -7-01_--1", "01"), "B-7-01");
        // `-7-` 在开头
        assert_eq!(build_combined_name("-7-03_X--1", "03"), "Group-03");
        // 没有 `-7-`
        assert_eq!(build_combined_name("whatever", "9"), "Group-9");
        assert_eq!(build_combined_name("", ""), "Group-");
    }

    #[test]
    fn test_block_name_from_path() {
        assert_eq!(
            block_name_from_path(Path::new("/tmp/P - E-7-05_A:B - x.dxf")),
            "P - E-7-05_A_B - x"
        );
        assert_eq!(block_name_from_path(Path::new("*U1.dxf")), "U1");
        assert_eq!(block_name_from_path(Path::new("")), "SHEET");
    }
}
