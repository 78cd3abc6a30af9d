//! 图号命名规则
//!
//! 图号形如 `E-7-05_PanelLayout--2`：
//! - `-7-05_` 为分组标记，`05` 为组号
//! - 末尾 `--2` 为组内合并顺序
//! - 组号之前为前缀，组号与顺序之间为标题
//!
//! 所有函数都是全函数：不匹配时返回 `None`，调用方据此回退为单张处理。

use once_cell::sync::Lazy;
use regex::Regex;

/// 末尾的合并顺序标记，只认 ASCII `--`
static MERGE_ORDER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"--\s*(\d+)\s*$").ok());

/// 任意位置的分组标记
static GROUP_KEY: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?i)-7-\s*(\d+)\s*_").ok());

/// 完整图号：前缀 `-7-` 组号 `_` 标题 [`--` 顺序]
static NAME_PARTS: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?is)^(.+?)-7-\s*(\d+)\s*_(.*?)(?:--\s*\d+\s*)?$").ok());

/// 文件名中不允许出现的字符
const ILLEGAL_FILE_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// 图号拆分结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameParts {
    pub prefix: String,
    pub group: String,
    pub title: String,
}

/// 把 en-dash / em-dash 等破折号统一为 ASCII `-`
pub fn normalize_dashes(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            '\u{2010}'..='\u{2015}' | '\u{2212}' | '\u{FE58}' | '\u{FE63}' | '\u{FF0D}' => '-',
            other => other,
        })
        .collect()
}

/// 解析末尾 `--N` 合并顺序；数字超出 `i32` 范围视为不存在
pub fn parse_merge_order(id: &str) -> Option<i32> {
    let captures = MERGE_ORDER.as_ref()?.captures(id)?;
    captures.get(1)?.as_str().parse().ok()
}

/// 解析 `-7-NN_` 组号（破折号统一后匹配）
pub fn parse_group_key(id: &str) -> Option<String> {
    let normalized = normalize_dashes(id);
    let captures = GROUP_KEY.as_ref()?.captures(&normalized)?;
    let key = captures.get(1)?.as_str().trim();
    (!key.is_empty()).then(|| key.to_string())
}

/// 按完整语法拆分图号，任一部分为空时返回 `None`
pub fn parse_name_parts(id: &str) -> Option<NameParts> {
    let normalized = normalize_dashes(id);
    let captures = NAME_PARTS.as_ref()?.captures(&normalized)?;

    let prefix = trim_separators(captures.get(1)?.as_str());
    let group = trim_separators(captures.get(2)?.as_str());
    let title = trim_separators(&strip_illegal(captures.get(3)?.as_str())).to_string();

    if prefix.is_empty() || group.is_empty() || title.is_empty() {
        return None;
    }
    Some(NameParts {
        prefix: prefix.to_string(),
        group: group.to_string(),
        title,
    })
}

/// 去掉首尾的分隔符（空白、`-`、`_`、`.`）
pub fn trim_separators(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '_' | '.'))
}

/// 删除文件名非法字符与控制字符
pub fn strip_illegal(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_control() && !ILLEGAL_FILE_CHARS.contains(c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_order() {
        assert_eq!(parse_merge_order("E-7-05_PanelLayout--2"), Some(2));
        assert_eq!(parse_merge_order("E-7-05_PanelLayout-- 12  "), Some(12));
        assert_eq!(parse_merge_order("A-1"), None);
        assert_eq!(parse_merge_order("A--2x"), None);
        // 破折号不做统一
        assert_eq!(parse_merge_order("A\u{2013}\u{2013}2"), None);
        assert_eq!(parse_merge_order("A--99999999999"), None);
    }

    #[test]
    fn test_group_key() {
        assert_eq!(parse_group_key("E-7-05_X").as_deref(), Some("05"));
        assert_eq!(parse_group_key("E-7- 12 _X").as_deref(), Some("12"));
        assert_eq!(parse_group_key("E-8-05_X"), None);
        assert_eq!(parse_group_key("E-7-05X"), None);
    }

    #[test]
    fn test_dash_glyphs_are_equivalent() {
        let ascii = parse_group_key("E-7-05_X");
        assert_eq!(parse_group_key("E\u{2013}7\u{2013}05_X"), ascii);
        assert_eq!(parse_group_key("E\u{2014}7\u{2014}05_X"), ascii);
        assert_eq!(
            parse_name_parts("E\u{2013}7\u{2013}05_PanelLayout--2"),
            parse_name_parts("E-7-05_PanelLayout--2")
        );
    }

    #[test]
    fn test_name_parts() {
        let parts = parse_name_parts("E-7-05_PanelLayout--2").unwrap();
        assert_eq!(
            parts,
            NameParts {
                prefix: "E".to_string(),
                group: "05".to_string(),
                title: "PanelLayout".to_string(),
            }
        );

        // 没有顺序标记也可以拆分
        let parts = parse_name_parts("PRJ.E -7- 3_ Riser: Diagram ").unwrap();
        assert_eq!(parts.prefix, "PRJ.E");
        assert_eq!(parts.group, "3");
        assert_eq!(parts.title, "Riser Diagram");
    }

    #[test]
    fn test_name_parts_first_marker_wins() {
        let parts = parse_name_parts("A-7-01_B-7-02_C--3").unwrap();
        assert_eq!(parts.prefix, "A");
        assert_eq!(parts.group, "01");
        assert_eq!(parts.title, "B-7-02_C");
    }

    #[test]
    fn test_name_parts_rejects_empty_parts() {
        assert!(parse_name_parts("-7-05_Title").is_none());
        assert!(parse_name_parts("E-7-05_--2").is_none());
        assert!(parse_name_parts("E-7-05_?*").is_none());
        assert!(parse_name_parts("").is_none());
        assert!(parse_name_parts("E-1").is_none());
    }
}
