//! 图纸分组
//!
//! 同时带有合并顺序与组号的图纸进入对应分组，其余都是单张。

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::naming::{parse_group_key, parse_merge_order};

/// 图纸的只读视图
pub trait Sheet {
    /// 图号
    fn identifier(&self) -> &str;

    /// 图框尺寸（宽, 高），用于自动计算合并间距
    fn outline_size(&self) -> Option<(f64, f64)> {
        None
    }
}

impl Sheet for str {
    fn identifier(&self) -> &str {
        self
    }
}

impl Sheet for String {
    fn identifier(&self) -> &str {
        self
    }
}

impl<T: Sheet + ?Sized> Sheet for &T {
    fn identifier(&self) -> &str {
        (**self).identifier()
    }

    fn outline_size(&self) -> Option<(f64, f64)> {
        (**self).outline_size()
    }
}

/// 最简单的图纸描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetInfo {
    pub identifier: String,
    #[serde(default)]
    pub outline: Option<(f64, f64)>,
}

impl SheetInfo {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            outline: None,
        }
    }

    pub fn with_outline(mut self, width: f64, height: f64) -> Self {
        self.outline = Some((width, height));
        self
    }
}

impl Sheet for SheetInfo {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn outline_size(&self) -> Option<(f64, f64)> {
        self.outline
    }
}

/// 分组中的一项
#[derive(Debug)]
pub struct GroupEntry<'a, S: ?Sized> {
    pub sheet: &'a S,
    pub order: i32,
}

impl<S: ?Sized> Clone for GroupEntry<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ?Sized> Copy for GroupEntry<'_, S> {}

/// 分组结果
///
/// 每张图纸恰好出现一次：要么在 `singles`，要么在某个分组中。
#[derive(Debug)]
pub struct Partition<'a, S> {
    /// 单张图纸，保持输入顺序
    pub singles: Vec<&'a S>,
    /// 组号 -> 组内图纸（未排序）
    pub groups: BTreeMap<String, Vec<GroupEntry<'a, S>>>,
    /// 有合并顺序但没有组号的图纸（也在 `singles` 中）
    pub unmatched_orders: Vec<&'a S>,
}

impl<'a, S: Sheet> Partition<'a, S> {
    /// 按组号排列的分组，组内按顺序排好
    pub fn sorted_groups(&self) -> Vec<(&str, Vec<GroupEntry<'a, S>>)> {
        self.groups
            .iter()
            .map(|(key, entries)| {
                let mut entries = entries.clone();
                sort_entries(&mut entries);
                (key.as_str(), entries)
            })
            .collect()
    }

    /// 图纸总数
    pub fn len(&self) -> usize {
        self.singles.len() + self.groups.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 按图号分组
pub fn partition<S: Sheet>(sheets: &[S]) -> Partition<'_, S> {
    let mut result = Partition {
        singles: Vec::new(),
        groups: BTreeMap::new(),
        unmatched_orders: Vec::new(),
    };

    for sheet in sheets {
        let id = sheet.identifier();
        let Some(order) = parse_merge_order(id) else {
            result.singles.push(sheet);
            continue;
        };
        match parse_group_key(id) {
            Some(key) => {
                debug!("Sheet '{}' -> group {} order {}", id, key, order);
                result
                    .groups
                    .entry(key)
                    .or_default()
                    .push(GroupEntry { sheet, order });
            }
            None => {
                result.unmatched_orders.push(sheet);
                result.singles.push(sheet);
            }
        }
    }
    result
}

/// 组内排序：顺序升序，同序按图号（忽略大小写），再按原始图号
pub fn sort_entries<S: Sheet + ?Sized>(entries: &mut [GroupEntry<'_, S>]) {
    entries.sort_by(|a, b| compare_entries(a, b));
}

fn compare_entries<S: Sheet + ?Sized>(a: &GroupEntry<'_, S>, b: &GroupEntry<'_, S>) -> Ordering {
    let (ia, ib) = (a.sheet.identifier(), b.sheet.identifier());
    a.order
        .cmp(&b.order)
        .then_with(|| ia.to_lowercase().cmp(&ib.to_lowercase()))
        .then_with(|| ia.cmp(ib))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids<S: Sheet>(entries: &[GroupEntry<'_, S>]) -> Vec<(String, i32)> {
        entries
            .iter()
            .map(|e| (e.sheet.identifier().to_string(), e.order))
            .collect()
    }

    #[test]
    fn test_end_to_end_partition() {
        let sheets = ["A-1", "B-7-01_Foo--1", "C-7-01_Bar--2", "D-2"];
        let result = partition(&sheets);

        let singles: Vec<&str> = result.singles.iter().map(|s| s.identifier()).collect();
        assert_eq!(singles, vec!["A-1", "D-2"]);
        assert_eq!(result.groups.len(), 1);

        let groups = result.sorted_groups();
        assert_eq!(groups[0].0, "01");
        assert_eq!(
            ids(&groups[0].1),
            vec![("B-7-01_Foo--1".to_string(), 1), ("C-7-01_Bar--2".to_string(), 2)]
        );
    }

    #[test]
    fn test_partition_is_total() {
        let sheets: Vec<String> = vec![
            "X-7-02_A--3".into(),
            "X-7-02_B--1".into(),
            "plain".into(),
            "Y--4".into(),
            "Z-7-09_C--1".into(),
            "plain".into(),
        ];
        let result = partition(&sheets);
        assert_eq!(result.len(), sheets.len());
        assert_eq!(result.singles.len(), 3);
        assert_eq!(result.groups["02"].len(), 2);
        assert_eq!(result.groups["09"].len(), 1);
    }

    #[test]
    fn test_order_without_group_is_single() {
        let sheets = ["Y--4", "E-7-05_Title"];
        let result = partition(&sheets);
        assert_eq!(result.singles.len(), 2);
        assert!(result.groups.is_empty());
        assert_eq!(result.unmatched_orders.len(), 1);
        assert_eq!(result.unmatched_orders[0].identifier(), "Y--4");
    }

    #[test]
    fn test_sort_is_independent_of_input_order() {
        let forward = ["e-7-01_b--1", "E-7-01_A--1", "E-7-01_B--1", "E-7-01_Z--0"];
        let mut backward = forward;
        backward.reverse();

        let forward_partition = partition(&forward);
        let backward_partition = partition(&backward);
        let a = forward_partition.sorted_groups();
        let b = backward_partition.sorted_groups();
        assert_eq!(ids(&a[0].1), ids(&b[0].1));
        assert_eq!(
            ids(&a[0].1)
                .into_iter()
                .map(|(id, _)| id)
                .collect::<Vec<_>>(),
            vec!["E-7-01_Z--0", "E-7-01_A--1", "E-7-01_B--1", "e-7-01_b--1"]
        );
    }

    #[test]
    fn test_en_dash_sheets_share_group() {
        let sheets = ["E\u{2013}7\u{2013}05_Left--1", "E-7-05_Right--2"];
        let result = partition(&sheets);
        assert_eq!(result.groups["05"].len(), 2);
    }

    #[test]
    fn test_sheet_info_outline() {
        let sheets = vec![SheetInfo::new("A-7-01_X--1").with_outline(841.0, 594.0)];
        let result = partition(&sheets);
        let entry = result.groups["01"][0];
        assert_eq!(entry.sheet.outline_size(), Some((841.0, 594.0)));
    }
}
