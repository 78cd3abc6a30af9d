//! 线型、文字样式与标注样式表
//!
//! 只保留表项名称与数据组码；句柄、所属指针与子类标记在写出时重新生成。

use serde::{Deserialize, Serialize};

/// 原样保留的符号表项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    pub name: String,
    /// 名称之外的数据组码，按原顺序
    pub codes: Vec<(i32, String)>,
}

impl TableRecord {
    pub fn new(name: impl Into<String>, codes: Vec<(i32, String)>) -> Self {
        Self {
            name: name.into(),
            codes,
        }
    }
}

/// 单个符号表，名称大小写不敏感
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolTable {
    records: Vec<TableRecord>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加或替换同名表项
    pub fn add(&mut self, record: TableRecord) {
        match self.position(&record.name) {
            Some(index) => self.records[index] = record,
            None => self.records.push(record),
        }
    }

    pub fn get(&self, name: &str) -> Option<&TableRecord> {
        self.position(name).map(|index| &self.records[index])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 从另一个表复制缺少的同名表项，返回是否复制
    pub fn copy_missing(&mut self, other: &SymbolTable, name: &str) -> bool {
        if name.is_empty() || self.contains(name) {
            return false;
        }
        match other.get(name) {
            Some(record) => {
                self.records.push(record.clone());
                true
            }
            None => false,
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.name.eq_ignore_ascii_case(name))
    }
}

/// 文档携带的三类样式表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolTables {
    pub linetypes: SymbolTable,
    pub text_styles: SymbolTable,
    pub dim_styles: SymbolTable,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style(name: &str, font: &str) -> TableRecord {
        TableRecord::new(name, vec![(70, "0".to_string()), (3, font.to_string())])
    }

    #[test]
    fn test_replace_same_name() {
        let mut table = SymbolTable::new();
        table.add(style("HZ", "gbenor.shx"));
        table.add(style("hz", "simplex.shx"));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("HZ").unwrap().codes[1].1, "simplex.shx");
    }

    #[test]
    fn test_copy_missing_keeps_existing() {
        let mut source = SymbolTable::new();
        source.add(style("HZ", "gbenor.shx"));
        source.add(style("Notes", "romans.shx"));

        let mut target = SymbolTable::new();
        target.add(style("hz", "txt.shx"));
        assert!(!target.copy_missing(&source, "HZ"));
        assert!(target.copy_missing(&source, "NOTES"));
        assert!(!target.copy_missing(&source, "Unknown"));
        assert!(!target.copy_missing(&source, ""));

        assert_eq!(target.len(), 2);
        assert_eq!(target.get("HZ").unwrap().codes[1].1, "txt.shx");
        assert_eq!(target.get("notes").unwrap().name, "Notes");
    }
}
