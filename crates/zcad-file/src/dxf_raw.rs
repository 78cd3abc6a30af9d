//! DXF 原始文本解析器
//!
//! 自己解析 DXF 文本格式，保留全部组码，供文档读写使用。
//!
//! # DXF 文件结构
//!
//! DXF 文件由多个段 (Section) 组成：
//! ```text
//! 0
//! SECTION
//! 2
//! HEADER          ← 文件设置
//! ...
//! 0
//! ENDSEC
//! 0
//! SECTION
//! 2
//! TABLES          ← 图层、块记录等
//! ...
//! 0
//! SECTION
//! 2
//! BLOCKS          ← 块定义（包括 *Model_Space, *Paper_Space）
//! ...
//! 0
//! SECTION
//! 2
//! ENTITIES        ← 模型空间与当前图纸空间的实体
//! ...
//! 0
//! SECTION
//! 2
//! OBJECTS         ← 对象（包括 LAYOUT）
//! ...
//! 0
//! EOF
//! ```
//!
//! # 组码 (Group Code)
//!
//! 每个数据项由两行组成：
//! - 第一行：组码（数字）
//! - 第二行：值
//!
//! 常用组码：
//! - 0: 实体类型
//! - 2: 名称
//! - 5: 句柄 (Handle)
//! - 10, 20, 30: X, Y, Z 坐标
//! - 40, 41, 42...: 浮点数值
//! - 62: 颜色
//! - 8: 图层名
//! - 330: 软指针（所属对象）

use std::fs;
use std::path::Path;

use crate::codepage;
use crate::error::FileError;
use zcad_core::math::Point2;

/// 二进制 DXF 的文件头
const BINARY_SENTINEL: &str = "AutoCAD Binary DXF";

/// DXF 组码-值对
#[derive(Debug, Clone, PartialEq)]
pub struct DxfPair {
    pub code: i32,
    pub value: String,
}

impl DxfPair {
    pub fn new(code: i32, value: impl Into<String>) -> Self {
        Self {
            code,
            value: value.into(),
        }
    }

    /// 解析为浮点数
    pub fn as_f64(&self) -> Option<f64> {
        self.value.trim().parse().ok()
    }

    /// 解析为整数
    pub fn as_i32(&self) -> Option<i32> {
        self.value.trim().parse().ok()
    }

    /// 解析为 i16（颜色、线宽、标志位）
    pub fn as_i16(&self) -> Option<i16> {
        self.value.trim().parse().ok()
    }

    /// 去掉首尾空白的值
    pub fn text(&self) -> &str {
        self.value.trim()
    }

    /// 是否是 `0` 组码的指定记录类型
    pub fn is_marker(&self, name: &str) -> bool {
        self.code == 0 && self.text().eq_ignore_ascii_case(name)
    }
}

/// DXF 原始解析器
pub struct DxfRawParser {
    pairs: Vec<DxfPair>,
}

impl DxfRawParser {
    /// 从文件加载，按头段声明的版本与代码页解码
    pub fn load(path: &Path) -> Result<Self, FileError> {
        let bytes = fs::read(path)?;
        Self::parse(&codepage::decode(&bytes))
    }

    /// 从文本解析，值中的 `\U+XXXX` 转义还原为字符
    pub fn parse(source: &str) -> Result<Self, FileError> {
        if source.starts_with(BINARY_SENTINEL) {
            return Err(FileError::Dxf("binary DXF is not supported".to_string()));
        }

        let mut pairs = Vec::new();
        let mut lines = source.lines().enumerate();

        // 读取组码
        while let Some((line_no, code_line)) = lines.next() {
            let code_line = code_line.trim_start_matches('\u{feff}').trim();
            if code_line.is_empty() && pairs.is_empty() {
                continue;
            }

            // 读取值
            let Some((_, value_line)) = lines.next() else {
                return Err(FileError::Dxf(format!(
                    "group code {} at line {} has no value",
                    code_line,
                    line_no + 1
                )));
            };

            let code: i32 = code_line.parse().map_err(|_| {
                FileError::Dxf(format!(
                    "invalid group code '{}' at line {}",
                    code_line,
                    line_no + 1
                ))
            })?;

            let value = codepage::unescape(value_line.trim_end_matches('\r'));
            let pair = DxfPair::new(code, value);
            let is_eof = pair.is_marker("EOF");
            pairs.push(pair);

            // 检查是否到达文件末尾
            if is_eof {
                break;
            }
        }

        Ok(Self { pairs })
    }

    /// 按段拆分：`(段名, 段内组码)`，不含 SECTION/ENDSEC 本身
    pub fn sections(&self) -> Vec<(String, &[DxfPair])> {
        let mut sections = Vec::new();
        let mut i = 0;
        while i < self.pairs.len() {
            if self.pairs[i].is_marker("SECTION") {
                let name = self
                    .pairs
                    .get(i + 1)
                    .filter(|p| p.code == 2)
                    .map(|p| p.text().to_uppercase())
                    .unwrap_or_default();
                let start = (i + 2).min(self.pairs.len());
                let end = self.pairs[start..]
                    .iter()
                    .position(|p| p.is_marker("ENDSEC"))
                    .map(|offset| start + offset)
                    .unwrap_or(self.pairs.len());
                sections.push((name, &self.pairs[start..end]));
                i = end + 1;
            } else {
                i += 1;
            }
        }
        sections
    }

    /// 取指定名称的段
    pub fn section(&self, name: &str) -> Option<&[DxfPair]> {
        self.sections()
            .into_iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, pairs)| pairs)
    }
}

/// 以组码 0 开头的一条记录（实体、表项、对象）
#[derive(Debug, Clone, Copy)]
pub struct DxfRecord<'a> {
    pub kind: &'a str,
    pub codes: &'a [DxfPair],
}

impl<'a> DxfRecord<'a> {
    /// 第一个指定组码的值
    pub fn first(&self, code: i32) -> Option<&'a DxfPair> {
        self.codes.iter().find(|p| p.code == code)
    }

    /// 最后一个指定组码的值（LAYOUT 等对象中同一组码会出现在多个子类中）
    pub fn last(&self, code: i32) -> Option<&'a DxfPair> {
        self.codes.iter().rev().find(|p| p.code == code)
    }

    pub fn text(&self, code: i32) -> Option<&'a str> {
        self.first(code).map(DxfPair::text)
    }

    pub fn f64_or(&self, code: i32, default: f64) -> f64 {
        self.first(code).and_then(DxfPair::as_f64).unwrap_or(default)
    }

    pub fn point(&self, x_code: i32) -> Point2 {
        Point2::new(self.f64_or(x_code, 0.0), self.f64_or(x_code + 10, 0.0))
    }
}

/// 把段内组码切分为记录
pub fn records(pairs: &[DxfPair]) -> Vec<DxfRecord<'_>> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < pairs.len() {
        if pairs[i].code != 0 {
            i += 1;
            continue;
        }
        let start = i + 1;
        let end = pairs[start..]
            .iter()
            .position(|p| p.code == 0)
            .map(|offset| start + offset)
            .unwrap_or(pairs.len());
        out.push(DxfRecord {
            kind: pairs[i].text(),
            codes: &pairs[start..end],
        });
        i = end;
    }
    out
}

/// DXF 写入器
pub struct DxfWriter {
    output: Vec<String>,
    handle_counter: u64,
}

impl Default for DxfWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl DxfWriter {
    pub fn new() -> Self {
        Self {
            output: Vec::new(),
            handle_counter: 0x100, // 低位句柄留给固定表
        }
    }

    /// 生成新句柄
    pub fn new_handle(&mut self) -> String {
        let handle = format!("{:X}", self.handle_counter);
        self.handle_counter += 1;
        handle
    }

    /// 下一个可用句柄（用于 $HANDSEED）
    pub fn handle_seed(&self) -> String {
        format!("{:X}", self.handle_counter)
    }

    /// 写入组码-值对，非 ASCII 字符转义为 `\U+XXXX`
    pub fn write_pair(&mut self, code: i32, value: impl std::fmt::Display) {
        self.output.push(format!("{:>3}", code));
        let value = value.to_string();
        self.output.push(codepage::escape(&value).into_owned());
    }

    /// 写入浮点数，总是带小数点
    pub fn write_f64(&mut self, code: i32, value: f64) {
        self.write_pair(code, format_f64(value));
    }

    /// 写入点坐标
    pub fn write_point(&mut self, base_code: i32, point: Point2) {
        self.write_f64(base_code, point.x);
        self.write_f64(base_code + 10, point.y);
        self.write_f64(base_code + 20, 0.0); // Z = 0
    }

    /// 写入 SECTION 开始
    pub fn begin_section(&mut self, name: &str) {
        self.write_pair(0, "SECTION");
        self.write_pair(2, name);
    }

    /// 写入 SECTION 结束
    pub fn end_section(&mut self) {
        self.write_pair(0, "ENDSEC");
    }

    /// 追加另一个写入器的内容
    pub fn append(&mut self, other: DxfWriter) {
        self.output.extend(other.output);
    }

    /// 获取输出
    pub fn finish(mut self) -> String {
        self.write_pair(0, "EOF");
        let mut content = self.output.join("\n");
        content.push('\n');
        content
    }
}

/// 浮点数格式化：有限值保留完整精度并确保带小数点
fn format_f64(value: f64) -> String {
    if !value.is_finite() {
        return "0.0".to_string();
    }
    let text = value.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{text}.0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pair() {
        let pair = DxfPair::new(10, "100.5");
        assert_eq!(pair.as_f64(), Some(100.5));

        let pair = DxfPair::new(70, "  42");
        assert_eq!(pair.as_i32(), Some(42));
        assert!(DxfPair::new(0, "eof").is_marker("EOF"));
    }

    #[test]
    fn test_sections_and_records() {
        let text = "0\r\nSECTION\r\n2\r\nENTITIES\r\n0\r\nLINE\r\n8\r\nWALL\r\n10\r\n1.0\r\n0\r\nPOINT\r\n10\r\n2\r\n0\r\nENDSEC\r\n0\r\nEOF\r\n";
        let parser = DxfRawParser::parse(text).unwrap();
        let entities = parser.section("entities").unwrap();
        let recs = records(entities);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].kind, "LINE");
        assert_eq!(recs[0].text(8), Some("WALL"));
        assert_eq!(recs[1].point(10), Point2::new(2.0, 0.0));
    }

    #[test]
    fn test_invalid_group_code() {
        let result = DxfRawParser::parse("abc\nSECTION\n");
        assert!(matches!(result, Err(FileError::Dxf(_))));
    }

    #[test]
    fn test_load_gbk_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gbk.dxf");
        let mut bytes = b"0\r\nSECTION\r\n2\r\nHEADER\r\n9\r\n$ACADVER\r\n1\r\nAC1015\r\n9\r\n$DWGCODEPAGE\r\n3\r\nANSI_936\r\n0\r\nENDSEC\r\n0\r\nSECTION\r\n2\r\nENTITIES\r\n0\r\nTEXT\r\n8\r\n0\r\n1\r\n".to_vec();
        bytes.extend_from_slice(&[0xCD, 0xBC, 0xD6, 0xBD]);
        bytes.extend_from_slice(b"\r\n0\r\nENDSEC\r\n0\r\nEOF\r\n");
        fs::write(&path, bytes).unwrap();

        let parser = DxfRawParser::load(&path).unwrap();
        let recs = records(parser.section("ENTITIES").unwrap());
        assert_eq!(recs[0].text(1), Some("图纸"));
    }

    #[test]
    fn test_writer_escapes_non_ascii() {
        let mut writer = DxfWriter::new();
        writer.write_pair(1, "图纸 A-1");
        let output = writer.finish();
        assert!(output.is_ascii());
        assert!(output.contains("\\U+56FE\\U+7EB8 A-1"));

        let reparsed = DxfRawParser::parse(&output).unwrap();
        assert_eq!(reparsed.pairs[0].value, "图纸 A-1");
    }

    #[test]
    fn test_binary_rejected() {
        assert!(DxfRawParser::parse("AutoCAD Binary DXF\r\n\u{1a}\0").is_err());
    }

    #[test]
    fn test_dxf_writer() {
        let mut writer = DxfWriter::new();
        writer.begin_section("HEADER");
        writer.write_pair(9, "$ACADVER");
        writer.write_pair(1, "AC1015");
        writer.write_f64(40, 100.0);
        writer.end_section();

        let output = writer.finish();
        assert!(output.contains("SECTION"));
        assert!(output.contains("AC1015"));
        assert!(output.contains("100.0"));
        assert!(output.trim_end().ends_with("EOF"));

        let reparsed = DxfRawParser::parse(&output).unwrap();
        assert_eq!(reparsed.sections().len(), 1);
    }
}
