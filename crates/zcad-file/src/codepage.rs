//! DXF 文本编码
//!
//! AutoCAD 2007 (AC1021) 之前的 DXF 按头段 `$DWGCODEPAGE` 指定的代码页存储文本，
//! 代码页之外的字符写成 `\U+XXXX`。AC1021 及以后的版本固定为 UTF-8。
//!
//! 写出时只产生 ASCII：声明 `ANSI_1252`，所有非 ASCII 字符转义。

use std::borrow::Cow;

use encoding_rs::{
    Encoding, BIG5, EUC_KR, GBK, SHIFT_JIS, UTF_8, WINDOWS_1250, WINDOWS_1251, WINDOWS_1252,
    WINDOWS_1253, WINDOWS_1254, WINDOWS_1255, WINDOWS_1256, WINDOWS_1257, WINDOWS_1258,
    WINDOWS_874,
};
use tracing::{debug, warn};

/// 写出文件时声明的代码页
pub const WRITE_CODEPAGE: &str = "ANSI_1252";

/// 第一个以 UTF-8 存储文本的版本号（AC1021）
const FIRST_UTF8_VERSION: u32 = 1021;

const UNICODE_ESCAPE: &str = "\\U+";

/// `$DWGCODEPAGE` 值对应的编码
pub fn encoding_for_codepage(name: &str) -> Option<&'static Encoding> {
    let upper = name.trim().to_ascii_uppercase();
    match upper.as_str() {
        "UTF8" | "UTF-8" => return Some(UTF_8),
        "GB2312" => return Some(GBK),
        "BIG5" => return Some(BIG5),
        "KSC5601" => return Some(EUC_KR),
        _ => {}
    }
    let number: u32 = upper.strip_prefix("ANSI_")?.parse().ok()?;
    Some(match number {
        874 => WINDOWS_874,
        932 => SHIFT_JIS,
        936 => GBK,
        949 => EUC_KR,
        950 => BIG5,
        1250 => WINDOWS_1250,
        1251 => WINDOWS_1251,
        1252 => WINDOWS_1252,
        1253 => WINDOWS_1253,
        1254 => WINDOWS_1254,
        1255 => WINDOWS_1255,
        1256 => WINDOWS_1256,
        1257 => WINDOWS_1257,
        1258 => WINDOWS_1258,
        65001 => UTF_8,
        _ => return None,
    })
}

/// 头段中决定编码的两个变量
#[derive(Debug, Default, PartialEq)]
struct HeaderEncoding {
    version: Option<String>,
    codepage: Option<String>,
}

/// 扫描到第一个 ENDSEC 为止；头段只含 ASCII，按有损 UTF-8 读取即可
fn sniff_header(text: &str) -> HeaderEncoding {
    let mut header = HeaderEncoding::default();
    let mut lines = text.lines().map(str::trim);
    while let Some(line) = lines.next() {
        let slot = match line {
            "ENDSEC" => break,
            "$ACADVER" => &mut header.version,
            "$DWGCODEPAGE" => &mut header.codepage,
            _ => continue,
        };
        lines.next();
        *slot = lines.next().map(str::to_string);
    }
    header
}

fn version_number(version: &str) -> Option<u32> {
    version.trim().get(2..)?.parse().ok()
}

/// 按头段声明把文件字节解码为文本
///
/// 没有声明代码页时，合法 UTF-8 按 UTF-8 读取，否则按 Windows-1252。
/// 声明 `ANSI_1252` 而内容是合法 UTF-8 的文件同样按 UTF-8 读取。
pub fn decode(bytes: &[u8]) -> String {
    let lossy = String::from_utf8_lossy(bytes);
    let is_utf8 = matches!(lossy, Cow::Borrowed(_));
    let header = sniff_header(&lossy);

    let utf8_version = header
        .version
        .as_deref()
        .and_then(version_number)
        .is_some_and(|v| v >= FIRST_UTF8_VERSION);
    let declared = header.codepage.as_deref().and_then(|name| {
        let encoding = encoding_for_codepage(name);
        if encoding.is_none() {
            warn!(codepage = name, "Unsupported DXF code page");
        }
        encoding
    });

    let encoding = match declared {
        _ if utf8_version => UTF_8,
        Some(encoding) if encoding == WINDOWS_1252 && is_utf8 => UTF_8,
        Some(encoding) => encoding,
        None if is_utf8 => UTF_8,
        None => WINDOWS_1252,
    };
    debug!(
        "Decoding DXF text as {} (version {:?}, code page {:?})",
        encoding.name(),
        header.version,
        header.codepage
    );

    if encoding == UTF_8 {
        return lossy.into_owned();
    }
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        warn!("DXF text is not valid {}, replaced undecodable bytes", encoding.name());
    }
    text.into_owned()
}

/// 还原 `\U+XXXX` 转义；相邻的 UTF-16 代理对合并为一个字符
pub fn unescape(value: &str) -> Cow<'_, str> {
    if !value.contains(UNICODE_ESCAPE) {
        return Cow::Borrowed(value);
    }

    let mut out = String::with_capacity(value.len());
    let mut units: Vec<u16> = Vec::new();
    let flush = |units: &mut Vec<u16>, out: &mut String| {
        out.extend(
            char::decode_utf16(units.drain(..)).map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER)),
        );
    };

    let mut rest = value;
    while let Some(start) = rest.find(UNICODE_ESCAPE) {
        if start > 0 {
            flush(&mut units, &mut out);
            out.push_str(&rest[..start]);
        }
        let digits = start + UNICODE_ESCAPE.len();
        let unit = rest
            .get(digits..digits + 4)
            .filter(|hex| hex.chars().all(|c| c.is_ascii_hexdigit()))
            .and_then(|hex| u16::from_str_radix(hex, 16).ok());
        match unit {
            Some(unit) => {
                units.push(unit);
                rest = &rest[digits + 4..];
            }
            None => {
                flush(&mut units, &mut out);
                out.push_str(UNICODE_ESCAPE);
                rest = &rest[digits..];
            }
        }
    }
    flush(&mut units, &mut out);
    out.push_str(rest);
    Cow::Owned(out)
}

/// 把非 ASCII 字符转义为 `\U+XXXX`（BMP 之外的字符写成代理对）
pub fn escape(value: &str) -> Cow<'_, str> {
    if value.is_ascii() {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() * 2);
    let mut buffer = [0u16; 2];
    for c in value.chars() {
        if c.is_ascii() {
            out.push(c);
            continue;
        }
        for unit in c.encode_utf16(&mut buffer) {
            out.push_str(&format!("{UNICODE_ESCAPE}{unit:04X}"));
        }
    }
    Cow::Owned(out)
}
