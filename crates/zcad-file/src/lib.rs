//! ZCAD 文件格式处理
//!
//! 支持：
//! - `.dxf` 导入/导出（ASCII，写出 AutoCAD 2000 格式）
//! - 块定义、布局、视口与图层锁定状态完整往返
//! - 按 `$DWGCODEPAGE` 解码旧版本文件中的本地编码文本

pub mod codepage;
pub mod dxf_io;
pub mod dxf_raw;
pub mod error;

pub use dxf_io::{load, save};
pub use error::FileError;

// 原始组码层，供需要直接处理 DXF 文本的调用方使用
pub use dxf_raw::{DxfPair, DxfRawParser, DxfWriter};
