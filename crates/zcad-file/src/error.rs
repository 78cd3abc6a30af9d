//! 文件操作错误定义

use std::path::PathBuf;
use thiserror::Error;
use zcad_core::document::DocumentError;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("DXF error: {0}")]
    Dxf(String),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Invalid document structure: {0}")]
    Structure(#[from] DocumentError),
}
