//! 合并流水线错误定义

use std::path::{Path, PathBuf};
use thiserror::Error;
use zcad_core::document::DocumentError;
use zcad_file::FileError;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error(transparent)]
    File(#[from] FileError),

    #[error("Invalid document structure: {0}")]
    Document(#[from] DocumentError),

    #[error("Template drawing not found: {}", .0.display())]
    TemplateMissing(PathBuf),

    #[error("Output {} would overwrite the template drawing", .0.display())]
    TemplateOverwrite(PathBuf),

    #[error("Viewport in layout '{0}' is degenerate (zero or non-finite height)")]
    DegenerateViewport(String),

    #[error("No source could be placed into {}", .0.display())]
    NothingToMerge(PathBuf),

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MergeError {
    /// 带路径上下文的 IO 错误，用于 `map_err`
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> MergeError + '_ {
        move |source| MergeError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
