// ============================================================================
// 错误类型 - API 检查失败分类
// ============================================================================
//
// Every failure is local to one module check. Variants carry the path or
// entry name needed to act on them without re-running locally.

use std::path::PathBuf;
use thiserror::Error;

use crate::dump::LineDiff;

#[derive(Error, Debug)]
pub enum ApiCheckError {
    // === 构建产物定位 ===
    #[error("No single file matching {pattern} in {}:\n{}", dir.display(), candidates.join("\n"))]
    ArchiveNotFound {
        dir: PathBuf,
        pattern: String,
        candidates: Vec<String>,
    },

    #[error("Ambiguous archives in {}:\n{}", dir.display(), candidates.join("\n"))]
    AmbiguousArchive { dir: PathBuf, candidates: Vec<String> },

    #[error("Cannot read archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    // === 字节码 ===
    #[error("Malformed compiled unit '{entry}': {detail}")]
    MalformedUnit { entry: String, detail: String },

    // === 输入文件 ===
    #[error("Visibility override file not found: {}", path.display())]
    MissingOverrideFile { path: PathBuf },

    #[error("Invalid visibility override file {}: {source}", path.display())]
    InvalidOverrideFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Reference file not found: {}", path.display())]
    MissingReferenceFile { path: PathBuf },

    #[error("Invalid configuration {}: {detail}", path.display())]
    Config { path: PathBuf, detail: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // === 检查结果 ===
    #[error("Public API of {} differs from reference ({} line(s)):\n{}", reference.display(), diffs.len(), render_diffs(diffs))]
    Mismatch {
        reference: PathBuf,
        diffs: Vec<LineDiff>,
    },

    #[error("Found references to the forbidden signature in {}: {}", archive.display(), units.join(", "))]
    Leak { archive: PathBuf, units: Vec<String> },
}

impl ApiCheckError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-friendly name of the failure class
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ArchiveNotFound { .. } => "archive_not_found",
            Self::AmbiguousArchive { .. } => "ambiguous_archive",
            Self::Archive { .. } => "archive",
            Self::MalformedUnit { .. } => "malformed_unit",
            Self::MissingOverrideFile { .. } => "missing_override_file",
            Self::InvalidOverrideFile { .. } => "invalid_override_file",
            Self::MissingReferenceFile { .. } => "missing_reference_file",
            Self::Config { .. } => "config",
            Self::Io { .. } => "io",
            Self::Mismatch { .. } => "mismatch",
            Self::Leak { .. } => "leak",
        }
    }
}

fn render_diffs(diffs: &[LineDiff]) -> String {
    diffs
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T, E = ApiCheckError> = std::result::Result<T, E>;
