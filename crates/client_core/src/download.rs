use std::path::{Path, PathBuf};

use thiserror::Error;

pub const RESOLVED_SUFFIX: &str = "_resolved.xml";
pub const RESOLVED_MEDIA_TYPE: &str = "application/xml;charset=utf-8";
const FALLBACK_BASE_NAME: &str = "download";

/// A resolved document ready to be saved locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadArtifact {
    pub file_name: String,
    pub media_type: &'static str,
    pub content: String,
}

impl DownloadArtifact {
    pub fn resolved(source_name: &str, content: impl Into<String>) -> Self {
        Self {
            file_name: format!("{}{RESOLVED_SUFFIX}", sanitize_base_name(source_name)),
            media_type: RESOLVED_MEDIA_TYPE,
            content: content.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to save {file_name}: {source}")]
    Io {
        file_name: String,
        source: std::io::Error,
    },
    #[error("download rejected: {0}")]
    Rejected(String),
}

/// Client-local save target.
pub trait DownloadSink: Send + Sync {
    fn save(&self, artifact: &DownloadArtifact) -> Result<PathBuf, DownloadError>;
}

/// Writes artifacts into a fixed directory.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DownloadSink for DirectorySink {
    fn save(&self, artifact: &DownloadArtifact) -> Result<PathBuf, DownloadError> {
        let io_error = |source| DownloadError::Io {
            file_name: artifact.file_name.clone(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(io_error)?;
        let target = self.dir.join(&artifact.file_name);
        std::fs::write(&target, artifact.content.as_bytes()).map_err(io_error)?;
        Ok(target)
    }
}

fn is_path_hostile(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')
}

/// Collapses each run of whitespace or path-hostile characters into `_`, then
/// strips the final extension.
pub fn sanitize_base_name(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    let mut in_run = false;
    for ch in name.chars() {
        if is_path_hostile(ch) {
            if !in_run {
                sanitized.push('_');
                in_run = true;
            }
        } else {
            sanitized.push(ch);
            in_run = false;
        }
    }

    if let Some(dot) = sanitized.rfind('.') {
        if dot + 1 < sanitized.len() {
            sanitized.truncate(dot);
        }
    }

    if sanitized.is_empty() {
        FALLBACK_BASE_NAME.to_string()
    } else {
        sanitized
    }
}
