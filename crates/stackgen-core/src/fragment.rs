use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A shell snippet queued by one service for the prebuild or postbuild script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptFragment {
    pub service_name: String,
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiline_comment: Option<String>,
    pub code: String,
}

impl ScriptFragment {
    pub fn new(service_name: &str, comment: &str, code: impl Into<String>) -> Self {
        Self {
            service_name: service_name.to_owned(),
            comment: comment.to_owned(),
            multiline_comment: None,
            code: code.into(),
        }
    }

    pub fn with_multiline_comment(mut self, comment: impl Into<String>) -> Self {
        self.multiline_comment = Some(comment.into());
        self
    }
}

/// A file to ship with the generated artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZipEntry {
    /// File on disk, usually under the build's tmp path.
    pub source: PathBuf,
    /// Relative path inside the artifact.
    pub archive_path: String,
}
