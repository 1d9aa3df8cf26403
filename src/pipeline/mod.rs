pub mod build;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod registry;

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Language / runtime a pipeline is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineType {
    Golang,
    Java,
    Python,
    Cpp,
    Ruby,
    Nodejs,
}

impl PipelineType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Golang => "golang",
            Self::Java => "java",
            Self::Python => "python",
            Self::Cpp => "cpp",
            Self::Ruby => "ruby",
            Self::Nodejs => "nodejs",
        }
    }
}

impl fmt::Display for PipelineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source repository of a pipeline plus the credentials used to reach it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRepo {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub pipeline_type: PipelineType,
    #[serde(default)]
    pub repo: GitRepo,
    pub created: DateTime<Utc>,
}

impl Pipeline {
    /// Location of the compiled executable for this pipeline.
    ///
    /// Prefixed with the id, so two pipelines whose names slug alike never
    /// share an artifact.
    pub fn exec_path(&self, pipeline_dir: &Path) -> PathBuf {
        pipeline_dir.join(format!(
            "{}_{}_{}",
            self.id,
            slug(&self.name),
            self.pipeline_type
        ))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Create a filesystem-safe slug from a name.
pub fn slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_owned()
}

/// Normalize a repository URL for comparison: trailing `/` and `.git` are ignored.
pub fn normalize_repo_url(url: &str) -> &str {
    let url = url.trim().trim_end_matches('/');
    url.strip_suffix(".git").unwrap_or(url)
}

/// Strip the `refs/heads/` prefix from a git ref.
pub fn branch_from_ref(git_ref: &str) -> &str {
    git_ref.strip_prefix("refs/heads/").unwrap_or(git_ref)
}
