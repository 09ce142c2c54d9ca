use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Schema version of the persisted catalog. Bump together with a new step in
/// `store::migrate_catalog`.
pub const CATALOG_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    Git,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanStatus {
    Pending,
    Scanning,
    Complete,
    Error,
    UserModified,
}

/// A named git remote with the provider coordinates parsed out of its URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Remote {
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

/// One catalog record. `id` is a stable surrogate key; `path` is the natural
/// key — the store never keeps two records with the same path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub path: String,
    pub kind: ProjectKind,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Ordinal 0..=5, 0 = unset.
    #[serde(default)]
    pub importance: u8,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub file_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default)]
    pub remotes: Vec<Remote>,
    #[serde(default)]
    pub readme_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub scan_status: ScanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scanned_at: Option<String>,
}

impl Project {
    /// First remote by discovery order, used as the primary one.
    pub fn primary_remote(&self) -> Option<&Remote> {
        self.remotes.first()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogMeta {
    #[serde(default)]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scan_at: Option<String>,
    #[serde(default)]
    pub project_count: usize,
}

/// The whole persisted catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectsData {
    #[serde(default)]
    pub meta: CatalogMeta,
    #[serde(default)]
    pub projects: Vec<Project>,
}

/// Caller-supplied partial update. Only the present fields are merged;
/// applying a patch marks the record `user-modified`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub importance: Option<u8>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRoot {
    pub path: String,
    /// Include the root as a project even when nested repositories exist.
    #[serde(default)]
    pub include_as_project: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanConfig {
    pub roots: Vec<ScanRoot>,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default)]
    pub max_depth: Option<u32>,
    #[serde(default)]
    pub min_size_bytes: u64,
    #[serde(default)]
    pub concurrency: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanIssue {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub roots_scanned: usize,
    pub candidates_found: usize,
    pub processed: usize,
    pub skipped_below_min_size: usize,
    pub duration_ms: u64,
}

/// Result of one scanner run. `errors` are per-candidate and non-fatal; a
/// cancelled run returns whatever was accumulated so far.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    pub projects: Vec<Project>,
    pub errors: Vec<ScanIssue>,
    pub stats: ScanStats,
    #[serde(default)]
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    Started {
        roots: Vec<String>,
    },
    Progress {
        processed: usize,
        total: usize,
        current_path: String,
    },
    Warning {
        path: String,
        message: String,
    },
    Done {
        projects: usize,
        errors: usize,
    },
    Cancelled,
    Failed {
        message: String,
    },
}

/// A scan event tagged with the job that emitted it, as delivered to
/// progress subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: Uuid,
    #[serde(flatten)]
    pub event: ScanEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Complete,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    pub processed: usize,
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanJob {
    pub id: Uuid,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: ScanProgress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ScanOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

// DTOs für Katalog-Abfragen (exakte Filter + Sortierung + Paginierung)

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFilters {
    #[serde(default)]
    pub kind: Option<ProjectKind>,
    #[serde(default)]
    pub provider: Option<String>,
    /// Any-of semantics: a project matches when it carries at least one of
    /// the given tags.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub importance: Option<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    #[default]
    Name,
    Path,
    SizeBytes,
    Importance,
    FileCount,
    CreatedAt,
    ModifiedAt,
    LastScannedAt,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogQuery {
    #[serde(default)]
    pub filters: ProjectFilters,
    #[serde(default)]
    pub sort: SortKey,
    #[serde(default)]
    pub dir: SortDir,
    /// 1-based page number; 0 is treated as 1.
    #[serde(default)]
    pub page: usize,
    #[serde(default)]
    pub page_size: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPage {
    pub items: Vec<Project>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub project: Project,
    pub score: f32,
}

/// Normalizes a path for identity comparison: absolute where possible,
/// backslashes unified, trailing separators trimmed.
pub fn canonical_path_string(path: &std::path::Path) -> String {
    let abs: PathBuf = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().map(|c| c.join(path)).unwrap_or_else(|_| path.to_path_buf())
    };
    let s = abs.to_string_lossy().replace('\\', "/");
    let trimmed = s.trim_end_matches('/');
    if trimmed.is_empty() {
        s
    } else {
        trimmed.to_string()
    }
}
