//! Integration and unit tests for the Projektwald backend.
//!
//! This module organizes all test modules for the application.
//!
//! ## Test Modules
//!
//! - **scanner_tests**: Candidate discovery, classification and reconciliation
//! - **store_tests**: Catalog persistence, durability, recovery and migration
//! - **search_tests**: Fuzzy search and filter/sort/paginate queries
//! - **jobs_tests**: Scan job orchestration and cancellation
//! - **git_tests**: Remote URL parsing and metadata degradation
//! - **api_tests**: RPC dispatch and envelope behavior
//! - **config_tests**: Configuration loading and defaults
//! - **error_tests**: Error code mapping and validation helpers

pub mod config_tests;
pub mod error_tests;
pub mod git_tests;
pub mod scanner_tests;

use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{Project, ProjectKind, ScanStatus};

/// Creates a fake repository: a directory with a `.git` marker and a few
/// files. Metadata extraction degrades on these by design, so no git binary
/// is needed.
pub fn make_repo(base: &Path, name: &str) -> PathBuf {
    let dir = base.join(name);
    fs::create_dir_all(dir.join(".git")).unwrap();
    fs::write(dir.join("README.md"), "# readme\n").unwrap();
    fs::write(dir.join("Cargo.toml"), "[package]\nname = \"fixture\"\n").unwrap();
    fs::write(dir.join("main.rs"), "fn main() {}\n").unwrap();
    dir
}

/// Minimal catalog record for store/search fixtures.
pub fn make_project(id: &str, name: &str, path: &str, kind: ProjectKind, importance: u8) -> Project {
    Project {
        id: id.to_string(),
        name: name.to_string(),
        path: path.to_string(),
        kind,
        tags: Vec::new(),
        importance,
        size_bytes: 0,
        created_at: Some("2026-01-01T00:00:00Z".to_string()),
        modified_at: Some("2026-01-02T00:00:00Z".to_string()),
        file_count: 0,
        provider: None,
        last_commit: None,
        branch: None,
        remotes: Vec::new(),
        readme_files: Vec::new(),
        description: None,
        language: None,
        scan_status: ScanStatus::Complete,
        last_scanned_at: None,
    }
}
