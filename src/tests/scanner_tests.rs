#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;
    use tokio::sync::broadcast;
    use tokio_util::sync::CancellationToken;

    use crate::config::ScannerConfig;
    use crate::git::GitClient;
    use crate::scanner::{discover_candidates, discovery_globset, run_scan};
    use crate::tests::make_repo;
    use crate::types::{
        canonical_path_string, ProjectKind, ScanConfig, ScanEvent, ScanOutcome, ScanRoot,
        ScanStatus,
    };

    fn scan_config(root: &Path) -> ScanConfig {
        ScanConfig {
            roots: vec![ScanRoot {
                path: root.to_string_lossy().to_string(),
                include_as_project: false,
            }],
            ignore_patterns: vec![],
            max_depth: None,
            min_size_bytes: 0,
            concurrency: Some(2),
        }
    }

    async fn scan(config: &ScanConfig) -> ScanOutcome {
        let (tx, _rx) = broadcast::channel(1024);
        run_scan(
            config,
            &ScannerConfig::default(),
            &GitClient::new(2000),
            &HashMap::new(),
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap()
    }

    #[test]
    fn discovery_finds_nested_repos_and_skips_non_repo_root() {
        let temp = TempDir::new().unwrap();
        make_repo(temp.path(), "alpha");
        make_repo(temp.path(), "nested/beta");
        fs::create_dir_all(temp.path().join("plain")).unwrap();

        let ignore = discovery_globset(&[]).unwrap();
        let found = discover_candidates(temp.path(), false, &ignore, None);
        assert_eq!(found.len(), 2);
        assert!(!found.iter().any(|c| c == temp.path()));
    }

    #[test]
    fn discovery_includes_repo_root_without_nested_candidates() {
        let temp = TempDir::new().unwrap();
        let root = make_repo(temp.path(), "solo");

        let ignore = discovery_globset(&[]).unwrap();
        let found = discover_candidates(&root, false, &ignore, None);
        assert_eq!(found, vec![root]);
    }

    #[test]
    fn discovery_flag_always_includes_root() {
        let temp = TempDir::new().unwrap();
        let root = make_repo(temp.path(), "parent");
        make_repo(&root, "child");

        let ignore = discovery_globset(&[]).unwrap();
        // Without the flag the root hides behind its nested candidate
        let found = discover_candidates(&root, false, &ignore, None);
        assert_eq!(found.len(), 1);
        assert_ne!(found[0], root);

        let found = discover_candidates(&root, true, &ignore, None);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], root);
    }

    #[test]
    fn discovery_flag_includes_plain_directory_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("plain");
        fs::create_dir_all(&root).unwrap();

        let ignore = discovery_globset(&[]).unwrap();
        assert!(discover_candidates(&root, false, &ignore, None).is_empty());
        assert_eq!(discover_candidates(&root, true, &ignore, None), vec![root]);
    }

    // Pins the open question: nested repos hidden by ignore patterns do not
    // count as nested candidates, so the repo root itself is scanned.
    #[test]
    fn discovery_falls_back_to_root_when_nested_repos_are_ignored() {
        let temp = TempDir::new().unwrap();
        let root = make_repo(temp.path(), "app");
        make_repo(&root, "vendor/dep");

        let ignore = discovery_globset(&["**/vendor".to_string()]).unwrap();
        let found = discover_candidates(&root, false, &ignore, None);
        assert_eq!(found, vec![root]);
    }

    #[test]
    fn marker_patterns_never_hide_repositories() {
        let temp = TempDir::new().unwrap();
        make_repo(temp.path(), "alpha");

        let ignore = discovery_globset(&["**/.git".to_string(), ".git".to_string()]).unwrap();
        let found = discover_candidates(temp.path(), false, &ignore, None);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn discovery_respects_max_depth() {
        let temp = TempDir::new().unwrap();
        make_repo(temp.path(), "shallow");
        make_repo(temp.path(), "a/b/c/deep");

        let ignore = discovery_globset(&[]).unwrap();
        let found = discover_candidates(temp.path(), false, &ignore, Some(1));
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("shallow"));
    }

    #[tokio::test]
    async fn run_scan_classifies_repositories() {
        let temp = TempDir::new().unwrap();
        make_repo(temp.path(), "alpha");
        make_repo(temp.path(), "beta");

        let outcome = scan(&scan_config(temp.path())).await;
        assert_eq!(outcome.projects.len(), 2);
        assert_eq!(outcome.stats.candidates_found, 2);
        assert_eq!(outcome.stats.processed, 2);
        assert!(!outcome.cancelled);

        let alpha = outcome.projects.iter().find(|p| p.name == "alpha").unwrap();
        assert_eq!(alpha.kind, ProjectKind::Git);
        assert_eq!(alpha.scan_status, ScanStatus::Complete);
        assert_eq!(alpha.language.as_deref(), Some("rust"));
        assert_eq!(alpha.readme_files, vec!["README.md".to_string()]);
        assert!(alpha.size_bytes > 0);
        assert!(alpha.file_count >= 3);
        assert!(alpha.last_scanned_at.is_some());
    }

    #[tokio::test]
    async fn rescan_keeps_project_identity() {
        let temp = TempDir::new().unwrap();
        make_repo(temp.path(), "alpha");
        let config = scan_config(temp.path());

        let first = scan(&config).await;
        let known: HashMap<String, _> = first
            .projects
            .iter()
            .map(|p| (canonical_path_string(Path::new(&p.path)), p.clone()))
            .collect();

        let (tx, _rx) = broadcast::channel(64);
        let second = run_scan(
            &config,
            &ScannerConfig::default(),
            &GitClient::new(2000),
            &known,
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(first.projects[0].id, second.projects[0].id);
        assert_eq!(first.projects[0].created_at, second.projects[0].created_at);
    }

    #[tokio::test]
    async fn rescan_preserves_user_owned_fields() {
        let temp = TempDir::new().unwrap();
        make_repo(temp.path(), "alpha");
        let config = scan_config(temp.path());

        let first = scan(&config).await;
        let mut prior = first.projects[0].clone();
        prior.name = "My Renamed Project".to_string();
        prior.tags = vec!["work".to_string()];
        prior.importance = 4;
        prior.description = Some("important".to_string());
        prior.scan_status = ScanStatus::UserModified;

        let known: HashMap<String, _> =
            [(canonical_path_string(Path::new(&prior.path)), prior.clone())].into();
        let (tx, _rx) = broadcast::channel(64);
        let second = run_scan(
            &config,
            &ScannerConfig::default(),
            &GitClient::new(2000),
            &known,
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let rescanned = &second.projects[0];
        assert_eq!(rescanned.id, prior.id);
        assert_eq!(rescanned.name, "My Renamed Project");
        assert_eq!(rescanned.tags, vec!["work".to_string()]);
        assert_eq!(rescanned.importance, 4);
        assert_eq!(rescanned.description.as_deref(), Some("important"));
        assert_eq!(rescanned.scan_status, ScanStatus::UserModified);
        // Scan-derived fields still refresh
        assert!(rescanned.size_bytes > 0);
        assert!(rescanned.last_scanned_at.is_some());
    }

    #[tokio::test]
    async fn min_size_floor_skips_small_candidates() {
        let temp = TempDir::new().unwrap();
        make_repo(temp.path(), "tiny");

        let mut config = scan_config(temp.path());
        config.min_size_bytes = 10 * 1024 * 1024;
        let outcome = scan(&config).await;
        assert!(outcome.projects.is_empty());
        assert_eq!(outcome.stats.skipped_below_min_size, 1);
        assert_eq!(outcome.stats.processed, 1);
    }

    #[tokio::test]
    async fn cancelled_token_yields_partial_result_not_error() {
        let temp = TempDir::new().unwrap();
        make_repo(temp.path(), "alpha");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let (tx, _rx) = broadcast::channel(64);
        let outcome = run_scan(
            &scan_config(temp.path()),
            &ScannerConfig::default(),
            &GitClient::new(2000),
            &HashMap::new(),
            tx,
            cancel,
        )
        .await
        .unwrap();

        assert!(outcome.cancelled);
        assert!(outcome.projects.is_empty());
    }

    #[tokio::test]
    async fn progress_is_emitted_on_the_last_candidate() {
        let temp = TempDir::new().unwrap();
        make_repo(temp.path(), "one");
        make_repo(temp.path(), "two");
        make_repo(temp.path(), "three");

        let (tx, mut rx) = broadcast::channel(1024);
        run_scan(
            &scan_config(temp.path()),
            &ScannerConfig::default(),
            &GitClient::new(2000),
            &HashMap::new(),
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let mut saw_final_progress = false;
        let mut saw_done = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                ScanEvent::Progress { processed, total, .. } => {
                    if processed == 3 && total == 3 {
                        saw_final_progress = true;
                    }
                }
                ScanEvent::Done { projects, .. } => {
                    saw_done = true;
                    assert_eq!(projects, 3);
                }
                _ => {}
            }
        }
        assert!(saw_final_progress);
        assert!(saw_done);
    }

    #[tokio::test]
    async fn one_bad_root_is_not_fatal_but_all_bad_roots_are() {
        let temp = TempDir::new().unwrap();
        make_repo(temp.path(), "alpha");

        let mut config = scan_config(temp.path());
        config.roots.push(ScanRoot {
            path: temp.path().join("missing").to_string_lossy().to_string(),
            include_as_project: false,
        });
        let outcome = scan(&config).await;
        assert_eq!(outcome.projects.len(), 1);
        assert_eq!(outcome.errors.len(), 1);

        let bad = ScanConfig {
            roots: vec![ScanRoot {
                path: temp.path().join("nowhere").to_string_lossy().to_string(),
                include_as_project: false,
            }],
            ..scan_config(temp.path())
        };
        let (tx, _rx) = broadcast::channel(64);
        let err = run_scan(
            &bad,
            &ScannerConfig::default(),
            &GitClient::new(2000),
            &HashMap::new(),
            tx,
            CancellationToken::new(),
        )
        .await;
        assert!(err.is_err());
    }
}
