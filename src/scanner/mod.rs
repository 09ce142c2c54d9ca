use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use futures::StreamExt;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::ScannerConfig;
use crate::error::{AppError, AppResult};
use crate::git::{GitClient, MARKER_DIR};
use crate::types::{
    canonical_path_string, Project, ProjectKind, ScanConfig, ScanEvent, ScanIssue, ScanOutcome,
    ScanStatus,
};

/// Fixed priority order for primary-language detection: marker files first,
/// then top-level file extensions. The first language that matches wins.
const LANGUAGE_MARKERS: &[(&str, &[&str], &[&str])] = &[
    ("rust", &["Cargo.toml"], &["rs"]),
    ("typescript", &["tsconfig.json"], &["ts", "tsx"]),
    ("javascript", &["package.json"], &["js", "jsx", "mjs"]),
    ("python", &["pyproject.toml", "requirements.txt", "setup.py"], &["py"]),
    ("go", &["go.mod"], &["go"]),
    ("java", &["pom.xml", "build.gradle", "build.gradle.kts"], &["java", "kt"]),
    ("csharp", &[], &["cs", "csproj"]),
    ("ruby", &["Gemfile"], &["rb"]),
    ("php", &["composer.json"], &["php"]),
    ("c", &["CMakeLists.txt", "Makefile"], &["c", "h", "cpp", "cc"]),
];

/// Runs one scan end to end: discovery, per-candidate classification,
/// identity reconciliation. Returns a job-level error only when no root was
/// usable or the ignore patterns are invalid; everything else degrades into
/// per-candidate `errors`.
pub async fn run_scan(
    config: &ScanConfig,
    tuning: &ScannerConfig,
    git: &GitClient,
    known: &HashMap<String, Project>,
    tx: broadcast::Sender<ScanEvent>,
    cancel: CancellationToken,
) -> AppResult<ScanOutcome> {
    let min_size_bytes = config.min_size_bytes;
    if config.roots.is_empty() {
        return Err(AppError::InvalidInput("roots must not be empty".into()));
    }
    let started = Instant::now();
    let ignore = discovery_globset(&config.ignore_patterns)?;

    let mut outcome = ScanOutcome::default();
    let mut candidates: Vec<PathBuf> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut usable_roots = 0usize;

    for root in &config.roots {
        if cancel.is_cancelled() {
            break;
        }
        let root_path = PathBuf::from(&root.path);
        if !root_path.is_dir() {
            outcome
                .errors
                .push(ScanIssue { path: root.path.clone(), message: "root path does not exist".into() });
            let _ = tx.send(ScanEvent::Warning {
                path: root.path.clone(),
                message: "root path does not exist".into(),
            });
            continue;
        }
        usable_roots += 1;
        let found =
            discover_candidates(&root_path, root.include_as_project, &ignore, config.max_depth);
        for cand in found {
            // Kandidaten über alle Roots nach absolutem Pfad deduplizieren
            if seen.insert(canonical_path_string(&cand)) {
                candidates.push(cand);
            }
        }
    }

    if usable_roots == 0 {
        return Err(AppError::Scanner("no scan root was readable".into()));
    }

    let _ = tx.send(ScanEvent::Started { roots: config.roots.iter().map(|r| r.path.clone()).collect() });

    let total = candidates.len();
    outcome.stats.roots_scanned = usable_roots;
    outcome.stats.candidates_found = total;

    let workers = config
        .concurrency
        .unwrap_or_else(|| (num_cpus::get() * 3 / 4).max(2))
        .clamp(1, 256);
    let progress_batch = tuning.progress_batch.max(1);

    // Klassifikation parallel, aber Abbruch-Check vor jedem Kandidaten
    let cancel_stream = cancel.clone();
    let results = futures::stream::iter(candidates.into_iter())
        .take_while(move |_| {
            let cancelled = cancel_stream.is_cancelled();
            futures::future::ready(!cancelled)
        })
        .map(|cand| {
            let git = git.clone();
            let tuning = tuning.clone();
            let prior = known.get(&canonical_path_string(&cand)).cloned();
            async move { classify_candidate(cand, prior, &tuning, min_size_bytes, &git).await }
        })
        .buffer_unordered(workers);
    tokio::pin!(results);

    let mut processed = 0usize;
    while let Some(classified) = results.next().await {
        processed += 1;
        let current_path = classified.path.clone();
        match classified.outcome {
            Ok(Some(project)) => outcome.projects.push(project),
            Ok(None) => outcome.stats.skipped_below_min_size += 1,
            Err(message) => {
                let _ = tx.send(ScanEvent::Warning { path: current_path.clone(), message: message.clone() });
                outcome.errors.push(ScanIssue { path: current_path.clone(), message });
            }
        }
        // Batched progress to bound callback overhead, always on the last one
        if processed % progress_batch == 0 || processed == total {
            let _ = tx.send(ScanEvent::Progress { processed, total, current_path });
        }
    }

    outcome.cancelled = cancel.is_cancelled();
    outcome.stats.processed = processed;
    outcome.stats.duration_ms = started.elapsed().as_millis() as u64;

    if outcome.cancelled {
        let _ = tx.send(ScanEvent::Cancelled);
    } else {
        let _ = tx.send(ScanEvent::Done {
            projects: outcome.projects.len(),
            errors: outcome.errors.len(),
        });
    }
    Ok(outcome)
}

/// Finds candidate project directories under `root`: every parent of a
/// version-control marker directory, plus the root itself when it is a
/// repository with no nested candidates or was explicitly flagged.
pub fn discover_candidates(
    root: &Path,
    include_as_project: bool,
    ignore: &GlobSet,
    max_depth: Option<u32>,
) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = Vec::new();
    let mut walker = WalkDir::new(root);
    if let Some(depth) = max_depth {
        // Marker dirs sit one level below their candidate
        walker = walker.max_depth(depth as usize + 1);
    }
    let mut it = walker.into_iter();
    while let Some(entry) = it.next() {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let path = entry.path();
        // Marker first: a pattern matching the marker name must never hide a
        // repository from discovery.
        if entry.file_name() == MARKER_DIR {
            if let Some(parent) = path.parent() {
                found.push(parent.to_path_buf());
            }
            it.skip_current_dir();
            continue;
        }
        if path != root && matches_ignores(path, ignore) {
            it.skip_current_dir();
        }
    }

    let root_is_repo = GitClient::is_repo(root);
    let has_nested = found.iter().any(|c| c != root);
    found.retain(|c| c != root);
    // Root-Heuristik: ohne Flag nur aufnehmen, wenn keine geschachtelten
    // Kandidaten übrig sind
    if include_as_project || (root_is_repo && !has_nested) {
        found.insert(0, root.to_path_buf());
    }
    found
}

struct Classified {
    path: String,
    outcome: Result<Option<Project>, String>,
}

async fn classify_candidate(
    dir: PathBuf,
    prior: Option<Project>,
    tuning: &ScannerConfig,
    min_size_bytes: u64,
    git: &GitClient,
) -> Classified {
    let display_path = canonical_path_string(&dir);
    let sample = {
        let dir = dir.clone();
        let tuning = tuning.clone();
        tokio::task::spawn_blocking(move || sample_directory(&dir, &tuning))
            .await
            .map_err(|e| e.to_string())
            .and_then(|r| r)
    };
    let sample = match sample {
        Ok(s) => s,
        Err(message) => return Classified { path: display_path, outcome: Err(message) },
    };

    // Size is a capped approximation; candidates below the floor are skipped,
    // not errors.
    if sample.size_bytes < min_size_bytes {
        return Classified { path: display_path, outcome: Ok(None) };
    }

    let is_repo = GitClient::is_repo(&dir);
    let meta = if is_repo { git.collect(&dir).await } else { Default::default() };
    let provider = meta.remotes.first().and_then(|r| r.provider.clone());

    let dir_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| display_path.clone());

    let now = chrono::Utc::now().to_rfc3339();
    let user_modified =
        prior.as_ref().map(|p| p.scan_status == ScanStatus::UserModified).unwrap_or(false);

    let project = Project {
        // Identity reconciliation: an existing record at this exact path keeps
        // its id, creation time and user-owned fields.
        id: prior.as_ref().map(|p| p.id.clone()).unwrap_or_else(|| Uuid::new_v4().to_string()),
        name: match &prior {
            Some(p) if user_modified => p.name.clone(),
            _ => dir_name,
        },
        path: display_path.clone(),
        kind: if is_repo { ProjectKind::Git } else { ProjectKind::Local },
        tags: prior.as_ref().map(|p| p.tags.clone()).unwrap_or_default(),
        importance: prior.as_ref().map(|p| p.importance).unwrap_or(0),
        size_bytes: sample.size_bytes,
        created_at: prior.as_ref().and_then(|p| p.created_at.clone()).or(sample.created_at),
        modified_at: sample.modified_at,
        file_count: sample.file_count,
        provider,
        last_commit: meta.commit,
        branch: meta.branch,
        remotes: meta.remotes,
        readme_files: sample.readme_files,
        description: prior.as_ref().and_then(|p| p.description.clone()),
        language: sample.language,
        // A user-modified record stays user-modified so later scans keep
        // preserving the user-owned fields
        scan_status: if user_modified { ScanStatus::UserModified } else { ScanStatus::Complete },
        last_scanned_at: Some(now),
    };
    Classified { path: display_path, outcome: Ok(Some(project)) }
}

struct DirSample {
    size_bytes: u64,
    file_count: u64,
    readme_files: Vec<String>,
    language: Option<String>,
    created_at: Option<String>,
    modified_at: Option<String>,
}

/// One synchronous pass over a candidate directory: capped size sample,
/// bounded file count, readme discovery and language detection.
fn sample_directory(dir: &Path, tuning: &ScannerConfig) -> Result<DirSample, String> {
    let meta = fs::metadata(dir).map_err(|e| format!("failed to stat: {}", e))?;
    let created_at = meta.created().ok().map(to_rfc3339);
    let modified_at = meta.modified().ok().map(to_rfc3339);

    let mut size_bytes: u64 = 0;
    let mut file_count: u64 = 0;
    let mut readme_files: Vec<String> = Vec::new();

    let depth = tuning.sample_depth.max(tuning.file_count_depth).max(tuning.readme_depth);
    let mut it = WalkDir::new(dir).max_depth(depth).into_iter();
    while let Some(entry) = it.next() {
        let Ok(entry) = entry else { continue };
        // Never sample inside the marker directory
        if entry.file_type().is_dir() && entry.file_name() == MARKER_DIR {
            it.skip_current_dir();
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        let entry_depth = entry.depth();
        if entry_depth <= tuning.file_count_depth {
            file_count += 1;
        }
        if entry_depth <= tuning.sample_depth && size_bytes < tuning.size_sample_cap_bytes {
            if let Ok(md) = entry.metadata() {
                size_bytes = size_bytes.saturating_add(md.len());
            }
        }
        if entry_depth <= tuning.readme_depth {
            let name = entry.file_name().to_string_lossy();
            if name.to_ascii_lowercase().starts_with("readme") {
                if let Ok(rel) = entry.path().strip_prefix(dir) {
                    readme_files.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
        }
    }
    readme_files.sort();

    let language = detect_language(dir);
    Ok(DirSample { size_bytes, file_count, readme_files, language, created_at, modified_at })
}

/// Primary-language detection: fixed priority order, marker files beat
/// extensions, first match wins.
pub fn detect_language(dir: &Path) -> Option<String> {
    let mut names: HashSet<String> = HashSet::new();
    let mut extensions: HashSet<String> = HashSet::new();
    if let Ok(rd) = fs::read_dir(dir) {
        for entry in rd.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some((_, ext)) = name.rsplit_once('.') {
                extensions.insert(ext.to_ascii_lowercase());
            }
            names.insert(name);
        }
    }
    for (lang, markers, _) in LANGUAGE_MARKERS {
        if markers.iter().any(|m| names.contains(*m)) {
            return Some((*lang).to_string());
        }
    }
    for (lang, _, exts) in LANGUAGE_MARKERS {
        if exts.iter().any(|e| extensions.contains(*e)) {
            return Some((*lang).to_string());
        }
    }
    None
}

/// Builds the ignore globset used for marker discovery. Patterns that would
/// match the marker directory itself are dropped so nested repositories stay
/// discoverable even when the marker name appears in the general ignore list.
pub fn discovery_globset(patterns: &[String]) -> AppResult<GlobSet> {
    let mut b = GlobSetBuilder::new();
    for p in patterns {
        if p.trim().is_empty() {
            continue;
        }
        // Backslashes zu Slashes normalisieren, damit Muster plattformunabhängig
        // mit der Pfadnormalisierung in `matches_ignores` übereinstimmen.
        let norm = p.trim().replace('\\', "/");
        let g = Glob::new(&norm)?;
        let m = g.compile_matcher();
        if m.is_match(MARKER_DIR) || m.is_match(format!("repo/{}", MARKER_DIR)) {
            continue;
        }
        b.add(g);
    }
    Ok(b.build()?)
}

pub fn matches_ignores(path: &Path, set: &GlobSet) -> bool {
    if set.is_empty() {
        return false;
    }
    let s = path.to_string_lossy().replace('\\', "/");
    if set.is_match(&s) {
        return true;
    }
    // Auch gegen den Verzeichnisnamen allein matchen ("node_modules")
    path.file_name().map(|n| set.is_match(n.to_string_lossy().as_ref())).unwrap_or(false)
}

fn to_rfc3339(t: std::time::SystemTime) -> String {
    chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339()
}
