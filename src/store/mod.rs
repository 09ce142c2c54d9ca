use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};

use crate::error::{AppError, AppResult, OptionExt};
use crate::types::{Project, ProjectPatch, ProjectsData, ScanStatus, CATALOG_VERSION};

/// Single-writer JSON-backed record store for the project catalog.
///
/// The handle is cheap to clone and shares one in-memory document.
/// Durability model: every flush stages the full document to a `.tmp`
/// sibling, copies the previous main file to `.bak` (best-effort), then
/// atomically renames the staging file over the main file. A crash mid-flush
/// therefore leaves either the old main+backup intact or the new main fully
/// written, never a half-written catalog.
#[derive(Clone)]
pub struct ProjectStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    path: PathBuf,
    backup_path: PathBuf,
    tmp_path: PathBuf,
    debounce: Duration,
    data: RwLock<ProjectsData>,
    flush_lock: Mutex<()>,
    last_mutation: std::sync::Mutex<Instant>,
    flush_pending: AtomicBool,
}

impl ProjectStore {
    /// Opens (or initializes) the catalog at `path`. Corruption is self-healing:
    /// an unreadable main file falls back to the backup, and a broken backup
    /// falls back to an empty catalog. Data loss is logged, never fatal.
    pub async fn open(path: impl Into<PathBuf>, debounce_ms: u64) -> AppResult<Self> {
        let path = path.into();
        let backup_path = sibling(&path, "bak");
        let tmp_path = sibling(&path, "tmp");

        let (data, needs_rewrite) = load_catalog(&path, &backup_path).await;

        let store = Self {
            inner: Arc::new(StoreInner {
                path,
                backup_path,
                tmp_path,
                debounce: Duration::from_millis(debounce_ms.max(1)),
                data: RwLock::new(data),
                flush_lock: Mutex::new(()),
                last_mutation: std::sync::Mutex::new(Instant::now()),
                flush_pending: AtomicBool::new(false),
            }),
        };
        if needs_rewrite {
            // Re-establish a valid main file right away (fresh catalog,
            // migrated shape, or backup recovery).
            store.flush().await?;
        }
        Ok(store)
    }

    pub async fn all(&self) -> Vec<Project> {
        self.inner.data.read().await.projects.clone()
    }

    pub async fn snapshot(&self) -> ProjectsData {
        self.inner.data.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<Project> {
        self.inner.data.read().await.projects.iter().find(|p| p.id == id).cloned()
    }

    pub async fn get_by_path(&self, path: &str) -> Option<Project> {
        self.inner.data.read().await.projects.iter().find(|p| p.path == path).cloned()
    }

    /// Inserts or replaces a record. Identity resolution: id first, then
    /// path — a record recreated under a new id at a known path replaces the
    /// existing row instead of duplicating it ("same path wins identity over
    /// same id"). The catalog never holds two records for one path.
    pub async fn upsert(&self, project: Project) {
        {
            let mut data = self.inner.data.write().await;
            let by_id = data.projects.iter().position(|p| p.id == project.id);
            let slot = by_id.or_else(|| data.projects.iter().position(|p| p.path == project.path));
            let keep_id = project.id.clone();
            let path = project.path.clone();
            match slot {
                Some(i) => data.projects[i] = project,
                None => data.projects.push(project),
            }
            data.projects.retain(|p| p.path != path || p.id == keep_id);
            data.meta.project_count = data.projects.len();
            data.meta.last_scan_at = Some(chrono::Utc::now().to_rfc3339());
        }
        self.schedule_flush();
    }

    /// Merges a partial update into an existing record and marks it
    /// `user-modified` so later scans preserve the user-owned fields.
    pub async fn update_fields(&self, id: &str, patch: ProjectPatch) -> AppResult<Project> {
        let updated = {
            let mut data = self.inner.data.write().await;
            let project =
                data.projects.iter_mut().find(|p| p.id == id).ok_or_not_found("project")?;
            if let Some(name) = patch.name {
                project.name = name;
            }
            if let Some(tags) = patch.tags {
                project.tags = tags;
            }
            if let Some(importance) = patch.importance {
                project.importance = importance;
            }
            if let Some(description) = patch.description {
                project.description = Some(description);
            }
            project.scan_status = ScanStatus::UserModified;
            project.clone()
        };
        self.schedule_flush();
        Ok(updated)
    }

    /// Removes a record by id. Returns whether anything was actually removed.
    pub async fn delete(&self, id: &str) -> bool {
        let removed = {
            let mut data = self.inner.data.write().await;
            let before = data.projects.len();
            data.projects.retain(|p| p.id != id);
            data.meta.project_count = data.projects.len();
            before != data.projects.len()
        };
        if removed {
            self.schedule_flush();
        }
        removed
    }

    /// Durable write of the full catalog, bypassing the debounce window.
    /// Callers that need a durability guarantee before proceeding await this.
    pub async fn flush(&self) -> AppResult<()> {
        let inner = &self.inner;
        let _guard = inner.flush_lock.lock().await;
        let payload = {
            let mut data = inner.data.write().await;
            data.meta.project_count = data.projects.len();
            data.meta.version = data.meta.version.max(CATALOG_VERSION);
            serde_json::to_string_pretty(&*data)
                .map_err(|e| AppError::Store(format!("serialize catalog: {}", e)))?
        };
        if let Some(parent) = inner.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&inner.tmp_path, payload).await?;
        // Best-effort backup of the previous main file; a failed backup is
        // logged but never aborts the flush.
        if inner.path.exists() {
            if let Err(e) = tokio::fs::copy(&inner.path, &inner.backup_path).await {
                tracing::warn!(
                    "failed to write catalog backup {}: {}",
                    inner.backup_path.display(),
                    e
                );
            }
        }
        tokio::fs::rename(&inner.tmp_path, &inner.path).await?;
        Ok(())
    }

    /// Schedules a debounced flush: repeated small mutations coalesce into a
    /// single disk write once the catalog has been quiet for the configured
    /// window. An explicit `flush` call bypasses the window.
    pub fn schedule_flush(&self) {
        let inner = &self.inner;
        if let Ok(mut last) = inner.last_mutation.lock() {
            *last = Instant::now();
        }
        if inner.flush_pending.swap(true, Ordering::SeqCst) {
            return;
        }
        let store = self.clone();
        tokio::spawn(async move {
            loop {
                let since = match store.inner.last_mutation.lock() {
                    Ok(last) => last.elapsed(),
                    Err(_) => break,
                };
                if since >= store.inner.debounce {
                    break;
                }
                tokio::time::sleep(store.inner.debounce - since).await;
            }
            store.inner.flush_pending.store(false, Ordering::SeqCst);
            if let Err(e) = store.flush().await {
                tracing::warn!("debounced catalog flush failed: {}", e);
            }
        });
    }

    pub fn catalog_path(&self) -> &Path {
        &self.inner.path
    }

    pub fn backup_path(&self) -> &Path {
        &self.inner.backup_path
    }
}

/// Loads the catalog with backup fallback. The second tuple element reports
/// whether the main file must be rewritten (missing, migrated or recovered).
async fn load_catalog(path: &Path, backup_path: &Path) -> (ProjectsData, bool) {
    match read_catalog(path).await {
        Ok((data, migrated)) => (data, migrated),
        Err(e) if path.exists() => {
            tracing::warn!("catalog {} unreadable ({}), trying backup", path.display(), e);
            match read_catalog(backup_path).await {
                Ok((data, _)) => {
                    tracing::warn!(
                        "recovered catalog from backup {} ({} projects)",
                        backup_path.display(),
                        data.projects.len()
                    );
                    (data, true)
                }
                Err(e2) => {
                    tracing::warn!(
                        "catalog backup also unreadable ({}), starting with an empty catalog",
                        e2
                    );
                    (empty_catalog(), true)
                }
            }
        }
        Err(_) => {
            // Erster Start: keine Datei vorhanden, leeren Katalog anlegen
            (empty_catalog(), true)
        }
    }
}

async fn read_catalog(path: &Path) -> AppResult<(ProjectsData, bool)> {
    let raw = tokio::fs::read_to_string(path).await?;
    let mut doc: Value =
        serde_json::from_str(&raw).map_err(|e| AppError::Store(format!("parse catalog: {}", e)))?;
    let migrated = migrate_catalog(&mut doc)?;
    let data: ProjectsData = serde_json::from_value(doc)
        .map_err(|e| AppError::Store(format!("catalog shape mismatch: {}", e)))?;
    Ok((data, migrated))
}

fn empty_catalog() -> ProjectsData {
    let mut data = ProjectsData::default();
    data.meta.version = CATALOG_VERSION;
    data
}

/// Applies forward-only, idempotent migrations keyed by `meta.version` and
/// stamps the current version. Returns whether the document changed shape.
pub fn migrate_catalog(doc: &mut Value) -> AppResult<bool> {
    if !doc.is_object() {
        return Err(AppError::Store("catalog root is not an object".into()));
    }
    if doc.get("meta").map(|m| !m.is_object()).unwrap_or(true) {
        doc["meta"] = json!({});
    }
    let version = doc.pointer("/meta/version").and_then(Value::as_u64).unwrap_or(0) as u32;

    let mut changed = false;
    if version < 1 {
        // v0 -> v1: back-fill scanStatus and tags on every record
        if let Some(projects) = doc.get_mut("projects").and_then(Value::as_array_mut) {
            for p in projects.iter_mut() {
                if p.get("scanStatus").is_none() {
                    p["scanStatus"] = json!("complete");
                    changed = true;
                }
                if p.get("tags").is_none() {
                    p["tags"] = json!([]);
                    changed = true;
                }
            }
        }
    }

    if version < CATALOG_VERSION {
        doc["meta"]["version"] = json!(CATALOG_VERSION);
        changed = true;
    }
    Ok(changed)
}

fn sibling(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    name.push('.');
    name.push_str(ext);
    path.with_file_name(name)
}

/// Separate key-value settings document: lazily loaded, defaulted when the
/// file is absent, cached until explicitly rewritten. Lower criticality than
/// the catalog, so no backup or versioning.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<SettingsInner>,
}

struct SettingsInner {
    path: PathBuf,
    cache: RwLock<Option<Value>>,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { inner: Arc::new(SettingsInner { path: path.into(), cache: RwLock::new(None) }) }
    }

    pub async fn get(&self) -> AppResult<Value> {
        if let Some(cached) = self.inner.cache.read().await.clone() {
            return Ok(cached);
        }
        let value = match tokio::fs::read_to_string(&self.inner.path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(
                    "settings {} unreadable ({}), using defaults",
                    self.inner.path.display(),
                    e
                );
                default_settings()
            }),
            Err(_) => default_settings(),
        };
        *self.inner.cache.write().await = Some(value.clone());
        Ok(value)
    }

    pub async fn update(&self, value: Value) -> AppResult<()> {
        if !value.is_object() {
            return Err(AppError::InvalidInput("settings must be a JSON object".into()));
        }
        if let Some(parent) = self.inner.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_string_pretty(&value)
            .map_err(|e| AppError::Store(format!("serialize settings: {}", e)))?;
        tokio::fs::write(&self.inner.path, payload).await?;
        *self.inner.cache.write().await = Some(value);
        Ok(())
    }
}

pub fn default_settings() -> Value {
    json!({
        "scanRoots": [],
        "ignorePatterns": [],
        "toolCommands": {}
    })
}
