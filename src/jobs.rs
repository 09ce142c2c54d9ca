use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{ScanDefaultsConfig, ScannerConfig};
use crate::error::{validation, AppError, AppResult};
use crate::git::GitClient;
use crate::metrics::Metrics;
use crate::scanner;
use crate::search::SearchIndex;
use crate::store::ProjectStore;
use crate::types::{
    canonical_path_string, JobEvent, JobStatus, Project, ScanConfig, ScanEvent, ScanJob,
    ScanOutcome, ScanProgress, ScanStatus,
};

/// A handle to the one scan that may be running at any time.
struct CurrentJob {
    id: Uuid,
    cancel: CancellationToken,
}

/// Orchestrates scans end to end: loads prior identity from the store, runs
/// the scanner, reconciles results back into the store, rebuilds the search
/// index, and tracks job state machines. Cheap to clone.
///
/// At most one job is `running` per manager. Starting a new scan cancels the
/// running one cooperatively; the superseded task checks job identity before
/// touching shared state so its late results never overwrite the new job.
#[derive(Clone)]
pub struct ScanJobManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    store: ProjectStore,
    index: SearchIndex,
    git: GitClient,
    tuning: ScannerConfig,
    defaults: ScanDefaultsConfig,
    metrics: Metrics,
    jobs: RwLock<HashMap<Uuid, ScanJob>>,
    current: Mutex<Option<CurrentJob>>,
    events: broadcast::Sender<JobEvent>,
}

impl ScanJobManager {
    pub fn new(
        store: ProjectStore,
        index: SearchIndex,
        git: GitClient,
        tuning: ScannerConfig,
        defaults: ScanDefaultsConfig,
        metrics: Metrics,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(ManagerInner {
                store,
                index,
                git,
                tuning,
                defaults,
                metrics,
                jobs: RwLock::new(HashMap::new()),
                current: Mutex::new(None),
                events,
            }),
        }
    }

    /// Subscribe to progress events of all jobs. A lagging receiver only
    /// loses its own backlog; delivery to other subscribers is unaffected.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    pub async fn job_status(&self, id: Uuid) -> Option<ScanJob> {
        self.inner.jobs.read().await.get(&id).cloned()
    }

    pub async fn current_job(&self) -> Option<ScanJob> {
        let id = self.inner.current.lock().await.as_ref().map(|c| c.id)?;
        self.job_status(id).await
    }

    /// Requests cooperative cancellation. Returns whether a running job with
    /// this id existed. The scan loop notices the flag before the next
    /// candidate; in-flight sub-operations complete naturally.
    pub async fn cancel(&self, id: Uuid) -> bool {
        let current = self.inner.current.lock().await;
        match current.as_ref() {
            Some(c) if c.id == id => {
                c.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Starts a scan and returns its job id immediately. A job already
    /// `running` is cancelled first; its record stays queryable.
    pub async fn start_scan(&self, config: ScanConfig) -> AppResult<Uuid> {
        if config.roots.is_empty() {
            return Err(AppError::InvalidInput("roots must not be empty".into()));
        }
        for root in &config.roots {
            validation::validate_path(&root.path)?;
        }
        validation::validate_concurrency(config.concurrency)?;
        let config = self.apply_defaults(config);

        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();

        // Replace the current-job pointer immediately; the old task keeps
        // running until it notices its token.
        {
            let mut current = self.inner.current.lock().await;
            if let Some(old) = current.take() {
                tracing::info!("cancelling running scan {} in favor of {}", old.id, id);
                old.cancel.cancel();
            }
            *current = Some(CurrentJob { id, cancel: cancel.clone() });
        }

        let job = ScanJob {
            id,
            status: JobStatus::Running,
            progress: ScanProgress::default(),
            result: None,
            error: None,
            started_at: chrono::Utc::now().to_rfc3339(),
            completed_at: None,
        };
        self.inner.jobs.write().await.insert(id, job);
        self.inner.metrics.inc_scans_started();

        // Prior identity map for reconciliation, keyed by canonical path
        let known: HashMap<String, Project> = self
            .inner
            .store
            .all()
            .await
            .into_iter()
            .map(|p| (canonical_path_string(std::path::Path::new(&p.path)), p))
            .collect();

        let (tx, rx) = broadcast::channel::<ScanEvent>(256);
        self.spawn_forwarder(id, rx);

        let manager = self.clone();
        tokio::spawn(async move {
            let outcome = scanner::run_scan(
                &config,
                &manager.inner.tuning,
                &manager.inner.git,
                &known,
                tx,
                cancel,
            )
            .await;
            manager.finish_job(id, outcome).await;
        });

        Ok(id)
    }

    fn apply_defaults(&self, mut config: ScanConfig) -> ScanConfig {
        let defaults = &self.inner.defaults;
        if config.ignore_patterns.is_empty() {
            config.ignore_patterns = defaults.ignore_patterns.clone();
        }
        if config.max_depth.is_none() {
            config.max_depth = defaults.max_depth;
        }
        if config.min_size_bytes == 0 {
            config.min_size_bytes = defaults.min_size_bytes;
        }
        if config.concurrency.is_none() {
            config.concurrency = defaults.concurrency;
        }
        config
    }

    /// Forwards scanner events to subscribers and keeps the job's own
    /// progress record current. Only this job's record is ever touched, so a
    /// superseded job cannot clobber its replacement.
    fn spawn_forwarder(&self, id: Uuid, rx: broadcast::Receiver<ScanEvent>) {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut stream = BroadcastStream::new(rx);
            while let Some(item) = stream.next().await {
                let event = match item {
                    Ok(ev) => ev,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::debug!("scan {} progress forwarder lagged by {}", id, skipped);
                        continue;
                    }
                };
                if let ScanEvent::Progress { processed, total, current_path } = &event {
                    let mut jobs = manager.inner.jobs.write().await;
                    if let Some(job) = jobs.get_mut(&id) {
                        if job.status == JobStatus::Running {
                            job.progress = ScanProgress {
                                processed: *processed,
                                total: *total,
                                current_path: Some(current_path.clone()),
                            };
                        }
                    }
                }
                if matches!(event, ScanEvent::Warning { .. }) {
                    manager.inner.metrics.add_warnings(1);
                }
                let _ = manager.inner.events.send(JobEvent { job_id: id, event });
            }
        });
    }

    async fn is_current(&self, id: Uuid) -> bool {
        self.inner.current.lock().await.as_ref().map(|c| c.id == id).unwrap_or(false)
    }

    async fn finish_job(&self, id: Uuid, outcome: AppResult<ScanOutcome>) {
        match outcome {
            Ok(outcome) => {
                let still_current = self.is_current(id).await;
                let reconciled = if still_current {
                    // Store and index must be consistent before the job flips
                    // to a terminal success state.
                    self.reconcile(&outcome).await
                } else {
                    tracing::debug!("scan {} superseded; skipping store reconciliation", id);
                    Ok(())
                };

                match reconciled {
                    Ok(()) => {
                        let status = if outcome.cancelled || !still_current {
                            self.inner.metrics.inc_scans_cancelled();
                            JobStatus::Cancelled
                        } else {
                            self.inner.metrics.inc_scans_completed();
                            JobStatus::Complete
                        };
                        self.inner.metrics.add_candidates(outcome.stats.processed as u64);
                        self.inner.metrics.add_projects(outcome.projects.len() as u64);
                        self.finalize(id, status, Some(outcome), None).await;
                    }
                    Err(e) => {
                        self.inner.metrics.inc_scans_failed();
                        tracing::error!("scan {} reconciliation failed: {}", id, e);
                        self.finalize(id, JobStatus::Error, Some(outcome), Some(e.to_string()))
                            .await;
                    }
                }
            }
            Err(e) => {
                self.inner.metrics.inc_scans_failed();
                let message = e.to_string();
                let _ = self.inner.events.send(JobEvent {
                    job_id: id,
                    event: ScanEvent::Failed { message: message.clone() },
                });
                self.finalize(id, JobStatus::Error, None, Some(message)).await;
            }
        }

        // Always release the current-job slot if it is still ours
        let mut current = self.inner.current.lock().await;
        if current.as_ref().map(|c| c.id == id).unwrap_or(false) {
            *current = None;
        }
    }

    /// Upserts scan results into the store, awaits a durable flush, then
    /// rebuilds the index from the full catalog — store and index are
    /// consistent before the caller finalizes the job.
    async fn reconcile(&self, outcome: &ScanOutcome) -> AppResult<()> {
        let store = &self.inner.store;
        for project in &outcome.projects {
            let mut record = project.clone();
            // A record the user touched mid-scan keeps its user-owned fields
            if let Some(existing) = store.get(&record.id).await {
                if existing.scan_status == ScanStatus::UserModified {
                    record.name = existing.name;
                    record.tags = existing.tags;
                    record.importance = existing.importance;
                    record.description = existing.description;
                    record.scan_status = ScanStatus::UserModified;
                }
            }
            store.upsert(record).await;
        }
        store.flush().await?;
        self.inner.index.build_index(store.all().await).await;
        Ok(())
    }

    async fn finalize(
        &self,
        id: Uuid,
        status: JobStatus,
        result: Option<ScanOutcome>,
        error: Option<String>,
    ) {
        let mut jobs = self.inner.jobs.write().await;
        if let Some(job) = jobs.get_mut(&id) {
            if job.status.is_terminal() {
                return;
            }
            job.status = status;
            job.result = result;
            job.error = error;
            job.completed_at = Some(chrono::Utc::now().to_rfc3339());
        }
    }
}
