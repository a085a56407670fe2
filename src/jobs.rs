//! Background pipeline runs with status polling by task id.

use crate::pipeline::{TranslateRequest, VideoTranslator};
use crate::progress::{CancelFlag, ProgressEvent, ProgressReporter, Stage};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Snapshot of a background job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub stage: Stage,
    pub message: String,
    pub percent: Option<f64>,
    /// Language code to subtitle path, set when the job finishes.
    pub result: Option<BTreeMap<String, PathBuf>>,
    /// Languages that failed under the isolate policy.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<String, String>,
    pub error: Option<String>,
}

impl JobStatus {
    pub fn pending() -> Self {
        Self {
            stage: Stage::Pending,
            message: "Queued".to_string(),
            percent: Some(0.0),
            result: None,
            failures: BTreeMap::new(),
            error: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.stage, Stage::Done | Stage::Failed)
    }
}

/// Shared job table. Every write replaces a job's whole status under the lock.
#[derive(Debug, Clone, Default)]
pub struct ProgressStore {
    jobs: Arc<RwLock<HashMap<Uuid, JobStatus>>>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: Uuid, status: JobStatus) {
        self.write().insert(id, status);
    }

    pub fn get(&self, id: &Uuid) -> Option<JobStatus> {
        self.jobs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned()
    }

    /// Replace the status of `id` with `f(old)`. Unknown ids are ignored.
    pub fn update(&self, id: &Uuid, f: impl FnOnce(&JobStatus) -> JobStatus) {
        let mut jobs = self.write();
        if let Some(current) = jobs.get(id) {
            let next = f(current);
            jobs.insert(*id, next);
        }
    }

    pub fn remove(&self, id: &Uuid) -> Option<JobStatus> {
        self.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.jobs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fold a progress event into the job's status.
    ///
    /// Terminal events are skipped; the runner writes the terminal status
    /// together with the result or error.
    fn apply_event(&self, id: &Uuid, event: &ProgressEvent) {
        if matches!(event.stage, Stage::Done | Stage::Failed) {
            return;
        }
        self.update(id, |current| JobStatus {
            stage: event.stage,
            message: event.message.clone(),
            percent: event.percent.or(current.percent),
            ..current.clone()
        });
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, JobStatus>> {
        self.jobs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Finished jobs kept in the store before the oldest are evicted.
pub const DEFAULT_RETENTION: usize = 100;

/// Runs pipelines on the tokio runtime and tracks them in a [`ProgressStore`].
///
/// Only the most recent `retention` finished jobs stay queryable; running
/// jobs are never evicted.
pub struct JobRunner {
    pipeline: Arc<VideoTranslator>,
    store: ProgressStore,
    cancels: Arc<Mutex<HashMap<Uuid, CancelFlag>>>,
    finished: Arc<Mutex<VecDeque<Uuid>>>,
    retention: usize,
}

impl JobRunner {
    pub fn new(pipeline: Arc<VideoTranslator>, store: ProgressStore) -> Self {
        Self {
            pipeline,
            store,
            cancels: Arc::new(Mutex::new(HashMap::new())),
            finished: Arc::new(Mutex::new(VecDeque::new())),
            retention: DEFAULT_RETENTION,
        }
    }

    /// Keep at most `retention` finished jobs in the store.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    /// Start processing `request` in the background and return its task id.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, request: TranslateRequest) -> Uuid {
        let id = Uuid::new_v4();
        let cancel = CancelFlag::new();

        self.store.insert(id, JobStatus::pending());
        self.cancels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, cancel.clone());

        let sink = self.store.clone();
        let reporter = ProgressReporter::new(Arc::new(move |event: &ProgressEvent| {
            sink.apply_event(&id, event);
        }));

        let pipeline = self.pipeline.clone();
        let store = self.store.clone();
        let cancels = self.cancels.clone();
        let finished = self.finished.clone();
        let retention = self.retention;
        info!("Job {} submitted for {}", id, request.video.display());

        tokio::spawn(async move {
            let outcome = pipeline.process_video(&request, &reporter, &cancel).await;
            // Finished jobs can no longer be cancelled
            cancels
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&id);

            match outcome {
                Ok(result) => {
                    info!("Job {} finished with {} file(s)", id, result.subtitles.len());
                    store.update(&id, |_| JobStatus {
                        stage: Stage::Done,
                        message: "Subtitles complete".to_string(),
                        percent: Some(1.0),
                        result: Some(result.subtitles),
                        failures: result.failures,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!("Job {} failed: {}", id, e);
                    store.update(&id, |current| JobStatus {
                        stage: Stage::Failed,
                        message: "Processing failed".to_string(),
                        error: Some(e.to_string()),
                        ..current.clone()
                    });
                }
            }

            let mut finished = finished
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            finished.push_back(id);
            while finished.len() > retention {
                if let Some(old) = finished.pop_front() {
                    debug!("Evicting finished job {}", old);
                    store.remove(&old);
                }
            }
        });

        id
    }

    pub fn status(&self, id: &Uuid) -> Option<JobStatus> {
        self.store.get(id)
    }

    /// Request cancellation; returns false if the job is unknown or finished.
    pub fn cancel(&self, id: &Uuid) -> bool {
        match self
            .cancels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
        {
            Some(flag) => {
                flag.cancel();
                true
            }
            None => false,
        }
    }
}
