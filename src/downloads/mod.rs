//! Download request lifecycle.
//!
//! `start` inserts a `pending` row and spawns a job that walks the row through
//! `in_progress` (persisting progress at 20/40/60/80) to `completed`. Every
//! write goes through the guarded transitions in `storage`, so a job whose
//! row was edited, failed or deleted underneath it simply stops.

use std::{sync::Arc, time::Duration};

use rand::Rng;
use serde_json::json;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{
    config::AppConfig,
    error::{AppError, AppResult, OptionExt},
    metrics::Metrics,
    state::{JobHandle, JobRegistry},
    storage::{StatusChange, Storage, MAX_CLEANUP_DAYS, MAX_DOWNLOAD_TIMEOUT_SECS},
    types::{
        ts_from, DownloadEvent, DownloadRequest, DownloadStatus, NewDownload, NewLog, Platform, UpdateDownloadRequest,
    },
};

const PROGRESS_STEPS: [i64; 4] = [20, 40, 60, 80];
const FILE_SIZE_RANGE: std::ops::Range<i64> = 1_000_000..11_000_000;

#[derive(Debug, Error)]
enum JobError {
    #[error("Download cancelled")]
    Cancelled,
    #[error("Download timed out after {0}s")]
    TimedOut(u64),
    /// The row left the expected status (manual edit or deletion).
    #[error("download request changed while processing")]
    Superseded,
    #[error("{0}")]
    Storage(#[from] sqlx::Error),
}

struct Finished {
    file_name: String,
    file_size: i64,
}

/// `My Song!` becomes `My_Song_.mp3`; an empty title becomes `download.<ext>`.
pub fn synthesize_file_name(title: Option<&str>, platform: Platform) -> String {
    let stem: String = title
        .filter(|t| !t.is_empty())
        .map(|t| t.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }).collect())
        .unwrap_or_else(|| "download".to_string());
    format!("{}.{}", stem, platform.extension())
}

#[derive(Clone)]
pub struct DownloadService {
    storage: Storage,
    config: Arc<AppConfig>,
    metrics: Metrics,
    jobs: JobRegistry,
}

impl DownloadService {
    pub fn new(storage: Storage, config: Arc<AppConfig>, metrics: Metrics, jobs: JobRegistry) -> Self {
        Self { storage, config, metrics, jobs }
    }

    /// Creates the row and spawns its processing job. Returns the `pending` row.
    pub async fn start(&self, new: NewDownload) -> AppResult<DownloadRequest> {
        let platform = new.platform;
        if !self.storage.setting_enabled(platform.setting_key()).await? {
            return Err(AppError::BadRequest(format!("{} downloads are disabled", platform)));
        }

        let request = self.storage.create_download(&new).await?;
        self.metrics.inc_downloads_started();
        tracing::info!(id = %request.id, %platform, "download queued");

        self.storage
            .audit(
                NewLog::info("Download started")
                    .details(format!(
                        "Started download for {}: {}",
                        platform,
                        new.title.as_deref().unwrap_or("Unknown")
                    ))
                    .user(&request.user_id)
                    .request(&request.id),
            )
            .await;

        let (tx, _rx) = broadcast::channel::<DownloadEvent>(64);
        let cancel = CancellationToken::new();
        {
            let mut jobs = self.jobs.write().await;
            jobs.insert(request.id.clone(), JobHandle { cancel: cancel.clone(), sender: tx.clone() });
        }

        let svc = self.clone();
        let job_request = request.clone();
        let title = new.title.clone();
        tokio::spawn(async move {
            svc.process(job_request, title, platform, tx, cancel).await;
        });

        Ok(request)
    }

    async fn process(
        &self,
        request: DownloadRequest,
        title: Option<String>,
        platform: Platform,
        tx: broadcast::Sender<DownloadEvent>,
        cancel: CancellationToken,
    ) {
        let id = request.id.clone();
        let timeout_secs = self.timeout_secs().await;
        let _ = tx.send(DownloadEvent::Started { id: id.clone(), platform: platform.to_string() });

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(JobError::Cancelled),
            res = tokio::time::timeout(Duration::from_secs(timeout_secs), self.run_steps(&id, title.as_deref(), platform, &tx)) => {
                res.unwrap_or(Err(JobError::TimedOut(timeout_secs)))
            }
        };

        match outcome {
            Ok(done) => {
                self.metrics.inc_downloads_completed();
                self.metrics.add_bytes(done.file_size as u64);
                tracing::info!(%id, file = %done.file_name, "download completed");
                self.storage
                    .audit(
                        NewLog::info("Download completed")
                            .details(format!(
                                "Successfully downloaded {} from {}",
                                title.as_deref().unwrap_or("Unknown"),
                                platform
                            ))
                            .user(&request.user_id)
                            .request(&id),
                    )
                    .await;
                let _ = tx.send(DownloadEvent::Completed {
                    id: id.clone(),
                    file_name: done.file_name,
                    file_size: done.file_size,
                });
            }
            Err(JobError::Superseded) => {
                tracing::debug!(%id, "download job stopped, row changed underneath");
            }
            Err(e) => self.fail(&request, title.as_deref(), &e.to_string(), &tx).await,
        }

        self.jobs.write().await.remove(&id);
    }

    async fn run_steps(
        &self,
        id: &str,
        title: Option<&str>,
        platform: Platform,
        tx: &broadcast::Sender<DownloadEvent>,
    ) -> Result<Finished, JobError> {
        let step = Duration::from_millis(self.config.simulation.step_delay_ms);

        self.advance(id, DownloadStatus::InProgress, StatusChange { progress: Some(0), ..Default::default() })
            .await?;

        for progress in PROGRESS_STEPS {
            tokio::time::sleep(step).await;
            self.advance(id, DownloadStatus::InProgress, StatusChange { progress: Some(progress), ..Default::default() })
                .await?;
            let _ = tx.send(DownloadEvent::Progress { id: id.to_string(), progress });
        }

        let file_name = synthesize_file_name(title, platform);
        let file_path = std::path::Path::new(&self.config.storage.download_path)
            .join(&file_name)
            .to_string_lossy()
            .into_owned();
        let file_size = rand::rng().random_range(FILE_SIZE_RANGE);

        self.advance(
            id,
            DownloadStatus::Completed,
            StatusChange {
                progress: Some(100),
                file_name: Some(file_name.clone()),
                file_path: Some(file_path),
                file_size: Some(file_size),
                error_message: None,
            },
        )
        .await?;

        Ok(Finished { file_name, file_size })
    }

    async fn advance(&self, id: &str, next: DownloadStatus, change: StatusChange) -> Result<(), JobError> {
        if self.storage.transition_download(id, next, change).await? {
            Ok(())
        } else {
            Err(JobError::Superseded)
        }
    }

    async fn fail(
        &self,
        request: &DownloadRequest,
        title: Option<&str>,
        message: &str,
        tx: &broadcast::Sender<DownloadEvent>,
    ) {
        let change = StatusChange { error_message: Some(message.to_string()), ..Default::default() };
        match self.storage.transition_download(&request.id, DownloadStatus::Failed, change).await {
            Ok(true) => {
                self.metrics.inc_downloads_failed();
                tracing::warn!(id = %request.id, "download failed: {}", message);
                self.storage
                    .audit(
                        NewLog::error("Download failed")
                            .details(format!("Failed to download {}: {}", title.unwrap_or("Unknown"), message))
                            .user(&request.user_id)
                            .request(&request.id),
                    )
                    .await;
                let _ = tx.send(DownloadEvent::Failed { id: request.id.clone(), message: message.to_string() });
            }
            // row already terminal or deleted
            Ok(false) => tracing::debug!(id = %request.id, "skip failing download: {}", message),
            Err(e) => tracing::error!(id = %request.id, "could not mark download failed: {}", e),
        }
    }

    /// `downloadTimeout` setting, falling back to `limits.download_timeout_secs`.
    async fn timeout_secs(&self) -> u64 {
        match self.storage.setting_u64("downloadTimeout").await {
            Ok(Some(secs)) => secs.min(MAX_DOWNLOAD_TIMEOUT_SECS),
            Ok(None) => self.config.limits.download_timeout_secs,
            Err(e) => {
                tracing::warn!("reading downloadTimeout failed: {}", e);
                self.config.limits.download_timeout_secs
            }
        }
    }

    /// Manual edit from the dashboard. A status change must be a legal
    /// transition from the current status, otherwise `409 Conflict`.
    pub async fn update(&self, id: &str, changes: UpdateDownloadRequest) -> AppResult<DownloadRequest> {
        let current = self.storage.get_download(id).await?.ok_or_not_found("Download request")?;

        if let Some(next) = changes.status {
            if !current.status.can_transition_to(next) {
                return Err(AppError::Conflict(format!(
                    "Illegal status transition: {} -> {}",
                    current.status, next
                )));
            }
        }

        let updated = self
            .storage
            .update_download(id, current.status, &changes)
            .await?
            .ok_or_else(|| AppError::Conflict("Download request changed concurrently, retry".into()))?;

        if updated.status.is_terminal() {
            // a manual terminal status ends the simulated job
            if let Some(handle) = self.jobs.write().await.remove(id) {
                handle.cancel.cancel();
            }
        }
        Ok(updated)
    }

    /// Cancels a running job, then deletes the row.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        self.cancel(id).await;
        if self.storage.delete_download(id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound("Download request not found".into()))
        }
    }

    /// Returns whether a running job was cancelled.
    pub async fn cancel(&self, id: &str) -> bool {
        let handle = self.jobs.write().await.remove(id);
        match handle {
            Some(h) => {
                h.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn subscribe(&self, id: &str) -> Option<broadcast::Receiver<DownloadEvent>> {
        self.jobs.read().await.get(id).map(|h| h.sender.subscribe())
    }

    pub async fn running(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Cancels every running job and waits up to `grace` for them to record
    /// their `failed` status.
    pub async fn shutdown(&self, grace: Duration) {
        let tokens: Vec<CancellationToken> = self.jobs.read().await.values().map(|h| h.cancel.clone()).collect();
        if tokens.is_empty() {
            return;
        }
        tracing::info!(count = tokens.len(), "cancelling running downloads");
        for t in &tokens {
            t.cancel();
        }
        let deadline = tokio::time::Instant::now() + grace;
        while self.running().await > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// `cleanupDays` setting, falling back to `storage.cleanup_days`.
    /// Rows stored before range checks existed are capped.
    pub async fn cleanup_days(&self) -> AppResult<u64> {
        let days = self
            .storage
            .setting_u64("cleanupDays")
            .await?
            .unwrap_or(self.config.storage.cleanup_days as u64);
        Ok(days.min(MAX_CLEANUP_DAYS))
    }

    /// Creation timestamp before which completed files are cleanup-eligible.
    /// A cutoff before the representable range makes nothing eligible.
    pub fn cleanup_cutoff(days: u64) -> String {
        let cutoff = i64::try_from(days)
            .ok()
            .and_then(chrono::Duration::try_days)
            .and_then(|age| chrono::Utc::now().checked_sub_signed(age))
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);
        ts_from(cutoff)
    }

    /// Removes eligible files from disk (best effort) and deletes their rows.
    pub async fn cleanup_expired(&self, user_id: Option<&str>) -> AppResult<usize> {
        let days = self.cleanup_days().await?;
        let candidates = self.storage.cleanup_candidates(&Self::cleanup_cutoff(days)).await?;
        let mut removed = 0;
        for row in &candidates {
            if let Some(path) = row.file_path.as_deref() {
                match tokio::fs::remove_file(path).await {
                    Ok(()) => tracing::debug!(%path, "removed downloaded file"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => tracing::warn!(%path, "could not remove file: {}", e),
                }
            }
            if self.storage.delete_download(&row.id).await? {
                removed += 1;
            }
        }

        if removed > 0 {
            let mut log = NewLog::info("Storage cleanup")
                .details(format!("Removed {} files older than {} days", removed, days));
            if let Some(uid) = user_id {
                log = log.user(uid);
            }
            self.storage.audit(log).await;
        }
        tracing::info!(removed, days, "storage cleanup finished");
        Ok(removed)
    }

    /// Fails rows left `pending` or `in_progress` by a previous process.
    pub async fn recover_interrupted(&self) -> AppResult<usize> {
        let stale = self.storage.unfinished_downloads().await?;
        let mut failed = 0;
        for row in stale {
            let change = StatusChange {
                error_message: Some("Interrupted by server restart".into()),
                ..Default::default()
            };
            if self.storage.transition_download(&row.id, DownloadStatus::Failed, change).await? {
                failed += 1;
                self.storage
                    .audit(
                        NewLog::error("Download failed")
                            .details("Interrupted by server restart")
                            .user(&row.user_id)
                            .request(&row.id)
                            .metadata(json!({ "previousStatus": row.status })),
                    )
                    .await;
            }
        }
        Ok(failed)
    }
}
