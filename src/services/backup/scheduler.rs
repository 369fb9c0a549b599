//! Backup Scheduler
//!
//! Turns a stream of "data changed" notifications into a modest number of
//! backups:
//!
//! - bursts of changes collapse into one backup, `debounce_ms` after the last
//!   notification;
//! - two backups never start less than `min_interval_ms` apart; a timer that
//!   fires too early is re-armed for the remainder;
//! - at most one backup runs at a time. A change that arrives while one is
//!   running is kept pending and scheduled once it finishes.
//!
//! The scheduler is one owned, cheaply cloneable instance. Time, timers and
//! the backup job itself are injected so tests can drive it with paused time
//! and a fake job.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use async_trait::async_trait;
use jurisdesk_core::{backup_filename, BackupConfig, BackupInfo};
use tokio::runtime::Handle;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::clock::{Clock, Timer, TimerHandle, TokioClock, TokioTimer};
use super::codec::SnapshotCodec;
use super::snapshotter::Snapshotter;
use super::store::BackupStore;
use crate::storage::config::BackupConfigStore;
use crate::storage::secret::SessionSecretStore;
use crate::utils::error::{AppError, AppResult};

/// Inputs for one backup cycle
#[derive(Clone)]
pub struct SnapshotRequest {
    pub password: String,
    pub config: BackupConfig,
}

impl std::fmt::Debug for SnapshotRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotRequest")
            .field("password", &"<redacted>")
            .field("config", &self.config)
            .finish()
    }
}

/// One complete backup cycle
#[async_trait]
pub trait SnapshotJob: Send + Sync + 'static {
    async fn run(&self, request: SnapshotRequest) -> AppResult<BackupInfo>;
}

/// Export, encrypt, write, rotate
#[derive(Debug, Clone)]
pub struct SnapshotPipeline {
    snapshotter: Snapshotter,
    codec: SnapshotCodec,
    store: Arc<BackupStore>,
    config_store: BackupConfigStore,
}

impl SnapshotPipeline {
    pub fn new(
        snapshotter: Snapshotter,
        codec: SnapshotCodec,
        store: Arc<BackupStore>,
        config_store: BackupConfigStore,
    ) -> Self {
        Self {
            snapshotter,
            codec,
            store,
            config_store,
        }
    }

    fn run_blocking(&self, request: &SnapshotRequest) -> AppResult<BackupInfo> {
        let snapshot = self.snapshotter.export()?;
        let bytes = self.codec.encode(&snapshot, &request.password)?;

        let dir = self.store.resolve_directory(&request.config)?;
        let filename = backup_filename(snapshot.created_at);
        let info = self.store.write(&dir, &filename, &bytes)?;

        if let Err(e) = self.store.rotate(&dir, request.config.max_backups) {
            warn!("[BackupScheduler] Rotation failed in {}: {}", dir.display(), e);
        }
        if let Err(e) = self.config_store.record_success(info.created_at) {
            warn!("[BackupScheduler] Failed to record backup time: {}", e);
        }
        Ok(info)
    }
}

#[async_trait]
impl SnapshotJob for SnapshotPipeline {
    async fn run(&self, request: SnapshotRequest) -> AppResult<BackupInfo> {
        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || pipeline.run_blocking(&request))
            .await
            .map_err(|e| AppError::internal(format!("Backup task failed: {}", e)))?
    }
}

#[derive(Debug)]
struct SchedulerState {
    config: BackupConfig,
    pending: bool,
    last_start: Option<Instant>,
    timer: Option<TimerHandle>,
    /// Bumped on every re-arm; a callback from an older timer is ignored.
    generation: u64,
}

struct Inner {
    state: Mutex<SchedulerState>,
    flight: Arc<tokio::sync::Mutex<()>>,
    job: Arc<dyn SnapshotJob>,
    secrets: Arc<SessionSecretStore>,
    clock: Arc<dyn Clock>,
    timer: Arc<dyn Timer>,
    runtime: Handle,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Debounced, rate-limited, single-flight backup scheduler
#[derive(Clone)]
pub struct BackupScheduler {
    inner: Arc<Inner>,
}

impl BackupScheduler {
    /// Build a scheduler on the current tokio runtime.
    pub fn new(
        config: BackupConfig,
        job: Arc<dyn SnapshotJob>,
        secrets: Arc<SessionSecretStore>,
    ) -> AppResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| AppError::internal(format!("No tokio runtime available: {}", e)))?;
        let timer = Arc::new(TokioTimer::with_handle(runtime.clone()));
        Ok(Self::with_parts(
            config,
            job,
            secrets,
            Arc::new(TokioClock),
            timer,
            runtime,
        ))
    }

    pub fn with_parts(
        config: BackupConfig,
        job: Arc<dyn SnapshotJob>,
        secrets: Arc<SessionSecretStore>,
        clock: Arc<dyn Clock>,
        timer: Arc<dyn Timer>,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SchedulerState {
                    config: config.normalized(),
                    pending: false,
                    last_start: None,
                    timer: None,
                    generation: 0,
                }),
                flight: Arc::new(tokio::sync::Mutex::new(())),
                job,
                secrets,
                clock,
                timer,
                runtime,
            }),
        }
    }

    /// Record that data changed. Cheap and callable from any thread.
    pub fn notify_change(&self) {
        let mut state = self.inner.lock_state();
        if !state.config.enabled {
            return;
        }
        state.pending = true;
        let delay = Duration::from_millis(state.config.debounce_ms);
        self.arm(&mut state, delay);
    }

    /// Replace the cached configuration. Disabling drops any pending change.
    pub fn configure(&self, config: BackupConfig) {
        let config = config.normalized();
        let mut state = self.inner.lock_state();
        if !config.enabled {
            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }
            state.pending = false;
        }
        debug!("[BackupScheduler] Configured: {:?}", config);
        state.config = config;
    }

    pub fn config(&self) -> BackupConfig {
        self.inner.lock_state().config.clone()
    }

    /// Whether a change is waiting for a backup
    pub fn is_pending(&self) -> bool {
        self.inner.lock_state().pending
    }

    /// Whether a backup (or a restore holding `exclusive`) is in progress
    pub fn is_busy(&self) -> bool {
        self.inner.flight.try_lock().is_err()
    }

    /// Run a backup immediately, waiting for one already in flight.
    ///
    /// Returns `None` when backups are disabled or no password is known.
    pub async fn run_now(&self, password: Option<String>) -> AppResult<Option<BackupInfo>> {
        if !self.config().enabled {
            debug!("[BackupScheduler] Backups disabled; run_now skipped");
            return Ok(None);
        }
        let Some(password) = self.inner.secrets.resolve(password) else {
            debug!("[BackupScheduler] No backup password available; run_now skipped");
            return Ok(None);
        };

        let guard = self.inner.flight.clone().lock_owned().await;
        let config = {
            let mut state = self.inner.lock_state();
            state.pending = false;
            state.last_start = Some(self.inner.clock.now());
            state.config.clone()
        };

        let result = self.inner.job.run(SnapshotRequest { password, config }).await;
        drop(guard);
        self.reschedule_if_pending();

        result.map(Some)
    }

    /// Hold the single-flight lock, e.g. for the duration of a restore.
    pub async fn exclusive(&self) -> OwnedMutexGuard<()> {
        self.inner.flight.clone().lock_owned().await
    }

    fn arm(&self, state: &mut SchedulerState, delay: Duration) {
        if let Some(previous) = state.timer.take() {
            previous.cancel();
        }
        state.generation += 1;
        let generation = state.generation;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        let handle = self.inner.timer.schedule(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    BackupScheduler { inner }.on_timer(generation);
                }
            }),
        );
        state.timer = Some(handle);
    }

    fn on_timer(&self, generation: u64) {
        let mut state = self.inner.lock_state();
        if state.generation != generation {
            return;
        }
        state.timer = None;

        if !state.pending || !state.config.enabled {
            return;
        }

        let now = self.inner.clock.now();
        if let Some(last) = state.last_start {
            let min_interval = Duration::from_millis(state.config.min_interval_ms);
            let elapsed = now.saturating_duration_since(last);
            if elapsed < min_interval {
                let remaining = min_interval - elapsed;
                debug!(
                    "[BackupScheduler] Last backup started {:?} ago; waiting {:?}",
                    elapsed, remaining
                );
                self.arm(&mut state, remaining);
                return;
            }
        }

        let Some(password) = self.inner.secrets.password() else {
            warn!(
                "[BackupScheduler] No backup password in this session; \
                 change stays pending until one is set"
            );
            return;
        };

        let guard = match self.inner.flight.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("[BackupScheduler] Backup already running; change stays pending");
                return;
            }
        };

        state.pending = false;
        state.last_start = Some(now);
        let request = SnapshotRequest {
            password,
            config: state.config.clone(),
        };
        drop(state);

        let scheduler = self.clone();
        self.inner.runtime.spawn(async move {
            scheduler.run_cycle(guard, request).await;
        });
    }

    async fn run_cycle(&self, guard: OwnedMutexGuard<()>, request: SnapshotRequest) {
        match self.inner.job.run(request).await {
            Ok(info) => info!("[BackupScheduler] Backup created: {}", info.filename),
            Err(e) => warn!("[BackupScheduler] Scheduled backup failed: {}", e),
        }
        drop(guard);
        self.reschedule_if_pending();
    }

    /// Re-arm the debounce timer if a change is still waiting.
    pub fn reschedule_if_pending(&self) {
        let pending = self.inner.lock_state().pending;
        if pending {
            self.notify_change();
        }
    }
}

impl std::fmt::Debug for BackupScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("BackupScheduler")
            .field("config", &state.config)
            .field("pending", &state.pending)
            .finish()
    }
}
