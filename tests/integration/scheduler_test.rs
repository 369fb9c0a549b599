//! Scheduler Integration Tests
//!
//! Drives `BackupScheduler` with paused tokio time and a recording job:
//! - a burst of changes yields exactly one backup, debounce after the last
//! - the minimum interval pushes the next backup out
//! - failures are swallowed and later changes still back up
//! - backups never overlap

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;

use jurisdesk_core::{backup_filename, BackupConfig, BackupInfo};
use jurisdesk_desktop::services::backup::{BackupScheduler, SnapshotJob, SnapshotRequest};
use jurisdesk_desktop::storage::SessionSecretStore;
use jurisdesk_desktop::utils::error::{AppError, AppResult};

// ============================================================================
// Helpers
// ============================================================================

#[derive(Default)]
struct RecordingJob {
    starts: Mutex<Vec<Instant>>,
    passwords: Mutex<Vec<String>>,
    fail: AtomicBool,
    work: Mutex<Duration>,
    active: AtomicUsize,
    overlap: AtomicBool,
}

impl RecordingJob {
    fn starts(&self) -> Vec<Instant> {
        self.starts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SnapshotJob for RecordingJob {
    async fn run(&self, request: SnapshotRequest) -> AppResult<BackupInfo> {
        self.starts.lock().unwrap().push(Instant::now());
        self.passwords.lock().unwrap().push(request.password.clone());
        if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlap.store(true, Ordering::SeqCst);
        }

        let work = *self.work.lock().unwrap();
        if !work.is_zero() {
            tokio::time::sleep(work).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::database("disk full"));
        }
        let now = Utc::now();
        Ok(BackupInfo {
            filename: backup_filename(now),
            path: PathBuf::from("/backups").join(backup_filename(now)),
            size: 42,
            created_at: now,
        })
    }
}

fn config(debounce_ms: u64, min_interval_ms: u64) -> BackupConfig {
    BackupConfig {
        debounce_ms,
        min_interval_ms,
        ..BackupConfig::default()
    }
}

fn start(config: BackupConfig) -> (BackupScheduler, Arc<RecordingJob>) {
    let job = Arc::new(RecordingJob::default());
    let secrets = Arc::new(SessionSecretStore::new());
    secrets.set_password("session-pw");
    let scheduler = BackupScheduler::new(config, job.clone(), secrets).unwrap();
    (scheduler, job)
}

/// Let spawned tasks run without moving the clock.
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    settle().await;
}

// ============================================================================
// Debounce
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_ten_changes_in_200ms_make_one_backup() {
    let (scheduler, job) = start(config(5_000, 60_000));
    let origin = Instant::now();

    for i in 0..10 {
        scheduler.notify_change();
        if i < 9 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
    let last_call = Instant::now();
    assert!(last_call - origin < Duration::from_millis(200));

    advance(4_999).await;
    assert!(job.starts().is_empty(), "must wait the full debounce after the last change");

    advance(60_000).await;
    let starts = job.starts();
    assert_eq!(starts.len(), 1);
    assert!(starts[0] - last_call >= Duration::from_millis(5_000));
    assert_eq!(job.passwords.lock().unwrap().as_slice(), ["session-pw"]);
}

#[tokio::test(start_paused = true)]
async fn test_each_quiet_period_gets_its_own_backup() {
    let (scheduler, job) = start(config(1_000, 1_000));

    scheduler.notify_change();
    advance(2_000).await;
    scheduler.notify_change();
    advance(2_000).await;

    assert_eq!(job.starts().len(), 2);
}

// ============================================================================
// Minimum interval
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_change_soon_after_backup_waits_for_min_interval() {
    let (scheduler, job) = start(config(5_000, 60_000));
    let t0 = Instant::now();

    scheduler.run_now(None).await.unwrap().expect("backup at t=0");

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    scheduler.notify_change();

    // t = 1000 + debounce: still inside the minimum interval
    advance(6_000).await;
    assert_eq!(job.starts().len(), 1);
    assert!(scheduler.is_pending());

    advance(60_000).await;
    let starts = job.starts();
    assert_eq!(starts.len(), 2);
    let offset = starts[1] - t0;
    assert!(offset >= Duration::from_millis(60_000), "started at {:?}", offset);
    assert!(offset < Duration::from_millis(60_050), "started at {:?}", offset);
}

// ============================================================================
// Failures and single flight
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_scheduled_backup_is_swallowed() {
    let (scheduler, job) = start(config(500, 500));
    job.fail.store(true, Ordering::SeqCst);

    scheduler.notify_change();
    advance(1_000).await;
    assert_eq!(job.starts().len(), 1);
    assert!(!scheduler.is_busy());

    job.fail.store(false, Ordering::SeqCst);
    scheduler.notify_change();
    advance(1_000).await;
    assert_eq!(job.starts().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_run_now_propagates_failure() {
    let (scheduler, job) = start(config(500, 500));
    job.fail.store(true, Ordering::SeqCst);

    let err = scheduler.run_now(None).await.unwrap_err();
    assert_eq!(err.code(), "database");
    assert!(!scheduler.is_busy());
}

#[tokio::test(start_paused = true)]
async fn test_backups_never_overlap() {
    let (scheduler, job) = start(config(100, 100));
    *job.work.lock().unwrap() = Duration::from_secs(5);

    for _ in 0..5 {
        scheduler.notify_change();
        advance(1_000).await;
    }
    let (a, b) = tokio::join!(scheduler.run_now(None), scheduler.run_now(None));
    a.unwrap();
    b.unwrap();
    advance(60_000).await;

    assert!(!job.overlap.load(Ordering::SeqCst));
    assert!(job.starts().len() >= 3);
    assert!(!scheduler.is_pending());
}

#[tokio::test(start_paused = true)]
async fn test_reconfigure_applies_new_debounce() {
    let (scheduler, job) = start(config(10_000, 1_000));
    scheduler.configure(config(1_000, 1_000));
    assert_eq!(scheduler.config().debounce_ms, 1_000);

    scheduler.notify_change();
    advance(1_500).await;
    assert_eq!(job.starts().len(), 1);
}
