//! Deferred deletion of batch workspaces and archives.
//!
//! Tasks live in a due-time-ordered queue behind a single mutex; a timer
//! loop on the background runtime polls for due work. Execution is
//! at-least-once: every path delete is idempotent, and a task with any
//! path still standing is re-queued for the next pass instead of being
//! dropped.
//!
//! The queue is in-process only. Tasks pending across a restart are lost
//! and reclaimed later by the storage sweep.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{info, warn};

pub type TaskId = u64;

pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_millis() as u64
}

#[derive(Debug, PartialEq, Eq)]
struct CleanupTask {
    id: TaskId,
    /// Earliest moment (unix millis) this task may execute. The scheduler
    /// promises "no earlier than", never exact-time firing.
    not_before: u64,
    target_paths: Vec<PathBuf>,
}

impl Ord for CleanupTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.not_before
            .cmp(&other.not_before)
            .then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for CleanupTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct SchedulerState {
    queue: BinaryHeap<Reverse<CleanupTask>>,
    next_id: TaskId,
}

pub struct RetentionScheduler {
    state: Mutex<SchedulerState>,
}

pub static RETENTION: LazyLock<Arc<RetentionScheduler>> =
    LazyLock::new(|| Arc::new(RetentionScheduler::new()));

impl RetentionScheduler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SchedulerState::default()),
        }
    }

    /// Enqueue a deletion of `paths` no earlier than `delay` from now.
    pub fn schedule_delete(&self, paths: Vec<PathBuf>, delay: Duration) -> TaskId {
        let not_before = current_timestamp_ms() + delay.as_millis() as u64;
        let mut state = self.state.lock().expect("scheduler mutex poisoned");
        let id = state.next_id;
        state.next_id += 1;
        state.queue.push(Reverse(CleanupTask {
            id,
            not_before,
            target_paths: paths,
        }));
        id
    }

    /// Execute every task due at `now_ms`; returns how many completed in
    /// full. Deletions run outside the lock, so submissions are never
    /// blocked behind filesystem work.
    pub fn run_due(&self, now_ms: u64) -> usize {
        let due = {
            let mut state = self.state.lock().expect("scheduler mutex poisoned");
            let mut due = Vec::new();
            while state
                .queue
                .peek()
                .is_some_and(|Reverse(task)| task.not_before <= now_ms)
            {
                if let Some(Reverse(task)) = state.queue.pop() {
                    due.push(task);
                }
            }
            due
        };

        let mut executed = 0;
        let mut retries = Vec::new();
        for task in due {
            let survivors: Vec<PathBuf> = task
                .target_paths
                .into_iter()
                .filter(|path| !delete_path(path))
                .collect();

            if survivors.is_empty() {
                executed += 1;
            } else {
                retries.push(CleanupTask {
                    id: task.id,
                    not_before: task.not_before,
                    target_paths: survivors,
                });
            }
        }

        if !retries.is_empty() {
            let mut state = self.state.lock().expect("scheduler mutex poisoned");
            for task in retries {
                state.queue.push(Reverse(task));
            }
        }

        executed
    }

    pub fn pending_count(&self) -> usize {
        self.state
            .lock()
            .expect("scheduler mutex poisoned")
            .queue
            .len()
    }
}

impl Default for RetentionScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Delete one path, directory or file. A path that is already gone counts
/// as success so retries can never wedge on earlier partial progress.
fn delete_path(path: &Path) -> bool {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => return true,
        Err(err) => {
            warn!("Failed inspecting {:?}, will retry on the next pass: {}", path, err);
            return false;
        }
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Ok(_) => {
            info!("Deleted {:?}", path);
            true
        }
        Err(err) if err.kind() == ErrorKind::NotFound => true,
        Err(err) => {
            warn!("Failed deleting {:?}, will retry on the next pass: {}", path, err);
            false
        }
    }
}
