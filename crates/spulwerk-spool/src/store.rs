// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// File-backed task store.
//
// One self-describing JSON record per task, keyed by `(id, created_at)`.
// Live records sit under `pending/`; terminal records move to
// `completed/`; a record that cannot be parsed is moved to `quarantine/`
// so one bad file never aborts a recovery scan.  Every write lands in a
// temp file first and is renamed into place, so a crash mid-write never
// leaves a half-written record where the loader looks.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use spulwerk_core::error::Result;
use spulwerk_core::types::{PrintTask, TaskId};

const PENDING_DIR: &str = "pending";
const COMPLETED_DIR: &str = "completed";
const QUARANTINE_DIR: &str = "quarantine";

pub struct TaskStore {
    pending: PathBuf,
    completed: PathBuf,
    quarantine: PathBuf,
}

impl TaskStore {
    /// Open (or create) the store rooted at `root`.
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let store = Self {
            pending: root.join(PENDING_DIR),
            completed: root.join(COMPLETED_DIR),
            quarantine: root.join(QUARANTINE_DIR),
        };
        fs::create_dir_all(&store.pending)?;
        fs::create_dir_all(&store.completed)?;
        fs::create_dir_all(&store.quarantine)?;
        info!("task store opened");
        Ok(store)
    }

    /// Record file name: `{id}_{created_at}.json`.
    fn record_name(task: &PrintTask) -> String {
        format!("{}_{}.json", task.id, task.created_at.format("%Y%m%d%H%M%S"))
    }

    /// Idempotent upsert of the complete record into the pending area.
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub fn save(&self, task: &PrintTask) -> Result<()> {
        let name = Self::record_name(task);
        Self::write_record(&self.pending, &name, task)?;
        debug!("task record saved");
        Ok(())
    }

    /// Every parseable record in the pending area, oldest first.
    ///
    /// A record that fails to parse is quarantined and the scan continues.
    #[instrument(skip(self))]
    pub fn load_pending(&self) -> Result<Vec<PrintTask>> {
        let mut tasks = Vec::new();
        for path in Self::record_paths(&self.pending)? {
            match Self::read_record(&path) {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "quarantining unreadable task record");
                    self.quarantine_file(&path);
                }
            }
        }
        tasks.sort_by_key(|task| task.created_at);
        debug!(count = tasks.len(), "loaded pending task records");
        Ok(tasks)
    }

    /// Move a task's record from the pending area to the completed area.
    ///
    /// The archived copy is rewritten from `task` so it always reflects the
    /// final status, and the pending copy is removed.  Idempotent.
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub fn archive(&self, task: &PrintTask) -> Result<()> {
        let name = Self::record_name(task);
        Self::write_record(&self.completed, &name, task)?;
        let pending = self.pending.join(&name);
        if pending.exists() {
            fs::remove_file(&pending)?;
        }
        info!("task record archived");
        Ok(())
    }

    /// Delete archived records older than `retention`.
    ///
    /// Age comes from the record's own `created_at`; if the file cannot be
    /// parsed the filesystem mtime decides.
    #[instrument(skip(self))]
    pub fn sweep_expired(&self, retention: chrono::Duration) -> Result<usize> {
        let cutoff = Utc::now() - retention;
        let mut removed = 0;
        for path in Self::record_paths(&self.completed)? {
            let expired = match Self::read_record(&path) {
                Ok(task) => task.created_at < cutoff,
                Err(_) => Self::mtime(&path).map(|t| t < cutoff).unwrap_or(false),
            };
            if !expired {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    removed += 1;
                    info!(file = %path.display(), "swept expired archived record");
                }
                Err(e) => warn!(file = %path.display(), error = %e, "failed to sweep archived record"),
            }
        }
        Ok(removed)
    }

    /// Look a task up by id — pending area first, then the archive.
    pub fn find(&self, id: &TaskId) -> Result<Option<PrintTask>> {
        let prefix = format!("{id}_");
        for dir in [&self.pending, &self.completed] {
            for path in Self::record_paths(dir)? {
                let matches = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix));
                if matches && let Ok(task) = Self::read_record(&path) {
                    return Ok(Some(task));
                }
            }
        }
        Ok(None)
    }

    fn write_record(dir: &Path, name: &str, task: &PrintTask) -> Result<()> {
        let json = serde_json::to_string_pretty(task)?;
        let tmp = dir.join(format!("{name}.tmp"));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, dir.join(name))?;
        Ok(())
    }

    fn read_record(path: &Path) -> Result<PrintTask> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    fn record_paths(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn quarantine_file(&self, path: &Path) {
        let Some(name) = path.file_name() else {
            return;
        };
        if let Err(e) = fs::rename(path, self.quarantine.join(name)) {
            warn!(file = %path.display(), error = %e, "failed to quarantine record");
        }
    }

    fn mtime(path: &Path) -> Option<DateTime<Utc>> {
        let modified = fs::metadata(path).ok()?.modified().ok()?;
        Some(DateTime::<Utc>::from(modified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spulwerk_core::types::TaskStatus;

    fn store() -> (tempfile::TempDir, TaskStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::open(dir.path()).expect("open store");
        (dir, store)
    }

    fn aged_task(id: &str, days_old: i64) -> PrintTask {
        let mut task = PrintTask::new("payload").with_id(id);
        task.created_at = Utc::now() - chrono::Duration::days(days_old);
        task
    }

    #[test]
    fn save_and_load_roundtrip() {
        let (_dir, store) = store();
        let task = PrintTask::new("Receipt #1").with_id("t-1");
        store.save(&task).expect("save");

        let loaded = store.load_pending().expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, task.id);
        assert_eq!(loaded[0].payload, "Receipt #1");
        assert_eq!(loaded[0].status, TaskStatus::Pending);
    }

    #[test]
    fn save_is_an_upsert() {
        let (_dir, store) = store();
        let mut task = PrintTask::new("x").with_id("t-1");
        store.save(&task).expect("save");

        task.status = TaskStatus::Failed;
        task.retry_count = 2;
        store.save(&task).expect("save again");

        let loaded = store.load_pending().expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].status, TaskStatus::Failed);
        assert_eq!(loaded[0].retry_count, 2);
    }

    #[test]
    fn load_orders_by_creation_time() {
        let (_dir, store) = store();
        store.save(&aged_task("newer", 1)).expect("save");
        store.save(&aged_task("older", 3)).expect("save");

        let loaded = store.load_pending().expect("load");
        assert_eq!(loaded[0].id.0, "older");
        assert_eq!(loaded[1].id.0, "newer");
    }

    #[test]
    fn corrupt_record_is_quarantined_not_fatal() {
        let (dir, store) = store();
        store.save(&PrintTask::new("ok").with_id("t-1")).expect("save");
        fs::write(dir.path().join("pending/garbage.json"), b"{not json").expect("write junk");

        let loaded = store.load_pending().expect("load survives");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id.0, "t-1");

        assert!(!dir.path().join("pending/garbage.json").exists());
        assert!(dir.path().join("quarantine/garbage.json").exists());
    }

    #[test]
    fn archive_moves_the_record_with_final_status() {
        let (_dir, store) = store();
        let mut task = PrintTask::new("x").with_id("t-1");
        store.save(&task).expect("save");

        task.status = TaskStatus::Completed;
        store.archive(&task).expect("archive");

        assert!(store.load_pending().expect("load").is_empty());
        let found = store.find(&task.id).expect("find").expect("archived record");
        assert_eq!(found.status, TaskStatus::Completed);
    }

    #[test]
    fn archive_without_pending_copy_is_idempotent() {
        let (_dir, store) = store();
        let mut task = PrintTask::new("x").with_id("t-1");
        task.status = TaskStatus::Failed;
        store.archive(&task).expect("archive");
        store.archive(&task).expect("archive again");
        assert!(store.find(&task.id).expect("find").is_some());
    }

    #[test]
    fn sweep_deletes_past_retention_and_keeps_the_rest() {
        let (_dir, store) = store();
        let mut old = aged_task("old", 8);
        old.status = TaskStatus::Completed;
        let mut fresh = aged_task("fresh", 6);
        fresh.status = TaskStatus::Completed;
        store.archive(&old).expect("archive old");
        store.archive(&fresh).expect("archive fresh");

        let removed = store.sweep_expired(chrono::Duration::days(7)).expect("sweep");
        assert_eq!(removed, 1);
        assert!(store.find(&old.id).expect("find").is_none());
        assert!(store.find(&fresh.id).expect("find").is_some());
    }

    #[test]
    fn find_checks_pending_then_archive() {
        let (_dir, store) = store();
        store.save(&PrintTask::new("a").with_id("live")).expect("save");
        let mut done = PrintTask::new("b").with_id("done");
        done.status = TaskStatus::Completed;
        store.archive(&done).expect("archive");

        assert_eq!(store.find(&TaskId::from("live")).expect("find").expect("live").id.0, "live");
        assert_eq!(store.find(&TaskId::from("done")).expect("find").expect("done").id.0, "done");
        assert!(store.find(&TaskId::from("missing")).expect("find").is_none());
    }
}
