// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Queue manager — admission, dispatch, retry, recovery.
//
// The single owner of task state while a task is in flight.  Producers
// call `submit`; a periodic dispatch loop feeds a bounded worker pool;
// failed attempts are requeued with exponential backoff until `max_retry`
// is exhausted.  Every transition is persisted and fanned out to
// observers.  Persistence failures are logged and do not stop delivery.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use spulwerk_core::config::SpoolConfig;
use spulwerk_core::error::{Result, SpulwerkError};
use spulwerk_core::types::{PrintTask, TaskId, TaskStatus};
use spulwerk_notify::NotificationFanout;
use spulwerk_print::{AttemptOutcome, PrintExecutor};

use crate::metrics::PrintMetrics;
use crate::queue::BoundedQueue;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::store::TaskStore;

pub struct QueueManager {
    config: SpoolConfig,
    queue: Arc<BoundedQueue>,
    store: Arc<TaskStore>,
    metrics: Arc<PrintMetrics>,
    fanout: Arc<NotificationFanout>,
    executor: Arc<dyn PrintExecutor>,
    policy: RetryPolicy,
    /// Ids cancelled by the operator, honoured at dispatch time.
    cancelled: Mutex<HashSet<TaskId>>,
}

impl QueueManager {
    pub fn new(
        config: SpoolConfig,
        store: Arc<TaskStore>,
        executor: Arc<dyn PrintExecutor>,
        fanout: Arc<NotificationFanout>,
    ) -> Self {
        let queue = Arc::new(BoundedQueue::new(config.queue_capacity));
        let policy = RetryPolicy::from_config(&config);
        Self {
            queue,
            store,
            metrics: Arc::new(PrintMetrics::new()),
            fanout,
            executor,
            policy,
            cancelled: Mutex::new(HashSet::new()),
            config,
        }
    }

    // -- Admission -----------------------------------------------------------

    /// Accept a task into the pipeline.
    ///
    /// The record is durable before the task becomes visible in the queue;
    /// a crash between the two is repaired by `recover`.  A full queue
    /// rejects within the admission timeout and the task goes terminally
    /// Failed — it never entered the pipeline, so it is not retried.
    pub async fn submit(&self, mut task: PrintTask) -> Result<TaskId> {
        task.status = TaskStatus::Pending;
        self.persist(&task);

        let accepted = self
            .queue
            .try_enqueue(task.clone(), self.config.admission_timeout())
            .await;

        if !accepted {
            error!(
                task_id = %task.id,
                queue_size = self.queue.len(),
                "queue full, task rejected"
            );
            task.status = TaskStatus::Failed;
            self.persist(&task);
            self.archive(&task);
            self.fanout.notify_with_detail(&task, "queue full").await;
            return Err(SpulwerkError::QueueFull {
                capacity: self.queue.capacity(),
            });
        }

        info!(task_id = %task.id, "task admitted to print queue");
        self.fanout.notify(&task).await;
        Ok(task.id)
    }

    // -- Cancellation --------------------------------------------------------

    /// Request cancellation.
    ///
    /// Honoured when the task next reaches the dispatcher: it transitions
    /// straight to Cancelled and the executor is never invoked.  A task
    /// already handed to a worker completes its current attempt.
    pub fn cancel(&self, id: &TaskId) {
        info!(task_id = %id, "cancellation requested");
        self.cancelled
            .lock()
            .expect("cancel set lock poisoned")
            .insert(id.clone());
    }

    fn take_cancelled(&self, id: &TaskId) -> bool {
        self.cancelled
            .lock()
            .expect("cancel set lock poisoned")
            .remove(id)
    }

    // -- Monitoring ----------------------------------------------------------

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    pub fn metrics(&self) -> Arc<PrintMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn success_rate(&self) -> f64 {
        self.metrics.success_rate()
    }

    /// Last persisted status of a task, wherever its record lives.
    pub fn task_status(&self, id: &TaskId) -> Result<TaskStatus> {
        match self.store.find(id)? {
            Some(task) => Ok(task.status),
            None => Err(SpulwerkError::TaskNotFound(id.to_string())),
        }
    }

    // -- Recovery ------------------------------------------------------------

    /// Re-admit every durable non-terminal record, exactly once each.
    ///
    /// Runs before the dispatch loop starts, so blocking on a full queue
    /// is acceptable here.  Terminal and stale records are archived
    /// instead of re-admitted.
    pub async fn recover(&self) -> Result<usize> {
        let records = self.store.load_pending()?;
        let expiry = self.config.task_expiry();
        let mut admitted = 0;

        for mut task in records {
            match task.status {
                TaskStatus::Completed | TaskStatus::Cancelled => {
                    debug!(task_id = %task.id, status = ?task.status, "archiving terminal record found at startup");
                    self.archive(&task);
                    continue;
                }
                TaskStatus::Failed if task.retry_count >= self.policy.max_retry => {
                    debug!(task_id = %task.id, "archiving exhausted record found at startup");
                    self.archive(&task);
                    continue;
                }
                _ => {}
            }
            if Utc::now() - task.created_at > expiry {
                warn!(task_id = %task.id, "archiving stale record found at startup");
                self.archive(&task);
                continue;
            }

            task.status = TaskStatus::Pending;
            self.persist(&task);
            self.queue.enqueue(task).await;
            admitted += 1;
        }

        info!(admitted, "recovery complete");
        Ok(admitted)
    }

    // -- Pipeline ------------------------------------------------------------

    /// Spawn the dispatch loop, the worker pool, and the retention sweep.
    pub fn start(self: &Arc<Self>) -> SpoolHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (work_tx, work_rx) = mpsc::channel::<PrintTask>(self.config.worker_backlog);
        let work_rx = Arc::new(tokio::sync::Mutex::new(work_rx));

        let mut handles = Vec::new();

        for worker in 0..self.config.worker_count {
            let manager = Arc::clone(self);
            let work_rx = Arc::clone(&work_rx);
            handles.push(tokio::spawn(async move {
                manager.worker_loop(worker, work_rx).await;
            }));
        }

        {
            let manager = Arc::clone(self);
            let shutdown = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                manager.dispatch_loop(work_tx, shutdown).await;
            }));
        }

        {
            let manager = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                manager.sweep_loop(shutdown_rx).await;
            }));
        }

        SpoolHandle {
            shutdown: shutdown_tx,
            handles,
        }
    }

    /// Poll the queue once per tick and feed the worker pool.
    ///
    /// One task per tick bounds how fast work enters the pool; the pool
    /// itself enforces the concurrency limit.
    async fn dispatch_loop(
        &self,
        work_tx: mpsc::Sender<PrintTask>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut tick = tokio::time::interval(self.config.poll_interval());
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(period_ms = self.config.poll_interval_ms, "dispatch loop started");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("dispatch loop stopping");
                        return;
                    }
                }
                _ = tick.tick() => {
                    if let Some(task) = self.queue.dequeue() {
                        self.dispatch(task, &work_tx).await;
                    }
                }
            }
        }
    }

    /// Route one dequeued task: honour cancellation, then hand to a worker.
    async fn dispatch(&self, mut task: PrintTask, work_tx: &mpsc::Sender<PrintTask>) {
        if self.take_cancelled(&task.id) {
            info!(task_id = %task.id, "task cancelled before dispatch");
            task.status = TaskStatus::Cancelled;
            self.persist(&task);
            self.archive(&task);
            self.fanout.notify(&task).await;
            return;
        }

        match work_tx.try_send(task) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(task)) => {
                // Never stall the loop on a saturated pool; the task goes
                // back to the queue and a later tick picks it up again.
                warn!(task_id = %task.id, "worker backlog full, returning task to queue");
                self.queue.enqueue(task).await;
            }
            Err(mpsc::error::TrySendError::Closed(task)) => {
                warn!(task_id = %task.id, "worker pool stopped, returning task to queue");
                self.queue.enqueue(task).await;
            }
        }
    }

    async fn worker_loop(
        &self,
        worker: usize,
        work_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<PrintTask>>>,
    ) {
        debug!(worker, "delivery worker started");
        loop {
            let task = { work_rx.lock().await.recv().await };
            match task {
                Some(task) => self.process(task).await,
                None => {
                    debug!(worker, "delivery worker stopping");
                    return;
                }
            }
        }
    }

    /// Run one delivery attempt and its follow-up transitions.
    async fn process(&self, mut task: PrintTask) {
        task.status = TaskStatus::Printing;
        self.persist(&task);
        self.fanout.notify(&task).await;

        let outcome = self.attempt(&task).await;
        if outcome.ok {
            task.status = TaskStatus::Completed;
            info!(task_id = %task.id, retry_count = task.retry_count, "task delivered");
            self.persist(&task);
            self.archive(&task);
            self.fanout.notify(&task).await;
            self.metrics.record_success();
        } else {
            self.metrics.record_failure();
            self.handle_failed(task, outcome.reason).await;
        }
    }

    /// Invoke the executor, treating a panic as a failed attempt.
    async fn attempt(&self, task: &PrintTask) -> AttemptOutcome {
        let executor = Arc::clone(&self.executor);
        let task = task.clone();
        match tokio::spawn(async move { executor.attempt(&task).await }).await {
            Ok(outcome) => outcome,
            Err(e) => AttemptOutcome::failure(format!("executor fault: {e}")),
        }
    }

    /// Failed-attempt bookkeeping: requeue with backoff, or go terminal.
    ///
    /// The backoff pause holds only this worker; the dispatch loop and the
    /// remaining workers keep draining the queue meanwhile.
    async fn handle_failed(&self, mut task: PrintTask, reason: String) {
        task.status = TaskStatus::Failed;
        match self.policy.decide(task.retry_count) {
            RetryDecision::RetryAfter(delay) => {
                task.retry_count += 1;
                warn!(
                    task_id = %task.id,
                    retry_count = task.retry_count,
                    reason = %reason,
                    delay_ms = delay.as_millis(),
                    "attempt failed, requeueing"
                );
                self.persist(&task);
                self.fanout.notify_with_detail(&task, &reason).await;
                self.queue.enqueue(task).await;
                tokio::time::sleep(delay).await;
            }
            RetryDecision::Exhausted => {
                error!(
                    task_id = %task.id,
                    retry_count = task.retry_count,
                    reason = %reason,
                    "retries exhausted, abandoning task"
                );
                self.persist(&task);
                self.archive(&task);
                self.fanout.notify_with_detail(&task, &reason).await;
            }
        }
    }

    /// Periodic deletion of archived records past the retention window.
    async fn sweep_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(self.config.sweep_interval());
        // The first interval tick fires immediately; consume it so the
        // sweep runs on the configured cadence, not at startup.
        tick.tick().await;
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
                _ = tick.tick() => {
                    match self.store.sweep_expired(self.config.retention()) {
                        Ok(removed) if removed > 0 => {
                            info!(removed, "retention sweep removed archived records");
                        }
                        Ok(_) => debug!("retention sweep found nothing to remove"),
                        Err(e) => warn!(error = %e, "retention sweep failed"),
                    }
                }
            }
        }
    }

    // -- Durability helpers --------------------------------------------------

    /// Persistence failures are logged, never fatal — a task can still be
    /// delivered when its durable mirror write fails.
    fn persist(&self, task: &PrintTask) {
        if let Err(e) = self.store.save(task) {
            error!(task_id = %task.id, error = %e, "failed to persist task record");
        }
    }

    fn archive(&self, task: &PrintTask) {
        if let Err(e) = self.store.archive(task) {
            error!(task_id = %task.id, error = %e, "failed to archive task record");
        }
    }
}

/// Handles to the running pipeline tasks.
pub struct SpoolHandle {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl SpoolHandle {
    /// Signal every loop to stop and wait for them to drain.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use spulwerk_core::types::StatusUpdate;
    use spulwerk_notify::{LocalBroadcastSink, NotificationSink};
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::broadcast;

    /// Executor scripted to fail a fixed number of times, then succeed.
    struct ScriptedExecutor {
        failures_before_success: u32,
        attempts: AtomicU32,
    }

    impl ScriptedExecutor {
        fn new(failures_before_success: u32) -> Arc<Self> {
            Arc::new(Self {
                failures_before_success,
                attempts: AtomicU32::new(0),
            })
        }

        fn always_failing() -> Arc<Self> {
            Self::new(u32::MAX)
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PrintExecutor for ScriptedExecutor {
        async fn attempt(&self, _task: &PrintTask) -> AttemptOutcome {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures_before_success {
                AttemptOutcome::failure("device busy")
            } else {
                AttemptOutcome::success()
            }
        }
    }

    /// Executor that panics on its first attempt, then succeeds.
    struct PanicOnceExecutor {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl PrintExecutor for PanicOnceExecutor {
        async fn attempt(&self, _task: &PrintTask) -> AttemptOutcome {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("driver fault");
            }
            AttemptOutcome::success()
        }
    }

    fn fast_config() -> SpoolConfig {
        SpoolConfig {
            admission_timeout_secs: 1,
            poll_interval_ms: 10,
            worker_count: 2,
            worker_backlog: 8,
            backoff_base_ms: 5,
            backoff_max_ms: 50,
            backoff_jitter_ms: 2,
            ..Default::default()
        }
    }

    struct Harness {
        manager: Arc<QueueManager>,
        store: Arc<TaskStore>,
        updates: broadcast::Receiver<StatusUpdate>,
    }

    fn harness(root: &Path, config: SpoolConfig, executor: Arc<dyn PrintExecutor>) -> Harness {
        let store = Arc::new(TaskStore::open(root).expect("open store"));
        let local = Arc::new(LocalBroadcastSink::new(128));
        let updates = local.subscribe();
        let fanout = Arc::new(
            NotificationFanout::new(Duration::from_millis(500))
                .with_sink(local as Arc<dyn NotificationSink>),
        );
        let manager = Arc::new(QueueManager::new(
            config,
            Arc::clone(&store),
            executor,
            fanout,
        ));
        Harness {
            manager,
            store,
            updates,
        }
    }

    /// Collect updates until `n` with the wanted status have arrived.
    async fn collect_status(
        updates: &mut broadcast::Receiver<StatusUpdate>,
        status: TaskStatus,
        n: usize,
    ) -> Vec<StatusUpdate> {
        let mut matching = Vec::new();
        while matching.len() < n {
            let update = tokio::time::timeout(Duration::from_secs(10), updates.recv())
                .await
                .expect("timed out waiting for status updates")
                .expect("broadcast closed");
            if update.status == status {
                matching.push(update);
            }
        }
        matching
    }

    #[tokio::test]
    async fn submit_persists_before_the_task_is_visible() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut h = harness(dir.path(), fast_config(), ScriptedExecutor::new(0));

        let id = h
            .manager
            .submit(PrintTask::new("Receipt #1").with_id("t-1"))
            .await
            .expect("submit");

        let record = h.store.find(&id).expect("find").expect("durable record");
        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(h.manager.queue_depth(), 1);

        let update = h.updates.recv().await.expect("pending update");
        assert_eq!(update.task_id, id);
        assert_eq!(update.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn third_submission_into_a_two_slot_queue_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SpoolConfig {
            queue_capacity: 2,
            admission_timeout_secs: 0,
            ..fast_config()
        };
        let h = harness(dir.path(), config, ScriptedExecutor::new(0));

        h.manager
            .submit(PrintTask::new("a").with_id("t-1"))
            .await
            .expect("first");
        h.manager
            .submit(PrintTask::new("b").with_id("t-2"))
            .await
            .expect("second");
        let err = h
            .manager
            .submit(PrintTask::new("c").with_id("t-3"))
            .await
            .expect_err("third must be rejected");
        assert!(matches!(err, SpulwerkError::QueueFull { capacity: 2 }));

        // The rejected task's durable record is terminally Failed.
        let record = h
            .store
            .find(&TaskId::from("t-3"))
            .expect("find")
            .expect("record");
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(h.manager.queue_depth(), 2);
    }

    #[tokio::test]
    async fn always_failing_executor_is_attempted_max_retry_plus_one_times() {
        let dir = tempfile::tempdir().expect("tempdir");
        let executor = ScriptedExecutor::always_failing();
        let mut h = harness(dir.path(), fast_config(), executor.clone());

        let id = h
            .manager
            .submit(PrintTask::new("doomed").with_id("t-1"))
            .await
            .expect("submit");
        let handle = h.manager.start();

        let failed = collect_status(&mut h.updates, TaskStatus::Failed, 4).await;
        let counts: Vec<u32> = failed.iter().map(|u| u.retry_count).collect();
        assert_eq!(counts, vec![1, 2, 3, 3]);

        handle.shutdown().await;
        assert_eq!(executor.attempts(), 4);

        let record = h.store.find(&id).expect("find").expect("record");
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.retry_count, 3);
        assert_eq!(h.manager.metrics().failures(), 4);
        assert_eq!(h.manager.metrics().successes(), 0);
    }

    #[tokio::test]
    async fn success_on_the_third_attempt_completes_with_two_retries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let executor = ScriptedExecutor::new(2);
        let mut h = harness(dir.path(), fast_config(), executor.clone());

        let id = h
            .manager
            .submit(PrintTask::new("flaky").with_id("t-1"))
            .await
            .expect("submit");
        let handle = h.manager.start();

        let completed = collect_status(&mut h.updates, TaskStatus::Completed, 1).await;
        assert_eq!(completed[0].retry_count, 2);

        handle.shutdown().await;
        assert_eq!(executor.attempts(), 3);

        let record = h.store.find(&id).expect("find").expect("record");
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.retry_count, 2);
        assert_eq!(h.manager.metrics().successes(), 1);
        assert_eq!(h.manager.metrics().failures(), 2);
    }

    #[tokio::test]
    async fn recovery_readmits_each_live_record_exactly_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::open(dir.path()).expect("open store");

        for n in 1..=3 {
            store
                .save(&PrintTask::new("live").with_id(format!("live-{n}")))
                .expect("save");
        }
        let mut stale = PrintTask::new("stale").with_id("stale-1");
        stale.created_at = Utc::now() - chrono::Duration::hours(25);
        store.save(&stale).expect("save stale");

        let mut done = PrintTask::new("done").with_id("done-1");
        done.status = TaskStatus::Completed;
        store.save(&done).expect("save done");

        let mut exhausted = PrintTask::new("gone").with_id("gone-1");
        exhausted.status = TaskStatus::Failed;
        exhausted.retry_count = 3;
        store.save(&exhausted).expect("save exhausted");

        let h = harness(dir.path(), fast_config(), ScriptedExecutor::new(0));
        let admitted = h.manager.recover().await.expect("recover");
        assert_eq!(admitted, 3);
        assert_eq!(h.manager.queue_depth(), 3);

        // Skipped records were archived, not lost and not re-admitted.
        assert!(h.store.load_pending().expect("load").len() == 3);
        for id in ["stale-1", "done-1", "gone-1"] {
            assert!(
                h.store.find(&TaskId::from(id)).expect("find").is_some(),
                "{id} should still have an archived record"
            );
        }
    }

    #[tokio::test]
    async fn cancellation_before_dispatch_skips_the_executor() {
        let dir = tempfile::tempdir().expect("tempdir");
        let executor = ScriptedExecutor::new(0);
        let mut h = harness(dir.path(), fast_config(), executor.clone());

        let id = h
            .manager
            .submit(PrintTask::new("unwanted").with_id("t-1"))
            .await
            .expect("submit");
        h.manager.cancel(&id);
        let handle = h.manager.start();

        let cancelled = collect_status(&mut h.updates, TaskStatus::Cancelled, 1).await;
        assert_eq!(cancelled[0].task_id, id);

        handle.shutdown().await;
        assert_eq!(executor.attempts(), 0);
        assert_eq!(h.manager.task_status(&id).expect("status"), TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn panicking_executor_counts_as_a_failed_attempt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut h = harness(
            dir.path(),
            fast_config(),
            Arc::new(PanicOnceExecutor {
                attempts: AtomicU32::new(0),
            }),
        );

        let id = h
            .manager
            .submit(PrintTask::new("fragile").with_id("t-1"))
            .await
            .expect("submit");
        let handle = h.manager.start();

        let completed = collect_status(&mut h.updates, TaskStatus::Completed, 1).await;
        assert_eq!(completed[0].retry_count, 1);

        handle.shutdown().await;
        let record = h.store.find(&id).expect("find").expect("record");
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.retry_count, 1);
        assert_eq!(h.manager.metrics().failures(), 1);
        assert_eq!(h.manager.metrics().successes(), 1);
    }

    #[tokio::test]
    async fn unknown_task_status_lookup_reports_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let h = harness(dir.path(), fast_config(), ScriptedExecutor::new(0));
        let err = h
            .manager
            .task_status(&TaskId::from("nope"))
            .expect_err("missing task");
        assert!(matches!(err, SpulwerkError::TaskNotFound(_)));
    }
}
