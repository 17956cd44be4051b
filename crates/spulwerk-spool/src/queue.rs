// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded FIFO task queue.
//
// Admission uses a timed wait so a saturated queue turns into a bounded-
// latency rejection; the retry and recovery paths wait indefinitely
// because they hold tasks that are already durable and must not be
// dropped.  Safe for concurrent producers and the single polling
// consumer.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;

use spulwerk_core::types::PrintTask;

pub struct BoundedQueue {
    inner: Mutex<VecDeque<PrintTask>>,
    /// Signalled each time a slot frees up.
    space: Notify,
    capacity: usize,
}

impl BoundedQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            space: Notify::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Instantaneous queue length, for monitoring.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn try_push(&self, task: PrintTask) -> std::result::Result<(), PrintTask> {
        let mut queue = self.inner.lock().expect("queue lock poisoned");
        if queue.len() < self.capacity {
            queue.push_back(task);
            Ok(())
        } else {
            Err(task)
        }
    }

    /// Enqueue, waiting indefinitely for space.
    ///
    /// Only for paths that must not lose a task: retry requeue and startup
    /// recovery, where the record is already durable.
    pub async fn enqueue(&self, task: PrintTask) {
        let mut task = task;
        loop {
            // Register for the wakeup before checking, so a slot freed
            // between the check and the await is not missed.
            let notified = self.space.notified();
            match self.try_push(task) {
                Ok(()) => return,
                Err(returned) => task = returned,
            }
            notified.await;
        }
    }

    /// Enqueue with a bounded wait; `false` means the queue stayed full.
    pub async fn try_enqueue(&self, task: PrintTask, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.enqueue(task)).await.is_ok()
    }

    /// Non-blocking removal of the oldest task.
    pub fn dequeue(&self) -> Option<PrintTask> {
        let task = self.inner.lock().expect("queue lock poisoned").pop_front();
        if task.is_some() {
            self.space.notify_one();
        }
        task
    }
}
