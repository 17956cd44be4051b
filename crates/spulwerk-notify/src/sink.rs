// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Status fan-out.
//
// One logical `notify` per transition; each sink gets a bounded slice of
// time and every failure or timeout is swallowed here, never surfaced to
// the pipeline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use spulwerk_core::error::Result;
use spulwerk_core::types::{PrintTask, StatusUpdate};

/// A destination for status updates: live local subscribers, a remote
/// peer, or anything else that wants to watch tasks move.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, update: &StatusUpdate) -> Result<()>;
}

/// Fans one status update out to every registered sink.
pub struct NotificationFanout {
    sinks: Vec<Arc<dyn NotificationSink>>,
    sink_timeout: Duration,
}

impl NotificationFanout {
    pub fn new(sink_timeout: Duration) -> Self {
        Self {
            sinks: Vec::new(),
            sink_timeout,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Push the task's current status to every sink.
    pub async fn notify(&self, task: &PrintTask) {
        self.notify_update(&StatusUpdate::of(task)).await;
    }

    /// Like `notify`, with a human-readable detail attached.
    pub async fn notify_with_detail(&self, task: &PrintTask, detail: &str) {
        self.notify_update(&StatusUpdate::of(task).with_detail(detail)).await;
    }

    /// Sinks run concurrently; each is bounded by the sink timeout.
    pub async fn notify_update(&self, update: &StatusUpdate) {
        let deliveries = self.sinks.iter().map(|sink| {
            let sink = Arc::clone(sink);
            let update = update.clone();
            let budget = self.sink_timeout;
            async move {
                match tokio::time::timeout(budget, sink.notify(&update)).await {
                    Ok(Ok(())) => {
                        debug!(sink = sink.name(), task_id = %update.task_id, "status update delivered");
                    }
                    Ok(Err(e)) => {
                        warn!(sink = sink.name(), task_id = %update.task_id, error = %e, "status update failed");
                    }
                    Err(_) => {
                        warn!(
                            sink = sink.name(),
                            task_id = %update.task_id,
                            timeout_ms = budget.as_millis(),
                            "status update timed out"
                        );
                    }
                }
            }
        });
        join_all(deliveries).await;
    }
}
