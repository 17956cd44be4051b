// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-process subscriber fan-out over a tokio broadcast channel.  The
// submission front-end subscribes here to stream live status to its own
// clients; the pipeline neither knows nor cares how many are listening.

use async_trait::async_trait;
use tokio::sync::broadcast;

use spulwerk_core::error::Result;
use spulwerk_core::types::StatusUpdate;

use crate::sink::NotificationSink;

pub struct LocalBroadcastSink {
    tx: broadcast::Sender<StatusUpdate>,
}

impl LocalBroadcastSink {
    /// `buffer` is the per-subscriber backlog before a slow subscriber
    /// starts seeing lag errors.
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer);
        Self { tx }
    }

    /// New subscription; sees every update sent from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl NotificationSink for LocalBroadcastSink {
    fn name(&self) -> &str {
        "local-broadcast"
    }

    async fn notify(&self, update: &StatusUpdate) -> Result<()> {
        // A send error only means nobody is subscribed right now.
        let _ = self.tx.send(update.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spulwerk_core::types::{PrintTask, TaskStatus};

    #[tokio::test]
    async fn subscribers_receive_updates() {
        let sink = LocalBroadcastSink::new(8);
        let mut rx = sink.subscribe();

        let task = PrintTask::new("x").with_id("t-1");
        sink.notify(&StatusUpdate::of(&task)).await.expect("notify");

        let update = rx.recv().await.expect("recv");
        assert_eq!(update.task_id, task.id);
        assert_eq!(update.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn notify_without_subscribers_succeeds() {
        let sink = LocalBroadcastSink::new(8);
        assert_eq!(sink.subscriber_count(), 0);
        sink.notify(&StatusUpdate::of(&PrintTask::new("x")))
            .await
            .expect("notify");
    }
}
