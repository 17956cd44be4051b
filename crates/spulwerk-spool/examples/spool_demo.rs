// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wire the whole pipeline against the file-spooling executor and watch a
// few receipts flow through it.
//
//   cargo run -p spulwerk-spool --example spool_demo

use std::sync::Arc;
use std::time::Duration;

use spulwerk_core::config::SpoolConfig;
use spulwerk_core::types::PrintTask;
use spulwerk_notify::{LocalBroadcastSink, NotificationFanout, NotificationSink};
use spulwerk_print::{PlainTextRenderer, SpoolFileExecutor};
use spulwerk_spool::{QueueManager, TaskStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = SpoolConfig::default();
    let store = Arc::new(TaskStore::open("spool-data")?);
    let executor = Arc::new(SpoolFileExecutor::new(
        "spool-out",
        Box::new(PlainTextRenderer),
    ));

    let local = Arc::new(LocalBroadcastSink::new(64));
    let mut updates = local.subscribe();
    let fanout = Arc::new(
        NotificationFanout::new(config.notify_timeout())
            .with_sink(local as Arc<dyn NotificationSink>),
    );

    let manager = Arc::new(QueueManager::new(config, store, executor, fanout));
    let recovered = manager.recover().await?;
    println!("recovered {recovered} task(s) from a previous run");

    let handle = manager.start();

    let observer = tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            println!(
                "[{}] {} -> {:?} (retries {})",
                update.timestamp.format("%H:%M:%S"),
                update.task_id,
                update.status,
                update.retry_count
            );
        }
    });

    for n in 1..=3 {
        let task = PrintTask::new(format!(
            "Receipt #{n}\n----------\n1x coffee    3.50\n1x pastry    2.80\n"
        ));
        manager.submit(task).await?;
    }

    tokio::time::sleep(Duration::from_secs(5)).await;
    println!(
        "queue depth: {}, success rate: {:.0}%",
        manager.queue_depth(),
        manager.success_rate() * 100.0
    );

    handle.shutdown().await;
    observer.abort();
    Ok(())
}
