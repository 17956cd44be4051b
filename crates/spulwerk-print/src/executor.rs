// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print executor — the seam between the delivery pipeline and whatever
// actually puts ink on paper.
//
// The pipeline invokes `attempt` once per dispatch and interprets the
// returned verdict.  Implementations report failure through the outcome,
// never by panicking; the pipeline treats a panic as a failed attempt
// regardless.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use spulwerk_core::error::Result;
use spulwerk_core::types::PrintTask;

use crate::render::PayloadRenderer;

/// Verdict of a single delivery attempt.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub ok: bool,
    /// Human-readable reason, surfaced in logs and status updates.
    pub reason: String,
}

impl AttemptOutcome {
    pub fn success() -> Self {
        Self {
            ok: true,
            reason: "printed".into(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: reason.into(),
        }
    }
}

/// Contract for the device-facing collaborator.
#[async_trait]
pub trait PrintExecutor: Send + Sync {
    /// Attempt to deliver one task to its output device.
    async fn attempt(&self, task: &PrintTask) -> AttemptOutcome;
}

/// Executor that spools rendered payloads to files instead of a device.
///
/// Stands in for real hardware during development and demos: one file per
/// delivered task, named after the task id, in a configurable directory.
pub struct SpoolFileExecutor {
    spool_dir: PathBuf,
    renderer: Box<dyn PayloadRenderer>,
}

impl SpoolFileExecutor {
    pub fn new(spool_dir: impl Into<PathBuf>, renderer: Box<dyn PayloadRenderer>) -> Self {
        Self {
            spool_dir: spool_dir.into(),
            renderer,
        }
    }

    fn write_spool_file(&self, task: &PrintTask) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.spool_dir)?;
        let content = self.renderer.render(&task.payload)?;
        let path = self.spool_dir.join(format!("print_{}.txt", task.id));
        std::fs::write(&path, content)?;
        Ok(path)
    }
}

#[async_trait]
impl PrintExecutor for SpoolFileExecutor {
    async fn attempt(&self, task: &PrintTask) -> AttemptOutcome {
        match self.write_spool_file(task) {
            Ok(path) => {
                info!(task_id = %task.id, path = %path.display(), "payload spooled to file");
                AttemptOutcome::success()
            }
            Err(e) => AttemptOutcome::failure(e.to_string()),
        }
    }
}
