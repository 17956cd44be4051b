// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Spulwerk print spool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a print task.
///
/// Submitters may bring their own id (the remote ordering system does);
/// otherwise `TaskId::generate` mints a UUIDv4. Once assigned the id is
/// immutable for the lifetime of the task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle states of a print task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Queued, waiting to be dispatched.
    Pending,
    /// Currently being delivered to the device.
    Printing,
    /// Successfully delivered.
    Completed,
    /// Delivery failed — terminal once retries are exhausted.
    Failed,
    /// Cancelled by the operator before dispatch.
    Cancelled,
}

/// Declared scheduling priority.
///
/// Carried on every record and over the wire, but never consulted by the
/// dispatcher: retrieval order is strict FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TaskPriority {
    High,
    #[default]
    Normal,
    Low,
}

/// One unit of work to be delivered to an output device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintTask {
    pub id: TaskId,
    /// Opaque content blob; the pipeline never interprets it.
    pub payload: String,
    pub status: TaskStatus,
    /// Failed delivery attempts charged so far.
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    /// Device identifier; `None` means the default device.
    pub target: Option<String>,
    pub priority: TaskPriority,
}

impl PrintTask {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            id: TaskId::generate(),
            payload: payload.into(),
            status: TaskStatus::Pending,
            retry_count: 0,
            created_at: Utc::now(),
            target: None,
            priority: TaskPriority::default(),
        }
    }

    /// Replace the generated id with a caller-supplied one.
    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// Status change pushed to observers on every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub timestamp: DateTime<Utc>,
    /// Human-readable context, e.g. the failure reason.
    pub detail: Option<String>,
}

impl StatusUpdate {
    /// Snapshot a task's current status.
    pub fn of(task: &PrintTask) -> Self {
        Self {
            task_id: task.id.clone(),
            status: task.status,
            retry_count: task.retry_count,
            timestamp: Utc::now(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
