// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Spulwerk.

use thiserror::Error;

/// Top-level error type for all Spulwerk operations.
#[derive(Debug, Error)]
pub enum SpulwerkError {
    // -- Admission --
    #[error("print queue is full (capacity {capacity}), try again later")]
    QueueFull { capacity: usize },

    // -- Delivery --
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("payload render failed: {0}")]
    Render(String),

    // -- Storage / persistence --
    #[error("task store error: {0}")]
    Store(String),

    #[error("task {0} not found")]
    TaskNotFound(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Notification / remote sync --
    #[error("remote sync failed: {0}")]
    RemoteSync(String),

    #[error("not logged in to the remote server")]
    NotLoggedIn,
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SpulwerkError>;
