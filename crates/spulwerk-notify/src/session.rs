// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Remote session context.
//
// Credentials for the remote server are held in an explicit handle with an
// init-on-login / clear-on-logout lifecycle and passed to whoever needs
// them — never in process-wide mutable state.

use std::sync::{Arc, RwLock};

use tracing::info;

/// Credentials for the remote status endpoint.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub password: String,
}

/// Shared, explicitly-passed session state.
///
/// Cheap to clone; all clones observe the same login/logout transitions.
#[derive(Clone, Default)]
pub struct SessionHandle {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a session.  Called once on login.
    pub fn login(&self, username: impl Into<String>, password: impl Into<String>) {
        let session = Session {
            username: username.into(),
            password: password.into(),
        };
        info!(username = %session.username, "remote session established");
        *self.inner.write().expect("session lock poisoned") = Some(session);
    }

    /// Clear the session.  Called on logout.
    pub fn logout(&self) {
        *self.inner.write().expect("session lock poisoned") = None;
        info!("remote session cleared");
    }

    pub fn is_logged_in(&self) -> bool {
        self.inner.read().expect("session lock poisoned").is_some()
    }

    /// Snapshot of the current session, if any.
    pub fn current(&self) -> Option<Session> {
        self.inner.read().expect("session lock poisoned").clone()
    }
}
