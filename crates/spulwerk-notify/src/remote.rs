// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Remote peer push — PUT the new status to the ordering server so it can
// mirror task progress.  Best-effort: the fanout swallows our errors.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use spulwerk_core::error::{Result, SpulwerkError};
use spulwerk_core::types::{StatusUpdate, TaskId};

use crate::session::SessionHandle;
use crate::sink::NotificationSink;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RemotePushSink {
    client: Client,
    base_url: String,
    session: SessionHandle,
}

impl RemotePushSink {
    pub fn new(base_url: impl Into<String>, session: SessionHandle) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SpulwerkError::RemoteSync(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            session,
        })
    }

    fn status_url(&self, task_id: &TaskId) -> String {
        format!(
            "{}/api/print-tasks/{}/status",
            self.base_url.trim_end_matches('/'),
            task_id
        )
    }
}

#[async_trait]
impl NotificationSink for RemotePushSink {
    fn name(&self) -> &str {
        "remote-push"
    }

    async fn notify(&self, update: &StatusUpdate) -> Result<()> {
        let mut request = self
            .client
            .put(self.status_url(&update.task_id))
            .json(&update.status);
        if let Some(session) = self.session.current() {
            request = request.basic_auth(&session.username, Some(&session.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| SpulwerkError::RemoteSync(format!("push status: {e}")))?;
        if !response.status().is_success() {
            return Err(SpulwerkError::RemoteSync(format!(
                "server returned {}",
                response.status()
            )));
        }

        debug!(task_id = %update.task_id, status = ?update.status, "status pushed to remote server");
        Ok(())
    }
}
