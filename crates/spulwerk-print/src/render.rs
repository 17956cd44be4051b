// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Payload formatting seam.
//
// The pipeline treats payloads as opaque blobs; turning one into printable
// content is a pure function supplied by the business layer (receipt
// layout rules live there, not here).

use spulwerk_core::error::Result;

/// Pure `payload -> renderable content` transformation.
///
/// Must have no queue or retry side effects.
pub trait PayloadRenderer: Send + Sync {
    fn render(&self, payload: &str) -> Result<String>;
}

/// Renderer that passes the payload through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextRenderer;

impl PayloadRenderer for PlainTextRenderer {
    fn render(&self, payload: &str) -> Result<String> {
        Ok(payload.to_string())
    }
}
