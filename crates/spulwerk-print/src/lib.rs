// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spulwerk Print — the device-facing executor contract and the pure
// payload-formatting seam.  The pipeline in `spulwerk-spool` drives these
// traits; everything that touches actual hardware lives behind them.

pub mod executor;
pub mod render;

pub use executor::{AttemptOutcome, PrintExecutor, SpoolFileExecutor};
pub use render::{PayloadRenderer, PlainTextRenderer};
