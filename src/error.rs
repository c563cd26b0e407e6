// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

use std::io;

use thiserror::Error;

use crate::header::ExchangeState;

/// Errors surfaced to exchange callers.
///
/// `IllegalState`, `TimedOut` and `ShutdownInProgress` are part of the
/// protocol and expected in normal operation. `Sync` wraps a failing
/// synchronization syscall; that means a broken invariant (lost peer or a
/// corrupted header) and callers generally treat it as fatal.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("exchange is not ready to send, state: {0:?}")]
    IllegalState(ExchangeState),
    #[error("timed out waiting for exchange response, state: {0:?}")]
    TimedOut(ExchangeState),
    #[error("exchange shutdown in progress")]
    ShutdownInProgress,
    #[error("exchange synchronization failure: {0}")]
    Sync(#[from] io::Error),
}

impl ExchangeError {
    /// True for the one error that means "stop cleanly" rather than "broken".
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::ShutdownInProgress)
    }
}
