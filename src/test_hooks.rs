// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Hooks for the test harness, compiled to no-ops unless the `test_hooks`
// feature is enabled.

#[cfg(feature = "test_hooks")]
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "test_hooks")]
static SKIP_SEGMENT_REMOVAL: AtomicBool = AtomicBool::new(false);

/// Suppress removal of the named segment when an owner endpoint is dropped,
/// so a test can inspect the segment post-mortem.
#[cfg(feature = "test_hooks")]
pub fn set_skip_segment_removal(skip: bool) {
    SKIP_SEGMENT_REMOVAL.store(skip, Ordering::SeqCst);
}

#[cfg(feature = "test_hooks")]
pub(crate) fn skip_segment_removal() -> bool {
    SKIP_SEGMENT_REMOVAL.load(Ordering::SeqCst)
}

#[cfg(not(feature = "test_hooks"))]
pub(crate) fn skip_segment_removal() -> bool {
    false
}
