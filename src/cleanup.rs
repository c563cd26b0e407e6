// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Startup purge of exchange segments left behind by a previous crash.
// Sessions normally remove their own segment on owner teardown; after a
// crash the named objects outlive the process and would accumulate.

use std::fs;
use std::io;

use crate::names;
use crate::shm::ShmSegment;

/// Directory where POSIX shm objects surface as files.
const SHM_DIR: &str = "/dev/shm";

/// Remove every leftover exchange segment belonging to `instance_id`.
/// Idempotent; intended to run once at tablet server startup, before any
/// session creates a new exchange.
pub fn cleanup_instance(instance_id: &str) -> io::Result<()> {
    let prefix = names::instance_prefix(instance_id);
    let entries = match fs::read_dir(SHM_DIR) {
        Ok(entries) => entries,
        // No shm directory means no leftovers.
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if name.starts_with(&prefix) {
            ShmSegment::unlink_by_name(name);
            tracing::info!(segment = name, "removed stale exchange segment");
        }
    }
    Ok(())
}
