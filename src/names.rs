// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Naming scheme for exchange segments.
// Every exchange is backed by one named shared memory object whose name is
// derived from the tablet server instance id and the session id. The creator
// and the opener must derive the same name, so all derivation lives here.

/// Prefix shared by every segment belonging to one tablet server instance.
/// Startup cleanup removes everything under this prefix.
pub fn instance_prefix(instance_id: &str) -> String {
    format!("yb_pg_{instance_id}_")
}

/// Full segment name for one exchange: `yb_pg_{instance_id}_{session_id}`.
pub fn segment_name(instance_id: &str, session_id: u64) -> String {
    format!("{}{session_id}", instance_prefix(instance_id))
}

/// POSIX shm object names must begin with exactly one '/'.
pub fn posix_shm_name(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_name_format() {
        assert_eq!(segment_name("I", 7), "yb_pg_I_7");
        assert_eq!(segment_name("node-1.local", 42), "yb_pg_node-1.local_42");
    }

    #[test]
    fn segment_name_is_decimal() {
        assert_eq!(segment_name("I", u64::MAX), format!("yb_pg_I_{}", u64::MAX));
    }

    #[test]
    fn prefix_covers_all_sessions() {
        let prefix = instance_prefix("I");
        for session in [0u64, 1, 999, u64::MAX] {
            assert!(segment_name("I", session).starts_with(&prefix));
        }
    }

    #[test]
    fn posix_name_prepends_slash() {
        assert_eq!(posix_shm_name("yb_pg_I_7"), "/yb_pg_I_7");
    }

    #[test]
    fn posix_name_keeps_existing_slash() {
        assert_eq!(posix_shm_name("/already"), "/already");
    }
}
