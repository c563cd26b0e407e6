// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Deadline conversion for the exchange condvar.
// Callers express deadlines on the monotonic clock; pthread condition
// variables wait on wall-clock time. A process-wide baseline pairing the
// two clocks is sampled once, lazily, and every conversion after that is
// additive. If the wall clock is stepped the converted deadlines drift by
// the step, which is acceptable for the short deadlines used here.

use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

static BASELINE: OnceLock<(Instant, SystemTime)> = OnceLock::new();

fn baseline() -> (Instant, SystemTime) {
    *BASELINE.get_or_init(|| (Instant::now(), SystemTime::now()))
}

/// Map a monotonic deadline onto the wall clock.
pub fn wall_deadline(deadline: Instant) -> SystemTime {
    let (mono, wall) = baseline();
    match deadline.checked_duration_since(mono) {
        Some(ahead) => wall + ahead,
        None => wall - mono.duration_since(deadline),
    }
}

/// Map a monotonic deadline onto the absolute `timespec` expected by
/// `pthread_cond_timedwait`. Deadlines already in the past map to an
/// already-expired timespec, so the wait returns immediately.
pub fn deadline_timespec(deadline: Instant) -> libc::timespec {
    let since_epoch = wall_deadline(deadline)
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    libc::timespec {
        tv_sec: since_epoch.as_secs() as libc::time_t,
        tv_nsec: since_epoch.subsec_nanos() as libc::c_long,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_sampled_once() {
        assert_eq!(baseline(), baseline());
    }

    #[test]
    fn future_deadline_maps_ahead_of_now() {
        let wall = wall_deadline(Instant::now() + Duration::from_secs(5));
        let ahead = wall
            .duration_since(SystemTime::now())
            .expect("converted deadline should be in the future");
        assert!(ahead > Duration::from_secs(4));
        assert!(ahead < Duration::from_secs(6));
    }

    #[test]
    fn conversion_is_additive() {
        let now = Instant::now();
        let a = wall_deadline(now + Duration::from_secs(1));
        let b = wall_deadline(now + Duration::from_secs(3));
        assert_eq!(b.duration_since(a).unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn expired_deadline_expired_timespec() {
        let ts = deadline_timespec(Instant::now());
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap();
        // Allow generous slack; the point is it is not in the far future.
        assert!(ts.tv_sec as u64 <= now.as_secs() + 1);
    }
}
