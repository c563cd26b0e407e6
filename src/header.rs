// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The synchronization header at offset 0 of every exchange segment.
// Both processes map the same bytes, so the layout here is the wire format:
// mutex, condition variable, state word and payload byte count, followed
// immediately by the payload buffer which runs to the end of the mapping.
// Creator and opener must be built from the same crate version.

use std::io;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::platform::{RawCondvar, RawMutex};

/// Exchange protocol state, stored as a 32-bit word in the shared header.
///
/// `Idle` is the only resting state; `RequestSent` and `ResponseSent` must
/// each be drained by the opposite party. `Shutdown` is terminal.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle = 0,
    RequestSent = 1,
    ResponseSent = 2,
    Shutdown = 3,
}

impl ExchangeState {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Idle),
            1 => Some(Self::RequestSent),
            2 => Some(Self::ResponseSent),
            3 => Some(Self::Shutdown),
            _ => None,
        }
    }
}

/// Shared synchronization record at offset 0 of the mapped region.
///
/// `data` is a zero-length trailing array marking where the payload begins;
/// the payload extends to the end of the mapping. Use [`header_size`] for
/// the byte offset of the payload, never a hand-computed constant.
#[repr(C)]
pub struct ExchangeHeader {
    mutex: RawMutex,
    cond: RawCondvar,
    state: AtomicU32,
    data_size: AtomicUsize,
    data: [u8; 0],
}

/// Byte offset of the payload buffer within the mapped region.
pub fn header_size() -> usize {
    std::mem::offset_of!(ExchangeHeader, data)
}

impl ExchangeHeader {
    /// Placement-construct the header at the start of a freshly created
    /// mapping: zero the header bytes, initialise the process-shared mutex
    /// and condition variable, and set the state machine to `Idle`.
    ///
    /// # Safety
    /// `mem` must point to at least [`header_size`] writable bytes that no
    /// other process has mapped yet. Must be called exactly once per
    /// segment, by its creator.
    pub unsafe fn construct_at<'a>(mem: *mut u8) -> io::Result<&'a ExchangeHeader> {
        std::ptr::write_bytes(mem, 0, header_size());
        let header = &*(mem as *const ExchangeHeader);
        header.mutex.init()?;
        header.cond.init()?;
        header.state.store(ExchangeState::Idle as u32, Ordering::Release);
        header.data_size.store(0, Ordering::Relaxed);
        Ok(header)
    }

    /// Reinterpret an already-constructed mapping as a header.
    ///
    /// # Safety
    /// `mem` must point to a mapping on which [`ExchangeHeader::construct_at`]
    /// has completed (in this or another process), and the mapping must
    /// outlive the returned reference.
    pub unsafe fn from_raw<'a>(mem: *mut u8) -> &'a ExchangeHeader {
        &*(mem as *const ExchangeHeader)
    }

    /// Current protocol state (acquire load).
    ///
    /// A word that does not decode means the peer scribbled over the header;
    /// there is no local recovery from that.
    pub fn state(&self) -> ExchangeState {
        let raw = self.state.load(Ordering::Acquire);
        ExchangeState::from_u32(raw)
            .unwrap_or_else(|| panic!("corrupted exchange header: state word {raw}"))
    }

    /// Store a new protocol state (release store).
    pub fn set_state(&self, state: ExchangeState) {
        self.state.store(state as u32, Ordering::Release);
    }

    /// Payload byte count. Only meaningful in `RequestSent` / `ResponseSent`.
    pub fn data_size(&self) -> usize {
        self.data_size.load(Ordering::Relaxed)
    }

    pub fn set_data_size(&self, size: usize) {
        self.data_size.store(size, Ordering::Relaxed);
    }

    pub fn lock(&self) -> io::Result<()> {
        self.mutex.lock()
    }

    pub fn unlock(&self) -> io::Result<()> {
        self.mutex.unlock()
    }

    /// Wait on the header condvar. Caller must hold the header mutex.
    pub fn wait(&self) -> io::Result<()> {
        self.cond.wait(&self.mutex)
    }

    /// Wait with an absolute wall-clock deadline. Caller must hold the
    /// header mutex. Returns `Ok(false)` on timeout.
    pub fn wait_until(&self, abstime: &libc::timespec) -> io::Result<bool> {
        self.cond.wait_until(&self.mutex, abstime)
    }

    pub fn notify_one(&self) -> io::Result<()> {
        self.cond.notify_one()
    }

    pub fn broadcast(&self) -> io::Result<()> {
        self.cond.broadcast()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_roundtrip() {
        for state in [
            ExchangeState::Idle,
            ExchangeState::RequestSent,
            ExchangeState::ResponseSent,
            ExchangeState::Shutdown,
        ] {
            assert_eq!(ExchangeState::from_u32(state as u32), Some(state));
        }
    }

    #[test]
    fn unknown_state_word_rejected() {
        assert_eq!(ExchangeState::from_u32(4), None);
        assert_eq!(ExchangeState::from_u32(u32::MAX), None);
    }

    #[test]
    fn header_fits_in_one_page() {
        let page = crate::platform::page_size();
        let header = header_size();
        assert!(header > 0);
        // The payload region must be non-trivial after the header.
        assert!(header < page / 2, "header {header} leaves no payload in a {page}-byte page");
    }

    #[test]
    fn construct_in_anonymous_memory() {
        // Alignment of the header is at most 16 on the supported targets;
        // a u128 allocation satisfies it.
        assert!(std::mem::align_of::<ExchangeHeader>() <= std::mem::align_of::<u128>());
        let words = header_size() / std::mem::size_of::<u128>() + 1;
        let mut backing = vec![0u128; words];
        let mem = backing.as_mut_ptr() as *mut u8;

        let header = unsafe { ExchangeHeader::construct_at(mem).expect("construct") };
        assert_eq!(header.state(), ExchangeState::Idle);
        assert_eq!(header.data_size(), 0);

        header.set_data_size(17);
        header.set_state(ExchangeState::RequestSent);
        assert_eq!(header.state(), ExchangeState::RequestSent);
        assert_eq!(header.data_size(), 17);

        header.lock().expect("lock");
        header.notify_one().expect("notify");
        header.unlock().expect("unlock");
    }
}
