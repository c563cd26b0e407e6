// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The per-process endpoint of one request/response exchange.
//
// An exchange is a single-slot rendezvous: the SQL process writes a request
// into the segment and blocks until the tablet server writes the response
// back into the same bytes. Exactly two endpoints may share a segment, one
// creator (the tablet server side, which owns the OS object) and one opener.
// Behavior with more than two endpoints is undefined; nothing polices it.
//
// Sender operations take `&mut self`: one request in flight per exchange is
// a protocol invariant, and the borrow checker enforces the in-process half
// of it. Responder and control operations take `&self` so a listener thread
// and the owning session can share the endpoint through an `Arc`.

use std::io;
use std::slice;
use std::time::Instant;

use crate::clock;
use crate::error::ExchangeError;
use crate::header::{header_size, ExchangeHeader, ExchangeState};
use crate::names;
use crate::platform::page_size;
use crate::shm::ShmSegment;
use crate::test_hooks;

/// A successful reply from [`SharedExchange::send`].
#[derive(Debug)]
pub enum ExchangeResponse<'a> {
    /// The reply payload, borrowed from the segment.
    Data(&'a [u8]),
    /// The responder produced `usize` bytes but they did not fit in the
    /// segment. Nothing is readable; the reply must travel out-of-band.
    TooBig(usize),
}

/// One endpoint of a shared-memory exchange.
pub struct SharedExchange {
    segment: ShmSegment,
    session_id: u64,
    owner: bool,
    last_size: usize,
    failed_previous_request: bool,
}

impl SharedExchange {
    /// Create the exchange segment for `session_id` and become its owner.
    /// The segment is sized to one page and the header is constructed here,
    /// before any peer can open it.
    pub fn create(instance_id: &str, session_id: u64) -> io::Result<Self> {
        let name = names::segment_name(instance_id, session_id);
        let segment = ShmSegment::create(&name, page_size())?;
        // Safety: freshly created segment, not yet visible to a peer that
        // could have mapped it before the create returned.
        unsafe { ExchangeHeader::construct_at(segment.as_mut_ptr())? };
        Ok(Self {
            segment,
            session_id,
            owner: true,
            last_size: 0,
            failed_previous_request: false,
        })
    }

    /// Open the existing exchange segment for `session_id`. The header was
    /// constructed by the owner and must not be touched here.
    pub fn open(instance_id: &str, session_id: u64) -> io::Result<Self> {
        let name = names::segment_name(instance_id, session_id);
        let segment = ShmSegment::open(&name, page_size())?;
        Ok(Self {
            segment,
            session_id,
            owner: false,
            last_size: 0,
            failed_previous_request: false,
        })
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Payload bytes available in the segment.
    pub fn capacity(&self) -> usize {
        self.segment.mapped_len() - header_size()
    }

    fn header(&self) -> &ExchangeHeader {
        // Safety: the mapping lives as long as self and was constructed by
        // the owner before open() could succeed.
        unsafe { ExchangeHeader::from_raw(self.segment.as_mut_ptr()) }
    }

    fn payload_base(&self) -> *mut u8 {
        // Safety: header_size() < mapped_len() by construction.
        unsafe { self.segment.as_mut_ptr().add(header_size()) }
    }

    /// Reserve the payload buffer for a request of `required_size` bytes.
    ///
    /// Records the size for the following [`send`](Self::send) and returns
    /// the buffer to write the request into, or `None` when the request
    /// cannot fit. Nothing in the shared header changes either way.
    pub fn obtain(&mut self, required_size: usize) -> Option<&mut [u8]> {
        self.last_size = required_size;
        if required_size > self.capacity() {
            return None;
        }
        // Safety: in Idle / drained ResponseSent the sender has exclusive
        // use of the payload buffer; the state machine keeps the peer out.
        Some(unsafe { slice::from_raw_parts_mut(self.payload_base(), required_size) })
    }

    /// Publish the request written via [`obtain`](Self::obtain) and block
    /// until the peer responds, the exchange shuts down, or `deadline`
    /// (monotonic) expires.
    pub fn send(&mut self, deadline: Instant) -> Result<ExchangeResponse<'_>, ExchangeError> {
        match self.send_and_wait(deadline) {
            Ok(data_size) => {
                self.failed_previous_request = false;
                if data_size > self.capacity() {
                    Ok(ExchangeResponse::TooBig(data_size))
                } else {
                    // Safety: peer released the buffer with its ResponseSent
                    // store; we re-acquired it reading the state word.
                    let data =
                        unsafe { slice::from_raw_parts(self.payload_base(), data_size) };
                    Ok(ExchangeResponse::Data(data))
                }
            }
            Err(err) => {
                self.failed_previous_request = true;
                Err(err)
            }
        }
    }

    fn send_and_wait(&mut self, deadline: Instant) -> Result<usize, ExchangeError> {
        let header = self.header();
        header.lock()?;

        let state = header.state();
        if !self.state_ready(state) {
            header.unlock()?;
            return Err(match state {
                ExchangeState::Shutdown => ExchangeError::ShutdownInProgress,
                other => ExchangeError::IllegalState(other),
            });
        }

        // A late reply parked in ResponseSent is discarded by overwriting.
        header.set_data_size(self.last_size);
        header.set_state(ExchangeState::RequestSent);
        header.notify_one()?;

        let abstime = clock::deadline_timespec(deadline);
        loop {
            match header.state() {
                ExchangeState::ResponseSent => break,
                ExchangeState::Shutdown => {
                    header.unlock()?;
                    return Err(ExchangeError::ShutdownInProgress);
                }
                _ => {}
            }
            if !header.wait_until(&abstime)? {
                // Deadline hit. One final look: the response may have
                // arrived in the same instant the wait expired.
                let state = header.state();
                match state {
                    ExchangeState::ResponseSent => break,
                    ExchangeState::Shutdown => {
                        header.unlock()?;
                        return Err(ExchangeError::ShutdownInProgress);
                    }
                    _ => {
                        header.unlock()?;
                        return Err(ExchangeError::TimedOut(state));
                    }
                }
            }
        }

        let data_size = header.data_size();
        header.set_state(ExchangeState::Idle);
        header.unlock()?;
        Ok(data_size)
    }

    fn state_ready(&self, state: ExchangeState) -> bool {
        match state {
            ExchangeState::Idle => true,
            // The peer replied after our deadline elapsed; the stale reply
            // is overwritten by the next request.
            ExchangeState::ResponseSent => self.failed_previous_request,
            _ => false,
        }
    }

    /// Lock-free advisory check of the readiness predicate. A `true` does
    /// not guarantee the next `send` succeeds, but a `false` means `send`
    /// would return `IllegalState` unless the peer moves first.
    pub fn ready_to_send(&self) -> bool {
        self.state_ready(self.header().state())
    }

    /// Read `len` payload bytes. The responder uses this after `poll`
    /// reported a request of `len` bytes; the sender's RequestSent store
    /// released them.
    ///
    /// # Panics
    /// If `len` exceeds the segment's payload capacity.
    pub fn read_payload(&self, len: usize) -> &[u8] {
        assert!(len <= self.capacity(), "payload read beyond segment");
        unsafe { slice::from_raw_parts(self.payload_base(), len) }
    }

    /// Start of the payload buffer. The responder writes its reply here
    /// before calling [`respond`](Self::respond); while a request is in
    /// flight the responder has exclusive use of the buffer.
    pub fn payload_ptr(&self) -> *mut u8 {
        self.payload_base()
    }

    /// Publish a response of `size` payload bytes and wake the sender.
    ///
    /// After shutdown this is a no-op. Called with no request in flight it
    /// is a protocol violation by the peer: the header can no longer be
    /// trusted, and the process terminates.
    pub fn respond(&self, size: usize) -> io::Result<()> {
        let header = self.header();
        header.lock()?;

        let state = header.state();
        if state != ExchangeState::RequestSent {
            header.unlock()?;
            if state == ExchangeState::Shutdown {
                return Ok(());
            }
            tracing::error!(
                session_id = self.session_id,
                ?state,
                "respond called with no request in flight"
            );
            std::process::abort();
        }

        header.set_data_size(size);
        header.set_state(ExchangeState::ResponseSent);
        header.notify_one()?;
        header.unlock()
    }

    /// Block until a request arrives and return its payload size, leaving
    /// the state at `RequestSent` for the caller to read and respond.
    /// There is no deadline; shutdown is the only way to unblock an idle
    /// poller.
    pub fn poll(&self) -> Result<usize, ExchangeError> {
        let header = self.header();
        header.lock()?;
        loop {
            match header.state() {
                ExchangeState::RequestSent => {
                    let size = header.data_size();
                    header.unlock()?;
                    return Ok(size);
                }
                ExchangeState::Shutdown => {
                    header.unlock()?;
                    return Err(ExchangeError::ShutdownInProgress);
                }
                _ => header.wait()?,
            }
        }
    }

    /// Move the exchange to its terminal state and wake every waiter on
    /// both sides. Idempotent; callable from either endpoint.
    pub fn signal_stop(&self) -> io::Result<()> {
        let header = self.header();
        header.lock()?;
        header.set_state(ExchangeState::Shutdown);
        header.broadcast()?;
        header.unlock()
    }
}

impl Drop for SharedExchange {
    fn drop(&mut self) {
        // The opener releases only its mapping (in ShmSegment::drop). The
        // owner also removes the named object so no new peer can attach.
        if self.owner && !test_hooks::skip_segment_removal() {
            self.segment.unlink();
        }
    }
}
