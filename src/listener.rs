// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Server-side dispatch thread. Turns an endpoint into an event-driven
// responder: the thread blocks in poll and hands each arriving request
// size to the callback, which reads the payload and eventually responds.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::exchange::SharedExchange;

/// A dedicated thread looping on [`SharedExchange::poll`].
///
/// The callback receives the payload size of each request; it is expected
/// to read the request through the endpoint's payload accessors and call
/// `respond` before the sender's deadline. Dropping the listener signals
/// shutdown and joins the thread.
pub struct ExchangeListener {
    exchange: Arc<SharedExchange>,
    thread: Option<JoinHandle<()>>,
}

impl ExchangeListener {
    /// Spawn the poll loop over `exchange`.
    pub fn spawn<F>(exchange: Arc<SharedExchange>, mut on_request: F) -> io::Result<Self>
    where
        F: FnMut(usize) + Send + 'static,
    {
        let endpoint = Arc::clone(&exchange);
        let thread = thread::Builder::new()
            .name(format!("exchange-poll-{}", endpoint.session_id()))
            .spawn(move || loop {
                match endpoint.poll() {
                    Ok(size) => on_request(size),
                    Err(err) if err.is_shutdown() => {
                        tracing::debug!(
                            session_id = endpoint.session_id(),
                            "exchange listener stopping"
                        );
                        break;
                    }
                    Err(err) => {
                        // Anything but shutdown out of poll means a broken
                        // exchange; there is no local recovery.
                        tracing::error!(
                            session_id = endpoint.session_id(),
                            error = %err,
                            "exchange listener poll failed"
                        );
                        std::process::abort();
                    }
                }
            })?;
        Ok(Self {
            exchange,
            thread: Some(thread),
        })
    }

    /// The endpoint this listener serves.
    pub fn exchange(&self) -> &Arc<SharedExchange> {
        &self.exchange
    }
}

impl Drop for ExchangeListener {
    fn drop(&mut self) {
        let _ = self.exchange.signal_stop();
        if let Some(thread) = self.thread.take() {
            if let Err(panic) = thread.join() {
                // The poll thread only dies cleanly on shutdown; a panic
                // (from the callback) must not be swallowed here.
                std::panic::resume_unwind(panic);
            }
        }
    }
}
