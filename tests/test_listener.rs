// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Tests for the server-side dispatch thread.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use shm_exchange::{ExchangeError, ExchangeListener, ExchangeResponse, SharedExchange};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_instance(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{}_{n}", std::process::id())
}

fn far_deadline() -> Instant {
    Instant::now() + Duration::from_secs(5)
}

// The listener hands each request to the callback and the callback's
// respond completes the client's send.
#[test]
fn dispatches_requests() {
    let instance = unique_instance("dispatch");
    let server = Arc::new(SharedExchange::create(&instance, 3).expect("create"));
    let mut client = SharedExchange::open(&instance, 3).expect("open");

    let served = Arc::new(AtomicUsize::new(0));
    let listener = {
        let endpoint = Arc::clone(&server);
        let served = Arc::clone(&served);
        ExchangeListener::spawn(Arc::clone(&server), move |size| {
            let mut request = endpoint.read_payload(size).to_vec();
            request.reverse();
            unsafe {
                std::ptr::copy_nonoverlapping(
                    request.as_ptr(),
                    endpoint.payload_ptr(),
                    request.len(),
                );
            }
            endpoint.respond(request.len()).expect("respond");
            served.fetch_add(1, Ordering::Relaxed);
        })
        .expect("spawn listener")
    };

    for message in [&b"ping"[..], &b"exchange"[..]] {
        let mut expected = message.to_vec();
        expected.reverse();
        client
            .obtain(message.len())
            .expect("obtain")
            .copy_from_slice(message);
        match client.send(far_deadline()).expect("send") {
            ExchangeResponse::Data(reply) => assert_eq!(reply, &expected[..]),
            ExchangeResponse::TooBig(size) => panic!("unexpected oversize reply of {size}"),
        }
    }
    assert_eq!(served.load(Ordering::Relaxed), 2);

    // Dropping the listener shuts the exchange down and joins the thread.
    drop(listener);
    client.obtain(1).expect("obtain")[0] = 1;
    match client.send(far_deadline()) {
        Err(ExchangeError::ShutdownInProgress) => {}
        other => panic!("send after listener drop: {:?}", other.map(|_| ())),
    }
}

// The callback reports the exact size the sender published.
#[test]
fn callback_sees_request_size() {
    let instance = unique_instance("sizes");
    let server = Arc::new(SharedExchange::create(&instance, 1).expect("create"));
    let mut client = SharedExchange::open(&instance, 1).expect("open");

    let seen = Arc::new(AtomicUsize::new(usize::MAX));
    let _listener = {
        let endpoint = Arc::clone(&server);
        let seen = Arc::clone(&seen);
        ExchangeListener::spawn(Arc::clone(&server), move |size| {
            seen.store(size, Ordering::SeqCst);
            // Empty reply: a response does not need a payload.
            endpoint.respond(0).expect("respond");
        })
        .expect("spawn listener")
    };

    client.obtain(37).expect("obtain").fill(0xEE);
    match client.send(far_deadline()).expect("send") {
        ExchangeResponse::Data(reply) => assert!(reply.is_empty()),
        ExchangeResponse::TooBig(size) => panic!("unexpected oversize reply of {size}"),
    }
    assert_eq!(seen.load(Ordering::SeqCst), 37);
}

// An idle listener terminates promptly on shutdown; drop must not hang.
#[test]
fn stops_while_idle() {
    let instance = unique_instance("idle_stop");
    let server = Arc::new(SharedExchange::create(&instance, 1).expect("create"));

    let invoked = Arc::new(AtomicUsize::new(0));
    let listener = {
        let invoked = Arc::clone(&invoked);
        ExchangeListener::spawn(Arc::clone(&server), move |_| {
            invoked.fetch_add(1, Ordering::Relaxed);
        })
        .expect("spawn listener")
    };

    thread::sleep(Duration::from_millis(50));
    drop(listener);
    assert_eq!(invoked.load(Ordering::Relaxed), 0);
}

// signal_stop from the owner handle stops the listener even before drop.
#[test]
fn stops_on_explicit_signal() {
    let instance = unique_instance("explicit_stop");
    let server = Arc::new(SharedExchange::create(&instance, 1).expect("create"));

    let listener =
        ExchangeListener::spawn(Arc::clone(&server), move |_| {}).expect("spawn listener");
    server.signal_stop().expect("signal_stop");

    // Give the poll thread a moment to observe shutdown, then drop; the
    // join inside drop completes because the thread already exited.
    thread::sleep(Duration::from_millis(50));
    assert!(listener.exchange().session_id() == 1);
    drop(listener);
}
