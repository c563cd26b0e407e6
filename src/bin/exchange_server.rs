// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Usage:
//   exchange_server <instance_id> <session_id>
//
// Owns the exchange segment for one session and serves requests until
// interrupted: each request payload is echoed back uppercased. Run
// exchange_client with the same instance and session id from another
// terminal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use shm_exchange::{cleanup_instance, ExchangeListener, SharedExchange};

fn main() {
    tracing_subscriber::fmt().init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: exchange_server <instance_id> <session_id>");
        std::process::exit(1);
    }
    let instance_id = &args[1];
    let session_id: u64 = args[2].parse().expect("session_id");

    // Purge leftovers from a previous crash before creating anything new.
    cleanup_instance(instance_id).expect("cleanup");

    let exchange =
        Arc::new(SharedExchange::create(instance_id, session_id).expect("create exchange"));
    println!(
        "serving exchange {instance_id}/{session_id} ({} payload bytes)",
        exchange.capacity()
    );

    let endpoint = Arc::clone(&exchange);
    let listener = ExchangeListener::spawn(Arc::clone(&exchange), move |size| {
        let request = endpoint.read_payload(size).to_vec();
        println!("request: {size} bytes");
        let reply: Vec<u8> = request.iter().map(|b| b.to_ascii_uppercase()).collect();
        unsafe {
            std::ptr::copy_nonoverlapping(reply.as_ptr(), endpoint.payload_ptr(), reply.len());
        }
        endpoint.respond(reply.len()).expect("respond");
    })
    .expect("spawn listener");

    let quit = Arc::new(AtomicBool::new(false));
    {
        let q = Arc::clone(&quit);
        on_termination(move || q.store(true, Ordering::Release));
    }
    while !quit.load(Ordering::Acquire) {
        thread::sleep(Duration::from_millis(100));
    }

    println!("shutting down");
    drop(listener); // signals shutdown and joins the poll thread
}

// Minimal signal hook: sets the flag on SIGINT / SIGTERM.
fn on_termination(f: impl Fn() + Send + 'static) {
    use std::sync::Mutex;
    static CB: std::sync::OnceLock<Mutex<Box<dyn Fn() + Send>>> = std::sync::OnceLock::new();
    CB.get_or_init(|| Mutex::new(Box::new(f)));
    extern "C" fn handler(_: libc::c_int) {
        if let Some(cb) = CB.get() {
            if let Ok(g) = cb.lock() {
                g();
            }
        }
    }
    unsafe {
        libc::signal(libc::SIGINT, handler as *const () as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as *const () as libc::sighandler_t);
    }
}
