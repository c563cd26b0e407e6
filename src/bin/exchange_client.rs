// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Usage:
//   exchange_client <instance_id> <session_id> <message>
//
// Opens the exchange segment created by exchange_server, sends <message>
// as the request payload and prints the response.

use std::time::{Duration, Instant};

use shm_exchange::{ExchangeResponse, SharedExchange};

fn main() {
    tracing_subscriber::fmt().init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!("usage: exchange_client <instance_id> <session_id> <message>");
        std::process::exit(1);
    }
    let instance_id = &args[1];
    let session_id: u64 = args[2].parse().expect("session_id");
    let message = args[3].as_bytes();

    let mut exchange = SharedExchange::open(instance_id, session_id).expect("open exchange");

    let buffer = exchange
        .obtain(message.len())
        .unwrap_or_else(|| panic!("request of {} bytes does not fit", message.len()));
    buffer.copy_from_slice(message);

    let deadline = Instant::now() + Duration::from_secs(5);
    match exchange.send(deadline).expect("send") {
        ExchangeResponse::Data(reply) => {
            println!("reply: {}", String::from_utf8_lossy(reply));
        }
        ExchangeResponse::TooBig(size) => {
            println!("reply of {size} bytes did not fit in the segment");
        }
    }
}
