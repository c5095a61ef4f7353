// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Receiving half of the two-process sample.
//
// Usage:
//   demo_receiver [key] [timeout_ms]
//
// Opens the office (default key "sample_mb"), adds mailbox 1, then waits
// for MAX_Q_LEN messages and prints each one. Without a timeout every wait
// is unbounded. The office is destroyed on the way out.
//
// Run `demo_sender` with the same key in another terminal.

use std::time::Duration;

use shm_office::{Office, MAX_Q_LEN};

const DEFAULT_KEY: &str = "sample_mb";
const INBOX: i32 = 1;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let key = args.get(1).map(String::as_str).unwrap_or(DEFAULT_KEY);
    let timeout = match args.get(2).map(|s| s.parse::<u64>()) {
        None => None,
        Some(Ok(ms)) => Some(Duration::from_millis(ms)),
        Some(Err(e)) => {
            eprintln!("usage: demo_receiver [key] [timeout_ms] ({e})");
            std::process::exit(1);
        }
    };

    let office = match Office::open(key) {
        Ok(of) => of,
        Err(e) => {
            eprintln!("failed to open office {key:?}: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = office.add_mailbox(INBOX) {
        eprintln!("add_mailbox({INBOX}): {e}");
    }

    for _ in 0..MAX_Q_LEN {
        match office.await_mail(INBOX, timeout) {
            Some(msg) => match msg.as_str() {
                Some(text) => println!("{text}"),
                None => println!("<{} bytes>", msg.len()),
            },
            None => {
                println!("recv: timed out");
                break;
            }
        }
    }

    office.close();
    if let Err(e) = Office::destroy(key) {
        eprintln!("destroy_office({key:?}): {e}");
    }
}
