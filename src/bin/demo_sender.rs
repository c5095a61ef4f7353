// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Sending half of the two-process sample.
//
// Usage:
//   demo_sender [key]
//
// Opens the office (default key "sample_mb"), adds its own mailbox 3 and
// sends MAX_Q_LEN numbered messages to mailbox 1, which `demo_receiver`
// owns. A full or missing destination is reported and the message skipped.

use shm_office::{Message, Office, MAX_Q_LEN};

const DEFAULT_KEY: &str = "sample_mb";
const OWN_BOX: i32 = 3;
const DEST: i32 = 1;

fn main() {
    env_logger::init();

    let key = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_KEY.to_string());

    let office = match Office::open(&key) {
        Ok(of) => of,
        Err(e) => {
            eprintln!("failed to open office {key:?}: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = office.add_mailbox(OWN_BOX) {
        eprintln!("add_mailbox({OWN_BOX}): {e}");
    }

    for i in 0..MAX_Q_LEN {
        let text = format!("Hello world, this is message {i}");
        let msg = match Message::try_from(text.as_str()) {
            Ok(m) => m,
            Err(e) => {
                eprintln!("message {i}: {e}");
                continue;
            }
        };
        match office.send_mail(DEST, &msg) {
            Ok(()) => println!("sent: {text}"),
            Err(e) => eprintln!("send_mail({DEST}): {e} [code {}]", e.code()),
        }
    }
}
