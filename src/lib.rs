// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Brokerless message passing between processes on one host.
//
// One process opens an office under a string key; any process holding the
// key attaches to the same named shared memory segment. The office holds
// up to MAX_MB numbered mailboxes, each a bounded FIFO that any attached
// process can send into and poll.
//
// The constants below and the `repr(C)` layout of the office are the whole
// contract between processes: builds that disagree on them refuse to attach.

/// Maximum number of mailbox slots per office.
pub const MAX_MB: usize = 24;

/// Maximum number of queued messages per mailbox.
pub const MAX_Q_LEN: usize = 8;

/// Maximum payload bytes per message.
pub const MAX_MSG_SIZE: usize = 1024;

pub mod shm_name;

mod backoff;
mod platform;

mod shm;
pub use shm::{Acquired, ShmHandle, ShmOpenMode};

mod semaphore;
mod scoped_access;

mod error;
pub use error::{MailError, Result};

mod message;
pub use message::Message;

mod queue;
mod vacancy;

mod office;
pub use office::{
    destroy_office, office_size, open_office, Office, OfficeOptions, LAYOUT_VERSION, OFFICE_MAGIC,
};
