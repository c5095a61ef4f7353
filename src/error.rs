// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Result values of the office operations.

use std::io;

use thiserror::Error;

use crate::MAX_MB;

/// Result alias for office operations.
pub type Result<T> = std::result::Result<T, MailError>;

/// Why an office operation did not succeed.
///
/// Out-of-range ids and oversized payloads are caller errors; a full
/// mailbox or office is an ordinary steady state under load. Neither kind
/// changes any shared state. `Os` carries a failed semaphore call.
#[derive(Debug, Error)]
pub enum MailError {
    /// The id is outside `0..MAX_MB`.
    #[error("mailbox id {0} is outside 0..{}", MAX_MB)]
    BadId(i32),

    /// `add_mailbox` on a slot that is already occupied.
    #[error("mailbox {0} already exists")]
    Exists(i32),

    /// The target slot holds no mailbox.
    #[error("mailbox {0} not found")]
    NotFound(i32),

    /// The mailbox already holds `MAX_Q_LEN` messages.
    #[error("mailbox {0} is full")]
    Full(i32),

    /// Every slot of the office is occupied.
    #[error("office has no vacant mailbox")]
    OfficeFull,

    /// Payload longer than `MAX_MSG_SIZE`.
    #[error("message of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },

    /// `destroy` found no office under this key.
    #[error("office {0:?} not found")]
    OfficeNotFound(String),

    #[error("semaphore operation failed: {0}")]
    Os(#[from] io::Error),
}

impl MailError {
    /// Numeric result code, as written by logs and foreign tooling that
    /// speak the `MB_*` codes. Success is `0`.
    pub fn code(&self) -> i32 {
        match self {
            MailError::BadId(_) => -1,
            MailError::Exists(_) => -2,
            MailError::NotFound(_) | MailError::OfficeNotFound(_) => -3,
            MailError::Full(_) => -4,
            MailError::OfficeFull => -5,
            MailError::TooLarge { .. } => -6,
            MailError::Os(_) => -128,
        }
    }
}
