// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Fixed-capacity message, stored by value inside mailbox queues.

use std::fmt;

use crate::error::MailError;
use crate::MAX_MSG_SIZE;

/// One message: up to [`MAX_MSG_SIZE`] payload bytes plus their length.
///
/// The layout is part of the shared segment, so it is `repr(C)` with a
/// `u32` length regardless of the pointer width of the process.
/// [`Office::check_mail`](crate::Office::check_mail) always hands out a copy,
/// never a reference into the mapping.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Message {
    payload: [u8; MAX_MSG_SIZE],
    len: u32,
}

impl Message {
    /// An empty message.
    pub const fn empty() -> Self {
        Self {
            payload: [0; MAX_MSG_SIZE],
            len: 0,
        }
    }

    /// Copy `data` into a new message.
    ///
    /// # Errors
    /// [`MailError::TooLarge`] if `data` exceeds [`MAX_MSG_SIZE`].
    pub fn new(data: &[u8]) -> Result<Self, MailError> {
        if data.len() > MAX_MSG_SIZE {
            return Err(MailError::TooLarge {
                len: data.len(),
                max: MAX_MSG_SIZE,
            });
        }
        let mut msg = Self::empty();
        msg.payload[..data.len()].copy_from_slice(data);
        msg.len = data.len() as u32;
        Ok(msg)
    }

    /// Payload bytes.
    ///
    /// The length is clamped so a corrupted length word in shared memory
    /// can never index past the buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload[..self.len()]
    }

    pub fn len(&self) -> usize {
        (self.len as usize).min(MAX_MSG_SIZE)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Payload as UTF-8, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Message {}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Message");
        d.field("len", &self.len());
        match self.as_str() {
            Some(s) => d.field("text", &s),
            None => d.field("bytes", &self.as_bytes()),
        };
        d.finish()
    }
}

impl TryFrom<&[u8]> for Message {
    type Error = MailError;

    fn try_from(data: &[u8]) -> Result<Self, MailError> {
        Self::new(data)
    }
}

impl TryFrom<&str> for Message {
    type Error = MailError;

    fn try_from(s: &str) -> Result<Self, MailError> {
        Self::new(s.as_bytes())
    }
}
