// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named shared memory region backing one office.
// Delegates to platform::PlatformShm.

use std::io;
use std::time::Duration;

use crate::platform::PlatformShm;

/// Open mode for shared memory segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmOpenMode {
    /// Create exclusively; fail if it already exists.
    Create,
    /// Open existing; fail if it does not exist.
    Open,
    /// Create if missing, open if it already exists.
    CreateOrOpen,
}

/// Which side of the create-or-attach race a handle ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// This handle created the object and owns its initialisation.
    Created,
    /// The object already existed; its content belongs to someone else.
    Attached,
}

/// A named, inter-process shared memory region of a fixed size.
///
/// Dropping the handle unmaps it from this process only; the name stays
/// in the system namespace until [`ShmHandle::unlink_by_name`].
pub struct ShmHandle {
    inner: PlatformShm,
}

impl ShmHandle {
    /// Acquire a named region of exactly `size` bytes.
    ///
    /// `perms` are the mode bits applied when this call creates the object.
    /// `size_wait` bounds how long an attacher waits for a concurrent
    /// creator to size the object.
    pub fn acquire(
        name: &str,
        size: usize,
        mode: ShmOpenMode,
        perms: u32,
        size_wait: Duration,
    ) -> io::Result<Self> {
        let platform_mode = match mode {
            ShmOpenMode::Create => crate::platform::posix::ShmMode::Create,
            ShmOpenMode::Open => crate::platform::posix::ShmMode::Open,
            ShmOpenMode::CreateOrOpen => crate::platform::posix::ShmMode::CreateOrOpen,
        };

        let inner = PlatformShm::acquire(name, size, platform_mode, perms, size_wait)?;
        Ok(Self { inner })
    }

    /// Pointer to the start of the region.
    pub fn as_ptr(&self) -> *const u8 {
        self.inner.as_ptr()
    }

    /// Mutable pointer to the start of the region.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.inner.as_mut_ptr()
    }

    /// Mapped size in bytes.
    pub fn size(&self) -> usize {
        self.inner.size()
    }

    /// The platform name used to open the segment.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn acquired(&self) -> Acquired {
        if self.inner.created() {
            Acquired::Created
        } else {
            Acquired::Attached
        }
    }

    /// Remove a named segment from the system namespace.
    ///
    /// Fails with `ErrorKind::NotFound` if no such name exists.
    pub fn unlink_by_name(name: &str) -> io::Result<()> {
        PlatformShm::unlink_by_name(name)
    }
}
