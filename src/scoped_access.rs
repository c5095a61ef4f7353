// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// RAII guard that holds a shared semaphore for the lifetime of the access,
// providing read/write to the shared state that semaphore protects.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};

use crate::semaphore::SharedSemaphore;

/// RAII guard: created by [`SharedSemaphore::lock`], posts on drop.
///
/// Dereferences to the guarded state, so the state cannot be touched
/// without the lock being held.
pub struct ScopedAccess<'a, T> {
    sem: &'a SharedSemaphore,
    data: &'a UnsafeCell<T>,
}

impl<'a, T> ScopedAccess<'a, T> {
    /// Wrap an already-acquired semaphore.
    pub(crate) fn new(sem: &'a SharedSemaphore, data: &'a UnsafeCell<T>) -> Self {
        Self { sem, data }
    }
}

impl<'a, T> Deref for ScopedAccess<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: holding the semaphore grants exclusive access.
        unsafe { &*self.data.get() }
    }
}

impl<'a, T> DerefMut for ScopedAccess<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: holding the semaphore grants exclusive access.
        unsafe { &mut *self.data.get() }
    }
}

impl<'a, T> Drop for ScopedAccess<'a, T> {
    fn drop(&mut self) {
        if let Err(e) = self.sem.unlock() {
            log::error!("failed to release shared semaphore: {e}");
        }
    }
}
