// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Slot vacancy table: which mailbox ids exist, guarded by the office-wide
// semaphore.

use std::cell::UnsafeCell;
use std::io;

use crate::scoped_access::ScopedAccess;
use crate::semaphore::SharedSemaphore;
use crate::MAX_MB;

const VACANT: u8 = 0;
const OCCUPIED: u8 = 1;

/// Slot states plus the occupied count. All-zero bytes = every slot vacant.
///
/// Invariant: `occupied == number of slots marked OCCUPIED`.
#[repr(C)]
pub(crate) struct Slots {
    state: [u8; MAX_MB],
    occupied: u32,
}

impl Slots {
    pub(crate) fn is_vacant(&self, idx: usize) -> bool {
        self.state[idx] != OCCUPIED
    }

    pub(crate) fn occupy(&mut self, idx: usize) {
        debug_assert!(self.is_vacant(idx));
        self.state[idx] = OCCUPIED;
        self.occupied += 1;
    }

    pub(crate) fn vacate(&mut self, idx: usize) {
        debug_assert!(!self.is_vacant(idx));
        self.state[idx] = VACANT;
        self.occupied = self.occupied.saturating_sub(1);
    }

    /// Lowest vacant id, scanning in ascending order.
    pub(crate) fn first_vacant(&self) -> Option<usize> {
        (0..MAX_MB).find(|&i| self.is_vacant(i))
    }

    pub(crate) fn occupied(&self) -> usize {
        self.occupied as usize
    }
}

#[repr(C)]
pub(crate) struct VacancyTable {
    lock: SharedSemaphore,
    slots: UnsafeCell<Slots>,
}

impl VacancyTable {
    /// Reset to all-vacant and initialise the office-wide lock.
    ///
    /// # Safety
    /// Only the creator of the segment may call this, before publishing it.
    pub(crate) unsafe fn init(&self) -> io::Result<()> {
        let slots = &mut *self.slots.get();
        slots.state = [VACANT; MAX_MB];
        slots.occupied = 0;
        self.lock.init_unlocked()
    }

    pub(crate) fn lock(&self) -> io::Result<ScopedAccess<'_, Slots>> {
        self.lock.lock(&self.slots)
    }
}
