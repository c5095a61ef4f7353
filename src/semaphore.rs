// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Binary semaphore used as an inter-process mutex.
// Delegates to platform::PlatformSemaphore.

use std::cell::UnsafeCell;
use std::io;

use crate::platform::PlatformSemaphore;
use crate::scoped_access::ScopedAccess;

/// A binary semaphore stored inside the shared office layout.
///
/// Value 1 means unlocked. The only way to take it is [`lock`](Self::lock),
/// which hands back a [`ScopedAccess`] that posts the semaphore again when
/// dropped, on every exit path.
///
/// A process that dies while holding it leaves it taken; there is no
/// owner-death recovery.
#[repr(transparent)]
pub struct SharedSemaphore {
    inner: PlatformSemaphore,
}

impl SharedSemaphore {
    /// Initialise in place, unlocked.
    ///
    /// # Safety
    /// Nobody else may be using this semaphore, and it must not currently
    /// be initialised.
    pub(crate) unsafe fn init_unlocked(&self) -> io::Result<()> {
        self.inner.init(1)
    }

    /// Finalise the semaphore. It must be re-initialised before next use.
    ///
    /// # Safety
    /// Nobody may be blocked on it or about to lock it.
    pub(crate) unsafe fn finalize(&self) -> io::Result<()> {
        self.inner.destroy()
    }

    /// Block until the semaphore is ours, then grant access to `data`.
    ///
    /// `data` must be the state this semaphore guards.
    pub(crate) fn lock<'a, T>(&'a self, data: &'a UnsafeCell<T>) -> io::Result<ScopedAccess<'a, T>> {
        self.inner.wait()?;
        Ok(ScopedAccess::new(self, data))
    }

    pub(crate) fn unlock(&self) -> io::Result<()> {
        self.inner.post()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use crate::{ShmHandle, ShmOpenMode};

    #[repr(C)]
    struct Guarded {
        sem: SharedSemaphore,
        counter: UnsafeCell<u64>,
    }

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn unique_name(prefix: &str) -> String {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}_sem_{}_{n}", std::process::id())
    }

    fn map(name: &str) -> ShmHandle {
        ShmHandle::acquire(
            name,
            std::mem::size_of::<Guarded>(),
            ShmOpenMode::CreateOrOpen,
            0o600,
            Duration::from_secs(1),
        )
        .expect("acquire")
    }

    fn guarded(shm: &ShmHandle) -> &Guarded {
        unsafe { &*(shm.as_ptr() as *const Guarded) }
    }

    #[test]
    fn relock_after_release() {
        let name = unique_name("relock");
        let _ = ShmHandle::unlink_by_name(&name);
        let shm = map(&name);
        let g = guarded(&shm);
        unsafe { g.sem.init_unlocked() }.expect("init");

        let mut held = g.sem.lock(&g.counter).expect("lock");
        *held = 7;
        drop(held);
        assert_eq!(*g.sem.lock(&g.counter).expect("relock"), 7);

        unsafe { g.sem.finalize() }.expect("finalize");
        ShmHandle::unlink_by_name(&name).expect("unlink");
    }

    // Each thread maps the segment separately, like distinct processes do.
    #[test]
    fn excludes_across_mappings() {
        const THREADS: usize = 4;
        const ROUNDS: u64 = 2000;

        let name = Arc::new(unique_name("across"));
        let _ = ShmHandle::unlink_by_name(&name);
        let owner = map(&name);
        unsafe { guarded(&owner).sem.init_unlocked() }.expect("init");

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let name = Arc::clone(&name);
                thread::spawn(move || {
                    let shm = map(&name);
                    let g = guarded(&shm);
                    for _ in 0..ROUNDS {
                        let mut c = g.sem.lock(&g.counter).expect("lock");
                        *c += 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let g = guarded(&owner);
        let total = *g.sem.lock(&g.counter).expect("lock");
        assert_eq!(total, THREADS as u64 * ROUNDS);
        ShmHandle::unlink_by_name(&name).expect("unlink");
    }
}
