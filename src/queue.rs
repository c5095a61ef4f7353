// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Per-slot bounded FIFO of messages and the semaphore guarding it.
//
// Nodes live in a fixed ring addressed by index: a pointer-linked list
// means nothing once the segment is mapped at a different address in
// another process.

use std::cell::UnsafeCell;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::backoff::poll_until;
use crate::message::Message;
use crate::semaphore::SharedSemaphore;
use crate::MAX_Q_LEN;

const CLOSED: u32 = 0;
const OPEN: u32 = 1;

/// The queued messages of one mailbox. Only reachable under the slot lock.
#[repr(C)]
pub(crate) struct Ring {
    head: u32,
    len: u32,
    nodes: [Message; MAX_Q_LEN],
}

impl Ring {
    pub(crate) fn len(&self) -> usize {
        (self.len as usize).min(MAX_Q_LEN)
    }

    fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Append at the tail. `false` when already holding `MAX_Q_LEN`.
    fn push(&mut self, msg: &Message) -> bool {
        let len = self.len();
        if len >= MAX_Q_LEN {
            return false;
        }
        let tail = (self.head as usize + len) % MAX_Q_LEN;
        self.nodes[tail] = *msg;
        self.len = len as u32 + 1;
        true
    }

    /// Remove the head, copying it out.
    fn pop(&mut self) -> Option<Message> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        let head = self.head as usize % MAX_Q_LEN;
        let msg = self.nodes[head];
        self.head = ((head + 1) % MAX_Q_LEN) as u32;
        self.len = len as u32 - 1;
        Some(msg)
    }
}

/// Outcome of [`MailboxQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Enqueue {
    Queued,
    Full,
    Closed,
}

/// One in-flight send/check on a slot. Dropped after the slot lock is
/// released, which [`MailboxQueue::close`] and [`MailboxQueue::open`]
/// wait for before touching the semaphore.
struct Visit<'a>(&'a AtomicU32);

impl Drop for Visit<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One mailbox slot.
///
/// `open` is only flipped with the vacancy lock held. Messaging paths
/// register in `users` before reading `open` and stay registered until
/// the slot lock is released again, so the semaphore is never destroyed
/// or re-initialised while anyone waits on or holds it. Both sides use
/// `SeqCst`: either the visitor sees CLOSED and never touches the
/// semaphore, or the closer sees the visitor and waits for it.
#[repr(C)]
pub(crate) struct MailboxQueue {
    open: AtomicU32,
    users: AtomicU32,
    lock: SharedSemaphore,
    ring: UnsafeCell<Ring>,
}

impl MailboxQueue {
    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) == OPEN
    }

    /// Register as a visitor; `None` if the slot is closed.
    fn enter(&self) -> Option<Visit<'_>> {
        self.users.fetch_add(1, Ordering::SeqCst);
        let visit = Visit(&self.users);
        (self.open.load(Ordering::SeqCst) == OPEN).then_some(visit)
    }

    /// Wait until no send/check is between `enter` and releasing the lock.
    fn drain_visitors(&self) {
        let _ = poll_until(None, || (self.users.load(Ordering::SeqCst) == 0).then_some(()));
    }

    /// Bring a vacant slot into service: fresh semaphore, empty ring.
    ///
    /// # Safety
    /// Caller holds the vacancy lock and the slot is vacant.
    pub(crate) unsafe fn open(&self) -> io::Result<()> {
        self.drain_visitors();
        self.lock.init_unlocked()?;
        (*self.ring.get()).clear();
        self.open.store(OPEN, Ordering::SeqCst);
        Ok(())
    }

    /// Take an occupied slot out of service, discarding queued messages,
    /// and finalise its semaphore.
    ///
    /// The slot is closed when this returns, even on error; the error only
    /// reports a failed `sem_destroy`.
    ///
    /// # Safety
    /// Caller holds the vacancy lock and the slot is occupied.
    pub(crate) unsafe fn close(&self) -> io::Result<usize> {
        self.open.store(CLOSED, Ordering::SeqCst);
        self.drain_visitors();
        let ring = &mut *self.ring.get();
        let dropped = ring.len();
        ring.clear();
        self.lock.finalize()?;
        Ok(dropped)
    }

    /// Append `msg` unless the slot is closed or full.
    pub(crate) fn enqueue(&self, msg: &Message) -> io::Result<Enqueue> {
        let Some(_visit) = self.enter() else {
            return Ok(Enqueue::Closed);
        };
        let mut ring = self.lock.lock(&self.ring)?;
        if !self.is_open() {
            return Ok(Enqueue::Closed);
        }
        if ring.push(msg) {
            Ok(Enqueue::Queued)
        } else {
            Ok(Enqueue::Full)
        }
    }

    /// Remove and return the oldest message; `None` if closed or empty.
    pub(crate) fn dequeue(&self) -> io::Result<Option<Message>> {
        let Some(_visit) = self.enter() else {
            return Ok(None);
        };
        let mut ring = self.lock.lock(&self.ring)?;
        if !self.is_open() {
            return Ok(None);
        }
        Ok(ring.pop())
    }

    /// Number of queued messages; `None` if closed.
    pub(crate) fn pending(&self) -> io::Result<Option<usize>> {
        let Some(_visit) = self.enter() else {
            return Ok(None);
        };
        let ring = self.lock.lock(&self.ring)?;
        if !self.is_open() {
            return Ok(None);
        }
        Ok(Some(ring.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring() -> Box<Ring> {
        Box::new(Ring {
            head: 0,
            len: 0,
            nodes: [Message::empty(); MAX_Q_LEN],
        })
    }

    fn msg(s: &str) -> Message {
        Message::try_from(s).unwrap()
    }

    #[test]
    fn fifo_order() {
        let mut r = ring();
        for s in ["m1", "m2", "m3"] {
            assert!(r.push(&msg(s)));
        }
        assert_eq!(r.pop(), Some(msg("m1")));
        assert_eq!(r.pop(), Some(msg("m2")));
        assert_eq!(r.pop(), Some(msg("m3")));
        assert_eq!(r.pop(), None);
    }

    #[test]
    fn rejects_past_capacity_and_reclaims() {
        let mut r = ring();
        for i in 0..MAX_Q_LEN {
            assert!(r.push(&msg(&i.to_string())));
        }
        assert!(!r.push(&msg("overflow")));
        assert_eq!(r.len(), MAX_Q_LEN);

        assert_eq!(r.pop(), Some(msg("0")));
        assert!(r.push(&msg("overflow")));
        assert!(!r.push(&msg("again")));
    }

    #[test]
    fn wraps_around_many_times() {
        let mut r = ring();
        for i in 0..(MAX_Q_LEN * 5) {
            assert!(r.push(&msg(&format!("n{i}"))));
            assert!(r.push(&msg(&format!("n{i}b"))));
            assert_eq!(r.pop(), Some(msg(&format!("n{i}"))));
            assert_eq!(r.pop(), Some(msg(&format!("n{i}b"))));
        }
        assert_eq!(r.len(), 0);
    }

    fn slot() -> Box<MailboxQueue> {
        // All-zero is a closed slot with no visitors.
        Box::new(unsafe { std::mem::zeroed() })
    }

    #[test]
    fn closed_slot_turns_visitors_away() {
        let q = slot();
        assert_eq!(q.enqueue(&msg("x")).unwrap(), Enqueue::Closed);
        assert_eq!(q.dequeue().unwrap(), None);
        assert_eq!(q.pending().unwrap(), None);
        assert_eq!(q.users.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn visitors_deregister_on_every_path() {
        let q = slot();
        unsafe { q.open() }.unwrap();
        for i in 0..MAX_Q_LEN {
            assert_eq!(q.enqueue(&msg(&i.to_string())).unwrap(), Enqueue::Queued);
        }
        assert_eq!(q.enqueue(&msg("over")).unwrap(), Enqueue::Full);
        assert_eq!(q.pending().unwrap(), Some(MAX_Q_LEN));
        assert_eq!(q.dequeue().unwrap(), Some(msg("0")));
        assert_eq!(q.users.load(Ordering::SeqCst), 0);

        assert_eq!(unsafe { q.close() }.unwrap(), MAX_Q_LEN - 1);
        assert!(!q.is_open());
        assert_eq!(q.users.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn close_waits_for_visitor() {
        let q = slot();
        unsafe { q.open() }.unwrap();
        let visit = q.enter().expect("open slot admits visitors");

        // The slot is shared memory in practice; hand the thread its address.
        let addr = &*q as *const MailboxQueue as usize;
        std::thread::scope(|s| {
            let closer = s.spawn(move || unsafe { (*(addr as *const MailboxQueue)).close() });
            std::thread::sleep(std::time::Duration::from_millis(50));
            assert!(!closer.is_finished());
            // Closed to newcomers while the old visitor is still inside.
            assert!(q.enter().is_none());
            drop(visit);
            assert_eq!(closer.join().unwrap().unwrap(), 0);
        });
        assert_eq!(q.users.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reopen_after_close_starts_empty() {
        let q = slot();
        unsafe { q.open() }.unwrap();
        q.enqueue(&msg("stale")).unwrap();
        unsafe { q.close() }.unwrap();
        unsafe { q.open() }.unwrap();
        assert_eq!(q.dequeue().unwrap(), None);
        assert_eq!(q.enqueue(&msg("fresh")).unwrap(), Enqueue::Queued);
        assert_eq!(q.dequeue().unwrap(), Some(msg("fresh")));
        unsafe { q.close() }.unwrap();
    }

    #[test]
    fn clear_discards_everything() {
        let mut r = ring();
        r.push(&msg("a"));
        r.push(&msg("b"));
        r.clear();
        assert_eq!(r.len(), 0);
        assert_eq!(r.pop(), None);
    }
}
