// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The office: a vacancy table plus MAX_MB mailbox queues, laid out in one
// named shared memory segment and shared by every process holding the key.

use std::fmt;
use std::io;
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crate::backoff::poll_until;
use crate::error::{MailError, Result};
use crate::message::Message;
use crate::queue::{Enqueue, MailboxQueue};
use crate::shm::{Acquired, ShmHandle, ShmOpenMode};
use crate::vacancy::VacancyTable;
use crate::{MAX_MB, MAX_MSG_SIZE, MAX_Q_LEN};

/// First word of every office segment ("MBOF").
pub const OFFICE_MAGIC: u32 = u32::from_be_bytes(*b"MBOF");

/// Bumped whenever the shared layout changes.
pub const LAYOUT_VERSION: u32 = 2;

const NOT_READY: u32 = 0;
const READY: u32 = 1;

const _: () = assert!(MAX_MB > 0 && MAX_MB <= i32::MAX as usize);
const _: () = assert!(MAX_Q_LEN > 0 && MAX_Q_LEN <= u32::MAX as usize);
const _: () = assert!(MAX_MSG_SIZE <= u32::MAX as usize);

// ---------------------------------------------------------------------------
// Shared layout
// ---------------------------------------------------------------------------

/// Written once by the creator. `ready` is published last, with release
/// ordering; nothing else in the segment may be used until it reads READY.
#[repr(C)]
struct Header {
    magic: u32,
    version: u32,
    max_mb: u32,
    max_q_len: u32,
    max_msg_size: u32,
    ready: AtomicU32,
}

impl Header {
    fn current() -> Self {
        Self {
            magic: OFFICE_MAGIC,
            version: LAYOUT_VERSION,
            max_mb: MAX_MB as u32,
            max_q_len: MAX_Q_LEN as u32,
            max_msg_size: MAX_MSG_SIZE as u32,
            ready: AtomicU32::new(NOT_READY),
        }
    }

    /// Describe the first disagreement with this build's layout, if any.
    fn mismatch(&self) -> Option<String> {
        let want = Self::current();
        let fields = [
            ("magic", self.magic, want.magic),
            ("layout version", self.version, want.version),
            ("MAX_MB", self.max_mb, want.max_mb),
            ("MAX_Q_LEN", self.max_q_len, want.max_q_len),
            ("MAX_MSG_SIZE", self.max_msg_size, want.max_msg_size),
        ];
        fields
            .iter()
            .find(|(_, got, want)| got != want)
            .map(|(what, got, want)| format!("{what} is {got:#x}, expected {want:#x}"))
    }
}

#[repr(C)]
struct OfficeLayout {
    header: Header,
    vacancy: VacancyTable,
    mailboxes: [MailboxQueue; MAX_MB],
}

/// Size in bytes of the shared segment backing one office.
pub const fn office_size() -> usize {
    std::mem::size_of::<OfficeLayout>()
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Runtime knobs for [`Office::open_with`].
#[derive(Debug, Clone)]
pub struct OfficeOptions {
    permissions: u32,
    attach_timeout: Duration,
}

impl OfficeOptions {
    pub fn new() -> Self {
        Self {
            permissions: 0o600,
            attach_timeout: Duration::from_secs(1),
        }
    }

    /// Mode bits for the shared object when this process creates it.
    /// Default `0o600`: only the creating user may attach.
    pub fn permissions(mut self, mode: u32) -> Self {
        self.permissions = mode;
        self
    }

    /// How long an attacher waits for a concurrent creator to finish
    /// initialising the office. Default one second.
    pub fn attach_timeout(mut self, timeout: Duration) -> Self {
        self.attach_timeout = timeout;
        self
    }
}

impl Default for OfficeOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Office handle
// ---------------------------------------------------------------------------

/// Process-local handle to a shared office.
///
/// Every operation acts on the mapped memory every attached process sees.
/// Structural changes (add/remove/get_vacant) serialise on the office-wide
/// lock; send/check only take the lock of the one mailbox they touch.
///
/// Dropping the handle unmaps the office from this process; it keeps
/// existing for everyone else until [`Office::destroy`].
///
/// Removing or re-adding a mailbox waits for sends and checks already in
/// progress on it to finish.
///
/// A process that dies while holding either lock, or in the middle of a
/// send/check, wedges that mailbox (or all structural operations) for
/// every process.
pub struct Office {
    shm: ShmHandle,
    key: String,
    creator: bool,
}

fn slot_index(id: i32) -> Result<usize> {
    usize::try_from(id)
        .ok()
        .filter(|&i| i < MAX_MB)
        .ok_or(MailError::BadId(id))
}

impl Office {
    /// Create the office named `key`, or attach to it if it already exists.
    pub fn open(key: &str) -> io::Result<Self> {
        Self::open_with(key, &OfficeOptions::default())
    }

    /// [`open`](Self::open) with explicit options.
    ///
    /// Exactly one of any number of racing callers creates and initialises
    /// the segment; the others attach and wait for it to be published.
    /// Attaching to a segment written by a build with different constants
    /// fails with `ErrorKind::InvalidData`.
    pub fn open_with(key: &str, opts: &OfficeOptions) -> io::Result<Self> {
        let shm = ShmHandle::acquire(
            key,
            office_size(),
            ShmOpenMode::CreateOrOpen,
            opts.permissions,
            opts.attach_timeout,
        )?;
        let creator = shm.acquired() == Acquired::Created;
        let office = Self {
            shm,
            key: key.to_string(),
            creator,
        };

        if creator {
            if let Err(e) = unsafe { office.initialize() } {
                let _ = ShmHandle::unlink_by_name(key);
                return Err(e);
            }
            log::debug!("created office {key:?} ({} bytes)", office_size());
        } else {
            office.await_ready(Instant::now() + opts.attach_timeout)?;
            log::debug!("attached to office {key:?}");
        }
        Ok(office)
    }

    /// Zero the segment, write the header, set up the vacancy table and
    /// publish.
    ///
    /// # Safety
    /// Only the creator, before anyone can observe READY.
    unsafe fn initialize(&self) -> io::Result<()> {
        let base = self.shm.as_mut_ptr();
        ptr::write_bytes(base, 0, self.shm.size());
        ptr::write(base as *mut Header, Header::current());

        let layout = self.layout();
        layout.vacancy.init()?;
        layout.header.ready.store(READY, Ordering::Release);
        Ok(())
    }

    fn await_ready(&self, deadline: Instant) -> io::Result<()> {
        let header = &self.layout().header;
        let ready = poll_until(Some(deadline), || {
            (header.ready.load(Ordering::Acquire) == READY).then_some(())
        });
        if ready.is_none() {
            log::warn!("office {:?} was never published by its creator", self.key);
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("office {:?} was never initialised", self.key),
            ));
        }
        if let Some(why) = header.mismatch() {
            log::warn!("refusing to attach to office {:?}: {why}", self.key);
            return Err(io::Error::new(io::ErrorKind::InvalidData, why));
        }
        Ok(())
    }

    fn layout(&self) -> &OfficeLayout {
        // Safety: the mapping is page-aligned, exactly office_size() bytes,
        // and lives as long as `self`.
        unsafe { &*(self.shm.as_ptr() as *const OfficeLayout) }
    }

    fn mailbox(&self, idx: usize) -> &MailboxQueue {
        &self.layout().mailboxes[idx]
    }

    /// The key this office was opened with.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether this handle created (and initialised) the office.
    pub fn is_creator(&self) -> bool {
        self.creator
    }

    /// Bring mailbox `id` into service with an empty queue.
    ///
    /// # Errors
    /// [`MailError::BadId`] for ids outside `0..MAX_MB`,
    /// [`MailError::Exists`] if the slot is already occupied.
    pub fn add_mailbox(&self, id: i32) -> Result<()> {
        let idx = slot_index(id)?;
        let mut slots = self.layout().vacancy.lock()?;
        if !slots.is_vacant(idx) {
            return Err(MailError::Exists(id));
        }
        unsafe { self.mailbox(idx).open()? };
        slots.occupy(idx);
        log::debug!("office {:?}: added mailbox {id}", self.key);
        Ok(())
    }

    /// Take mailbox `id` out of service. Messages still queued are discarded.
    ///
    /// # Errors
    /// [`MailError::BadId`] for ids outside `0..MAX_MB`,
    /// [`MailError::NotFound`] if the slot is vacant (e.g. a second remove).
    pub fn remove_mailbox(&self, id: i32) -> Result<()> {
        let idx = slot_index(id)?;
        let mut slots = self.layout().vacancy.lock()?;
        if slots.is_vacant(idx) {
            return Err(MailError::NotFound(id));
        }
        let closed = unsafe { self.mailbox(idx).close() };
        slots.vacate(idx);
        let dropped = closed.map_err(|e| {
            log::warn!("office {:?}: mailbox {id} removed, but finalising its lock failed: {e}", self.key);
            e
        })?;
        log::debug!(
            "office {:?}: removed mailbox {id}, discarded {dropped} message(s)",
            self.key
        );
        Ok(())
    }

    /// Lowest vacant mailbox id right now.
    ///
    /// Only a hint: another process may add that id before you do, in
    /// which case your `add_mailbox` returns [`MailError::Exists`].
    ///
    /// # Errors
    /// [`MailError::OfficeFull`] when all `MAX_MB` slots are occupied.
    pub fn get_vacant(&self) -> Result<i32> {
        let slots = self.layout().vacancy.lock()?;
        slots
            .first_vacant()
            .map(|i| i as i32)
            .ok_or(MailError::OfficeFull)
    }

    /// Queue a copy of `msg` at the tail of mailbox `dest`.
    ///
    /// Sending to your own mailbox is allowed.
    ///
    /// # Errors
    /// [`MailError::BadId`], [`MailError::NotFound`] for a vacant slot,
    /// [`MailError::Full`] when `MAX_Q_LEN` messages are already queued.
    pub fn send_mail(&self, dest: i32, msg: &Message) -> Result<()> {
        let idx = slot_index(dest)?;
        match self.mailbox(idx).enqueue(msg)? {
            Enqueue::Queued => {
                log::trace!("office {:?}: {} byte(s) -> mailbox {dest}", self.key, msg.len());
                Ok(())
            }
            Enqueue::Full => Err(MailError::Full(dest)),
            Enqueue::Closed => Err(MailError::NotFound(dest)),
        }
    }

    /// Take the oldest message from mailbox `id`, without blocking.
    ///
    /// `None` when the id is out of range, the slot is vacant, or the
    /// queue is empty; validate the id yourself if you need to tell these
    /// apart.
    pub fn check_mail(&self, id: i32) -> Option<Message> {
        let idx = slot_index(id).ok()?;
        match self.mailbox(idx).dequeue() {
            Ok(msg) => {
                if let Some(m) = &msg {
                    log::trace!("office {:?}: mailbox {id} -> {} byte(s)", self.key, m.len());
                }
                msg
            }
            Err(e) => {
                log::error!("office {:?}: locking mailbox {id} failed: {e}", self.key);
                None
            }
        }
    }

    /// Poll mailbox `id` until a message arrives or `timeout` elapses
    /// (`None` waits indefinitely).
    ///
    /// Returns `None` straight away for an invalid id or vacant slot, and
    /// stops waiting if the mailbox is removed meanwhile.
    pub fn await_mail(&self, id: i32, timeout: Option<Duration>) -> Option<Message> {
        let idx = slot_index(id).ok()?;
        let queue = self.mailbox(idx);
        let deadline = timeout.map(|t| Instant::now() + t);

        poll_until(deadline, || match queue.dequeue() {
            Ok(Some(m)) => Some(Some(m)),
            Ok(None) if !queue.is_open() => Some(None),
            Ok(None) => None,
            Err(e) => {
                log::error!("office {:?}: locking mailbox {id} failed: {e}", self.key);
                Some(None)
            }
        })
        .flatten()
    }

    /// Number of occupied slots, read under the office-wide lock.
    pub fn occupied_count(&self) -> Result<usize> {
        Ok(self.layout().vacancy.lock()?.occupied())
    }

    /// Whether mailbox `id` exists at this instant. Lock-free snapshot.
    pub fn is_occupied(&self, id: i32) -> bool {
        slot_index(id).is_ok_and(|idx| self.mailbox(idx).is_open())
    }

    /// Number of messages waiting in mailbox `id`; `None` for an invalid
    /// id or vacant slot.
    pub fn pending(&self, id: i32) -> Option<usize> {
        let idx = slot_index(id).ok()?;
        match self.mailbox(idx).pending() {
            Ok(n) => n,
            Err(e) => {
                log::error!("office {:?}: locking mailbox {id} failed: {e}", self.key);
                None
            }
        }
    }

    /// Unmap the office from this process. Other processes are unaffected.
    pub fn close(self) {
        log::debug!("closing office {:?}", self.key);
    }

    /// Remove `key` from the system namespace.
    ///
    /// Processes that already have it mapped keep working on the now
    /// anonymous memory; nobody new can attach. A later `open` with the
    /// same key creates a fresh office.
    ///
    /// # Errors
    /// [`MailError::OfficeNotFound`] if no office exists under `key`,
    /// including a second destroy of the same key.
    pub fn destroy(key: &str) -> Result<()> {
        match ShmHandle::unlink_by_name(key) {
            Ok(()) => {
                log::debug!("destroyed office {key:?}");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(MailError::OfficeNotFound(key.to_string()))
            }
            Err(e) => Err(MailError::Os(e)),
        }
    }
}

impl fmt::Debug for Office {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Office")
            .field("key", &self.key)
            .field("shm", &self.shm.name())
            .field("creator", &self.creator)
            .finish()
    }
}

/// Create-or-attach; see [`Office::open`].
pub fn open_office(key: &str) -> io::Result<Office> {
    Office::open(key)
}

/// Unlink an office; see [`Office::destroy`].
pub fn destroy_office(key: &str) -> Result<()> {
    Office::destroy(key)
}
