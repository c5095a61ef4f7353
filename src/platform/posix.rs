// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX implementation of the shared region and the process-shared
// binary semaphore that guards the office structures.

use std::cell::UnsafeCell;
use std::ffi::CString;
use std::io;
use std::ptr;
use std::time::{Duration, Instant};

use crate::backoff::Backoff;
use crate::shm_name;

/// How many times `CreateOrOpen` restarts when the name vanishes between
/// the failed exclusive create and the attach open (a concurrent destroy).
const CREATE_OR_OPEN_RETRIES: usize = 8;

// ---------------------------------------------------------------------------
// PlatformShm: POSIX shared memory
// ---------------------------------------------------------------------------

pub struct PlatformShm {
    mem: *mut u8,
    size: usize,
    name: String, // POSIX name (with leading '/')
    created: bool,
}

// Safety: the shared memory region is process-shared by design; every
// mutable field inside it is guarded by a process-shared lock or atomic.
unsafe impl Send for PlatformShm {}
unsafe impl Sync for PlatformShm {}

/// Open mode flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmMode {
    Create,
    Open,
    CreateOrOpen,
}

fn shm_open(c_name: &CString, flags: libc::c_int, perms: libc::mode_t) -> io::Result<i32> {
    let fd = unsafe { libc::shm_open(c_name.as_ptr(), flags, perms as libc::c_uint) };
    if fd == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(fd)
}

fn shm_unlink(c_name: &CString) -> io::Result<()> {
    if unsafe { libc::shm_unlink(c_name.as_ptr()) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl PlatformShm {
    /// Acquire a named shared memory region of exactly `size` bytes.
    ///
    /// Whoever wins the `O_CREAT | O_EXCL` race sizes the object and is
    /// reported as the creator; everybody else opens the existing object
    /// and waits up to `size_wait` for the creator's `ftruncate` to land.
    pub fn acquire(
        name: &str,
        size: usize,
        mode: ShmMode,
        perms: u32,
        size_wait: Duration,
    ) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "size is 0"));
        }

        let posix_name = shm_name::make_shm_name(name)?;
        let c_name = CString::new(posix_name.as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let perms = perms as libc::mode_t;
        let excl = libc::O_RDWR | libc::O_CREAT | libc::O_EXCL;

        let (fd, created) = match mode {
            ShmMode::Create => (shm_open(&c_name, excl, perms)?, true),
            ShmMode::Open => (shm_open(&c_name, libc::O_RDWR, perms)?, false),
            ShmMode::CreateOrOpen => Self::create_or_open(&c_name, perms)?,
        };

        if created {
            // Undo umask so the requested permissions are the effective ones.
            unsafe { libc::fchmod(fd, perms) };
            let ret = unsafe { libc::ftruncate(fd, size as libc::off_t) };
            if ret != 0 {
                let err = io::Error::last_os_error();
                unsafe { libc::close(fd) };
                let _ = shm_unlink(&c_name);
                return Err(err);
            }
        } else if let Err(e) = wait_for_size(fd, size, size_wait) {
            unsafe { libc::close(fd) };
            return Err(e);
        }

        let shm = Self::mmap_and_finish(fd, size, posix_name, created);
        if shm.is_err() && created {
            let _ = shm_unlink(&c_name);
        }
        shm
    }

    fn create_or_open(c_name: &CString, perms: libc::mode_t) -> io::Result<(i32, bool)> {
        let excl = libc::O_RDWR | libc::O_CREAT | libc::O_EXCL;
        let mut last = io::Error::from_raw_os_error(libc::ENOENT);
        for _ in 0..CREATE_OR_OPEN_RETRIES {
            match shm_open(c_name, excl, perms) {
                Ok(fd) => return Ok((fd, true)),
                Err(e) if e.raw_os_error() == Some(libc::EEXIST) => {}
                Err(e) => return Err(e),
            }
            match shm_open(c_name, libc::O_RDWR, perms) {
                Ok(fd) => return Ok((fd, false)),
                // Destroyed between our two calls; race for creation again.
                Err(e) if e.raw_os_error() == Some(libc::ENOENT) => last = e,
                Err(e) => return Err(e),
            }
        }
        Err(last)
    }

    fn mmap_and_finish(
        fd: i32,
        size: usize,
        posix_name: String,
        created: bool,
    ) -> io::Result<Self> {
        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };

        if mem == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            mem: mem as *mut u8,
            size,
            name: posix_name,
            created,
        })
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.mem
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.mem
    }

    /// Mapped size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// POSIX name (with leading '/').
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this handle won the exclusive create.
    pub fn created(&self) -> bool {
        self.created
    }

    /// Remove a named shm segment by name. Existing mappings stay valid.
    pub fn unlink_by_name(name: &str) -> io::Result<()> {
        let posix_name = shm_name::make_shm_name(name)?;
        let c_name = CString::new(posix_name.as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        shm_unlink(&c_name)
    }
}

/// Wait until the creator has sized the object to `size` bytes.
///
/// A freshly created object has size 0 until the creator's `ftruncate`;
/// mapping it before then and touching the pages raises SIGBUS.
fn wait_for_size(fd: i32, size: usize, wait: Duration) -> io::Result<()> {
    let deadline = Instant::now() + wait;
    let mut backoff = Backoff::new();
    loop {
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(fd, &mut st) } == -1 {
            return Err(io::Error::last_os_error());
        }
        let actual = st.st_size as usize;
        if actual == size {
            return Ok(());
        }
        if actual != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("shared object is {actual} bytes, expected {size}"),
            ));
        }
        if Instant::now() >= deadline {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "shared object was never sized by its creator",
            ));
        }
        backoff.snooze();
    }
}

impl Drop for PlatformShm {
    fn drop(&mut self) {
        if self.mem.is_null() {
            return;
        }
        // Unmap only. The name outlives every handle until someone unlinks it.
        unsafe { libc::munmap(self.mem as *mut libc::c_void, self.size) };
    }
}

// ---------------------------------------------------------------------------
// PlatformSemaphore: unnamed process-shared POSIX semaphore (sem_t) that
// lives inside the mapped segment.
// ---------------------------------------------------------------------------

/// A `sem_t` embedded in shared memory.
///
/// Never constructed by value: it is only ever reached through a reference
/// into a mapped region, initialised in place with [`init`](Self::init).
#[repr(transparent)]
pub struct PlatformSemaphore {
    sem: UnsafeCell<libc::sem_t>,
}

// Safety: sem_t with pshared = 1 is designed for concurrent use.
unsafe impl Send for PlatformSemaphore {}
unsafe impl Sync for PlatformSemaphore {}

impl PlatformSemaphore {
    /// Initialise in place with `sem_init(pshared = 1, value)`.
    ///
    /// # Safety
    /// No other thread or process may be using this semaphore.
    pub unsafe fn init(&self, value: u32) -> io::Result<()> {
        if libc::sem_init(self.sem.get(), 1, value as libc::c_uint) == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Decrement, blocking while the value is 0. `EINTR` is retried.
    pub fn wait(&self) -> io::Result<()> {
        loop {
            if unsafe { libc::sem_wait(self.sem.get()) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EINTR) {
                return Err(err);
            }
        }
    }

    /// Increment, waking one waiter.
    pub fn post(&self) -> io::Result<()> {
        if unsafe { libc::sem_post(self.sem.get()) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Finalise with `sem_destroy`.
    ///
    /// # Safety
    /// Nobody may be blocked on, or about to use, this semaphore.
    pub unsafe fn destroy(&self) -> io::Result<()> {
        if libc::sem_destroy(self.sem.get()) == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}
