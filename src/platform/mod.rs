// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

#[cfg(unix)]
pub mod posix;

#[cfg(not(unix))]
compile_error!("shm-office needs POSIX shared memory and process-shared semaphores");

// Re-export the platform-specific implementations under a uniform name.

#[cfg(unix)]
pub use posix::PlatformShm;
#[cfg(unix)]
pub use posix::PlatformSemaphore;
