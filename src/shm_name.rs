// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Office key -> POSIX shm object name.
// Keys are validated here so every later syscall sees a well-formed name.

use std::io;

/// FNV-1a 64-bit hash, used to shorten over-long names.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Maximum length for POSIX shm names. Set to 0 to disable truncation.
///
/// On macOS `PSHMNAMLEN` is 31. On Linux the limit is `NAME_MAX` (255) and
/// longer names are rejected by the kernel rather than shortened here.
#[cfg(target_os = "macos")]
pub const SHM_NAME_MAX: usize = 31;

#[cfg(not(target_os = "macos"))]
pub const SHM_NAME_MAX: usize = 0; // 0 = no truncation

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg.to_string())
}

/// Produce the POSIX shm name for an office key (with a single leading '/').
///
/// A key may carry its own leading '/', but must not be empty, must not
/// contain NUL and must not contain '/' anywhere else: POSIX leaves
/// multi-component names implementation-defined and Linux rejects them.
pub fn make_shm_name(key: &str) -> io::Result<String> {
    let body = key.strip_prefix('/').unwrap_or(key);
    if body.is_empty() {
        return Err(invalid("office key is empty"));
    }
    if body.contains('\0') {
        return Err(invalid("office key contains NUL"));
    }
    if body.contains('/') {
        return Err(invalid("office key contains '/'"));
    }

    let full = format!("/{body}");
    if SHM_NAME_MAX == 0 || full.len() <= SHM_NAME_MAX {
        return Ok(full);
    }
    Ok(shorten(&full))
}

/// `/<prefix>_<16 hex digits of fnv1a(full)>`, exactly `SHM_NAME_MAX` bytes
/// at most. The prefix keeps the name recognisable in `/dev/shm` listings.
fn shorten(full: &str) -> String {
    // '/' + '_' + 16 hex digits
    const FIXED: usize = 1 + 1 + 16;
    let prefix_len = SHM_NAME_MAX.saturating_sub(FIXED);

    let body = &full[1..];
    let mut cut = prefix_len.min(body.len());
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }

    format!("/{}_{:016x}", &body[..cut], fnv1a_64(full.as_bytes()))
}
