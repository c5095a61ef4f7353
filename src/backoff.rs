// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Adaptive backoff for the few places that poll shared state:
// attach waiting on a creator, and `await_mail` polling a mailbox.
// pause -> yield -> sleep, same staging as `ipc::yield(k)`.

use std::time::{Duration, Instant};

/// Adaptive backoff state.
///
/// - k < 4:  busy spin (do nothing)
/// - k < 16: CPU pause hint
/// - k < 32: thread yield
/// - k >= 32: sleep 1ms
#[derive(Debug, Default)]
pub(crate) struct Backoff {
    k: u32,
}

impl Backoff {
    pub(crate) const fn new() -> Self {
        Self { k: 0 }
    }

    /// Wait a little; each call waits at least as long as the previous one.
    #[inline]
    pub(crate) fn snooze(&mut self) {
        if self.k < 4 {
            // busy spin
        } else if self.k < 16 {
            std::hint::spin_loop();
        } else if self.k < 32 {
            std::thread::yield_now();
        } else {
            std::thread::sleep(Duration::from_millis(1));
            return;
        }
        self.k += 1;
    }
}

/// Poll `f` with adaptive backoff until it yields `Some`, or until
/// `deadline` passes (`None` = wait forever).
pub(crate) fn poll_until<T, F>(deadline: Option<Instant>, mut f: F) -> Option<T>
where
    F: FnMut() -> Option<T>,
{
    let mut backoff = Backoff::new();
    loop {
        if let Some(v) = f() {
            return Some(v);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return None;
        }
        backoff.snooze();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_returns_first_some() {
        let mut n = 0;
        let got = poll_until(None, || {
            n += 1;
            (n == 40).then_some(n)
        });
        assert_eq!(got, Some(40));
    }

    #[test]
    fn poll_gives_up_after_deadline() {
        let start = Instant::now();
        let got: Option<()> = poll_until(Some(start + Duration::from_millis(20)), || None);
        assert!(got.is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
