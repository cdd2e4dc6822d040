// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Busy-wait delays and bounded polling.

#[cfg(target_arch = "aarch64")]
use core::arch::asm;
#[cfg(target_arch = "aarch64")]
use core::hint::spin_loop;

/// Something which can busy-wait for a number of microseconds.
pub trait Delay {
    /// Spins for at least `us` microseconds.
    fn delay_us(&self, us: u32);
}

impl<T: Delay + ?Sized> Delay for &T {
    fn delay_us(&self, us: u32) {
        (**self).delay_us(us)
    }
}

/// The outcome of polling a condition with a [`RetryPolicy`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PollResult {
    /// The condition became true before the policy ran out of attempts.
    Ready,
    /// The condition was still false after the last attempt.
    TimedOut,
}

/// How often and how long to poll a hardware condition before giving up.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// The maximum number of times the condition is checked.
    pub attempts: u32,
    /// The delay between two consecutive checks, in microseconds.
    pub delay_us: u32,
}

impl RetryPolicy {
    /// Returns the upper bound of the time spent waiting by [`Self::poll`], in microseconds.
    pub const fn timeout_us(&self) -> u64 {
        self.attempts.saturating_sub(1) as u64 * self.delay_us as u64
    }

    /// Checks `condition` until it returns true or `attempts` checks have been made, waiting
    /// `delay_us` between checks.
    pub fn poll(&self, delay: &impl Delay, mut condition: impl FnMut() -> bool) -> PollResult {
        for attempt in 1..=self.attempts {
            if condition() {
                return PollResult::Ready;
            }
            if attempt < self.attempts {
                delay.delay_us(self.delay_us);
            }
        }
        PollResult::TimedOut
    }
}

/// Delays using the Arm generic timer physical counter.
#[cfg(target_arch = "aarch64")]
#[derive(Debug, Default)]
pub struct GenericTimerDelay;

#[cfg(target_arch = "aarch64")]
impl GenericTimerDelay {
    fn read_counter() -> u64 {
        let value: u64;
        // SAFETY: This only reads a readable timer system register.
        unsafe {
            asm!("mrs {}, cntpct_el0", out(reg) value, options(nostack, nomem, preserves_flags));
        }
        value
    }

    fn read_frequency() -> u64 {
        let value: u64;
        // SAFETY: This only reads a readable timer system register.
        unsafe {
            asm!("mrs {}, cntfrq_el0", out(reg) value, options(nostack, nomem, preserves_flags));
        }
        value
    }
}

#[cfg(target_arch = "aarch64")]
impl Delay for GenericTimerDelay {
    fn delay_us(&self, us: u32) {
        let ticks = u64::from(us) * Self::read_frequency() / 1_000_000;
        let start = Self::read_counter();
        while Self::read_counter().wrapping_sub(start) < ticks {
            spin_loop();
        }
    }
}
