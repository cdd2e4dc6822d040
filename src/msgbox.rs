// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Driver for the sunxi message box, used as the doorbell to the ARISC management processor.
//!
//! Only one channel of the message box is used, and the value written to it is a bitmask with one
//! bit set for the protocol slot of the command. There is no sequence number or addressing, so
//! the whole start, send, wait, end sequence must run under a single system-wide lock. This is
//! enforced by [`Transaction`], which holds the lock for as long as it exists.

use crate::{
    delay::{Delay, PollResult, RetryPolicy},
    mmio::Mmio,
};
use log::warn;
use spin::mutex::{TicketMutex, TicketMutexGuard};

pub(crate) const IRQ_STATUS_REG: usize = 0x0070;
pub(crate) const REMOTE_IRQ_STATUS_REG: usize = 0x0050;

/// The message box channel used for secure messages.
pub const MBOX_CHANNEL: usize = 1;

/// How long to wait for the SCP before giving up: 5000 checks, 100 µs apart (500 ms in total).
pub const MBOX_RETRY_POLICY: RetryPolicy = RetryPolicy {
    attempts: 5000,
    delay_us: 100,
};

/// Local receive interrupt status bit for channel `n`.
pub(crate) const fn rx_irq(n: usize) -> u32 {
    1 << (2 + 4 * n)
}

/// Remote receive interrupt status bit for channel `n`.
pub(crate) const fn remote_rx_irq(n: usize) -> u32 {
    1 << (4 * n)
}

pub(crate) const fn rx_msg_data_reg(n: usize) -> usize {
    0x0184 + 0x8 * n
}

pub(crate) const fn tx_msg_data_reg(n: usize) -> usize {
    0x0180 + 0x8 * n
}

/// A slot of the message box protocol, i.e. a bit position in the 32-bit message.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct MailboxSlot(u8);

impl MailboxSlot {
    /// The highest valid slot ID.
    pub const MAX_ID: u8 = 31;

    /// Creates a slot with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if `id` is greater than [`Self::MAX_ID`].
    pub const fn new(id: u8) -> Self {
        assert!(id <= Self::MAX_ID, "Message box slot ID out of range");
        Self(id)
    }

    /// Returns the message value for this slot, with only the slot's bit set.
    pub const fn mask(self) -> u32 {
        1 << self.0
    }
}

/// The lock serialising message box transactions across all cores.
///
/// The lock is held for as long as the guard returned by [`TransactionLock::acquire`] is alive,
/// and released when it is dropped.
pub trait TransactionLock {
    /// Guard type which releases the lock when dropped.
    type Guard<'a>
    where
        Self: 'a;

    /// Blocks until the lock is acquired.
    fn acquire(&self) -> Self::Guard<'_>;
}

impl<T: TransactionLock + ?Sized> TransactionLock for &T {
    type Guard<'a>
        = T::Guard<'a>
    where
        Self: 'a;

    fn acquire(&self) -> Self::Guard<'_> {
        (**self).acquire()
    }
}

/// A fair spin lock, which grants the lock to contending cores in the order they asked for it.
#[derive(Debug)]
pub struct TicketTransactionLock(TicketMutex<()>);

impl TicketTransactionLock {
    /// Creates a new unlocked transaction lock.
    pub const fn new() -> Self {
        Self(TicketMutex::new(()))
    }
}

impl Default for TicketTransactionLock {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionLock for TicketTransactionLock {
    type Guard<'a> = TicketMutexGuard<'a, ()>;

    fn acquire(&self) -> Self::Guard<'_> {
        self.0.lock()
    }
}

/// A response read from the message box by [`Transaction::wait`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Response {
    /// The raw value of the receive data register.
    ///
    /// If `status` is [`PollResult::TimedOut`] this may be a stale value from an earlier message.
    pub value: u32,
    /// Whether the receive interrupt was seen before the timeout.
    pub status: PollResult,
}

/// The sunxi message box.
pub struct MessageBox<M: Mmio, D: Delay, L: TransactionLock = TicketTransactionLock> {
    mmio: M,
    delay: D,
    lock: L,
    base: usize,
}

impl<M: Mmio, D: Delay, L: TransactionLock> MessageBox<M, D, L> {
    /// Creates a driver for the message box with registers at `base`.
    pub const fn new(mmio: M, delay: D, lock: L, base: usize) -> Self {
        Self {
            mmio,
            delay,
            lock,
            base,
        }
    }

    /// Returns whether a message from the remote side is waiting for us.
    fn rx_pending(&self) -> bool {
        self.mmio.read32(self.base + IRQ_STATUS_REG) & rx_irq(MBOX_CHANNEL) != 0
    }

    /// Returns whether a message we sent has not yet been taken by the remote side.
    fn tx_pending(&self) -> bool {
        self.mmio.read32(self.base + REMOTE_IRQ_STATUS_REG) & remote_rx_irq(MBOX_CHANNEL) != 0
    }

    /// Starts a transaction for `slot`.
    ///
    /// This blocks until any transaction on another core has ended, then waits for the SCP to
    /// consume any message still pending from before. If that doesn't happen within
    /// [`MBOX_RETRY_POLICY`] a warning is logged and the transaction starts anyway.
    pub fn start(&self, slot: MailboxSlot) -> Transaction<'_, M, D, L> {
        let guard = self.lock.acquire();

        // Make sure any previous command has finished.
        let drained = MBOX_RETRY_POLICY.poll(&self.delay, || !self.tx_pending());
        if drained == PollResult::TimedOut {
            warn!(
                "Message box start timeout after {} us!",
                MBOX_RETRY_POLICY.timeout_us()
            );
        }

        Transaction {
            msgbox: self,
            slot,
            drained,
            _guard: guard,
        }
    }
}

/// An ongoing message box transaction, holding the transaction lock.
///
/// Dropping the transaction (or calling [`Transaction::end`]) acknowledges any received message
/// and releases the lock.
pub struct Transaction<'a, M: Mmio, D: Delay, L: TransactionLock + 'a> {
    msgbox: &'a MessageBox<M, D, L>,
    slot: MailboxSlot,
    drained: PollResult,
    _guard: L::Guard<'a>,
}

impl<'a, M: Mmio, D: Delay, L: TransactionLock + 'a> Transaction<'a, M, D, L> {
    /// Returns whether the previous message had been consumed when the transaction started.
    pub fn drain_status(&self) -> PollResult {
        self.drained
    }

    /// Sends the command for this transaction's slot to the SCP.
    ///
    /// # Panics
    ///
    /// Panics if the SCP still hasn't consumed the previous message, as writing now would corrupt
    /// it.
    pub fn send(&mut self) {
        assert!(
            !self.msgbox.tx_pending(),
            "Message box send while the previous message is pending"
        );

        self.msgbox.mmio.write32(
            self.msgbox.base + tx_msg_data_reg(MBOX_CHANNEL),
            self.slot.mask(),
        );
    }

    /// Waits for the SCP to respond, and returns the value it sent.
    ///
    /// If no response arrives within [`MBOX_RETRY_POLICY`] a warning is logged, and the current
    /// contents of the receive register are returned with [`PollResult::TimedOut`].
    pub fn wait(&mut self) -> Response {
        let status = MBOX_RETRY_POLICY.poll(&self.msgbox.delay, || self.msgbox.rx_pending());
        if status == PollResult::TimedOut {
            warn!(
                "Message box wait timeout after {} us!",
                MBOX_RETRY_POLICY.timeout_us()
            );
        }

        Response {
            value: self
                .msgbox
                .mmio
                .read32(self.msgbox.base + rx_msg_data_reg(MBOX_CHANNEL)),
            status,
        }
    }

    /// Ends the transaction, releasing the lock for the next one.
    pub fn end(self) {}
}

impl<'a, M: Mmio, D: Delay, L: TransactionLock + 'a> Drop for Transaction<'a, M, D, L> {
    fn drop(&mut self) {
        // Clear any response we got by clearing the interrupt status. The lock guard is only
        // dropped after this.
        self.msgbox
            .mmio
            .write32(self.msgbox.base + IRQ_STATUS_REG, rx_irq(MBOX_CHANNEL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::test::{FakeDelay, FakeMmio, LockEvent, RecordingLock};
    use std::{
        collections::BTreeMap,
        sync::atomic::{AtomicUsize, Ordering},
        thread,
    };

    const BASE: usize = 0x1000;

    /// Behaves like an SCP which immediately echoes every message back, with write-1-to-clear
    /// interrupt status.
    fn echo_scp(registers: &mut BTreeMap<usize, u32>, address: usize, value: u32) {
        match address.wrapping_sub(BASE) {
            IRQ_STATUS_REG => {
                *registers.entry(address).or_default() &= !value;
            }
            offset if offset == tx_msg_data_reg(MBOX_CHANNEL) => {
                registers.insert(address, value);
                registers.insert(BASE + rx_msg_data_reg(MBOX_CHANNEL), value);
                *registers.entry(BASE + IRQ_STATUS_REG).or_default() |= rx_irq(MBOX_CHANNEL);
            }
            _ => {
                registers.insert(address, value);
            }
        }
    }

    #[test]
    fn register_layout() {
        assert_eq!(rx_irq(MBOX_CHANNEL), 1 << 6);
        assert_eq!(remote_rx_irq(MBOX_CHANNEL), 1 << 4);
        assert_eq!(tx_msg_data_reg(MBOX_CHANNEL), 0x0188);
        assert_eq!(rx_msg_data_reg(MBOX_CHANNEL), 0x018c);
        assert_eq!(MBOX_RETRY_POLICY.timeout_us(), 499_900);
    }

    #[test]
    fn slot_mask_has_single_bit() {
        for id in 0..=MailboxSlot::MAX_ID {
            let slot = MailboxSlot::new(id);
            assert_eq!(slot.mask().count_ones(), 1);
            assert_eq!(slot.mask().trailing_zeros(), u32::from(id));
        }
    }

    #[test]
    #[should_panic(expected = "slot ID out of range")]
    fn slot_out_of_range() {
        MailboxSlot::new(32);
    }

    #[test]
    fn full_transaction_for_every_slot() {
        let mmio = FakeMmio::with_write_hook(echo_scp);
        let delay = FakeDelay::new();
        let msgbox = MessageBox::new(&mmio, &delay, TicketTransactionLock::new(), BASE);

        for id in 0..=MailboxSlot::MAX_ID {
            let slot = MailboxSlot::new(id);
            mmio.clear_writes();

            let mut transaction = msgbox.start(slot);
            assert_eq!(transaction.drain_status(), PollResult::Ready);
            transaction.send();
            let response = transaction.wait();
            transaction.end();

            assert_eq!(
                response,
                Response {
                    value: 1 << id,
                    status: PollResult::Ready
                }
            );
            assert_eq!(
                mmio.writes_to(BASE + tx_msg_data_reg(MBOX_CHANNEL)),
                vec![1 << id]
            );
            // The response was acknowledged.
            assert_eq!(
                mmio.writes_to(BASE + IRQ_STATUS_REG),
                vec![rx_irq(MBOX_CHANNEL)]
            );
            assert_eq!(mmio.get(BASE + IRQ_STATUS_REG) & rx_irq(MBOX_CHANNEL), 0);
        }
        assert_eq!(delay.elapsed_us(), 0);
    }

    #[test]
    fn wait_times_out() {
        let mmio = FakeMmio::new();
        let delay = FakeDelay::new();
        let msgbox = MessageBox::new(&mmio, &delay, TicketTransactionLock::new(), BASE);
        // A stale value from some earlier message.
        mmio.set(BASE + rx_msg_data_reg(MBOX_CHANNEL), 0x42);

        let mut transaction = msgbox.start(MailboxSlot::new(0));
        transaction.send();
        let response = transaction.wait();
        transaction.end();

        assert_eq!(response.status, PollResult::TimedOut);
        assert_eq!(response.value, 0x42);
        assert_eq!(delay.elapsed_us(), 499_900);
    }

    #[test]
    fn start_times_out_and_continues() {
        let mmio = FakeMmio::new();
        let delay = FakeDelay::new();
        let msgbox = MessageBox::new(&mmio, &delay, TicketTransactionLock::new(), BASE);
        mmio.set(BASE + REMOTE_IRQ_STATUS_REG, remote_rx_irq(MBOX_CHANNEL));

        let transaction = msgbox.start(MailboxSlot::new(3));

        assert_eq!(transaction.drain_status(), PollResult::TimedOut);
        assert_eq!(delay.elapsed_us(), MBOX_RETRY_POLICY.timeout_us());
    }

    #[test]
    #[should_panic(expected = "previous message is pending")]
    fn send_with_message_pending() {
        let mmio = FakeMmio::new();
        let delay = FakeDelay::new();
        let msgbox = MessageBox::new(&mmio, &delay, TicketTransactionLock::new(), BASE);
        mmio.set(BASE + REMOTE_IRQ_STATUS_REG, remote_rx_irq(MBOX_CHANNEL));

        let mut transaction = msgbox.start(MailboxSlot::new(0));
        transaction.send();
    }

    #[test]
    fn lock_held_for_whole_transaction() {
        let mmio = FakeMmio::with_write_hook(echo_scp);
        let delay = FakeDelay::new();
        let lock = RecordingLock::new();
        let msgbox = MessageBox::new(&mmio, &delay, &lock, BASE);

        let mut transaction = msgbox.start(MailboxSlot::new(1));
        assert_eq!(lock.events(), vec![LockEvent::Acquire]);
        transaction.send();
        transaction.wait();
        assert_eq!(lock.events(), vec![LockEvent::Acquire]);
        transaction.end();
        assert_eq!(lock.events(), vec![LockEvent::Acquire, LockEvent::Release]);

        // Dropping a transaction without ending it explicitly also acknowledges and unlocks.
        mmio.clear_writes();
        drop(msgbox.start(MailboxSlot::new(1)));
        assert_eq!(
            lock.events(),
            vec![
                LockEvent::Acquire,
                LockEvent::Release,
                LockEvent::Acquire,
                LockEvent::Release
            ]
        );
        assert_eq!(
            mmio.writes_to(BASE + IRQ_STATUS_REG),
            vec![rx_irq(MBOX_CHANNEL)]
        );
    }

    #[test]
    fn concurrent_transactions_are_serialised() {
        const THREADS: usize = 8;
        const TRANSACTIONS_PER_THREAD: usize = 50;

        let mmio = FakeMmio::with_write_hook(echo_scp);
        let delay = FakeDelay::new();
        let msgbox = MessageBox::new(&mmio, &delay, TicketTransactionLock::new(), BASE);
        let in_flight = AtomicUsize::new(0);
        let max_in_flight = AtomicUsize::new(0);

        thread::scope(|scope| {
            for thread_index in 0..THREADS {
                let msgbox = &msgbox;
                let in_flight = &in_flight;
                let max_in_flight = &max_in_flight;
                scope.spawn(move || {
                    let slot = MailboxSlot::new(thread_index as u8);
                    for _ in 0..TRANSACTIONS_PER_THREAD {
                        let mut transaction = msgbox.start(slot);
                        transaction.send();
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_in_flight.fetch_max(now, Ordering::SeqCst);
                        let response = transaction.wait();
                        assert_eq!(response.value, slot.mask());
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        transaction.end();
                    }
                });
            }
        });

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(
            mmio.writes_to(BASE + tx_msg_data_reg(MBOX_CHANNEL)).len(),
            THREADS * TRANSACTIONS_PER_THREAD
        );
    }
}
