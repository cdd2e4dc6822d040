// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The subset of the System Control and Power Interface (SCPI) protocol needed for PSCI.
//!
//! Messages are passed through two areas of shared SRAM, one for each direction, each holding a
//! command header, a status word and the payload. The message box is only used as a doorbell,
//! with SCPI messages on slot 0.

use crate::{
    aarch64::dmb_sy,
    delay::{Delay, PollResult},
    mmio::Mmio,
    msgbox::{MailboxSlot, MessageBox, TicketTransactionLock, Transaction, TransactionLock},
};
use arm_sysregs::MpidrEl1;
use log::{debug, error};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The message box slot used by SCPI.
const SCPI_MHU_SLOT: MailboxSlot = MailboxSlot::new(0);

/// Offset of the AP to SCP area from the start of the shared memory. The SCP to AP area is at the
/// start.
const SCPI_AP_TO_SCP_OFFSET: usize = 0x100;
const HEADER_OFFSET: usize = 0x0;
const STATUS_OFFSET: usize = 0x4;
const PAYLOAD_OFFSET: usize = 0x8;

/// SCPI only has room for this many clusters in a `GET_CSS_POWER_STATE` response.
const MAX_CLUSTERS: u8 = 0xf;
/// SCPI only has room for this many CPUs per cluster.
const MAX_CPUS_PER_CLUSTER: u8 = 8;

/// SCPI command IDs.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum ScpiCommandId {
    /// The SCP has booted and is ready to take commands.
    ScpReady = 0x01,
    /// Requests a power state change for a CPU, its cluster and the system.
    SetCssPowerState = 0x03,
    /// Queries the power state of all CPUs and clusters.
    GetCssPowerState = 0x04,
    /// Requests a system shutdown or reset.
    SysPowerState = 0x05,
}

/// Status codes returned by the SCP.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum ScpiStatus {
    /// Success.
    Ok = 0,
    /// Invalid parameter(s).
    Param = 1,
    /// Invalid alignment.
    Align = 2,
    /// Invalid size.
    Size = 3,
    /// Invalid handler or callback.
    Handler = 4,
    /// Invalid access or permission denied.
    Access = 5,
    /// Value out of range.
    Range = 6,
    /// Timeout has occurred.
    Timeout = 7,
    /// Invalid memory area or pointer.
    NoMem = 8,
    /// Invalid power state.
    PowerState = 9,
    /// Feature not supported or disabled.
    Support = 10,
    /// Device error.
    Device = 11,
    /// Device is busy.
    Busy = 12,
}

/// Power states as understood by the SCP.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum ScpiPowerState {
    /// Powered and running.
    On = 0,
    /// Powered but not running, state retained.
    Retention = 1,
    /// Powered off.
    Off = 3,
}

/// System-wide power states for `SYS_POWER_STATE`.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum ScpiSystemState {
    /// Turn the system off.
    Shutdown = 0,
    /// Reboot the system.
    Reboot = 1,
    /// Reset the system.
    Reset = 2,
}

/// An error communicating with the SCP.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScpiError {
    /// The SCP did not take our previous message or respond in time.
    Timeout,
    /// The message box carried a message for some other protocol.
    UnexpectedProtocol(u32),
    /// The SCP returned an error status.
    Status(ScpiStatus),
    /// The SCP response didn't have the expected contents.
    MalformedResponse,
    /// The MPIDR can't be represented in SCPI.
    InvalidAffinity,
}

/// The header of an SCPI message.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ScpiHeader {
    /// Command ID, 7 bits.
    pub id: u8,
    /// Command set, 1 bit.
    pub set: bool,
    /// Sender ID, to match responses to requests.
    pub sender: u8,
    /// Payload size in bytes, 9 bits.
    pub size: u16,
}

impl ScpiHeader {
    const ID_MASK: u32 = 0x7f;
    const SET_SHIFT: u32 = 7;
    const SENDER_SHIFT: u32 = 8;
    const SENDER_MASK: u32 = 0xff;
    const SIZE_SHIFT: u32 = 16;
    const SIZE_MASK: u32 = 0x1ff;

    /// Creates a header for a request with the normal command set.
    pub fn request(id: ScpiCommandId, size: u16) -> Self {
        Self {
            id: id.into(),
            set: false,
            sender: 0,
            size,
        }
    }

    /// Decodes a header from its register representation.
    pub fn from_bits(bits: u32) -> Self {
        Self {
            id: (bits & Self::ID_MASK) as u8,
            set: bits & (1 << Self::SET_SHIFT) != 0,
            sender: ((bits >> Self::SENDER_SHIFT) & Self::SENDER_MASK) as u8,
            size: ((bits >> Self::SIZE_SHIFT) & Self::SIZE_MASK) as u16,
        }
    }

    /// Encodes the header into its register representation.
    pub fn to_bits(self) -> u32 {
        (u32::from(self.id) & Self::ID_MASK)
            | u32::from(self.set) << Self::SET_SHIFT
            | (u32::from(self.sender) & Self::SENDER_MASK) << Self::SENDER_SHIFT
            | (u32::from(self.size) & Self::SIZE_MASK) << Self::SIZE_SHIFT
    }
}

/// The power state of a CPU's cluster as reported by `GET_CSS_POWER_STATE`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CssPowerState {
    /// Bitmask of the CPUs of the cluster which are on, indexed by Aff0.
    pub cpu_mask: u8,
    /// Power state of the cluster.
    pub cluster: u8,
}

/// The SCP power management requests used by the PSCI implementation.
pub trait ScpPowerControl {
    /// Waits for the SCP to announce that it is ready, and acknowledges it.
    fn wait_ready(&self) -> Result<(), ScpiError>;

    /// Requests power states for the CPU `mpidr`, its cluster, and the whole system.
    ///
    /// The SCP does not respond to this, so it returns as soon as the request is sent.
    fn set_css_power_state(
        &self,
        mpidr: MpidrEl1,
        cpu: ScpiPowerState,
        cluster: ScpiPowerState,
        css: ScpiPowerState,
    );

    /// Queries the power state of the CPU `mpidr` and its cluster.
    fn get_css_power_state(&self, mpidr: MpidrEl1) -> Result<CssPowerState, ScpiError>;

    /// Requests a system-wide power state change, and returns the status the SCP reports for it.
    fn sys_power_state(&self, state: ScpiSystemState) -> Result<(), ScpiError>;
}

impl<T: ScpPowerControl + ?Sized> ScpPowerControl for &T {
    fn wait_ready(&self) -> Result<(), ScpiError> {
        (**self).wait_ready()
    }

    fn set_css_power_state(
        &self,
        mpidr: MpidrEl1,
        cpu: ScpiPowerState,
        cluster: ScpiPowerState,
        css: ScpiPowerState,
    ) {
        (**self).set_css_power_state(mpidr, cpu, cluster, css)
    }

    fn get_css_power_state(&self, mpidr: MpidrEl1) -> Result<CssPowerState, ScpiError> {
        (**self).get_css_power_state(mpidr)
    }

    fn sys_power_state(&self, state: ScpiSystemState) -> Result<(), ScpiError> {
        (**self).sys_power_state(state)
    }
}

/// SCPI client over the message box and shared SRAM.
pub struct Scpi<M: Mmio, D: Delay, L: TransactionLock = TicketTransactionLock> {
    mmio: M,
    msgbox: MessageBox<M, D, L>,
    shared_mem_base: usize,
}

impl<M: Mmio, D: Delay, L: TransactionLock> Scpi<M, D, L> {
    /// Creates an SCPI client using `msgbox` as the doorbell and the shared memory at
    /// `shared_mem_base` for messages. `mmio` is used to access the shared memory.
    pub const fn new(mmio: M, msgbox: MessageBox<M, D, L>, shared_mem_base: usize) -> Self {
        Self {
            mmio,
            msgbox,
            shared_mem_base,
        }
    }

    fn scp_to_ap(&self) -> usize {
        self.shared_mem_base
    }

    fn ap_to_scp(&self) -> usize {
        self.shared_mem_base + SCPI_AP_TO_SCP_OFFSET
    }

    /// Writes a command header and status to the AP to SCP area.
    fn write_command(&self, header: ScpiHeader, status: u32) {
        self.mmio
            .write32(self.ap_to_scp() + HEADER_OFFSET, header.to_bits());
        self.mmio.write32(self.ap_to_scp() + STATUS_OFFSET, status);
    }

    fn write_payload(&self, payload: u32) {
        self.mmio
            .write32(self.ap_to_scp() + PAYLOAD_OFFSET, payload);
    }

    /// Reads the 16-bit payload entry with the given index from the SCP to AP area.
    fn read_payload_u16(&self, index: usize) -> u16 {
        let offset = index * 2;
        let word = self
            .mmio
            .read32(self.scp_to_ap() + PAYLOAD_OFFSET + (offset & !0x3));
        (word >> ((offset & 0x3) * 8)) as u16
    }

    /// Starts a transaction to send a command to the SCP.
    ///
    /// Fails if the SCP never consumed the previous message, as the shared memory may still be in
    /// use.
    fn start_request(&self) -> Result<Transaction<'_, M, D, L>, ScpiError> {
        let transaction = self.msgbox.start(SCPI_MHU_SLOT);
        if transaction.drain_status() == PollResult::TimedOut {
            return Err(ScpiError::Timeout);
        }
        Ok(transaction)
    }

    fn send(&self, transaction: &mut Transaction<'_, M, D, L>) {
        // Make sure that the payload is visible to the SCP before we ring the doorbell.
        dmb_sy();
        transaction.send();
    }

    /// Waits for a message from the SCP, and returns its header and status.
    fn receive(
        &self,
        transaction: &mut Transaction<'_, M, D, L>,
    ) -> Result<(ScpiHeader, u32), ScpiError> {
        let response = transaction.wait();
        if response.status == PollResult::TimedOut {
            return Err(ScpiError::Timeout);
        }

        // Expect an SCPI message, reject any other protocol.
        if response.value != SCPI_MHU_SLOT.mask() {
            error!(
                "MHU: Unexpected protocol (MHU status: {:#x})",
                response.value
            );
            return Err(ScpiError::UnexpectedProtocol(response.value));
        }

        dmb_sy();
        let header = ScpiHeader::from_bits(self.mmio.read32(self.scp_to_ap() + HEADER_OFFSET));
        let status = self.mmio.read32(self.scp_to_ap() + STATUS_OFFSET);
        Ok((header, status))
    }
}

/// Converts the status word of an SCP response into a result.
fn status_result(status: u32) -> Result<(), ScpiError> {
    match ScpiStatus::try_from(status) {
        Ok(ScpiStatus::Ok) => Ok(()),
        Ok(status) => Err(ScpiError::Status(status)),
        Err(_) => Err(ScpiError::MalformedResponse),
    }
}

impl<M: Mmio, D: Delay, L: TransactionLock> ScpPowerControl for Scpi<M, D, L> {
    fn wait_ready(&self) -> Result<(), ScpiError> {
        debug!("Waiting for SCP_READY command...");

        let (mut header, _) = {
            let mut transaction = self.msgbox.start(SCPI_MHU_SLOT);
            self.receive(&mut transaction)?
        };

        // We are expecting 'SCP Ready', produce the correct error if it's not.
        let status = if header.id != u8::from(ScpiCommandId::ScpReady) {
            error!(
                "Unexpected SCP command: expected command #{}, got command #{}",
                u8::from(ScpiCommandId::ScpReady),
                header.id
            );
            ScpiStatus::Support
        } else if header.size != 0 {
            error!(
                "SCP_READY cmd has incorrect size: expected 0, got {}",
                header.size
            );
            ScpiStatus::Size
        } else {
            ScpiStatus::Ok
        };

        debug!("Sending response for SCP_READY command");

        // Reply with the same header, only the status is updated.
        header.size = 0;
        let mut transaction = self.start_request()?;
        self.write_command(header, status.into());
        self.send(&mut transaction);
        transaction.end();

        match status {
            ScpiStatus::Ok => Ok(()),
            status => Err(ScpiError::Status(status)),
        }
    }

    fn set_css_power_state(
        &self,
        mpidr: MpidrEl1,
        cpu: ScpiPowerState,
        cluster: ScpiPowerState,
        css: ScpiPowerState,
    ) {
        let state = u32::from(mpidr.aff0() & 0x0f)
            | u32::from(mpidr.aff1() & 0x0f) << 4
            | u32::from(u8::from(cpu)) << 8
            | u32::from(u8::from(cluster)) << 12
            | u32::from(u8::from(css)) << 16;

        let mut transaction = match self.start_request() {
            Ok(transaction) => transaction,
            Err(e) => {
                error!("SCPI: Failed to send SET_CSS_POWER_STATE: {e:?}");
                return;
            }
        };
        self.write_command(
            ScpiHeader::request(ScpiCommandId::SetCssPowerState, size_of::<u32>() as u16),
            0,
        );
        self.write_payload(state);
        self.send(&mut transaction);
        // The SCP does not reply to this command, to avoid message box interrupts on the AP side
        // interfering with its power state request.
        transaction.end();
    }

    fn get_css_power_state(&self, mpidr: MpidrEl1) -> Result<CssPowerState, ScpiError> {
        let cpu = mpidr.aff0();
        let cluster = mpidr.aff1();
        if cpu >= MAX_CPUS_PER_CLUSTER || cluster >= MAX_CLUSTERS {
            return Err(ScpiError::InvalidAffinity);
        }

        let mut transaction = self.start_request()?;
        self.write_command(ScpiHeader::request(ScpiCommandId::GetCssPowerState, 0), 0);
        self.send(&mut transaction);
        let (header, status) = self.receive(&mut transaction)?;
        status_result(status)?;

        // There is one 16-bit entry per cluster.
        if usize::from(header.size) < (usize::from(cluster) + 1) * 2 {
            return Err(ScpiError::MalformedResponse);
        }
        let entry = self.read_payload_u16(cluster.into());
        if (entry & 0xf) as u8 != cluster {
            return Err(ScpiError::MalformedResponse);
        }
        transaction.end();

        Ok(CssPowerState {
            cpu_mask: (entry >> 8) as u8,
            cluster: ((entry >> 4) & 0xf) as u8,
        })
    }

    fn sys_power_state(&self, state: ScpiSystemState) -> Result<(), ScpiError> {
        let mut transaction = self.start_request()?;
        self.write_command(ScpiHeader::request(ScpiCommandId::SysPowerState, 1), 0);
        self.write_payload(u8::from(state).into());
        self.send(&mut transaction);
        let (_, status) = self.receive(&mut transaction)?;
        transaction.end();

        status_result(status)
    }
}
