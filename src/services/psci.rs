// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The platform side of the Power State Coordination Interface.
//!
//! The generic PSCI framework coordinates the power states of all power domains, and calls into a
//! [`PsciPlatformInterface`] implementation to validate requests and to actually perform the
//! transitions.

use arm_psci::{ErrorCode, HwState, Mpidr};
use bitflags::bitflags;
use core::fmt::Debug;
use num_enum::{IntoPrimitive, TryFromPrimitive};

bitflags! {
    /// Optional platform feature flags
    #[derive(Debug, Eq, PartialEq, Clone, Copy)]
    #[repr(transparent)]
    pub struct PsciPlatformOptionalFeatures: u64 {
        /// `SYSTEM_OFF2` is implemented.
        const SYSTEM_OFF2 = 1 << 0;
        /// `SYSTEM_RESET2` is implemented.
        const SYSTEM_RESET2 = 1 << 1;
        /// `MEM_PROTECT` is implemented.
        const MEM_PROTECT = 1 << 2;
        /// `MEM_PROTECT_CHECK_RANGE` is implemented.
        const MEM_PROTECT_CHECK_RANGE = 1 << 3;
        /// `CPU_FREEZE` is implemented.
        const CPU_FREEZE = 1 << 4;
        /// `CPU_DEFAULT_SUSPEND` is implemented.
        const CPU_DEFAULT_SUSPEND = 1 << 5;
        /// `NODE_HW_STATE` is implemented.
        const NODE_HW_STATE = 1 << 6;
        /// `SYSTEM_SUSPEND` is implemented.
        const SYSTEM_SUSPEND = 1 << 7;
        /// OS-initiated suspend mode is supported.
        const OS_INITIATED_MODE = 1 << 8;
    }
}

/// A level of the power domain hierarchy.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, Ord, PartialEq, PartialOrd, TryFromPrimitive)]
#[repr(u32)]
pub enum PowerLevel {
    /// A single CPU.
    Cpu = 0,
    /// A cluster of CPUs.
    Cluster = 1,
    /// The whole system.
    System = 2,
}

impl PowerLevel {
    /// Returns the level as an index into a [`PsciCompositePowerState`].
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Maximal power level in the system.
pub const MAX_POWER_LEVEL: usize = PowerLevel::System.index();

/// Platform-specific power state interface
///
/// The platform has to provide a platform-specific power state type which implements this trait
/// and all of the dependent traits.
///
/// The type has to implement the `Ord` trait in a way the states are in ascending order from
/// running state to power down state.
pub trait PlatformPowerStateInterface:
    Debug + Clone + Copy + PartialEq + Ord + Into<usize>
{
    /// The deepest power down state.
    const OFF: Self;
    /// The running state.
    const RUN: Self;

    /// Returns the type of the platform-specific power state.
    fn power_state_type(&self) -> PowerStateType;
}

/// The broad category of a power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerStateType {
    /// Powered off, context is lost.
    PowerDown,
    /// Not running, but context is retained.
    StandbyOrRetention,
    /// Running.
    Run,
}

/// Object for storing platform-specific power state for multiple power levels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsciCompositePowerState<S: PlatformPowerStateInterface> {
    /// The local state of each power level, indexed by [`PowerLevel`].
    pub states: [S; MAX_POWER_LEVEL + 1],
}

impl<S: PlatformPowerStateInterface> PsciCompositePowerState<S> {
    /// The index of the CPU level in `states`.
    pub const CPU_POWER_LEVEL: usize = PowerLevel::Cpu.index();

    /// States set to OFF on all levels.
    pub const OFF: Self = Self {
        states: [S::OFF; MAX_POWER_LEVEL + 1],
    };

    /// States set to RUN on all levels.
    pub const RUN: Self = Self {
        states: [S::RUN; MAX_POWER_LEVEL + 1],
    };

    /// Creates a composite state from the local state of each level.
    pub fn new(states: [S; MAX_POWER_LEVEL + 1]) -> Self {
        Self { states }
    }

    /// Returns the power state of the given level.
    pub fn level_state(&self, level: PowerLevel) -> S {
        self.states[level.index()]
    }

    /// Returns the power state of the CPU level.
    pub fn cpu_level_state(&self) -> S {
        self.states[Self::CPU_POWER_LEVEL]
    }
}

/// The kind of state requested by a `CPU_SUSPEND` power state parameter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PowerStateRequestType {
    /// Standby or retention, execution resumes after the call.
    Standby,
    /// Power down, execution resumes at the entry point.
    PowerDown,
}

/// A `CPU_SUSPEND` power state parameter in the original (non-extended) StateID format.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PowerStateRequest {
    /// The highest power level affected by the request, bits [25:24].
    pub power_level: u8,
    /// Bit [16].
    pub state_type: PowerStateRequestType,
    /// Platform specific state ID, bits [15:0].
    pub state_id: u16,
}

impl PowerStateRequest {
    const POWER_LEVEL_SHIFT: u32 = 24;
    const POWER_LEVEL_MASK: u32 = 0x3;
    const STATE_TYPE_POWER_DOWN: u32 = 1 << 16;
    const STATE_ID_MASK: u32 = 0xffff;
}

impl From<u32> for PowerStateRequest {
    fn from(value: u32) -> Self {
        Self {
            power_level: ((value >> Self::POWER_LEVEL_SHIFT) & Self::POWER_LEVEL_MASK) as u8,
            state_type: if value & Self::STATE_TYPE_POWER_DOWN != 0 {
                PowerStateRequestType::PowerDown
            } else {
                PowerStateRequestType::Standby
            },
            state_id: (value & Self::STATE_ID_MASK) as u16,
        }
    }
}

/// PSCI platform interface
///
/// The interface contains mandatory and optional constants and functions. Whether the platform
/// implements the optional functions has to be in sync with the reported optional features in the
/// `FEATURES` constant.
pub trait PsciPlatformInterface {
    /// Flags for describing optional features implemented by the platform.
    const FEATURES: PsciPlatformOptionalFeatures;

    /// Platform-specific power state type
    type PlatformPowerState: PlatformPowerStateInterface;

    /// Converts a `CPU_SUSPEND` power state parameter into the target state of each level.
    fn validate_power_state(
        &self,
        power_state: u32,
    ) -> Result<PsciCompositePowerState<Self::PlatformPowerState>, ErrorCode>;

    /// Checks that a non-secure entry point address is acceptable.
    fn validate_ns_entrypoint(&self, entrypoint: u64) -> Result<(), ErrorCode>;

    /// Places the current CPU into standby state and continues execution on interrupt.
    /// The caller has to guarantee that `cpu_state` is a standby power state, otherwise
    /// `cpu_standby` should panic.
    fn cpu_standby(&self, cpu_state: Self::PlatformPowerState);

    /// Performs the necessary actions to turn off this cpu e.g. program the power controller.
    fn power_domain_suspend(
        &self,
        target_state: &PsciCompositePowerState<Self::PlatformPowerState>,
    );

    /// Performs platform-specific operations after a wake-up from standby/retention states.
    fn power_domain_suspend_finish(
        &self,
        previous_state: &PsciCompositePowerState<Self::PlatformPowerState>,
    );

    /// Perform platform-specific actions to turn this cpu off e.g. program the power controller.
    fn power_domain_off(&self, target_state: &PsciCompositePowerState<Self::PlatformPowerState>);

    /// Turn on power domain, which is identified by its MPIDR.
    fn power_domain_on(&self, mpidr: Mpidr) -> Result<(), ErrorCode>;

    /// Perform platform-specific actions after the CPU has been turned on.
    fn power_domain_on_finish(
        &self,
        previous_state: &PsciCompositePowerState<Self::PlatformPowerState>,
    );

    /// Shuts down the system.
    fn system_off(&self) -> !;

    /// Resets the system, the behavior is equivalent to a hardware power-cycle sequence.
    fn system_reset(&self) -> !;

    /// Returns the true hardware state of a power domain, optional.
    fn node_hw_state(&self, _mpidr: Mpidr, _power_level: u32) -> Result<HwState, ErrorCode> {
        unimplemented!("NODE_HW_STATE is not implemented for the platform")
    }

    /// Returns the power state for `SYSTEM_SUSPEND`, optional.
    fn sys_suspend_power_state(&self) -> PsciCompositePowerState<Self::PlatformPowerState> {
        unimplemented!("SYSTEM_SUSPEND is not implemented for the platform")
    }
}
