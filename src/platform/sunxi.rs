// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! PSCI power management for Allwinner SoCs, with the ARISC core running SCPI firmware as the
//! power controller.

pub mod a64;
pub mod h6;

use super::Platform;
use crate::{
    aarch64::{dsb_sy, isb, wfi},
    gicv2::InterruptController,
    mmio::Mmio,
    scpi::{ScpPowerControl, ScpiPowerState, ScpiSystemState},
    services::psci::{
        MAX_POWER_LEVEL, PlatformPowerStateInterface, PowerLevel, PowerStateRequest,
        PowerStateRequestType, PowerStateType, PsciCompositePowerState, PsciPlatformInterface,
        PsciPlatformOptionalFeatures,
    },
};
#[cfg(target_arch = "aarch64")]
use crate::{
    delay::GenericTimerDelay,
    gicv2::GicV2,
    mmio::DeviceMmio,
    msgbox::{MessageBox, TicketTransactionLock},
    scpi::Scpi,
};
use arm_psci::{ErrorCode, HwState, Mpidr};
use arm_sysregs::{MpidrEl1, ScrEl3, read_mpidr_el1, read_scr_el3, write_scr_el3};
use core::marker::PhantomData;
use log::{debug, error, info};

/// The deepest retention state.
pub const PLAT_MAX_RET_STATE: u8 = 1;
/// The deepest power down state.
pub const PLAT_MAX_OFF_STATE: u8 = 2;

/// Bit of the R_CPUCFG control register which releases the SCP from reset.
const R_CPUCFG_SCP_RESET_RELEASE: u32 = 1 << 0;

/// The local power state of a power domain.
///
/// States are ranked by depth: 0 is running, up to [`PLAT_MAX_RET_STATE`] is retention, and up to
/// [`PLAT_MAX_OFF_STATE`] is off.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct SunxiPowerState(u8);

impl SunxiPowerState {
    /// The retention state.
    pub const RETENTION: Self = Self::new(PLAT_MAX_RET_STATE);

    /// Creates a power state with the given rank.
    ///
    /// # Panics
    ///
    /// Panics if `rank` is deeper than [`PLAT_MAX_OFF_STATE`].
    pub const fn new(rank: u8) -> Self {
        assert!(rank <= PLAT_MAX_OFF_STATE, "Power state rank out of range");
        Self(rank)
    }

    /// Returns whether the power domain loses its state.
    fn is_off(self) -> bool {
        self.power_state_type() == PowerStateType::PowerDown
    }

    fn scpi_state(self) -> ScpiPowerState {
        match self.power_state_type() {
            PowerStateType::Run => ScpiPowerState::On,
            PowerStateType::StandbyOrRetention => ScpiPowerState::Retention,
            PowerStateType::PowerDown => ScpiPowerState::Off,
        }
    }
}

impl From<SunxiPowerState> for usize {
    fn from(value: SunxiPowerState) -> Self {
        value.0.into()
    }
}

impl PlatformPowerStateInterface for SunxiPowerState {
    const OFF: Self = Self::new(PLAT_MAX_OFF_STATE);
    const RUN: Self = Self::new(0);

    fn power_state_type(&self) -> PowerStateType {
        match self.0 {
            0 => PowerStateType::Run,
            1..=PLAT_MAX_RET_STATE => PowerStateType::StandbyOrRetention,
            _ => PowerStateType::PowerDown,
        }
    }
}

type CompositeState = PsciCompositePowerState<SunxiPowerState>;

/// Runs `wait` with IRQs routed to EL3, so that an interrupt wakes the core even when it is masked
/// at lower ELs. The previous routing is restored afterwards.
fn with_irq_routed_to_el3(wait: impl FnOnce()) {
    let scr = read_scr_el3();
    write_scr_el3(scr | ScrEl3::IRQ);
    isb();
    wait();
    write_scr_el3(scr);
}

/// The PSCI platform operations of a sunxi SoC.
pub struct SunxiPsciPlatformImpl<P: Platform, S: ScpPowerControl, G: InterruptController> {
    scp: S,
    gic: G,
    _platform: PhantomData<P>,
}

impl<P: Platform, S: ScpPowerControl, G: InterruptController> SunxiPsciPlatformImpl<P, S, G> {
    /// Points the reset vector of every core at `secure_entrypoint`, starts the SCP firmware if
    /// there is one, and returns the PSCI platform operations.
    pub fn setup(mmio: &impl Mmio, scp: S, gic: G, secure_entrypoint: u64) -> Self {
        for core in 0..P::CORE_COUNT {
            mmio.write32(P::rvbar_lo(core), secure_entrypoint as u32);
            mmio.write32(P::rvbar_hi(core), (secure_entrypoint >> 32) as u32);
        }

        // Check for valid SCP firmware, and release the SCP from reset if it is there.
        if mmio.read32(P::SCP_PROBE_ADDRESS) != 0 {
            info!("PSCI: Releasing SCP from reset");
            mmio.set_bits32(P::R_CPUCFG_BASE, R_CPUCFG_SCP_RESET_RELEASE);

            match scp.wait_ready() {
                Ok(()) => info!("PSCI: SCP firmware is ready"),
                Err(e) => error!("PSCI: SCP firmware did not start: {e:?}"),
            }
        } else {
            error!("PSCI: No SCP firmware found");
        }

        Self {
            scp,
            gic,
            _platform: PhantomData,
        }
    }

    /// Turns off the calling CPU, and whichever of its ancestors `target_state` says.
    fn cpu_power_down(&self, target_state: &CompositeState) {
        if target_state.cpu_level_state().is_off() {
            self.gic.cpu_interface_disable();
        }

        let mpidr = read_mpidr_el1();
        debug!(
            "PSCI: powering down core {} to {:?}",
            P::core_position(mpidr),
            target_state.states
        );
        self.scp.set_css_power_state(
            mpidr,
            target_state.level_state(PowerLevel::Cpu).scpi_state(),
            target_state.level_state(PowerLevel::Cluster).scpi_state(),
            target_state.level_state(PowerLevel::System).scpi_state(),
        );
    }

    /// Restores the interrupt controller state lost by the power domains in `previous_state`.
    fn cpu_power_up_finish(&self, previous_state: &CompositeState) {
        if previous_state.level_state(PowerLevel::System).is_off() {
            self.gic.distributor_init();
        }

        if previous_state.cpu_level_state().is_off() {
            self.gic.pcpu_distributor_init();
            self.gic.cpu_interface_enable();
        }
    }

    fn system_power_state(&self, state: ScpiSystemState) -> ! {
        self.gic.cpu_interface_disable();

        if let Err(e) = self.scp.sys_power_state(state) {
            error!("PSCI: SCPI {state:?} failed: {e:?}");
        }

        P::power_down_wfi()
    }
}

impl<P: Platform, S: ScpPowerControl, G: InterruptController> PsciPlatformInterface
    for SunxiPsciPlatformImpl<P, S, G>
{
    const FEATURES: PsciPlatformOptionalFeatures = PsciPlatformOptionalFeatures::NODE_HW_STATE
        .union(PsciPlatformOptionalFeatures::SYSTEM_SUSPEND);

    type PlatformPowerState = SunxiPowerState;

    fn validate_power_state(&self, power_state: u32) -> Result<CompositeState, ErrorCode> {
        let request = PowerStateRequest::from(power_state);
        let level = PowerLevel::try_from(u32::from(request.power_level))
            .map_err(|_| ErrorCode::InvalidParameters)?;

        if request.state_id != 0 {
            return Err(ErrorCode::InvalidParameters);
        }

        let state = match request.state_type {
            // Retention is not supported at the system level.
            PowerStateRequestType::Standby if level == PowerLevel::System => {
                return Err(ErrorCode::InvalidParameters);
            }
            PowerStateRequestType::Standby => SunxiPowerState::RETENTION,
            PowerStateRequestType::PowerDown => SunxiPowerState::OFF,
        };

        let mut states = [SunxiPowerState::RUN; MAX_POWER_LEVEL + 1];
        states[..=level.index()].fill(state);
        Ok(CompositeState::new(states))
    }

    fn validate_ns_entrypoint(&self, entrypoint: u64) -> Result<(), ErrorCode> {
        // The non-secure entry point must be in DRAM.
        if entrypoint < P::DRAM_BASE {
            return Err(ErrorCode::InvalidAddress);
        }
        Ok(())
    }

    fn cpu_standby(&self, cpu_state: SunxiPowerState) {
        assert_eq!(
            cpu_state.power_state_type(),
            PowerStateType::StandbyOrRetention
        );

        with_irq_routed_to_el3(|| {
            dsb_sy();
            wfi();
        });
    }

    fn power_domain_suspend(&self, target_state: &CompositeState) {
        self.cpu_power_down(target_state);
    }

    fn power_domain_suspend_finish(&self, previous_state: &CompositeState) {
        self.cpu_power_up_finish(previous_state);
    }

    fn power_domain_off(&self, target_state: &CompositeState) {
        assert!(target_state.cpu_level_state().is_off());
        self.cpu_power_down(target_state);
    }

    fn power_domain_on(&self, mpidr: Mpidr) -> Result<(), ErrorCode> {
        let mpidr = MpidrEl1::from_psci_mpidr(mpidr.into());
        if !P::mpidr_is_valid(mpidr) {
            return Err(ErrorCode::InternalFailure);
        }

        debug!("PSCI: powering on core {}", P::core_position(mpidr));
        self.scp.set_css_power_state(
            mpidr,
            ScpiPowerState::On,
            ScpiPowerState::On,
            ScpiPowerState::On,
        );
        Ok(())
    }

    fn power_domain_on_finish(&self, previous_state: &CompositeState) {
        self.cpu_power_up_finish(previous_state);
    }

    fn system_off(&self) -> ! {
        self.system_power_state(ScpiSystemState::Shutdown)
    }

    fn system_reset(&self) -> ! {
        self.system_power_state(ScpiSystemState::Reset)
    }

    fn node_hw_state(&self, mpidr: Mpidr, power_level: u32) -> Result<HwState, ErrorCode> {
        let level = PowerLevel::try_from(power_level).map_err(|_| ErrorCode::InvalidParameters)?;
        if level == PowerLevel::System {
            // The system level is always on while any core is running.
            return Ok(HwState::On);
        }

        let mpidr = MpidrEl1::from_psci_mpidr(mpidr.into());
        let css_state = self.scp.get_css_power_state(mpidr).map_err(|e| {
            debug!("PSCI: SCPI power state query failed: {e:?}");
            ErrorCode::NotSupported
        })?;

        let hw_state = if level == PowerLevel::Cluster {
            match ScpiPowerState::try_from(css_state.cluster) {
                Ok(ScpiPowerState::On) => HwState::On,
                Ok(ScpiPowerState::Retention) => HwState::Standby,
                _ => HwState::Off,
            }
        } else {
            // The mask only has room for eight CPUs, any others are reported as off.
            let cpu_bit = 1_u8.checked_shl(mpidr.aff0().into()).unwrap_or(0);
            if css_state.cpu_mask & cpu_bit != 0 {
                HwState::On
            } else {
                HwState::Off
            }
        };
        Ok(hw_state)
    }

    fn sys_suspend_power_state(&self) -> CompositeState {
        CompositeState::OFF
    }
}

/// The PSCI platform operations using the real hardware.
#[cfg(target_arch = "aarch64")]
pub type DeviceSunxiPsciPlatform<P> = SunxiPsciPlatformImpl<
    P,
    Scpi<DeviceMmio, GenericTimerDelay, TicketTransactionLock>,
    GicV2<DeviceMmio>,
>;

/// Sets up PSCI on the real hardware of platform `P`, see [`SunxiPsciPlatformImpl::setup`].
///
/// # Safety
///
/// This must only be called once, and the device registers and SRAM A2 of the SoC must be
/// identity mapped as device memory.
#[cfg(target_arch = "aarch64")]
pub unsafe fn psci_platform<P: Platform>(secure_entrypoint: u64) -> DeviceSunxiPsciPlatform<P> {
    // SAFETY: Our caller promised that the SoC's devices and SRAM A2 are mapped, and all addresses
    // used with these come from the platform description.
    let (mmio, msgbox_mmio, scpi_mmio, gic_mmio) = unsafe {
        (
            DeviceMmio::new(),
            DeviceMmio::new(),
            DeviceMmio::new(),
            DeviceMmio::new(),
        )
    };
    let msgbox = MessageBox::new(
        msgbox_mmio,
        GenericTimerDelay,
        TicketTransactionLock::new(),
        P::MSGBOX_BASE,
    );
    let scpi = Scpi::new(scpi_mmio, msgbox, P::SCP_SHARED_MEM_BASE);
    let gic = GicV2::new(gic_mmio, P::GICD_BASE, P::GICC_BASE);

    SunxiPsciPlatformImpl::setup(&mmio, scpi, gic, secure_entrypoint)
}

/// Starts the console and sets up PSCI for the SoC chosen with `cfg(platform = ...)`.
///
/// # Safety
///
/// Same as [`psci_platform`].
#[cfg(all(
    target_arch = "aarch64",
    any(platform = "sun50i_a64", platform = "sun50i_h6")
))]
pub unsafe fn init(secure_entrypoint: u64) -> DeviceSunxiPsciPlatform<super::PlatformImpl> {
    super::PlatformImpl::init_logger();
    // SAFETY: Our caller upholds the requirements of `psci_platform`.
    unsafe { psci_platform::<super::PlatformImpl>(secure_entrypoint) }
}
