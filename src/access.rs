//! Register access layer and hardware state reader.
//!
//! Some PM8921 revisions can lock up if a register write lands while the charger is dropping
//! into its 32 kHz low-power mode. With `lpm_workaround` set, every guarded access runs inside a
//! critical section that forces the 19.2 MHz clock on first and hands clock selection back to the
//! hardware afterwards.

use embedded_hal::delay::DelayNs;

use crate::bus::RegisterBus;
use crate::data_types::{FsmState, Irq};
use crate::error::Error;
use crate::registers::{addr, irq_block_and_bit, test_cmd, ChgCntrlBits, RegulationLoops};

/// Settling time around the clock override, in µs.
const LPM_SETTLE_US: u32 = 200;
const KICKSTART_HOLD_US: u32 = 183;
const KICKSTART_RELEASE_US: u32 = 32;

/// Owns the register transport and the delay provider.
pub struct RegisterAccess<B, D> {
    bus: B,
    delay: D,
    lpm_workaround: bool,
}

impl<B, D> RegisterAccess<B, D> {
    pub fn new(bus: B, delay: D, lpm_workaround: bool) -> Self {
        Self {
            bus,
            delay,
            lpm_workaround,
        }
    }

    /// Whether writes are wrapped in the low-power-mode lockout sequence.
    pub fn lpm_workaround(&self) -> bool {
        self.lpm_workaround
    }

    /// Release the bus and delay provider.
    pub fn free(self) -> (B, D) {
        (self.bus, self.delay)
    }
}

impl<B, D> RegisterAccess<B, D>
where
    B: RegisterBus,
    D: DelayNs,
{
    /// Read a single register.
    pub fn read(&mut self, reg: u16) -> Result<u8, Error<B::Error>> {
        self.bus.read_byte(reg).map_err(|e| {
            error!("register read failed: addr={:#x}", reg);
            Error::Bus(e)
        })
    }

    /// Write a single register without the lockout sequence.
    pub fn write_raw(&mut self, reg: u16, value: u8) -> Result<(), Error<B::Error>> {
        self.bus.write_byte(reg, value).map_err(|e| {
            error!("register write failed: addr={:#x}", reg);
            Error::Bus(e)
        })
    }

    /// Write a single register, guarded by the lockout sequence when enabled.
    pub fn write(&mut self, reg: u16, value: u8) -> Result<(), Error<B::Error>> {
        self.lockout(|bus, _| bus.write_byte(reg, value)).inspect_err(|_| {
            error!("guarded write failed: addr={:#x}", reg);
        })
    }

    /// Update masked bits in a register (read-modify-write).
    pub fn masked_write(&mut self, reg: u16, mask: u8, value: u8) -> Result<(), Error<B::Error>> {
        let cur = self.read(reg)?;
        let new = (cur & !mask) | (value & mask);
        self.write(reg, new)
    }

    pub fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }

    pub fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    /// Allow or forbid the charger's low-power mode.
    pub fn set_lpm(&mut self, enable: bool) -> Result<(), Error<B::Error>> {
        set_lpm(&mut self.bus, enable).map_err(Error::Bus)
    }

    /// Kick the 19.2 MHz oscillator with low-power mode held off. LPM is re-enabled even if the
    /// kick sequence fails.
    pub fn apply_kickstart(&mut self) -> Result<(), Error<B::Error>> {
        let bus = &mut self.bus;
        let delay = &mut self.delay;
        critical_section::with(|_| {
            set_lpm(bus, false)?;
            let kicked = kick_19p2mhz(bus, delay);
            let restored = set_lpm(bus, true);
            kicked.and(restored)
        })
        .map_err(|e| {
            error!("19.2 MHz kickstart failed");
            Error::Bus(e)
        })
    }

    /// Kick the oscillator and leave the 19.2 MHz clock forced on.
    pub fn force_fast_clock(&mut self) -> Result<(), Error<B::Error>> {
        let bus = &mut self.bus;
        let delay = &mut self.delay;
        critical_section::with(|_| {
            kick_19p2mhz(bus, delay)?;
            bus.write_byte(addr::CHG_TEST, test_cmd::LPM_NO_CLOCKS)?;
            bus.write_byte(addr::CHG_TEST, test_cmd::LPM_FORCE_19P2MHZ)
        })
        .map_err(Error::Bus)
    }

    /// Return clock selection to the hardware.
    pub fn set_hw_clock_switching(&mut self) -> Result<(), Error<B::Error>> {
        self.write_raw(addr::CHG_TEST, test_cmd::LPM_NO_CLOCKS)?;
        self.write_raw(addr::CHG_TEST, test_cmd::LPM_HW_CLOCK)
    }

    /// Capture and read the charger FSM state (5 bits spread over banks 7 and 4).
    pub fn fsm_state(&mut self) -> Result<FsmState, Error<B::Error>> {
        let code = self.lockout(|bus, _| {
            bus.write_byte(addr::CHG_TEST, test_cmd::CAPTURE_FSM_STATE)?;
            bus.write_byte(addr::CHG_TEST, test_cmd::READ_BANK_7)?;
            let low = bus.read_byte(addr::CHG_TEST)? & 0x0F;
            bus.write_byte(addr::CHG_TEST, test_cmd::READ_BANK_4)?;
            let high = bus.read_byte(addr::CHG_TEST)? & 0x01;
            Ok(low | (high << 4))
        })?;
        Ok(FsmState::from(code))
    }

    /// Regulation loops currently limiting the charger.
    pub fn regulation_loops(&mut self) -> Result<RegulationLoops, Error<B::Error>> {
        let raw = self.lockout(|bus, _| {
            bus.write_byte(addr::CHG_TEST, test_cmd::READ_BANK_6)?;
            bus.read_byte(addr::CHG_TEST)
        })?;
        Ok(RegulationLoops::from_bits_truncate(raw & 0x0F))
    }

    /// Real-time (level) status of a charger interrupt line.
    pub fn rt_status(&mut self, irq: Irq) -> Result<bool, Error<B::Error>> {
        let (block, bit) = irq_block_and_bit(irq.index());
        let bus = &mut self.bus;
        let status = critical_section::with(|_| {
            bus.write_byte(addr::IRQ_BLOCK_SEL, block)?;
            bus.read_byte(addr::IRQ_RT_STATUS)
        })
        .map_err(Error::Bus)?;
        Ok(status & (1 << bit) != 0)
    }

    fn lockout<T>(
        &mut self,
        f: impl FnOnce(&mut B, &mut D) -> Result<T, B::Error>,
    ) -> Result<T, Error<B::Error>> {
        let bus = &mut self.bus;
        let delay = &mut self.delay;
        if !self.lpm_workaround {
            return f(bus, delay).map_err(Error::Bus);
        }
        critical_section::with(|_| {
            delay.delay_us(LPM_SETTLE_US);
            bus.write_byte(addr::CHG_TEST, test_cmd::LPM_NO_CLOCKS)?;
            bus.write_byte(addr::CHG_TEST, test_cmd::LPM_FORCE_19P2MHZ)?;
            let out = f(bus, delay)?;
            bus.write_byte(addr::CHG_TEST, test_cmd::LPM_NO_CLOCKS)?;
            bus.write_byte(addr::CHG_TEST, test_cmd::LPM_HW_CLOCK)?;
            delay.delay_us(LPM_SETTLE_US);
            Ok(out)
        })
        .map_err(Error::Bus)
    }
}

fn set_lpm<B: RegisterBus>(bus: &mut B, enable: bool) -> Result<(), B::Error> {
    let mut reg = ChgCntrlBits::from_bits_retain(bus.read_byte(addr::CHG_CNTRL)?);
    reg.set(ChgCntrlBits::LPM_ENABLE, enable);
    bus.write_byte(addr::CHG_CNTRL, reg.bits())
}

fn kick_19p2mhz<B: RegisterBus, D: DelayNs>(bus: &mut B, delay: &mut D) -> Result<(), B::Error> {
    bus.write_byte(addr::CHG_TEST, test_cmd::LPM_NO_CLOCKS)?;
    bus.write_byte(addr::CHG_TEST, test_cmd::LPM_FORCE_19P2MHZ)?;
    bus.write_byte(addr::CHG_TEST, test_cmd::LPM_NO_CLOCKS)?;
    bus.write_byte(addr::CHG_TEST, test_cmd::LPM_KICK_19P2MHZ)?;
    delay.delay_us(KICKSTART_HOLD_US);
    bus.write_byte(addr::CHG_TEST, test_cmd::LPM_NO_CLOCKS)?;
    bus.write_byte(addr::CHG_TEST, test_cmd::LPM_HW_CLOCK)?;
    delay.delay_us(KICKSTART_RELEASE_US);
    Ok(())
}
