//! Diagnostics text for the charger and the fuel gauge.
//!
//! Both reports are plain `KEY: value;` lines written into a caller-provided buffer. Output that
//! does not fit is dropped; the returned length covers what was written.

use core::fmt::{self, Write};

use embedded_hal::delay::DelayNs;

use crate::bus::RegisterBus;
use crate::charger::Charger;
use crate::data_types::{AdcChannel, GpioPin, Irq};
use crate::error::Error;
use crate::platform::Platform;
use crate::registers::addr;

/// Interrupt lines reported by [`Charger::write_charger_attributes`], in output order.
const REPORTED_IRQS: [Irq; 30] = [
    Irq::Atcdone,
    Irq::Atcfail,
    Irq::Batfet,
    Irq::BatttempCold,
    Irq::BatttempHot,
    Irq::BattInserted,
    Irq::BattRemoved,
    Irq::BatTempOk,
    Irq::Chgdone,
    Irq::Chgfail,
    Irq::Chghot,
    Irq::Chgstate,
    Irq::Chgwdog,
    Irq::ChgGone,
    Irq::CoarseDetLow,
    Irq::DcinOv,
    Irq::DcinUv,
    Irq::DcinValid,
    Irq::UsbinOv,
    Irq::UsbinUv,
    Irq::UsbinValid,
    Irq::Fastchg,
    Irq::LoopChange,
    Irq::Trklchg,
    Irq::Vbatdet,
    Irq::VbatdetLow,
    Irq::VbatOv,
    Irq::Vcp,
    Irq::VddLoop,
    Irq::VregOv,
];

/// Registers dumped ahead of the compensation delta.
const DUMP_HEAD: [(&str, u16); 11] = [
    ("CHG_CNTRL", addr::CHG_CNTRL),
    ("CHG_CNTRL_2", addr::CHG_CNTRL_2),
    ("CHG_CNTRL_3", addr::CHG_CNTRL_3),
    ("PBL_ACCESS1", addr::PBL_ACCESS1),
    ("PBL_ACCESS2", addr::PBL_ACCESS2),
    ("SYS_CONFIG_1", addr::SYS_CONFIG_1),
    ("SYS_CONFIG_2", addr::SYS_CONFIG_2),
    ("CHG_IBAT_MAX", addr::CHG_IBAT_MAX),
    ("CHG_IBAT_SAFE", addr::CHG_IBAT_SAFE),
    ("CHG_VDD_MAX", addr::CHG_VDD_MAX),
    ("CHG_VDD_SAFE", addr::CHG_VDD_SAFE),
];

const DUMP_TAIL: [(&str, u16); 12] = [
    ("CHG_VBAT_DET", addr::CHG_VBAT_DET),
    ("CHG_VIN_MIN", addr::CHG_VIN_MIN),
    ("CHG_VTRICKLE", addr::CHG_VTRICKLE),
    ("CHG_ITRICKLE", addr::CHG_ITRICKLE),
    ("CHG_ITERM", addr::CHG_ITERM),
    ("CHG_TCHG_MAX", addr::CHG_TCHG_MAX),
    ("CHG_TWDOG", addr::CHG_TWDOG),
    ("CHG_TEMP_THRESH", addr::CHG_TEMP_THRESH),
    ("CHG_COMP_OVR", addr::COMPARATOR_OVERRIDE),
    ("CHG_BUCK_CTRL_TEST1", addr::CHG_BUCK_CTRL_TEST1),
    ("CHG_BUCK_CTRL_TEST2", addr::CHG_BUCK_CTRL_TEST2),
    ("CHG_BUCK_CTRL_TEST3", addr::CHG_BUCK_CTRL_TEST3),
];

/// `fmt::Write` over a byte buffer that silently truncates.
pub struct SliceWriter<'b> {
    buf: &'b mut [u8],
    len: usize,
}

impl<'b> SliceWriter<'b> {
    pub fn new(buf: &'b mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn line(&mut self, args: fmt::Arguments<'_>) {
        let _ = self.write_fmt(args);
    }
}

impl Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.buf.len() - self.len;
        let n = s.len().min(room);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}

impl<'a, B, D, P> Charger<'a, B, D, P>
where
    B: RegisterBus,
    D: DelayNs,
    P: Platform,
{
    /// Charger state, interrupt levels, input rails and a register dump.
    pub fn write_charger_attributes(&mut self, buf: &mut [u8]) -> Result<usize, Error<B::Error>> {
        let mut w = SliceWriter::new(buf);

        let fsm = self.regs.fsm_state()?;
        w.line(format_args!("FSM: {};\n", fsm.code()));
        for irq in REPORTED_IRQS {
            let level = self.regs.rt_status(irq)?;
            w.line(format_args!("{}: {};\n", irq.name(), level as u8));
        }
        let loops = self.regs.regulation_loops()?;
        w.line(format_args!("REGULATION_LOOP: {:#04x};\n", loops.bits()));

        let usbin = self.read_adc(AdcChannel::Usbin).unwrap_or(0);
        w.line(format_args!("USBIN(uV): {};\n", usbin));
        let dcin = self.read_adc(AdcChannel::Dcin).unwrap_or(0);
        w.line(format_args!("DCIN(uV): {};\n", dcin));
        let vph = self.read_adc(AdcChannel::VphPwr).unwrap_or(0);
        w.line(format_args!("VPH_PWR(uV): {};\n", vph));
        if let Some(removed) = self.platform.get_value(GpioPin::WirelessTx) {
            w.line(format_args!("is_wlc_remove(bool): {};\n", removed as u8));
        }

        let s = &self.state;
        w.line(format_args!("AC_SAFETY_TIMEOUT(bool): {};\n", s.safety_timeout as u8));
        w.line(format_args!("AC_SAFETY_TIMEOUT2(bool): {};\n", s.safety_timeout_twice as u8));
        w.line(format_args!("mitigation_level(int): {};\n", s.thermal_mitigation_level));
        w.line(format_args!("eoc_count/by_curr(int): {}/{};\n", s.eoc_count, s.eoc_count_by_current));
        w.line(format_args!(
            "reverse_boost_disabled(bool): {};\n",
            s.reverse_boost_check_disabled as u8
        ));
        w.line(format_args!("usbin_critical_low_cnt(int): {};\n", s.usbin_critical_low_count));
        w.line(format_args!("pwrsrc_under_rating(bool): {};\n", s.source_under_rating as u8));

        for (name, reg) in DUMP_HEAD {
            let value = self.regs.read(reg)?;
            w.line(format_args!("{}: {:#x};\n", name, value));
        }
        w.line(format_args!("last_delta_batt_terminal_mv: {};\n", self.state.last_delta_mv));
        for (name, reg) in DUMP_TAIL {
            let value = self.regs.read(reg)?;
            w.line(format_args!("{}: {:#x};\n", name, value));
        }

        if let Some(ext) = self.ext.as_deref_mut() {
            ext.write_attributes(&mut w)?;
        }
        Ok(w.len())
    }

    /// Battery-side view: charge, voltages, temperature and AICL state.
    pub fn write_gauge_attributes(&mut self, buf: &mut [u8]) -> Result<usize, Error<B::Error>> {
        let mut w = SliceWriter::new(buf);

        let soc = self.platform.percent_charge().map_or(-1, i32::from);
        w.line(format_args!("SOC(%): {};\n", soc));
        w.line(format_args!("EOC(bool): {};\n", self.state.battery_full as u8));
        w.line(format_args!("OVP(bool): {};\n", self.state.ovp as u8));
        w.line(format_args!("UVP(bool): {};\n", self.state.uvp as u8));
        let vbat = self.read_adc(AdcChannel::Vbat).unwrap_or(0);
        w.line(format_args!("VBAT(uV): {};\n", vbat));
        let ibat = self.platform.battery_current_ua().unwrap_or(0);
        w.line(format_args!("IBAT(uA): {};\n", ibat));
        let id_raw = self.read_adc(AdcChannel::BattId).unwrap_or(0);
        w.line(format_args!("ID_RAW(uV): {};\n", id_raw));
        let temp = self.read_adc(AdcChannel::BattTemp).unwrap_or(0);
        w.line(format_args!("BATT_TEMP(deci-celsius): {};\n", temp));
        w.line(format_args!("is_bat_warm(bool): {};\n", self.state.is_warm() as u8));
        w.line(format_args!("is_bat_cool(bool): {};\n", self.state.is_cool() as u8));
        let present = self.regs.rt_status(Irq::BattInserted)?;
        w.line(format_args!("BATT_PRESENT(bool): {};\n", present as u8));
        let fcc = self.platform.full_charge_capacity_uah().unwrap_or(0);
        w.line(format_args!("FCC(uAh): {};\n", fcc));
        w.line(format_args!(
            "usb_target_ma/usb_aicl_max_ma(mA): {}/{};\n",
            self.state.usb_target_ma, self.state.usb_aicl_max_ma
        ));
        Ok(w.len())
    }
}
