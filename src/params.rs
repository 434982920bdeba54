//! Parameter programmer: range-checked charger setters and matching getters.
//!
//! Every setter validates its argument before touching the bus and returns
//! [`Error::OutOfRange`] without any register traffic when the value is outside hardware limits.

use embedded_hal::delay::DelayNs;

use crate::access::RegisterAccess;
use crate::bus::RegisterBus;
use crate::data_types::{Irq, OvpPath, PonTime, TempThreshold, UsbOvThreshold, UsbOvpDebounce};
use crate::error::Error;
use crate::registers::{
    addr, buck_test, code_to_iterm_ma, code_to_vdd_max_mv, code_to_vin_min_mv, comparator, find_usb_ma_index,
    ibat_max_ma_to_code, ibat_safe_ma_to_code, iterm_ma_to_code, itrkl_ma_to_code, iweak_ma_to_code,
    tchg_min_to_code, ttrkl_min_to_code, vbat_det_mv_to_code, vdd_max_mv_to_code, vdd_safe_mv_to_code,
    vin_min_mv_to_code, vtrkl_mv_to_code, vweak_mv_to_code, ChgCntrl2Bits, ChgCntrl3Bits, ChgCntrlBits,
    PblAccess1Bits, PblAccess2Bits, SysConfig2Bits, I_MASK, ITERM_MASK, ITRKL_MASK, IUSB_MASK, IUSB_MAX_INDEX,
    IUSB_SHIFT, IWEAK_MASK, OVP_DEBOUNCE_MASK, OVP_DEBOUNCE_SHIFT, OVP_TEST_BANK, TCHG_MASK, TTRKL_MASK, USB_MA_TABLE,
    USB_OVP_DISABLE_MASK, USB_OV_THRESHOLD_MASK, USB_OV_THRESHOLD_SHIFT, VDD_MAX_MAX_MV, VDD_MAX_MIN_MV, VIN_MIN_MASK, VTRKL_MASK, VWEAK_MASK, V_MASK,
    V_STEP_MV, WDOG_MASK,
};

/// Input currents at or below this suspend the USB path instead of programming IUSB.
const USB_SUSPEND_MAX_MA: u16 = 2;

impl<B, D> RegisterAccess<B, D>
where
    B: RegisterBus,
    D: DelayNs,
{
    /// Program the charge voltage. While USB is valid the value walks there in 20 mV steps so
    /// the regulator never sees a large jump with a source attached.
    pub fn set_max_voltage(&mut self, mv: u16, step_delay_us: u32) -> Result<(), Error<B::Error>> {
        let target = vdd_max_mv_to_code(mv).ok_or(Error::OutOfRange)?;
        let current = self.max_voltage()?;
        if current == mv {
            debug!("vdd_max already {} mV", mv);
            return Ok(());
        }
        if self.rt_status(Irq::UsbinValid)? {
            let steps = current.abs_diff(mv) / V_STEP_MV;
            let mut step_mv = current;
            for _ in 0..steps {
                step_mv = if mv > current { step_mv + V_STEP_MV } else { step_mv - V_STEP_MV };
                let clamped = step_mv.clamp(VDD_MAX_MIN_MV, VDD_MAX_MAX_MV);
                if let Some(code) = vdd_max_mv_to_code(clamped) {
                    self.write(addr::CHG_VDD_MAX, code)?;
                }
                if step_delay_us != 0 {
                    self.delay_us(step_delay_us);
                }
            }
        }
        info!("vdd_max {} -> {} mV", current, mv);
        self.write(addr::CHG_VDD_MAX, target)
    }

    /// Programmed charge voltage.
    pub fn max_voltage(&mut self) -> Result<u16, Error<B::Error>> {
        Ok(code_to_vdd_max_mv(self.read(addr::CHG_VDD_MAX)?))
    }

    pub fn set_safe_voltage(&mut self, mv: u16) -> Result<(), Error<B::Error>> {
        let code = vdd_safe_mv_to_code(mv).ok_or(Error::OutOfRange)?;
        self.masked_write(addr::CHG_VDD_SAFE, V_MASK, code)
    }

    /// Program the recharge comparator (VBAT_DET).
    pub fn set_recharge_voltage(&mut self, mv: u16) -> Result<(), Error<B::Error>> {
        let code = vbat_det_mv_to_code(mv).ok_or(Error::OutOfRange)?;
        self.masked_write(addr::CHG_VBAT_DET, V_MASK, code)
    }

    pub fn set_max_current(&mut self, ma: u16) -> Result<(), Error<B::Error>> {
        let code = ibat_max_ma_to_code(ma).ok_or(Error::OutOfRange)?;
        self.masked_write(addr::CHG_IBAT_MAX, I_MASK, code)
    }

    pub fn set_safe_current(&mut self, ma: u16) -> Result<(), Error<B::Error>> {
        let code = ibat_safe_ma_to_code(ma).ok_or(Error::OutOfRange)?;
        self.masked_write(addr::CHG_IBAT_SAFE, I_MASK, code)
    }

    pub fn set_termination_current(&mut self, ma: u16) -> Result<(), Error<B::Error>> {
        let code = iterm_ma_to_code(ma).ok_or(Error::OutOfRange)?;
        self.masked_write(addr::CHG_ITERM, ITERM_MASK, code)
    }

    pub fn termination_current(&mut self) -> Result<u16, Error<B::Error>> {
        Ok(code_to_iterm_ma(self.read(addr::CHG_ITERM)?))
    }

    /// Program the input voltage floor (VIN_MIN).
    pub fn set_min_input_voltage(&mut self, mv: u16) -> Result<(), Error<B::Error>> {
        let code = vin_min_mv_to_code(mv).ok_or(Error::OutOfRange)?;
        self.masked_write(addr::CHG_VIN_MIN, VIN_MIN_MASK, code)
    }

    pub fn min_input_voltage(&mut self) -> Result<u16, Error<B::Error>> {
        Ok(code_to_vin_min_mv(self.read(addr::CHG_VIN_MIN)?))
    }

    pub fn set_safety_timer(&mut self, minutes: u16) -> Result<(), Error<B::Error>> {
        let code = tchg_min_to_code(minutes).ok_or(Error::OutOfRange)?;
        self.masked_write(addr::CHG_TCHG_MAX, TCHG_MASK, code)
    }

    pub fn set_trickle_timer(&mut self, minutes: u16) -> Result<(), Error<B::Error>> {
        let code = ttrkl_min_to_code(minutes).ok_or(Error::OutOfRange)?;
        self.masked_write(addr::CHG_TTRKL_MAX, TTRKL_MASK, code)
    }

    pub fn set_trickle_voltage(&mut self, mv: u16) -> Result<(), Error<B::Error>> {
        let code = vtrkl_mv_to_code(mv).ok_or(Error::OutOfRange)?;
        self.masked_write(addr::CHG_VTRICKLE, VTRKL_MASK, code)
    }

    pub fn set_weak_voltage(&mut self, mv: u16) -> Result<(), Error<B::Error>> {
        let code = vweak_mv_to_code(mv).ok_or(Error::OutOfRange)?;
        self.masked_write(addr::CHG_VTRICKLE, VWEAK_MASK, code)
    }

    pub fn set_trickle_current(&mut self, ma: u16) -> Result<(), Error<B::Error>> {
        let code = itrkl_ma_to_code(ma).ok_or(Error::OutOfRange)?;
        self.masked_write(addr::CHG_ITRICKLE, ITRKL_MASK, code)
    }

    pub fn set_weak_current(&mut self, ma: u16) -> Result<(), Error<B::Error>> {
        let code = iweak_ma_to_code(ma).ok_or(Error::OutOfRange)?;
        self.masked_write(addr::CHG_ITRICKLE, IWEAK_MASK, code)
    }

    /// Select an entry of the USB input current table.
    pub fn set_usb_current_index(&mut self, index: u8) -> Result<(), Error<B::Error>> {
        if index > IUSB_MAX_INDEX {
            return Err(Error::OutOfRange);
        }
        self.masked_write(addr::PBL_ACCESS2, IUSB_MASK, index << IUSB_SHIFT)
    }

    pub fn usb_current_index(&mut self) -> Result<u8, Error<B::Error>> {
        Ok((self.read(addr::PBL_ACCESS2)? & IUSB_MASK) >> IUSB_SHIFT)
    }

    /// Programmed USB input current limit, in mA.
    pub fn usb_current_ma(&mut self) -> Result<u16, Error<B::Error>> {
        let index = self.usb_current_index()?;
        Ok(USB_MA_TABLE[index as usize])
    }

    /// Draw up to `ma` from USB; 1-2 mA suspends the input.
    pub fn draw_usb_current(&mut self, ma: u16) -> Result<(), Error<B::Error>> {
        if ma > 0 && ma <= USB_SUSPEND_MAX_MA {
            self.set_usb_current_index(0)?;
            return self.set_usb_suspend(true);
        }
        self.set_usb_suspend(false)?;
        self.set_usb_current_index(find_usb_ma_index(ma) as u8)
    }

    pub fn set_usb_suspend(&mut self, suspend: bool) -> Result<(), Error<B::Error>> {
        self.masked_write(
            addr::CHG_CNTRL_3,
            ChgCntrl3Bits::USB_SUSPEND.bits(),
            if suspend { ChgCntrl3Bits::USB_SUSPEND.bits() } else { 0 },
        )
    }

    /// Battery FET charging enable (CHG_EN).
    pub fn set_charging_enabled(&mut self, enable: bool) -> Result<(), Error<B::Error>> {
        self.masked_write(
            addr::CHG_CNTRL_3,
            ChgCntrl3Bits::CHG_EN.bits(),
            if enable { ChgCntrl3Bits::CHG_EN.bits() } else { 0 },
        )
    }

    /// Disconnect (or reconnect) the input power source.
    pub fn set_source_disconnected(&mut self, disconnect: bool) -> Result<(), Error<B::Error>> {
        self.masked_write(
            addr::CHG_CNTRL,
            ChgCntrlBits::CHARGE_DIS.bits(),
            if disconnect { ChgCntrlBits::CHARGE_DIS.bits() } else { 0 },
        )
    }

    /// Clear latched auto-trickle and charge failures.
    pub fn failed_clear(&mut self) -> Result<(), Error<B::Error>> {
        let atc = ChgCntrl3Bits::ATC_FAILED_CLEAR.bits();
        self.masked_write(addr::CHG_CNTRL_3, atc, atc)?;
        let chg = ChgCntrl3Bits::CHG_FAILED_CLEAR.bits();
        self.masked_write(addr::CHG_CNTRL_3, chg, chg)
    }

    pub fn disable_watchdog(&mut self) -> Result<(), Error<B::Error>> {
        self.masked_write(addr::CHG_TWDOG, WDOG_MASK, 0)
    }

    pub fn set_boot_done(&mut self) -> Result<(), Error<B::Error>> {
        let bit = SysConfig2Bits::BOOT_DONE.bits();
        self.masked_write(addr::SYS_CONFIG_2, bit, bit)
    }

    pub fn stop_enum_timer(&mut self) -> Result<(), Error<B::Error>> {
        let bit = PblAccess2Bits::ENUM_TIMER_STOP.bits();
        self.masked_write(addr::PBL_ACCESS2, bit, bit)
    }

    pub fn set_battery_temp_protection_disabled(&mut self, disable: bool) -> Result<(), Error<B::Error>> {
        let bit = ChgCntrl2Bits::BAT_TEMP_DIS.bits();
        self.masked_write(addr::CHG_CNTRL_2, bit, if disable { bit } else { 0 })
    }

    pub fn set_cold_threshold(&mut self, threshold: TempThreshold) -> Result<(), Error<B::Error>> {
        let bit = ChgCntrl2Bits::TEMP_THR_COLD.bits();
        self.masked_write(addr::CHG_CNTRL_2, bit, if threshold == TempThreshold::High { bit } else { 0 })
    }

    pub fn set_hot_threshold(&mut self, threshold: TempThreshold) -> Result<(), Error<B::Error>> {
        let bit = ChgCntrl2Bits::TEMP_THR_HOT.bits();
        self.masked_write(addr::CHG_CNTRL_2, bit, if threshold == TempThreshold::High { bit } else { 0 })
    }

    /// Keep the battery thermistor reference on (needed while awake for BTM reads).
    pub fn set_vref_therm_force_on(&mut self, on: bool) -> Result<(), Error<B::Error>> {
        let bit = ChgCntrlBits::VREF_BATT_THERM_FORCE_ON.bits();
        self.masked_write(addr::CHG_CNTRL, bit, if on { bit } else { 0 })
    }

    /// Bypass the battery-gone comparator debounce while running from the battery alone.
    pub fn bypass_bat_gone_debounce(&mut self, bypass: bool) -> Result<(), Error<B::Error>> {
        let value = if bypass {
            comparator::BAT_GONE_DEBOUNCE_BYPASS
        } else {
            comparator::BAT_GONE_DEBOUNCE_NORMAL
        };
        self.write(addr::COMPARATOR_OVERRIDE, value)
    }

    /// Override a spurious charger-hot comparator.
    pub fn clear_chg_hot_override(&mut self) -> Result<(), Error<B::Error>> {
        self.write(addr::COMPARATOR_OVERRIDE, comparator::CHG_NOT_HOT)
    }

    /// Stop the buck from limiting input current.
    pub fn disable_input_current_limit(&mut self) -> Result<(), Error<B::Error>> {
        self.write(addr::CHG_BUCK_CTRL_TEST3, buck_test::INPUT_LIMIT_DISABLE)
    }

    pub fn set_min_pon_time(&mut self, pon: PonTime) -> Result<(), Error<B::Error>> {
        let pon_bits = match pon {
            PonTime::Ns25 => buck_test::PON_TIME_25NS,
            PonTime::Ns50 => buck_test::PON_TIME_50NS,
            PonTime::Ns100 => buck_test::PON_TIME_100NS,
        };
        self.write_raw(addr::CHG_BUCK_CTRL_TEST3, buck_test::PON_TIME_BANK)?;
        let cur = self.read(addr::CHG_BUCK_CTRL_TEST3)?;
        let new = (cur & !buck_test::PON_TIME_MASK) | pon_bits | buck_test::WRITE_ENABLE;
        self.write_raw(addr::CHG_BUCK_CTRL_TEST3, new)
    }

    /// Open (`off = true`) or close the OVP FET of one input path.
    pub fn set_ovp_fet_off(&mut self, path: OvpPath, off: bool) -> Result<(), Error<B::Error>> {
        let reg = match path {
            OvpPath::Usb => addr::USB_OVP_TEST,
            OvpPath::Dc => addr::DC_OVP_TEST,
        };
        self.write(reg, OVP_TEST_BANK)?;
        let cur = self.read(reg)?;
        let new = if off { cur | 0x81 } else { (cur & 0xFE) | 0x80 };
        self.write(reg, new)
    }

    pub fn set_ovp_debounce(&mut self, path: OvpPath, value: u8) -> Result<(), Error<B::Error>> {
        let reg = match path {
            OvpPath::Usb => addr::USB_OVP_CONTROL,
            OvpPath::Dc => addr::DC_OVP_CONTROL,
        };
        self.masked_write(reg, OVP_DEBOUNCE_MASK, value)
    }

    pub fn set_usb_ov_threshold(&mut self, threshold: UsbOvThreshold) -> Result<(), Error<B::Error>> {
        let code = match threshold {
            UsbOvThreshold::Mv5500 => 0,
            UsbOvThreshold::Mv6000 => 1,
            UsbOvThreshold::Mv6500 => 2,
            UsbOvThreshold::Mv7000 => 3,
        };
        debug!("usb ovp threshold code {}", code);
        self.masked_write(addr::USB_OVP_CONTROL, USB_OV_THRESHOLD_MASK, code << USB_OV_THRESHOLD_SHIFT)
    }

    pub fn set_usb_ovp_debounce_time(&mut self, debounce: UsbOvpDebounce) -> Result<(), Error<B::Error>> {
        let code = match debounce {
            UsbOvpDebounce::Bypass => 0,
            UsbOvpDebounce::Ms20p5 => 1,
            UsbOvpDebounce::Ms40p5 => 2,
            UsbOvpDebounce::Ms80p5 => 3,
        };
        self.set_ovp_debounce(OvpPath::Usb, code << OVP_DEBOUNCE_SHIFT)
    }

    pub fn set_usb_ovp_disabled(&mut self, disable: bool) -> Result<(), Error<B::Error>> {
        self.masked_write(
            addr::USB_OVP_CONTROL,
            USB_OVP_DISABLE_MASK,
            if disable { USB_OVP_DISABLE_MASK } else { 0 },
        )
    }

    /// Input paths the charger is currently drawing from.
    pub fn active_paths(&mut self) -> Result<PblAccess1Bits, Error<B::Error>> {
        Ok(PblAccess1Bits::from_bits_truncate(self.read(addr::PBL_ACCESS1)?))
    }
}
