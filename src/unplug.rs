//! Unplug detection, adaptive input current limiting and reverse-boost mitigation.
//!
//! The unplug worker polls every [`UNPLUG_CHECK_WAIT_PERIOD_MS`] while a source is attached
//! ([`UNPLUG_CHECK_RAMP_MS`] while AICL is stepping). AICL walks the USB input limit up one
//! table step per poll until the input-voltage loop engages, then backs off one step and pins
//! the result as the adapter's capability.

use embedded_hal::delay::DelayNs;

use crate::bus::RegisterBus;
use crate::charger::{Charger, UNPLUG_CHECK_RAMP_MS, UNPLUG_CHECK_WAIT_PERIOD_MS};
use crate::data_types::{ActivePath, ChargerEvent, GpioPin, Irq, OvpPath, PonTime, WakeLock};
use crate::error::Error;
use crate::platform::Platform;
use crate::registers::{
    decrease_usb_ma_index, find_usb_ma_index, increase_usb_ma_index, PblAccess1Bits, RegulationLoops,
    OVP_DEBOUNCE_DEFAULT, USB_MA_TABLE,
};
use crate::scheduler::Work;
use crate::votes::{BatteryDisableReasons, SourceDisableReasons};

/// Window after an AICL step-up during which a collapse is attributed to that step.
const VIN_MIN_DETECT_DURATION_MS: u64 = 1500;
/// Input currents at or below this mean USB is unenumerated or suspended.
const USB_UNENUMERATED_MA: u16 = 100;
const AICL_HOLD_MS: u32 = 350;
const REVERSE_BOOST_HOLD_MS: u32 = 250;
const REVERSE_BOOST_VIN_MIN_STEP_MV: u16 = 200;
const OVP_FET_OFF_MS: u32 = 20;
const OVP_DEBOUNCE_SETTLE_US: u32 = 10;
const OVP_FET_ATTEMPTS: usize = 5;
const CONSECUTIVE_TRIAL_COUNT_MAX: u8 = 20;
const SLEEP_SLICE_MS: u32 = 10;

impl<'a, B, D, P> Charger<'a, B, D, P>
where
    B: RegisterBus,
    D: DelayNs,
    P: Platform,
{
    pub(crate) fn unplug_check_worker(&mut self) -> Result<(), Error<B::Error>> {
        if self.state.reverse_boost_check_disabled {
            return Ok(());
        }

        let now = self.now();
        if self.state.usb_aicl_max_ma != 0 && self.state.vin_min_detected {
            self.state.aicl_window_ms += now.saturating_sub(self.state.aicl_last_ms);
            self.state.aicl_last_ms = now;
            if self.state.aicl_window_ms >= VIN_MIN_DETECT_DURATION_MS {
                debug!("aicl detection window closed after {} ms", self.state.aicl_window_ms);
                self.state.vin_min_detected = false;
                self.state.aicl_window_ms = 0;
            }
        }

        let paths = self.regs.active_paths()?;
        let mut usb_ma = 0;
        if paths.contains(PblAccess1Bits::USB_ACTIVE) {
            self.state.active_path = ActivePath::Usb;
            usb_ma = self.regs.usb_current_ma()?;
            if usb_ma <= USB_UNENUMERATED_MA {
                debug!("usb unenumerated or suspended ({} mA)", usb_ma);
                self.schedule(Work::UnplugCheck, UNPLUG_CHECK_WAIT_PERIOD_MS);
                return Ok(());
            }
        } else if paths.contains(PblAccess1Bits::DC_ACTIVE) {
            self.state.active_path = ActivePath::Dc;
            if !self.config.dc_unplug_check {
                return Ok(());
            }
            if self.wireless_pad_present() {
                self.schedule(Work::UnplugCheck, UNPLUG_CHECK_WAIT_PERIOD_MS);
                return Ok(());
            }
        } else {
            self.state.active_path = ActivePath::None;
            return self.handle_no_active_path();
        }

        self.state.final_kickstart = true;
        let usb_active = self.state.active_path == ActivePath::Usb;
        let mut ramp = false;

        if usb_active && self.state.usb_target_ma > 0 {
            let loops = self.regs.regulation_loops()?;
            if loops.contains(RegulationLoops::INPUT_VOLTAGE)
                && usb_ma > self.config.usb_wall_threshold_ma()
                && self.aicl_allowed()
                && self.state.vin_min_detected
            {
                usb_ma = USB_MA_TABLE[decrease_usb_ma_index(find_usb_ma_index(usb_ma))];
                self.regs.draw_usb_current(usb_ma)?;
                info!("aicl decrease: {} mA (target {} mA)", usb_ma, self.state.usb_target_ma);
                ramp = true;
                self.state.aicl_vin_loop_active = true;
                self.state.usb_aicl_max_ma = usb_ma;
                self.state.usb_target_ma = usb_ma;
                self.vote_source(SourceDisableReasons::AICL, true)?;
                self.sleep_cancellable(AICL_HOLD_MS);
                self.vote_source(SourceDisableReasons::AICL, false)?;
            }
        }

        let loops = self.regs.regulation_loops()?;
        if loops.contains(RegulationLoops::INPUT_VOLTAGE) {
            if let Some(ibat_ua) = self.platform.battery_current_ua() {
                if ibat_ua > 0 {
                    debug!("reverse boost: ibat {} uA", ibat_ua);
                    self.attempt_reverse_boost_fix()?;
                    self.state.rb_trial_count += 1;
                    if self.state.rb_trial_count > CONSECUTIVE_TRIAL_COUNT_MAX {
                        warn!("too many reverse boost trials");
                        self.state.rb_trial_count = 0;
                    }
                }
            }
        }

        let chg_gone = self.regs.rt_status(Irq::ChgGone)?;
        if chg_gone && self.active_source_valid()? {
            self.state.ovp_trial_count += 1;
            if self.state.ovp_trial_count > CONSECUTIVE_TRIAL_COUNT_MAX {
                warn!("too many ovp fet trials");
                self.state.ovp_trial_count = 0;
            }
            self.unplug_ovp_fet_open()?;
        }

        if usb_active
            && !loops.contains(RegulationLoops::INPUT_VOLTAGE)
            && self.state.usb_target_ma > 0
            && self.aicl_allowed()
            && !self.state.vin_min_detected
        {
            if usb_ma < self.state.usb_target_ma {
                usb_ma = USB_MA_TABLE[increase_usb_ma_index(find_usb_ma_index(usb_ma))];
                self.regs.draw_usb_current(usb_ma)?;
                self.state.usb_aicl_max_ma = usb_ma;
                self.state.vin_min_detected = true;
                self.state.aicl_window_ms = 0;
                self.state.aicl_last_ms = self.now();
                info!("aicl increase: {} mA (target {} mA)", usb_ma, self.state.usb_target_ma);
                ramp = true;
            } else {
                self.state.usb_target_ma = usb_ma;
            }
        }

        self.platform.wake_lock(WakeLock::UnplugCheck, ramp);
        let period = if ramp { UNPLUG_CHECK_RAMP_MS } else { UNPLUG_CHECK_WAIT_PERIOD_MS };
        self.schedule(Work::UnplugCheck, period);
        Ok(())
    }

    fn handle_no_active_path(&mut self) -> Result<(), Error<B::Error>> {
        let usb = self.regs.rt_status(Irq::UsbinValid)?;
        let dc = self.regs.rt_status(Irq::DcinValid)?;
        if usb || dc {
            return Ok(());
        }
        info!(
            "sources removed, unplug check stops (rb trials {}, ovp trials {})",
            self.state.rb_trial_count, self.state.ovp_trial_count
        );
        self.state.rb_trial_count = 0;
        self.state.ovp_trial_count = 0;
        self.platform.wake_lock(WakeLock::UnplugCheck, false);
        if self.regs.lpm_workaround() {
            self.regs.apply_kickstart()?;
            if self.state.final_kickstart {
                self.state.final_kickstart = false;
                self.schedule(Work::UnplugCheck, UNPLUG_CHECK_WAIT_PERIOD_MS);
            }
        }
        Ok(())
    }

    /// AICL only runs while nobody has disabled charging or the input.
    fn aicl_allowed(&self) -> bool {
        !self.batt_votes.contains(BatteryDisableReasons::USER1) && !self.pwrsrc_votes.is_disabled()
    }

    /// Wireless transmitter pin low means the charging pad is still there.
    fn wireless_pad_present(&mut self) -> bool {
        self.platform.get_value(GpioPin::WirelessTx) == Some(false)
    }

    fn active_source_valid(&mut self) -> Result<bool, Error<B::Error>> {
        match self.state.active_path {
            ActivePath::Usb => self.regs.rt_status(Irq::UsbinValid),
            ActivePath::Dc => self.regs.rt_status(Irq::DcinValid),
            ActivePath::None => Ok(false),
        }
    }

    /// Briefly raise VIN_MIN so the buck stops boosting the battery back into the input.
    fn attempt_reverse_boost_fix(&mut self) -> Result<(), Error<B::Error>> {
        let vin_min = self.state.vin_min_mv;
        self.state.reverse_boost_fix_ongoing = true;
        let raised = self
            .regs
            .set_min_pon_time(PonTime::Ns100)
            .and_then(|_| self.regs.set_min_input_voltage(vin_min + REVERSE_BOOST_VIN_MIN_STEP_MV));
        if raised.is_ok() {
            self.sleep_cancellable(REVERSE_BOOST_HOLD_MS);
        }
        let restored = self
            .regs
            .set_min_input_voltage(vin_min)
            .and_then(|_| self.regs.set_min_pon_time(PonTime::Ns25));
        self.state.reverse_boost_fix_ongoing = false;
        raised.and(restored)
    }

    /// Bounce the OVP FET of the active path while the charger reports the source gone.
    fn unplug_ovp_fet_open(&mut self) -> Result<(), Error<B::Error>> {
        let path = if self.regs.rt_status(Irq::UsbinValid)? && self.state.active_path == ActivePath::Usb {
            OvpPath::Usb
        } else if self.regs.rt_status(Irq::DcinValid)? && self.state.active_path == ActivePath::Dc {
            if self.wireless_pad_present() {
                debug!("wireless pad present, ovp fet left alone");
                return Ok(());
            }
            OvpPath::Dc
        } else {
            return Ok(());
        };

        let mut bounces = 0;
        let mut fet_off = false;
        let mut result = Ok(());
        while bounces < self.config.open_ovp_counter {
            bounces += 1;
            match self.bounce_ovp_fet_once(path, &mut fet_off) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        debug!("ovp fet bounced {} times", bounces);
        if fet_off {
            warn!("ovp fet left open, closing");
            result = result.and(self.set_ovp_fet_with_retry(path, false));
        }
        result.and(self.regs.set_ovp_debounce(path, OVP_DEBOUNCE_DEFAULT))
    }

    /// One open/close cycle. Returns whether another cycle may follow.
    fn bounce_ovp_fet_once(&mut self, path: OvpPath, fet_off: &mut bool) -> Result<bool, Error<B::Error>> {
        self.regs.set_ovp_debounce(path, 0)?;
        self.regs.delay_us(OVP_DEBOUNCE_SETTLE_US);
        if !(self.regs.rt_status(Irq::ChgGone)? && self.active_source_valid()?) {
            return Ok(false);
        }
        *fet_off = true;
        self.set_ovp_fet_with_retry(path, true)?;
        self.sleep_cancellable(OVP_FET_OFF_MS);
        self.set_ovp_fet_with_retry(path, false)?;
        *fet_off = false;
        Ok(!self.cancel.is_cancelled())
    }

    fn set_ovp_fet_with_retry(&mut self, path: OvpPath, off: bool) -> Result<(), Error<B::Error>> {
        let mut last = Ok(());
        for _ in 0..OVP_FET_ATTEMPTS {
            last = self.regs.set_ovp_fet_off(path, off);
            if last.is_ok() {
                break;
            }
        }
        last
    }

    /// Sleep in short slices, returning early once the cancel token fires.
    fn sleep_cancellable(&mut self, ms: u32) {
        let mut left = ms;
        while left > 0 && !self.cancel.is_cancelled() {
            let slice = left.min(SLEEP_SLICE_MS);
            self.regs.delay_ms(slice);
            left -= slice;
        }
    }

    /// Input collapsed right after AICL stepped up: back off one step and restart from the wall
    /// threshold.
    pub(crate) fn vin_collapse_check_worker(&mut self) -> Result<(), Error<B::Error>> {
        let wall = self.config.usb_wall_threshold_ma();
        if self.regs.rt_status(Irq::UsbinValid)? && self.state.usb_target_ma >= wall {
            let target = USB_MA_TABLE[decrease_usb_ma_index(find_usb_ma_index(self.state.usb_target_ma))];
            self.state.usb_target_ma = target;
            self.regs.draw_usb_current(wall)?;
            info!("input collapse: restart at {} mA, target {} mA", wall, target);
            let now = self.now();
            self.scheduler.schedule_if_idle(Work::UnplugCheck, now, UNPLUG_CHECK_RAMP_MS);
        } else {
            self.platform.charger_event(ChargerEvent::CableChange);
        }
        Ok(())
    }
}
