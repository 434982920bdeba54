//! Charger interrupt dispatcher.
//!
//! The board's interrupt glue calls [`Charger::handle_irq`] from thread context once per edge.
//! Lines that were never unmasked are ignored, so a shared interrupt controller can forward every
//! charger line without filtering.

use embedded_hal::delay::DelayNs;

use crate::bus::RegisterBus;
use crate::charger::{
    Charger, EOC_CHECK_PERIOD_MS, SAFETY_TIME_MAX_LIMIT, UNPLUG_CHECK_RAMP_MS, VIN_COLLAPSE_CHECK_MS,
};
use crate::data_types::{
    AdcChannel, ChargerEvent, ExtChargerEvent, GaugeEvent, GpioPin, Irq, ThermalZone, WakeLock,
};
use crate::error::Error;
use crate::platform::Platform;
use crate::registers::VBAT_DET_MAX_MV;
use crate::scheduler::Work;
use crate::votes::{BatteryDisableReasons, SourceDisableReasons};

/// Die temperature (m°C) below which a charger-hot indication is treated as spurious.
const CHG_HOT_SPURIOUS_MC: i64 = 80_000;

impl<'a, B, D, P> Charger<'a, B, D, P>
where
    B: RegisterBus,
    D: DelayNs,
    P: Platform,
{
    /// Handle one edge of a charger interrupt line.
    pub fn handle_irq(&mut self, irq: Irq) -> Result<(), Error<B::Error>> {
        if !self.state.enabled_irqs.contains(irq) {
            trace!("ignoring masked irq {}", irq.name());
            return Ok(());
        }
        debug!("irq {}", irq.name());
        match irq {
            Irq::UsbinValid => {
                if self.state.usb_target_ma != 0 {
                    self.schedule(Work::VinCollapseCheck, VIN_COLLAPSE_CHECK_MS);
                    Ok(())
                } else {
                    let present = self.regs.rt_status(Irq::UsbinValid)?;
                    self.handle_usb_present_change(present)
                }
            }
            Irq::DcinValid => self.handle_dc_present_change(),
            Irq::UsbinOv | Irq::UsbinUv => self.update_ovp_uvp(),
            Irq::BattInserted => {
                self.check_battery_id()?;
                self.ext_start()
            }
            Irq::VbatdetLow => {
                if self.regs.rt_status(Irq::VbatdetLow)? {
                    self.handle_vbatdet_low()
                } else {
                    Ok(())
                }
            }
            Irq::Fastchg => {
                let rising = self.regs.rt_status(Irq::Fastchg)?;
                self.handle_fastchg(rising)
            }
            Irq::Chgdone => self.handle_charge_done(),
            Irq::Chgfail => self.handle_charge_fail(),
            Irq::Chgstate => self.gauge_notify_check(),
            Irq::LoopChange => {
                self.schedule(Work::UnplugCheck, 0);
                Ok(())
            }
            Irq::BattRemoved => self.handle_battery_removed(),
            Irq::BatttempHot | Irq::BatttempCold => self.ext_stop(),
            Irq::Chghot => self.handle_chg_hot(),
            Irq::BatTempOk => self.handle_bat_temp_ok(),
            Irq::DcinOv => {
                self.vote_source(SourceDisableReasons::KERNEL_DRIVER, false)?;
                self.handle_dc_present_change()?;
                self.ext_stop()
            }
            Irq::DcinUv => {
                self.vote_source(SourceDisableReasons::KERNEL_DRIVER, false)?;
                self.ext_stop()
            }
            Irq::ChgGone
            | Irq::VbatOv
            | Irq::Chgwdog
            | Irq::Vcp
            | Irq::Atcdone
            | Irq::Atcfail
            | Irq::Trklchg
            | Irq::CoarseDetLow
            | Irq::VddLoop
            | Irq::VregOv
            | Irq::Vbatdet
            | Irq::Batfet
            | Irq::Psi => Ok(()),
        }
    }

    /// Track USB insertion and removal.
    pub(crate) fn handle_usb_present_change(&mut self, present: bool) -> Result<(), Error<B::Error>> {
        if self.regs.lpm_workaround() {
            self.regs.apply_kickstart()?;
        }
        self.regs.failed_clear()?;

        if self.state.usb_present != present {
            info!("usb present {} -> {}", self.state.usb_present, present);
            self.state.usb_present = present;
            if self.regs.lpm_workaround() {
                let on_battery = self.on_battery_only()?;
                self.regs.bypass_bat_gone_debounce(on_battery)?;
            }
            self.platform
                .charger_event(if present { ChargerEvent::VbusIn } else { ChargerEvent::VbusOut });
            if !present {
                self.vote_battery(BatteryDisableReasons::EOC, false)?;
                self.scheduler.cancel(Work::VddMaxResume);
                if self.state.vddmax_modified {
                    self.regs
                        .set_max_voltage(self.config.max_voltage_mv, self.config.vdd_ramp_step_delay_us)?;
                }
                self.state.vddmax_modified = false;
                self.state.battery_full = false;
                self.state.eoc_count = 0;
                self.state.eoc_count_by_current = 0;
                self.state.safety_timeout = false;
                self.state.safety_timeout_twice = false;
                self.state.usbin_critical_low_count = 0;
                self.state.source_under_rating = false;
                self.regs.set_recharge_voltage(VBAT_DET_MAX_MV)?;
            }
            self.update_ovp_uvp()?;
            self.state.battery_full_eoc_stop = false;
        }

        if present {
            self.schedule(Work::UnplugCheck, UNPLUG_CHECK_RAMP_MS);
            self.enable_irq(Irq::ChgGone);
        } else {
            self.state.usb_target_ma = 0;
            self.state.hsml_target_ma = 0;
            self.state.usb_aicl_max_ma = 0;
            self.state.aicl_vin_loop_active = false;
            self.state.vin_min_detected = false;
            self.disable_irq(Irq::ChgGone);
        }
        self.gauge_notify_check()
    }

    fn handle_dc_present_change(&mut self) -> Result<(), Error<B::Error>> {
        let present = self.regs.rt_status(Irq::DcinValid)?;
        if self.state.dc_present != present {
            info!("dc present {} -> {}", self.state.dc_present, present);
            self.state.dc_present = present;
            self.platform.charger_event(ChargerEvent::CableChange);
        }
        self.gauge_notify_check()
    }

    /// Latch OVP or UVP from the USB comparators. The two are never set together.
    pub(crate) fn update_ovp_uvp(&mut self) -> Result<(), Error<B::Error>> {
        let ov = self.regs.rt_status(Irq::UsbinOv)?;
        let valid = self.regs.rt_status(Irq::UsbinValid)?;
        let uv = self.regs.rt_status(Irq::UsbinUv)?;
        let was_ovp = self.state.ovp;
        if ov && !valid && !uv {
            self.state.ovp = true;
            self.state.uvp = false;
            if !was_ovp {
                warn!("usb over voltage");
                self.platform.charger_event(ChargerEvent::Ovp);
            }
        } else if !ov && !valid && uv {
            self.state.uvp = true;
            self.state.ovp = false;
            if was_ovp {
                self.platform.charger_event(ChargerEvent::OvpResolve);
            }
        } else {
            self.state.ovp = false;
            self.state.uvp = false;
            if was_ovp {
                info!("usb over voltage resolved");
                self.platform.charger_event(ChargerEvent::OvpResolve);
            }
        }
        Ok(())
    }

    /// Compare the battery-id reading against the configured window. Returns whether it passed.
    pub(crate) fn check_battery_id(&mut self) -> Result<bool, Error<B::Error>> {
        let min = self.config.batt_id_min_uv;
        let max = self.config.batt_id_max_uv;
        let valid = if min == 0 && max == 0 {
            true
        } else {
            match self.read_adc(AdcChannel::BattId) {
                Ok(uv) => (min..=max).contains(&uv),
                Err(_) => {
                    warn!("battery id unavailable, assuming valid");
                    true
                }
            }
        };
        if !valid {
            warn!("battery id out of range");
        }
        self.vote_battery(BatteryDisableReasons::BATTERY_INVALID, !valid)?;
        Ok(valid)
    }

    /// Battery dropped below the recharge threshold.
    pub(crate) fn handle_vbatdet_low(&mut self) -> Result<(), Error<B::Error>> {
        if let Some(ext) = self.ext.as_deref_mut() {
            ext.event_notify(ExtChargerEvent::EocStartCharge);
            self.platform.wake_lock(WakeLock::Eoc, true);
            self.schedule(Work::Eoc, EOC_CHECK_PERIOD_MS);
            return Ok(());
        }
        self.ext_start()?;
        self.regs.set_recharge_voltage(VBAT_DET_MAX_MV)?;
        self.vote_battery(BatteryDisableReasons::EOC, false)?;
        info!("battery below resume voltage, recharging");
        Ok(())
    }

    pub(crate) fn handle_fastchg(&mut self, rising: bool) -> Result<(), Error<B::Error>> {
        if rising && !self.scheduler.is_pending(Work::Eoc) {
            self.platform.wake_lock(WakeLock::Eoc, true);
            self.schedule(Work::Eoc, EOC_CHECK_PERIOD_MS);
        }
        self.gauge_notify_check()
    }

    /// Charge-done handling, also entered from the end-of-charge worker.
    pub(crate) fn handle_charge_done(&mut self) -> Result<(), Error<B::Error>> {
        if let Some(ext) = self.ext.as_deref_mut() {
            ext.event_notify(ExtChargerEvent::EocStopCharge);
        } else {
            self.ext_stop()?;
        }
        self.gauge_notify_check()?;
        self.platform.gauge_event(GaugeEvent::EocStopCharge);
        Ok(())
    }

    fn handle_charge_fail(&mut self) -> Result<(), Error<B::Error>> {
        if !self.state.power_source.is_ac() || self.config.keep_charge_on {
            return self.regs.failed_clear();
        }
        if self.config.safety_time_min > SAFETY_TIME_MAX_LIMIT && !self.state.safety_timeout_twice {
            info!("safety timer expired once, restarting");
            self.state.safety_timeout_twice = true;
            return self.regs.failed_clear();
        }
        error!("charge safety timer expired");
        self.state.safety_timeout = true;
        self.platform.charger_event(ChargerEvent::SafetyTimeout);
        Ok(())
    }

    fn handle_battery_removed(&mut self) -> Result<(), Error<B::Error>> {
        if self.config.embedded_battery {
            return Ok(());
        }
        if self.platform.get_value(GpioPin::BatteryPresent) == Some(true) {
            debug!("battery present pin still high, ignoring removal");
            return Ok(());
        }
        self.ext_stop()?;
        if self.regs.rt_status(Irq::BattRemoved)? {
            warn!("battery removed");
            self.platform.gauge_event(GaugeEvent::BatteryRemoved);
        }
        Ok(())
    }

    fn handle_chg_hot(&mut self) -> Result<(), Error<B::Error>> {
        match self.read_adc(AdcChannel::DieTemp) {
            Ok(mc) if mc < CHG_HOT_SPURIOUS_MC => {
                info!("spurious charger hot at {} mC", mc);
                self.regs.clear_chg_hot_override()
            }
            Ok(_) => {
                warn!("charger hot");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn handle_bat_temp_ok(&mut self) -> Result<(), Error<B::Error>> {
        if self.ext.is_some() {
            return self.relay_battery_temperature();
        }
        let ok = self.regs.rt_status(Irq::BatTempOk)?;
        if ok == self.state.bat_temp_ok_prev {
            debug!("battery temperature ok unchanged ({})", ok);
            return Ok(());
        }
        info!("battery temperature ok {} -> {}", self.state.bat_temp_ok_prev, ok);
        self.state.bat_temp_ok_prev = ok;
        if ok {
            self.ext_start()?;
        } else {
            self.ext_stop()?;
        }
        self.gauge_notify_check()?;
        self.platform.gauge_event(GaugeEvent::TempZoneChange);
        Ok(())
    }

    /// Tell the external charger which temperature band the battery is in.
    pub(crate) fn relay_battery_temperature(&mut self) -> Result<(), Error<B::Error>> {
        if self.ext.is_none() {
            return Ok(());
        }
        let cold = self.regs.rt_status(Irq::BatttempCold)?;
        let event = match self.state.thermal_zone {
            ThermalZone::Warm => {
                if self.regs.rt_status(Irq::BatttempHot)? {
                    ExtChargerEvent::Hot
                } else {
                    ExtChargerEvent::Warm
                }
            }
            ThermalZone::Cool if cold => ExtChargerEvent::Cold,
            ThermalZone::Cool => ExtChargerEvent::Cool,
            ThermalZone::Normal if cold => ExtChargerEvent::Cold,
            ThermalZone::Normal => ExtChargerEvent::Normal,
        };
        if self.state.ext_temp_event == Some(event) {
            return Ok(());
        }
        self.state.ext_temp_event = Some(event);
        if let Some(ext) = self.ext.as_deref_mut() {
            ext.event_notify(event);
        }
        self.gauge_notify_check()?;
        self.platform.gauge_event(GaugeEvent::TempZoneChange);
        Ok(())
    }
}
