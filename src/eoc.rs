//! End-of-charge detection and the periodic charging workers.
//!
//! While fast charging, [`Charger::run_pending`] evaluates the charger every
//! [`EOC_CHECK_PERIOD_MS`]. Three consecutive qualifying evaluations mark the battery full; the
//! battery FET is opened either after a long count-only hold or, with a current threshold
//! configured, after three further evaluations below that current.

use embedded_hal::delay::DelayNs;

use crate::bus::RegisterBus;
use crate::charger::{Charger, EOC_CHECK_PERIOD_MS, RECHARGE_CHECK_MS};
use crate::data_types::{AdcChannel, ChargeProgress, ChargerEvent, GaugeEvent, HeartbeatSnapshot, Irq, WakeLock};
use crate::error::Error;
use crate::platform::Platform;
use crate::registers::{RegulationLoops, VDD_MAX_MAX_MV};
use crate::scheduler::Work;
use crate::votes::BatteryDisableReasons;

/// Consecutive qualifying evaluations before the battery is reported full.
pub const CONSECUTIVE_COUNT: u16 = 3;
/// Extra evaluations the count-only stop waits after reporting full.
const CLEAR_FULL_STATE_COUNT: u16 = 180;
/// Below this state of charge a "full" battery is assumed to be carrying a system load.
const OVERLOAD_SOC_PERCENT: u8 = 90;
const OVERLOAD_VBAT_MARGIN_MV: i64 = 100;
const USBIN_CRITICAL_LOW_UV: i64 = 4_450_000;
const USBIN_CRITICAL_LOW_COUNT: u8 = 6;

impl<'a, B, D, P> Charger<'a, B, D, P>
where
    B: RegisterBus,
    D: DelayNs,
    P: Platform,
{
    pub(crate) fn eoc_worker(&mut self) -> Result<(), Error<B::Error>> {
        if !self.state.safety_timeout {
            self.regs.failed_clear()?;
        }

        let progress = self.is_charging_finished()?;
        if progress == ChargeProgress::NotInProgress {
            debug!("not charging, end-of-charge polling stops");
            self.state.battery_full = false;
            self.state.eoc_count = 0;
            self.state.eoc_count_by_current = 0;
            self.state.safety_timeout_twice = false;
            self.state.battery_full_eoc_stop = false;
            self.platform.wake_lock(WakeLock::Eoc, false);
            return Ok(());
        }

        if !self.state.gauge_is_charging {
            self.gauge_notify_check()?;
        }

        let threshold_ma = self.config.eoc_ibat_threshold_ma as i32;
        let finished = progress == ChargeProgress::Finished || self.state.eoc_count >= CONSECUTIVE_COUNT;
        if finished {
            self.state.eoc_count = self.state.eoc_count.saturating_add(1);
            if threshold_ma != 0 && self.state.eoc_count > CONSECUTIVE_COUNT {
                let ichg_ma = self.platform.battery_current_ua().map(|ua| ua / 1000);
                match ichg_ma {
                    Some(ma) if ma <= 0 && ma > -threshold_ma => self.state.eoc_count_by_current += 1,
                    _ => self.state.eoc_count_by_current = 0,
                }
            }
        } else {
            self.state.eoc_count = 0;
            self.state.eoc_count_by_current = 0;
        }
        debug!(
            "eoc count {} by current {}",
            self.state.eoc_count, self.state.eoc_count_by_current
        );

        let stop = if threshold_ma == 0 {
            self.state.eoc_count == CONSECUTIVE_COUNT + CLEAR_FULL_STATE_COUNT
        } else {
            self.state.eoc_count_by_current == CONSECUTIVE_COUNT
        };
        if stop {
            return self.stop_at_end_of_charge();
        }

        let derated = self.state.is_warm() || self.state.is_cool();
        if self.state.eoc_count == CONSECUTIVE_COUNT {
            if !derated {
                info!("battery full");
                self.state.battery_full = true;
                if threshold_ma == 0 {
                    self.platform.charging_ended(true);
                }
                self.platform.gauge_event(GaugeEvent::Eoc);
            }
        } else if self.state.eoc_count == 0 {
            self.state.battery_full_eoc_stop = false;
        }

        if self.state.battery_full {
            self.check_full_under_load()?;
        }

        if self.config.regulate_vin_min_thr_mv != 0 && self.config.lower_vin_min_mv != 0 {
            self.adjust_vin_min(true)?;
        }
        self.adjust_vdd_max_for_fastchg()?;
        self.schedule(Work::Eoc, EOC_CHECK_PERIOD_MS);
        self.check_source_under_rating()
    }

    fn stop_at_end_of_charge(&mut self) -> Result<(), Error<B::Error>> {
        info!("end of charge, opening battery fet");
        self.state.eoc_count = 0;
        self.state.eoc_count_by_current = 0;
        self.state.safety_timeout_twice = false;
        if self.state.ext_charging {
            self.state.ext_charge_done = true;
        }
        if self.state.is_warm() || self.state.is_cool() {
            self.state.battery_full = false;
            self.state.battery_full_eoc_stop = false;
        } else {
            self.state.battery_full_eoc_stop = true;
            if self.config.eoc_ibat_threshold_ma != 0 {
                self.state.gauge_full_pending = true;
            }
        }
        self.set_appropriate_vbatdet()?;
        self.vote_battery(BatteryDisableReasons::EOC, true)?;
        self.handle_charge_done()?;
        self.schedule(Work::RechargeCheck, RECHARGE_CHECK_MS);
        self.platform.wake_lock(WakeLock::Eoc, false);
        Ok(())
    }

    /// A full battery that keeps sagging is supplying the system; resume counting.
    fn check_full_under_load(&mut self) -> Result<(), Error<B::Error>> {
        let Some(soc) = self.platform.percent_charge() else {
            return Ok(());
        };
        let Ok(vbat_uv) = self.read_adc(AdcChannel::Vbat) else {
            return Ok(());
        };
        let limit_mv = self.config.max_voltage_mv as i64 - OVERLOAD_VBAT_MARGIN_MV;
        if soc < OVERLOAD_SOC_PERCENT && vbat_uv / 1000 <= limit_mv {
            info!("full battery under load: soc {} vbat {} mV", soc, vbat_uv / 1000);
            self.state.battery_full = false;
            self.state.eoc_count = 0;
            self.state.eoc_count_by_current = 0;
            self.platform.gauge_event(GaugeEvent::Eoc);
        }
        Ok(())
    }

    /// One end-of-charge evaluation.
    pub fn is_charging_finished(&mut self) -> Result<ChargeProgress, Error<B::Error>> {
        let internal = match self.ext.as_deref_mut() {
            Some(ext) => {
                if !ext.is_charging() {
                    return Ok(ChargeProgress::NotInProgress);
                }
                false
            }
            None => {
                if !self.regs.rt_status(Irq::Fastchg)? {
                    return Ok(ChargeProgress::NotInProgress);
                }
                if self.regs.rt_status(Irq::Vcp)? {
                    debug!("vcp active");
                    return Ok(ChargeProgress::InProgress);
                }
                true
            }
        };

        if !self.regs.rt_status(Irq::BatTempOk)? {
            debug!("battery temperature not ok");
            return Ok(ChargeProgress::InProgress);
        }

        let programmed_mv = self.regs.max_voltage()?;
        let vbat_mv = match self.read_adc(AdcChannel::Vbat) {
            Ok(uv) => uv / 1000,
            Err(_) => {
                warn!("vbat unavailable");
                return Ok(ChargeProgress::InProgress);
            }
        };
        let floor_mv = programmed_mv as i64 - self.config.vbat_tolerance_mv as i64;
        if vbat_mv < floor_mv {
            debug!("vbat {} mV below {} mV", vbat_mv, floor_mv);
            return Ok(ChargeProgress::InProgress);
        }

        match self.state.last_vbat_programmed_mv {
            None => self.state.last_vbat_programmed_mv = Some(programmed_mv),
            Some(last) if last != programmed_mv => {
                debug!("vdd_max changed {} -> {} mV", last, programmed_mv);
                self.state.last_vbat_programmed_mv = Some(programmed_mv);
                return Ok(ChargeProgress::InProgress);
            }
            Some(_) => {}
        }

        if internal {
            let loops = self.regs.regulation_loops()?;
            if !(loops.is_empty() || loops == RegulationLoops::VDD) {
                debug!("regulation loops {:#x}", loops.bits());
                return Ok(ChargeProgress::InProgress);
            }
        }

        let iterm_ma = self.termination_current_ma()? as i32;
        let Some(ichg_ua) = self.platform.battery_current_ua() else {
            warn!("battery current unavailable");
            return Ok(ChargeProgress::InProgress);
        };
        let ichg_ma = ichg_ua / 1000;
        if ichg_ma > 0 || -ichg_ma > iterm_ma {
            debug!("ichg {} mA above termination {} mA", ichg_ma, iterm_ma);
            return Ok(ChargeProgress::InProgress);
        }
        Ok(ChargeProgress::Finished)
    }

    /// Raise VDD_MAX by the connector IR drop so the battery terminal reaches the target.
    pub(crate) fn adjust_vdd_max_for_fastchg(&mut self) -> Result<(), Error<B::Error>> {
        let rconn = self.config.rconn_mohm as i64;
        if rconn == 0 || self.state.is_warm() || self.state.is_cool() {
            return Ok(());
        }
        let Some(ichg_ua) = self.platform.battery_current_ua() else {
            return Ok(());
        };
        if ichg_ua >= 0 || ichg_ua <= self.config.ichg_threshold_ua {
            return Ok(());
        }
        let Ok(vbat_uv) = self.read_adc(AdcChannel::Vbat) else {
            return Ok(());
        };

        let ichg_ma = ichg_ua as i64 / 1000;
        let terminal_mv = ((vbat_uv + ichg_ma * rconn) / 1000) as i32;
        let max_mv = self.config.max_voltage_mv as i32;
        let increase_mv = self.config.vdd_max_increase_mv as i32;
        let target_mv = match self.config.ichg_regulation_thr_ua {
            Some(thr) if ichg_ua <= thr => max_mv + increase_mv,
            _ => max_mv,
        };
        let delta_mv = target_mv - terminal_mv;
        self.state.last_delta_mv = delta_mv;
        if delta_mv > self.config.delta_threshold_mv && delta_mv <= 0 {
            trace!("vdd_max delta {} mV within threshold", delta_mv);
            return Ok(());
        }

        let programmed_mv = self.regs.max_voltage()? as i32;
        let ceiling_mv = (max_mv + increase_mv).min(VDD_MAX_MAX_MV as i32);
        let adjusted_mv = (programmed_mv + delta_mv).clamp(max_mv, ceiling_mv);
        debug!(
            "vdd_max compensation: terminal {} mV delta {} mV -> {} mV",
            terminal_mv, delta_mv, adjusted_mv
        );
        self.regs.set_max_voltage(adjusted_mv as u16, self.config.vdd_ramp_step_delay_us)
    }

    /// Count consecutive low USBIN readings and flag a weak adapter.
    pub(crate) fn check_source_under_rating(&mut self) -> Result<(), Error<B::Error>> {
        if !self.regs.rt_status(Irq::UsbinValid)? {
            return Ok(());
        }
        let Ok(usbin_uv) = self.read_adc(AdcChannel::Usbin) else {
            return Ok(());
        };
        if usbin_uv < USBIN_CRITICAL_LOW_UV {
            self.state.usbin_critical_low_count =
                (self.state.usbin_critical_low_count + 1).min(USBIN_CRITICAL_LOW_COUNT);
        } else {
            self.state.usbin_critical_low_count = 0;
        }
        let under_rating = self.state.usbin_critical_low_count == USBIN_CRITICAL_LOW_COUNT;
        if under_rating != self.state.source_under_rating {
            if under_rating {
                warn!("power source under rating, usbin {} uV", usbin_uv);
            }
            self.state.source_under_rating = under_rating;
            self.platform.charger_event(ChargerEvent::SourceUnderRating);
        }
        Ok(())
    }

    pub(crate) fn recharge_check_worker(&mut self) -> Result<(), Error<B::Error>> {
        if self.regs.rt_status(Irq::Fastchg)? {
            return Ok(());
        }
        self.handle_vbatdet_low()
    }

    pub(crate) fn vdd_max_resume_worker(&mut self) -> Result<(), Error<B::Error>> {
        let max_mv = self.config.max_voltage_mv;
        debug!("restoring vdd_max {} mV", max_mv);
        self.regs.set_max_voltage(max_mv, self.config.vdd_ramp_step_delay_us)
    }

    pub(crate) fn heartbeat_worker(&mut self) -> Result<(), Error<B::Error>> {
        if !self.state.safety_timeout {
            self.regs.failed_clear()?;
        }
        if self.config.update_time_ms != 0 {
            self.schedule(Work::Heartbeat, self.config.update_time_ms);
        }
        let snapshot = self.heartbeat_snapshot()?;
        info!(
            "heartbeat: vbat {} uV, ibat {} uA, soc {}, temp {} dC, fsm {}, iusb {} mA, loops {}",
            snapshot.vbat_uv,
            snapshot.ibat_ua,
            snapshot.soc.map_or(-1, i32::from),
            snapshot.batt_temp_dc,
            snapshot.fsm.code(),
            snapshot.usb_ma,
            snapshot.loops
        );
        self.state.last_heartbeat = Some(snapshot);
        Ok(())
    }

    fn heartbeat_snapshot(&mut self) -> Result<HeartbeatSnapshot, Error<B::Error>> {
        Ok(HeartbeatSnapshot {
            at_ms: self.now(),
            vbat_uv: self.read_adc(AdcChannel::Vbat).unwrap_or(0),
            ibat_ua: self.platform.battery_current_ua().unwrap_or(0),
            soc: self.platform.percent_charge(),
            batt_temp_dc: self.read_adc(AdcChannel::BattTemp).unwrap_or(0),
            fsm: self.regs.fsm_state()?,
            usb_ma: self.regs.usb_current_ma()?,
            loops: self.regs.regulation_loops()?.bits(),
        })
    }
}
