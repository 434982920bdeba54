//! Charger handle: bring-up, source selection and the public control surface.
//!
//! [`ChargerBuilder::init`] programs the charger block and derives the initial software state
//! from the hardware. The resulting [`Charger`] owns the register transport, the delay provider
//! and the platform context; interrupt handling, the end-of-charge and unplug workers, thermal
//! derating and telemetry live in sibling modules as further `impl Charger` blocks.

use embedded_hal::delay::DelayNs;

use crate::access::RegisterAccess;
use crate::bus::RegisterBus;
use crate::config::{ChargerConfig, PmicRevision, PmicVariant};
use crate::data_types::{
    ActivePath, AdcChannel, BatteryStatus, ChargeSource, ChargeType, ChargerEvent, ExtChargerEvent, FsmState,
    HeartbeatSnapshot, Irq, IrqSet, PowerSource, ThermalZone, UsbOvThreshold, UsbOvpDebounce, WakeLock,
};
use crate::error::Error;
use crate::platform::{AdcError, ExternalCharger, Platform};
use crate::registers::{
    addr, buck_test, psi, test_cmd, BUCK_CLOCK_CTRL_DEFAULT, I_MIN_MA, ITERM_MAX_MA, USB_MA_TABLE, VBAT_DET_MAX_MV,
    VDD_SAFE_MAX_MV,
};
use crate::scheduler::{CancelToken, Scheduler, Work};
use crate::votes::{BatteryDisableReasons, DisableVotes, SourceDisableReasons};

/// End-of-charge evaluation period.
pub const EOC_CHECK_PERIOD_MS: u32 = 10_000;
/// Unplug check period while idle.
pub const UNPLUG_CHECK_WAIT_PERIOD_MS: u32 = 200;
/// Unplug check period while AICL is ramping.
pub const UNPLUG_CHECK_RAMP_MS: u32 = 25;
/// VDD_MAX is held just above the battery voltage this long after a source change.
pub const VDD_MAX_RESUME_MS: u32 = 2_000;
/// Delay between `UsbinValid` and the input collapse check.
pub const VIN_COLLAPSE_CHECK_MS: u32 = 350;
/// Recharge check after an end-of-charge stop.
pub const RECHARGE_CHECK_MS: u32 = 10_000;

/// Headroom above the battery voltage used while a new source settles.
const VDD_FLICKER_MARGIN_MV: u16 = 100;
const VDD_SAFE_MARGIN_MV: u16 = 20;
const SAFE_CURRENT_MA: u16 = 2025;
/// Safety timer values above this are programmed as two 8 hour windows.
pub(crate) const SAFETY_TIME_MAX_LIMIT: u16 = 510;
const SAFETY_TIME_8HR_TWICE: u16 = 480;
pub(crate) const VIN_MIN_HIGH_MV: u16 = 4400;
const USB_MA_1100: u16 = 1100;
const USB_MA_1500: u16 = 1500;
/// Current drawn from USB while running on the battery (suspends the input).
const USB_MA_BATTERY: u16 = 2;
const PSI_SETTLE_US: u32 = 100;

/// Interrupts unmasked at bring-up; battery presence lines are added for removable batteries.
const INITIAL_IRQS: [Irq; 11] = [
    Irq::DcinValid,
    Irq::UsbinValid,
    Irq::DcinOv,
    Irq::DcinUv,
    Irq::Chgfail,
    Irq::Fastchg,
    Irq::VbatdetLow,
    Irq::BatttempHot,
    Irq::BatttempCold,
    Irq::BatTempOk,
    Irq::Chghot,
];

/// Software view of the charger, mutated by interrupts and workers.
#[derive(Clone, Debug)]
pub struct ChargerState {
    pub usb_present: bool,
    pub dc_present: bool,
    /// Path reported by the last unplug poll.
    pub active_path: ActivePath,
    pub thermal_zone: ThermalZone,

    pub eoc_count: u16,
    pub eoc_count_by_current: u16,
    pub battery_full: bool,
    /// End of charge stopped the battery FET; recharge is armed through VBAT_DET.
    pub battery_full_eoc_stop: bool,

    /// Current requested by the source classifier above the wall threshold.
    pub usb_target_ma: u16,
    /// Highest input current AICL found the adapter can deliver.
    pub usb_aicl_max_ma: u16,
    /// Input current pinned by a host-mode (HSML) link; 0 when none. AICL stays off while set.
    pub hsml_target_ma: u16,
    pub aicl_vin_loop_active: bool,
    pub vin_min_detected: bool,
    pub aicl_window_ms: u64,
    pub aicl_last_ms: u64,

    pub ovp: bool,
    pub uvp: bool,
    pub safety_timeout: bool,
    pub safety_timeout_twice: bool,

    /// VIN_MIN restored after the reverse-boost fix.
    pub vin_min_mv: u16,
    pub reverse_boost_fix_ongoing: bool,
    pub final_kickstart: bool,
    pub rb_trial_count: u8,
    pub ovp_trial_count: u8,

    pub usbin_critical_low_count: u8,
    pub source_under_rating: bool,

    pub vddmax_modified: bool,
    pub last_vbat_programmed_mv: Option<u16>,
    pub last_delta_mv: i32,

    pub bat_temp_ok_prev: bool,
    pub thermal_mitigation_level: usize,
    /// Charge current cap from `limit_charge_enable`; 0 when unlimited.
    pub charge_limit_ma: u16,
    pub reverse_boost_check_disabled: bool,
    pub usb_max_current_ma: u16,

    pub power_source: PowerSource,
    pub previous_power_source: Option<PowerSource>,

    /// Last charging state reported to the fuel gauge.
    pub gauge_is_charging: bool,
    /// Report the next charging stop to the gauge as a full battery.
    pub gauge_full_pending: bool,

    pub ext_charging: bool,
    pub ext_charge_done: bool,
    pub ext_temp_event: Option<ExtChargerEvent>,

    pub last_heartbeat: Option<HeartbeatSnapshot>,

    pub enabled_irqs: IrqSet,
}

impl ChargerState {
    pub fn new(config: &ChargerConfig) -> Self {
        Self {
            usb_present: false,
            dc_present: false,
            active_path: ActivePath::None,
            thermal_zone: ThermalZone::Normal,
            eoc_count: 0,
            eoc_count_by_current: 0,
            battery_full: false,
            battery_full_eoc_stop: false,
            usb_target_ma: 0,
            usb_aicl_max_ma: 0,
            hsml_target_ma: 0,
            aicl_vin_loop_active: false,
            vin_min_detected: false,
            aicl_window_ms: 0,
            aicl_last_ms: 0,
            ovp: false,
            uvp: false,
            safety_timeout: false,
            safety_timeout_twice: false,
            vin_min_mv: config.vin_min_mv,
            reverse_boost_fix_ongoing: false,
            final_kickstart: false,
            rb_trial_count: 0,
            ovp_trial_count: 0,
            usbin_critical_low_count: 0,
            source_under_rating: false,
            vddmax_modified: false,
            last_vbat_programmed_mv: None,
            last_delta_mv: 0,
            bat_temp_ok_prev: true,
            thermal_mitigation_level: 0,
            charge_limit_ma: 0,
            reverse_boost_check_disabled: config.disable_reverse_boost_check,
            usb_max_current_ma: config.usb_max_current_ma,
            power_source: PowerSource::Batt,
            previous_power_source: None,
            gauge_is_charging: false,
            gauge_full_pending: false,
            ext_charging: false,
            ext_charge_done: false,
            ext_temp_event: None,
            last_heartbeat: None,
            enabled_irqs: IrqSet::empty(),
        }
    }

    pub fn is_warm(&self) -> bool {
        self.thermal_zone == ThermalZone::Warm
    }

    pub fn is_cool(&self) -> bool {
        self.thermal_zone == ThermalZone::Cool
    }
}

static IDLE_TOKEN: CancelToken = CancelToken::new();

/// Collects everything bring-up needs.
pub struct ChargerBuilder<'a, B, D, P> {
    bus: B,
    delay: D,
    platform: P,
    config: ChargerConfig,
    cancel: &'a CancelToken,
}

impl<'a, B, D, P> ChargerBuilder<'a, B, D, P>
where
    B: RegisterBus,
    D: DelayNs,
    P: Platform,
{
    pub fn new(bus: B, delay: D, platform: P) -> Self {
        Self {
            bus,
            delay,
            platform,
            config: ChargerConfig::default(),
            cancel: &IDLE_TOKEN,
        }
    }

    pub fn with_config(mut self, config: ChargerConfig) -> Self {
        self.config = config;
        self
    }

    /// Token checked between the steps of long recovery sequences.
    pub fn with_cancel_token(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Program the charger and determine the initial state.
    pub fn init(self) -> Result<Charger<'a, B, D, P>, Error<B::Error>> {
        if self.config.validate().is_err() {
            error!("rejected charger configuration");
            return Err(Error::InvalidConfig);
        }
        let regs = RegisterAccess::new(self.bus, self.delay, self.config.lpm_workaround);
        let mut charger = Charger {
            regs,
            platform: self.platform,
            state: ChargerState::new(&self.config),
            config: self.config,
            pwrsrc_votes: DisableVotes::new(),
            batt_votes: DisableVotes::new(),
            scheduler: Scheduler::new(),
            cancel: self.cancel,
            ext: None,
        };
        charger.hw_init()?;
        charger.determine_initial_state()?;
        if charger.config.update_time_ms != 0 {
            charger.schedule(Work::Heartbeat, charger.config.update_time_ms);
        }
        info!("charger ready");
        Ok(charger)
    }
}

/// A brought-up charger.
pub struct Charger<'a, B, D, P> {
    pub(crate) regs: RegisterAccess<B, D>,
    pub(crate) platform: P,
    pub(crate) config: ChargerConfig,
    pub(crate) state: ChargerState,
    pub(crate) pwrsrc_votes: DisableVotes<SourceDisableReasons>,
    pub(crate) batt_votes: DisableVotes<BatteryDisableReasons>,
    pub(crate) scheduler: Scheduler,
    pub(crate) cancel: &'a CancelToken,
    pub(crate) ext: Option<&'a mut dyn ExternalCharger>,
}

impl<'a, B, D, P> Charger<'a, B, D, P> {
    pub fn state(&self) -> &ChargerState {
        &self.state
    }

    pub fn config(&self) -> &ChargerConfig {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn source_disable_reasons(&self) -> SourceDisableReasons {
        self.pwrsrc_votes.reasons()
    }

    pub fn battery_disable_reasons(&self) -> BatteryDisableReasons {
        self.batt_votes.reasons()
    }

    pub fn has_external_charger(&self) -> bool {
        self.ext.is_some()
    }

    pub fn is_safety_timeout(&self) -> bool {
        self.state.safety_timeout
    }

    pub fn is_battery_full(&self) -> bool {
        self.state.battery_full
    }

    pub fn is_battery_full_eoc_stop(&self) -> bool {
        self.state.battery_full_eoc_stop
    }

    pub fn is_source_under_rating(&self) -> bool {
        self.state.source_under_rating
    }

    /// Last requested power source.
    pub fn charging_enabled(&self) -> PowerSource {
        self.state.power_source
    }

    /// Source requested before the current one, if any.
    pub fn previous_power_source(&self) -> Option<PowerSource> {
        self.state.previous_power_source
    }
}

impl<'a, B, D, P> Charger<'a, B, D, P>
where
    B: RegisterBus,
    D: DelayNs,
    P: Platform,
{
    fn hw_init(&mut self) -> Result<(), Error<B::Error>> {
        if self.regs.lpm_workaround() {
            self.regs.apply_kickstart()?;
        } else {
            self.regs.force_fast_clock()?;
        }
        self.regs.set_boot_done()?;

        let max_mv = self.config.max_voltage_mv;
        self.regs.set_safe_voltage((max_mv + VDD_SAFE_MARGIN_MV).min(VDD_SAFE_MAX_MV))?;
        self.regs.set_recharge_voltage(VBAT_DET_MAX_MV)?;
        self.regs.set_max_voltage(max_mv, self.config.vdd_ramp_step_delay_us)?;
        self.regs.set_safe_current(SAFE_CURRENT_MA)?;
        self.regs.set_max_current(self.config.max_bat_charge_current_ma)?;
        if self.config.uses_hw_iterm() {
            self.regs.set_termination_current(self.config.term_current_ma)?;
        }
        self.regs.stop_enum_timer()?;

        if self.config.safety_time_min > SAFETY_TIME_MAX_LIMIT {
            self.regs.set_safety_timer(SAFETY_TIME_8HR_TWICE)?;
        } else if self.config.safety_time_min != 0 {
            self.regs.set_safety_timer(self.config.safety_time_min)?;
        }
        if self.config.ttrkl_time_min != 0 {
            self.regs.set_trickle_timer(self.config.ttrkl_time_min)?;
        }

        if self.config.regulate_vin_min_thr_mv != 0 && self.config.lower_vin_min_mv != 0 {
            self.adjust_vin_min(false)?;
        } else if self.config.vin_min_mv != 0 {
            self.regs.set_min_input_voltage(self.config.vin_min_mv)?;
            self.state.vin_min_mv = self.config.vin_min_mv;
        } else {
            self.state.vin_min_mv = self.regs.min_input_voltage()?;
        }

        self.regs.disable_watchdog()?;
        self.regs.set_battery_temp_protection_disabled(self.config.keep_charge_on)?;
        self.regs.write(addr::CHG_BUCK_CLOCK_CTRL, BUCK_CLOCK_CTRL_DEFAULT)?;

        if self.config.trkl_voltage_mv != 0 {
            self.regs.set_trickle_voltage(self.config.trkl_voltage_mv)?;
        }
        if self.config.weak_voltage_mv != 0 {
            self.regs.set_weak_voltage(self.config.weak_voltage_mv)?;
        }
        if self.config.trkl_current_ma != 0 {
            self.regs.set_trickle_current(self.config.trkl_current_ma)?;
        }
        if self.config.weak_current_ma != 0 {
            self.regs.set_weak_current(self.config.weak_current_ma)?;
        }
        if let Some(threshold) = self.config.cold_threshold {
            if self.regs.set_cold_threshold(threshold).is_err() {
                warn!("failed to program cold threshold");
            }
        }
        if let Some(threshold) = self.config.hot_threshold {
            if self.regs.set_hot_threshold(threshold).is_err() {
                warn!("failed to program hot threshold");
            }
        }

        match self.config.revision {
            PmicRevision::V1 => {
                self.regs.write(addr::CHG_BUCK_CTRL_TEST2, buck_test::REV1_TEST2)?;
                self.regs.write(addr::CHG_BUCK_CTRL_TEST3, buck_test::REV1_TEST3_A)?;
                self.regs.write(addr::CHG_BUCK_CTRL_TEST3, buck_test::REV1_TEST3_B)?;
                for reg in [
                    addr::PSI_TXRX_SAMPLE_DATA_0,
                    addr::PSI_TXRX_SAMPLE_DATA_1,
                    addr::PSI_TXRX_SAMPLE_DATA_2,
                    addr::PSI_TXRX_SAMPLE_DATA_3,
                ] {
                    self.regs.write(reg, psi::SAMPLE_FILL)?;
                }
                self.regs.write(addr::PSI_CONFIG_STATUS, psi::CONFIG_ENABLE)?;
                self.regs.delay_us(PSI_SETTLE_US);
                self.regs.write(addr::PSI_CONFIG_STATUS, psi::CONFIG_IDLE)?;
            }
            PmicRevision::V3 => {
                let sub_rev = self.regs.read(addr::PM_SUB_REV)?;
                let value = if sub_rev & 0x01 != 0 { buck_test::REV3_SUB1 } else { buck_test::REV3_SUB0 };
                self.regs.write(addr::CHG_BUCK_CTRL_TEST3, value)?;
            }
            PmicRevision::V2 => {}
        }
        self.regs.write(addr::CHG_BUCK_CTRL_TEST3, buck_test::LOOP_COMPENSATION)?;
        self.regs.write(addr::CHG_BUCK_CTRL_TEST3, buck_test::EOC_FSM_DISABLE)?;

        self.regs.set_vref_therm_force_on(true)?;
        self.regs.set_source_disconnected(self.pwrsrc_votes.is_disabled())?;
        self.regs.set_charging_enabled(!self.batt_votes.is_disabled())?;

        if self.config.variant == PmicVariant::Pm8921 {
            self.regs.write_raw(addr::CHG_TEST, test_cmd::LPM_HW_CLOCK)?;
            self.regs.set_lpm(true)?;
        }
        debug!("hardware init done");
        Ok(())
    }

    fn determine_initial_state(&mut self) -> Result<(), Error<B::Error>> {
        self.state.dc_present = self.regs.rt_status(Irq::DcinValid)?;
        self.state.usb_present = self.regs.rt_status(Irq::UsbinValid)?;
        self.update_ovp_uvp()?;
        self.state.bat_temp_ok_prev = self.regs.rt_status(Irq::BatTempOk)?;

        for irq in INITIAL_IRQS {
            self.enable_irq(irq);
        }
        if !self.config.embedded_battery {
            self.enable_irq(Irq::BattRemoved);
            self.enable_irq(Irq::BattInserted);
        }
        if self.config.usbin_ovp_irqs {
            self.enable_irq(Irq::UsbinOv);
            self.enable_irq(Irq::UsbinUv);
        }
        if self.state.usb_present {
            self.enable_irq(Irq::ChgGone);
        }

        self.platform.charger_event(ChargerEvent::CableChange);
        let fastchg = self.regs.rt_status(Irq::Fastchg)?;
        self.handle_fastchg(fastchg)?;
        self.check_battery_id()?;
        info!(
            "initial state: usb={} dc={} ovp={} uvp={}",
            self.state.usb_present, self.state.dc_present, self.state.ovp, self.state.uvp
        );
        Ok(())
    }

    pub(crate) fn now(&self) -> u64 {
        self.platform.now_ms()
    }

    pub(crate) fn schedule(&mut self, work: Work, delay_ms: u32) {
        let now = self.now();
        self.scheduler.schedule(work, now, delay_ms);
    }

    pub(crate) fn enable_irq(&mut self, irq: Irq) {
        if !self.state.enabled_irqs.contains(irq) {
            self.state.enabled_irqs.insert(irq);
            self.platform.set_irq_enabled(irq, true);
        }
    }

    pub(crate) fn disable_irq(&mut self, irq: Irq) {
        if self.state.enabled_irqs.contains(irq) {
            self.state.enabled_irqs.remove(irq);
            self.platform.set_irq_enabled(irq, false);
        }
    }

    /// Cast a power-source disable vote and apply the result.
    pub(crate) fn vote_source(&mut self, reason: SourceDisableReasons, disable: bool) -> Result<(), Error<B::Error>> {
        let off = self.pwrsrc_votes.vote(reason, disable);
        self.regs.set_source_disconnected(off)
    }

    /// Cast a battery-FET disable vote and apply the result.
    pub(crate) fn vote_battery(&mut self, reason: BatteryDisableReasons, disable: bool) -> Result<(), Error<B::Error>> {
        let off = self.batt_votes.vote(reason, disable);
        self.regs.set_charging_enabled(!off)
    }

    pub(crate) fn read_adc(&mut self, channel: AdcChannel) -> Result<i64, AdcError> {
        self.platform.read_channel(channel).map(|r| r.physical)
    }

    /// Tell the fuel gauge when charging starts or stops.
    pub(crate) fn gauge_notify_check(&mut self) -> Result<(), Error<B::Error>> {
        let charging = match self.ext.as_deref_mut() {
            Some(ext) => ext.is_charging(),
            None => self.regs.fsm_state()?.is_charging(),
        };
        if charging != self.state.gauge_is_charging {
            self.state.gauge_is_charging = charging;
            if charging {
                self.platform.charging_began();
            } else {
                self.platform.charging_ended(self.state.gauge_full_pending);
                self.state.gauge_full_pending = false;
            }
        }
        Ok(())
    }

    /// Program the USB input limit, handing currents above the wall threshold to AICL.
    pub(crate) fn request_usb_draw(&mut self, ma: u16) -> Result<(), Error<B::Error>> {
        let mut ma = ma;
        let cap = self.state.usb_max_current_ma;
        if cap != 0 && ma > cap {
            warn!("restricting usb current to {} instead of {}", cap, ma);
            ma = cap;
        }
        let wall = self.config.usb_wall_threshold_ma();
        if self.state.hsml_target_ma == 0 && ma > wall {
            self.state.usb_target_ma = ma;
            let aicl_max = self.state.usb_aicl_max_ma;
            let start = if aicl_max == 0 {
                wall
            } else if aicl_max > USB_MA_1100 && self.platform.screen_on() {
                USB_MA_1100
            } else {
                aicl_max
            };
            debug!("usb draw {} mA, aicl start {} mA", ma, start);
            self.regs.draw_usb_current(start)
        } else {
            self.regs.draw_usb_current(ma)
        }
    }

    /// Program IBAT_MAX from the thermal zone, mitigation level and charge limit.
    pub(crate) fn set_appropriate_battery_current(&mut self) -> Result<(), Error<B::Error>> {
        let mut ma = self.config.max_bat_charge_current_ma;
        if self.state.is_cool() {
            ma = ma.min(self.config.cool_bat_charge_current_ma);
        }
        if self.state.is_warm() {
            ma = ma.min(self.config.warm_bat_charge_current_ma);
        }
        let level = self.state.thermal_mitigation_level;
        if level != 0 {
            if let Some(&limit) = self.config.thermal_mitigation.get(level) {
                ma = ma.min(limit);
            }
        }
        if self.state.charge_limit_ma != 0 {
            ma = ma.min(self.state.charge_limit_ma);
        }
        let ma = ma.max(I_MIN_MA);
        debug!("battery current {} mA", ma);
        self.regs.set_max_current(ma)
    }

    /// Program VBAT_DET for the current zone, or park it when recharge is not armed.
    pub(crate) fn set_appropriate_vbatdet(&mut self) -> Result<(), Error<B::Error>> {
        let delta = self.config.resume_voltage_delta_mv;
        let mv = if self.state.is_cool() {
            self.config.cool_bat_voltage_mv.saturating_sub(delta)
        } else if self.state.is_warm() {
            self.config.warm_bat_voltage_mv.saturating_sub(delta)
        } else if self.state.battery_full_eoc_stop {
            self.config.max_voltage_mv.saturating_sub(delta)
        } else {
            VBAT_DET_MAX_MV
        };
        self.regs.set_recharge_voltage(mv)
    }

    /// Move VIN_MIN between its lower and 4400 mV settings based on the battery voltage.
    pub(crate) fn adjust_vin_min(&mut self, only_increase: bool) -> Result<(), Error<B::Error>> {
        if self.state.reverse_boost_fix_ongoing {
            debug!("reverse boost fix ongoing, vin_min untouched");
            return Ok(());
        }
        let vbat_mv = match self.read_adc(AdcChannel::Vbat) {
            Ok(uv) => (uv / 1000) as i32,
            Err(_) => {
                warn!("vbat unavailable, vin_min untouched");
                return Ok(());
            }
        };
        let target = if vbat_mv >= self.config.regulate_vin_min_thr_mv as i32 {
            VIN_MIN_HIGH_MV
        } else if only_increase {
            return Ok(());
        } else {
            self.config.lower_vin_min_mv
        };
        let current = self.regs.min_input_voltage()?;
        if current != target {
            info!("vin_min {} -> {} mV (vbat {} mV)", current, target, vbat_mv);
            self.regs.set_min_input_voltage(target)?;
        }
        self.state.vin_min_mv = self.regs.min_input_voltage()?;
        Ok(())
    }

    pub(crate) fn on_battery_only(&mut self) -> Result<bool, Error<B::Error>> {
        let dc = self.regs.rt_status(Irq::DcinValid)?;
        let usb = self.regs.rt_status(Irq::UsbinValid)?;
        Ok(!(dc || usb))
    }

    /// Start the external charger when every precondition holds.
    pub(crate) fn ext_start(&mut self) -> Result<(), Error<B::Error>> {
        if self.ext.is_none() || self.state.ext_charging {
            return Ok(());
        }
        if self.regs.lpm_workaround() {
            let on_battery = self.on_battery_only()?;
            self.regs.bypass_bat_gone_debounce(on_battery)?;
        }
        if !(self.regs.rt_status(Irq::UsbinValid)? || self.regs.rt_status(Irq::DcinValid)?) {
            debug!("external charger: no source");
            return Ok(());
        }
        if !self.regs.rt_status(Irq::BattInserted)? {
            debug!("external charger: battery absent");
            return Ok(());
        }
        if !self.regs.rt_status(Irq::BatTempOk)? {
            debug!("external charger: battery temperature not ok");
            return Ok(());
        }
        if self.regs.rt_status(Irq::VbatOv)? {
            debug!("external charger: battery over voltage");
            return Ok(());
        }
        if let Some(ext) = self.ext.as_deref_mut() {
            ext.start_charging();
        }
        self.state.ext_charging = true;
        self.state.ext_charge_done = false;
        info!("external charger started");
        self.platform.wake_lock(WakeLock::Eoc, true);
        self.schedule(Work::Eoc, EOC_CHECK_PERIOD_MS);
        Ok(())
    }

    /// Stop the external charger if it is running.
    pub(crate) fn ext_stop(&mut self) -> Result<(), Error<B::Error>> {
        if self.ext.is_none() {
            return Ok(());
        }
        if self.regs.lpm_workaround() {
            let on_battery = self.on_battery_only()?;
            self.regs.bypass_bat_gone_debounce(on_battery)?;
        }
        if !self.state.ext_charging {
            return Ok(());
        }
        if let Some(ext) = self.ext.as_deref_mut() {
            ext.stop_charging();
        }
        self.state.ext_charging = false;
        self.state.ext_charge_done = false;
        info!("external charger stopped");
        Ok(())
    }

    /// Select the power source and whether the battery may charge from it.
    pub fn set_power_source_and_charger_enable(
        &mut self,
        source: PowerSource,
        charge_enable: bool,
        pwrsrc_enable: bool,
    ) -> Result<(), Error<B::Error>> {
        info!("power source request: charge={} pwrsrc={}", charge_enable, pwrsrc_enable);
        if source != PowerSource::Batt && !self.state.vddmax_modified {
            if let Ok(uv) = self.read_adc(AdcChannel::Vbat) {
                let vbat_mv = (uv / 1000).clamp(0, u16::MAX as i64) as u16;
                let mv = (vbat_mv + VDD_FLICKER_MARGIN_MV).min(self.config.max_voltage_mv);
                if self.regs.set_max_voltage(mv, self.config.vdd_ramp_step_delay_us).is_ok() {
                    self.schedule(Work::VddMaxResume, VDD_MAX_RESUME_MS);
                    self.state.vddmax_modified = true;
                }
            }
        }
        if self.state.power_source != source {
            self.state.previous_power_source = Some(self.state.power_source);
        }
        let changed = self.state.power_source != source;
        self.state.power_source = source;

        if self.ext.is_some() {
            let ma = if source == PowerSource::Batt { 0 } else { self.source_current_ma(source)? };
            if let Some(ext) = self.ext.as_deref_mut() {
                ext.set_current_limit(source, ma);
            }
            if charge_enable && source != PowerSource::Batt {
                self.platform.wake_lock(WakeLock::Eoc, true);
                self.schedule(Work::Eoc, EOC_CHECK_PERIOD_MS);
            }
            return self.gauge_notify_check();
        }

        self.vote_source(SourceDisableReasons::KERNEL_DRIVER, !pwrsrc_enable)?;
        self.vote_battery(BatteryDisableReasons::KERNEL_DRIVER, !charge_enable)?;

        let ma = self.source_current_ma(source)?;
        if changed {
            let dc_valid = self.regs.rt_status(Irq::DcinValid)?;
            if self.config.vin_min_wlc_mv != 0 && source == PowerSource::Wireless && dc_valid {
                self.regs.set_min_input_voltage(self.config.vin_min_wlc_mv)?;
            } else if self.config.regulate_vin_min_thr_mv != 0 && self.config.lower_vin_min_mv != 0 {
                self.adjust_vin_min(false)?;
            } else if self.config.vin_min_wlc_mv != 0 {
                self.regs.set_min_input_voltage(self.state.vin_min_mv)?;
            }
        }
        self.request_usb_draw(ma)?;
        self.handle_usb_present_change(source != PowerSource::Batt)
    }

    fn source_current_ma(&mut self, source: PowerSource) -> Result<u16, Error<B::Error>> {
        let ma = match source {
            PowerSource::Batt => USB_MA_BATTERY,
            PowerSource::Wireless => {
                if self.regs.rt_status(Irq::DcinValid)? {
                    USB_MA_1100
                } else {
                    USB_MA_TABLE[1]
                }
            }
            PowerSource::Detecting | PowerSource::UnknownUsb | PowerSource::Usb => USB_MA_TABLE[1],
            PowerSource::Ac | PowerSource::NineVAc | PowerSource::MhlAc => {
                let screen_on = self.platform.screen_on();
                if !self.config.aicl_enabled {
                    USB_MA_1100
                } else if self.state.usb_aicl_max_ma != 0 && self.state.aicl_vin_loop_active {
                    if screen_on && self.state.usb_aicl_max_ma > USB_MA_1100 {
                        USB_MA_1100
                    } else {
                        self.state.usb_aicl_max_ma
                    }
                } else if screen_on {
                    USB_MA_1100
                } else {
                    USB_MA_1500
                }
            }
        };
        Ok(ma)
    }

    /// Input currently charging the battery.
    pub fn charging_source(&mut self) -> Result<ChargeSource, Error<B::Error>> {
        Ok(self.is_battery_charging()?.1)
    }

    /// Whether the battery is charging, and from which input.
    pub fn is_battery_charging(&mut self) -> Result<(bool, ChargeSource), Error<B::Error>> {
        let charging = match self.ext.as_deref_mut() {
            Some(ext) => ext.is_charging(),
            None => self.regs.fsm_state()?.is_charging(),
        };
        if !charging {
            return Ok((false, ChargeSource::None));
        }
        let source = if self.regs.rt_status(Irq::DcinValid)? { ChargeSource::Dc } else { ChargeSource::Usb };
        Ok((true, source))
    }

    pub fn battery_status(&mut self) -> Result<BatteryStatus, Error<B::Error>> {
        if self.ext.is_some() {
            if self.state.ext_charge_done {
                return Ok(BatteryStatus::Full);
            }
            if self.state.ext_charging {
                return Ok(BatteryStatus::Charging);
            }
        }
        let fsm = self.regs.fsm_state()?;
        let status = fsm.battery_status();
        if fsm == FsmState::OnChgHighI {
            let not_charging = !self.regs.rt_status(Irq::BattInserted)?
                || !self.regs.rt_status(Irq::BatTempOk)?
                || self.regs.rt_status(Irq::Chghot)?
                || self.regs.rt_status(Irq::VbatdetLow)?;
            if not_charging {
                return Ok(BatteryStatus::NotCharging);
            }
        }
        Ok(status)
    }

    pub fn charge_type(&mut self) -> Result<ChargeType, Error<B::Error>> {
        if let Some(ext) = self.ext.as_deref_mut() {
            if !ext.is_charging() {
                return Ok(ChargeType::None);
            }
            return Ok(if ext.is_trickle() { ChargeType::Trickle } else { ChargeType::Fast });
        }
        if self.regs.rt_status(Irq::Trklchg)? {
            return Ok(ChargeType::Trickle);
        }
        if self.regs.rt_status(Irq::Fastchg)? {
            return Ok(ChargeType::Fast);
        }
        Ok(ChargeType::None)
    }

    pub fn set_max_battery_charge_current(&mut self, ma: u16) -> Result<(), Error<B::Error>> {
        self.regs.set_max_current(ma)?;
        self.config.max_bat_charge_current_ma = ma;
        Ok(())
    }

    /// Hand battery charging to an external charger IC.
    pub fn register_external_charger(&mut self, ext: &'a mut dyn ExternalCharger) -> Result<(), Error<B::Error>> {
        self.ext = Some(ext);
        self.state.ext_charging = false;
        self.state.ext_charge_done = false;
        info!("external charger registered");
        if self.regs.rt_status(Irq::DcinValid)? {
            self.vote_source(SourceDisableReasons::KERNEL_DRIVER, true)?;
        }
        self.ext_start()
    }

    /// Stop and detach the external charger.
    pub fn unregister_external_charger(&mut self) -> Result<Option<&'a mut dyn ExternalCharger>, Error<B::Error>> {
        self.ext_stop()?;
        self.state.ext_temp_event = None;
        Ok(self.ext.take())
    }

    /// Select a thermal mitigation level from the configured table.
    pub fn set_thermal_mitigation(&mut self, level: usize) -> Result<(), Error<B::Error>> {
        if level >= self.config.thermal_mitigation.len() {
            return Err(Error::OutOfRange);
        }
        self.state.thermal_mitigation_level = level;
        self.set_appropriate_battery_current()
    }

    pub fn charger_enable(&mut self, enable: bool) -> Result<(), Error<B::Error>> {
        if self.ext.is_some() {
            return if enable { self.ext_start() } else { self.ext_stop() };
        }
        if enable {
            if self.state.safety_timeout {
                return Err(Error::SafetyTimeout);
            }
            if self.batt_votes.contains(BatteryDisableReasons::BATTERY_INVALID) {
                return Err(Error::BatteryInvalid);
            }
        }
        self.vote_battery(BatteryDisableReasons::KERNEL_DRIVER, !enable)
    }

    pub fn power_source_enable(&mut self, enable: bool) -> Result<(), Error<B::Error>> {
        self.vote_source(SourceDisableReasons::KERNEL_DRIVER, !enable)
    }

    /// Drop the USB input to the minimum current, or restore the requested one.
    pub fn disable_source_current(&mut self, disable: bool) -> Result<(), Error<B::Error>> {
        if disable {
            self.regs.draw_usb_current(USB_MA_BATTERY)
        } else {
            let source = self.state.power_source;
            let ma = self.source_current_ma(source)?;
            self.request_usb_draw(ma)
        }
    }

    pub fn regulate_input_voltage(&mut self, mv: u16) -> Result<(), Error<B::Error>> {
        self.regs.set_min_input_voltage(mv)?;
        self.state.vin_min_mv = mv;
        Ok(())
    }

    /// Cap the battery charge current at the DAC floor.
    pub fn limit_charge_enable(&mut self, enable: bool) -> Result<(), Error<B::Error>> {
        self.state.charge_limit_ma = if enable { I_MIN_MA } else { 0 };
        self.set_appropriate_battery_current()
    }

    pub fn disable_input_current_limit(&mut self, disable: bool) -> Result<(), Error<B::Error>> {
        if disable {
            self.regs.disable_input_current_limit()?;
        }
        Ok(())
    }

    pub fn set_usb_ovp_disabled(&mut self, disable: bool) -> Result<(), Error<B::Error>> {
        self.regs.set_usb_ovp_disabled(disable)
    }

    /// User request to stop charging and disconnect the input.
    pub fn set_charging_disabled(&mut self, disable: bool) -> Result<(), Error<B::Error>> {
        self.vote_battery(BatteryDisableReasons::USER1, disable)?;
        self.vote_source(SourceDisableReasons::USER, disable)
    }

    /// Second user switch; only the battery FET.
    pub fn set_auto_enable(&mut self, disable: bool) -> Result<(), Error<B::Error>> {
        self.vote_battery(BatteryDisableReasons::USER2, disable)
    }

    /// Cap on the USB input current; 0 removes the cap.
    pub fn set_usb_max_current(&mut self, ma: u16) -> Result<(), Error<B::Error>> {
        self.state.usb_max_current_ma = ma;
        if ma == 0 {
            return Ok(());
        }
        let current = self.regs.usb_current_ma()?;
        if current > ma {
            self.regs.draw_usb_current(ma)?;
        }
        Ok(())
    }

    /// Pin the USB input current for a host-mode link, bypassing AICL; 0 releases it.
    pub fn set_hsml_target_ma(&mut self, ma: u16) -> Result<(), Error<B::Error>> {
        info!("hsml target {} mA", ma);
        self.state.hsml_target_ma = ma;
        if ma != 0 && self.state.power_source == PowerSource::Usb {
            self.request_usb_draw(ma)?;
        }
        Ok(())
    }

    pub fn set_usb_ov_threshold(&mut self, threshold: UsbOvThreshold) -> Result<(), Error<B::Error>> {
        self.regs.set_usb_ov_threshold(threshold)
    }

    pub fn set_usb_ovp_debounce_time(&mut self, debounce: UsbOvpDebounce) -> Result<(), Error<B::Error>> {
        self.regs.set_usb_ovp_debounce_time(debounce)
    }

    pub fn set_reverse_boost_check_disabled(&mut self, disable: bool) {
        self.state.reverse_boost_check_disabled = disable;
    }

    pub fn set_rconn_mohm(&mut self, mohm: u16) {
        self.config.rconn_mohm = mohm;
    }

    pub fn is_usb_plugged_in(&mut self) -> Result<bool, Error<B::Error>> {
        self.regs.rt_status(Irq::UsbinValid)
    }

    pub fn is_dc_plugged_in(&mut self) -> Result<bool, Error<B::Error>> {
        self.regs.rt_status(Irq::DcinValid)
    }

    /// Exactly one of USB and DC is present.
    pub fn is_power_source_plugged_in(&mut self) -> Result<bool, Error<B::Error>> {
        let usb = self.is_usb_plugged_in()?;
        let dc = self.is_dc_plugged_in()?;
        if usb && dc {
            warn!("usb and dc both present");
        }
        Ok(usb ^ dc)
    }

    pub fn is_battery_present(&mut self) -> Result<bool, Error<B::Error>> {
        self.regs.rt_status(Irq::BattInserted)
    }

    /// Re-read the OVP/UVP latches; an external charger may report OVP on its own.
    pub fn is_charger_ovp(&mut self) -> Result<bool, Error<B::Error>> {
        self.update_ovp_uvp()?;
        if let Some(ext) = self.ext.as_deref_mut() {
            if ext.is_ovp() {
                return Ok(true);
            }
        }
        Ok(self.state.ovp)
    }

    pub fn battery_voltage_mv(&mut self) -> Result<u16, Error<B::Error>> {
        let uv = self.read_adc(AdcChannel::Vbat)?;
        Ok((uv / 1000).clamp(0, u16::MAX as i64) as u16)
    }

    /// Battery temperature in deci-°C. Factory mode clamps readings from an absent thermistor.
    pub fn battery_temperature_dc(&mut self) -> Result<i16, Error<B::Error>> {
        let dc = self.read_adc(AdcChannel::BattTemp)?;
        let dc = dc.clamp(i16::MIN as i64, i16::MAX as i64) as i16;
        if self.config.keep_charge_on && dc >= 680 {
            return Ok(650);
        }
        Ok(dc)
    }

    pub fn is_battery_temperature_fault(&mut self) -> Result<bool, Error<B::Error>> {
        Ok(self.regs.rt_status(Irq::BatttempCold)? || self.state.is_warm())
    }

    /// Temperature fault that the hardware is acting on by disabling charging.
    pub fn is_battery_temperature_fault_disabling_charge(&mut self) -> Result<bool, Error<B::Error>> {
        if self.config.keep_charge_on {
            return Ok(false);
        }
        let cold = self.regs.rt_status(Irq::BatttempCold)?;
        let hot = self.regs.rt_status(Irq::BatttempHot)?;
        let warm = self.state.is_warm();
        let vbatdet_low = self.regs.rt_status(Irq::VbatdetLow)?;
        Ok(cold || (hot && warm) || (warm && !vbatdet_low))
    }

    /// Prepare for system suspend.
    pub fn suspend(&mut self) -> Result<(), Error<B::Error>> {
        if self.regs.rt_status(Irq::UsbinValid)? {
            self.enable_irq(Irq::LoopChange);
        }
        if self.regs.lpm_workaround() {
            self.regs.apply_kickstart()?;
        }
        self.regs.set_vref_therm_force_on(false)?;
        if !self.regs.lpm_workaround() {
            self.regs.set_hw_clock_switching()?;
        }
        debug!("suspended");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), Error<B::Error>> {
        if self.regs.lpm_workaround() {
            self.regs.apply_kickstart()?;
        } else {
            self.regs.force_fast_clock()?;
        }
        self.regs.set_vref_therm_force_on(true)?;
        if self.config.cool_temp_dc.is_some() || self.config.warm_temp_dc.is_some() {
            self.reset_thermal_state()?;
        }
        self.disable_irq(Irq::LoopChange);
        debug!("resumed");
        Ok(())
    }

    /// Cancel all work, leave the charger in its low-power state and release the resources.
    pub fn shutdown(mut self) -> (B, D, P) {
        self.scheduler.cancel_all();
        if self.ext_stop().is_err() {
            warn!("failed to stop external charger during shutdown");
        }
        if self.suspend().is_err() {
            warn!("failed to park charger during shutdown");
        }
        let (bus, delay) = self.regs.free();
        (bus, delay, self.platform)
    }

    /// Run every due job. Returns the next deadline, if any job remains queued.
    pub fn run_pending(&mut self) -> Option<u64> {
        for _ in 0..Work::COUNT {
            let now = self.now();
            let Some(work) = self.scheduler.take_due(now) else {
                break;
            };
            if self.run_work(work).is_err() {
                warn!("deferred work failed, rescheduling");
                match work {
                    Work::Eoc => self.schedule(Work::Eoc, EOC_CHECK_PERIOD_MS),
                    Work::UnplugCheck => self.schedule(Work::UnplugCheck, UNPLUG_CHECK_WAIT_PERIOD_MS),
                    Work::Heartbeat if self.config.update_time_ms != 0 => {
                        self.schedule(Work::Heartbeat, self.config.update_time_ms)
                    }
                    _ => {}
                }
            }
        }
        self.scheduler.next_deadline()
    }

    fn run_work(&mut self, work: Work) -> Result<(), Error<B::Error>> {
        trace!("running deferred work");
        match work {
            Work::Eoc => self.eoc_worker(),
            Work::UnplugCheck => self.unplug_check_worker(),
            Work::VinCollapseCheck => self.vin_collapse_check_worker(),
            Work::RechargeCheck => self.recharge_check_worker(),
            Work::VddMaxResume => self.vdd_max_resume_worker(),
            Work::Heartbeat => self.heartbeat_worker(),
        }
    }

    /// Termination current: read back from ITERM when it is programmed there.
    pub(crate) fn termination_current_ma(&mut self) -> Result<u16, Error<B::Error>> {
        if self.config.term_current_ma <= ITERM_MAX_MA {
            self.regs.termination_current()
        } else {
            Ok(self.config.term_current_ma)
        }
    }
}
