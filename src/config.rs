//! Board configuration for the charger engine.

use heapless::Vec;

use crate::data_types::TempThreshold;
use crate::registers::{USB_MA_TABLE, VDD_MAX_MAX_MV, VDD_MAX_MIN_MV};

/// Maximum number of thermal mitigation levels.
pub const MAX_MITIGATION_LEVELS: usize = 8;

/// PMIC silicon revision; selects bring-up workarounds.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PmicRevision {
    /// Before 2.0: buck and PSI fixups at bring-up.
    V1,
    V2,
    /// 3.0: buck compensation picked from the sub-revision register.
    V3,
}

/// PMIC variant. Only the PM8921 re-enables low-power mode at the end of bring-up.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PmicVariant {
    Pm8921,
    Pm8917,
}

/// Charger platform data.
///
/// Voltages are in mV, currents in mA, temperatures in deci-°C and times in minutes unless the
/// field name says otherwise. A zero current/voltage for an optional threshold leaves the
/// hardware default in place.
#[derive(Clone, Debug)]
pub struct ChargerConfig {
    pub variant: PmicVariant,
    pub revision: PmicRevision,
    /// Wrap register writes in the low-power-mode lockout sequence.
    pub lpm_workaround: bool,

    pub max_voltage_mv: u16,
    /// Recharge starts this far below the active charge voltage.
    pub resume_voltage_delta_mv: u16,
    pub max_bat_charge_current_ma: u16,
    /// Termination current. Values up to 200 mA are also programmed into ITERM.
    pub term_current_ma: u16,
    /// How far below VDD_MAX the battery may sit and still be considered at end of charge.
    pub vbat_tolerance_mv: u16,

    pub cool_temp_dc: Option<i16>,
    pub warm_temp_dc: Option<i16>,
    pub cool_bat_voltage_mv: u16,
    pub warm_bat_voltage_mv: u16,
    pub cool_bat_charge_current_ma: u16,
    pub warm_bat_charge_current_ma: u16,
    pub cold_threshold: Option<TempThreshold>,
    pub hot_threshold: Option<TempThreshold>,

    /// Fast-charge safety timer; 0 leaves it unprogrammed.
    pub safety_time_min: u16,
    pub ttrkl_time_min: u16,
    pub trkl_voltage_mv: u16,
    pub weak_voltage_mv: u16,
    pub trkl_current_ma: u16,
    pub weak_current_ma: u16,

    /// Accepted battery-id window in µV. Both zero disables the check.
    pub batt_id_min_uv: i64,
    pub batt_id_max_uv: i64,

    /// Input voltage floor; 0 keeps the hardware value.
    pub vin_min_mv: u16,
    /// Input voltage floor while charging wirelessly; 0 disables the override.
    pub vin_min_wlc_mv: u16,
    /// Battery voltage at or above which VIN_MIN is raised to 4400 mV.
    pub regulate_vin_min_thr_mv: u16,
    /// VIN_MIN used below `regulate_vin_min_thr_mv`.
    pub lower_vin_min_mv: u16,

    pub aicl_enabled: bool,
    /// Hard cap on USB input current; 0 disables the cap.
    pub usb_max_current_ma: u16,

    /// Current-based end-of-charge stop; 0 uses the count-only stop.
    pub eoc_ibat_threshold_ma: u16,

    /// Connector resistance for VDD_MAX IR-drop compensation; 0 disables it.
    pub rconn_mohm: u16,
    pub ichg_threshold_ua: i32,
    /// Charge current at or below which VDD_MAX may be raised by `vdd_max_increase_mv`.
    pub ichg_regulation_thr_ua: Option<i32>,
    pub delta_threshold_mv: i32,
    pub vdd_max_increase_mv: u16,

    /// Battery cannot be removed; removal interrupts are ignored.
    pub embedded_battery: bool,
    /// Run the unplug check on the DC path too.
    pub dc_unplug_check: bool,
    /// Keep charging through temperature faults and charge failures (factory use).
    pub keep_charge_on: bool,
    pub disable_reverse_boost_check: bool,
    /// Unmask the USB over/under-voltage lines. Otherwise OVP is only re-read on presence
    /// changes and queries.
    pub usbin_ovp_irqs: bool,

    /// Thermal mitigation current limits indexed by level; level 0 means unrestricted.
    pub thermal_mitigation: Vec<u16, MAX_MITIGATION_LEVELS>,
    /// Bounce attempts for the OVP FET workaround.
    pub open_ovp_counter: u8,
    /// Delay between 20 mV VDD_MAX steps while ramping.
    pub vdd_ramp_step_delay_us: u32,
    /// Period of the charge-failure clear heartbeat, in ms; 0 disables it.
    pub update_time_ms: u32,
}

impl Default for ChargerConfig {
    fn default() -> Self {
        Self {
            variant: PmicVariant::Pm8921,
            revision: PmicRevision::V3,
            lpm_workaround: true,
            max_voltage_mv: 4200,
            resume_voltage_delta_mv: 50,
            max_bat_charge_current_ma: 1025,
            term_current_ma: 100,
            vbat_tolerance_mv: 70,
            cool_temp_dc: Some(100),
            warm_temp_dc: Some(450),
            cool_bat_voltage_mv: 4100,
            warm_bat_voltage_mv: 4000,
            cool_bat_charge_current_ma: 350,
            warm_bat_charge_current_ma: 350,
            cold_threshold: Some(TempThreshold::Low),
            hot_threshold: Some(TempThreshold::High),
            safety_time_min: 510,
            ttrkl_time_min: 64,
            trkl_voltage_mv: 2800,
            weak_voltage_mv: 3200,
            trkl_current_ma: 50,
            weak_current_ma: 325,
            batt_id_min_uv: 0,
            batt_id_max_uv: 0,
            vin_min_mv: 4400,
            vin_min_wlc_mv: 0,
            regulate_vin_min_thr_mv: 0,
            lower_vin_min_mv: 0,
            aicl_enabled: true,
            usb_max_current_ma: 0,
            eoc_ibat_threshold_ma: 0,
            rconn_mohm: 0,
            ichg_threshold_ua: -200_000,
            ichg_regulation_thr_ua: None,
            delta_threshold_mv: -5,
            vdd_max_increase_mv: 20,
            embedded_battery: false,
            dc_unplug_check: false,
            keep_charge_on: false,
            disable_reverse_boost_check: false,
            usbin_ovp_irqs: false,
            thermal_mitigation: Vec::new(),
            open_ovp_counter: 10,
            vdd_ramp_step_delay_us: 0,
            update_time_ms: 60_000,
        }
    }
}

impl ChargerConfig {
    /// USB current above which AICL takes over the ramp.
    pub fn usb_wall_threshold_ma(&self) -> u16 {
        if self.aicl_enabled { USB_MA_TABLE[1] } else { USB_MA_TABLE[7] }
    }

    /// Whether the termination current is programmed into ITERM.
    pub fn uses_hw_iterm(&self) -> bool {
        self.term_current_ma <= crate::registers::ITERM_MAX_MA
    }

    /// Reject settings the engine cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(VDD_MAX_MIN_MV..=VDD_MAX_MAX_MV).contains(&self.max_voltage_mv) {
            return Err(ConfigError::MaxVoltage);
        }
        if let (Some(cool), Some(warm)) = (self.cool_temp_dc, self.warm_temp_dc) {
            if cool >= warm {
                return Err(ConfigError::TemperatureWindow);
            }
        }
        if self.batt_id_min_uv > self.batt_id_max_uv {
            return Err(ConfigError::BatteryIdWindow);
        }
        if self.max_bat_charge_current_ma == 0 {
            return Err(ConfigError::ChargeCurrent);
        }
        Ok(())
    }
}

/// Why a [`ChargerConfig`] was rejected.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfigError {
    MaxVoltage,
    TemperatureWindow,
    BatteryIdWindow,
    ChargeCurrent,
}
