//! Battery temperature zones.
//!
//! Outside the normal band the charge voltage and current are derated to the configured warm or
//! cool values. Zone changes are driven by [`Charger::update_battery_temperature`] with a fixed
//! hysteresis, or directly through [`Charger::battery_warm`] and [`Charger::battery_cool`].

use embedded_hal::delay::DelayNs;

use crate::bus::RegisterBus;
use crate::charger::Charger;
use crate::data_types::{GaugeEvent, ThermalZone};
use crate::error::Error;
use crate::platform::Platform;

/// Hysteresis applied when leaving a zone, in deci-°C.
pub const TEMP_HYSTERESIS_DC: i16 = 20;

impl<'a, B, D, P> Charger<'a, B, D, P>
where
    B: RegisterBus,
    D: DelayNs,
    P: Platform,
{
    /// Enter or leave the warm zone.
    pub fn battery_warm(&mut self, enter: bool) -> Result<(), Error<B::Error>> {
        if self.state.is_warm() == enter {
            return Ok(());
        }
        info!("battery warm {}", enter);
        self.state.thermal_zone = if enter { ThermalZone::Warm } else { ThermalZone::Normal };
        let mv = if enter { self.config.warm_bat_voltage_mv } else { self.config.max_voltage_mv };
        self.apply_thermal_zone(mv)
    }

    /// Enter or leave the cool zone.
    pub fn battery_cool(&mut self, enter: bool) -> Result<(), Error<B::Error>> {
        if self.state.is_cool() == enter {
            return Ok(());
        }
        info!("battery cool {}", enter);
        self.state.thermal_zone = if enter { ThermalZone::Cool } else { ThermalZone::Normal };
        let mv = if enter { self.config.cool_bat_voltage_mv } else { self.config.max_voltage_mv };
        self.apply_thermal_zone(mv)
    }

    fn apply_thermal_zone(&mut self, vdd_max_mv: u16) -> Result<(), Error<B::Error>> {
        self.set_appropriate_battery_current()?;
        self.regs.set_max_voltage(vdd_max_mv, self.config.vdd_ramp_step_delay_us)?;
        self.set_appropriate_vbatdet()?;
        self.platform.gauge_event(GaugeEvent::TempZoneChange);
        self.relay_battery_temperature()
    }

    /// Feed a battery temperature reading (deci-°C) through the zone thresholds.
    pub fn update_battery_temperature(&mut self, temp_dc: i16) -> Result<(), Error<B::Error>> {
        if let Some(warm) = self.config.warm_temp_dc {
            if !self.state.is_warm() && temp_dc >= warm {
                self.battery_warm(true)?;
            } else if self.state.is_warm() && temp_dc < warm - TEMP_HYSTERESIS_DC {
                self.battery_warm(false)?;
            }
        }
        if let Some(cool) = self.config.cool_temp_dc {
            if !self.state.is_cool() && temp_dc <= cool {
                self.battery_cool(true)?;
            } else if self.state.is_cool() && temp_dc > cool + TEMP_HYSTERESIS_DC {
                self.battery_cool(false)?;
            }
        }
        Ok(())
    }

    /// Drop back to the normal zone; the next temperature reading re-derives it.
    pub fn reset_thermal_state(&mut self) -> Result<(), Error<B::Error>> {
        self.battery_cool(false)?;
        self.battery_warm(false)
    }
}
