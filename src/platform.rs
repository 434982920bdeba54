//! Narrow interfaces to the rest of the platform.
//!
//! The charger engine never talks to the ADC, fuel gauge, GPIO or notification plumbing
//! directly. Boards implement these traits (usually on one context struct) and hand them to
//! [`crate::ChargerBuilder`].

use crate::data_types::{
    AdcChannel, BatteryStatus, ChargerEvent, ExtChargerEvent, GaugeEvent, GpioPin, Irq, PowerSource, WakeLock,
};

/// Reasons an analog measurement can be unavailable.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AdcError {
    /// The conversion did not complete.
    Timeout,
    /// The channel is not wired on this board.
    Unavailable,
}

/// One ADC conversion.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AdcReading {
    /// Scaled value in the channel's physical unit (see [`AdcChannel`]).
    pub physical: i64,
    /// Raw converter output.
    pub raw: i64,
}

/// Monotonic millisecond time base.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

pub trait Adc {
    fn read_channel(&mut self, channel: AdcChannel) -> Result<AdcReading, AdcError>;
}

/// Battery monitoring system.
pub trait FuelGauge {
    fn charging_began(&mut self);

    fn charging_ended(&mut self, is_full: bool);

    /// State of charge, 0-100.
    fn percent_charge(&mut self) -> Option<u8>;

    /// Battery current in µA. Positive while discharging.
    fn battery_current_ua(&mut self) -> Option<i32>;

    fn full_charge_capacity_uah(&mut self) -> Option<i32> {
        None
    }
}

/// Board GPIO lookups. `None` means the pin is not wired.
pub trait Gpio {
    fn get_value(&mut self, pin: GpioPin) -> Option<bool>;

    fn set_value(&mut self, _pin: GpioPin, _value: bool) {}
}

/// Fire-and-forget notifications towards the rest of the system.
pub trait Notifier {
    fn charger_event(&mut self, event: ChargerEvent);

    fn gauge_event(&mut self, event: GaugeEvent);

    fn wake_lock(&mut self, _lock: WakeLock, _held: bool) {}

    /// Display state; AICL holds back above 1100 mA while the screen is on.
    fn screen_on(&self) -> bool {
        false
    }
}

/// Per-line interrupt masking.
pub trait InterruptControl {
    fn set_irq_enabled(&mut self, _irq: Irq, _enabled: bool) {}
}

/// Everything the engine needs from the board, bundled.
pub trait Platform: Clock + Adc + FuelGauge + Gpio + Notifier + InterruptControl {}

impl<T> Platform for T where T: Clock + Adc + FuelGauge + Gpio + Notifier + InterruptControl {}

/// A charger IC that takes over battery charging from the PMIC.
pub trait ExternalCharger {
    fn start_charging(&mut self);

    fn stop_charging(&mut self);

    fn is_charging(&mut self) -> bool;

    fn set_current_limit(&mut self, source: PowerSource, ma: u16);

    fn status(&mut self) -> BatteryStatus;

    fn event_notify(&mut self, event: ExtChargerEvent);

    fn is_trickle(&mut self) -> bool {
        false
    }

    fn is_ovp(&mut self) -> bool {
        false
    }

    /// Append `KEY: value;` diagnostics lines.
    fn write_attributes(&mut self, _out: &mut dyn core::fmt::Write) -> core::fmt::Result {
        Ok(())
    }
}
