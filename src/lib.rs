//! PM8921 charger control engine.
//!
//! Drives the charger block of the Qualcomm PM8921/PM8917 PMIC: register access with the
//! low-power-mode lockout workaround, parameter programming, interrupt dispatch, and the
//! software control loops the hardware needs around it (end of charge, AICL, reverse boost,
//! OVP FET bounce, VDD_MAX compensation, thermal derating). Battery charging can be handed
//! to an external charger IC.
//!
//! The crate is `no_std`. Board services (ADC, fuel gauge, GPIO, notifications, clock) are
//! consumed through the traits in [`platform`]; register I/O goes through [`bus::RegisterBus`].
//! Logging goes to `defmt` or `log` when the matching feature is enabled.

#![no_std]

#[macro_use]
mod fmt;

pub mod access;
pub mod bus;
pub mod charger;
pub mod config;
pub mod data_types;
pub mod eoc;
pub mod error;
pub mod irq;
pub mod params;
pub mod platform;
pub mod registers;
pub mod scheduler;
#[cfg(feature = "async")]
pub mod service;
pub mod slot;
pub mod telemetry;
pub mod thermal;
pub mod unplug;
pub mod votes;

pub use bus::{I2cBus, RegisterBus};
pub use charger::{Charger, ChargerBuilder, ChargerState};
pub use config::{ChargerConfig, ConfigError, PmicRevision, PmicVariant};
pub use data_types::*;
pub use error::Error;
pub use platform::{
    Adc, AdcError, AdcReading, Clock, ExternalCharger, FuelGauge, Gpio, InterruptControl, Notifier, Platform,
};
pub use registers::DEFAULT_I2C_ADDRESS;
pub use scheduler::{CancelToken, Scheduler, Work};
pub use slot::ChargerSlot;
pub use votes::{BatteryDisableReasons, SourceDisableReasons};
