//! Error definitions for the PM8921 charger engine.

use crate::platform::AdcError;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Error<BusError> {
    /// Underlying register transaction failed.
    Bus(BusError),
    /// Provided parameter was outside hardware limits. Nothing was written.
    OutOfRange,
    /// No charger has been installed in the slot yet.
    NotInitialized,
    /// The charge safety timer expired; charging stays off until the source is swapped.
    SafetyTimeout,
    /// Battery identification failed; charging is held off.
    BatteryInvalid,
    /// A measurement needed by the operation could not be taken.
    Adc(AdcError),
    /// Unsupported/invalid configuration.
    InvalidConfig,
    /// A diagnostics writer reported a formatting failure.
    Format,
}

impl<BusError: core::fmt::Debug> core::fmt::Display for Error<BusError> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Bus(e) => write!(f, "register bus error: {:?}", e),
            Error::OutOfRange => write!(f, "parameter out of range"),
            Error::NotInitialized => write!(f, "charger not initialized"),
            Error::SafetyTimeout => write!(f, "charge safety timer expired"),
            Error::BatteryInvalid => write!(f, "battery id out of range"),
            Error::Adc(e) => write!(f, "measurement unavailable: {:?}", e),
            Error::InvalidConfig => write!(f, "invalid charger configuration"),
            Error::Format => write!(f, "diagnostics formatting failed"),
        }
    }
}

impl<BusError> From<AdcError> for Error<BusError> {
    fn from(e: AdcError) -> Self {
        Error::Adc(e)
    }
}

impl<BusError> From<core::fmt::Error> for Error<BusError> {
    fn from(_: core::fmt::Error) -> Self {
        Error::Format
    }
}
