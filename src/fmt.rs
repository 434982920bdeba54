//! Logging shims. Each macro forwards to `defmt` and/or `log` depending on the
//! enabled features and compiles to nothing when neither backend is selected.

#![macro_use]
#![allow(unused_macros)]

macro_rules! trace {
    ($($args:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::trace!($($args)*);
        #[cfg(feature = "log")]
        log::trace!($($args)*);
    }
}

macro_rules! debug {
    ($($args:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::debug!($($args)*);
        #[cfg(feature = "log")]
        log::debug!($($args)*);
    }
}

macro_rules! info {
    ($($args:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::info!($($args)*);
        #[cfg(feature = "log")]
        log::info!($($args)*);
    }
}

macro_rules! warn {
    ($($args:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::warn!($($args)*);
        #[cfg(feature = "log")]
        log::warn!($($args)*);
    }
}

macro_rules! error {
    ($($args:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::error!($($args)*);
        #[cfg(feature = "log")]
        log::error!($($args)*);
    }
}
