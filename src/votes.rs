//! Reference-counted disable votes.
//!
//! Both the input power path and the battery FET can be turned off for several independent
//! reasons. Each side keeps the set of active reasons; the hardware bit follows "set is
//! non-empty", so one caller re-enabling never overrides another caller's disable.

use bitflags::Flags;

bitflags::bitflags! {
    /// Reasons the input power source is disconnected (CHG_CNTRL CHARGE_DIS).
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct SourceDisableReasons: u8 {
        const KERNEL_DRIVER = 1 << 0;
        const USER = 1 << 1;
        /// Held briefly while AICL steps the input current down.
        const AICL = 1 << 2;
    }

    /// Reasons battery charging is turned off (CHG_CNTRL_3 CHG_EN).
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct BatteryDisableReasons: u8 {
        const EOC = 1 << 0;
        const KERNEL_DRIVER = 1 << 1;
        const USER1 = 1 << 2;
        const USER2 = 1 << 3;
        const BATTERY_INVALID = 1 << 4;
    }
}

/// Set of active disable reasons. Owned by the charger and changed only through `&mut` borrows.
#[derive(Clone, Copy, Debug)]
pub struct DisableVotes<F> {
    reasons: F,
}

impl<F: Flags + Copy> DisableVotes<F> {
    pub fn new() -> Self {
        Self { reasons: F::empty() }
    }

    /// Add or withdraw one reason. Returns whether the path must now be disabled.
    pub fn vote(&mut self, reason: F, disable: bool) -> bool {
        self.reasons.set(reason, disable);
        !self.reasons.is_empty()
    }

    pub fn reasons(&self) -> F {
        self.reasons
    }

    pub fn contains(&self, reason: F) -> bool {
        self.reasons.contains(reason)
    }

    pub fn is_disabled(&self) -> bool {
        !self.reasons.is_empty()
    }
}

impl<F: Flags + Copy> Default for DisableVotes<F> {
    fn default() -> Self {
        Self::new()
    }
}
