//! Register map and constants for the PM8921 charger block.
//! Addresses are 16-bit SSBI offsets; every register is 8 bits wide.

/// 7-bit I2C address used by [`crate::bus::I2cBus`] when the PMIC sits behind an I2C bridge.
pub const DEFAULT_I2C_ADDRESS: u8 = 0x48;

/// Register addresses.
pub mod addr {
    /// PMIC sub-revision (bit 0 selects the 3.0 buck workaround value).
    pub const PM_SUB_REV: u16 = 0x001;
    /// Active power path (USB/DC).
    pub const PBL_ACCESS1: u16 = 0x04;
    /// IUSB selection and enumeration timer.
    pub const PBL_ACCESS2: u16 = 0x05;
    pub const SYS_CONFIG_1: u16 = 0x06;
    /// Boot-done handshake.
    pub const SYS_CONFIG_2: u16 = 0x07;
    pub const CHG_BUCK_CLOCK_CTRL: u16 = 0x14;

    /// Interrupt controller block select.
    pub const IRQ_BLOCK_SEL: u16 = 0x1C0;
    /// Real-time status of the selected interrupt block.
    pub const IRQ_RT_STATUS: u16 = 0x1C3;

    pub const CHG_CNTRL: u16 = 0x204;
    pub const CHG_IBAT_MAX: u16 = 0x205;
    /// Test/bank access register; also the low-power-mode clock override.
    pub const CHG_TEST: u16 = 0x206;
    pub const CHG_BUCK_CTRL_TEST1: u16 = 0x207;
    pub const CHG_BUCK_CTRL_TEST2: u16 = 0x208;
    pub const CHG_BUCK_CTRL_TEST3: u16 = 0x209;
    /// Comparator override (bat-gone debounce, charger-hot override).
    pub const COMPARATOR_OVERRIDE: u16 = 0x20A;
    pub const PSI_TXRX_SAMPLE_DATA_0: u16 = 0x20B;
    pub const PSI_TXRX_SAMPLE_DATA_1: u16 = 0x20C;
    pub const PSI_TXRX_SAMPLE_DATA_2: u16 = 0x20D;
    pub const PSI_TXRX_SAMPLE_DATA_3: u16 = 0x20E;
    pub const PSI_CONFIG_STATUS: u16 = 0x20F;
    pub const CHG_IBAT_SAFE: u16 = 0x210;
    pub const CHG_ITRICKLE: u16 = 0x211;
    pub const CHG_CNTRL_2: u16 = 0x212;
    pub const CHG_VBAT_DET: u16 = 0x213;
    pub const CHG_VTRICKLE: u16 = 0x214;
    pub const CHG_ITERM: u16 = 0x215;
    pub const CHG_CNTRL_3: u16 = 0x216;
    pub const CHG_VIN_MIN: u16 = 0x217;
    pub const CHG_TWDOG: u16 = 0x218;
    pub const CHG_TTRKL_MAX: u16 = 0x219;
    pub const CHG_TEMP_THRESH: u16 = 0x21A;
    pub const CHG_TCHG_MAX: u16 = 0x21B;
    pub const USB_OVP_CONTROL: u16 = 0x21C;
    pub const DC_OVP_CONTROL: u16 = 0x21D;
    pub const USB_OVP_TEST: u16 = 0x21E;
    pub const DC_OVP_TEST: u16 = 0x21F;
    pub const CHG_VDD_MAX: u16 = 0x220;
    pub const CHG_VDD_SAFE: u16 = 0x221;
}

/// Values written to `CHG_TEST`.
pub mod test_cmd {
    /// Low-power-mode override: no clock forcing.
    pub const LPM_NO_CLOCKS: u8 = 0xD1;
    /// Force the 19.2 MHz clock on.
    pub const LPM_FORCE_19P2MHZ: u8 = 0xD3;
    /// Kick the 19.2 MHz oscillator.
    pub const LPM_KICK_19P2MHZ: u8 = 0xD5;
    /// Return clock selection to hardware.
    pub const LPM_HW_CLOCK: u8 = 0xD0;
    /// Latch the FSM state for readback.
    pub const CAPTURE_FSM_STATE: u8 = 0xC2;
    pub const READ_BANK_4: u8 = 0x40;
    pub const READ_BANK_6: u8 = 0x60;
    pub const READ_BANK_7: u8 = 0x70;
}

/// Values written to the buck test registers.
pub mod buck_test {
    /// Disable the input current limit.
    pub const INPUT_LIMIT_DISABLE: u8 = 0xF2;
    /// Bank select for the minimum PON time field.
    pub const PON_TIME_BANK: u8 = 0x40;
    pub const PON_TIME_MASK: u8 = 0x0C;
    pub const PON_TIME_25NS: u8 = 0x04;
    pub const PON_TIME_50NS: u8 = 0x08;
    pub const PON_TIME_100NS: u8 = 0x0C;
    pub const WRITE_ENABLE: u8 = 0x80;
    /// Rev 3.0 buck compensation, selected by `PM_SUB_REV` bit 0.
    pub const REV3_SUB1: u8 = 0xA4;
    pub const REV3_SUB0: u8 = 0xAC;
    /// Pre-2.0 silicon fixups.
    pub const REV1_TEST2: u8 = 0xF1;
    pub const REV1_TEST3_A: u8 = 0xCE;
    pub const REV1_TEST3_B: u8 = 0xD8;
    pub const LOOP_COMPENSATION: u8 = 0xD9;
    /// Stop the hardware FSM from acting on end-of-charge by itself.
    pub const EOC_FSM_DISABLE: u8 = 0x91;
}

/// Pre-2.0 battery-id fixup written to the PSI block.
pub mod psi {
    pub const SAMPLE_FILL: u8 = 0xFF;
    pub const CONFIG_ENABLE: u8 = 0x0D;
    pub const CONFIG_IDLE: u8 = 0x0C;
}

/// Values written to `COMPARATOR_OVERRIDE`.
pub mod comparator {
    pub const BAT_GONE_DEBOUNCE_BYPASS: u8 = 0x89;
    pub const BAT_GONE_DEBOUNCE_NORMAL: u8 = 0x88;
    pub const CHG_NOT_HOT: u8 = 0x92;
}

/// OVP test-register bank used to switch the OVP FET.
pub const OVP_TEST_BANK: u8 = 0x30;
/// OVP debounce field in the OVP control registers.
pub const OVP_DEBOUNCE_MASK: u8 = 0x06;
pub const OVP_DEBOUNCE_SHIFT: u8 = 1;
pub const OVP_DEBOUNCE_DEFAULT: u8 = 0x02;
/// USB over-voltage trip point field in `USB_OVP_CONTROL`.
pub const USB_OV_THRESHOLD_MASK: u8 = 0x60;
pub const USB_OV_THRESHOLD_SHIFT: u8 = 5;
/// USB OVP disable bit in `USB_OVP_CONTROL`.
pub const USB_OVP_DISABLE_MASK: u8 = 0x80;
/// Value written to `CHG_BUCK_CLOCK_CTRL` during bring-up.
pub const BUCK_CLOCK_CTRL_DEFAULT: u8 = 0x15;

/// Interrupt controller position of the first charger interrupt (block 1, bit 3).
pub const CHG_IRQ_BASE: u8 = 8 + 3;

/// Charge voltage DAC (VDD_MAX, VDD_SAFE, VBAT_DET).
pub const V_MIN_MV: u16 = 3240;
pub const V_STEP_MV: u16 = 20;
pub const V_MASK: u8 = 0x7F;
pub const V_HALF_STEP_BIT: u8 = 0x80;
pub const VDD_MAX_MIN_MV: u16 = 3400;
pub const VDD_MAX_MAX_MV: u16 = 4500;
pub const VDD_SAFE_MIN_MV: u16 = 3400;
pub const VDD_SAFE_MAX_MV: u16 = 4500;
pub const VBAT_DET_MIN_MV: u16 = 3240;
/// Highest VBAT_DET setting, used to park the recharge comparator.
pub const VBAT_DET_MAX_MV: u16 = 5780;

/// Battery current DAC (IBAT_MAX, IBAT_SAFE).
pub const I_MIN_MA: u16 = 225;
pub const I_STEP_MA: u16 = 50;
pub const I_MASK: u8 = 0x3F;
pub const IBAT_MAX_MAX_MA: u16 = 2000;
pub const IBAT_SAFE_MAX_MA: u16 = 3375;

pub const ITERM_MIN_MA: u16 = 50;
pub const ITERM_MAX_MA: u16 = 200;
pub const ITERM_STEP_MA: u16 = 10;
pub const ITERM_MASK: u8 = 0x0F;

pub const VIN_MIN_BASE_MV: u16 = 3800;
pub const VIN_MIN_STEP_MV: u16 = 100;
pub const VIN_MIN_USABLE_MIN_MV: u16 = 4300;
pub const VIN_MIN_USABLE_MAX_MV: u16 = 6500;
pub const VIN_MIN_MASK: u8 = 0x1F;

pub const IUSB_MASK: u8 = 0x1C;
pub const IUSB_SHIFT: u8 = 2;
pub const IUSB_MAX_INDEX: u8 = 7;

pub const WDOG_MASK: u8 = 0x1F;

pub const TCHG_MIN: u16 = 4;
pub const TCHG_MAX: u16 = 512;
pub const TCHG_STEP: u16 = 4;
pub const TCHG_MASK: u8 = 0x7F;

pub const TTRKL_MIN: u16 = 1;
pub const TTRKL_MAX: u16 = 64;
pub const TTRKL_MASK: u8 = 0x3F;

pub const VTRKL_MIN_MV: u16 = 2050;
pub const VTRKL_MAX_MV: u16 = 2800;
pub const VTRKL_STEP_MV: u16 = 50;
pub const VTRKL_SHIFT: u8 = 4;
pub const VTRKL_MASK: u8 = 0xF0;

pub const VWEAK_MIN_MV: u16 = 2100;
pub const VWEAK_MAX_MV: u16 = 3600;
pub const VWEAK_STEP_MV: u16 = 100;
pub const VWEAK_MASK: u8 = 0x0F;

pub const ITRKL_MIN_MA: u16 = 50;
pub const ITRKL_MAX_MA: u16 = 200;
pub const ITRKL_STEP_MA: u16 = 10;
pub const ITRKL_MASK: u8 = 0x0F;

pub const IWEAK_MIN_MA: u16 = 325;
pub const IWEAK_MAX_MA: u16 = 525;
pub const IWEAK_MASK: u8 = 0x80;

/// Input current steps selectable through IUSB, in mA.
pub const USB_MA_TABLE: [u16; 8] = [100, 500, 700, 850, 900, 1100, 1300, 1500];

bitflags::bitflags! {
    /// CHG_CNTRL register bits (0x204).
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct ChgCntrlBits: u8 {
        /// Bit 7: Keep the battery thermistor reference powered.
        const VREF_BATT_THERM_FORCE_ON = 1 << 7;
        /// Bit 2: Allow the charger to enter low-power mode.
        const LPM_ENABLE = 1 << 2;
        /// Bit 1: Disconnect the input power source.
        const CHARGE_DIS = 1 << 1;
    }

    /// CHG_CNTRL_2 register bits (0x212).
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct ChgCntrl2Bits: u8 {
        /// Bit 2: Ignore battery temperature protection.
        const BAT_TEMP_DIS = 1 << 2;
        /// Bit 1: Cold threshold select (0 = low, 1 = high).
        const TEMP_THR_COLD = 1 << 1;
        /// Bit 0: Hot threshold select (0 = low, 1 = high).
        const TEMP_THR_HOT = 1 << 0;
    }

    /// CHG_CNTRL_3 register bits (0x216).
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct ChgCntrl3Bits: u8 {
        /// Bit 7: Battery FET charging enable.
        const CHG_EN = 1 << 7;
        /// Bit 2: Suspend the USB input.
        const USB_SUSPEND = 1 << 2;
        /// Bit 1: Clear a latched auto-trickle failure.
        const ATC_FAILED_CLEAR = 1 << 1;
        /// Bit 0: Clear a latched charge failure.
        const CHG_FAILED_CLEAR = 1 << 0;
    }

    /// PBL_ACCESS1 register bits (0x04).
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct PblAccess1Bits: u8 {
        const DC_ACTIVE = 1 << 6;
        const USB_ACTIVE = 1 << 5;
    }

    /// PBL_ACCESS2 register bits (0x05). Bits 4-2 hold the IUSB index.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct PblAccess2Bits: u8 {
        const ENUM_TIMER_STOP = 1 << 1;
    }

    /// SYS_CONFIG_2 register bits (0x07).
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct SysConfig2Bits: u8 {
        const BOOT_DONE = 1 << 6;
    }

    /// Regulation loops reported through bank 6 of `CHG_TEST`.
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct RegulationLoops: u8 {
        const VDD = 1 << 3;
        const BAT_CURRENT = 1 << 2;
        const INPUT_CURRENT = 1 << 1;
        const INPUT_VOLTAGE = 1 << 0;
    }
}

/// Encode a VDD_MAX voltage. Odd 10 mV settings use the half-step bit.
pub fn vdd_max_mv_to_code(mv: u16) -> Option<u8> {
    if !(VDD_MAX_MIN_MV..=VDD_MAX_MAX_MV).contains(&mv) {
        return None;
    }
    let offset = mv - V_MIN_MV;
    let mut code = (offset / V_STEP_MV) as u8;
    if offset % V_STEP_MV >= 10 {
        code |= V_HALF_STEP_BIT;
    }
    Some(code)
}

/// Decode a VDD_MAX register value.
pub fn code_to_vdd_max_mv(code: u8) -> u16 {
    let mut mv = (code & V_MASK) as u16 * V_STEP_MV + V_MIN_MV;
    if code & V_HALF_STEP_BIT != 0 {
        mv += 10;
    }
    mv
}

/// Encode a VDD_SAFE voltage (20 mV steps, no half step).
pub fn vdd_safe_mv_to_code(mv: u16) -> Option<u8> {
    if !(VDD_SAFE_MIN_MV..=VDD_SAFE_MAX_MV).contains(&mv) {
        return None;
    }
    Some(((mv - V_MIN_MV) / V_STEP_MV) as u8)
}

/// Encode a VBAT_DET (recharge comparator) voltage.
pub fn vbat_det_mv_to_code(mv: u16) -> Option<u8> {
    if !(VBAT_DET_MIN_MV..=VBAT_DET_MAX_MV).contains(&mv) {
        return None;
    }
    Some(((mv - V_MIN_MV) / V_STEP_MV) as u8)
}

/// Decode a VDD_SAFE / VBAT_DET register value.
pub fn code_to_v_mv(code: u8) -> u16 {
    (code & V_MASK) as u16 * V_STEP_MV + V_MIN_MV
}

/// Encode an IBAT_MAX current.
pub fn ibat_max_ma_to_code(ma: u16) -> Option<u8> {
    if !(I_MIN_MA..=IBAT_MAX_MAX_MA).contains(&ma) {
        return None;
    }
    Some(((ma - I_MIN_MA) / I_STEP_MA) as u8)
}

/// Encode an IBAT_SAFE current.
pub fn ibat_safe_ma_to_code(ma: u16) -> Option<u8> {
    if !(I_MIN_MA..=IBAT_SAFE_MAX_MA).contains(&ma) {
        return None;
    }
    Some(((ma - I_MIN_MA) / I_STEP_MA) as u8)
}

/// Decode an IBAT_MAX / IBAT_SAFE register value.
pub fn code_to_ibat_ma(code: u8) -> u16 {
    (code & I_MASK) as u16 * I_STEP_MA + I_MIN_MA
}

pub fn iterm_ma_to_code(ma: u16) -> Option<u8> {
    if !(ITERM_MIN_MA..=ITERM_MAX_MA).contains(&ma) {
        return None;
    }
    Some(((ma - ITERM_MIN_MA) / ITERM_STEP_MA) as u8)
}

pub fn code_to_iterm_ma(code: u8) -> u16 {
    (code & ITERM_MASK) as u16 * ITERM_STEP_MA + ITERM_MIN_MA
}

/// Encode the input voltage floor (VIN_MIN).
pub fn vin_min_mv_to_code(mv: u16) -> Option<u8> {
    if !(VIN_MIN_USABLE_MIN_MV..=VIN_MIN_USABLE_MAX_MV).contains(&mv) {
        return None;
    }
    Some(((mv - VIN_MIN_BASE_MV) / VIN_MIN_STEP_MV) as u8)
}

pub fn code_to_vin_min_mv(code: u8) -> u16 {
    VIN_MIN_BASE_MV + (code & VIN_MIN_MASK) as u16 * VIN_MIN_STEP_MV
}

/// Encode the fast-charge safety timer, in minutes.
pub fn tchg_min_to_code(minutes: u16) -> Option<u8> {
    if !(TCHG_MIN..=TCHG_MAX).contains(&minutes) {
        return None;
    }
    Some(((minutes - 1) / TCHG_STEP) as u8)
}

/// Encode the trickle-charge timer, in minutes.
pub fn ttrkl_min_to_code(minutes: u16) -> Option<u8> {
    if !(TTRKL_MIN..=TTRKL_MAX).contains(&minutes) {
        return None;
    }
    Some((minutes - 1) as u8)
}

/// Encode the trickle voltage threshold; the result is already shifted into bits 7-4.
pub fn vtrkl_mv_to_code(mv: u16) -> Option<u8> {
    if !(VTRKL_MIN_MV..=VTRKL_MAX_MV).contains(&mv) {
        return None;
    }
    Some((((mv - VTRKL_MIN_MV) / VTRKL_STEP_MV) as u8) << VTRKL_SHIFT)
}

pub fn vweak_mv_to_code(mv: u16) -> Option<u8> {
    if !(VWEAK_MIN_MV..=VWEAK_MAX_MV).contains(&mv) {
        return None;
    }
    Some(((mv - VWEAK_MIN_MV) / VWEAK_STEP_MV) as u8)
}

pub fn itrkl_ma_to_code(ma: u16) -> Option<u8> {
    if !(ITRKL_MIN_MA..=ITRKL_MAX_MA).contains(&ma) {
        return None;
    }
    Some(((ma - ITRKL_MIN_MA) / ITRKL_STEP_MA) as u8)
}

/// Weak-battery current has two settings; 525 mA sets bit 7.
pub fn iweak_ma_to_code(ma: u16) -> Option<u8> {
    if !(IWEAK_MIN_MA..=IWEAK_MAX_MA).contains(&ma) {
        return None;
    }
    Some(if ma >= IWEAK_MAX_MA { IWEAK_MASK } else { 0 })
}

/// Largest IUSB index whose current does not exceed `ma` (index 0 below the floor).
pub fn find_usb_ma_index(ma: u16) -> usize {
    USB_MA_TABLE.iter().rposition(|&step| step <= ma).unwrap_or(0)
}

/// One IUSB step below `index`, clamped at the floor.
pub fn decrease_usb_ma_index(index: usize) -> usize {
    index.saturating_sub(1)
}

/// One IUSB step above `index`, clamped at the top of the table.
pub fn increase_usb_ma_index(index: usize) -> usize {
    (index + 1).min(USB_MA_TABLE.len() - 1)
}

/// Interrupt-controller block and bit for a charger interrupt index.
pub fn irq_block_and_bit(index: u8) -> (u8, u8) {
    let n = CHG_IRQ_BASE + index;
    (n / 8, n % 8)
}
