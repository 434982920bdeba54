use embedded_hal_mock::eh1::delay::NoopDelay;
use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTrans};
use pm8921_charger::access::RegisterAccess;
use pm8921_charger::registers::addr;
use pm8921_charger::{Error, I2cBus, OvpPath, PonTime, UsbOvThreshold, UsbOvpDebounce};

const ADDR: u8 = 0x48;

type MockAccess = RegisterAccess<I2cBus<I2cMock>, NoopDelay>;

fn access(expectations: &[I2cTrans]) -> MockAccess {
    RegisterAccess::new(I2cBus::new(I2cMock::new(expectations)), NoopDelay::new(), false)
}

fn finish(regs: MockAccess) {
    let (bus, _) = regs.free();
    bus.free().done();
}

fn rd(reg: u16, value: u8) -> I2cTrans {
    I2cTrans::write_read(ADDR, reg.to_be_bytes().to_vec(), vec![value])
}

fn wr(reg: u16, value: u8) -> I2cTrans {
    let [hi, lo] = reg.to_be_bytes();
    I2cTrans::write(ADDR, vec![hi, lo, value])
}

/// Real-time status read of the USB valid line (block 1, bit 3).
fn usb_valid(valid: bool) -> [I2cTrans; 2] {
    [
        wr(addr::IRQ_BLOCK_SEL, 0x01),
        rd(addr::IRQ_RT_STATUS, if valid { 0x08 } else { 0x00 }),
    ]
}

#[test]
fn voltage_ramp_walks_in_20mv_steps_with_usb_attached() {
    let mut expectations = vec![rd(addr::CHG_VDD_MAX, 0x30)];
    expectations.extend(usb_valid(true));
    expectations.extend([
        wr(addr::CHG_VDD_MAX, 0x31),
        wr(addr::CHG_VDD_MAX, 0x32),
        wr(addr::CHG_VDD_MAX, 0x33),
        wr(addr::CHG_VDD_MAX, 0x33),
    ]);
    let mut regs = access(&expectations);
    regs.set_max_voltage(4260, 0).unwrap();
    finish(regs);
}

#[test]
fn voltage_ramp_down() {
    let mut expectations = vec![rd(addr::CHG_VDD_MAX, 0x30)];
    expectations.extend(usb_valid(true));
    expectations.extend([
        wr(addr::CHG_VDD_MAX, 0x2F),
        wr(addr::CHG_VDD_MAX, 0x2E),
        wr(addr::CHG_VDD_MAX, 0x2E),
    ]);
    let mut regs = access(&expectations);
    regs.set_max_voltage(4160, 0).unwrap();
    finish(regs);
}

#[test]
fn voltage_jumps_straight_to_target_without_usb() {
    let mut expectations = vec![rd(addr::CHG_VDD_MAX, 0x30)];
    expectations.extend(usb_valid(false));
    expectations.push(wr(addr::CHG_VDD_MAX, 0x33));
    let mut regs = access(&expectations);
    regs.set_max_voltage(4260, 0).unwrap();
    finish(regs);
}

#[test]
fn unchanged_voltage_is_not_rewritten() {
    let expectations = [rd(addr::CHG_VDD_MAX, 0x30)];
    let mut regs = access(&expectations);
    regs.set_max_voltage(4200, 0).unwrap();
    finish(regs);
}

#[test]
fn out_of_range_setters_touch_nothing() {
    let mut regs = access(&[]);
    assert_eq!(regs.set_max_voltage(3000, 0), Err(Error::OutOfRange));
    assert_eq!(regs.set_max_current(2100), Err(Error::OutOfRange));
    assert_eq!(regs.set_min_input_voltage(4000), Err(Error::OutOfRange));
    assert_eq!(regs.set_safety_timer(0), Err(Error::OutOfRange));
    assert_eq!(regs.set_usb_current_index(8), Err(Error::OutOfRange));
    assert_eq!(regs.set_termination_current(300), Err(Error::OutOfRange));
    finish(regs);
}

#[test]
fn masked_setters_keep_neighbouring_fields() {
    let expectations = [
        rd(addr::CHG_VIN_MIN, 0xE0),
        wr(addr::CHG_VIN_MIN, 0xE6),
        rd(addr::CHG_IBAT_MAX, 0xC0),
        wr(addr::CHG_IBAT_MAX, 0xD0),
        // Trickle voltage sits in the top nibble, weak voltage in the bottom one.
        rd(addr::CHG_VTRICKLE, 0x0A),
        wr(addr::CHG_VTRICKLE, 0xFA),
    ];
    let mut regs = access(&expectations);
    regs.set_min_input_voltage(4400).unwrap();
    regs.set_max_current(1025).unwrap();
    regs.set_trickle_voltage(2800).unwrap();
    finish(regs);
}

#[test]
fn usb_draw_picks_the_table_step_below() {
    let expectations = [
        rd(addr::CHG_CNTRL_3, 0x04),
        wr(addr::CHG_CNTRL_3, 0x00),
        rd(addr::PBL_ACCESS2, 0x03),
        wr(addr::PBL_ACCESS2, 0x13),
    ];
    let mut regs = access(&expectations);
    regs.draw_usb_current(1000).unwrap();
    finish(regs);
}

#[test]
fn tiny_usb_draw_suspends_the_input() {
    let expectations = [
        rd(addr::PBL_ACCESS2, 0x1F),
        wr(addr::PBL_ACCESS2, 0x03),
        rd(addr::CHG_CNTRL_3, 0x00),
        wr(addr::CHG_CNTRL_3, 0x04),
    ];
    let mut regs = access(&expectations);
    regs.draw_usb_current(2).unwrap();
    finish(regs);
}

#[test]
fn usb_current_reads_back_through_the_table() {
    let expectations = [rd(addr::PBL_ACCESS2, 0x14)];
    let mut regs = access(&expectations);
    assert_eq!(regs.usb_current_ma().unwrap(), 1100);
    finish(regs);
}

#[test]
fn ovp_fet_switches_through_the_test_bank() {
    let expectations = [
        wr(addr::USB_OVP_TEST, 0x30),
        rd(addr::USB_OVP_TEST, 0x30),
        wr(addr::USB_OVP_TEST, 0xB1),
        wr(addr::USB_OVP_TEST, 0x30),
        rd(addr::USB_OVP_TEST, 0xB1),
        wr(addr::USB_OVP_TEST, 0xB0),
    ];
    let mut regs = access(&expectations);
    regs.set_ovp_fet_off(OvpPath::Usb, true).unwrap();
    regs.set_ovp_fet_off(OvpPath::Usb, false).unwrap();
    finish(regs);
}

#[test]
fn pon_time_is_written_with_the_enable_bit() {
    let expectations = [
        wr(addr::CHG_BUCK_CTRL_TEST3, 0x40),
        rd(addr::CHG_BUCK_CTRL_TEST3, 0x4C),
        wr(addr::CHG_BUCK_CTRL_TEST3, 0xC8),
    ];
    let mut regs = access(&expectations);
    regs.set_min_pon_time(PonTime::Ns50).unwrap();
    finish(regs);
}

#[test]
fn usb_ovp_threshold_and_debounce_share_the_control_register() {
    let expectations = [
        rd(addr::USB_OVP_CONTROL, 0x82),
        wr(addr::USB_OVP_CONTROL, 0xE2),
        rd(addr::USB_OVP_CONTROL, 0xE2),
        wr(addr::USB_OVP_CONTROL, 0xE6),
    ];
    let mut regs = access(&expectations);
    regs.set_usb_ov_threshold(UsbOvThreshold::from_mv(7500)).unwrap();
    regs.set_usb_ovp_debounce_time(UsbOvpDebounce::Ms80p5).unwrap();
    finish(regs);
}

#[test]
fn usb_ov_threshold_rounds_down_to_a_trip_point() {
    assert_eq!(UsbOvThreshold::from_mv(4000), UsbOvThreshold::Mv5500);
    assert_eq!(UsbOvThreshold::from_mv(6000), UsbOvThreshold::Mv6000);
    assert_eq!(UsbOvThreshold::from_mv(6999), UsbOvThreshold::Mv6500);
    assert_eq!(UsbOvThreshold::from_mv(7000), UsbOvThreshold::Mv7000);
}
