mod common;

use common::{bring_up, charging_chip, idle_chip, quiet_config, FakePlatform, RecordingExt};
use pm8921_charger::Error;

fn text(buf: &[u8], len: usize) -> &str {
    core::str::from_utf8(&buf[..len]).unwrap()
}

#[test]
fn charger_report_lists_state_lines_and_registers() {
    let bus = charging_chip();
    bus.chip().loops = 0x08;
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());

    let mut buf = [0u8; 4096];
    let len = charger.write_charger_attributes(&mut buf).unwrap();
    let out = text(&buf, len);

    assert!(out.starts_with("FSM: 7;\n"));
    assert!(out.contains("FASTCHG_IRQ: 1;\n"));
    assert!(out.contains("USBIN_VALID_IRQ: 0;\n"));
    assert!(out.contains("REGULATION_LOOP: 0x08;\n"));
    assert!(out.contains("USBIN(uV): 5000000;\n"));
    assert!(out.contains("eoc_count/by_curr(int): 0/0;\n"));
    assert!(out.contains("CHG_VDD_MAX: 0x30;\n"));
    assert!(out.contains("last_delta_batt_terminal_mv: 0;\n"));
    assert!(out.ends_with("CHG_BUCK_CTRL_TEST3: 0x91;\n"));
    assert!(!out.contains("is_wlc_remove"));
}

#[test]
fn wireless_pin_line_appears_only_when_wired() {
    let bus = idle_chip();
    let platform = FakePlatform {
        wireless_tx_pin: Some(true),
        ..FakePlatform::default()
    };
    let mut charger = bring_up(&bus, quiet_config(), platform);

    let mut buf = [0u8; 4096];
    let len = charger.write_charger_attributes(&mut buf).unwrap();
    assert!(text(&buf, len).contains("is_wlc_remove(bool): 1;\n"));
}

#[test]
fn external_charger_lines_close_the_report() {
    let (mut ext, log) = RecordingExt::new();
    let bus = charging_chip();
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());
    charger.register_external_charger(&mut ext).unwrap();

    let mut buf = [0u8; 4096];
    let len = charger.write_charger_attributes(&mut buf).unwrap();
    assert!(text(&buf, len).ends_with("EXT_CHARGING(bool): 0;\n"));

    log.borrow_mut().fail_attributes = true;
    assert_eq!(charger.write_charger_attributes(&mut buf), Err(Error::Format));
}

#[test]
fn short_buffer_truncates_silently() {
    let bus = charging_chip();
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());

    let mut buf = [0u8; 16];
    let len = charger.write_charger_attributes(&mut buf).unwrap();
    assert_eq!(len, 16);
    assert_eq!(&buf[..8], b"FSM: 7;\n");
    assert_eq!(&buf[8..], b"ATCDONE_");
}

#[test]
fn gauge_report_uses_placeholders_for_missing_readings() {
    let bus = idle_chip();
    let platform = FakePlatform {
        soc: None,
        vbat_uv: None,
        ..FakePlatform::default()
    };
    let mut charger = bring_up(&bus, quiet_config(), platform);

    let mut buf = [0u8; 1024];
    let len = charger.write_gauge_attributes(&mut buf).unwrap();
    let out = text(&buf, len);
    assert!(out.starts_with("SOC(%): -1;\n"));
    assert!(out.contains("VBAT(uV): 0;\n"));
    assert!(out.contains("IBAT(uA): -500000;\n"));
    assert!(out.contains("BATT_TEMP(deci-celsius): 250;\n"));
    assert!(out.contains("BATT_PRESENT(bool): 1;\n"));
    assert!(out.contains("FCC(uAh): 2000000;\n"));
    assert!(out.ends_with("usb_target_ma/usb_aicl_max_ma(mA): 0/0;\n"));
}

#[test]
fn gauge_report_reflects_the_thermal_zone() {
    let bus = idle_chip();
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());
    charger.battery_warm(true).unwrap();

    let mut buf = [0u8; 1024];
    let len = charger.write_gauge_attributes(&mut buf).unwrap();
    let out = text(&buf, len);
    assert!(out.contains("SOC(%): 80;\n"));
    assert!(out.contains("is_bat_warm(bool): 1;\n"));
    assert!(out.contains("is_bat_cool(bool): 0;\n"));
}
