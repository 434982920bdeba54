mod common;

use common::{bring_up, idle_chip, quiet_config, tick, FakeBus, FakePlatform, RecordingExt};
use pm8921_charger::charger::EOC_CHECK_PERIOD_MS;
use pm8921_charger::registers::{addr, ChgCntrlBits};
use pm8921_charger::{
    BatteryStatus, ChargeType, ChargerConfig, ExtChargerEvent, Irq, PowerSource, SourceDisableReasons, Work,
};

fn usb_attached_chip() -> FakeBus {
    let bus = idle_chip();
    bus.chip().set_rt(Irq::UsbinValid, true);
    bus
}

#[test]
fn registration_starts_the_delegate_when_a_source_is_present() {
    let (mut ext, log) = RecordingExt::new();
    let bus = usb_attached_chip();
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());

    charger.register_external_charger(&mut ext).unwrap();
    assert!(charger.has_external_charger());
    assert_eq!(log.borrow().starts, 1);
    assert!(charger.scheduler().is_pending(Work::Eoc));
    assert_eq!(charger.battery_status().unwrap(), BatteryStatus::Charging);
    assert_eq!(charger.charge_type().unwrap(), ChargeType::Fast);

    charger.charger_enable(false).unwrap();
    assert_eq!(log.borrow().stops, 1);
    assert_eq!(charger.battery_status().unwrap(), BatteryStatus::Discharging);
    assert_eq!(charger.charge_type().unwrap(), ChargeType::None);

    charger.charger_enable(true).unwrap();
    assert_eq!(log.borrow().starts, 2);
}

#[test]
fn delegate_waits_for_a_source() {
    let (mut ext, log) = RecordingExt::new();
    let bus = idle_chip();
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());

    charger.register_external_charger(&mut ext).unwrap();
    assert_eq!(log.borrow().starts, 0);
    assert!(!charger.scheduler().is_pending(Work::Eoc));
}

#[test]
fn registering_on_dc_disconnects_the_internal_path() {
    let (mut ext, log) = RecordingExt::new();
    let bus = idle_chip();
    bus.chip().set_rt(Irq::DcinValid, true);
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());

    charger.register_external_charger(&mut ext).unwrap();
    assert!(charger.source_disable_reasons().contains(SourceDisableReasons::KERNEL_DRIVER));
    assert_ne!(bus.chip().reg(addr::CHG_CNTRL) & ChgCntrlBits::CHARGE_DIS.bits(), 0);
    assert_eq!(log.borrow().starts, 1);
}

#[test]
fn source_selection_is_forwarded_as_a_current_limit() {
    let (mut ext, log) = RecordingExt::new();
    let bus = usb_attached_chip();
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());
    charger.register_external_charger(&mut ext).unwrap();

    charger
        .set_power_source_and_charger_enable(PowerSource::Ac, true, true)
        .unwrap();
    assert_eq!(log.borrow().limits, vec![(PowerSource::Ac, 1500)]);

    charger
        .set_power_source_and_charger_enable(PowerSource::Batt, false, true)
        .unwrap();
    assert_eq!(log.borrow().limits.last(), Some(&(PowerSource::Batt, 0)));
}

#[test]
fn temperature_zone_is_relayed_once_per_change() {
    let (mut ext, log) = RecordingExt::new();
    let bus = usb_attached_chip();
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());
    charger.register_external_charger(&mut ext).unwrap();

    charger.battery_warm(true).unwrap();
    charger.battery_warm(false).unwrap();
    charger.handle_irq(Irq::BatTempOk).unwrap();
    assert_eq!(log.borrow().events, vec![ExtChargerEvent::Warm, ExtChargerEvent::Normal]);

    bus.chip().set_rt(Irq::BatttempCold, true);
    charger.battery_cool(true).unwrap();
    assert_eq!(log.borrow().events.last(), Some(&ExtChargerEvent::Cold));
}

#[test]
fn hot_battery_stops_the_delegate() {
    let (mut ext, log) = RecordingExt::new();
    let bus = usb_attached_chip();
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());
    charger.register_external_charger(&mut ext).unwrap();

    bus.chip().set_rt(Irq::BatttempHot, true);
    charger.handle_irq(Irq::BatttempHot).unwrap();
    assert_eq!(log.borrow().stops, 1);
    assert!(!log.borrow().charging);
}

#[test]
fn delegate_over_voltage_counts_as_ovp() {
    let (mut ext, log) = RecordingExt::new();
    let bus = usb_attached_chip();
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());
    charger.register_external_charger(&mut ext).unwrap();

    assert!(!charger.is_charger_ovp().unwrap());
    log.borrow_mut().ovp = true;
    assert!(charger.is_charger_ovp().unwrap());
}

#[test]
fn end_of_charge_is_reported_to_the_delegate() {
    let (mut ext, log) = RecordingExt::new();
    let bus = usb_attached_chip();
    let config = ChargerConfig {
        vbat_tolerance_mv: 200,
        term_current_ma: 700,
        eoc_ibat_threshold_ma: 650,
        ..quiet_config()
    };
    let platform = FakePlatform {
        vbat_uv: Some(4_000_000),
        ibat_ua: Some(-600_000),
        soc: Some(100),
        ..FakePlatform::default()
    };
    let mut charger = bring_up(&bus, config, platform);
    charger.register_external_charger(&mut ext).unwrap();

    for _ in 0..6 {
        tick(&mut charger, EOC_CHECK_PERIOD_MS as u64);
    }
    assert!(log.borrow().events.contains(&ExtChargerEvent::EocStopCharge));
    assert_eq!(charger.battery_status().unwrap(), BatteryStatus::Full);
    assert_eq!(charger.platform().began, 1);

    bus.chip().set_rt(Irq::VbatdetLow, true);
    charger.handle_irq(Irq::VbatdetLow).unwrap();
    assert_eq!(log.borrow().events.last(), Some(&ExtChargerEvent::EocStartCharge));
    assert!(charger.scheduler().is_pending(Work::Eoc));
}

#[test]
fn delegate_attributes_follow_the_charger_report() {
    let (mut ext, _log) = RecordingExt::new();
    let bus = usb_attached_chip();
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());
    charger.register_external_charger(&mut ext).unwrap();

    let mut buf = [0u8; 4096];
    let len = charger.write_charger_attributes(&mut buf).unwrap();
    let out = core::str::from_utf8(&buf[..len]).unwrap();
    assert!(out.ends_with("EXT_CHARGING(bool): 1;\n"));
}

#[test]
fn unregistering_stops_and_returns_the_delegate() {
    let (mut ext, log) = RecordingExt::new();
    let bus = usb_attached_chip();
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());
    charger.register_external_charger(&mut ext).unwrap();

    let returned = charger.unregister_external_charger().unwrap();
    assert!(returned.is_some());
    assert!(!charger.has_external_charger());
    assert_eq!(log.borrow().stops, 1);
}
