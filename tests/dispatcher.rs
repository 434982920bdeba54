mod common;

use common::{bring_up, charging_chip, idle_chip, plug_wall_adapter, quiet_config, FakePlatform};
use pm8921_charger::registers::{addr, comparator, ChgCntrl3Bits, ChgCntrlBits};
use pm8921_charger::{
    AdcError, BatteryDisableReasons, BatteryStatus, ChargeSource, ChargeType, ChargerConfig, ChargerEvent, Error,
    GaugeEvent, Irq, PowerSource, WakeLock, Work,
};

#[test]
fn masked_lines_are_ignored_until_unmasked() {
    let bus = idle_chip();
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());

    charger.handle_irq(Irq::LoopChange).unwrap();
    assert!(!charger.scheduler().is_pending(Work::UnplugCheck));

    bus.chip().set_rt(Irq::UsbinValid, true);
    charger.suspend().unwrap();
    charger.handle_irq(Irq::LoopChange).unwrap();
    assert_eq!(charger.scheduler().deadline(Work::UnplugCheck), Some(1_000));

    charger.resume().unwrap();
    assert_eq!(charger.platform().irq_enables.last(), Some(&(Irq::LoopChange, false)));
}

#[test]
fn bring_up_unmasks_the_standard_set() {
    let bus = idle_chip();
    let charger = bring_up(&bus, quiet_config(), FakePlatform::default());
    let enabled = &charger.platform().irq_enables;
    for irq in [Irq::UsbinValid, Irq::DcinValid, Irq::Fastchg, Irq::BattRemoved, Irq::BattInserted] {
        assert!(enabled.contains(&(irq, true)));
    }
    assert!(!enabled.contains(&(Irq::ChgGone, true)));
    assert!(!enabled.contains(&(Irq::UsbinOv, true)));

    let bus = idle_chip();
    let config = ChargerConfig {
        embedded_battery: true,
        ..quiet_config()
    };
    let charger = bring_up(&bus, config, FakePlatform::default());
    assert!(!charger.platform().irq_enables.contains(&(Irq::BattRemoved, true)));
}

#[test]
fn usb_comparators_latch_ovp_and_uvp() {
    let bus = idle_chip();
    let config = ChargerConfig {
        usbin_ovp_irqs: true,
        ..quiet_config()
    };
    let mut charger = bring_up(&bus, config, FakePlatform::default());

    bus.chip().set_rt(Irq::UsbinOv, true);
    charger.handle_irq(Irq::UsbinOv).unwrap();
    assert!(charger.state().ovp);
    assert_eq!(charger.platform().count_charger_event(ChargerEvent::Ovp), 1);

    {
        let mut chip = bus.chip();
        chip.set_rt(Irq::UsbinOv, false);
        chip.set_rt(Irq::UsbinUv, true);
    }
    charger.handle_irq(Irq::UsbinUv).unwrap();
    assert!(charger.state().uvp);
    assert!(!charger.state().ovp);
    assert_eq!(charger.platform().count_charger_event(ChargerEvent::OvpResolve), 1);

    bus.chip().set_rt(Irq::UsbinUv, false);
    charger.handle_irq(Irq::UsbinUv).unwrap();
    assert!(!charger.state().uvp);
    assert_eq!(charger.platform().count_charger_event(ChargerEvent::OvpResolve), 1);
}

#[test]
fn ovp_query_rereads_the_comparators() {
    let bus = idle_chip();
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());

    bus.chip().set_rt(Irq::UsbinOv, true);
    charger.handle_irq(Irq::UsbinOv).unwrap();
    assert!(!charger.state().ovp);
    assert!(charger.is_charger_ovp().unwrap());
}

#[test]
fn safety_timer_expiry_latches_on_ac() {
    let bus = idle_chip();
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());
    plug_wall_adapter(&bus, &mut charger);

    charger.handle_irq(Irq::Chgfail).unwrap();
    assert!(charger.is_safety_timeout());
    assert_eq!(charger.platform().count_charger_event(ChargerEvent::SafetyTimeout), 1);
    assert_eq!(charger.charger_enable(true), Err(Error::SafetyTimeout));

    charger
        .set_power_source_and_charger_enable(PowerSource::Batt, false, true)
        .unwrap();
    assert!(!charger.is_safety_timeout());
}

#[test]
fn long_safety_timer_gets_a_second_run() {
    let bus = idle_chip();
    let config = ChargerConfig {
        safety_time_min: 600,
        ..quiet_config()
    };
    let mut charger = bring_up(&bus, config, FakePlatform::default());
    plug_wall_adapter(&bus, &mut charger);

    bus.chip().writes.clear();
    charger.handle_irq(Irq::Chgfail).unwrap();
    assert!(!charger.is_safety_timeout());
    assert!(charger.state().safety_timeout_twice);
    let clear = ChgCntrl3Bits::CHG_FAILED_CLEAR.bits();
    assert!(bus.chip().writes_to(addr::CHG_CNTRL_3).iter().any(|v| v & clear != 0));

    charger.handle_irq(Irq::Chgfail).unwrap();
    assert!(charger.is_safety_timeout());
}

#[test]
fn charge_failure_off_ac_is_just_cleared() {
    let bus = idle_chip();
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());
    bus.chip().set_rt(Irq::UsbinValid, true);
    charger
        .set_power_source_and_charger_enable(PowerSource::Usb, true, true)
        .unwrap();

    charger.handle_irq(Irq::Chgfail).unwrap();
    assert!(!charger.is_safety_timeout());
    assert_eq!(charger.platform().count_charger_event(ChargerEvent::SafetyTimeout), 0);
}

#[test]
fn invalid_battery_id_holds_charging_off() {
    let bus = idle_chip();
    let config = ChargerConfig {
        batt_id_min_uv: 100_000,
        batt_id_max_uv: 200_000,
        ..quiet_config()
    };
    let platform = FakePlatform {
        batt_id_uv: Some(500_000),
        ..FakePlatform::default()
    };
    let mut charger = bring_up(&bus, config, platform);

    assert!(charger.battery_disable_reasons().contains(BatteryDisableReasons::BATTERY_INVALID));
    assert_eq!(charger.charger_enable(true), Err(Error::BatteryInvalid));
    assert_eq!(bus.chip().reg(addr::CHG_CNTRL_3) & ChgCntrl3Bits::CHG_EN.bits(), 0);

    charger.platform_mut().batt_id_uv = Some(150_000);
    charger.handle_irq(Irq::BattInserted).unwrap();
    assert!(charger.battery_disable_reasons().is_empty());
    charger.charger_enable(true).unwrap();
    assert_ne!(bus.chip().reg(addr::CHG_CNTRL_3) & ChgCntrl3Bits::CHG_EN.bits(), 0);
}

#[test]
fn unreadable_battery_id_counts_as_valid() {
    let bus = idle_chip();
    let config = ChargerConfig {
        batt_id_min_uv: 100_000,
        batt_id_max_uv: 200_000,
        ..quiet_config()
    };
    let platform = FakePlatform {
        batt_id_uv: None,
        ..FakePlatform::default()
    };
    let mut charger = bring_up(&bus, config, platform);
    assert!(charger.battery_disable_reasons().is_empty());
    charger.charger_enable(true).unwrap();
}

#[test]
fn battery_removal_respects_the_presence_pin() {
    let bus = idle_chip();
    let platform = FakePlatform {
        battery_present_pin: Some(true),
        ..FakePlatform::default()
    };
    let mut charger = bring_up(&bus, quiet_config(), platform);
    bus.chip().set_rt(Irq::BattRemoved, true);

    charger.handle_irq(Irq::BattRemoved).unwrap();
    assert_eq!(charger.platform().count_gauge_event(GaugeEvent::BatteryRemoved), 0);

    charger.platform_mut().battery_present_pin = None;
    charger.handle_irq(Irq::BattRemoved).unwrap();
    assert_eq!(charger.platform().count_gauge_event(GaugeEvent::BatteryRemoved), 1);
}

#[test]
fn cool_die_overrides_a_spurious_charger_hot() {
    let bus = idle_chip();
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());
    charger.handle_irq(Irq::Chghot).unwrap();
    assert!(bus.chip().writes_to(addr::COMPARATOR_OVERRIDE).contains(&comparator::CHG_NOT_HOT));

    let bus = idle_chip();
    let platform = FakePlatform {
        die_temp_mc: Some(95_000),
        ..FakePlatform::default()
    };
    let mut charger = bring_up(&bus, quiet_config(), platform);
    charger.handle_irq(Irq::Chghot).unwrap();
    assert!(!bus.chip().writes_to(addr::COMPARATOR_OVERRIDE).contains(&comparator::CHG_NOT_HOT));

    charger.platform_mut().die_temp_mc = None;
    assert_eq!(charger.handle_irq(Irq::Chghot), Err(Error::Adc(AdcError::Unavailable)));
}

#[test]
fn battery_temperature_ok_edges_notify_once() {
    let bus = idle_chip();
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());

    bus.chip().set_rt(Irq::BatTempOk, false);
    charger.handle_irq(Irq::BatTempOk).unwrap();
    assert_eq!(charger.platform().count_gauge_event(GaugeEvent::TempZoneChange), 1);

    charger.handle_irq(Irq::BatTempOk).unwrap();
    assert_eq!(charger.platform().count_gauge_event(GaugeEvent::TempZoneChange), 1);
}

#[test]
fn fast_charge_edge_starts_end_of_charge_polling() {
    let bus = idle_chip();
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());
    assert!(!charger.scheduler().is_pending(Work::Eoc));

    {
        let mut chip = bus.chip();
        chip.fsm = 7;
        chip.set_rt(Irq::Fastchg, true);
    }
    charger.handle_irq(Irq::Fastchg).unwrap();
    assert!(charger.scheduler().is_pending(Work::Eoc));
    assert!(charger.platform().wake_locks.contains(&(WakeLock::Eoc, true)));
    assert_eq!(charger.platform().began, 1);
}

#[test]
fn dc_presence_is_tracked() {
    let bus = idle_chip();
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());

    bus.chip().set_rt(Irq::DcinValid, true);
    charger.handle_irq(Irq::DcinValid).unwrap();
    assert!(charger.state().dc_present);
    assert_eq!(charger.platform().count_charger_event(ChargerEvent::CableChange), 2);
    assert!(charger.is_power_source_plugged_in().unwrap());

    bus.chip().set_rt(Irq::UsbinValid, true);
    assert!(!charger.is_power_source_plugged_in().unwrap());
}

#[test]
fn dc_over_voltage_releases_the_driver_source_vote() {
    let bus = idle_chip();
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());
    charger.power_source_enable(false).unwrap();
    assert_ne!(bus.chip().reg(addr::CHG_CNTRL) & ChgCntrlBits::CHARGE_DIS.bits(), 0);

    charger.handle_irq(Irq::DcinOv).unwrap();
    assert_eq!(bus.chip().reg(addr::CHG_CNTRL) & ChgCntrlBits::CHARGE_DIS.bits(), 0);
}

#[test]
fn status_follows_the_fsm() {
    let bus = charging_chip();
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());
    assert_eq!(charger.battery_status().unwrap(), BatteryStatus::Charging);
    assert_eq!(charger.charge_type().unwrap(), ChargeType::Fast);
    assert_eq!(charger.charging_source().unwrap(), ChargeSource::Usb);

    bus.chip().fsm = 3;
    assert_eq!(charger.battery_status().unwrap(), BatteryStatus::Discharging);
    assert_eq!(charger.charging_source().unwrap(), ChargeSource::None);

    // Charger-high-current without a battery is not charging.
    {
        let mut chip = bus.chip();
        chip.fsm = 1;
        chip.set_rt(Irq::BattInserted, false);
    }
    assert_eq!(charger.battery_status().unwrap(), BatteryStatus::NotCharging);
}

#[test]
fn bus_failure_surfaces_as_an_error() {
    let bus = idle_chip();
    let mut charger = bring_up(&bus, quiet_config(), FakePlatform::default());
    bus.chip().fail_reads = true;
    assert!(matches!(charger.battery_status(), Err(Error::Bus(_))));
}
