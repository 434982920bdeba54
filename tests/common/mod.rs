#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use embedded_hal_mock::eh1::delay::NoopDelay;
use pm8921_charger::registers::{addr, irq_block_and_bit, test_cmd};
use pm8921_charger::{
    Adc, AdcChannel, AdcError, AdcReading, BatteryStatus, Charger, ChargerBuilder, ChargerConfig, ChargerEvent,
    Clock, ExtChargerEvent, ExternalCharger, FuelGauge, GaugeEvent, Gpio, GpioPin, InterruptControl, Irq, Notifier,
    PowerSource, RegisterBus, WakeLock,
};

/// Register file of a simulated charger block.
#[derive(Default)]
pub struct Chip {
    regs: HashMap<u16, u8>,
    rt: HashMap<u8, bool>,
    test_bank: u8,
    irq_block: u8,
    /// 5-bit FSM state code.
    pub fsm: u8,
    /// Regulation loop bits reported through bank 6.
    pub loops: u8,
    pub writes: Vec<(u16, u8)>,
    pub fail_reads: bool,
    /// Number of upcoming writes to a register that fail before reaching the chip.
    pub write_faults: HashMap<u16, usize>,
}

impl Chip {
    pub fn set_rt(&mut self, irq: Irq, level: bool) {
        self.rt.insert(irq.index(), level);
    }

    pub fn reg(&self, reg: u16) -> u8 {
        self.regs.get(&reg).copied().unwrap_or(0)
    }

    pub fn set_reg(&mut self, reg: u16, value: u8) {
        self.regs.insert(reg, value);
    }

    /// Every value written to `reg`, oldest first.
    pub fn writes_to(&self, reg: u16) -> Vec<u8> {
        self.writes.iter().filter(|(r, _)| *r == reg).map(|(_, v)| *v).collect()
    }

    fn rt_block(&self, block: u8) -> u8 {
        let mut status = 0;
        for (&index, &level) in &self.rt {
            let (b, bit) = irq_block_and_bit(index);
            if level && b == block {
                status |= 1 << bit;
            }
        }
        status
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFault;

/// Handle to a shared [`Chip`]; tests keep a clone to poke the hardware.
#[derive(Clone, Default)]
pub struct FakeBus(pub Rc<RefCell<Chip>>);

impl FakeBus {
    pub fn chip(&self) -> std::cell::RefMut<'_, Chip> {
        self.0.borrow_mut()
    }
}

impl RegisterBus for FakeBus {
    type Error = BusFault;

    fn read_byte(&mut self, reg: u16) -> Result<u8, BusFault> {
        let chip = self.0.borrow();
        if chip.fail_reads {
            return Err(BusFault);
        }
        Ok(match reg {
            addr::CHG_TEST => match chip.test_bank {
                test_cmd::READ_BANK_7 => chip.fsm & 0x0F,
                test_cmd::READ_BANK_4 => (chip.fsm >> 4) & 0x01,
                test_cmd::READ_BANK_6 => chip.loops & 0x0F,
                _ => 0,
            },
            addr::IRQ_RT_STATUS => chip.rt_block(chip.irq_block),
            _ => chip.reg(reg),
        })
    }

    fn write_byte(&mut self, reg: u16, value: u8) -> Result<(), BusFault> {
        let mut chip = self.0.borrow_mut();
        if let Some(left) = chip.write_faults.get_mut(&reg).filter(|n| **n > 0) {
            *left -= 1;
            return Err(BusFault);
        }
        chip.writes.push((reg, value));
        match reg {
            addr::CHG_TEST => {
                if matches!(value, test_cmd::READ_BANK_4 | test_cmd::READ_BANK_6 | test_cmd::READ_BANK_7) {
                    chip.test_bank = value;
                }
            }
            addr::IRQ_BLOCK_SEL => chip.irq_block = value,
            _ => chip.set_reg(reg, value),
        }
        Ok(())
    }
}

/// Board services with scripted readings and recorded notifications.
pub struct FakePlatform {
    pub now_ms: u64,
    pub vbat_uv: Option<i64>,
    pub usbin_uv: Option<i64>,
    pub dcin_uv: Option<i64>,
    pub vph_uv: Option<i64>,
    pub batt_id_uv: Option<i64>,
    pub batt_temp_dc: Option<i64>,
    pub die_temp_mc: Option<i64>,
    pub soc: Option<u8>,
    pub ibat_ua: Option<i32>,
    pub fcc_uah: Option<i32>,
    pub battery_present_pin: Option<bool>,
    pub wireless_tx_pin: Option<bool>,
    pub screen_on: bool,
    pub charger_events: Vec<ChargerEvent>,
    pub gauge_events: Vec<GaugeEvent>,
    pub began: usize,
    pub ended: Vec<bool>,
    pub wake_locks: Vec<(WakeLock, bool)>,
    pub irq_enables: Vec<(Irq, bool)>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self {
            now_ms: 1_000,
            vbat_uv: Some(3_900_000),
            usbin_uv: Some(5_000_000),
            dcin_uv: Some(0),
            vph_uv: Some(3_950_000),
            batt_id_uv: Some(150_000),
            batt_temp_dc: Some(250),
            die_temp_mc: Some(40_000),
            soc: Some(80),
            ibat_ua: Some(-500_000),
            fcc_uah: Some(2_000_000),
            battery_present_pin: None,
            wireless_tx_pin: None,
            screen_on: false,
            charger_events: Vec::new(),
            gauge_events: Vec::new(),
            began: 0,
            ended: Vec::new(),
            wake_locks: Vec::new(),
            irq_enables: Vec::new(),
        }
    }
}

impl FakePlatform {
    pub fn count_charger_event(&self, event: ChargerEvent) -> usize {
        self.charger_events.iter().filter(|e| **e == event).count()
    }

    pub fn count_gauge_event(&self, event: GaugeEvent) -> usize {
        self.gauge_events.iter().filter(|e| **e == event).count()
    }
}

impl Clock for FakePlatform {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }
}

impl Adc for FakePlatform {
    fn read_channel(&mut self, channel: AdcChannel) -> Result<AdcReading, AdcError> {
        let value = match channel {
            AdcChannel::Vbat => self.vbat_uv,
            AdcChannel::Usbin => self.usbin_uv,
            AdcChannel::Dcin => self.dcin_uv,
            AdcChannel::VphPwr => self.vph_uv,
            AdcChannel::BattId => self.batt_id_uv,
            AdcChannel::BattTemp => self.batt_temp_dc,
            AdcChannel::DieTemp => self.die_temp_mc,
        };
        value
            .map(|physical| AdcReading { physical, raw: physical })
            .ok_or(AdcError::Unavailable)
    }
}

impl FuelGauge for FakePlatform {
    fn charging_began(&mut self) {
        self.began += 1;
    }

    fn charging_ended(&mut self, is_full: bool) {
        self.ended.push(is_full);
    }

    fn percent_charge(&mut self) -> Option<u8> {
        self.soc
    }

    fn battery_current_ua(&mut self) -> Option<i32> {
        self.ibat_ua
    }

    fn full_charge_capacity_uah(&mut self) -> Option<i32> {
        self.fcc_uah
    }
}

impl Gpio for FakePlatform {
    fn get_value(&mut self, pin: GpioPin) -> Option<bool> {
        match pin {
            GpioPin::BatteryPresent => self.battery_present_pin,
            GpioPin::WirelessTx => self.wireless_tx_pin,
        }
    }
}

impl Notifier for FakePlatform {
    fn charger_event(&mut self, event: ChargerEvent) {
        self.charger_events.push(event);
    }

    fn gauge_event(&mut self, event: GaugeEvent) {
        self.gauge_events.push(event);
    }

    fn wake_lock(&mut self, lock: WakeLock, held: bool) {
        self.wake_locks.push((lock, held));
    }

    fn screen_on(&self) -> bool {
        self.screen_on
    }
}

impl InterruptControl for FakePlatform {
    fn set_irq_enabled(&mut self, irq: Irq, enabled: bool) {
        self.irq_enables.push((irq, enabled));
    }
}

pub type TestCharger<'a> = Charger<'a, FakeBus, NoopDelay, FakePlatform>;

/// Chip in fast charge from the battery's point of view: battery present, temperature ok.
pub fn charging_chip() -> FakeBus {
    let bus = FakeBus::default();
    {
        let mut chip = bus.chip();
        chip.fsm = 7;
        chip.set_rt(Irq::Fastchg, true);
        chip.set_rt(Irq::BattInserted, true);
        chip.set_rt(Irq::BatTempOk, true);
    }
    bus
}

/// Idle chip with a battery and no source.
pub fn idle_chip() -> FakeBus {
    let bus = FakeBus::default();
    {
        let mut chip = bus.chip();
        chip.fsm = 3;
        chip.set_rt(Irq::BattInserted, true);
        chip.set_rt(Irq::BatTempOk, true);
    }
    bus
}

pub fn bring_up<'a>(bus: &FakeBus, config: ChargerConfig, platform: FakePlatform) -> TestCharger<'a> {
    ChargerBuilder::new(bus.clone(), NoopDelay::new(), platform)
        .with_config(config)
        .init()
        .unwrap()
}

/// Config without the periodic heartbeat, so only the work under test gets scheduled.
pub fn quiet_config() -> ChargerConfig {
    ChargerConfig {
        update_time_ms: 0,
        ..ChargerConfig::default()
    }
}

/// Advance the fake clock and run whatever became due.
pub fn tick(charger: &mut TestCharger<'_>, ms: u64) -> Option<u64> {
    charger.platform_mut().now_ms += ms;
    charger.run_pending()
}

/// Attach USB as a wall adapter with the USB path active.
pub fn plug_wall_adapter(bus: &FakeBus, charger: &mut TestCharger<'_>) {
    {
        let mut chip = bus.chip();
        chip.set_rt(Irq::UsbinValid, true);
        chip.set_reg(addr::PBL_ACCESS1, 0x20);
    }
    charger
        .set_power_source_and_charger_enable(PowerSource::Ac, true, true)
        .unwrap();
}

#[derive(Default)]
pub struct ExtLog {
    pub charging: bool,
    pub starts: usize,
    pub stops: usize,
    pub limits: Vec<(PowerSource, u16)>,
    pub events: Vec<ExtChargerEvent>,
    pub ovp: bool,
    pub fail_attributes: bool,
}

/// External charger that records every call into a shared log.
pub struct RecordingExt(pub Rc<RefCell<ExtLog>>);

impl RecordingExt {
    pub fn new() -> (Self, Rc<RefCell<ExtLog>>) {
        let log = Rc::new(RefCell::new(ExtLog::default()));
        (Self(log.clone()), log)
    }
}

impl ExternalCharger for RecordingExt {
    fn start_charging(&mut self) {
        let mut log = self.0.borrow_mut();
        log.charging = true;
        log.starts += 1;
    }

    fn stop_charging(&mut self) {
        let mut log = self.0.borrow_mut();
        log.charging = false;
        log.stops += 1;
    }

    fn is_charging(&mut self) -> bool {
        self.0.borrow().charging
    }

    fn set_current_limit(&mut self, source: PowerSource, ma: u16) {
        self.0.borrow_mut().limits.push((source, ma));
    }

    fn status(&mut self) -> BatteryStatus {
        if self.0.borrow().charging { BatteryStatus::Charging } else { BatteryStatus::Discharging }
    }

    fn event_notify(&mut self, event: ExtChargerEvent) {
        self.0.borrow_mut().events.push(event);
    }

    fn is_ovp(&mut self) -> bool {
        self.0.borrow().ovp
    }

    fn write_attributes(&mut self, out: &mut dyn core::fmt::Write) -> core::fmt::Result {
        if self.0.borrow().fail_attributes {
            return Err(core::fmt::Error);
        }
        write!(out, "EXT_CHARGING(bool): {};\n", self.0.borrow().charging as u8)
    }
}
