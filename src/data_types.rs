//! Data types shared by the charger engine and its platform traits.

/// Charger finite-state-machine state as reported by the hardware.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FsmState {
    Off,
    OnChgHighI,
    AtcA,
    OnBat,
    AtcFail,
    Delay,
    OnChgAndBat,
    FastChg,
    TrklChg,
    ChgFail,
    Eoc,
    OnChgVregOk,
    BatfetDetStart,
    AtcPause,
    FastChgPause,
    TrklChgPause,
    BatfetDetEnd,
    AtcB,
    StartBoot,
    FlcbVregOk,
    Flcb,
    /// Code not defined by the hardware.
    Unknown(u8),
}

impl FsmState {
    /// Raw 5-bit state code.
    pub fn code(self) -> u8 {
        match self {
            FsmState::Off => 0,
            FsmState::OnChgHighI => 1,
            FsmState::AtcA => 2,
            FsmState::OnBat => 3,
            FsmState::AtcFail => 4,
            FsmState::Delay => 5,
            FsmState::OnChgAndBat => 6,
            FsmState::FastChg => 7,
            FsmState::TrklChg => 8,
            FsmState::ChgFail => 9,
            FsmState::Eoc => 10,
            FsmState::OnChgVregOk => 11,
            FsmState::BatfetDetStart => 12,
            FsmState::AtcPause => 13,
            FsmState::FastChgPause => 14,
            FsmState::TrklChgPause => 15,
            FsmState::BatfetDetEnd => 16,
            FsmState::AtcB => 18,
            FsmState::StartBoot => 20,
            FsmState::FlcbVregOk => 21,
            FsmState::Flcb => 22,
            FsmState::Unknown(code) => code,
        }
    }

    /// States in which current flows into the battery.
    pub fn is_charging(self) -> bool {
        matches!(
            self,
            FsmState::AtcA | FsmState::AtcB | FsmState::OnChgAndBat | FsmState::FastChg | FsmState::TrklChg
        )
    }

    /// Coarse battery status implied by the FSM state alone.
    pub fn battery_status(self) -> BatteryStatus {
        match self {
            FsmState::OnChgHighI | FsmState::Eoc => BatteryStatus::Full,
            FsmState::AtcA | FsmState::AtcB | FsmState::OnChgAndBat | FsmState::FastChg | FsmState::TrklChg => {
                BatteryStatus::Charging
            }
            FsmState::OnBat | FsmState::AtcFail | FsmState::ChgFail => BatteryStatus::Discharging,
            FsmState::OnChgVregOk
            | FsmState::AtcPause
            | FsmState::FastChgPause
            | FsmState::TrklChgPause
            | FsmState::StartBoot
            | FsmState::FlcbVregOk
            | FsmState::Flcb => BatteryStatus::NotCharging,
            FsmState::Off | FsmState::BatfetDetStart | FsmState::BatfetDetEnd | FsmState::Delay => {
                BatteryStatus::Unknown
            }
            FsmState::Unknown(_) => BatteryStatus::Discharging,
        }
    }
}

impl From<u8> for FsmState {
    fn from(code: u8) -> Self {
        match code {
            0 => FsmState::Off,
            1 => FsmState::OnChgHighI,
            2 => FsmState::AtcA,
            3 => FsmState::OnBat,
            4 => FsmState::AtcFail,
            5 => FsmState::Delay,
            6 => FsmState::OnChgAndBat,
            7 => FsmState::FastChg,
            8 => FsmState::TrklChg,
            9 => FsmState::ChgFail,
            10 => FsmState::Eoc,
            11 => FsmState::OnChgVregOk,
            12 => FsmState::BatfetDetStart,
            13 => FsmState::AtcPause,
            14 => FsmState::FastChgPause,
            15 => FsmState::TrklChgPause,
            16 => FsmState::BatfetDetEnd,
            18 => FsmState::AtcB,
            20 => FsmState::StartBoot,
            21 => FsmState::FlcbVregOk,
            22 => FsmState::Flcb,
            other => FsmState::Unknown(other),
        }
    }
}

/// Charger interrupt sources, in hardware order.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Irq {
    UsbinValid,
    UsbinOv,
    BattInserted,
    VbatdetLow,
    UsbinUv,
    VbatOv,
    Chgwdog,
    Vcp,
    Atcdone,
    Atcfail,
    Chgdone,
    Chgfail,
    Chgstate,
    LoopChange,
    Fastchg,
    Trklchg,
    BattRemoved,
    BatttempHot,
    Chghot,
    BatttempCold,
    ChgGone,
    BatTempOk,
    CoarseDetLow,
    VddLoop,
    VregOv,
    Vbatdet,
    Batfet,
    Psi,
    DcinValid,
    DcinOv,
    DcinUv,
}

impl Irq {
    pub const COUNT: usize = 31;

    pub const ALL: [Irq; Irq::COUNT] = [
        Irq::UsbinValid,
        Irq::UsbinOv,
        Irq::BattInserted,
        Irq::VbatdetLow,
        Irq::UsbinUv,
        Irq::VbatOv,
        Irq::Chgwdog,
        Irq::Vcp,
        Irq::Atcdone,
        Irq::Atcfail,
        Irq::Chgdone,
        Irq::Chgfail,
        Irq::Chgstate,
        Irq::LoopChange,
        Irq::Fastchg,
        Irq::Trklchg,
        Irq::BattRemoved,
        Irq::BatttempHot,
        Irq::Chghot,
        Irq::BatttempCold,
        Irq::ChgGone,
        Irq::BatTempOk,
        Irq::CoarseDetLow,
        Irq::VddLoop,
        Irq::VregOv,
        Irq::Vbatdet,
        Irq::Batfet,
        Irq::Psi,
        Irq::DcinValid,
        Irq::DcinOv,
        Irq::DcinUv,
    ];

    /// Position within the charger interrupt block.
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Look up an interrupt by its position.
    pub fn from_index(index: u8) -> Option<Irq> {
        Irq::ALL.get(index as usize).copied()
    }

    /// Name used in diagnostics output.
    pub fn name(self) -> &'static str {
        match self {
            Irq::UsbinValid => "USBIN_VALID_IRQ",
            Irq::UsbinOv => "USBIN_OV_IRQ",
            Irq::BattInserted => "BATT_INSERTED_IRQ",
            Irq::VbatdetLow => "VBATDET_LOW_IRQ",
            Irq::UsbinUv => "USBIN_UV_IRQ",
            Irq::VbatOv => "VBAT_OV_IRQ",
            Irq::Chgwdog => "CHGWDOG_IRQ",
            Irq::Vcp => "VCP_IRQ",
            Irq::Atcdone => "ATCDONE_IRQ",
            Irq::Atcfail => "ATCFAIL_IRQ",
            Irq::Chgdone => "CHGDONE_IRQ",
            Irq::Chgfail => "CHGFAIL_IRQ",
            Irq::Chgstate => "CHGSTATE_IRQ",
            Irq::LoopChange => "LOOP_CHANGE_IRQ",
            Irq::Fastchg => "FASTCHG_IRQ",
            Irq::Trklchg => "TRKLCHG_IRQ",
            Irq::BattRemoved => "BATT_REMOVED_IRQ",
            Irq::BatttempHot => "BATTTEMP_HOT_IRQ",
            Irq::Chghot => "CHGHOT_IRQ",
            Irq::BatttempCold => "BATTTEMP_COLD_IRQ",
            Irq::ChgGone => "CHG_GONE_IRQ",
            Irq::BatTempOk => "BAT_TEMP_OK_IRQ",
            Irq::CoarseDetLow => "COARSE_DET_LOW_IRQ",
            Irq::VddLoop => "VDD_LOOP_IRQ",
            Irq::VregOv => "VREG_OV_IRQ",
            Irq::Vbatdet => "VBATDET_IRQ",
            Irq::Batfet => "BATFET_IRQ",
            Irq::Psi => "PSI_IRQ",
            Irq::DcinValid => "DCIN_VALID_IRQ",
            Irq::DcinOv => "DCIN_OV_IRQ",
            Irq::DcinUv => "DCIN_UV_IRQ",
        }
    }
}

/// Set of charger interrupts, one bit per [`Irq::index`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct IrqSet(u32);

impl IrqSet {
    pub const fn empty() -> Self {
        IrqSet(0)
    }

    pub fn contains(self, irq: Irq) -> bool {
        self.0 & (1 << irq.index()) != 0
    }

    pub fn insert(&mut self, irq: Irq) {
        self.0 |= 1 << irq.index();
    }

    pub fn remove(&mut self, irq: Irq) {
        self.0 &= !(1 << irq.index());
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

/// Requested or detected power source type.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PowerSource {
    /// Running from the battery; no external source.
    Batt,
    Usb,
    Ac,
    NineVAc,
    MhlAc,
    Wireless,
    UnknownUsb,
    Detecting,
}

impl PowerSource {
    /// Wall-adapter class sources that run AICL.
    pub fn is_ac(self) -> bool {
        matches!(self, PowerSource::Ac | PowerSource::NineVAc | PowerSource::MhlAc)
    }
}

/// Input path the charger reports as carrying current.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ActivePath {
    None,
    Usb,
    Dc,
}

/// Input that is charging the battery.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChargeSource {
    None,
    Usb,
    Dc,
}

/// Battery temperature zone used for voltage/current derating.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ThermalZone {
    Normal,
    Warm,
    Cool,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BatteryStatus {
    Unknown,
    Charging,
    Discharging,
    NotCharging,
    Full,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChargeType {
    None,
    Trickle,
    Fast,
}

/// Result of one end-of-charge evaluation.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChargeProgress {
    NotInProgress,
    InProgress,
    Finished,
}

/// Events raised towards the battery/charger framework.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChargerEvent {
    Ovp,
    OvpResolve,
    SafetyTimeout,
    SourceUnderRating,
    VbusIn,
    VbusOut,
    /// A cable insertion or removal needs classification.
    CableChange,
}

/// Events raised towards the fuel gauge.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GaugeEvent {
    Eoc,
    EocStopCharge,
    TempZoneChange,
    BatteryRemoved,
}

/// Notifications relayed to an external charger.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExtChargerEvent {
    Normal,
    Cool,
    Warm,
    Cold,
    Hot,
    EocStartCharge,
    EocStopCharge,
}

/// Analog channels read through the platform ADC.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AdcChannel {
    /// Battery voltage, µV.
    Vbat,
    /// USB input voltage, µV.
    Usbin,
    /// DC input voltage, µV.
    Dcin,
    /// System rail, µV.
    VphPwr,
    /// Battery identification resistor, µV.
    BattId,
    /// Battery temperature, deci-°C.
    BattTemp,
    /// PMIC die temperature, milli-°C.
    DieTemp,
}

/// Board GPIOs the charger consults.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GpioPin {
    /// Battery presence switch; high while a battery is inserted.
    BatteryPresent,
    /// Wireless transmitter detect; high while the pad is removed.
    WirelessTx,
}

/// Wake locks held across long-running charging phases.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WakeLock {
    /// Held from fast-charge start until end-of-charge handling finishes.
    Eoc,
    /// Held while the unplug/AICL worker is ramping.
    UnplugCheck,
}

/// OVP FET selection for the bounce workaround.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OvpPath {
    Usb,
    Dc,
}

/// Minimum buck PON time.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PonTime {
    Ns25,
    Ns50,
    Ns100,
}

/// Periodic view of the battery and the charger, taken by the heartbeat.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HeartbeatSnapshot {
    pub at_ms: u64,
    pub vbat_uv: i64,
    pub ibat_ua: i32,
    pub soc: Option<u8>,
    pub batt_temp_dc: i64,
    pub fsm: FsmState,
    pub usb_ma: u16,
    /// Raw regulation loop bits.
    pub loops: u8,
}

/// USB over-voltage trip point.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UsbOvThreshold {
    Mv5500,
    Mv6000,
    Mv6500,
    Mv7000,
}

impl UsbOvThreshold {
    /// Highest trip point at or below `mv`, clamped to the 5.5 V..7 V range.
    pub fn from_mv(mv: u16) -> Self {
        match mv {
            7000.. => Self::Mv7000,
            6500.. => Self::Mv6500,
            6000.. => Self::Mv6000,
            _ => Self::Mv5500,
        }
    }
}

/// Debounce time of the USB OVP comparator.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UsbOvpDebounce {
    Bypass,
    Ms20p5,
    Ms40p5,
    Ms80p5,
}

/// Thermistor comparator threshold selection.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TempThreshold {
    Low,
    High,
}
