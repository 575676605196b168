//! Collaborator interfaces the core consumes but does not implement:
//! raw digital I/O, the SPI ADC transport, and gate-driver register access
//! (`spec.md` §1, §6). Only the trait contracts and the pure conversion
//! math live here; the transport itself (spidev, sysfs-gpio, whatever the
//! target SBC exposes) is out of scope.

pub mod adc;
pub mod sim;

/// A single digital output line (one of INH_A/INL_A/.../EN_GATE). The
/// GPIO phase-output backend and the gate-driver enable line both write
/// through this.
pub trait DigitalOutput: Send {
    fn set(&mut self, high: bool);
}

/// A single digital input line (one of nFAULT/nOCTW). Active level is the
/// collaborator's concern; callers interpret the bit per `spec.md`'s
/// stated polarity for each signal.
pub trait DigitalInput: Send {
    fn read(&mut self) -> bool;
}

/// One hardware-PWM-capable output line. `period_ns` is fixed at
/// construction (the carrier, default 20 kHz per `spec.md` §6);
/// `set_duty_ns` must be `< period_ns`.
pub trait PwmOutput: Send {
    fn period_ns(&self) -> u32;
    fn set_duty_ns(&mut self, duty_ns: u32);
    fn set_active(&mut self, active: bool);
}

/// Gate-driver IC register/line access: one active-high enable output,
/// two active-low fault inputs (`spec.md` §6).
pub trait GateDriverControl: Send {
    fn set_gate_enable(&mut self, enable: bool);
    /// `true` means nFAULT is asserted (driver reports a fault).
    fn fault_asserted(&mut self) -> bool;
    /// `true` means nOCTW is asserted (over-temperature/over-current warning).
    fn overtemp_warning_asserted(&mut self) -> bool;
}