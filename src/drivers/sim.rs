//! In-memory stand-ins for the four external collaborator traits, used by
//! unit and integration tests so the control engine can be exercised
//! without real GPIO/SPI/gate-driver hardware (`SPEC_FULL.md` §6).

use std::sync::{Arc, Mutex};

use super::adc::{AdcChannel, AdcSource, ADC_MAX_COUNTS, R_RATIO, V_REF};
use super::{DigitalOutput, GateDriverControl, PwmOutput};
use crate::hall::HallInputs;

/// One simulated digital output line, backed by a shared cell so test code
/// can assert on what the phase driver wrote.
#[derive(Clone)]
pub struct SimDigitalOutput(Arc<Mutex<bool>>);

impl SimDigitalOutput {
    pub fn new(cell: Arc<Mutex<bool>>) -> Self {
        Self(cell)
    }
}

impl DigitalOutput for SimDigitalOutput {
    fn set(&mut self, high: bool) {
        *self.0.lock().unwrap() = high;
    }
}

struct PwmState {
    period_ns: u32,
    duty_ns: u32,
    active: bool,
}

/// One simulated hardware-PWM line.
#[derive(Clone)]
pub struct SimPwmOutput(Arc<Mutex<PwmState>>);

impl SimPwmOutput {
    pub fn new(period_ns: u32) -> Self {
        Self(Arc::new(Mutex::new(PwmState {
            period_ns,
            duty_ns: 0,
            active: false,
        })))
    }

    pub fn duty_ns(&self) -> u32 {
        self.0.lock().unwrap().duty_ns
    }

    pub fn is_active(&self) -> bool {
        self.0.lock().unwrap().active
    }
}

impl PwmOutput for SimPwmOutput {
    fn period_ns(&self) -> u32 {
        self.0.lock().unwrap().period_ns
    }

    fn set_duty_ns(&mut self, duty_ns: u32) {
        self.0.lock().unwrap().duty_ns = duty_ns;
    }

    fn set_active(&mut self, active: bool) {
        self.0.lock().unwrap().active = active;
    }
}

/// Shared plant state a test manipulates directly and the simulated
/// collaborators read from.
#[derive(Default, Clone, Copy)]
struct SimState {
    hall_bits: u8,
    v_bus: f32,
    emf_u: f32,
    emf_v: f32,
    emf_w: f32,
    gate_enable: bool,
    fault_asserted: bool,
    octw_asserted: bool,
}

pub struct SimHallInputs(Arc<Mutex<SimState>>);

impl HallInputs for SimHallInputs {
    fn read_bits(&mut self) -> u8 {
        self.0.lock().unwrap().hall_bits
    }
}

pub struct SimAdc(Arc<Mutex<SimState>>);

impl AdcSource for SimAdc {
    fn read_channel(&mut self, ch: AdcChannel) -> u16 {
        let s = self.0.lock().unwrap();
        let v_line = match ch {
            AdcChannel::EmfU => s.emf_u,
            AdcChannel::EmfV => s.emf_v,
            AdcChannel::EmfW => s.emf_w,
            AdcChannel::VBus => s.v_bus,
        };
        let v_pin = v_line / R_RATIO;
        let counts = (v_pin / V_REF * ADC_MAX_COUNTS).round();
        counts.clamp(0., ADC_MAX_COUNTS) as u16
    }
}

pub struct SimGateDriver(Arc<Mutex<SimState>>);

impl GateDriverControl for SimGateDriver {
    fn set_gate_enable(&mut self, enable: bool) {
        self.0.lock().unwrap().gate_enable = enable;
    }

    fn fault_asserted(&mut self) -> bool {
        self.0.lock().unwrap().fault_asserted
    }

    fn overtemp_warning_asserted(&mut self) -> bool {
        self.0.lock().unwrap().octw_asserted
    }
}

/// Test-facing handle over the shared plant state, plus factories for the
/// trait-object collaborators that read/write it.
#[derive(Clone)]
pub struct SimHandle(Arc<Mutex<SimState>>);

impl SimHandle {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(SimState::default())))
    }

    pub fn set_hall_bits(&self, bits: u8) {
        self.0.lock().unwrap().hall_bits = bits;
    }

    pub fn set_v_bus(&self, v: f32) {
        self.0.lock().unwrap().v_bus = v;
    }

    pub fn set_emf(&self, u: f32, v: f32, w: f32) {
        let mut s = self.0.lock().unwrap();
        s.emf_u = u;
        s.emf_v = v;
        s.emf_w = w;
    }

    pub fn set_driver_fault(&self, asserted: bool) {
        self.0.lock().unwrap().fault_asserted = asserted;
    }

    pub fn hall_inputs(&self) -> SimHallInputs {
        SimHallInputs(self.0.clone())
    }

    pub fn adc(&self) -> SimAdc {
        SimAdc(self.0.clone())
    }

    pub fn gate_driver(&self) -> SimGateDriver {
        SimGateDriver(self.0.clone())
    }
}

impl Default for SimHandle {
    fn default() -> Self {
        Self::new()
    }
}
