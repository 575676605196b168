//! Phase driver I/O (`spec.md` §4.A): composes the sector->sign commutation
//! table with the six gate lines of the inverter. This component owns the
//! inverter interface exclusively; nothing else in the crate writes a gate
//! line directly.

use crate::drivers::{DigitalOutput, PwmOutput};
use crate::types::{sector_to_phase_state, Direction, PhaseSign, PhaseState, Sector};

/// One of the six inverter gate lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateLine {
    InhA,
    InlA,
    InhB,
    InlB,
    InhC,
    InlC,
}

/// Translates a `(line, duty)` write into raw gate-line activity. `duty`
/// is in `[0, 1]`; `duty <= 0` always means fully inactive. Implemented
/// once per back-end kind (GPIO threshold vs. hardware PWM), so
/// `PhaseDriver` itself stays back-end agnostic.
pub trait PhaseOutputBackend: Send {
    fn write_line(&mut self, line: GateLine, duty: f32);
}

/// GPIO back-end: duty is thresholded. `duty > 0` drives the line active;
/// anything else is inactive.
pub struct GpioBackend {
    lines: [Box<dyn DigitalOutput>; 6],
}

impl GpioBackend {
    pub fn new(lines: [Box<dyn DigitalOutput>; 6]) -> Self {
        Self { lines }
    }

    fn index(line: GateLine) -> usize {
        match line {
            GateLine::InhA => 0,
            GateLine::InlA => 1,
            GateLine::InhB => 2,
            GateLine::InlB => 3,
            GateLine::InhC => 4,
            GateLine::InlC => 5,
        }
    }
}

impl PhaseOutputBackend for GpioBackend {
    fn write_line(&mut self, line: GateLine, duty: f32) {
        self.lines[Self::index(line)].set(duty > 0.);
    }
}

/// Hardware-PWM back-end: `duty` is translated to `duty_ns = round(period_ns
/// * duty)`, clamped to `(0, period_ns - 1)` for `duty` in `(0, 1]`.
pub struct PwmBackend {
    lines: [Box<dyn PwmOutput>; 6],
}

impl PwmBackend {
    pub fn new(lines: [Box<dyn PwmOutput>; 6]) -> Self {
        Self { lines }
    }

    fn index(line: GateLine) -> usize {
        GpioBackend::index(line)
    }
}

impl PhaseOutputBackend for PwmBackend {
    fn write_line(&mut self, line: GateLine, duty: f32) {
        let out = &mut self.lines[Self::index(line)];
        if duty <= 0. {
            out.set_active(false);
            return;
        }
        let period_ns = out.period_ns();
        let duty_ns = (period_ns as f32 * duty).round() as u32;
        let duty_ns = duty_ns.clamp(1, period_ns.saturating_sub(1));
        out.set_active(true);
        out.set_duty_ns(duty_ns);
    }
}

/// Phase driver component: owns the inverter interface and composes the
/// sector->sign commutation table with the gate-line backend.
pub struct PhaseDriver<B: PhaseOutputBackend> {
    backend: B,
    enabled: bool,
}

impl<B: PhaseOutputBackend> PhaseDriver<B> {
    pub fn new(backend: B) -> Self {
        let mut driver = Self {
            backend,
            enabled: false,
        };
        driver.apply_phase_state(PhaseState::ALL_OFF, 0.);
        driver
    }

    /// When disabling, all six gate lines are driven inactive before
    /// returning.
    pub fn set_enable(&mut self, enable: bool) {
        self.enabled = enable;
        if !enable {
            self.apply_phase_state(PhaseState::ALL_OFF, 0.);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Drives `INH_x`/`INL_x` per `state`, at `duty` on whichever line is
    /// asserted. Both lines of a phase are inactive when that phase is
    /// `Float`, when `duty <= 0`, or when the driver is disabled.
    pub fn apply_phase_state(&mut self, state: PhaseState, duty: f32) {
        let duty = if self.enabled { duty.max(0.) } else { 0. };

        let (inh, inl) = match state.u {
            PhaseSign::High => (duty, 0.),
            PhaseSign::Low => (0., duty),
            PhaseSign::Float => (0., 0.),
        };
        self.backend.write_line(GateLine::InhA, inh);
        self.backend.write_line(GateLine::InlA, inl);

        let (inh, inl) = match state.v {
            PhaseSign::High => (duty, 0.),
            PhaseSign::Low => (0., duty),
            PhaseSign::Float => (0., 0.),
        };
        self.backend.write_line(GateLine::InhB, inh);
        self.backend.write_line(GateLine::InlB, inl);

        let (inh, inl) = match state.w {
            PhaseSign::High => (duty, 0.),
            PhaseSign::Low => (0., duty),
            PhaseSign::Float => (0., 0.),
        };
        self.backend.write_line(GateLine::InhC, inh);
        self.backend.write_line(GateLine::InlC, inl);
    }

    /// Composes the sector->sign mapping with `apply_phase_state`. A call
    /// with `Sector::Invalid` drives all outputs off.
    pub fn set_six_step(&mut self, sector: Sector, duty: f32, dir: Direction) {
        match sector_to_phase_state(sector, dir) {
            Some(state) => self.apply_phase_state(state, duty),
            None => self.apply_phase_state(PhaseState::ALL_OFF, 0.),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::sim::{SimDigitalOutput, SimPwmOutput};
    use std::sync::{Arc, Mutex};

    fn gpio_driver() -> (PhaseDriver<GpioBackend>, [Arc<Mutex<bool>>; 6]) {
        let cells: [Arc<Mutex<bool>>; 6] = Default::default();
        let lines: [Box<dyn DigitalOutput>; 6] = cells
            .clone()
            .map(|c| Box::new(SimDigitalOutput::new(c)) as Box<dyn DigitalOutput>);
        (PhaseDriver::new(GpioBackend::new(lines)), cells)
    }

    #[test]
    fn disabled_driver_never_asserts_a_line() {
        let (mut driver, cells) = gpio_driver();
        driver.set_six_step(Sector::S0, 1.0, Direction::Forward);
        for c in &cells {
            assert!(!*c.lock().unwrap());
        }
    }

    #[test]
    fn enabled_sector0_forward_asserts_inh_a_and_inl_b_only() {
        let (mut driver, cells) = gpio_driver();
        driver.set_enable(true);
        driver.set_six_step(Sector::S0, 1.0, Direction::Forward);
        let asserted: Vec<bool> = cells.iter().map(|c| *c.lock().unwrap()).collect();
        // [InhA, InlA, InhB, InlB, InhC, InlC]
        assert_eq!(asserted, vec![true, false, false, true, false, false]);
    }

    #[test]
    fn zero_duty_deasserts_even_when_enabled() {
        let (mut driver, cells) = gpio_driver();
        driver.set_enable(true);
        driver.set_six_step(Sector::S0, 0.0, Direction::Forward);
        for c in &cells {
            assert!(!*c.lock().unwrap());
        }
    }

    #[test]
    fn invalid_sector_drives_all_lines_off() {
        let (mut driver, cells) = gpio_driver();
        driver.set_enable(true);
        driver.set_six_step(Sector::S0, 1.0, Direction::Forward);
        driver.set_six_step(Sector::Invalid, 1.0, Direction::Forward);
        for c in &cells {
            assert!(!*c.lock().unwrap());
        }
    }

    #[test]
    fn pwm_backend_clamps_duty_ns_below_period() {
        let period_ns = 50_000;
        let sim = SimPwmOutput::new(period_ns);
        let lines: [Box<dyn PwmOutput>; 6] =
            core::array::from_fn(|_| Box::new(sim.clone()) as Box<dyn PwmOutput>);
        let mut driver = PhaseDriver::new(PwmBackend::new(lines));
        driver.set_enable(true);
        driver.set_six_step(Sector::S1, 1.0, Direction::Forward);
        assert!(sim.duty_ns() < period_ns);
        assert!(sim.duty_ns() > 0);
    }
}
