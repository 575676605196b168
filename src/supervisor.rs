//! Supervisor / fault state machine (`spec.md` §4.H). Owns the IDLE -> ALIGN
//! -> RUN -> FAULT transitions, the open-loop startup ramp, the speed-loop
//! PI invocation, and fault latching. Runs on the slow loop; the fast loop
//! only reads its published `ContextSnapshot` to decide what to commutate.

use crate::config::Config;
use crate::pi::PiController;
use crate::types::{Command, ControllerState, Direction, FaultKind, Sector};

/// Open-loop ALIGN ramp bookkeeping, kept separate from `Supervisor` so its
/// reset-on-entry semantics are obvious at the call site. Drives a forced
/// sector counter independent of any sensor feedback — ALIGN's whole point
/// is to spin the rotor into a known position before handing commutation
/// off to Hall/BEMF, so it cannot itself depend on either.
#[derive(Clone, Copy, Debug)]
struct AlignRamp {
    step: u32,
    tick_in_step: u32,
    sector: Sector,
}

impl Default for AlignRamp {
    fn default() -> Self {
        Self {
            step: 0,
            tick_in_step: 0,
            sector: Sector::S0,
        }
    }
}

impl AlignRamp {
    fn reset(&mut self) {
        self.step = 0;
        self.tick_in_step = 0;
        self.sector = Sector::S0;
    }

    fn sector(&self) -> Sector {
        self.sector
    }

    /// Advances one tick; returns `true` once `steps_total` steps have each
    /// run `ticks_per_step` ticks. The forced sector advances by one step,
    /// in `dir`, every time a step completes.
    fn tick(&mut self, ticks_per_step: u32, steps_total: u32, dir: Direction) -> bool {
        self.tick_in_step += 1;
        if self.tick_in_step >= ticks_per_step {
            self.tick_in_step = 0;
            self.step += 1;
            self.sector = self.sector.advance(dir.sign());
        }
        self.step >= steps_total
    }
}

/// `spec.md` §4.H. Produced for the fast loop to consume as a commutation
/// directive: duty and a commanded direction, gated by `state`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SupervisorOutput {
    pub state: ControllerState,
    pub fault: FaultKind,
    pub duty: f32,
    pub direction: Direction,
    /// The forced open-loop sector to commutate off while `state ==
    /// Align`. `Sector::Invalid` outside of ALIGN, where the fast loop
    /// commutates off the real estimator sector instead.
    pub align_sector: Sector,
}

pub struct Supervisor {
    state: ControllerState,
    fault: FaultKind,
    direction: Direction,
    commanded_rpm: f32,
    align: AlignRamp,
    pi: PiController,
    cfg: Config,
}

impl Supervisor {
    pub fn new(cfg: Config) -> Self {
        let ts = 1. / cfg.slow_hz;
        Self {
            state: ControllerState::Idle,
            fault: FaultKind::None,
            direction: Direction::Forward,
            commanded_rpm: 0.,
            align: AlignRamp::default(),
            pi: PiController::new(cfg.pi_kp, cfg.pi_ki, ts, cfg.pi_out_min, cfg.pi_out_max),
            cfg,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn fault(&self) -> FaultKind {
        self.fault
    }

    /// Clears a latched fault and returns to IDLE with the motor disabled.
    /// The operator must re-issue `enable` to restart.
    pub fn clear_fault(&mut self) {
        self.fault = FaultKind::None;
        self.state = ControllerState::Idle;
        self.pi.reset();
        self.align.reset();
    }

    /// Force-latches a fault from an external source (e.g. the fast loop's
    /// jitter monitor or a commutation-sector-invalid condition). First
    /// cause wins: a fault already latched is not overwritten.
    pub fn raise_fault(&mut self, kind: FaultKind) {
        if self.fault == FaultKind::None {
            self.fault = kind;
            self.state = ControllerState::Fault;
        }
    }

    /// `spec.md` §4.H bus-voltage guard. The 0.1 V floor on the undervolt
    /// side means a de-energized bus (0 V) doesn't immediately fault.
    pub fn check_bus_voltage(&mut self, v_bus: f32) {
        if self.fault != FaultKind::None {
            return;
        }
        if v_bus > self.cfg.bus_v_max {
            self.raise_fault(FaultKind::Overvolt);
        } else if v_bus > 0.1 && v_bus < self.cfg.bus_v_min {
            self.raise_fault(FaultKind::Undervolt);
        }
    }

    fn output(&self, duty: f32) -> SupervisorOutput {
        SupervisorOutput {
            state: self.state,
            fault: self.fault,
            duty,
            direction: self.direction,
            align_sector: Sector::Invalid,
        }
    }

    /// Like `output`, but carries the forced ALIGN sector for the fast loop
    /// to commutate off instead of the sensor-derived one.
    fn output_align(&self, duty: f32) -> SupervisorOutput {
        SupervisorOutput {
            align_sector: self.align.sector(),
            ..self.output(duty)
        }
    }

    /// One slow-loop tick, following `spec.md` §4.H's pipeline: direction
    /// and slew update first (independent of state), then per-state
    /// dispatch. Callers push bus-voltage refreshes through
    /// `check_bus_voltage` themselves, as the slow loop does.
    pub fn tick(&mut self, cmd: &Command, rpm_mech_measured: f32) -> SupervisorOutput {
        if self.fault != FaultKind::None {
            self.state = ControllerState::Fault;
            return self.output(0.);
        }

        if !cmd.enable {
            self.state = ControllerState::Idle;
            self.pi.reset();
            self.align.reset();
            self.commanded_rpm = 0.;
            return self.output(0.);
        }

        // Direction/slew update: a reversal request below the threshold
        // commits immediately; above it, the slew target drops to zero
        // first (brake), and the direction bit only flips once stopped.
        let requested = cmd.direction;
        let target = if requested != self.direction {
            if rpm_mech_measured.abs() <= self.cfg.reverse_threshold_rpm {
                self.direction = requested;
                self.pi.reset();
                cmd.rpm_cmd.clamp(0., self.cfg.rpm_max)
            } else {
                0.
            }
        } else {
            cmd.rpm_cmd.clamp(0., self.cfg.rpm_max)
        };

        let max_step = self.cfg.slew_rate_rpm_per_s / self.cfg.slow_hz;
        self.commanded_rpm += (target - self.commanded_rpm).clamp(-max_step, max_step);

        match self.state {
            ControllerState::Idle => {
                self.state = ControllerState::Align;
                self.align.reset();
                self.pi.reset();
                self.output_align(self.cfg.startup_duty)
            }
            ControllerState::Align => {
                if cmd.rpm_cmd <= 0. {
                    self.state = ControllerState::Idle;
                    self.pi.reset();
                    self.align.reset();
                    self.commanded_rpm = 0.;
                    return self.output(0.);
                }

                let steps_done =
                    self.align
                        .tick(self.cfg.startup_ticks_per_step, self.cfg.startup_steps_total, self.direction);
                if steps_done || rpm_mech_measured.abs() >= self.cfg.align_exit_rpm_mech {
                    self.state = ControllerState::Run;
                    self.pi.reset();
                }
                self.output_align(self.cfg.startup_duty)
            }
            ControllerState::Run => {
                if cmd.rpm_cmd <= 0. && rpm_mech_measured.abs() < self.cfg.stop_threshold_rpm {
                    self.state = ControllerState::Idle;
                    self.pi.reset();
                    self.align.reset();
                    self.commanded_rpm = 0.;
                    return self.output(0.);
                }

                let (duty, _status) = self.pi.step(self.commanded_rpm.abs(), rpm_mech_measured.abs(), true);
                self.output(duty)
            }
            ControllerState::Fault => unreachable!("fault handled above"),
        }
    }
}
