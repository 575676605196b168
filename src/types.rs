//! Core value types shared across the control engine: commutation sectors,
//! rotation direction, phase-sign triples, and the command/measurement pair
//! that flows between the supervisor and the fast loop.

use core::fmt;

/// One of the six 60-electrical-degree commutation segments, or `Invalid`
/// when the rotor position can't be resolved (bad Hall pattern, no BEMF
/// zero-crossing yet, etc).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sector {
    S0,
    S1,
    S2,
    S3,
    S4,
    S5,
    Invalid,
}

impl Sector {
    /// Build a `Sector` from a raw 0..=5 index. Panics on an out-of-range
    /// index; callers that may receive arbitrary indices should go through
    /// `hall::hall_to_sector` or construct `Invalid` explicitly instead.
    pub fn from_index(i: u8) -> Self {
        match i {
            0 => Sector::S0,
            1 => Sector::S1,
            2 => Sector::S2,
            3 => Sector::S3,
            4 => Sector::S4,
            5 => Sector::S5,
            _ => panic!("sector index out of range: {i}"),
        }
    }

    /// The 0..=5 index this sector represents, or `None` for `Invalid`.
    pub fn index(self) -> Option<u8> {
        match self {
            Sector::S0 => Some(0),
            Sector::S1 => Some(1),
            Sector::S2 => Some(2),
            Sector::S3 => Some(3),
            Sector::S4 => Some(4),
            Sector::S5 => Some(5),
            Sector::Invalid => None,
        }
    }

    pub fn is_valid(self) -> bool {
        self.index().is_some()
    }

    /// Advance (or retreat, for `dir < 0`) the sector by one step, wrapping
    /// modulo 6. `dir` must be `1` or `-1`. Returns `Invalid` unchanged.
    pub fn advance(self, dir: i8) -> Self {
        match self.index() {
            Some(i) => {
                let next = (i as i8 + dir).rem_euclid(6) as u8;
                Sector::from_index(next)
            }
            None => Sector::Invalid,
        }
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index() {
            Some(i) => write!(f, "{i}"),
            None => write!(f, "INVALID"),
        }
    }
}

/// Rotation sense of the commanded and actual rotor motion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// `+1` for `Forward`, `-1` for `Reverse`. Used as the sector-advance
    /// step in the BEMF tracker and Hall-derived direction inference.
    pub fn sign(self) -> i8 {
        match self {
            Direction::Forward => 1,
            Direction::Reverse => -1,
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }
}

/// Per-phase drive intent: `+1` high-side active, `-1` low-side active,
/// `0` floating.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseSign {
    High,
    Low,
    Float,
}

impl PhaseSign {
    fn negated(self) -> Self {
        match self {
            PhaseSign::High => PhaseSign::Low,
            PhaseSign::Low => PhaseSign::High,
            PhaseSign::Float => PhaseSign::Float,
        }
    }
}

/// `(u, v, w)` phase-sign triple for one commutation step. Invariant: for
/// any valid sector exactly one entry is `Float`, one is `High`, one is
/// `Low`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseState {
    pub u: PhaseSign,
    pub v: PhaseSign,
    pub w: PhaseSign,
}

impl PhaseState {
    pub const ALL_OFF: PhaseState = PhaseState {
        u: PhaseSign::Float,
        v: PhaseSign::Float,
        w: PhaseSign::Float,
    };

    fn negated(self) -> Self {
        PhaseState {
            u: self.u.negated(),
            v: self.v.negated(),
            w: self.w.negated(),
        }
    }
}

/// Commutation table: `sector -> (u, v, w)` for forward rotation. Reverse
/// negates every entry; shoot-through is structurally prevented because no
/// row ever asserts `High` and `Low` on the same phase.
const FORWARD_TABLE: [(PhaseSign, PhaseSign, PhaseSign); 6] = {
    use PhaseSign::{Float, High, Low};
    [
        (High, Low, Float), // s0
        (High, Float, Low), // s1
        (Float, High, Low), // s2
        (Low, High, Float), // s3
        (Low, Float, High), // s4
        (Float, Low, High), // s5
    ]
};

/// Look up the phase-sign triple for a valid sector and rotation direction.
/// Returns `None` for `Sector::Invalid`.
pub fn sector_to_phase_state(sector: Sector, dir: Direction) -> Option<PhaseState> {
    let i = sector.index()? as usize;
    let (u, v, w) = FORWARD_TABLE[i];
    let state = PhaseState { u, v, w };
    Some(match dir {
        Direction::Forward => state,
        Direction::Reverse => state.negated(),
    })
}

/// The phase left floating in a given sector, used by the BEMF tracker to
/// pick which ADC channel to sample for the zero-crossing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    U,
    V,
    W,
}

/// Fixed map from sector to its floating phase: `{0->W, 1->V, 2->U, 3->W,
/// 4->V, 5->U}`.
pub fn floating_phase(sector: Sector) -> Option<Phase> {
    match sector {
        Sector::S0 => Some(Phase::W),
        Sector::S1 => Some(Phase::V),
        Sector::S2 => Some(Phase::U),
        Sector::S3 => Some(Phase::W),
        Sector::S4 => Some(Phase::V),
        Sector::S5 => Some(Phase::U),
        Sector::Invalid => None,
    }
}

/// A command issued to the motor by the supervisor's clients (remote
/// control surface, or the process's own startup defaults).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Command {
    /// Requested mechanical speed, rpm. Clamped to `[0, rpm_max]`.
    pub rpm_cmd: f32,
    /// Requested duty / torque proxy, `[0, 1]`. Only used directly in
    /// ALIGN; RUN derives duty from the PI loop.
    pub torque_cmd: f32,
    pub enable: bool,
    pub direction: Direction,
}

impl Default for Command {
    fn default() -> Self {
        Self {
            rpm_cmd: 0.,
            torque_cmd: 0.,
            enable: false,
            direction: Direction::Forward,
        }
    }
}

/// Measured/estimated plant state, as published by the estimators and bus
/// monitor for the supervisor and telemetry to read.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Measurement {
    pub rpm_mech: f32,
    pub rpm_elec: f32,
    pub v_bus: f32,
    /// Declared in the original hardware abstraction layer but never
    /// populated by any ADC read (see DESIGN.md, Open Question 1); kept so
    /// `FaultKind::Overcurrent` and telemetry have a slot to report through
    /// once a current-sense channel exists.
    pub phase_currents: Option<[f32; 3]>,
}

impl Default for Measurement {
    fn default() -> Self {
        Self {
            rpm_mech: 0.,
            rpm_elec: 0.,
            v_bus: 0.,
            phase_currents: None,
        }
    }
}

/// Supervisor state machine states (`spec.md` §4.H).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Align,
    Run,
    Fault,
}

/// Latched fault causes. `None` means no fault is latched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultKind {
    None,
    Overcurrent,
    Overvolt,
    Undervolt,
    HallTimeout,
    Driver,
    Timing,
}

impl Default for FaultKind {
    fn default() -> Self {
        FaultKind::None
    }
}
