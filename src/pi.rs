//! Anti-windup PI speed controller (`spec.md` §4.G). This is deliberately
//! a single-axis loop — unlike the cascaded attitude/rate PID stacks this
//! crate's control-loop idiom is drawn from, six-step commutation has only
//! one outer loop to close (speed -> duty).

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PiStatus {
    Ok,
    SatHigh,
    SatLow,
}

const SAT_EPSILON: f32 = 1e-6;

/// { kp, ki, Ts, integrator, out_min, out_max, last_output }.
#[derive(Clone, Copy, Debug)]
pub struct PiController {
    kp: f32,
    ki: f32,
    ts: f32,
    out_min: f32,
    out_max: f32,
    integrator: f32,
    last_output: f32,
}

impl PiController {
    pub fn new(kp: f32, ki: f32, ts: f32, out_min: f32, out_max: f32) -> Self {
        Self {
            kp,
            ki,
            ts,
            out_min,
            out_max,
            integrator: 0.,
            last_output: 0.,
        }
    }

    pub fn reset(&mut self) {
        self.integrator = 0.;
        self.last_output = 0.;
    }

    pub fn last_output(&self) -> f32 {
        self.last_output
    }

    pub fn integrator(&self) -> f32 {
        self.integrator
    }

    /// One PI step. `use_antiwindup = false` disables the freeze rule
    /// (used by callers that want a raw, unclamped-integrator PI for
    /// diagnostics); `spec.md` §4.G's supervisor path always calls this
    /// with antiwindup enabled.
    pub fn step(&mut self, reference: f32, measurement: f32, use_antiwindup: bool) -> (f32, PiStatus) {
        let e = reference - measurement;
        let u_p = self.kp * e;
        let i_cand = self.integrator + self.ki * self.ts * e;
        let u_unsat = u_p + i_cand;
        let u_sat = u_unsat.clamp(self.out_min, self.out_max);

        let at_high = (u_sat - self.out_max).abs() < SAT_EPSILON;
        let at_low = (u_sat - self.out_min).abs() < SAT_EPSILON;

        let freeze = use_antiwindup && ((at_high && e > 0.) || (at_low && e < 0.));
        if !freeze {
            self.integrator = i_cand;
        }

        self.last_output = u_sat;

        let status = if at_high {
            PiStatus::SatHigh
        } else if at_low {
            PiStatus::SatLow
        } else {
            PiStatus::Ok
        };

        (u_sat, status)
    }
}
