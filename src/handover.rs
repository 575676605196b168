//! Handover controller (`spec.md` §4.F): the gate that atomically switches
//! the position source from Hall to BEMF once the rotor is spinning fast
//! enough to track back-EMF reliably.

use crate::position::PositionEstimate;
use crate::speed_estimator::{EstimatorMode, SpeedEstimator};
use crate::types::Direction;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Disabled,
    Armed,
    Done,
}

/// `spec.md` §3 `HandoverState`. Invariant: `done => estimator_source ==
/// Bemf`; once `done`, it is not cleared until an explicit `reset`.
pub struct HandoverController {
    phase: Phase,
    min_rpm_mech: f32,
    min_valid_samples: u32,
    valid_count: u32,
}

impl HandoverController {
    pub fn new(min_rpm_mech: f32, min_valid_samples: u32) -> Self {
        Self {
            phase: Phase::Disabled,
            min_rpm_mech,
            min_valid_samples,
            valid_count: 0,
        }
    }

    pub fn arm(&mut self) {
        if self.phase != Phase::Done {
            self.phase = Phase::Armed;
            self.valid_count = 0;
        }
    }

    /// Returns to `Disabled` and clears the `Done` latch. Called from
    /// `set_enable(true)` per the sticky-until-reset contract.
    pub fn reset(&mut self) {
        self.phase = Phase::Disabled;
        self.valid_count = 0;
    }

    pub fn done(&self) -> bool {
        self.phase == Phase::Done
    }

    pub fn valid_count(&self) -> u32 {
        self.valid_count
    }

    /// One slow-loop tick. When the handover condition is met, performs
    /// the atomic three-step transition — BEMF alignment, estimator mode
    /// switch, position-estimator mode switch (implied by the estimator
    /// switch, since `position::estimate` reads straight off the
    /// estimator) — and returns `true` exactly once, on the tick it fires.
    pub fn tick(
        &mut self,
        speed: &mut SpeedEstimator,
        position: &PositionEstimate,
        dir_from_command: Direction,
    ) -> bool {
        if self.phase != Phase::Armed {
            return false;
        }

        if !position.valid || !position.sector.is_valid() {
            self.valid_count = 0;
            return false;
        }

        if position.mech_speed.abs() >= self.min_rpm_mech {
            self.valid_count += 1;
        } else {
            self.valid_count = 0;
        }

        if self.valid_count >= self.min_valid_samples {
            speed.bemf_align(position.sector, dir_from_command);
            speed.set_mode(EstimatorMode::Bemf);
            self.phase = Phase::Done;
            return true;
        }

        false
    }
}
