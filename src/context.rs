//! Shared motor context (`spec.md` §4.K): the single process-wide
//! aggregate of `{state, fault, command, measurement}`. Every write is a
//! whole-snapshot publish; every read is a whole-snapshot clone, so no
//! consumer ever observes a torn mix of old and new fields.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::remote::SensorMode;
use crate::types::{Command, ControllerState, FaultKind, Measurement, Sector};

/// One consistent, copyable view of the motor's state. `Copy` because
/// every field is plain data — cloning a snapshot is just a memcpy, which
/// is what makes "read = clone the lock's contents" cheap enough to do on
/// every fast-loop iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContextSnapshot {
    pub state: ControllerState,
    pub fault: FaultKind,
    pub command: Command,
    pub measurement: Measurement,
    /// Requested position source. The fast loop compares this against the
    /// handover controller's own state each tick to decide whether to
    /// arm/reset/force it; it is not itself the handover phase.
    pub sensor_mode: SensorMode,
    /// The supervisor's forced open-loop ALIGN sector. Only meaningful
    /// while `state == Align`; the fast loop commutates off this instead
    /// of the sensor-derived sector during that phase.
    pub align_sector: Sector,
}

impl Default for ContextSnapshot {
    fn default() -> Self {
        Self {
            state: ControllerState::Idle,
            fault: FaultKind::None,
            command: Command::default(),
            measurement: Measurement::default(),
            sensor_mode: SensorMode::default(),
            align_sector: Sector::Invalid,
        }
    }
}

/// Process-singleton shared state. Mutated only by the supervisor (slow
/// loop) and the fault-reporting path; read by everyone else through
/// `snapshot()`.
#[derive(Clone)]
pub struct MotorContext {
    inner: Arc<RwLock<ContextSnapshot>>,
}

impl MotorContext {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(ContextSnapshot::default())),
        }
    }

    /// Atomic snapshot-read, usable by any consumer (fast loop, telemetry,
    /// remote-control status handler).
    pub fn snapshot(&self) -> ContextSnapshot {
        *self.inner.read()
    }

    /// Replace the whole snapshot in one write. Never mutate individual
    /// fields of the locked value in place — that would reintroduce torn
    /// reads for a reader that takes the lock mid-update.
    pub fn publish(&self, snapshot: ContextSnapshot) {
        *self.inner.write() = snapshot;
    }

    /// Convenience for the common case of changing just one or two fields:
    /// reads the current snapshot, applies `f`, publishes the result.
    pub fn update(&self, f: impl FnOnce(&mut ContextSnapshot)) {
        let mut snap = self.snapshot();
        f(&mut snap);
        self.publish(snap);
    }
}

impl Default for MotorContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_then_snapshot_round_trips() {
        let ctx = MotorContext::new();
        ctx.update(|s| {
            s.state = ControllerState::Run;
            s.measurement.rpm_mech = 1234.;
        });
        let snap = ctx.snapshot();
        assert_eq!(snap.state, ControllerState::Run);
        assert_eq!(snap.measurement.rpm_mech, 1234.);
    }

    #[test]
    fn clones_share_the_same_underlying_state() {
        let ctx = MotorContext::new();
        let ctx2 = ctx.clone();
        ctx.update(|s| s.fault = FaultKind::Overvolt);
        assert_eq!(ctx2.snapshot().fault, FaultKind::Overvolt);
    }
}
