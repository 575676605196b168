//! Slow loop runner (`spec.md` §4.J): the best-effort main-thread loop.
//! Refreshes the bus-voltage reading, drives the supervisor state machine,
//! and publishes its output (state/fault/duty/direction) through the
//! shared context for the fast loop to pick up. Self-rate-limits with
//! monotonic timestamps rather than a hard scheduling deadline, since this
//! thread may block on collaborator I/O (telemetry, remote commands).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::context::MotorContext;
use crate::drivers::adc::{counts_to_line_volts, AdcChannel, AdcSource};
use crate::supervisor::Supervisor;

pub struct SlowLoop<A: AdcSource> {
    cfg: Config,
    ctx: MotorContext,
    supervisor: Supervisor,
    adc: A,
}

impl<A: AdcSource> SlowLoop<A> {
    pub fn new(cfg: Config, ctx: MotorContext, adc: A) -> Self {
        Self {
            supervisor: Supervisor::new(cfg),
            cfg,
            ctx,
            adc,
        }
    }

    /// One tick of `spec.md` §4.J's pipeline.
    pub fn tick(&mut self) {
        let v_bus = counts_to_line_volts(self.adc.read_channel(AdcChannel::VBus));
        self.supervisor.check_bus_voltage(v_bus);

        let snap = self.ctx.snapshot();
        let rpm_mech_measured = snap.measurement.rpm_mech;

        let out = self.supervisor.tick(&snap.command, rpm_mech_measured);

        self.ctx.update(|s| {
            s.state = out.state;
            s.fault = out.fault;
            s.command.torque_cmd = out.duty;
            s.command.direction = out.direction;
            s.measurement.v_bus = v_bus;
            s.align_sector = out.align_sector;
        });
    }

    /// Process a host-issued fault acknowledgement.
    pub fn clear_fault(&mut self) {
        self.supervisor.clear_fault();
        self.ctx.update(|s| {
            s.state = self.supervisor.state();
            s.fault = self.supervisor.fault();
            s.command.enable = false;
            s.align_sector = crate::types::Sector::Invalid;
        });
    }

    /// Runs `tick` at best-effort `T_slow` until `shutdown` is set.
    pub fn run(&mut self, shutdown: Arc<AtomicBool>) {
        let t_slow = Duration::from_secs_f64(1. / self.cfg.slow_hz as f64);
        let mut next = Instant::now();

        while !shutdown.load(Ordering::Relaxed) {
            self.tick();
            next += t_slow;
            let now = Instant::now();
            if next > now {
                std::thread::sleep(next - now);
            } else {
                next = now;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::sim::SimHandle;
    use crate::types::{ControllerState, FaultKind};

    #[test]
    fn idle_without_enable_stays_idle() {
        let sim = SimHandle::new();
        sim.set_v_bus(24.0);
        let ctx = MotorContext::new();
        let mut sl = SlowLoop::new(Config::default(), ctx.clone(), sim.adc());
        sl.tick();
        assert_eq!(ctx.snapshot().state, ControllerState::Idle);
    }

    #[test]
    fn overvoltage_bus_reading_faults_through_the_context() {
        let sim = SimHandle::new();
        sim.set_v_bus(1000.0);
        let ctx = MotorContext::new();
        ctx.update(|s| s.command.enable = true);
        let mut sl = SlowLoop::new(Config::default(), ctx.clone(), sim.adc());
        sl.tick();
        assert_eq!(ctx.snapshot().fault, FaultKind::Overvolt);
    }

    #[test]
    fn enable_drives_state_into_align() {
        let sim = SimHandle::new();
        sim.set_v_bus(24.0);
        let ctx = MotorContext::new();
        ctx.update(|s| {
            s.command.enable = true;
            s.command.rpm_cmd = 1000.;
        });
        let mut sl = SlowLoop::new(Config::default(), ctx.clone(), sim.adc());
        sl.tick();
        assert_eq!(ctx.snapshot().state, ControllerState::Align);
    }

    #[test]
    fn clear_fault_disables_and_returns_to_idle() {
        let sim = SimHandle::new();
        sim.set_v_bus(1000.0);
        let ctx = MotorContext::new();
        ctx.update(|s| s.command.enable = true);
        let mut sl = SlowLoop::new(Config::default(), ctx.clone(), sim.adc());
        sl.tick();
        assert_eq!(ctx.snapshot().fault, FaultKind::Overvolt);

        sl.clear_fault();
        assert_eq!(ctx.snapshot().fault, FaultKind::None);
        assert_eq!(ctx.snapshot().state, ControllerState::Idle);
        assert!(!ctx.snapshot().command.enable);
    }
}
