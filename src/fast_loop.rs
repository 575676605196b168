//! Fast loop runner (`spec.md` §4.I): the real-time thread body. Samples
//! the ADC, updates the estimator, ticks handover, and commutates — all
//! within `T_fast`. RT scheduling setup follows the same
//! `mlockall`/`sched_setaffinity`/`sched_setscheduler(SCHED_FIFO)` sequence
//! as the pack's other dual-loop real-time control daemons, gated behind
//! the `rt` feature so the test suite runs without `CAP_SYS_NICE`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::Config;
use crate::context::MotorContext;
use crate::drivers::adc::{counts_to_line_volts, AdcChannel, AdcSource};
use crate::drivers::GateDriverControl;
use crate::error::RtSetupError;
use crate::hall::HallInputs;
use crate::handover::HandoverController;
use crate::phase_driver::{PhaseDriver, PhaseOutputBackend};
use crate::position;
use crate::remote::SensorMode;
use crate::speed_estimator::{EstimatorMode, SpeedEstimator};
use crate::types::{ControllerState, FaultKind};

#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), RtSetupError> {
    use nix::sys::mman::{mlockall, MlockAllFlags};
    mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE).map_err(RtSetupError::MemLock)
}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), RtSetupError> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let mut set = CpuSet::new();
    set.set(cpu).map_err(RtSetupError::Affinity)?;
    sched_setaffinity(Pid::from_raw(0), &set).map_err(RtSetupError::Affinity)
}

#[cfg(feature = "rt")]
fn rt_set_scheduler_fifo(priority: i32) -> Result<(), RtSetupError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        return Err(RtSetupError::Scheduler {
            priority,
            source: nix::errno::Errno::last(),
        });
    }
    Ok(())
}

/// Runs the `mlockall` -> affinity -> `SCHED_FIFO` sequence. Failures are
/// logged and treated as best-effort (`spec.md` §5 treats RT priority as a
/// scheduling concern, not a safety invariant) — the caller proceeds on the
/// default scheduler rather than aborting the process.
pub fn rt_setup(cfg: &Config) {
    #[cfg(feature = "rt")]
    {
        if let Err(e) = rt_mlockall() {
            warn!(error = %e, "mlockall failed, continuing without locked pages");
        }
        if let Some(cpu) = cfg.rt_cpu_core {
            if let Err(e) = rt_set_affinity(cpu) {
                warn!(error = %e, cpu, "sched_setaffinity failed, continuing unpinned");
            }
        }
        if let Err(e) = rt_set_scheduler_fifo(cfg.rt_priority) {
            warn!(error = %e, priority = cfg.rt_priority, "SCHED_FIFO setup failed, continuing on default scheduler");
        } else {
            info!(priority = cfg.rt_priority, "fast loop running under SCHED_FIFO");
        }
    }
    #[cfg(not(feature = "rt"))]
    {
        let _ = cfg;
        info!("rt feature disabled, fast loop runs on the default scheduler");
    }
}

/// Per-second rolling `{min, max, avg, count}` of inter-iteration period,
/// `spec.md` §4.I.
#[derive(Clone, Copy, Debug, Default)]
pub struct JitterStats {
    min_ns: i64,
    max_ns: i64,
    sum_ns: i64,
    count: u32,
}

impl JitterStats {
    pub fn record(&mut self, period_ns: i64) {
        if self.count == 0 || period_ns < self.min_ns {
            self.min_ns = period_ns;
        }
        if period_ns > self.max_ns {
            self.max_ns = period_ns;
        }
        self.sum_ns += period_ns;
        self.count += 1;
    }

    pub fn avg_ns(&self) -> i64 {
        if self.count == 0 {
            0
        } else {
            self.sum_ns / self.count as i64
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// `(max - min) / T_fast * 100`.
    pub fn jitter_pct(&self, t_fast_ns: i64) -> f32 {
        if self.count == 0 || t_fast_ns == 0 {
            return 0.;
        }
        (self.max_ns - self.min_ns) as f32 / t_fast_ns as f32 * 100.
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Owns every component the real-time thread exclusively writes: the
/// estimator, handover controller, and phase driver (`spec.md` §5's
/// "owned by the thread that updates them" rule).
pub struct FastLoop<B: PhaseOutputBackend, H: HallInputs, A: AdcSource, G: GateDriverControl> {
    cfg: Config,
    ctx: MotorContext,
    speed: SpeedEstimator,
    handover: HandoverController,
    driver: PhaseDriver<B>,
    hall: H,
    adc: A,
    gate: G,
    jitter: JitterStats,
    jitter_window_start: Instant,
    was_running: bool,
}

impl<B: PhaseOutputBackend, H: HallInputs, A: AdcSource, G: GateDriverControl> FastLoop<B, H, A, G> {
    pub fn new(cfg: Config, ctx: MotorContext, driver: PhaseDriver<B>, hall: H, adc: A, gate: G) -> Self {
        let speed = SpeedEstimator::new(
            cfg.pole_pairs,
            cfg.min_period_s,
            cfg.zc_threshold_v,
            cfg.standstill_timeout_s,
            cfg.bemf_valid_min_v,
        );
        Self {
            cfg,
            ctx,
            speed,
            handover: HandoverController::new(cfg.sensorless_min_rpm_mech, cfg.sensorless_stable_samples),
            driver,
            hall,
            adc,
            gate,
            jitter: JitterStats::default(),
            jitter_window_start: Instant::now(),
            was_running: false,
        }
    }

    /// One iteration of `spec.md` §4.I, parameterized on a monotonic `now`
    /// (seconds) so tests can drive it with a virtual clock.
    pub fn step(&mut self, now_s: f64) {
        let snap = self.ctx.snapshot();

        // 1. Sample ADC -> update BEMF voltages; also sample Hall, since
        // either path may be the active estimator source.
        let v_u = counts_to_line_volts(self.adc.read_channel(AdcChannel::EmfU));
        let v_v = counts_to_line_volts(self.adc.read_channel(AdcChannel::EmfV));
        let v_w = counts_to_line_volts(self.adc.read_channel(AdcChannel::EmfW));
        let v_bus = counts_to_line_volts(self.adc.read_channel(AdcChannel::VBus));
        let hall_bits = self.hall.read_bits();

        // 2. Update the speed estimator with `now`.
        self.speed.update_hall(now_s, hall_bits);
        self.speed.update_bemf(now_s, v_u, v_v, v_w, v_bus);

        match snap.sensor_mode {
            SensorMode::Hall => {
                if self.speed.mode() != EstimatorMode::Hall {
                    self.speed.set_mode(EstimatorMode::Hall);
                }
                self.handover.reset();
            }
            SensorMode::Bemf => {
                if self.speed.mode() != EstimatorMode::Bemf {
                    let sector = self.speed.sector();
                    self.speed.bemf_align(sector, snap.command.direction);
                    self.speed.set_mode(EstimatorMode::Bemf);
                }
            }
            SensorMode::Auto => {}
        }

        // 3. Update position estimator.
        let pos = position::estimate(&self.speed);

        // 4. If state == RUN, tick handover controller (Auto mode only).
        // `arm()` is only issued on the RUN-entry edge — calling it every
        // tick would reset the in-progress consecutive-sample streak.
        let running_auto = snap.state == ControllerState::Run && snap.sensor_mode == SensorMode::Auto;
        if running_auto {
            if !self.was_running {
                self.handover.arm();
            }
            self.handover.tick(&mut self.speed, &pos, snap.command.direction);
        } else if self.was_running {
            self.handover.reset();
        }
        self.was_running = running_auto;

        // Gate-driver fault lines are sampled here, same cadence as
        // commutation, since a driver fault must stop output within one
        // fast-loop iteration.
        let driver_fault = self.gate.fault_asserted() || self.gate.overtemp_warning_asserted();

        // 5. Commutation.
        let running_state = matches!(snap.state, ControllerState::Run | ControllerState::Align);
        let mut raise: Option<FaultKind> = None;

        if driver_fault && snap.fault == FaultKind::None {
            raise = Some(FaultKind::Driver);
        }

        self.driver.set_enable(snap.command.enable && snap.fault == FaultKind::None && running_state);

        if !snap.command.enable || snap.fault != FaultKind::None || !running_state {
            self.driver.apply_phase_state(crate::types::PhaseState::ALL_OFF, 0.);
        } else {
            // ALIGN commutates off the supervisor's forced open-loop
            // sector counter, not the sensor-derived one — that's the
            // whole point of an open-loop start ramp, and it's what lets
            // a BEMF-mode cold start (no zero-crossings at zero speed)
            // spin up at all. RUN always commutates off the real
            // estimator sector.
            let sector = if snap.state == ControllerState::Align {
                snap.align_sector
            } else {
                pos.sector
            };
            // An invalid sector only faults in RUN.
            if !sector.is_valid() {
                if snap.state == ControllerState::Run {
                    raise = raise.or(Some(FaultKind::Timing));
                }
                self.driver.apply_phase_state(crate::types::PhaseState::ALL_OFF, 0.);
            } else {
                self.driver
                    .set_six_step(sector, snap.command.torque_cmd, snap.command.direction);
            }
        }

        self.gate.set_gate_enable(self.driver.is_enabled());

        // Jitter bookkeeping, once per second.
        let t_fast_ns = (1e9 / self.cfg.fast_hz) as i64;
        let elapsed = self.jitter_window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let pct = self.jitter.jitter_pct(t_fast_ns);
            if pct > self.cfg.jitter_fault_pct {
                raise = Some(FaultKind::Timing);
                warn!(pct, limit = self.cfg.jitter_fault_pct, "fast loop jitter exceeded limit");
            }
            self.jitter.reset();
            self.jitter_window_start = Instant::now();
        }

        let rpm_mech = self.speed.rpm_mech();
        let rpm_elec = self.speed.rpm_elec();

        self.ctx.update(|s| {
            s.measurement.rpm_mech = rpm_mech;
            s.measurement.rpm_elec = rpm_elec;
            s.measurement.v_bus = v_bus;
            if let Some(kind) = raise {
                if s.fault == FaultKind::None {
                    s.fault = kind;
                    s.state = ControllerState::Fault;
                }
            }
        });
    }

    /// Record one inter-iteration period for the jitter window.
    pub fn record_period(&mut self, period: Duration) {
        self.jitter.record(period.as_nanos() as i64);
    }

    /// The estimator's active source (Hall or BEMF), for telemetry and
    /// tests that need to observe a handover actually taking effect.
    pub fn estimator_mode(&self) -> EstimatorMode {
        self.speed.mode()
    }

    /// Whether the Hall->BEMF handover has completed.
    pub fn handover_done(&self) -> bool {
        self.handover.done()
    }

    /// Runs `step` at `T_fast` using absolute-deadline sleeps until
    /// `shutdown` is set, preserving phase alignment on overrun by pushing
    /// the next deadline forward one period rather than catching up.
    pub fn run(&mut self, shutdown: Arc<AtomicBool>) {
        let t_fast = Duration::from_secs_f64(1. / self.cfg.fast_hz as f64);
        let mut next_deadline = Instant::now();
        let mut last_iter_start = next_deadline;

        while !shutdown.load(Ordering::Relaxed) {
            let now = Instant::now();
            self.record_period(now.duration_since(last_iter_start));
            last_iter_start = now;

            let now_s = now.elapsed().as_secs_f64();
            self.step(now_s);

            next_deadline += t_fast;
            let sleep_until = next_deadline;
            let now_after = Instant::now();
            if sleep_until > now_after {
                std::thread::sleep(sleep_until - now_after);
            } else {
                // Overrun: push the deadline forward by one period instead
                // of trying to catch up, preserving phase alignment.
                next_deadline = now_after;
            }
        }

        self.driver.set_enable(false);
        self.gate.set_gate_enable(false);
    }
}
