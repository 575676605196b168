//! Compile-time configuration defaults, plus the optional `KEY=VALUE`
//! text-file override loader (`spec.md` §4.L, §6).
//!
//! Unknown keys are ignored with a warning; malformed lines are skipped
//! with a warning; only positive numeric values replace a default. The
//! file format is UTF-8, one `KEY=VALUE` per line, `#` starts a comment,
//! blank lines are allowed.

use std::fs;
use std::path::Path;

use tracing::warn;

/// Frozen-after-init tunables for the whole control engine. Everything not
/// listed in the recognized-keys table (PI gains, ALIGN startup constants,
/// jitter threshold) is compile-time only, per `spec.md` §9's treatment of
/// those as tunables rather than config-file surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    pub pole_pairs: u32,
    pub kv_rpm_per_v: f32,
    pub r_phase_ohm: f32,
    pub l_phase_h: f32,
    pub i_max_a: f32,
    pub bus_v_min: f32,
    pub bus_v_max: f32,
    pub rpm_max: f32,
    pub fast_hz: f32,
    pub slow_hz: f32,
    pub pwm_frequency_hz: f32,

    /// Hall->BEMF sensorless handover thresholds (`SENSORLESS_MIN_RPM_MECH`,
    /// `SENSORLESS_STABLE_SAMPLES`).
    pub sensorless_min_rpm_mech: f32,
    pub sensorless_stable_samples: u32,

    // --- compile-time only; not present in the recognized-keys table ---
    pub pi_kp: f32,
    pub pi_ki: f32,
    pub pi_out_min: f32,
    pub pi_out_max: f32,

    /// ALIGN-phase open-loop startup: fixed duty, step count, ticks per
    /// step, and the mechanical-speed threshold that (along with step
    /// count) ends ALIGN and enters RUN.
    pub startup_duty: f32,
    pub startup_steps_total: u32,
    pub startup_ticks_per_step: u32,
    pub align_exit_rpm_mech: f32,

    pub stop_threshold_rpm: f32,
    pub reverse_threshold_rpm: f32,
    pub slew_rate_rpm_per_s: f32,

    pub jitter_fault_pct: f32,

    pub min_period_s: f32,
    pub standstill_timeout_s: f32,
    pub zc_threshold_v: f32,
    pub bemf_valid_min_v: f32,

    pub rt_priority: i32,
    pub rt_cpu_core: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pole_pairs: 7,
            kv_rpm_per_v: 700.,
            r_phase_ohm: 0.1,
            l_phase_h: 30e-6,
            i_max_a: 20.,
            bus_v_min: 10.,
            bus_v_max: 40.,
            rpm_max: 10_000.,
            fast_hz: 20_000.,
            slow_hz: 1_000.,
            pwm_frequency_hz: 20_000.,

            sensorless_min_rpm_mech: 500.,
            sensorless_stable_samples: 50,

            pi_kp: 0.02,
            pi_ki: 0.08,
            pi_out_min: 0.,
            pi_out_max: 1.,

            startup_duty: 0.12,
            startup_steps_total: 36,
            startup_ticks_per_step: 5,
            align_exit_rpm_mech: 50.,

            stop_threshold_rpm: 30.,
            reverse_threshold_rpm: 100.,
            slew_rate_rpm_per_s: 2_000.,

            jitter_fault_pct: 10.,

            min_period_s: 150e-6,
            standstill_timeout_s: 0.5,
            zc_threshold_v: 0.15,
            bemf_valid_min_v: 6.,

            rt_priority: 80,
            rt_cpu_core: None,
        }
    }
}

impl Config {
    /// Sanity check rejecting non-positive pole-pairs, an inverted bus
    /// range, non-positive loop rates, etc. Returns overall health.
    pub fn is_healthy(&self) -> bool {
        let mut ok = true;

        if self.pole_pairs == 0 {
            warn!("config: pole_pairs must be positive");
            ok = false;
        }
        if self.bus_v_min >= self.bus_v_max {
            warn!("config: bus_v_min must be less than bus_v_max");
            ok = false;
        }
        if self.fast_hz <= 0. || self.slow_hz <= 0. {
            warn!("config: loop rates must be positive");
            ok = false;
        }
        if self.fast_hz <= self.slow_hz {
            warn!("config: fast_hz should exceed slow_hz");
            ok = false;
        }
        if self.rpm_max <= 0. {
            warn!("config: rpm_max must be positive");
            ok = false;
        }
        if self.sensorless_stable_samples == 0 {
            warn!("config: sensorless_stable_samples must be positive");
            ok = false;
        }
        if self.pi_out_min >= self.pi_out_max {
            warn!("config: pi_out_min must be less than pi_out_max");
            ok = false;
        }

        ok
    }

    /// Load defaults, then apply overrides from `path` if it exists. A
    /// missing file is not an error — it means "defaults only".
    pub fn load(path: impl AsRef<Path>) -> Self {
        let mut cfg = Config::default();
        let path = path.as_ref();

        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(_) => {
                warn!(path = %path.display(), "config file not found, using built-in defaults");
                return cfg;
            }
        };

        cfg.apply_overrides(&text);
        cfg
    }

    /// Apply `KEY=VALUE` lines to `self`. Exposed separately from `load`
    /// so tests can exercise the parser without touching the filesystem.
    pub fn apply_overrides(&mut self, text: &str) {
        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                warn!(line = lineno + 1, "config: malformed line, skipping");
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            let Ok(parsed) = value.parse::<f32>() else {
                warn!(line = lineno + 1, key, value, "config: non-numeric value, skipping");
                continue;
            };
            if !(parsed > 0.) {
                warn!(line = lineno + 1, key, value, "config: non-positive value, skipping");
                continue;
            }

            match key {
                "MOTOR_POLE_PAIRS" => self.pole_pairs = parsed as u32,
                "MOTOR_KV_RPM_PER_V" => self.kv_rpm_per_v = parsed,
                "MOTOR_R_PHASE_OHM" => self.r_phase_ohm = parsed,
                "MOTOR_L_PHASE_H" => self.l_phase_h = parsed,
                "MOTOR_I_MAX_A" => self.i_max_a = parsed,
                "MOTOR_BUS_V_MAX_V" => self.bus_v_max = parsed,
                "MOTOR_BUS_V_MIN_V" => self.bus_v_min = parsed,
                "MOTOR_RPM_MAX" => self.rpm_max = parsed,
                "FAST_LOOP_HZ" => self.fast_hz = parsed,
                "SLOW_LOOP_HZ" => self.slow_hz = parsed,
                "PWM_FREQUENCY_HZ" => self.pwm_frequency_hz = parsed,
                "SENSORLESS_MIN_RPM_MECH" => self.sensorless_min_rpm_mech = parsed,
                "SENSORLESS_STABLE_SAMPLES" => self.sensorless_stable_samples = parsed as u32,
                _ => {
                    warn!(line = lineno + 1, key, "config: unrecognized key, ignoring");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_healthy() {
        assert!(Config::default().is_healthy());
    }

    #[test]
    fn round_trip_default_value_is_a_no_op() {
        let mut cfg = Config::default();
        let before = cfg;
        cfg.apply_overrides("MOTOR_RPM_MAX=10000\n");
        assert_eq!(cfg, before);
    }

    #[test]
    fn overrides_positive_values_only() {
        let mut cfg = Config::default();
        cfg.apply_overrides("MOTOR_RPM_MAX=5000\nFAST_LOOP_HZ=-1\n");
        assert_eq!(cfg.rpm_max, 5000.);
        assert_eq!(cfg.fast_hz, Config::default().fast_hz);
    }

    #[test]
    fn unknown_and_malformed_lines_are_skipped_not_fatal() {
        let mut cfg = Config::default();
        cfg.apply_overrides("# a comment\n\nNOT_A_KEY=1\nTOTALLY_BROKEN\nMOTOR_POLE_PAIRS=9\n");
        assert_eq!(cfg.pole_pairs, 9);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = Config::load("/nonexistent/path/to/motor.conf");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn bad_bus_range_is_unhealthy() {
        let mut cfg = Config::default();
        cfg.bus_v_min = 50.;
        cfg.bus_v_max = 10.;
        assert!(!cfg.is_healthy());
    }
}
