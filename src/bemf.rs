//! BEMF sector tracker (`spec.md` §4.C): derives sector index and
//! electrical speed from the floating-phase voltage referenced to
//! synthetic neutral (`V_bus/2`).

use crate::types::{floating_phase, Direction, Phase, Sector};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ZcSign {
    Pos,
    Neg,
    Zero,
}

impl ZcSign {
    fn classify(diff: f32, deadband: f32) -> Self {
        if diff > deadband {
            ZcSign::Pos
        } else if diff < -deadband {
            ZcSign::Neg
        } else {
            ZcSign::Zero
        }
    }
}

/// BEMF tracker state (`spec.md` §3 `BemfSectorState`). Invariant: when
/// `valid`, `last_period_s > min_period_s` and `sector` is one of the six
/// valid sectors.
#[derive(Clone, Copy, Debug)]
pub struct BemfSectorTracker {
    sector: Sector,
    dir: Direction,
    rpm_elec: f32,
    rpm_mech: f32,
    last_period_s: f32,
    valid: bool,
    last_zc_time: f64,
    prev_zc_time: f64,
    last_sample_time: f64,
    last_diff: f32,
    last_sign: ZcSign,

    pole_pairs: u32,
    min_period_s: f32,
    zc_threshold_v: f32,
    standstill_timeout_s: f32,
    bemf_valid_min_v: f32,
}

impl BemfSectorTracker {
    pub fn new(
        pole_pairs: u32,
        min_period_s: f32,
        zc_threshold_v: f32,
        standstill_timeout_s: f32,
        bemf_valid_min_v: f32,
    ) -> Self {
        Self {
            sector: Sector::Invalid,
            dir: Direction::Forward,
            rpm_elec: 0.,
            rpm_mech: 0.,
            last_period_s: 0.,
            valid: false,
            last_zc_time: 0.,
            prev_zc_time: 0.,
            last_sample_time: 0.,
            last_diff: 0.,
            last_sign: ZcSign::Zero,
            pole_pairs,
            min_period_s,
            zc_threshold_v,
            standstill_timeout_s,
            bemf_valid_min_v,
        }
    }

    pub fn sector(&self) -> Sector {
        self.sector
    }

    pub fn rpm_elec(&self) -> f32 {
        self.rpm_elec
    }

    pub fn rpm_mech(&self) -> f32 {
        self.rpm_mech
    }

    pub fn last_period_s(&self) -> f32 {
        self.last_period_s
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Force alignment: clears ZC history and validity. Used at bring-up
    /// and by the handover controller's atomic transition.
    pub fn set_sector(&mut self, sector: Sector) {
        self.sector = sector;
        self.valid = false;
        self.rpm_elec = 0.;
        self.rpm_mech = 0.;
        self.last_period_s = 0.;
        self.last_zc_time = 0.;
        self.prev_zc_time = 0.;
        self.last_sign = ZcSign::Zero;
    }

    pub fn set_direction(&mut self, dir: Direction) {
        self.dir = dir;
    }

    /// One update step. `v_phase_u/v/w` and `v_bus` are line voltages
    /// (already through the ADC conversion chain); `now` is a monotonic
    /// seconds timestamp.
    pub fn update(&mut self, now: f64, v_phase_u: f32, v_phase_v: f32, v_phase_w: f32, v_bus: f32) {
        if v_bus < self.bemf_valid_min_v {
            self.valid = false;
            self.rpm_elec = 0.;
            self.rpm_mech = 0.;
            return;
        }

        if self.valid && (now - self.last_zc_time) as f32 > self.standstill_timeout_s {
            self.valid = false;
            self.rpm_elec = 0.;
            self.rpm_mech = 0.;
        }

        let Some(phase) = floating_phase(self.sector) else {
            self.last_sample_time = now;
            return;
        };

        let v_phase = match phase {
            Phase::U => v_phase_u,
            Phase::V => v_phase_v,
            Phase::W => v_phase_w,
        };

        let diff = v_phase - v_bus / 2.;
        let sign = ZcSign::classify(diff, self.zc_threshold_v);

        if self.last_sign != ZcSign::Zero && sign != ZcSign::Zero && sign != self.last_sign {
            let t_zc = (self.last_sample_time + now) / 2.;
            let dt_zc = (t_zc - self.last_zc_time) as f32;

            if dt_zc > self.min_period_s {
                let t_elec = dt_zc * 6.;
                self.rpm_elec = 60. / t_elec;
                self.rpm_mech = self.rpm_elec / self.pole_pairs as f32;
                self.last_period_s = dt_zc;
                self.valid = true;
                self.sector = self.sector.advance(self.dir.sign());

                self.prev_zc_time = self.last_zc_time;
                self.last_zc_time = t_zc;
            }
        }

        self.last_sign = sign;
        self.last_diff = diff;
        self.last_sample_time = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> BemfSectorTracker {
        let mut t = BemfSectorTracker::new(7, 150e-6, 0.15, 0.5, 6.0);
        t.set_sector(Sector::S0);
        t.set_direction(Direction::Forward);
        t
    }

    #[test]
    fn low_bus_voltage_invalidates_output() {
        let mut t = tracker();
        t.update(0.0, 0., 0., 5., 5.0); // below bemf_valid_min_v
        assert!(!t.is_valid());
        assert_eq!(t.rpm_mech(), 0.);
    }

    #[test]
    fn zero_crossing_advances_sector_and_computes_speed() {
        let mut t = tracker();
        let v_bus = 24.0;
        // sector 0 floats W; drive it from below to above the deadband.
        t.update(0.0, 0., 0., v_bus / 2. - 1.0, v_bus);
        t.update(0.001, 0., 0., v_bus / 2. + 1.0, v_bus);
        assert!(t.is_valid());
        assert_eq!(t.sector(), Sector::S1);
        assert!(t.rpm_elec() > 0.);
    }

    #[test]
    fn short_dt_below_min_period_is_ignored() {
        let mut t = tracker();
        let v_bus = 24.0;
        t.update(0.0, 0., 0., v_bus / 2. - 1.0, v_bus);
        // well within min_period_s (150us)
        t.update(0.00005, 0., 0., v_bus / 2. + 1.0, v_bus);
        assert!(!t.is_valid());
        assert_eq!(t.sector(), Sector::S0);
    }

    #[test]
    fn standstill_timeout_invalidates_but_keeps_sector() {
        let mut t = tracker();
        let v_bus = 24.0;
        t.update(0.0, 0., 0., v_bus / 2. - 1.0, v_bus);
        t.update(0.001, 0., 0., v_bus / 2. + 1.0, v_bus);
        assert!(t.is_valid());
        let sector_before = t.sector();
        t.update(0.001 + 0.6, 0., 0., v_bus / 2., v_bus);
        assert!(!t.is_valid());
        assert_eq!(t.sector(), sector_before);
    }

    #[test]
    fn deadband_suppresses_noise_near_zero() {
        let mut t = tracker();
        let v_bus = 24.0;
        t.update(0.0, 0., 0., v_bus / 2. + 0.05, v_bus); // inside deadband -> Zero
        assert_eq!(t.last_sign, ZcSign::Zero);
    }
}
