//! Unified speed estimator (`spec.md` §4.D): wraps either the Hall decoder
//! or the BEMF sector tracker behind one `{rpm_mech, rpm_elec,
//! last_period_s, sector, valid}` surface, so the fast loop and supervisor
//! don't need to know which source is currently active.

use crate::bemf::BemfSectorTracker;
use crate::hall::hall_to_sector;
use crate::types::{Direction, Sector};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EstimatorMode {
    Hall,
    Bemf,
}

struct HallPath {
    sector: Sector,
    rpm_elec: f32,
    rpm_mech: f32,
    last_period_s: f32,
    valid: bool,
    last_edge_ts: Option<f64>,

    pole_pairs: u32,
    min_period_s: f32,
    standstill_timeout_s: f32,
}

impl HallPath {
    fn new(pole_pairs: u32, min_period_s: f32, standstill_timeout_s: f32) -> Self {
        Self {
            sector: Sector::Invalid,
            rpm_elec: 0.,
            rpm_mech: 0.,
            last_period_s: 0.,
            valid: false,
            last_edge_ts: None,
            pole_pairs,
            min_period_s,
            standstill_timeout_s,
        }
    }

    fn update(&mut self, now: f64, hall_bits: u8) {
        let decoded = hall_to_sector(hall_bits);

        if !decoded.is_valid() {
            self.valid = false;
            self.rpm_elec = 0.;
            self.rpm_mech = 0.;
            return;
        }

        if decoded != self.sector {
            self.sector = decoded;
            match self.last_edge_ts {
                None => self.last_edge_ts = Some(now),
                Some(last) => {
                    let dt = (now - last) as f32;
                    if dt > self.min_period_s {
                        let t_elec = dt * 6.;
                        self.rpm_elec = 60. / t_elec;
                        self.rpm_mech = self.rpm_elec / self.pole_pairs as f32;
                        self.valid = true;
                        self.last_period_s = dt;
                    }
                    self.last_edge_ts = Some(now);
                }
            }
        } else if let Some(last) = self.last_edge_ts {
            if (now - last) as f32 > self.standstill_timeout_s {
                self.rpm_elec = 0.;
                self.rpm_mech = 0.;
                self.valid = false;
            }
        }
    }
}

/// Speed estimator unifying the Hall and BEMF sources (`spec.md` §4.D).
pub struct SpeedEstimator {
    mode: EstimatorMode,
    hall: HallPath,
    bemf: BemfSectorTracker,
}

impl SpeedEstimator {
    pub fn new(
        pole_pairs: u32,
        min_period_s: f32,
        zc_threshold_v: f32,
        standstill_timeout_s: f32,
        bemf_valid_min_v: f32,
    ) -> Self {
        Self {
            mode: EstimatorMode::Hall,
            hall: HallPath::new(pole_pairs, min_period_s, standstill_timeout_s),
            bemf: BemfSectorTracker::new(
                pole_pairs,
                min_period_s,
                zc_threshold_v,
                standstill_timeout_s,
                bemf_valid_min_v,
            ),
        }
    }

    pub fn mode(&self) -> EstimatorMode {
        self.mode
    }

    /// Switches the active source. Mode change clears speeds and edge
    /// history on both paths, as `spec.md` §4.D requires.
    pub fn set_mode(&mut self, mode: EstimatorMode) {
        self.mode = mode;
        self.hall.valid = false;
        self.hall.rpm_elec = 0.;
        self.hall.rpm_mech = 0.;
        self.hall.last_edge_ts = None;
    }

    /// Align the BEMF tracker ahead of a handover, without switching the
    /// active mode yet. Callers should follow with `set_mode(Bemf)`.
    pub fn bemf_align(&mut self, sector: Sector, dir: Direction) {
        self.bemf.set_sector(sector);
        self.bemf.set_direction(dir);
    }

    pub fn update_hall(&mut self, now: f64, hall_bits: u8) {
        self.hall.update(now, hall_bits);
    }

    pub fn update_bemf(
        &mut self,
        now: f64,
        v_phase_u: f32,
        v_phase_v: f32,
        v_phase_w: f32,
        v_bus: f32,
    ) {
        self.bemf.update(now, v_phase_u, v_phase_v, v_phase_w, v_bus);
    }

    pub fn sector(&self) -> Sector {
        match self.mode {
            EstimatorMode::Hall => self.hall.sector,
            EstimatorMode::Bemf => self.bemf.sector(),
        }
    }

    pub fn rpm_mech(&self) -> f32 {
        match self.mode {
            EstimatorMode::Hall => self.hall.rpm_mech,
            EstimatorMode::Bemf => self.bemf.rpm_mech(),
        }
    }

    pub fn rpm_elec(&self) -> f32 {
        match self.mode {
            EstimatorMode::Hall => self.hall.rpm_elec,
            EstimatorMode::Bemf => self.bemf.rpm_elec(),
        }
    }

    pub fn last_period_s(&self) -> f32 {
        match self.mode {
            EstimatorMode::Hall => self.hall.last_period_s,
            EstimatorMode::Bemf => self.bemf.last_period_s(),
        }
    }

    pub fn is_valid(&self) -> bool {
        match self.mode {
            EstimatorMode::Hall => self.hall.valid,
            EstimatorMode::Bemf => self.bemf.is_valid(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hall_invalid_pattern_invalidates_and_keeps_sector() {
        let mut est = SpeedEstimator::new(7, 150e-6, 0.15, 0.5, 6.0);
        est.update_hall(0.0, 0b001);
        assert_eq!(est.sector(), Sector::S0);
        est.update_hall(0.001, 0b000);
        assert!(!est.is_valid());
        assert_eq!(est.sector(), Sector::S0);
    }

    #[test]
    fn hall_sector_change_below_min_period_is_ignored() {
        let mut est = SpeedEstimator::new(7, 150e-6, 0.15, 0.5, 6.0);
        est.update_hall(0.0, 0b001);
        est.update_hall(0.00005, 0b011); // 50us < 150us min period
        assert!(!est.is_valid());
    }

    #[test]
    fn hall_sector_change_computes_speed() {
        let mut est = SpeedEstimator::new(7, 150e-6, 0.15, 0.5, 6.0);
        est.update_hall(0.0, 0b001);
        est.update_hall(0.001, 0b011);
        assert!(est.is_valid());
        assert!(est.rpm_elec() > 0.);
    }

    #[test]
    fn standstill_zeroes_rpm_but_keeps_last_sector() {
        let mut est = SpeedEstimator::new(7, 150e-6, 0.15, 0.5, 6.0);
        est.update_hall(0.0, 0b001);
        est.update_hall(0.001, 0b011);
        assert!(est.is_valid());
        est.update_hall(0.001 + 0.6, 0b011);
        assert!(!est.is_valid());
        assert_eq!(est.rpm_mech(), 0.);
        assert_eq!(est.sector(), Sector::S1);
    }

    #[test]
    fn mode_change_clears_hall_history() {
        let mut est = SpeedEstimator::new(7, 150e-6, 0.15, 0.5, 6.0);
        est.update_hall(0.0, 0b001);
        est.update_hall(0.001, 0b011);
        assert!(est.is_valid());
        est.bemf_align(Sector::S1, Direction::Forward);
        est.set_mode(EstimatorMode::Bemf);
        assert_eq!(est.mode(), EstimatorMode::Bemf);
        assert!(!est.is_valid());
    }
}
