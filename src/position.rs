//! Position estimator (`spec.md` §4.E): derives the commutation-reference
//! electrical angle from the current sector. This is the center of the
//! 60-degree sector, not an interpolated rotor angle.

use core::f32::consts::TAU;

use crate::speed_estimator::SpeedEstimator;
use crate::types::Sector;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionEstimate {
    pub elec_angle: f32,
    pub elec_speed: f32,
    pub mech_speed: f32,
    pub sector: Sector,
    pub valid: bool,
}

impl Default for PositionEstimate {
    fn default() -> Self {
        Self {
            elec_angle: 0.,
            elec_speed: 0.,
            mech_speed: 0.,
            sector: Sector::Invalid,
            valid: false,
        }
    }
}

/// Stateless derivation of `PositionEstimate` from the current
/// `SpeedEstimator` output: `elec_angle = (sector + 0.5) * (2*pi/6)`.
pub fn estimate(speed: &SpeedEstimator) -> PositionEstimate {
    let sector = speed.sector();
    match sector.index() {
        Some(i) => PositionEstimate {
            elec_angle: (i as f32 + 0.5) * (TAU / 6.),
            elec_speed: speed.rpm_elec(),
            mech_speed: speed.rpm_mech(),
            sector,
            valid: speed.is_valid(),
        },
        None => PositionEstimate {
            sector: Sector::Invalid,
            ..Default::default()
        },
    }
}
