//! `stator`: sensor-aware six-step BLDC motor controller for a
//! Linux-capable single-board computer. A dual real-time-loop process that
//! commutates a three-phase inverter from Hall sensors, hands over to
//! back-EMF sensorless tracking once the rotor is spinning fast enough, and
//! is supervised by a fault-aware state machine.

pub mod bemf;
pub mod config;
pub mod context;
pub mod drivers;
pub mod error;
pub mod fast_loop;
pub mod hall;
pub mod handover;
pub mod phase_driver;
pub mod pi;
pub mod position;
pub mod remote;
pub mod slow_loop;
pub mod speed_estimator;
pub mod supervisor;
pub mod types;
