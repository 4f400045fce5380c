use crate::config::TrackerTuning;
use crate::types::Fix;
use serde::{Deserialize, Serialize};

/// Sampling mode of the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DutyCycleMode {
    /// Only passive / significant-change updates
    Idle,
    /// Continuous high-frequency loop running
    LiveSampling,
}

/// What the live loop should do after a fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoopDecision {
    /// Keep sampling; the fix goes on to the sample filter
    Continue,
    /// Stationary for too long; the fix is dropped and the loop ends
    Exit { idle_secs: f64 },
}

/// Movement tracker driving the live loop.
///
/// Keeps a stationary anchor and a vehicle flag. On foot the loop stops
/// after `foot_idle_timeout_secs` without movement; once vehicle speed has
/// been seen the longer `vehicle_idle_timeout_secs` applies until the
/// vehicle flag is cleared again.
///
/// All times are fix timestamps (epoch seconds).
#[derive(Debug, Clone)]
pub struct DutyCycleController {
    region_radius_m: f64,
    foot_timeout: f64,
    vehicle_timeout: f64,
    out_of_vehicle_timeout: f64,
    moving_kmh: f64,
    vehicle_kmh: f64,
    vehicle_exit_min_kmh: f64,

    anchor: Option<(f64, f64)>,
    last_moved_at: Option<f64>,
    in_vehicle: bool,
    last_fast_at: f64,
    fixes_seen: u64,
}

impl DutyCycleController {
    pub fn new(tuning: &TrackerTuning) -> Self {
        DutyCycleController {
            region_radius_m: tuning.region_timeout_radius_m,
            foot_timeout: tuning.foot_idle_timeout_secs,
            vehicle_timeout: tuning.vehicle_idle_timeout_secs,
            out_of_vehicle_timeout: tuning.out_of_vehicle_timeout_secs,
            moving_kmh: tuning.moving_speed_kmh,
            vehicle_kmh: tuning.vehicle_speed_kmh,
            vehicle_exit_min_kmh: tuning.min_vehicle_exit_speed_kmh,
            anchor: None,
            last_moved_at: None,
            in_vehicle: false,
            last_fast_at: 0.0,
            fixes_seen: 0,
        }
    }

    /// Forget all movement state (called on every loop start)
    pub fn reset(&mut self) {
        self.anchor = None;
        self.last_moved_at = None;
        self.in_vehicle = false;
        self.last_fast_at = 0.0;
        self.fixes_seen = 0;
    }

    pub fn in_vehicle(&self) -> bool {
        self.in_vehicle
    }

    pub fn last_moved_at(&self) -> Option<f64> {
        self.last_moved_at
    }

    pub fn fixes_seen(&self) -> u64 {
        self.fixes_seen
    }

    pub fn on_fix(&mut self, fix: &Fix) -> LoopDecision {
        self.fixes_seen += 1;
        let speed_kmh = fix.speed_kmh();

        let moved = match (self.anchor, self.last_moved_at) {
            (Some((lat, lon)), Some(_)) => {
                speed_kmh >= self.moving_kmh || fix.distance_to(lat, lon) >= self.region_radius_m
            }
            _ => true,
        };
        if moved {
            self.anchor = Some((fix.latitude, fix.longitude));
            self.last_moved_at = Some(fix.timestamp);
        }

        let last_moved_at = self.last_moved_at.unwrap_or(fix.timestamp);
        let idle_secs = fix.timestamp - last_moved_at;
        if idle_secs > self.vehicle_timeout || (idle_secs > self.foot_timeout && !self.in_vehicle) {
            return LoopDecision::Exit { idle_secs };
        }

        if speed_kmh >= self.vehicle_kmh {
            self.last_fast_at = fix.timestamp;
        }

        // Hysteresis band keeps the flag from flapping around vehicle speed
        if !self.in_vehicle && speed_kmh >= self.vehicle_kmh {
            log::debug!("Vehicle speed detected ({:.1} km/h)", speed_kmh);
            self.in_vehicle = true;
        } else if self.in_vehicle
            && fix.timestamp > self.last_fast_at + self.out_of_vehicle_timeout
            && speed_kmh < self.vehicle_kmh
            && speed_kmh >= self.vehicle_exit_min_kmh
        {
            log::debug!("Left vehicle mode ({:.1} km/h)", speed_kmh);
            self.in_vehicle = false;
        }

        LoopDecision::Continue
    }
}
