// Messages exchanged with the rest of the system over Zenoh

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::robot::{BmsState, Imu, Odometry};

// Velocity intent from teleop/planners -> runtime
// m/s forward and left, rad/s counter-clockwise
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityIntent {
    pub x: f32,
    pub y: f32,
    pub yaw_rate: f32,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}

/// Wall-clock seconds since the Unix epoch
pub fn now_stamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}

/// Published state with the time it was pulled, flattened into one object
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stamped<T> {
    pub stamp: f64,
    #[serde(flatten)]
    pub data: T,
}

/// Everything published once per state cycle, taken from a single pull
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateSample {
    /// When the pull completed, see `now_stamp`
    pub stamp: f64,
    pub odometry: Odometry,
    pub imu: Imu,
    pub battery: BmsState,
    pub health: RuntimeHealth,
}
