// Decoded robot state and the pose/odometry views derived from it

use serde::Serialize;

use super::mode::{GaitType, Mode};

/// Inertial measurement as reported by the robot
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Imu {
    /// w, x, y, z
    pub quaternion: [f32; 4],
    /// rad/s
    pub gyroscope: [f32; 3],
    /// m/s^2
    pub accelerometer: [f32; 3],
    /// roll, pitch, yaw in rad
    pub rpy: [f32; 3],
    pub temperature: i8,
}

/// Battery management system state
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BmsState {
    pub version_h: u8,
    pub version_l: u8,
    pub status: u8,
    /// State of charge, percent
    pub soc: u8,
    /// mA, negative while discharging
    pub current: i32,
    pub cycle: u16,
    pub bq_ntc: [i8; 2],
    pub mcu_ntc: [i8; 2],
    /// mV per cell
    pub cell_voltage: [u16; 10],
}

/// Latest state pulled from the robot.
///
/// Only as fresh as the last pull; nothing updates it in the background.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSnapshot {
    pub imu: Imu,
    pub bms: BmsState,
    pub foot_force: [i16; 4],
    /// Raw mode byte as reported
    pub mode: u8,
    pub progress: f32,
    pub gait: u8,
    pub foot_raise_height: f32,
    pub position: [f32; 3],
    pub body_height: f32,
    pub velocity: [f32; 3],
    pub yaw_speed: f32,
}

impl StateSnapshot {
    /// Reported mode, `None` if the byte is not a known mode
    pub fn reported_mode(&self) -> Option<Mode> {
        Mode::from_u8(self.mode)
    }

    pub fn reported_gait(&self) -> Option<GaitType> {
        GaitType::from_u8(self.gait)
    }

    pub fn pose(&self) -> Pose {
        Pose {
            position: Position {
                x: self.position[0],
                y: self.position[1],
                z: self.position[2],
            },
            orientation: Orientation {
                roll: self.imu.rpy[0],
                pitch: self.imu.rpy[1],
                yaw: self.imu.rpy[2],
            },
        }
    }

    pub fn velocity(&self) -> Velocity {
        Velocity {
            x: self.velocity[0],
            y: self.velocity[1],
            yaw_rate: self.yaw_speed,
        }
    }

    pub fn odometry(&self) -> Odometry {
        Odometry {
            pose: self.pose(),
            velocity: self.velocity(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Orientation {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Pose {
    pub position: Position,
    pub orientation: Orientation,
}

/// Body velocity: m/s forward and left, rad/s counter-clockwise
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
    pub yaw_rate: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Odometry {
    pub pose: Pose,
    pub velocity: Velocity,
}
