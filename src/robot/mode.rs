// Operating modes and gaits understood by the Go1 high-level controller,
// plus the one transition rule the driver enforces at runtime.

/// High-level operating mode (`HighCmd.mode` / `HighState.mode`)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Idle = 0,
    ForceStand = 1,
    WalkWithVelocity = 2,
    WalkWithPose = 3,
    Path = 4,
    StandDown = 5,
    StandUp = 6,
    Damping = 7,
    RecoveryStand = 8,
}

impl Mode {
    /// Decode a mode byte reported by the robot
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Mode::Idle),
            1 => Some(Mode::ForceStand),
            2 => Some(Mode::WalkWithVelocity),
            3 => Some(Mode::WalkWithPose),
            4 => Some(Mode::Path),
            5 => Some(Mode::StandDown),
            6 => Some(Mode::StandUp),
            7 => Some(Mode::Damping),
            8 => Some(Mode::RecoveryStand),
            _ => None,
        }
    }
}

/// Locomotion gait (`HighCmd.gaitType`)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum GaitType {
    #[default]
    Idle = 0,
    Trot = 1,
    TrotRunning = 2,
    ClimbStairs = 3,
    TrotObstacle = 4,
}

impl GaitType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(GaitType::Idle),
            1 => Some(GaitType::Trot),
            2 => Some(GaitType::TrotRunning),
            3 => Some(GaitType::ClimbStairs),
            4 => Some(GaitType::TrotObstacle),
            _ => None,
        }
    }
}

/// A mode change the robot is not in a position to accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot enter {requested:?} while robot reports {reported:?}; stand the robot down first")]
pub struct TransitionError {
    pub requested: Mode,
    /// `None` when the robot reported a mode byte we do not know
    pub reported: Option<Mode>,
}

/// Validate a requested mode against the mode the robot last reported.
///
/// Walking and standing commands are accepted from anywhere: the onboard
/// firmware sequences those itself. Damping cuts leg torque, so it is only
/// allowed once the robot reports it is lying down.
pub fn check_transition(reported: Option<Mode>, requested: Mode) -> Result<(), TransitionError> {
    match requested {
        Mode::Damping if reported != Some(Mode::StandDown) => {
            Err(TransitionError { requested, reported })
        }
        _ => Ok(()),
    }
}
