// Go1 high-level control
//
// Provides:
// - Mode/gait enums and the damping transition rule
// - HighCmd/HighState wire codec
// - UDP link to the onboard controller
// - Motion driver with the stand-up/stand-down sequencing

mod driver;
pub mod link;
pub mod mode;
pub mod protocol;
pub mod state;

pub use driver::{DriverConfig, DriverError, MotionDriver};
pub use link::{Link, UdpLink};
pub use mode::{GaitType, Mode, TransitionError};
pub use protocol::{Command, Led, ProtocolError};
pub use state::{BmsState, Imu, Odometry, Orientation, Pose, Position, StateSnapshot, Velocity};
