// Rates, timeouts, endpoints and topics, plus command-line overrides
use std::time::Duration;

use clap::Parser;

use crate::robot::GaitType;

// State refresh loop period (500 Hz)
pub const STATE_PERIOD: Duration = Duration::from_millis(2);

// Watchdog check period (1 kHz)
pub const WATCHDOG_PERIOD: Duration = Duration::from_millis(1);

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(400);

// Bound on a single state pull
pub const RECV_TIMEOUT: Duration = Duration::from_millis(10);

// Bound on the first pull that confirms the robot is there
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

// Go1 high-level controller endpoint, and the local port it replies to
pub const ROBOT_IP: &str = "192.168.123.161";
pub const ROBOT_PORT: u16 = 8082;
pub const LOCAL_PORT: u16 = 8090;

// Zenoh topics, relative to the namespace
pub const NAMESPACE: &str = "unitree";
pub const TOPIC_CMD_VEL: &str = "cmd/vel"; // velocity intents
pub const TOPIC_ODOM: &str = "state/odom";
pub const TOPIC_IMU: &str = "state/imu";
pub const TOPIC_BMS: &str = "state/bms";
pub const TOPIC_HEALTH: &str = "state/health";

#[derive(Debug, Clone, Parser)]
#[command(name = "unitree-zenoh-runtime", about = "Go1 high-level control over Zenoh")]
pub struct Args {
    /// Robot controller IP address
    #[arg(long, default_value = ROBOT_IP)]
    pub robot_ip: String,

    /// Robot controller UDP port
    #[arg(long, default_value_t = ROBOT_PORT)]
    pub robot_port: u16,

    /// Local UDP port the robot replies to
    #[arg(long, default_value_t = LOCAL_PORT)]
    pub local_port: u16,

    /// Prefix for every Zenoh key expression
    #[arg(long, default_value = NAMESPACE)]
    pub namespace: String,

    /// Gait used for walking commands
    #[arg(long, value_enum, default_value_t = GaitType::Trot)]
    pub gait: GaitType,

    /// Zero velocity after this long without an intent (ms)
    #[arg(long, default_value_t = CMD_TIMEOUT.as_millis() as u64)]
    pub cmd_timeout_ms: u64,
}

impl Args {
    pub fn robot_addr(&self) -> String {
        format!("{}:{}", self.robot_ip, self.robot_port)
    }

    pub fn cmd_timeout(&self) -> Duration {
        Duration::from_millis(self.cmd_timeout_ms)
    }
}

/// Key expressions resolved against a namespace
#[derive(Debug, Clone, PartialEq)]
pub struct Topics {
    pub cmd_vel: String,
    pub odom: String,
    pub imu: String,
    pub bms: String,
    pub health: String,
}

impl Topics {
    pub fn new(namespace: &str) -> Self {
        let ns = namespace.trim_matches('/');
        let key = |topic: &str| {
            if ns.is_empty() {
                topic.to_string()
            } else {
                format!("{}/{}", ns, topic)
            }
        };

        Self {
            cmd_vel: key(TOPIC_CMD_VEL),
            odom: key(TOPIC_ODOM),
            imu: key(TOPIC_IMU),
            bms: key(TOPIC_BMS),
            health: key(TOPIC_HEALTH),
        }
    }
}
