// High-level motion driver for the Go1
//
// Owns the outbound command and the last pulled state, and turns motion
// intents into HighCmd frames. Construction stands the robot up; dropping
// the driver stands it down.

use std::io;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::link::Link;
use super::mode::{GaitType, Mode, TransitionError, check_transition};
use super::protocol::{Command, Led, ProtocolError, decode_state};
use super::state::{BmsState, Imu, Odometry, Orientation, Position, StateSnapshot};
use crate::config::{CONNECT_TIMEOUT, RECV_TIMEOUT};

/// Larger than a HighState frame so oversized datagrams are detected
const RECV_BUF_LEN: usize = 2048;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Connection to the robot at {addr} could not be established: {source}")]
    Connection {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Robot did not answer within {0:?}; connection could not be established")]
    NoResponse(Duration),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("No state reply within {0:?}")]
    TransportTimeout(Duration),

    #[error("Link error: {0}")]
    Link(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

pub type Result<T> = std::result::Result<T, DriverError>;

#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Bound on each state pull
    pub recv_timeout: Duration,
    /// Bound on the first pull that confirms the link
    pub connect_timeout: Duration,
    /// Colour shown on all four feet once connected
    pub ready_led: Led,
    /// Gait used by walking commands after stand-up
    pub gait: GaitType,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            recv_timeout: RECV_TIMEOUT,
            connect_timeout: CONNECT_TIMEOUT,
            ready_led: Led::READY,
            gait: GaitType::Trot,
        }
    }
}

/// Motion driver for one robot connection
pub struct MotionDriver<L: Link> {
    link: L,
    cmd: Command,
    /// Last frame put on the wire, replayed by every state pull
    last_frame: Vec<u8>,
    state: StateSnapshot,
    mode: Mode,
    gait: GaitType,
    recv_timeout: Duration,
    recv_buf: Vec<u8>,
}

impl<L: Link> MotionDriver<L> {
    /// Confirm the link, light the feet, reset the command and stand up.
    ///
    /// The robot is standing when this returns `Ok`.
    pub async fn connect(link: L, config: DriverConfig) -> Result<Self> {
        let cmd = Command::default();
        let last_frame = cmd.encode();
        let mut driver = Self {
            link,
            cmd,
            last_frame,
            state: StateSnapshot::default(),
            mode: Mode::Idle,
            gait: GaitType::Idle,
            recv_timeout: config.recv_timeout,
            recv_buf: vec![0u8; RECV_BUF_LEN],
        };

        info!("Waiting for robot to answer...");
        match driver.pull(config.connect_timeout).await {
            Ok(()) => {}
            Err(DriverError::TransportTimeout(bound)) => return Err(DriverError::NoResponse(bound)),
            Err(DriverError::Link(source)) => {
                return Err(DriverError::Connection {
                    addr: driver.link.peer(),
                    source,
                });
            }
            Err(e) => return Err(e),
        }
        debug!(
            "Robot reports mode {:?}, gait {:?}",
            driver.state.reported_mode(),
            driver.state.reported_gait()
        );

        driver.illuminate(config.ready_led)?;
        driver.init_command();
        driver.stand_up()?;
        driver.gait = config.gait;

        info!("Robot connected and standing (walking gait {:?})", driver.gait);
        Ok(driver)
    }

    // === Motion commands ===

    pub fn walk_with_velocity(&mut self, x: f32, y: f32, yaw_rate: f32) -> Result<()> {
        self.mode = Mode::WalkWithVelocity;
        self.cmd.velocity = [x, y];
        self.cmd.yaw_speed = yaw_rate;
        self.send()
    }

    /// Walk towards a target pose. Only x and y of the position are carried
    /// by the protocol.
    pub fn walk_with_pose(&mut self, position: Position, orientation: Orientation) -> Result<()> {
        self.mode = Mode::WalkWithPose;
        self.cmd.position = [position.x, position.y];
        self.cmd.euler = [orientation.roll, orientation.pitch, orientation.yaw];
        self.send()
    }

    pub fn stand_up(&mut self) -> Result<()> {
        info!("Standing up");
        self.cmd.zero_velocity();
        self.mode = Mode::StandUp;
        self.gait = GaitType::Trot;
        self.send()
    }

    pub fn stand_down(&mut self) -> Result<()> {
        info!("Standing down");
        self.cmd.zero_velocity();
        self.gait = GaitType::Idle;
        self.mode = Mode::StandDown;
        self.send()
    }

    /// Cut leg torque. Refused (and reported) unless the robot says it is
    /// lying down.
    pub async fn enter_damping(&mut self) -> Result<()> {
        self.refresh_state().await?;

        if let Err(e) = check_transition(self.state.reported_mode(), Mode::Damping) {
            warn!("{}", e);
            return Err(e.into());
        }

        info!("Entering damping mode");
        self.mode = Mode::Damping;
        self.transmit()
    }

    /// Zero velocity, stand down, then try to enter damping.
    ///
    /// The robot usually has not finished lying down by the time damping is
    /// attempted; that refusal is logged and not treated as a failure.
    pub async fn stop(&mut self) -> Result<()> {
        info!("Stopping robot");
        self.walk_with_velocity(0.0, 0.0, 0.0)?;
        self.stand_down()?;

        match self.enter_damping().await {
            Ok(()) | Err(DriverError::InvalidTransition(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Set the all-feet LED colour and send it
    pub fn illuminate(&mut self, led: Led) -> Result<()> {
        debug!("Setting foot LEDs to {:?}", led);
        self.cmd.set_leds(led);
        self.send()
    }

    // === Local state, no network effect ===

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn set_gait(&mut self, gait: GaitType) {
        self.gait = gait;
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn gait(&self) -> GaitType {
        self.gait
    }

    /// The command as last built (mode and gait reflect the last send)
    pub fn command(&self) -> &Command {
        &self.cmd
    }

    // === State ===

    /// Pull a fresh snapshot from the robot.
    ///
    /// The controller only replies to an incoming command, so this re-sends
    /// the last transmitted frame before waiting. A state read therefore
    /// always repeats the previous command on the wire; it never transmits
    /// mode or gait changes that have not been sent yet.
    pub async fn refresh_state(&mut self) -> Result<&StateSnapshot> {
        self.pull(self.recv_timeout).await?;
        Ok(&self.state)
    }

    /// One pull, with pose and velocity derived from that same snapshot
    pub async fn get_odometry(&mut self) -> Result<Odometry> {
        self.refresh_state().await?;
        Ok(self.state.odometry())
    }

    /// IMU from the last pull
    pub fn get_imu(&self) -> Imu {
        self.state.imu
    }

    /// Battery state from the last pull
    pub fn get_battery(&self) -> BmsState {
        self.state.bms
    }

    pub fn state(&self) -> &StateSnapshot {
        &self.state
    }

    // === Protocol ===

    /// Transmit the command with the current mode and gait. Fire and forget.
    ///
    /// Damping staged with `set_mode` is refused here and the staged mode is
    /// dropped; only `enter_damping` checks the robot is lying down first.
    pub fn send(&mut self) -> Result<()> {
        if self.mode == Mode::Damping && self.cmd.mode != Mode::Damping {
            let refused = TransitionError {
                requested: Mode::Damping,
                reported: self.state.reported_mode(),
            };
            warn!("{}; use enter_damping", refused);
            self.mode = self.cmd.mode;
            return Err(refused.into());
        }
        self.transmit()
    }

    fn transmit(&mut self) -> Result<()> {
        self.cmd.mode = self.mode;
        self.cmd.gait = self.gait;
        self.last_frame = self.cmd.encode();
        self.link.send(&self.last_frame)?;

        debug!(
            "Sent command: mode={:?}, gait={:?}, vel={:?}, yaw={}",
            self.cmd.mode, self.cmd.gait, self.cmd.velocity, self.cmd.yaw_speed
        );
        Ok(())
    }

    fn init_command(&mut self) {
        self.cmd.reset_motion();
        self.mode = Mode::Idle;
        self.gait = GaitType::Idle;
    }

    /// One request/response round trip.
    ///
    /// Every frame sent elicits a reply, including fire-and-forget commands
    /// and pulls that timed out. Replies already queued are discarded before
    /// the request, and once a reply arrives any newer one queued behind it
    /// wins, so the snapshot follows the latest command sent.
    async fn pull(&mut self, bound: Duration) -> Result<()> {
        if self.take_queued()?.is_some() {
            debug!("Discarded state replies queued before the pull");
        }
        self.link.send(&self.last_frame)?;

        let mut len = match timeout(bound, self.link.recv(&mut self.recv_buf)).await {
            Ok(received) => received?,
            Err(_) => return Err(DriverError::TransportTimeout(bound)),
        };
        if let Some(newer) = self.take_queued()? {
            len = newer;
        }

        self.state = decode_state(&self.recv_buf[..len])?;
        Ok(())
    }

    /// Read every datagram already queued into `recv_buf`, returning the
    /// length of the newest
    fn take_queued(&mut self) -> io::Result<Option<usize>> {
        let mut newest = None;
        loop {
            match self.link.try_recv(&mut self.recv_buf) {
                Ok(len) => newest = Some(len),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(newest),
                Err(e) => return Err(e),
            }
        }
    }
}

impl<L: Link> Drop for MotionDriver<L> {
    fn drop(&mut self) {
        // Single attempt; nobody is left to handle a failure
        if let Err(e) = self.stand_down() {
            warn!("Failed to stand robot down on shutdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::link::mock::MockLink;

    async fn connected() -> (MotionDriver<MockLink>, MockLink) {
        let link = MockLink::new();
        let driver = MotionDriver::connect(link.clone(), DriverConfig::default())
            .await
            .unwrap();
        (driver, link)
    }

    #[tokio::test]
    async fn test_connect_sequence() {
        let (driver, link) = connected().await;

        let sent = link.commands();
        assert_eq!(sent.len(), 3);

        // The link check replays the zeroed command
        assert_eq!(sent[0].mode, Mode::Idle);
        assert_eq!(sent[0].led, [Led::OFF; 4]);

        // Feet lit before anything moves
        assert_eq!(sent[1].mode, Mode::Idle);
        assert_eq!(sent[1].led, [Led::READY; 4]);

        // Then stand up, with the LEDs kept through the command reset
        assert_eq!(sent[2].mode, Mode::StandUp);
        assert_eq!(sent[2].gait, GaitType::Trot);
        assert_eq!(sent[2].velocity, [0.0; 2]);
        assert_eq!(sent[2].led, [Led::READY; 4]);

        assert_eq!(driver.gait(), GaitType::Trot);
    }

    #[tokio::test]
    async fn test_configured_gait_applies_after_stand_up() {
        let link = MockLink::new();
        let config = DriverConfig {
            gait: GaitType::TrotRunning,
            ..DriverConfig::default()
        };
        let mut driver = MotionDriver::connect(link.clone(), config).await.unwrap();

        assert_eq!(link.commands()[2].gait, GaitType::Trot);

        driver.walk_with_velocity(0.3, 0.0, 0.0).unwrap();
        assert_eq!(link.commands().last().unwrap().gait, GaitType::TrotRunning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_fails_without_reply() {
        let link = MockLink::new();
        link.set_silent(true);

        let result = MotionDriver::connect(link.clone(), DriverConfig::default()).await;
        assert!(matches!(result, Err(DriverError::NoResponse(_))));

        // The half-built driver still stands down exactly once
        let sent = link.commands();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].mode, Mode::StandDown);
    }

    #[tokio::test]
    async fn test_connect_fails_when_link_is_down() {
        let link = MockLink::new();
        link.set_fail_send(true);

        let result = MotionDriver::connect(link.clone(), DriverConfig::default()).await;
        match result {
            Err(DriverError::Connection { addr, .. }) => assert_eq!(addr, "mock robot"),
            other => panic!("expected connection error, got {:?}", other.map(|_| ())),
        }
        assert_eq!(link.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_drop_stands_down_once() {
        let (mut driver, link) = connected().await;
        driver.walk_with_velocity(0.5, 0.0, 0.1).unwrap();
        link.clear();

        drop(driver);

        let sent = link.commands();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].mode, Mode::StandDown);
        assert_eq!(sent[0].gait, GaitType::Idle);
        assert_eq!(sent[0].velocity, [0.0; 2]);
        assert_eq!(sent[0].yaw_speed, 0.0);
    }

    #[tokio::test]
    async fn test_drop_swallows_send_failure() {
        let (driver, link) = connected().await;
        link.set_fail_send(true);
        drop(driver);
    }

    #[tokio::test]
    async fn test_set_mode_and_gait_are_local() {
        let (mut driver, link) = connected().await;
        let before = link.sent_count();

        driver.set_gait(GaitType::ClimbStairs);
        driver.set_mode(Mode::ForceStand);
        driver.set_gait(GaitType::TrotObstacle);
        assert_eq!(link.sent_count(), before);

        // A pull replays the previous frame, not the pending changes
        driver.refresh_state().await.unwrap();
        let replayed = link.commands().last().unwrap().clone();
        assert_eq!(replayed.mode, Mode::StandUp);
        assert_eq!(replayed.gait, GaitType::Trot);

        driver.send().unwrap();
        let sent = link.commands().last().unwrap().clone();
        assert_eq!(sent.mode, Mode::ForceStand);
        assert_eq!(sent.gait, GaitType::TrotObstacle);
        assert_eq!(driver.command().mode, Mode::ForceStand);
    }

    #[tokio::test]
    async fn test_walk_with_velocity_uses_current_gait() {
        let (mut driver, link) = connected().await;
        driver.set_gait(GaitType::ClimbStairs);
        driver.walk_with_velocity(0.4, -0.2, 0.7).unwrap();

        let sent = link.commands().last().unwrap().clone();
        assert_eq!(sent.mode, Mode::WalkWithVelocity);
        assert_eq!(sent.gait, GaitType::ClimbStairs);
        assert_eq!(sent.velocity, [0.4, -0.2]);
        assert_eq!(sent.yaw_speed, 0.7);
    }

    #[tokio::test]
    async fn test_walk_with_pose() {
        let (mut driver, link) = connected().await;
        driver
            .walk_with_pose(
                Position { x: 1.0, y: -1.0, z: 0.3 },
                Orientation { roll: 0.1, pitch: 0.2, yaw: 0.3 },
            )
            .unwrap();

        let sent = link.commands().last().unwrap().clone();
        assert_eq!(sent.mode, Mode::WalkWithPose);
        assert_eq!(sent.gait, GaitType::Trot);
        assert_eq!(sent.position, [1.0, -1.0]);
        assert_eq!(sent.euler, [0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_stand_up_then_down_zero_velocity() {
        let (mut driver, link) = connected().await;
        driver.walk_with_velocity(1.0, 0.5, 0.3).unwrap();
        link.clear();

        driver.stand_up().unwrap();
        driver.stand_down().unwrap();

        let sent = link.commands();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].mode, Mode::StandUp);
        assert_eq!(sent[1].mode, Mode::StandDown);
        for cmd in &sent {
            assert_eq!(cmd.velocity, [0.0; 2]);
            assert_eq!(cmd.yaw_speed, 0.0);
        }
    }

    #[tokio::test]
    async fn test_refresh_resends_last_command() {
        let (mut driver, link) = connected().await;
        driver.walk_with_velocity(0.2, 0.0, 0.0).unwrap();
        let walk = link.commands().last().unwrap().clone();
        link.clear();
        let calls = link.recv_calls();

        driver.refresh_state().await.unwrap();

        assert_eq!(link.commands(), vec![walk]);
        assert_eq!(link.recv_calls(), calls + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_times_out() {
        let (mut driver, link) = connected().await;
        link.set_silent(true);

        let err = driver.refresh_state().await.unwrap_err();
        assert!(matches!(err, DriverError::TransportTimeout(t) if t == RECV_TIMEOUT));
    }

    #[tokio::test]
    async fn test_odometry_from_single_pull() {
        let (mut driver, link) = connected().await;
        link.set_state(StateSnapshot {
            position: [0.5, 0.25, 0.3],
            velocity: [0.1, 0.2, 0.0],
            yaw_speed: 0.05,
            imu: Imu {
                rpy: [0.0, 0.0, 0.8],
                ..Imu::default()
            },
            bms: BmsState {
                soc: 64,
                ..BmsState::default()
            },
            ..StateSnapshot::default()
        });
        let calls = link.recv_calls();

        let odom = driver.get_odometry().await.unwrap();
        assert_eq!(link.recv_calls(), calls + 1);
        assert_eq!(odom.pose.position, Position { x: 0.5, y: 0.25, z: 0.3 });
        assert_eq!(odom.pose.orientation.yaw, 0.8);
        assert_eq!(odom.velocity.yaw_rate, 0.05);

        // Accessors read the same snapshot without another round trip
        let sent = link.sent_count();
        assert_eq!(driver.get_imu().rpy, [0.0, 0.0, 0.8]);
        assert_eq!(driver.get_battery().soc, 64);
        assert_eq!(link.sent_count(), sent);
        assert_eq!(link.recv_calls(), calls + 1);
    }

    #[tokio::test]
    async fn test_damping_refused_unless_stood_down() {
        let (mut driver, link) = connected().await;
        link.set_reported_mode(Mode::StandUp);
        link.clear();

        let err = driver.enter_damping().await.unwrap_err();
        assert!(matches!(err, DriverError::InvalidTransition(_)));

        // Only the pull's replay went out
        let sent = link.commands();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].mode, Mode::StandUp);
        assert_eq!(driver.mode(), Mode::StandUp);
    }

    #[tokio::test]
    async fn test_damping_when_stood_down() {
        let (mut driver, link) = connected().await;
        driver.stand_down().unwrap();
        link.set_reported_mode(Mode::StandDown);
        link.clear();

        driver.enter_damping().await.unwrap();

        let sent = link.commands();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].mode, Mode::StandDown);
        assert_eq!(sent[1].mode, Mode::Damping);
    }

    #[tokio::test]
    async fn test_stop_sequence() {
        let (mut driver, link) = connected().await;
        driver.walk_with_velocity(0.6, 0.0, 0.0).unwrap();
        link.set_reported_mode(Mode::StandDown);
        link.clear();

        driver.stop().await.unwrap();

        let modes: Vec<Mode> = link.commands().iter().map(|c| c.mode).collect();
        assert_eq!(
            modes,
            vec![
                Mode::WalkWithVelocity,
                Mode::StandDown,
                Mode::StandDown, // replay for the state pull
                Mode::Damping,
            ]
        );
        assert_eq!(link.commands()[0].velocity, [0.0; 2]);
    }

    #[tokio::test]
    async fn test_stop_tolerates_refused_damping() {
        let (mut driver, link) = connected().await;
        link.set_reported_mode(Mode::StandUp);

        driver.stop().await.unwrap();
        assert_eq!(driver.mode(), Mode::StandDown);
    }

    #[tokio::test]
    async fn test_staged_damping_is_refused() {
        let (mut driver, link) = connected().await;
        driver.refresh_state().await.unwrap();
        let before = link.sent_count();

        driver.set_mode(Mode::Damping);
        let err = driver.send().unwrap_err();
        assert!(matches!(
            err,
            DriverError::InvalidTransition(TransitionError {
                requested: Mode::Damping,
                reported: Some(Mode::StandUp),
            })
        ));
        assert_eq!(link.sent_count(), before);
        assert_eq!(driver.mode(), Mode::StandUp);

        // Lying down is not enough either; the check belongs to enter_damping
        driver.stand_down().unwrap();
        link.set_reported_mode(Mode::StandDown);
        driver.refresh_state().await.unwrap();
        driver.set_mode(Mode::Damping);
        assert!(driver.send().is_err());
        assert_eq!(link.commands().last().unwrap().mode, Mode::StandDown);

        driver.enter_damping().await.unwrap();
        assert_eq!(link.commands().last().unwrap().mode, Mode::Damping);
    }

    // === Over a real UDP socket ===

    use std::net::SocketAddr;

    use tokio::net::UdpSocket;

    use crate::robot::link::UdpLink;
    use crate::robot::protocol::{decode_command, encode_state};

    fn udp_config() -> DriverConfig {
        DriverConfig {
            recv_timeout: Duration::from_millis(50),
            ..DriverConfig::default()
        }
    }

    fn reporting(mode: Mode) -> StateSnapshot {
        StateSnapshot {
            mode: mode as u8,
            ..StateSnapshot::default()
        }
    }

    async fn udp_robot() -> (UdpSocket, UdpLink) {
        let robot = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = robot.local_addr().unwrap().to_string();
        let link = UdpLink::open(0, &addr).await.unwrap();
        (robot, link)
    }

    /// Robot that answers every frame, reporting the mode it was commanded
    async fn echo_robot(robot: UdpSocket) {
        let mut buf = [0u8; 256];
        while let Ok((len, from)) = robot.recv_from(&mut buf).await {
            let Ok(cmd) = decode_command(&buf[..len]) else {
                continue;
            };
            let reply = encode_state(&reporting(cmd.mode));
            if robot.send_to(&reply, from).await.is_err() {
                break;
            }
        }
    }

    /// Answer the next frame with a state reporting `mode`
    async fn answer(robot: &UdpSocket, mode: Mode) -> SocketAddr {
        let mut buf = [0u8; 256];
        let (_, from) = robot.recv_from(&mut buf).await.unwrap();
        robot.send_to(&encode_state(&reporting(mode)), from).await.unwrap();
        from
    }

    #[tokio::test]
    async fn test_connect_over_udp() {
        let (robot, link) = udp_robot().await;
        tokio::spawn(echo_robot(robot));

        let mut driver = MotionDriver::connect(link, udp_config()).await.unwrap();
        assert_eq!(driver.state().reported_mode(), Some(Mode::Idle));

        driver.refresh_state().await.unwrap();
        assert_eq!(driver.state().reported_mode(), Some(Mode::StandUp));
    }

    #[tokio::test]
    async fn test_pull_tracks_latest_command_over_udp() {
        let (robot, link) = udp_robot().await;
        tokio::spawn(echo_robot(robot));
        let mut driver = MotionDriver::connect(link, udp_config()).await.unwrap();

        // Each of these elicits a reply nobody reads
        for step in 0..5 {
            driver.walk_with_velocity(0.1 * step as f32, 0.0, 0.0).unwrap();
        }
        driver.stand_down().unwrap();

        driver.refresh_state().await.unwrap();
        assert_eq!(driver.state().reported_mode(), Some(Mode::StandDown));
        driver.refresh_state().await.unwrap();
        assert_eq!(driver.state().reported_mode(), Some(Mode::StandDown));

        driver.stand_up().unwrap();
        driver.refresh_state().await.unwrap();
        assert_eq!(driver.state().reported_mode(), Some(Mode::StandUp));

        let err = driver.enter_damping().await.unwrap_err();
        assert!(matches!(err, DriverError::InvalidTransition(_)));
        assert_eq!(driver.command().mode, Mode::StandUp);
    }

    #[tokio::test]
    async fn test_late_reply_is_not_used_by_next_pull() {
        let (robot, link) = udp_robot().await;
        let (connected, peer) = tokio::join!(
            MotionDriver::connect(link, udp_config()),
            answer(&robot, Mode::StandUp),
        );
        let mut driver = connected.unwrap();

        // Swallow the LED and stand-up frames
        let mut buf = [0u8; 256];
        while let Ok(Ok(_)) = timeout(Duration::from_millis(20), robot.recv_from(&mut buf)).await {}

        let err = driver.refresh_state().await.unwrap_err();
        assert!(matches!(err, DriverError::TransportTimeout(_)));

        // The reply to the timed-out pull shows up afterwards
        robot.recv_from(&mut buf).await.unwrap();
        robot
            .send_to(&encode_state(&reporting(Mode::StandDown)), peer)
            .await
            .unwrap();

        let (refreshed, _) = tokio::join!(driver.refresh_state(), answer(&robot, Mode::StandUp));
        assert_eq!(refreshed.unwrap().reported_mode(), Some(Mode::StandUp));
    }
}
