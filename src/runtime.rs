// Control loop: 500 Hz state refresh, 1 kHz intent watchdog
// Note: the watchdog zeroes velocity if intents stop arriving, so a crashed
// teleop or planner cannot leave the robot walking at its last speed

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::config::{Args, CONNECT_TIMEOUT, RECV_TIMEOUT, STATE_PERIOD, Topics, WATCHDOG_PERIOD};
use crate::messages::{RuntimeHealth, StateSample, VelocityIntent, now_stamp};
use crate::robot::{DriverConfig, DriverError, Led, Link, MotionDriver, UdpLink};
use crate::telemetry::{TelemetrySink, ZenohTelemetry};

/// Intents buffered between the subscriber task and the loop
const INTENT_QUEUE: usize = 16;

/// Edge-triggered command-recency watchdog.
///
/// Fires once when the last intent is older than the timeout, then stays
/// quiet until a new intent re-arms it.
#[derive(Debug)]
pub struct Watchdog {
    timeout: Duration,
    last_intent: Instant,
    tripped: bool,
}

impl Watchdog {
    /// Armed from `now`, as if an intent had just arrived
    pub fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            timeout,
            last_intent: now,
            tripped: false,
        }
    }

    pub fn feed(&mut self, now: Instant) {
        self.last_intent = now;
        self.tripped = false;
    }

    /// Returns true exactly once per staleness episode
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.tripped {
            return false;
        }
        let age = now.saturating_duration_since(self.last_intent);
        if age >= self.timeout {
            warn!("Command stale ({:?} old), stopping robot", age);
            self.tripped = true;
            return true;
        }
        false
    }

    pub fn health(&self) -> RuntimeHealth {
        if self.tripped {
            RuntimeHealth::CmdStale
        } else {
            RuntimeHealth::Ok
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoopTiming {
    pub state_period: Duration,
    pub watchdog_period: Duration,
    pub cmd_timeout: Duration,
}

impl LoopTiming {
    pub fn with_cmd_timeout(cmd_timeout: Duration) -> Self {
        Self {
            state_period: STATE_PERIOD,
            watchdog_period: WATCHDOG_PERIOD,
            cmd_timeout,
        }
    }
}

/// Counters reported when the loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopReport {
    pub state_cycles: u64,
    pub skipped_cycles: u64,
    pub intents: u64,
    pub watchdog_resets: u64,
}

/// Owns the driver for the lifetime of the process and drives it from one
/// task, so every read-modify-send on the driver is exclusive and in order.
pub struct ControlLoop<L: Link, S: TelemetrySink> {
    driver: MotionDriver<L>,
    telemetry: S,
    watchdog: Watchdog,
    timing: LoopTiming,
    report: LoopReport,
    pull_failing: bool,
}

impl<L: Link, S: TelemetrySink> ControlLoop<L, S> {
    pub fn new(driver: MotionDriver<L>, telemetry: S, timing: LoopTiming) -> Self {
        Self {
            driver,
            telemetry,
            watchdog: Watchdog::new(timing.cmd_timeout, Instant::now()),
            timing,
            report: LoopReport::default(),
            pull_failing: false,
        }
    }

    /// Forward an intent verbatim and restart the staleness window
    pub fn on_intent(&mut self, intent: VelocityIntent) {
        debug!("Received intent: {:?}", intent);
        self.report.intents += 1;
        self.watchdog.feed(Instant::now());
        if let Err(e) = self.driver.walk_with_velocity(intent.x, intent.y, intent.yaw_rate) {
            warn!("Failed to send velocity command: {}", e);
        }
    }

    fn watchdog_cycle(&mut self) {
        if self.watchdog.poll(Instant::now()) {
            self.report.watchdog_resets += 1;
            if let Err(e) = self.driver.walk_with_velocity(0.0, 0.0, 0.0) {
                warn!("Failed to send zero velocity: {}", e);
            }
        }
    }

    /// One pull, published as a single sample. Failures skip the cycle.
    async fn state_cycle(&mut self) {
        self.report.state_cycles += 1;

        let odometry = match self.driver.get_odometry().await {
            Ok(odometry) => odometry,
            Err(e) => {
                self.report.skipped_cycles += 1;
                if !self.pull_failing {
                    warn!("State pull failed, skipping cycles until it recovers: {}", e);
                    self.pull_failing = true;
                }
                return;
            }
        };
        if self.pull_failing {
            info!("State pull recovered");
            self.pull_failing = false;
        }

        let sample = StateSample {
            stamp: now_stamp(),
            odometry,
            imu: self.driver.get_imu(),
            battery: self.driver.get_battery(),
            health: self.watchdog.health(),
        };
        if let Err(e) = self.telemetry.publish(&sample).await {
            warn!("{}", e);
        }
    }

    /// Run until `shutdown` resolves. Dropping the loop afterwards drops the
    /// driver, which stands the robot down.
    pub async fn run(
        &mut self,
        mut intents: mpsc::Receiver<VelocityIntent>,
        shutdown: impl Future<Output = ()>,
    ) -> LoopReport {
        let mut state_tick = interval(self.timing.state_period);
        state_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut watchdog_tick = interval(self.timing.watchdog_period);
        watchdog_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.watchdog.feed(Instant::now());
        let mut intents_open = true;
        tokio::pin!(shutdown);

        info!(
            "Control loop started: {:?} state period, {:?} watchdog period, {}ms command timeout",
            self.timing.state_period,
            self.timing.watchdog_period,
            self.timing.cmd_timeout.as_millis()
        );

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break,

                intent = intents.recv(), if intents_open => match intent {
                    Some(intent) => self.on_intent(intent),
                    None => {
                        warn!("Intent source closed; watchdog will hold the robot still");
                        intents_open = false;
                    }
                },

                _ = watchdog_tick.tick() => self.watchdog_cycle(),

                _ = state_tick.tick() => {
                    // A stalled pull must not delay shutdown
                    let interrupted = tokio::select! {
                        biased;
                        _ = &mut shutdown => true,
                        _ = self.state_cycle() => false,
                    };
                    if interrupted {
                        break;
                    }
                }
            }
        }

        info!(
            "Control loop stopped after {} state cycles ({} skipped), {} intents, {} watchdog resets",
            self.report.state_cycles,
            self.report.skipped_cycles,
            self.report.intents,
            self.report.watchdog_resets
        );
        self.report
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

pub async fn run(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let topics = Topics::new(&args.namespace);

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(topics.cmd_vel.clone()).await?;
    let telemetry = ZenohTelemetry::declare(&session, &topics).await?;
    info!("Subscribed to: {}", topics.cmd_vel);

    let robot_addr = args.robot_addr();
    info!("Connecting to robot at {}", robot_addr);
    let link = UdpLink::open(args.local_port, &robot_addr)
        .await
        .map_err(|source| DriverError::Connection {
            addr: robot_addr.clone(),
            source,
        })?;
    let config = DriverConfig {
        recv_timeout: RECV_TIMEOUT,
        connect_timeout: CONNECT_TIMEOUT,
        ready_led: Led::READY,
        gait: args.gait,
    };
    let driver = MotionDriver::connect(link, config).await?;

    // Bridge Zenoh samples into the loop; malformed payloads never reach the robot
    let (intent_tx, intent_rx) = mpsc::channel(INTENT_QUEUE);
    tokio::spawn(async move {
        while let Ok(sample) = subscriber.recv_async().await {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<VelocityIntent>(&payload) {
                Ok(intent) => {
                    if intent_tx.send(intent).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to parse intent: {}", e);
                }
            }
        }
    });

    let mut control = ControlLoop::new(driver, telemetry, LoopTiming::with_cmd_timeout(args.cmd_timeout()));
    control.run(intent_rx, shutdown_signal()).await;
    drop(control);

    info!("Robot released");
    Ok(())
}
