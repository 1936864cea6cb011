// Keyboard teleop: WASD move, Z/X turn, R/F speed, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use unitree_zenoh_runtime::config::{NAMESPACE, Topics};
use unitree_zenoh_runtime::messages::VelocityIntent;

const SPEEDS: [f32; 3] = [0.1, 0.3, 0.6]; // m/s
const YAW_RATES: [f32; 3] = [0.3, 0.8, 1.5]; // rad/s
const INPUT_TIMEOUT_MS: u64 = 100; // Reset velocities after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let namespace = std::env::args().nth(1).unwrap_or_else(|| NAMESPACE.to_string());
    let topics = Topics::new(&namespace);

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(topics.cmd_vel.clone()).await?;

    info!("Publishing intents to {}", topics.cmd_vel);
    info!("Controls: WASD=move, Z/X=turn, R/F=speed, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Persistent velocity state
    let mut intent = VelocityIntent { x: 0.0, y: 0.0, yaw_rate: 0.0 };
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => intent.x = SPEEDS[speed_idx],
                    KeyCode::Char('s') if pressed => intent.x = -SPEEDS[speed_idx],
                    KeyCode::Char('a') if pressed => intent.y = SPEEDS[speed_idx],
                    KeyCode::Char('d') if pressed => intent.y = -SPEEDS[speed_idx],
                    KeyCode::Char('z') if pressed => intent.yaw_rate = YAW_RATES[speed_idx],
                    KeyCode::Char('x') if pressed => intent.yaw_rate = -YAW_RATES[speed_idx],

                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                        continue;
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                        continue;
                    }

                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => continue,
                }
                last_movement_input = Instant::now();
            }
        }

        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            intent = VelocityIntent { x: 0.0, y: 0.0, yaw_rate: 0.0 };
        }

        // Publishing zeros keeps the runtime's watchdog fed while idle
        publisher.put(serde_json::to_string(&intent)?).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
