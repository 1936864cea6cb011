// Go1 high-level UDP protocol
//
// Both directions are packed, little-endian C structs terminated by a CRC32:
//   HighCmd   (129 bytes)  driver -> robot
//   HighState (1087 bytes) robot  -> driver
// The robot only answers after receiving a HighCmd, so every state read is
// paired with a command write (see `MotionDriver::refresh_state`).

use tracing::debug;

use super::mode::{GaitType, Mode};
use super::state::{BmsState, Imu, StateSnapshot};

pub const HIGH_CMD_LEN: usize = 129;
pub const HIGH_STATE_LEN: usize = 1087;

/// Frame header bytes
const HEAD: [u8; 2] = [0xFE, 0xEF];

/// `levelFlag` value selecting high-level control
pub const HIGH_LEVEL: u8 = 0xEE;

const CRC_POLY: u32 = 0x04C1_1DB7;

const MOTOR_COUNT: usize = 20;
/// mode u8, 7 x f32, temperature i8, reserve 2 x u32
const MOTOR_STATE_LEN: usize = 38;
const WIRELESS_REMOTE_LEN: usize = 40;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("CRC mismatch: frame carries 0x{received:08X}, computed 0x{computed:08X}")]
    Crc { received: u32, computed: u32 },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Foot LED colour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Led {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Led {
    pub const OFF: Led = Led::new(0, 0, 0);
    /// Shown once the driver owns the robot
    pub const READY: Led = Led::new(0, 255, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Outbound high-level command.
///
/// Only the fields this driver drives are modelled; the header, serial
/// numbers, BMS command and wireless remote block are written as zeros.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    pub mode: Mode,
    pub gait: GaitType,
    pub speed_level: u8,
    pub foot_raise_height: f32,
    pub body_height: f32,
    /// Target x, y for position walking
    pub position: [f32; 2],
    /// Target roll, pitch, yaw
    pub euler: [f32; 3],
    /// Forward and lateral velocity, m/s
    pub velocity: [f32; 2],
    pub yaw_speed: f32,
    /// One colour per foot; this driver always sets all four together
    pub led: [Led; 4],
}

impl Command {
    /// Zero every motion field, keeping the LEDs
    pub fn reset_motion(&mut self) {
        *self = Command {
            led: self.led,
            ..Command::default()
        };
    }

    pub fn zero_velocity(&mut self) {
        self.velocity = [0.0; 2];
        self.yaw_speed = 0.0;
    }

    pub fn set_leds(&mut self, led: Led) {
        self.led = [led; 4];
    }

    /// Serialize into a HighCmd frame, CRC included
    pub fn encode(&self) -> Vec<u8> {
        let mut w = FrameWriter::with_capacity(HIGH_CMD_LEN);

        w.bytes(&HEAD);
        w.u8(HIGH_LEVEL);
        w.u8(0); // frameReserve
        w.zeros(8); // SN
        w.zeros(8); // version
        w.u16(0); // bandWidth
        w.u8(self.mode as u8);
        w.u8(self.gait as u8);
        w.u8(self.speed_level);
        w.f32(self.foot_raise_height);
        w.f32(self.body_height);
        w.f32s(&self.position);
        w.f32s(&self.euler);
        w.f32s(&self.velocity);
        w.f32(self.yaw_speed);
        w.zeros(4); // bms: off + reserve[3]
        for led in &self.led {
            w.bytes(&[led.r, led.g, led.b]);
        }
        w.zeros(WIRELESS_REMOTE_LEN);
        w.u32(0); // reserve

        w.finish_with_crc(HIGH_CMD_LEN)
    }
}

/// Decode a HighState frame into a snapshot
pub fn decode_state(frame: &[u8]) -> Result<StateSnapshot> {
    check_frame(frame, HIGH_STATE_LEN)?;

    let mut r = FrameReader::new(frame);
    r.skip(22); // head, levelFlag, frameReserve, SN, version, bandWidth

    let imu = Imu {
        quaternion: r.f32s(),
        gyroscope: r.f32s(),
        accelerometer: r.f32s(),
        rpy: r.f32s(),
        temperature: r.i8(),
    };

    r.skip(MOTOR_COUNT * MOTOR_STATE_LEN);

    let bms = BmsState {
        version_h: r.u8(),
        version_l: r.u8(),
        status: r.u8(),
        soc: r.u8(),
        current: r.i32(),
        cycle: r.u16(),
        bq_ntc: [r.i8(), r.i8()],
        mcu_ntc: [r.i8(), r.i8()],
        cell_voltage: std::array::from_fn(|_| r.u16()),
    };

    let foot_force = std::array::from_fn(|_| r.i16());
    r.skip(8); // footForceEst

    let state = StateSnapshot {
        imu,
        bms,
        foot_force,
        mode: r.u8(),
        progress: r.f32(),
        gait: r.u8(),
        foot_raise_height: r.f32(),
        position: r.f32s(),
        body_height: r.f32(),
        velocity: r.f32s(),
        yaw_speed: r.f32(),
    };
    // rangeObstacle, foot positions/speeds, remote, reserve and crc follow

    debug!(
        "Decoded state: mode={}, position={:?}, soc={}%",
        state.mode, state.position, state.bms.soc
    );
    Ok(state)
}

fn check_frame(frame: &[u8], expected: usize) -> Result<()> {
    if frame.len() != expected {
        return Err(ProtocolError::Length {
            expected,
            actual: frame.len(),
        });
    }

    let received = u32::from_le_bytes([
        frame[expected - 4],
        frame[expected - 3],
        frame[expected - 2],
        frame[expected - 1],
    ]);
    let computed = crc32(frame);
    if received != computed {
        return Err(ProtocolError::Crc { received, computed });
    }
    Ok(())
}

/// CRC over a full frame, computed like the robot does: MSB-first CRC32 on
/// little-endian u32 words, `len / 4 - 1` words (the trailing CRC word and
/// any unaligned tail are excluded).
fn crc32(frame: &[u8]) -> u32 {
    let words = frame.len() / 4 - 1;
    let mut crc: u32 = 0xFFFF_FFFF;

    for chunk in frame.chunks_exact(4).take(words) {
        let data = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let mut bit: u32 = 1 << 31;
        for _ in 0..32 {
            if crc & 0x8000_0000 != 0 {
                crc = (crc << 1) ^ CRC_POLY;
            } else {
                crc <<= 1;
            }
            if data & bit != 0 {
                crc ^= CRC_POLY;
            }
            bit >>= 1;
        }
    }
    crc
}

struct FrameWriter {
    buf: Vec<u8>,
}

impl FrameWriter {
    fn with_capacity(len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(len),
        }
    }

    fn bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    fn zeros(&mut self, n: usize) {
        self.buf.resize(self.buf.len() + n, 0);
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.bytes(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.bytes(&v.to_le_bytes());
    }

    fn f32(&mut self, v: f32) {
        self.bytes(&v.to_le_bytes());
    }

    fn f32s(&mut self, vs: &[f32]) {
        for &v in vs {
            self.f32(v);
        }
    }

    /// Append the CRC word; `len` is the full frame length including it
    fn finish_with_crc(mut self, len: usize) -> Vec<u8> {
        debug_assert_eq!(self.buf.len() + 4, len);
        self.zeros(4);
        let crc = crc32(&self.buf);
        self.buf[len - 4..].copy_from_slice(&crc.to_le_bytes());
        self.buf
    }
}

/// Sequential reader over a frame whose length was already validated
struct FrameReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn i8(&mut self) -> i8 {
        self.u8() as i8
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn i16(&mut self) -> i16 {
        i16::from_le_bytes(self.take())
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }

    fn f32s<const N: usize>(&mut self) -> [f32; N] {
        std::array::from_fn(|_| self.f32())
    }
}

/// Decode a HighCmd frame (what the robot would see)
#[cfg(test)]
pub(crate) fn decode_command(frame: &[u8]) -> Result<Command> {
    check_frame(frame, HIGH_CMD_LEN)?;

    let mut r = FrameReader::new(frame);
    r.skip(22);
    let mode = r.u8();
    let gait = r.u8();
    let mut cmd = Command {
        mode: Mode::from_u8(mode).unwrap_or_default(),
        gait: GaitType::from_u8(gait).unwrap_or_default(),
        speed_level: r.u8(),
        foot_raise_height: r.f32(),
        body_height: r.f32(),
        position: r.f32s(),
        euler: r.f32s(),
        velocity: r.f32s(),
        yaw_speed: r.f32(),
        led: [Led::OFF; 4],
    };
    r.skip(4);
    for led in &mut cmd.led {
        let [r_, g, b] = r.take::<3>();
        *led = Led::new(r_, g, b);
    }
    Ok(cmd)
}

/// Encode a HighState frame (what the robot would send)
#[cfg(test)]
pub(crate) fn encode_state(state: &StateSnapshot) -> Vec<u8> {
    let mut w = FrameWriter::with_capacity(HIGH_STATE_LEN);

    w.bytes(&HEAD);
    w.u8(HIGH_LEVEL);
    w.zeros(19);

    w.f32s(&state.imu.quaternion);
    w.f32s(&state.imu.gyroscope);
    w.f32s(&state.imu.accelerometer);
    w.f32s(&state.imu.rpy);
    w.u8(state.imu.temperature as u8);

    w.zeros(MOTOR_COUNT * MOTOR_STATE_LEN);

    let bms = &state.bms;
    w.bytes(&[bms.version_h, bms.version_l, bms.status, bms.soc]);
    w.bytes(&bms.current.to_le_bytes());
    w.u16(bms.cycle);
    w.bytes(&[
        bms.bq_ntc[0] as u8,
        bms.bq_ntc[1] as u8,
        bms.mcu_ntc[0] as u8,
        bms.mcu_ntc[1] as u8,
    ]);
    for &cell in &bms.cell_voltage {
        w.u16(cell);
    }

    for &force in &state.foot_force {
        w.bytes(&force.to_le_bytes());
    }
    w.zeros(8);

    w.u8(state.mode);
    w.f32(state.progress);
    w.u8(state.gait);
    w.f32(state.foot_raise_height);
    w.f32s(&state.position);
    w.f32(state.body_height);
    w.f32s(&state.velocity);
    w.f32(state.yaw_speed);

    w.zeros(16 + 48 + 48 + WIRELESS_REMOTE_LEN);
    w.u32(0);

    w.finish_with_crc(HIGH_STATE_LEN)
}
