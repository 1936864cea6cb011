// Datagram link to the robot's high-level controller

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::info;

/// Best-effort, fixed-endpoint channel to the robot.
///
/// `send` and `try_recv` never wait: `send` is also used from `Drop`, where
/// nothing can be awaited. `recv` waits for the next datagram with no bound
/// of its own; callers apply their own timeout.
pub trait Link {
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;

    fn recv(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>>;

    /// Take a datagram that has already arrived. `WouldBlock` when none is
    /// queued.
    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Robot endpoint, for diagnostics
    fn peer(&self) -> String;
}

/// UDP link bound to a local port and connected to the robot.
///
/// Sends and queue reads go straight to the kernel through `raw`, a clone of
/// the same socket. Tokio's readiness cache only learns about the socket
/// once the reactor has polled it, so its `try_*` calls report `WouldBlock`
/// on a fresh socket and miss datagrams that arrived since the last await.
pub struct UdpLink {
    socket: UdpSocket,
    raw: std::net::UdpSocket,
    peer: SocketAddr,
}

impl UdpLink {
    pub async fn open(local_port: u16, robot_addr: &str) -> io::Result<Self> {
        info!("Binding UDP port {} for robot at {}", local_port, robot_addr);
        let socket = UdpSocket::bind(("0.0.0.0", local_port)).await?;
        socket.connect(robot_addr).await?;
        let peer = socket.peer_addr()?;

        // Shares the descriptor, and with it the non-blocking flag
        let raw = socket.into_std()?;
        let socket = UdpSocket::from_std(raw.try_clone()?)?;
        Ok(Self { socket, raw, peer })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Link for UdpLink {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        let sent = self.raw.send(frame)?;
        if sent != frame.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short datagram: {} of {} bytes", sent, frame.len()),
            ));
        }
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv(buf).await
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.raw.recv(buf)
    }

    fn peer(&self) -> String {
        self.peer.to_string()
    }
}
