//! Radio uplink to the ground station.
//!
//! Sends are best-effort: one attempt per dispatch cycle, no retry, no queueing.
//! An unacknowledged batch is dropped here; the same batch was already handed to
//! storage.
//!
//! [`UdpTransport`] stands in for the point-to-point modem on the bench. Every
//! datagram carries the modem's 4-byte header:
//!
//! | byte | field    |
//! |------|----------|
//! | 0    | to       |
//! | 1    | from     |
//! | 2    | sequence |
//! | 3    | flags    |
//!
//! An acknowledgement is a header-only frame with [`ACK_FLAG`] set, echoing the
//! sequence number and addressed back to us.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use crate::config::RadioConfig;
use crate::error::{TelemetryError, TelemetryResult};

/// Length of the frame header.
pub const HEADER_LEN: usize = 4;
/// Flag bit marking an acknowledgement frame.
pub const ACK_FLAG: u8 = 0x80;
/// Largest payload one frame carries.
pub const MAX_PAYLOAD: usize = 65_507 - HEADER_LEN;

/// Point-to-point transport to an addressed station.
#[async_trait]
pub trait RadioTransport: Send {
    /// Send `payload` to `destination`. `Err` on timeout or missing acknowledgement.
    async fn send(&mut self, payload: &[u8], destination: u8) -> Result<()>;
}

/// Modem stand-in over UDP.
pub struct UdpTransport {
    socket: UdpSocket,
    station: SocketAddr,
    address: u8,
    sequence: u8,
    ack_timeout: Option<Duration>,
}

impl UdpTransport {
    /// Bind to `bind` and address frames from `address` to the station at `station`.
    pub async fn open(
        bind: SocketAddr,
        station: SocketAddr,
        address: u8,
        ack_timeout: Option<Duration>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(bind)
            .await
            .with_context(|| format!("binding radio socket on {bind}"))?;
        Ok(Self {
            socket,
            station,
            address,
            sequence: 0,
            ack_timeout,
        })
    }

    /// Open the transport described by the radio configuration.
    pub async fn from_config(config: &RadioConfig) -> Result<Self> {
        Self::open(
            config.bind,
            config.station,
            config.client_address,
            config.ack_timeout(),
        )
        .await
    }

    /// Local socket address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    async fn await_ack(&self, sequence: u8, from: u8, wait: Duration) -> Result<()> {
        match timeout(wait, self.recv_ack(sequence, from)).await {
            Ok(result) => Ok(result?),
            Err(_) => bail!("no acknowledgement within {} ms", wait.as_millis()),
        }
    }

    async fn recv_ack(&self, sequence: u8, from: u8) -> std::io::Result<()> {
        let mut frame = [0u8; HEADER_LEN];
        loop {
            let (len, _) = self.socket.recv_from(&mut frame).await?;
            let [to, sender, seq, flags] = frame;
            if len >= HEADER_LEN
                && flags & ACK_FLAG != 0
                && to == self.address
                && sender == from
                && seq == sequence
            {
                return Ok(());
            }
            debug!(len, seq, "Ignoring unexpected radio frame");
        }
    }
}

#[async_trait]
impl RadioTransport for UdpTransport {
    async fn send(&mut self, payload: &[u8], destination: u8) -> Result<()> {
        if payload.len() > MAX_PAYLOAD {
            bail!("payload of {} bytes exceeds one frame", payload.len());
        }

        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);

        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(&[destination, self.address, sequence, 0]);
        frame.extend_from_slice(payload);
        self.socket
            .send_to(&frame, self.station)
            .await
            .with_context(|| format!("sending to {}", self.station))?;

        if let Some(wait) = self.ack_timeout {
            self.await_ack(sequence, destination, wait).await?;
        }
        Ok(())
    }
}

/// Best-effort uplink of batch text to one fixed station.
pub struct RadioUplink {
    transport: Option<Box<dyn RadioTransport>>,
    destination: u8,
}

impl RadioUplink {
    /// Uplink sending through `transport` to station `destination`.
    pub fn new(transport: Box<dyn RadioTransport>, destination: u8) -> Self {
        Self {
            transport: Some(transport),
            destination,
        }
    }

    /// Uplink with no transport. Every send reports `RadioUnavailable`.
    pub fn disabled() -> Self {
        Self {
            transport: None,
            destination: 0,
        }
    }

    /// Whether a transport is attached.
    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Send one batch. Exactly one attempt.
    pub async fn send(&mut self, text: &str) -> TelemetryResult<()> {
        let Some(transport) = self.transport.as_mut() else {
            return Err(TelemetryError::RadioUnavailable);
        };

        transport
            .send(text.as_bytes(), self.destination)
            .await
            .map_err(|err| {
                let err = TelemetryError::RadioSend {
                    destination: self.destination,
                    reason: format!("{err:#}"),
                };
                warn!(error = %err, "Error sending batch over radio");
                err
            })
    }
}
