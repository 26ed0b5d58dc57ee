//! # Serial Transport
//!
//! This module provides the byte-level link to the meter: a [`Transport`]
//! trait so the reader can run against a real serial port or a scripted mock,
//! the tokio-serial implementation, and [`exchange`], the one bounded
//! write-then-read transaction used for every request.

use crate::constants::DEFAULT_BAUDRATE;
use crate::error::MeterError;
use crate::modbus::frame::expected_response_len;
use crate::util::logging::log_frame_hex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, timeout_at, Instant};
use tokio_serial::{SerialPort, SerialPortBuilderExt};

/// Half-duplex byte link to one Modbus slave.
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Drops anything already sitting in the receive buffer.
    async fn clear_input(&mut self) -> Result<(), MeterError>;

    /// Writes the whole frame and flushes it onto the wire.
    async fn write_all(&mut self, frame: &[u8]) -> Result<(), MeterError>;

    /// Reads whatever is available, waiting for at least one byte.
    /// `Ok(0)` means the link was closed.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, MeterError>;

    /// Closes and reopens the underlying link.
    async fn reopen(&mut self) -> Result<(), MeterError>;
}

/// Sends `request` and collects the reply, all within `wait`.
///
/// The clear, the write and the read share one deadline. Reading stops
/// early once the header says the frame is complete. A partially received
/// frame is returned as-is and left to the parser to reject; nothing at all
/// within the window, or a write that never finishes, is a
/// [`MeterError::Timeout`].
pub async fn exchange<T: Transport + ?Sized>(
    transport: &mut T,
    request: &[u8],
    wait: Duration,
) -> Result<Vec<u8>, MeterError> {
    let deadline = Instant::now() + wait;

    let sent = timeout_at(deadline, async {
        transport.clear_input().await?;
        log_frame_hex("tx", request);
        transport.write_all(request).await
    })
    .await;
    match sent {
        Ok(result) => result?,
        Err(_) => return Err(MeterError::Timeout { waited: wait }),
    }

    let mut response = Vec::with_capacity(32);
    let mut chunk = [0u8; 64];

    loop {
        if let Some(len) = expected_response_len(&response) {
            if response.len() >= len {
                break;
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match timeout(remaining, transport.read(&mut chunk)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => response.extend_from_slice(&chunk[..n]),
            Ok(Err(e)) => return Err(e),
            Err(_) => break,
        }
    }

    if response.is_empty() {
        return Err(MeterError::Timeout { waited: wait });
    }

    log_frame_hex("rx", &response);
    Ok(response)
}

/// Configuration for serial connection.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub port: String,
    pub baudrate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            port: "/dev/ttyUSB0".to_string(),
            baudrate: DEFAULT_BAUDRATE,
        }
    }
}

/// Represents a handle to the meter's serial port, 8N1 as the PZEM expects.
pub struct SerialTransport {
    config: SerialConfig,
    port: Option<tokio_serial::SerialStream>,
}

impl SerialTransport {
    /// Opens the configured port. Must be called inside a tokio runtime.
    pub fn open(config: SerialConfig) -> Result<Self, MeterError> {
        let port = Self::open_stream(&config)?;
        log::info!(target: "pzem::link", "opened {} at {} baud", config.port, config.baudrate);
        Ok(SerialTransport {
            config,
            port: Some(port),
        })
    }

    fn open_stream(config: &SerialConfig) -> Result<tokio_serial::SerialStream, MeterError> {
        let port = tokio_serial::new(&config.port, config.baudrate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .open_native_async()?;
        Ok(port)
    }

    fn port_mut(&mut self) -> Result<&mut tokio_serial::SerialStream, MeterError> {
        self.port
            .as_mut()
            .ok_or_else(|| MeterError::Transport(format!("{} is closed", self.config.port)))
    }
}

#[async_trait::async_trait]
impl Transport for SerialTransport {
    async fn clear_input(&mut self) -> Result<(), MeterError> {
        self.port_mut()?
            .clear(tokio_serial::ClearBuffer::Input)
            .map_err(MeterError::from)
    }

    async fn write_all(&mut self, frame: &[u8]) -> Result<(), MeterError> {
        let port = self.port_mut()?;
        AsyncWriteExt::write_all(port, frame).await?;
        AsyncWriteExt::flush(port).await?;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, MeterError> {
        let n = AsyncReadExt::read(self.port_mut()?, buf).await?;
        Ok(n)
    }

    async fn reopen(&mut self) -> Result<(), MeterError> {
        // Drop the old stream first so the device node is released.
        self.port = None;
        self.port = Some(Self::open_stream(&self.config)?);
        log::info!(target: "pzem::link", "reopened {}", self.config.port);
        Ok(())
    }
}
