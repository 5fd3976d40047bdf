//! Serial port transport
//!
//! The sensor talks 8N1 at a multiple of 9600 baud (57600 by default).
//! Reads happen on a dedicated thread that forwards every chunk into a
//! channel, so [`Transport::receive`] is cancel-safe. Writes run on the
//! blocking pool; an image download keeps the port busy for seconds.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use fpsense_core::constants::DEFAULT_BAUD_RATE;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::{error::*, Transport};

/// Poll interval of the reader thread
const READ_POLL: Duration = Duration::from_millis(50);

const READ_BUFFER_SIZE: usize = 1024;

enum Inbound {
    Bytes(BytesMut),
    Failed(io::Error),
}

/// Serial port transport
pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    read_poll: Duration,
    writer: Option<Box<dyn SerialPort>>,
    inbound: Option<mpsc::UnboundedReceiver<Inbound>>,
    shutdown: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl SerialTransport {
    /// Create a transport for `path` at the default baud rate
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_poll: READ_POLL,
            writer: None,
            inbound: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            reader: None,
        }
    }

    /// Set baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set how long a blocking read waits before checking for shutdown
    pub fn with_read_poll(mut self, interval: Duration) -> Self {
        self.read_poll = interval;
        self
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Start the reader thread and keep `port` for writing
    fn attach(&mut self, port: Box<dyn SerialPort>) -> Result<()> {
        let reader = port.try_clone()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(AtomicBool::new(false));

        let flag = shutdown.clone();
        let handle = std::thread::Builder::new()
            .name(format!("fpsense-rx:{}", self.path))
            .spawn(move || read_loop(reader, tx, flag))?;

        self.writer = Some(port);
        self.inbound = Some(rx);
        self.shutdown = shutdown;
        self.reader = Some(handle);
        Ok(())
    }

    fn teardown(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.writer = None;
        self.inbound = None;
        // The reader exits within one poll interval; no need to wait for it
        self.reader = None;
    }
}

fn read_loop(
    mut port: Box<dyn SerialPort>,
    tx: mpsc::UnboundedSender<Inbound>,
    shutdown: Arc<AtomicBool>,
) {
    let mut buf = [0u8; READ_BUFFER_SIZE];

    while !shutdown.load(Ordering::Relaxed) && !tx.is_closed() {
        match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                trace!("Read {} bytes: {}", n, hex::encode(&buf[..n.min(32)]));
                if tx.send(Inbound::Bytes(BytesMut::from(&buf[..n]))).is_err() {
                    break;
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                warn!("Serial read failed: {}", e);
                let _ = tx.send(Inbound::Failed(e));
                break;
            }
        }
    }

    debug!("Serial reader stopped");
}

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Err(Error::AlreadyOpen);
        }

        if self.path.trim().is_empty() {
            return Err(Error::InvalidPort("empty port path".into()));
        }

        debug!("Opening {} at {} baud...", self.path, self.baud_rate);

        let port = serialport::new(&self.path, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.read_poll)
            .open()?;

        self.attach(port)?;
        debug!("Opened {}", self.path);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.is_open() {
            debug!("Closing {}...", self.path);
        }

        self.teardown();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Not cancel-safe: dropping the future mid-write loses the port
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut writer = self.writer.take().ok_or(Error::NotOpen)?;

        trace!(
            "Writing {} bytes: {}",
            data.len(),
            hex::encode(&data[..data.len().min(32)])
        );

        let frame = data.to_vec();
        let (writer, written) = tokio::task::spawn_blocking(move || {
            let written = writer.write_all(&frame).and_then(|()| writer.flush());
            (writer, written)
        })
        .await
        .map_err(|e| {
            warn!("Serial writer task failed: {}", e);
            self.teardown();
            Error::Io(io::Error::other(e))
        })?;

        self.writer = Some(writer);
        written?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<BytesMut> {
        let inbound = self.inbound.as_mut().ok_or(Error::NotOpen)?;

        match inbound.recv().await {
            Some(Inbound::Bytes(bytes)) => Ok(bytes),
            // The reader has stopped; the next call reports the close
            Some(Inbound::Failed(e)) => Err(Error::Io(e)),
            None => {
                debug!("{} closed", self.path);
                self.teardown();
                Err(Error::ConnectionClosed)
            }
        }
    }

    fn port_name(&self) -> String {
        self.path.clone()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

/// Names of the serial ports present on this machine
pub fn available_ports() -> Result<Vec<String>> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|port| port.port_name)
        .collect())
}
