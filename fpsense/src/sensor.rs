//! High-level sensor interface

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use fpsense_core::{
    constants::{sys_para, IMAGE_SIZE, NOTEPAD_PAGES, NOTEPAD_PAGE_SIZE, TEMPLATE_SIZE},
    Acknowledge, Address, Engine, Instruction, ReceiveHandler, Request, SendHandler, TransferMode,
};
use fpsense_transport::{SerialTransport, Transport};
use fpsense_types::{
    decode::{u16_at, u32_at},
    template_indexes, BaudRate, CharBuffer, LedColor, LedMode, PacketLength, SearchResult,
    SecurityLevel, SystemParameters,
};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::{
    actor::{Actor, Message},
    config::SensorConfig,
    error::{Error, Result},
    events::{EventHub, EventKind, PortState, SensorEvent},
    transfer::TransferReceiver,
};

/// Fingerprint sensor
///
/// A cheap, cloneable handle to the task that owns the port. Requests from
/// every clone are queued and answered in order; the port is closed once the
/// last handle is dropped.
///
/// # Examples
///
/// ```no_run
/// use fpsense::{Sensor, SensorConfig};
///
/// #[tokio::main]
/// async fn main() -> fpsense::Result<()> {
///     let sensor = Sensor::open(SensorConfig::new("/dev/ttyUSB0")).await?;
///     sensor.ready().await?;
///
///     sensor.handshake().await?;
///     println!("{}", sensor.read_system_parameters().await?);
///
///     sensor.close().await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Sensor {
    tx: mpsc::UnboundedSender<Message>,
    shared: Arc<Shared>,
}

struct Shared {
    config: SensorConfig,
    port_name: String,
    events: Arc<EventHub>,
    state: watch::Receiver<PortState>,
    chunk_size: AtomicUsize,
}

impl Sensor {
    /// Open the serial port named in `config`
    pub async fn open(config: SensorConfig) -> Result<Self> {
        let transport =
            SerialTransport::new(config.port.clone()).with_baud_rate(config.baud_rate.bits_per_second());

        Self::with_transport(Box::new(transport), config).await
    }

    /// Run the protocol over any transport, opening it if needed
    pub async fn with_transport(mut transport: Box<dyn Transport>, config: SensorConfig) -> Result<Self> {
        if !transport.is_open() {
            transport.open().await?;
        }

        let port_name = transport.port_name();
        info!(port = %port_name, address = %Address::new(config.address), "Port open");

        let (tx, messages) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(PortState::Opening);
        let events = Arc::new(EventHub::new());

        let engine = Engine::new(Address::new(config.address), config.timeout);
        let actor = Actor::new(
            engine,
            transport,
            messages,
            events.clone(),
            state_tx,
            config.settle_delay,
        );
        tokio::spawn(actor.run());

        Ok(Self {
            tx,
            shared: Arc::new(Shared {
                chunk_size: AtomicUsize::new(config.packet_length.bytes()),
                config,
                port_name,
                events,
                state,
            }),
        })
    }

    pub fn config(&self) -> &SensorConfig {
        &self.shared.config
    }

    pub fn port_name(&self) -> &str {
        &self.shared.port_name
    }

    pub fn state(&self) -> PortState {
        *self.shared.state.borrow()
    }

    /// Wait until the settle delay has elapsed
    ///
    /// # Errors
    ///
    /// Fails with `PortClosed` if the port closed first.
    pub async fn ready(&self) -> Result<()> {
        let mut state = self.shared.state.clone();
        let state = *state
            .wait_for(|s| *s != PortState::Opening)
            .await
            .map_err(|_| Error::ActorStopped)?;

        match state {
            PortState::Closed => Err(fpsense_core::Error::PortClosed.into()),
            _ => Ok(()),
        }
    }

    /// Close the port
    ///
    /// The request in flight fails with `PortClosed`, queued ones with
    /// `NotSent`, and `PortClose` fires.
    pub async fn close(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Close(reply))
            .map_err(|_| Error::ActorStopped)?;

        rx.await.map_err(|_| Error::ActorStopped)?
    }

    /// Subscribe to every `kind` event
    pub fn on(&self, kind: EventKind, observer: impl Fn(&SensorEvent) + Send + Sync + 'static) {
        self.shared.events.on(kind, observer);
    }

    /// Subscribe to the next `kind` event
    pub fn once(&self, kind: EventKind, observer: impl FnOnce(&SensorEvent) + Send + 'static) {
        self.shared.events.once(kind, observer);
    }

    // Raw access

    /// Send an instruction and return the acknowledge, whatever its code
    pub async fn send_command(&self, instruction: Instruction, args: &[u8]) -> Result<Acknowledge> {
        self.send_command_with(instruction, args, TransferMode::None).await
    }

    /// Send an instruction with a bulk transfer attached
    ///
    /// The call resolves on the acknowledge; the transfer then proceeds and
    /// reports through its handler.
    pub async fn send_command_with(
        &self,
        instruction: Instruction,
        args: &[u8],
        transfer: TransferMode,
    ) -> Result<Acknowledge> {
        let (reply, rx) = oneshot::channel();
        let request = Request::new(instruction, args, move |result| {
            let _ = reply.send(result);
        })
        .with_transfer(transfer);

        self.submit(request, rx).await
    }

    async fn submit(
        &self,
        request: Request,
        rx: oneshot::Receiver<fpsense_core::Result<Acknowledge>>,
    ) -> Result<Acknowledge> {
        self.tx
            .send(Message::Submit(request))
            .map_err(|_| Error::ActorStopped)?;

        let result = rx.await.map_err(|_| Error::ActorStopped)?;
        Ok(result?)
    }

    /// Send an instruction; non-OK codes become [`fpsense_core::Error::Device`]
    async fn execute(&self, instruction: Instruction, args: &[u8]) -> Result<Bytes> {
        let ack = self.send_command(instruction, args).await?;
        Ok(ack.into_result()?)
    }

    async fn execute_with(
        &self,
        instruction: Instruction,
        args: &[u8],
        transfer: TransferMode,
    ) -> Result<()> {
        let ack = self.send_command_with(instruction, args, transfer).await?;
        ack.into_result()?;
        Ok(())
    }

    // System

    pub async fn handshake(&self) -> Result<()> {
        self.execute(Instruction::Handshake, &[0x00]).await?;
        Ok(())
    }

    /// Verify the configured password
    pub async fn verify_password(&self) -> Result<()> {
        self.execute(
            Instruction::VerifyPassword,
            &self.shared.config.password.to_be_bytes(),
        )
        .await?;
        Ok(())
    }

    pub async fn set_password(&self, password: u32) -> Result<()> {
        self.execute(Instruction::SetPassword, &password.to_be_bytes())
            .await?;
        Ok(())
    }

    /// Change the device address
    ///
    /// The sensor answers from the new address. On success every later
    /// request uses it; on failure the old address stays in effect.
    pub async fn set_address(&self, address: u32) -> Result<()> {
        let new_address = Address::new(address);
        let (reply, rx) = oneshot::channel();
        let request = Request::new(Instruction::SetAddress, &address.to_be_bytes(), move |result| {
            let _ = reply.send(result);
        })
        .with_rebind(new_address);

        self.submit(request, rx).await?.into_result()?;
        info!(address = %new_address, "Device address changed");
        Ok(())
    }

    /// Write one basic parameter
    pub async fn set_system_parameter(&self, parameter: u8, value: u8) -> Result<()> {
        self.execute(Instruction::SetSysPara, &[parameter, value])
            .await?;
        Ok(())
    }

    /// Change the sensor's baud rate
    ///
    /// Takes effect on the sensor after a power cycle; reopen the port at the
    /// new rate afterwards.
    pub async fn set_baud_rate(&self, baud_rate: BaudRate) -> Result<()> {
        self.set_system_parameter(sys_para::BAUD_RATE, baud_rate.code())
            .await
    }

    pub async fn set_security_level(&self, level: SecurityLevel) -> Result<()> {
        self.set_system_parameter(sys_para::SECURITY_LEVEL, level.code())
            .await
    }

    /// Change the data packet length; later outbound transfers use it
    pub async fn set_packet_length(&self, length: PacketLength) -> Result<()> {
        self.set_system_parameter(sys_para::PACKET_LENGTH, length.code())
            .await?;
        self.shared.chunk_size.store(length.bytes(), Ordering::Relaxed);
        debug!(chunk_size = length.bytes(), "Packet length changed");
        Ok(())
    }

    pub async fn read_system_parameters(&self) -> Result<SystemParameters> {
        let data = self.execute(Instruction::ReadSysPara, &[]).await?;
        Ok(SystemParameters::parse(&data)?)
    }

    /// Number of stored templates
    pub async fn template_count(&self) -> Result<u16> {
        let data = self.execute(Instruction::TemplateCount, &[]).await?;
        Ok(u16_at(&data, 0, "TEMPLATE_COUNT")?)
    }

    /// Occupied library slots on index page `page` (0..=3)
    pub async fn template_indexes(&self, page: u8) -> Result<Vec<u16>> {
        if page > 3 {
            return Err(Error::InvalidArgument(format!(
                "index page {} outside 0..=3",
                page
            )));
        }

        let data = self.execute(Instruction::TemplateTable, &[page]).await?;
        Ok(template_indexes(page, &data))
    }

    pub async fn get_random_code(&self) -> Result<u32> {
        let data = self.execute(Instruction::GetRandomCode, &[]).await?;
        Ok(u32_at(&data, 0, "GET_RANDOM_CODE")?)
    }

    // Fingerprint processing

    /// Capture a finger image into the image buffer
    pub async fn gen_img(&self) -> Result<()> {
        self.execute(Instruction::GenImg, &[]).await?;
        Ok(())
    }

    /// Extract features from the image buffer into `buffer`
    pub async fn img_2_tz(&self, buffer: CharBuffer) -> Result<()> {
        self.execute(Instruction::Img2Tz, &[buffer.code()]).await?;
        Ok(())
    }

    /// Merge both character buffers into a template
    pub async fn reg_model(&self) -> Result<()> {
        self.execute(Instruction::RegModel, &[]).await?;
        Ok(())
    }

    pub async fn store(&self, buffer: CharBuffer, page_id: u16) -> Result<()> {
        let [hi, lo] = page_id.to_be_bytes();
        self.execute(Instruction::Store, &[buffer.code(), hi, lo])
            .await?;
        Ok(())
    }

    pub async fn load_char(&self, buffer: CharBuffer, page_id: u16) -> Result<()> {
        let [hi, lo] = page_id.to_be_bytes();
        self.execute(Instruction::LoadChar, &[buffer.code(), hi, lo])
            .await?;
        Ok(())
    }

    /// Delete `count` templates starting at `page_id`
    pub async fn delete(&self, page_id: u16, count: u16) -> Result<()> {
        let [page_hi, page_lo] = page_id.to_be_bytes();
        let [count_hi, count_lo] = count.to_be_bytes();
        self.execute(Instruction::DeleteChar, &[page_hi, page_lo, count_hi, count_lo])
            .await?;
        Ok(())
    }

    pub async fn empty_database(&self) -> Result<()> {
        self.execute(Instruction::Empty, &[]).await?;
        Ok(())
    }

    /// Compare both character buffers; returns the matching score
    pub async fn match_templates(&self) -> Result<u16> {
        let data = self.execute(Instruction::Match, &[]).await?;
        Ok(u16_at(&data, 0, "MATCH")?)
    }

    pub async fn search(&self, buffer: CharBuffer, start: u16, count: u16) -> Result<SearchResult> {
        self.search_with(Instruction::Search, buffer, start, count)
            .await
    }

    pub async fn fast_search(
        &self,
        buffer: CharBuffer,
        start: u16,
        count: u16,
    ) -> Result<SearchResult> {
        self.search_with(Instruction::FastSearch, buffer, start, count)
            .await
    }

    async fn search_with(
        &self,
        instruction: Instruction,
        buffer: CharBuffer,
        start: u16,
        count: u16,
    ) -> Result<SearchResult> {
        let [start_hi, start_lo] = start.to_be_bytes();
        let [count_hi, count_lo] = count.to_be_bytes();
        let data = self
            .execute(instruction, &[buffer.code(), start_hi, start_lo, count_hi, count_lo])
            .await?;
        Ok(SearchResult::parse(&data)?)
    }

    // Notepad

    /// Write up to 32 bytes to notepad page `page` (0..=15), zero-padded
    pub async fn write_notepad(&self, page: u8, content: &[u8]) -> Result<()> {
        check_notepad_page(page)?;
        if content.len() > NOTEPAD_PAGE_SIZE {
            return Err(Error::InvalidArgument(format!(
                "notepad content is {} bytes (max: {})",
                content.len(),
                NOTEPAD_PAGE_SIZE
            )));
        }

        let mut args = [0u8; 1 + NOTEPAD_PAGE_SIZE];
        args[0] = page;
        args[1..1 + content.len()].copy_from_slice(content);

        self.execute(Instruction::WriteNotepad, &args).await?;
        Ok(())
    }

    pub async fn read_notepad(&self, page: u8) -> Result<Bytes> {
        check_notepad_page(page)?;
        self.execute(Instruction::ReadNotepad, &[page]).await
    }

    // LED

    pub async fn led_on(&self, on: bool) -> Result<()> {
        let instruction = if on {
            Instruction::LedOn
        } else {
            Instruction::LedOff
        };
        self.execute(instruction, &[]).await?;
        Ok(())
    }

    pub async fn led_control(
        &self,
        mode: LedMode,
        speed: u8,
        color: LedColor,
        cycles: u8,
    ) -> Result<()> {
        self.execute(
            Instruction::LedControl,
            &[mode.code(), speed, color.code(), cycles],
        )
        .await?;
        Ok(())
    }

    // Bulk transfers

    /// Upload the image buffer (36864 bytes) through `handler`
    ///
    /// Resolves on the acknowledge; the data follows through the handler.
    pub async fn up_image(&self, handler: impl ReceiveHandler + 'static) -> Result<()> {
        self.execute_with(
            Instruction::UpImage,
            &[],
            TransferMode::receive(IMAGE_SIZE, handler),
        )
        .await
    }

    /// Download an image into the image buffer
    pub async fn down_image(
        &self,
        data: impl Into<Bytes>,
        handler: impl SendHandler + 'static,
    ) -> Result<()> {
        let transfer = TransferMode::send(data, self.chunk_size(), handler);
        self.execute_with(Instruction::DownImage, &[], transfer)
            .await
    }

    /// Upload the template (512 bytes) held in `buffer` through `handler`
    pub async fn up_char(
        &self,
        buffer: CharBuffer,
        handler: impl ReceiveHandler + 'static,
    ) -> Result<()> {
        self.execute_with(
            Instruction::UpChar,
            &[buffer.code()],
            TransferMode::receive(TEMPLATE_SIZE, handler),
        )
        .await
    }

    /// Download a template into `buffer`
    pub async fn down_char(
        &self,
        buffer: CharBuffer,
        data: impl Into<Bytes>,
        handler: impl SendHandler + 'static,
    ) -> Result<()> {
        let transfer = TransferMode::send(data, self.chunk_size(), handler);
        self.execute_with(Instruction::DownChar, &[buffer.code()], transfer)
            .await
    }

    /// Upload the image buffer and wait for all of it
    pub async fn read_image(&self) -> Result<Bytes> {
        let (observer, events) = TransferReceiver::channel();
        self.up_image(observer).await?;
        events.received().await
    }

    /// Upload the template in `buffer` and wait for all of it
    pub async fn read_char(&self, buffer: CharBuffer) -> Result<Bytes> {
        let (observer, events) = TransferReceiver::channel();
        self.up_char(buffer, observer).await?;
        events.received().await
    }

    fn chunk_size(&self) -> usize {
        self.shared.chunk_size.load(Ordering::Relaxed)
    }
}

fn check_notepad_page(page: u8) -> Result<()> {
    if page >= NOTEPAD_PAGES {
        return Err(Error::InvalidArgument(format!(
            "notepad page {} outside 0..={}",
            page,
            NOTEPAD_PAGES - 1
        )));
    }
    Ok(())
}

impl std::fmt::Debug for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sensor")
            .field("port", &self.shared.port_name)
            .field("state", &self.state())
            .field("events", &self.shared.events)
            .finish()
    }
}
