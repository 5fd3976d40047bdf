//! Half-duplex protocol engine
//!
//! The engine owns the command queue, the receive accumulator and the
//! transfer state. It performs no I/O: inbound bytes and timer expiry are
//! fed in, and the frames to write plus timer commands come out through
//! [`Engine::poll_output`].
//!
//! ```text
//!             submit            Acknowledge (no transfer / non-OK)
//! Available ─────────► Command ────────────────────────────────► Available
//!                        │  Acknowledge + receive                    ▲
//!                        ├──────────────────► Receiving ─EndOfData───┤
//!                        │  Acknowledge + send                       │
//!                        └──────────────────► Sending ───(sync)──────┘
//! ```
//!
//! At most one command is on the wire. Framing errors, timeouts and a
//! closed port all return the engine to `Available` and advance the queue.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::{
    error::Error,
    packet::{Address, Packet, PacketId, Parsed},
    queue::{Acknowledge, CommandQueue, Request},
    transfer::{InboundTransfer, OutboundTransfer, TransferMode},
};

/// Action the I/O driver must carry out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Write these bytes to the transport
    Transmit(Bytes),
    /// (Re)start the response timer from now
    ArmTimer,
    /// Stop the response timer
    CancelTimer,
}

/// Observable engine mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    Available,
    Command,
    DataReceive,
    DataSend,
}

enum Mode {
    Available,
    /// The queue head is on the wire
    Command,
    Receiving(InboundTransfer),
    Sending(OutboundTransfer),
}

impl Mode {
    fn kind(&self) -> EngineMode {
        match self {
            Self::Available => EngineMode::Available,
            Self::Command => EngineMode::Command,
            Self::Receiving(_) => EngineMode::DataReceive,
            Self::Sending(_) => EngineMode::DataSend,
        }
    }
}

/// Protocol state machine
pub struct Engine {
    /// Address written into outbound frames
    address: Address,
    /// Address inbound frames must carry
    reply_address: Address,
    timeout: Duration,
    mode: Mode,
    queue: CommandQueue,
    rx: BytesMut,
    outputs: VecDeque<Output>,
}

impl Engine {
    pub fn new(address: Address, timeout: Duration) -> Self {
        Self {
            address,
            reply_address: address,
            timeout,
            mode: Mode::Available,
            queue: CommandQueue::new(),
            rx: BytesMut::with_capacity(1024),
            outputs: VecDeque::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn mode(&self) -> EngineMode {
        self.mode.kind()
    }

    /// Requests not yet resolved, including the one on the wire
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Bytes buffered but not yet parsed
    pub fn buffered(&self) -> usize {
        self.rx.len()
    }

    /// Next action for the I/O driver
    pub fn poll_output(&mut self) -> Option<Output> {
        self.outputs.pop_front()
    }

    /// Queue a request; it goes out as soon as the engine is available
    pub fn submit(&mut self, request: Request) {
        trace!(request = ?request, queued = self.queue.len(), "Request queued");
        self.queue.enqueue(request);
        self.try_send();
    }

    /// Feed bytes received from the transport
    ///
    /// Chunks may split or coalesce frames arbitrarily. Every complete frame
    /// in the accumulator is processed before returning.
    pub fn handle_bytes(&mut self, data: &[u8]) {
        if matches!(self.mode, Mode::Available) {
            trace!(len = data.len(), "Discarding bytes received while idle");
            return;
        }

        self.rx.extend_from_slice(data);

        while matches!(self.mode, Mode::Command | Mode::Receiving(_)) {
            match Packet::parse(&self.rx, self.reply_address) {
                Ok(Parsed::Incomplete) => break,
                Ok(Parsed::Frame { packet, consumed }) => {
                    let raw = self.rx.split_to(consumed);
                    trace!(frame = %hex::encode(&raw), "Received frame");
                    self.handle_frame(packet);
                }
                Err(error) => {
                    warn!(
                        buffered = %hex::encode(&self.rx),
                        "Dropping receive buffer: {}", error
                    );
                    self.rx.clear();
                    self.handle_frame_error(error);
                }
            }
        }
    }

    /// The response timer expired
    pub fn handle_timeout(&mut self, port_open: bool) {
        let error = if port_open {
            Error::Timeout {
                millis: self.timeout.as_millis() as u64,
            }
        } else {
            Error::PortNotOpen
        };

        match std::mem::replace(&mut self.mode, Mode::Available) {
            Mode::Command => {
                warn!("Command timed out: {}", error);
                self.reject_active(error);
            }
            Mode::Receiving(mut transfer) => {
                warn!(
                    received = transfer.received(),
                    expected = transfer.expected_size(),
                    "Inbound transfer timed out: {}", error
                );
                transfer.fail(error);
                self.return_to_available();
            }
            other => {
                self.mode = other;
                trace!("Timer expired with nothing in flight");
            }
        }
    }

    /// The transport closed; nothing queued can be delivered any more
    pub fn handle_port_closed(&mut self) {
        match std::mem::replace(&mut self.mode, Mode::Available) {
            Mode::Command => {
                if let Some(mut request) = self.queue.pop() {
                    request.complete(Err(Error::PortClosed));
                }
            }
            Mode::Receiving(mut transfer) => transfer.fail(Error::PortClosed),
            Mode::Available | Mode::Sending(_) => {}
        }

        let flushed = self.queue.len();
        for mut request in self.queue.drain() {
            request.complete(Err(Error::NotSent));
        }
        if flushed > 0 {
            debug!(flushed, "Rejected queued requests after port close");
        }

        self.outputs.push_back(Output::CancelTimer);
        self.rx.clear();
        self.reply_address = self.address;
    }

    fn try_send(&mut self) {
        while matches!(self.mode, Mode::Available) {
            let Some(head) = self.queue.head() else {
                return;
            };

            let instruction = head.instruction();
            let rebind = head.rebind;
            let packet = Packet::with_payload(PacketId::Command, self.address, head.payload.clone());

            if let Err(error) = head.validate().and_then(|()| packet.validate()) {
                warn!(?instruction, "Rejecting command: {}", error);
                if let Some(mut request) = self.queue.pop() {
                    request.complete(Err(error));
                }
                continue;
            }

            if let Some(address) = rebind {
                self.reply_address = address;
            }

            debug!(?instruction, "Sending command");

            self.rx.clear();
            self.mode = Mode::Command;
            self.transmit(&packet);
            self.outputs.push_back(Output::ArmTimer);
        }
    }

    fn transmit(&mut self, packet: &Packet) {
        let bytes = packet.encode().freeze();
        trace!(frame = %hex::encode(&bytes), "Transmit {}", packet);
        self.outputs.push_back(Output::Transmit(bytes));
    }

    fn handle_frame(&mut self, packet: Packet) {
        match std::mem::replace(&mut self.mode, Mode::Available) {
            Mode::Command => self.handle_acknowledge(packet),
            Mode::Receiving(transfer) => self.handle_data(transfer, packet),
            other => self.mode = other,
        }
    }

    fn handle_frame_error(&mut self, error: Error) {
        match std::mem::replace(&mut self.mode, Mode::Available) {
            Mode::Command => self.reject_active(error),
            Mode::Receiving(mut transfer) => {
                transfer.fail(error);
                self.outputs.push_back(Output::CancelTimer);
                self.return_to_available();
            }
            other => self.mode = other,
        }
    }

    fn handle_acknowledge(&mut self, packet: Packet) {
        if packet.id != PacketId::Acknowledge {
            self.reject_active(Error::corrupted(format!(
                "expected ACK, received {}",
                packet.id.name()
            )));
            return;
        }

        let Some(&code) = packet.payload.first() else {
            self.reject_active(Error::corrupted("acknowledge without confirmation code"));
            return;
        };

        let ack = Acknowledge {
            code: code.into(),
            data: packet.payload.slice(1..),
        };

        self.outputs.push_back(Output::CancelTimer);

        let Some(mut request) = self.queue.pop() else {
            warn!("Acknowledge without an active request");
            self.return_to_available();
            return;
        };

        if let Some(address) = request.rebind {
            if ack.is_ok() {
                debug!(%address, "Device address changed");
                self.address = address;
            }
            self.reply_address = self.address;
        }

        debug!(
            instruction = ?request.instruction(),
            code = %ack.code,
            data_len = ack.data.len(),
            "Acknowledge received"
        );

        let transfer = std::mem::replace(&mut request.transfer, TransferMode::None);
        let code = ack.code;
        request.complete(Ok(ack));

        match transfer {
            TransferMode::Receive {
                expected_size,
                handler,
            } if code.is_ok() => {
                debug!(expected_size, "Inbound transfer started");
                self.mode = Mode::Receiving(InboundTransfer::new(expected_size, handler));
                self.outputs.push_back(Output::ArmTimer);
            }
            TransferMode::Receive { mut handler, .. } => {
                handler.on_error(Error::Device(code));
                self.return_to_available();
            }
            TransferMode::Send {
                data,
                chunk_size,
                handler,
            } if code.is_ok() => {
                let chunk_size = chunk_size.min(Packet::MAX_PAYLOAD_SIZE);
                debug!(len = data.len(), chunk_size, "Outbound transfer started");
                self.rx.clear();
                self.mode = Mode::Sending(OutboundTransfer::new(data, chunk_size, handler));
                self.stream_outbound();
            }
            TransferMode::Send { .. } | TransferMode::None => self.return_to_available(),
        }
    }

    fn handle_data(&mut self, mut transfer: InboundTransfer, packet: Packet) {
        match packet.id {
            PacketId::DataChunk => {
                transfer.append(packet.payload);
                self.mode = Mode::Receiving(transfer);
                self.outputs.push_back(Output::ArmTimer);
            }
            PacketId::EndOfData => {
                transfer.append(packet.payload);
                self.outputs.push_back(Output::CancelTimer);
                transfer.finish();
                self.return_to_available();
            }
            other => {
                transfer.fail(Error::corrupted(format!(
                    "expected data packet, received {}",
                    other.name()
                )));
                self.outputs.push_back(Output::CancelTimer);
                self.return_to_available();
            }
        }
    }

    /// Write every chunk of the active outbound transfer
    fn stream_outbound(&mut self) {
        let Mode::Sending(transfer) = &mut self.mode else {
            return;
        };

        while let Some(chunk) = transfer.next_chunk() {
            let id = if chunk.last {
                PacketId::EndOfData
            } else {
                PacketId::DataChunk
            };
            let bytes = Packet::with_payload(id, self.address, chunk.data.clone())
                .encode()
                .freeze();
            trace!(id = id.name(), len = chunk.data.len(), "Transmit data packet");
            self.outputs.push_back(Output::Transmit(bytes));
            transfer.sent(&chunk);
        }

        self.return_to_available();
    }

    fn reject_active(&mut self, error: Error) {
        self.outputs.push_back(Output::CancelTimer);
        self.reply_address = self.address;

        match self.queue.pop() {
            Some(mut request) => {
                debug!(instruction = ?request.instruction(), "Rejecting command: {}", error);
                request.complete(Err(error));
            }
            None => warn!("No active request to reject: {}", error),
        }

        self.return_to_available();
    }

    fn return_to_available(&mut self) {
        self.mode = Mode::Available;
        self.rx.clear();
        self.try_send();
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("address", &self.address)
            .field("mode", &self.mode.kind())
            .field("pending", &self.queue.len())
            .field("buffered", &self.rx.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        confirmation::ConfirmationCode,
        error::Result,
        instruction::Instruction,
        transfer::{Progress, ReceiveHandler, SendHandler},
    };
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const ADDR: Address = Address::new(0xFFFF_FFFF);

    type Log = Arc<Mutex<Vec<(&'static str, Result<Acknowledge>)>>>;

    fn engine() -> Engine {
        Engine::new(ADDR, Duration::from_millis(1000))
    }

    fn request(log: &Log, name: &'static str, instruction: Instruction, args: &[u8]) -> Request {
        let log = log.clone();
        Request::new(instruction, args, move |result| log.lock().push((name, result)))
    }

    fn frame(id: PacketId, payload: &[u8]) -> Vec<u8> {
        Packet::with_payload(id, ADDR, payload.to_vec()).encode().to_vec()
    }

    fn ack(payload: &[u8]) -> Vec<u8> {
        frame(PacketId::Acknowledge, payload)
    }

    fn drain(engine: &mut Engine) -> Vec<Output> {
        std::iter::from_fn(|| engine.poll_output()).collect()
    }

    fn transmitted(outputs: &[Output]) -> Vec<Packet> {
        outputs
            .iter()
            .filter_map(|output| match output {
                Output::Transmit(bytes) => match Packet::parse(bytes, ADDR).unwrap() {
                    Parsed::Frame { packet, .. } => Some(packet),
                    Parsed::Incomplete => panic!("partial frame transmitted"),
                },
                _ => None,
            })
            .collect()
    }

    fn names(log: &Log) -> Vec<&'static str> {
        log.lock().iter().map(|(name, _)| *name).collect()
    }

    #[derive(Default, Clone)]
    struct Observer {
        progress: Arc<Mutex<Vec<Progress>>>,
        errors: Arc<Mutex<Vec<String>>>,
        finished: Arc<Mutex<Vec<Bytes>>>,
        sent_finished: Arc<Mutex<usize>>,
    }

    impl ReceiveHandler for Observer {
        fn on_progress(&mut self, progress: &Progress) {
            self.progress.lock().push(progress.clone());
        }

        fn on_error(&mut self, error: Error) {
            self.errors.lock().push(error.to_string());
        }

        fn on_finish(&mut self, data: Bytes) {
            self.finished.lock().push(data);
        }
    }

    impl SendHandler for Observer {
        fn on_progress(&mut self, progress: &Progress) {
            self.progress.lock().push(progress.clone());
        }

        fn on_finish(&mut self) {
            *self.sent_finished.lock() += 1;
        }
    }

    #[test]
    fn test_handshake_end_to_end() {
        let log = Log::default();
        let mut engine = engine();

        engine.submit(request(&log, "handshake", Instruction::Handshake, &[0x00]));

        let outputs = drain(&mut engine);
        assert_eq!(
            outputs,
            vec![
                Output::Transmit(Bytes::from_static(&[
                    0xEF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x00, 0x04, 0x17, 0x00, 0x00, 0x1C
                ])),
                Output::ArmTimer,
            ]
        );
        assert_eq!(engine.mode(), EngineMode::Command);

        engine.handle_bytes(&ack(&[0x00]));

        let (_, result) = log.lock().remove(0);
        let ack = result.unwrap();
        assert_eq!(ack.code, ConfirmationCode::Ok);
        assert!(ack.data.is_empty());
        assert_eq!(drain(&mut engine), vec![Output::CancelTimer]);
        assert_eq!(engine.mode(), EngineMode::Available);
        assert_eq!(engine.pending(), 0);
    }

    #[test]
    fn test_single_command_in_flight_and_fifo_order() {
        let log = Log::default();
        let mut engine = engine();

        engine.submit(request(&log, "r1", Instruction::Handshake, &[0x00]));
        engine.submit(request(&log, "r2", Instruction::GenImg, &[]));
        engine.submit(request(&log, "r3", Instruction::TemplateCount, &[]));

        let sent = transmitted(&drain(&mut engine));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload.as_ref(), &[0x17, 0x00]);
        assert_eq!(engine.pending(), 3);

        engine.handle_bytes(&ack(&[0x00]));
        let sent = transmitted(&drain(&mut engine));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload.as_ref(), &[0x01]);

        engine.handle_bytes(&ack(&[0x02]));
        let sent = transmitted(&drain(&mut engine));
        assert_eq!(sent[0].payload.as_ref(), &[0x1D]);

        engine.handle_bytes(&ack(&[0x00, 0x00, 0x05]));

        assert_eq!(names(&log), vec!["r1", "r2", "r3"]);
        let log = log.lock();
        assert_eq!(log[1].1.as_ref().unwrap().code, ConfirmationCode::NoFinger);
        assert_eq!(log[2].1.as_ref().unwrap().data.as_ref(), &[0x00, 0x05]);
    }

    #[test]
    fn test_acknowledge_split_byte_by_byte() {
        let log = Log::default();
        let mut engine = engine();
        engine.submit(request(&log, "r1", Instruction::ReadSysPara, &[]));

        let bytes = ack(&[0x00, 1, 2, 3, 4]);
        for byte in &bytes[..bytes.len() - 1] {
            engine.handle_bytes(std::slice::from_ref(byte));
            assert!(log.lock().is_empty());
        }
        engine.handle_bytes(&bytes[bytes.len() - 1..]);

        assert_eq!(log.lock()[0].1.as_ref().unwrap().data.as_ref(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_timeout_rejects_and_advances_queue() {
        let log = Log::default();
        let mut engine = engine();

        engine.submit(request(&log, "r1", Instruction::Handshake, &[0x00]));
        engine.submit(request(&log, "r2", Instruction::GenImg, &[]));
        drain(&mut engine);

        engine.handle_timeout(true);

        assert!(matches!(
            log.lock()[0],
            ("r1", Err(Error::Timeout { millis: 1000 }))
        ));
        let outputs = drain(&mut engine);
        assert_eq!(outputs.first(), Some(&Output::CancelTimer));
        assert_eq!(transmitted(&outputs)[0].payload.as_ref(), &[0x01]);
        assert_eq!(outputs.last(), Some(&Output::ArmTimer));
        assert_eq!(engine.mode(), EngineMode::Command);
    }

    #[test]
    fn test_timeout_with_port_closed_reports_port_not_open() {
        let log = Log::default();
        let mut engine = engine();
        engine.submit(request(&log, "r1", Instruction::Handshake, &[0x00]));

        engine.handle_timeout(false);

        assert!(matches!(log.lock()[0], ("r1", Err(Error::PortNotOpen))));
        assert_eq!(engine.mode(), EngineMode::Available);
    }

    #[test]
    fn test_timeout_while_idle_is_ignored() {
        let mut engine = engine();
        engine.handle_timeout(true);

        assert_eq!(engine.mode(), EngineMode::Available);
        assert!(drain(&mut engine).is_empty());
    }

    #[test]
    fn test_inbound_transfer_9000_bytes() {
        let log = Log::default();
        let observer = Observer::default();
        let mut engine = engine();

        engine.submit(
            request(&log, "up", Instruction::UpImage, &[])
                .with_transfer(TransferMode::receive(9000, observer.clone())),
        );
        drain(&mut engine);

        engine.handle_bytes(&ack(&[0x00]));
        assert!(log.lock()[0].1.as_ref().unwrap().is_ok());
        assert_eq!(engine.mode(), EngineMode::DataReceive);
        assert_eq!(drain(&mut engine), vec![Output::CancelTimer, Output::ArmTimer]);

        let data: Vec<u8> = (0..9000u32).map(|i| (i % 251) as u8).collect();
        let chunks: Vec<&[u8]> = data.chunks(128).collect();
        let (last, body) = chunks.split_last().unwrap();

        for chunk in body {
            engine.handle_bytes(&frame(PacketId::DataChunk, chunk));
            assert_eq!(drain(&mut engine), vec![Output::ArmTimer]);
        }
        engine.handle_bytes(&frame(PacketId::EndOfData, last));

        let finished = observer.finished.lock();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].as_ref(), data.as_slice());

        let progress = observer.progress.lock();
        assert_eq!(progress.len(), chunks.len());
        assert!(progress.windows(2).all(|w| w[0].current <= w[1].current));
        assert_eq!(progress.last().unwrap().current, 9000);
        assert_eq!(progress.last().unwrap().fraction, 1.0);

        assert!(observer.errors.lock().is_empty());
        assert_eq!(drain(&mut engine), vec![Output::CancelTimer]);
        assert_eq!(engine.mode(), EngineMode::Available);
    }

    #[test]
    fn test_inbound_transfer_coalesced_with_acknowledge() {
        let log = Log::default();
        let observer = Observer::default();
        let mut engine = engine();

        engine.submit(
            request(&log, "up", Instruction::UpChar, &[0x01])
                .with_transfer(TransferMode::receive(6, observer.clone())),
        );
        engine.submit(request(&log, "next", Instruction::Handshake, &[0x00]));
        drain(&mut engine);

        let mut stream = ack(&[0x00]);
        stream.extend(frame(PacketId::DataChunk, &[1, 2, 3]));
        stream.extend(frame(PacketId::EndOfData, &[4, 5, 6]));
        engine.handle_bytes(&stream);

        assert_eq!(observer.finished.lock()[0].as_ref(), &[1, 2, 3, 4, 5, 6]);

        // The queued handshake goes out once the transfer is over
        let sent = transmitted(&drain(&mut engine));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload.as_ref(), &[0x17, 0x00]);
        assert_eq!(engine.mode(), EngineMode::Command);
    }

    #[test]
    fn test_inbound_transfer_not_started_on_error_code() {
        let log = Log::default();
        let observer = Observer::default();
        let mut engine = engine();

        engine.submit(
            request(&log, "up", Instruction::UpImage, &[])
                .with_transfer(TransferMode::receive(100, observer.clone())),
        );
        engine.handle_bytes(&ack(&[0x0D]));

        assert_eq!(
            log.lock()[0].1.as_ref().unwrap().code,
            ConfirmationCode::UploadFail
        );
        assert_eq!(observer.errors.lock().len(), 1);
        assert_eq!(engine.mode(), EngineMode::Available);
    }

    #[test]
    fn test_inbound_transfer_corruption_fires_error_callback() {
        let log = Log::default();
        let observer = Observer::default();
        let mut engine = engine();

        engine.submit(
            request(&log, "up", Instruction::UpImage, &[])
                .with_transfer(TransferMode::receive(100, observer.clone())),
        );
        engine.submit(request(&log, "next", Instruction::GenImg, &[]));
        engine.handle_bytes(&ack(&[0x00]));
        drain(&mut engine);

        // An Acknowledge is not a legal packet inside a transfer
        engine.handle_bytes(&ack(&[0x00]));

        let errors = observer.errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Corrupted packet"));
        assert!(observer.finished.lock().is_empty());

        // Request already resolved; the queue moves on
        assert_eq!(names(&log), vec!["up"]);
        let sent = transmitted(&drain(&mut engine));
        assert_eq!(sent[0].payload.as_ref(), &[0x01]);
    }

    #[test]
    fn test_inbound_transfer_checksum_error() {
        let log = Log::default();
        let observer = Observer::default();
        let mut engine = engine();

        engine.submit(
            request(&log, "up", Instruction::UpImage, &[])
                .with_transfer(TransferMode::receive(100, observer.clone())),
        );
        engine.handle_bytes(&ack(&[0x00]));

        let mut bad = frame(PacketId::DataChunk, &[9, 9, 9]);
        let last = bad.len() - 1;
        bad[last] ^= 0x01;
        engine.handle_bytes(&bad);

        assert!(observer.errors.lock()[0].contains("Checksum mismatch"));
        assert_eq!(engine.mode(), EngineMode::Available);
        assert_eq!(engine.buffered(), 0);
    }

    #[test]
    fn test_inbound_transfer_timeout() {
        let log = Log::default();
        let observer = Observer::default();
        let mut engine = engine();

        engine.submit(
            request(&log, "up", Instruction::UpImage, &[])
                .with_transfer(TransferMode::receive(100, observer.clone())),
        );
        engine.handle_bytes(&ack(&[0x00]));
        engine.handle_bytes(&frame(PacketId::DataChunk, &[1, 2]));
        engine.submit(request(&log, "next", Instruction::GenImg, &[]));
        drain(&mut engine);

        engine.handle_timeout(true);

        let errors = observer.errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Timeout"));

        // The queued request goes out once the transfer is abandoned
        let outputs = drain(&mut engine);
        let sent = transmitted(&outputs);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload.as_ref(), &[0x01]);
        assert!(outputs.contains(&Output::ArmTimer));
        assert_eq!(engine.mode(), EngineMode::Command);
    }

    #[test]
    fn test_inbound_transfer_timeout_with_port_closed() {
        let log = Log::default();
        let observer = Observer::default();
        let mut engine = engine();

        engine.submit(
            request(&log, "up", Instruction::UpChar, &[0x01])
                .with_transfer(TransferMode::receive(512, observer.clone())),
        );
        engine.handle_bytes(&ack(&[0x00]));

        engine.handle_timeout(false);

        let errors = observer.errors.lock();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0], Error::PortNotOpen.to_string());
        assert!(observer.finished.lock().is_empty());
        assert_eq!(engine.mode(), EngineMode::Available);
    }

    #[test]
    fn test_inbound_transfer_foreign_address_is_corruption() {
        let log = Log::default();
        let observer = Observer::default();
        let mut engine = engine();

        engine.submit(
            request(&log, "up", Instruction::UpImage, &[])
                .with_transfer(TransferMode::receive(100, observer.clone())),
        );
        engine.submit(request(&log, "next", Instruction::GenImg, &[]));
        engine.handle_bytes(&ack(&[0x00]));
        drain(&mut engine);

        // Valid checksum, wrong device
        let foreign =
            Packet::with_payload(PacketId::DataChunk, Address::new(0x1234_5678), vec![1, 2, 3])
                .encode();
        engine.handle_bytes(&foreign);

        let errors = observer.errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Corrupted packet"));
        assert!(observer.progress.lock().is_empty());
        assert_eq!(engine.buffered(), 0);

        let sent = transmitted(&drain(&mut engine));
        assert_eq!(sent[0].payload.as_ref(), &[0x01]);
    }

    #[test]
    fn test_inbound_transfer_huge_declared_size() {
        let log = Log::default();
        let observer = Observer::default();
        let mut engine = engine();

        engine.submit(
            request(&log, "up", Instruction::UpImage, &[])
                .with_transfer(TransferMode::receive(usize::MAX, observer.clone())),
        );
        engine.handle_bytes(&ack(&[0x00]));
        assert_eq!(engine.mode(), EngineMode::DataReceive);

        engine.handle_bytes(&frame(PacketId::EndOfData, &[1, 2, 3]));

        assert_eq!(observer.finished.lock()[0].as_ref(), &[1, 2, 3]);
        assert_eq!(engine.mode(), EngineMode::Available);
    }

    #[test]
    fn test_transfer_on_wrong_instruction_rejected() {
        let log = Log::default();
        let observer = Observer::default();
        let mut engine = engine();

        engine.submit(
            request(&log, "hs", Instruction::Handshake, &[0x00])
                .with_transfer(TransferMode::receive(100, observer.clone())),
        );
        engine.submit(
            request(&log, "up", Instruction::UpImage, &[])
                .with_transfer(TransferMode::send(vec![0u8; 10], 128, observer.clone())),
        );
        engine.submit(request(&log, "gen", Instruction::GenImg, &[]));

        {
            let log = log.lock();
            assert!(matches!(log[0], ("hs", Err(Error::InvalidArgument(_)))));
            assert!(matches!(log[1], ("up", Err(Error::InvalidArgument(_)))));
        }

        // Only the valid request reaches the wire
        let sent = transmitted(&drain(&mut engine));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload.as_ref(), &[0x01]);
        assert_eq!(engine.mode(), EngineMode::Command);
    }

    #[test]
    fn test_outbound_transfer_300_bytes() {
        let log = Log::default();
        let observer = Observer::default();
        let mut engine = engine();

        let data: Vec<u8> = (0..300).map(|i| i as u8).collect();
        engine.submit(
            request(&log, "down", Instruction::DownChar, &[0x01])
                .with_transfer(TransferMode::send(data.clone(), 128, observer.clone())),
        );
        drain(&mut engine);

        engine.handle_bytes(&ack(&[0x00]));

        assert!(log.lock()[0].1.as_ref().unwrap().is_ok());

        let sent = transmitted(&drain(&mut engine));
        let shape: Vec<(PacketId, usize)> =
            sent.iter().map(|p| (p.id, p.payload.len())).collect();
        assert_eq!(
            shape,
            vec![
                (PacketId::DataChunk, 128),
                (PacketId::DataChunk, 128),
                (PacketId::EndOfData, 44),
            ]
        );

        let joined: Vec<u8> = sent.iter().flat_map(|p| p.payload.to_vec()).collect();
        assert_eq!(joined, data);

        let progress = observer.progress.lock();
        assert_eq!(progress.len(), 2);
        assert_eq!(progress[0].current, 128);
        assert_eq!(progress[1].current, 256);
        assert_eq!(*observer.sent_finished.lock(), 1);
        assert_eq!(engine.mode(), EngineMode::Available);
    }

    #[test]
    fn test_outbound_transfer_skipped_on_error_code() {
        let log = Log::default();
        let observer = Observer::default();
        let mut engine = engine();

        engine.submit(
            request(&log, "down", Instruction::DownImage, &[])
                .with_transfer(TransferMode::send(vec![0u8; 300], 128, observer.clone())),
        );
        drain(&mut engine);
        engine.handle_bytes(&ack(&[0x0E]));

        assert!(transmitted(&drain(&mut engine)).is_empty());
        assert_eq!(*observer.sent_finished.lock(), 0);
        assert_eq!(engine.mode(), EngineMode::Available);
    }

    #[test]
    fn test_address_mismatch_is_corruption() {
        let log = Log::default();
        let mut engine = engine();
        engine.submit(request(&log, "r1", Instruction::Handshake, &[0x00]));
        engine.submit(request(&log, "r2", Instruction::GenImg, &[]));
        drain(&mut engine);

        // Checksum is valid, address is not
        let foreign =
            Packet::with_payload(PacketId::Acknowledge, Address::new(0x0000_0001), vec![0x00])
                .encode();
        engine.handle_bytes(&foreign);

        assert!(matches!(
            log.lock()[0],
            ("r1", Err(Error::CorruptedPacket { .. }))
        ));
        assert_eq!(transmitted(&drain(&mut engine))[0].payload.as_ref(), &[0x01]);
    }

    #[test]
    fn test_checksum_mismatch_rejects_command() {
        let log = Log::default();
        let mut engine = engine();
        engine.submit(request(&log, "r1", Instruction::Handshake, &[0x00]));

        let mut bytes = ack(&[0x00]);
        bytes[9] = 0x01;
        engine.handle_bytes(&bytes);

        assert!(matches!(
            log.lock()[0],
            ("r1", Err(Error::ChecksumMismatch { .. }))
        ));
        assert_eq!(engine.mode(), EngineMode::Available);
    }

    #[test]
    fn test_wrong_packet_id_in_command_mode() {
        let log = Log::default();
        let mut engine = engine();
        engine.submit(request(&log, "r1", Instruction::Handshake, &[0x00]));

        engine.handle_bytes(&frame(PacketId::DataChunk, &[0x00]));

        assert!(matches!(
            log.lock()[0],
            ("r1", Err(Error::CorruptedPacket { .. }))
        ));
    }

    #[test]
    fn test_empty_acknowledge_is_corruption() {
        let log = Log::default();
        let mut engine = engine();
        engine.submit(request(&log, "r1", Instruction::Handshake, &[0x00]));

        engine.handle_bytes(&ack(&[]));

        assert!(matches!(
            log.lock()[0],
            ("r1", Err(Error::CorruptedPacket { .. }))
        ));
    }

    #[test]
    fn test_bytes_while_idle_are_discarded() {
        let log = Log::default();
        let mut engine = engine();

        engine.handle_bytes(&ack(&[0x00]));
        assert_eq!(engine.buffered(), 0);

        engine.submit(request(&log, "r1", Instruction::Handshake, &[0x00]));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_port_closed_fails_active_and_queued() {
        let log = Log::default();
        let mut engine = engine();
        engine.submit(request(&log, "r1", Instruction::Handshake, &[0x00]));
        engine.submit(request(&log, "r2", Instruction::GenImg, &[]));
        engine.submit(request(&log, "r3", Instruction::RegModel, &[]));
        drain(&mut engine);

        engine.handle_port_closed();

        let log = log.lock();
        assert!(matches!(log[0], ("r1", Err(Error::PortClosed))));
        assert!(matches!(log[1], ("r2", Err(Error::NotSent))));
        assert!(matches!(log[2], ("r3", Err(Error::NotSent))));
        assert_eq!(drain(&mut engine), vec![Output::CancelTimer]);
        assert_eq!(engine.pending(), 0);
        assert_eq!(engine.mode(), EngineMode::Available);
    }

    #[test]
    fn test_port_closed_during_transfer() {
        let log = Log::default();
        let observer = Observer::default();
        let mut engine = engine();
        engine.submit(
            request(&log, "up", Instruction::UpImage, &[])
                .with_transfer(TransferMode::receive(100, observer.clone())),
        );
        engine.submit(request(&log, "gen", Instruction::GenImg, &[]));
        engine.submit(request(&log, "reg", Instruction::RegModel, &[]));
        engine.handle_bytes(&ack(&[0x00]));
        drain(&mut engine);

        engine.handle_port_closed();

        let errors = observer.errors.lock();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0], Error::PortClosed.to_string());

        let log = log.lock();
        assert!(matches!(log[0], ("up", Ok(_))));
        assert!(matches!(log[1], ("gen", Err(Error::NotSent))));
        assert!(matches!(log[2], ("reg", Err(Error::NotSent))));
        assert_eq!(engine.pending(), 0);
        assert!(transmitted(&drain(&mut engine)).is_empty());
        assert_eq!(engine.mode(), EngineMode::Available);
    }

    #[test]
    fn test_rebind_adopts_new_address_on_success() {
        let log = Log::default();
        let mut engine = engine();
        let new_address = Address::new(0x1234_5678);

        engine.submit(
            request(&log, "set", Instruction::SetAddress, &[0x12, 0x34, 0x56, 0x78])
                .with_rebind(new_address),
        );
        // Command still goes out with the old address
        assert_eq!(transmitted(&drain(&mut engine))[0].address, ADDR);

        let reply = Packet::with_payload(PacketId::Acknowledge, new_address, vec![0x00]).encode();
        engine.handle_bytes(&reply);

        assert!(log.lock()[0].1.is_ok());
        assert_eq!(engine.address(), new_address);
    }

    #[test]
    fn test_rebind_keeps_old_address_on_failure() {
        let log = Log::default();
        let mut engine = engine();
        let new_address = Address::new(0x1234_5678);

        engine.submit(
            request(&log, "set", Instruction::SetAddress, &[0x12, 0x34, 0x56, 0x78])
                .with_rebind(new_address),
        );
        let reply = Packet::with_payload(PacketId::Acknowledge, new_address, vec![0x20]).encode();
        engine.handle_bytes(&reply);

        assert_eq!(engine.address(), ADDR);

        // Next exchange uses the old address again
        engine.submit(request(&log, "hs", Instruction::Handshake, &[0x00]));
        engine.handle_bytes(&ack(&[0x00]));
        assert!(log.lock()[1].1.as_ref().unwrap().is_ok());
    }

    #[test]
    fn test_oversized_command_rejected_without_transmit() {
        let log = Log::default();
        let mut engine = engine();

        engine.submit(request(&log, "big", Instruction::WriteNotepad, &vec![0u8; 70_000]));

        assert!(matches!(
            log.lock()[0],
            ("big", Err(Error::PayloadTooLarge { .. }))
        ));
        assert!(transmitted(&drain(&mut engine)).is_empty());
        assert_eq!(engine.mode(), EngineMode::Available);
    }
}
