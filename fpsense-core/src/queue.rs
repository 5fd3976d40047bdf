//! Pending requests and their completion slots

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;

use crate::{
    confirmation::ConfirmationCode,
    error::{Error, Result},
    instruction::Instruction,
    packet::Address,
    transfer::TransferMode,
};

/// Decoded Acknowledge payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledge {
    /// First payload byte
    pub code: ConfirmationCode,

    /// Remaining payload bytes
    pub data: Bytes,
}

impl Acknowledge {
    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }

    /// Turn a non-OK code into [`Error::Device`]
    pub fn into_result(self) -> Result<Bytes> {
        if self.code.is_ok() {
            Ok(self.data)
        } else {
            Err(Error::Device(self.code))
        }
    }
}

/// Single-use completion slot of a request
pub type Responder = Box<dyn FnOnce(Result<Acknowledge>) + Send>;

/// A command waiting for (or awaiting) its Acknowledge
pub struct Request {
    /// Opcode followed by its arguments
    pub(crate) payload: Bytes,
    pub(crate) transfer: TransferMode,
    /// Address the sensor answers from after accepting this command
    pub(crate) rebind: Option<Address>,
    responder: Option<Responder>,
}

impl Request {
    /// Create a request for `instruction` with raw argument bytes
    pub fn new(
        instruction: Instruction,
        args: &[u8],
        responder: impl FnOnce(Result<Acknowledge>) + Send + 'static,
    ) -> Self {
        let mut payload = Vec::with_capacity(1 + args.len());
        payload.push(instruction.into());
        payload.extend_from_slice(args);

        Self::raw(payload, responder)
    }

    /// Create a request from an already assembled opcode+args payload
    pub fn raw(
        payload: impl Into<Bytes>,
        responder: impl FnOnce(Result<Acknowledge>) + Send + 'static,
    ) -> Self {
        Self {
            payload: payload.into(),
            transfer: TransferMode::None,
            rebind: None,
            responder: Some(Box::new(responder)),
        }
    }

    /// Attach a bulk transfer
    pub fn with_transfer(mut self, transfer: TransferMode) -> Self {
        self.transfer = transfer;
        self
    }

    /// Expect the Acknowledge (and later traffic) from `address`
    pub fn with_rebind(mut self, address: Address) -> Self {
        self.rebind = Some(address);
        self
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Instruction byte, if the payload is a known instruction
    pub fn instruction(&self) -> Option<Instruction> {
        self.payload
            .first()
            .and_then(|&b| Instruction::try_from(b).ok())
    }

    /// Check that the instruction can carry the attached transfer
    pub fn validate(&self) -> Result<()> {
        let instruction = self.instruction();
        let fits = match &self.transfer {
            TransferMode::None => true,
            TransferMode::Receive { .. } => instruction.is_some_and(Instruction::is_upload),
            TransferMode::Send { .. } => instruction.is_some_and(Instruction::is_download),
        };

        if fits {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "{} cannot carry {:?}",
                instruction.map_or("unknown instruction", Instruction::name),
                self.transfer
            )))
        }
    }

    /// Fire the completion slot. Later calls are no-ops.
    pub fn complete(&mut self, result: Result<Acknowledge>) {
        if let Some(responder) = self.responder.take() {
            responder(result);
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("payload", &hex::encode(&self.payload))
            .field("transfer", &self.transfer)
            .field("rebind", &self.rebind)
            .field("completed", &self.responder.is_none())
            .finish()
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        if self.responder.is_some() {
            tracing::warn!("Request dropped without completion");
            self.complete(Err(Error::NotSent));
        }
    }
}

/// FIFO of requests; the head is the one on the wire
#[derive(Debug, Default)]
pub struct CommandQueue {
    requests: VecDeque<Request>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, request: Request) {
        self.requests.push_back(request);
    }

    pub fn head(&self) -> Option<&Request> {
        self.requests.front()
    }

    /// Remove the head once it has been resolved
    pub fn pop(&mut self) -> Option<Request> {
        self.requests.pop_front()
    }

    /// Remove every request, oldest first
    pub fn drain(&mut self) -> impl Iterator<Item = Request> + '_ {
        self.requests.drain(..)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
