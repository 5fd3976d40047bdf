//! # fpsense-core
//!
//! Core protocol implementation for serial fingerprint sensor modules.
//!
//! This crate provides the low-level protocol primitives:
//! - Packet structure, encoding and incremental parsing
//! - Checksum calculation
//! - Instruction and confirmation code definitions
//! - The command queue and bulk transfer state
//! - [`Engine`], the I/O-free protocol state machine

pub mod checksum;
pub mod confirmation;
pub mod constants;
pub mod engine;
pub mod error;
pub mod instruction;
pub mod packet;
pub mod queue;
pub mod transfer;

pub use confirmation::ConfirmationCode;
pub use engine::{Engine, EngineMode, Output};
pub use error::{Error, Result};
pub use instruction::Instruction;
pub use packet::{Address, Packet, PacketId, Parsed};
pub use queue::{Acknowledge, CommandQueue, Request, Responder};
pub use transfer::{Progress, ReceiveHandler, SendHandler, Silent, TransferMode};
