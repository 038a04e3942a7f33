//! Wire protocol shared by server and clients

pub mod kind;
pub mod message;

pub use kind::MessageKind;
pub use message::{ClientMessage, ServerMessage};

use crate::error::Result;
use crate::types::ParticipantId;

/// A message with a fixed-shape binary frame
pub trait WireMessage: Sized {
    fn encode(&self) -> Vec<u8>;
    fn decode(frame: &[u8]) -> Result<Self>;
}

impl WireMessage for ClientMessage {
    fn encode(&self) -> Vec<u8> {
        ClientMessage::encode(self)
    }

    fn decode(frame: &[u8]) -> Result<Self> {
        ClientMessage::decode(frame)
    }
}

impl WireMessage for ServerMessage {
    fn encode(&self) -> Vec<u8> {
        ServerMessage::encode(self)
    }

    fn decode(frame: &[u8]) -> Result<Self> {
        ServerMessage::decode(frame)
    }
}

/// Destination of a server message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// A single participant
    To(ParticipantId),
    /// Every active participant
    All,
    /// Every active participant except one
    AllExcept(ParticipantId),
}

impl Route {
    /// Whether `participant` receives a message sent on this route
    pub fn includes(&self, participant: ParticipantId) -> bool {
        match *self {
            Route::To(target) => target == participant,
            Route::All => true,
            Route::AllExcept(excluded) => excluded != participant,
        }
    }
}

/// A server message together with its destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outbound {
    pub route: Route,
    pub message: ServerMessage,
}

impl Outbound {
    pub fn new(route: Route, message: ServerMessage) -> Self {
        Self { route, message }
    }
}
