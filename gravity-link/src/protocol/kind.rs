//! Message kind discriminants

use crate::error::LinkError;

/// Leading byte of every frame
///
/// Ordinals are part of the wire contract between endpoints.
/// New kinds are appended, never inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Relationship dissolution
    Decoherence = 0,
    /// Orientation toggle for a pair
    Flux = 1,
    /// Pairing request and pairing announcement
    Rizz = 2,
    /// Orientation query for late joiners
    SyncRequest = 3,
    /// Answer to an orientation query
    SyncResponse = 4,
}

impl MessageKind {
    /// All kinds in ordinal order
    pub const ALL: [MessageKind; 5] = [
        MessageKind::Decoherence,
        MessageKind::Flux,
        MessageKind::Rizz,
        MessageKind::SyncRequest,
        MessageKind::SyncResponse,
    ];
}

impl From<MessageKind> for u8 {
    fn from(kind: MessageKind) -> Self {
        kind as u8
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = LinkError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(MessageKind::Decoherence),
            1 => Ok(MessageKind::Flux),
            2 => Ok(MessageKind::Rizz),
            3 => Ok(MessageKind::SyncRequest),
            4 => Ok(MessageKind::SyncResponse),
            other => Err(LinkError::UnknownMessageKind(other)),
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MessageKind::Decoherence => "Decoherence",
            MessageKind::Flux => "Flux",
            MessageKind::Rizz => "Rizz",
            MessageKind::SyncRequest => "SyncRequest",
            MessageKind::SyncResponse => "SyncResponse",
        };
        write!(f, "{}", name)
    }
}
