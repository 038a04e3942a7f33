//! Message codec
//!
//! Frames are one discriminant byte followed by a fixed-shape payload.
//! Participant ids and booleans are single bytes, there are no length prefixes.
//! The two directions of the link carry different payload forms of the same kinds,
//! so each direction has its own message type.

use super::kind::MessageKind;
use crate::error::{LinkError, Result};
use crate::types::ParticipantId;

/// Messages sent by a client to the authoritative server
///
/// The sender is implied by the transport channel and never encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    /// The sender's relationship has dissolved
    Decoherence,
    /// The sender toggled, `flipped` is its new local orientation
    Flux { flipped: bool },
    /// The sender asks to be paired
    Rizz,
    /// The sender asks every other participant for its orientation
    SyncRequest,
    /// The sender answers a sync request issued by `requester`
    SyncResponse {
        requester: ParticipantId,
        responder: ParticipantId,
        flipped: bool,
    },
}

/// Messages sent by the authoritative server to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMessage {
    /// `participant` dissolved its relationship
    Decoherence { participant: ParticipantId },
    /// Authoritative pair state after a toggle: `player` is `flipped`, `partner` the complement
    Flux {
        player: ParticipantId,
        partner: ParticipantId,
        flipped: bool,
    },
    /// The receiver is now entangled with `partner` and starts with `flipped`
    Rizz { partner: ParticipantId, flipped: bool },
    /// `requester` asks for the receiver's orientation
    SyncRequest { requester: ParticipantId },
    /// `responder` reports its orientation
    SyncResponse { responder: ParticipantId, flipped: bool },
}

impl ClientMessage {
    /// Kind of this message
    pub fn kind(&self) -> MessageKind {
        match self {
            ClientMessage::Decoherence => MessageKind::Decoherence,
            ClientMessage::Flux { .. } => MessageKind::Flux,
            ClientMessage::Rizz => MessageKind::Rizz,
            ClientMessage::SyncRequest => MessageKind::SyncRequest,
            ClientMessage::SyncResponse { .. } => MessageKind::SyncResponse,
        }
    }

    /// Encode into a wire frame
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = vec![u8::from(self.kind())];
        match *self {
            ClientMessage::Decoherence | ClientMessage::Rizz | ClientMessage::SyncRequest => {}
            ClientMessage::Flux { flipped } => frame.push(flipped as u8),
            ClientMessage::SyncResponse {
                requester,
                responder,
                flipped,
            } => {
                frame.push(requester.as_u8());
                frame.push(responder.as_u8());
                frame.push(flipped as u8);
            }
        }
        frame
    }

    /// Decode a wire frame
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let mut reader = FrameReader::new(frame)?;
        let message = match reader.kind {
            MessageKind::Decoherence => ClientMessage::Decoherence,
            MessageKind::Flux => ClientMessage::Flux {
                flipped: reader.read_bool()?,
            },
            MessageKind::Rizz => ClientMessage::Rizz,
            MessageKind::SyncRequest => ClientMessage::SyncRequest,
            MessageKind::SyncResponse => ClientMessage::SyncResponse {
                requester: reader.read_id()?,
                responder: reader.read_id()?,
                flipped: reader.read_bool()?,
            },
        };
        reader.finish()?;
        Ok(message)
    }
}

impl ServerMessage {
    /// Kind of this message
    pub fn kind(&self) -> MessageKind {
        match self {
            ServerMessage::Decoherence { .. } => MessageKind::Decoherence,
            ServerMessage::Flux { .. } => MessageKind::Flux,
            ServerMessage::Rizz { .. } => MessageKind::Rizz,
            ServerMessage::SyncRequest { .. } => MessageKind::SyncRequest,
            ServerMessage::SyncResponse { .. } => MessageKind::SyncResponse,
        }
    }

    /// Encode into a wire frame
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = vec![u8::from(self.kind())];
        match *self {
            ServerMessage::Decoherence { participant } => frame.push(participant.as_u8()),
            ServerMessage::Flux {
                player,
                partner,
                flipped,
            } => {
                frame.push(player.as_u8());
                frame.push(partner.as_u8());
                frame.push(flipped as u8);
            }
            ServerMessage::Rizz { partner, flipped } => {
                frame.push(partner.as_u8());
                frame.push(flipped as u8);
            }
            ServerMessage::SyncRequest { requester } => frame.push(requester.as_u8()),
            ServerMessage::SyncResponse { responder, flipped } => {
                frame.push(responder.as_u8());
                frame.push(flipped as u8);
            }
        }
        frame
    }

    /// Decode a wire frame
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let mut reader = FrameReader::new(frame)?;
        let message = match reader.kind {
            MessageKind::Decoherence => ServerMessage::Decoherence {
                participant: reader.read_id()?,
            },
            MessageKind::Flux => ServerMessage::Flux {
                player: reader.read_id()?,
                partner: reader.read_id()?,
                flipped: reader.read_bool()?,
            },
            MessageKind::Rizz => ServerMessage::Rizz {
                partner: reader.read_id()?,
                flipped: reader.read_bool()?,
            },
            MessageKind::SyncRequest => ServerMessage::SyncRequest {
                requester: reader.read_id()?,
            },
            MessageKind::SyncResponse => ServerMessage::SyncResponse {
                responder: reader.read_id()?,
                flipped: reader.read_bool()?,
            },
        };
        reader.finish()?;
        Ok(message)
    }
}

/// Cursor over the payload of a single frame
struct FrameReader<'a> {
    kind: MessageKind,
    payload: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    fn new(frame: &'a [u8]) -> Result<Self> {
        let (&discriminant, payload) = frame
            .split_first()
            .ok_or_else(|| LinkError::MalformedMessage("empty frame".to_string()))?;
        let kind = MessageKind::try_from(discriminant)?;
        Ok(Self {
            kind,
            payload,
            pos: 0,
        })
    }

    fn read_byte(&mut self) -> Result<u8> {
        let byte = self.payload.get(self.pos).copied().ok_or_else(|| {
            LinkError::MalformedMessage(format!(
                "{} payload truncated at byte {}",
                self.kind, self.pos
            ))
        })?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_id(&mut self) -> Result<ParticipantId> {
        self.read_byte().map(ParticipantId::new)
    }

    fn read_bool(&mut self) -> Result<bool> {
        match self.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(LinkError::MalformedMessage(format!(
                "{} payload carries invalid boolean byte {}",
                self.kind, other
            ))),
        }
    }

    fn finish(self) -> Result<()> {
        let trailing = self.payload.len() - self.pos;
        if trailing > 0 {
            return Err(LinkError::MalformedMessage(format!(
                "{} payload has {} trailing byte(s)",
                self.kind, trailing
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u8) -> ParticipantId {
        ParticipantId::new(raw)
    }

    #[test]
    fn test_server_flux_layout() {
        let frame = ServerMessage::Flux {
            player: id(1),
            partner: id(2),
            flipped: true,
        }
        .encode();
        assert_eq!(frame, vec![1, 1, 2, 1]);
    }

    #[test]
    fn test_client_sync_response_layout() {
        let frame = ClientMessage::SyncResponse {
            requester: id(9),
            responder: id(3),
            flipped: false,
        }
        .encode();
        assert_eq!(frame, vec![4, 9, 3, 0]);
    }

    #[test]
    fn test_payloadless_client_kinds() {
        assert_eq!(ClientMessage::Decoherence.encode(), vec![0]);
        assert_eq!(ClientMessage::Rizz.encode(), vec![2]);
        assert_eq!(ClientMessage::SyncRequest.encode(), vec![3]);
    }

    #[test]
    fn test_reencode_every_server_kind() {
        let frames: [&[u8]; 5] = [&[0, 4], &[1, 4, 5, 0], &[2, 5, 1], &[3, 200], &[4, 255, 1]];
        for frame in frames {
            let message = ServerMessage::decode(frame).unwrap();
            assert_eq!(message.encode(), frame);
        }
    }

    #[test]
    fn test_reencode_every_client_kind() {
        let frames: [&[u8]; 5] = [&[0], &[1, 1], &[2], &[3], &[4, 0, 7, 1]];
        for frame in frames {
            let message = ClientMessage::decode(frame).unwrap();
            assert_eq!(message.encode(), frame);
        }
    }

    #[test]
    fn test_flux_missing_boolean_is_malformed() {
        assert!(matches!(
            ServerMessage::decode(&[1, 1, 2]),
            Err(LinkError::MalformedMessage(_))
        ));
        assert!(matches!(
            ClientMessage::decode(&[1]),
            Err(LinkError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_empty_frame_is_malformed() {
        assert!(matches!(
            ServerMessage::decode(&[]),
            Err(LinkError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(matches!(
            ClientMessage::decode(&[17, 0]),
            Err(LinkError::UnknownMessageKind(17))
        ));
    }

    #[test]
    fn test_invalid_boolean_and_trailing_bytes() {
        assert!(matches!(
            ServerMessage::decode(&[2, 1, 2]),
            Err(LinkError::MalformedMessage(_))
        ));
        assert!(matches!(
            ServerMessage::decode(&[3, 1, 0]),
            Err(LinkError::MalformedMessage(_))
        ));
    }
}
