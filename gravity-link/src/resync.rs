//! Late-join resync
//!
//! A joining client asks for everyone's orientation. The server fans the
//! request out, collects one self-report per participant and relays each back
//! to the requester only.

use crate::error::{LinkError, Result};
use crate::peer::PeerRegistry;
use crate::protocol::{ClientMessage, Outbound, Route, ServerMessage};
use crate::types::ParticipantId;

/// Server: fan a sync request out to every other participant
pub fn relay_request(registry: &PeerRegistry, requester: ParticipantId) -> Result<Outbound> {
    registry.require(requester)?;
    Ok(Outbound::new(
        Route::AllExcept(requester),
        ServerMessage::SyncRequest { requester },
    ))
}

/// Client: answer a sync request with the local orientation
///
/// The requester was validated by the server, so it is answered even if the
/// local mirror has not seen it join yet. Requests issued by the local
/// participant itself are ignored.
pub fn answer_request(
    registry: &PeerRegistry,
    local: ParticipantId,
    requester: ParticipantId,
) -> Result<Option<ClientMessage>> {
    if requester == local {
        return Ok(None);
    }
    let state = registry.require(local)?;
    Ok(Some(ClientMessage::SyncResponse {
        requester,
        responder: local,
        flipped: state.flipped,
    }))
}

/// Server: route a self-report back to the participant that asked for it
pub fn relay_response(
    registry: &PeerRegistry,
    requester: ParticipantId,
    responder: ParticipantId,
    flipped: bool,
) -> Result<Outbound> {
    registry.require(requester)?;
    registry.require(responder)?;
    Ok(Outbound::new(
        Route::To(requester),
        ServerMessage::SyncResponse { responder, flipped },
    ))
}

/// Client: overwrite the mirrored orientation of `responder`
///
/// The self-report is trusted as is; partner references are not checked. The
/// server only relays reports from active participants, so a responder whose
/// join has not reached the mirror yet is registered here.
pub fn apply_response(
    registry: &mut PeerRegistry,
    local: ParticipantId,
    responder: ParticipantId,
    flipped: bool,
) -> Result<()> {
    if responder == local {
        return Err(LinkError::InvalidPeerReference(responder));
    }
    registry.join(responder);
    registry.require_mut(responder)?.set_orientation(flipped);
    Ok(())
}
