//! Orientation state machine
//!
//! A pair is always in one of two antisymmetric states. Clients predict a
//! toggle locally and announce it; the server derives the final pair state from
//! its own records and broadcasts it, and clients reconcile to that broadcast.

use crate::error::{LinkError, Result};
use crate::peer::{PeerRegistry, PeerState};
use crate::protocol::{ClientMessage, Outbound, Route, ServerMessage};
use crate::types::ParticipantId;

/// Ascend trigger sampled on one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AscendInput {
    /// Ascend is held this tick
    pub pressed: bool,
    /// The participant is busy with an unrelated climbing mechanic
    pub climbing: bool,
}

/// Edge-detect the ascend trigger and update the latch
///
/// Fires only on the tick the trigger goes down, while entangled and not climbing.
pub fn ascend_edge(state: &mut PeerState, input: AscendInput, entangled: bool) -> bool {
    let fired = entangled && input.pressed && !state.last_input_latch && !input.climbing;
    state.last_input_latch = input.pressed;
    fired
}

/// Flip the local orientation and announce it
///
/// The partner's mirrored record is set to the complement so both effects are
/// recomputed together.
pub fn toggle_local(registry: &mut PeerRegistry, local: ParticipantId) -> Result<ClientMessage> {
    let partner = registry
        .partner_of(local)
        .ok_or(LinkError::NotEntangled(local))?;
    let flipped = !registry.require(local)?.flipped;
    registry.orient_pair(local, partner, flipped)?;
    tracing::debug!("Participant '{}' toggled locally (flipped: {})", local, flipped);
    Ok(ClientMessage::Flux { flipped })
}

/// Enact the local orientation as it stands and announce it
pub fn apply_local(registry: &mut PeerRegistry, local: ParticipantId) -> Result<ClientMessage> {
    let partner = registry
        .partner_of(local)
        .ok_or(LinkError::NotEntangled(local))?;
    let flipped = registry.require(local)?.flipped;
    registry.orient_pair(local, partner, flipped)?;
    Ok(ClientMessage::Flux { flipped })
}

/// Server handling of a toggle announced by `sender`
///
/// The client-reported orientation is ignored: the partner takes the sender's
/// prior orientation and the sender takes its complement.
pub fn resolve_toggle(registry: &mut PeerRegistry, sender: ParticipantId) -> Result<Outbound> {
    let partner = registry
        .partner_of(sender)
        .ok_or(LinkError::NotEntangled(sender))?;
    let prior = registry.require(sender)?.flipped;
    registry.orient_pair(sender, partner, !prior)?;
    Ok(pair_broadcast(sender, partner, !prior))
}

/// Server handling of the first announcement after pairing
///
/// Enacts the orientation recorded at pairing time instead of toggling it.
pub fn confirm_assigned(registry: &mut PeerRegistry, sender: ParticipantId) -> Result<Outbound> {
    let partner = registry
        .partner_of(sender)
        .ok_or(LinkError::NotEntangled(sender))?;
    let flipped = registry.require(sender)?.flipped;
    registry.orient_pair(sender, partner, flipped)?;
    Ok(pair_broadcast(sender, partner, flipped))
}

fn pair_broadcast(player: ParticipantId, partner: ParticipantId, flipped: bool) -> Outbound {
    Outbound::new(
        Route::All,
        ServerMessage::Flux {
            player,
            partner,
            flipped,
        },
    )
}

/// Client handling of an authoritative pair state broadcast
///
/// A broadcast naming the local participant with someone other than its
/// current partner is stale and rejected, so a torn-down relationship is
/// never resurrected.
pub fn apply_broadcast(
    registry: &mut PeerRegistry,
    local: ParticipantId,
    player: ParticipantId,
    partner: ParticipantId,
    flipped: bool,
) -> Result<()> {
    if player == partner {
        return Err(LinkError::InvalidPeerReference(partner));
    }
    registry.require(player)?;
    registry.require(partner)?;

    let other = if local == player {
        Some(partner)
    } else if local == partner {
        Some(player)
    } else {
        None
    };

    match other {
        Some(other) => {
            if registry.partner_of(local) != Some(other) {
                return Err(LinkError::InvalidPeerReference(other));
            }
        }
        None => {
            unlink_stale(registry, player, partner);
            unlink_stale(registry, partner, player);
            registry.link(player, partner)?;
        }
    }

    registry.orient_pair(player, partner, flipped)
}

/// Clear a mirrored relationship of `id` that points anywhere but `keep`
fn unlink_stale(registry: &mut PeerRegistry, id: ParticipantId, keep: ParticipantId) {
    let previous = registry.get(id).and_then(|state| state.partner);
    if let Some(previous) = previous.filter(|previous| *previous != keep) {
        if let Some(state) = registry.get_mut(previous) {
            if state.partner == Some(id) {
                state.partner = None;
            }
        }
    }
}
