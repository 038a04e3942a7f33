//! Authoritative server
//!
//! Owns the session-wide peer registry, takes pairing decisions and derives
//! every final pair orientation. Inbound frames are handled one at a time and
//! each produces the outbound messages to route.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{LinkError, Result};
use crate::orientation;
use crate::pairing::PairingEngine;
use crate::peer::PeerRegistry;
use crate::protocol::{ClientMessage, Outbound};
use crate::resync;
use crate::teardown;
use crate::types::ParticipantId;

/// Server-side protocol state
#[derive(Debug)]
pub struct Authority<R = StdRng> {
    registry: PeerRegistry,
    pairing: PairingEngine<R>,
    /// Flipped pair members whose assigned orientation is not enacted yet
    pending_enactment: HashSet<ParticipantId>,
    /// Survivors released by a disconnect, keyed to the departed partner,
    /// whose own decoherence announcement has not arrived yet
    released: HashMap<ParticipantId, ParticipantId>,
}

impl Authority<StdRng> {
    /// Create an authority seeded from the operating system
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }
}

impl Default for Authority<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> Authority<R> {
    /// Create an authority drawing pairing coin flips from `rng`
    pub fn with_rng(rng: R) -> Self {
        Self {
            registry: PeerRegistry::new(),
            pairing: PairingEngine::new(rng),
            pending_enactment: HashSet::new(),
            released: HashMap::new(),
        }
    }

    /// Session-wide registry
    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// Whether `participant` was assigned a flipped orientation it has not enacted yet
    pub fn is_pending_enactment(&self, participant: ParticipantId) -> bool {
        self.pending_enactment.contains(&participant)
    }

    /// Host event: a participant joined the session
    pub fn participant_joined(&mut self, participant: ParticipantId) {
        if self.registry.join(participant) {
            tracing::info!("Participant '{}' joined", participant);
        } else {
            tracing::debug!("Participant '{}' joined twice", participant);
        }
    }

    /// Host event: a participant disconnected
    ///
    /// The survivor's client observes the same event and announces its own
    /// decoherence, so nothing is sent from here.
    pub fn participant_left(&mut self, participant: ParticipantId) {
        self.pending_enactment.remove(&participant);
        self.released.remove(&participant);
        if let Some(survivor) = teardown::disconnect(&mut self.registry, participant) {
            self.pending_enactment.remove(&survivor);
            self.released.insert(survivor, participant);
            tracing::info!(
                "Participant '{}' left, releasing partner '{}'",
                participant,
                survivor
            );
        } else {
            tracing::info!("Participant '{}' left", participant);
        }
    }

    /// Decode and handle one frame from `sender`
    ///
    /// Errors are logged and the frame is dropped; the session carries on.
    pub fn handle_packet(&mut self, sender: ParticipantId, frame: &[u8]) -> Vec<Outbound> {
        let result = ClientMessage::decode(frame).and_then(|message| self.handle_message(sender, message));
        match result {
            Ok(outbound) => outbound,
            Err(LinkError::RaceOnPairing(id)) => {
                tracing::debug!("Participant '{}' pairing request ignored, already entangled", id);
                Vec::new()
            }
            Err(e) => {
                tracing::warn!("Dropped frame from participant '{}': {}", sender, e);
                Vec::new()
            }
        }
    }

    /// Handle one decoded message from `sender`
    pub fn handle_message(&mut self, sender: ParticipantId, message: ClientMessage) -> Result<Vec<Outbound>> {
        self.registry.require(sender)?;
        tracing::debug!("Participant '{}' sent {:?}", sender, message);

        match message {
            ClientMessage::Rizz => {
                let Some(pairing) = self.pairing.try_pair(&mut self.registry, sender)? else {
                    return Ok(Vec::new());
                };
                self.pending_enactment.remove(&pairing.requester);
                self.pending_enactment.remove(&pairing.partner);
                self.pending_enactment.insert(pairing.flipped_member());
                Ok(pairing.announcements().to_vec())
            }
            ClientMessage::Flux { flipped } => {
                let partner = self
                    .registry
                    .partner_of(sender)
                    .ok_or(LinkError::NotEntangled(sender))?;
                let pending = self.pending_enactment.remove(&sender);
                let recorded = self.registry.require(sender)?.flipped;
                let outbound = if pending && flipped == recorded {
                    orientation::confirm_assigned(&mut self.registry, sender)?
                } else {
                    self.pending_enactment.remove(&partner);
                    orientation::resolve_toggle(&mut self.registry, sender)?
                };
                let resolved = self.registry.require(sender)?.flipped;
                if resolved != flipped {
                    tracing::debug!(
                        "Participant '{}' reported flipped={} but resolved to {}",
                        sender,
                        flipped,
                        resolved
                    );
                }
                Ok(vec![outbound])
            }
            ClientMessage::SyncRequest => Ok(vec![resync::relay_request(&self.registry, sender)?]),
            ClientMessage::SyncResponse {
                requester,
                responder,
                flipped,
            } => {
                if responder != sender {
                    tracing::debug!(
                        "Participant '{}' answered sync on behalf of '{}'",
                        sender,
                        responder
                    );
                }
                Ok(vec![resync::relay_response(
                    &self.registry,
                    requester,
                    responder,
                    flipped,
                )?])
            }
            ClientMessage::Decoherence => {
                // The survivor may have been paired again before its announcement arrived
                if let Some(departed) = self.released.remove(&sender) {
                    if let Some(partner) = self.registry.partner_of(sender) {
                        tracing::debug!(
                            "Participant '{}' announced losing '{}' after pairing with '{}', ignoring",
                            sender,
                            departed,
                            partner
                        );
                        return Ok(Vec::new());
                    }
                }
                self.pending_enactment.remove(&sender);
                if let Some(partner) = self.registry.get(sender).and_then(|s| s.partner) {
                    self.pending_enactment.remove(&partner);
                }
                Ok(vec![teardown::decohere(&mut self.registry, sender)?])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Route, ServerMessage};
    use crate::types::GravityEffect;

    fn id(raw: u8) -> ParticipantId {
        ParticipantId::new(raw)
    }

    fn authority_with(ids: &[u8]) -> Authority {
        let mut authority = Authority::with_rng(StdRng::seed_from_u64(42));
        for raw in ids {
            authority.participant_joined(id(*raw));
        }
        authority
    }

    fn flipped(authority: &Authority, raw: u8) -> bool {
        authority.registry().get(id(raw)).unwrap().flipped
    }

    #[test]
    fn test_rizz_pairs_and_announces() {
        let mut authority = authority_with(&[1, 2]);
        let outbound = authority.handle_packet(id(1), &ClientMessage::Rizz.encode());
        assert_eq!(outbound.len(), 2);
        assert!(outbound.iter().any(|o| o.route == Route::To(id(1))));
        assert!(outbound.iter().any(|o| o.route == Route::To(id(2))));
        assert_eq!(authority.registry().partner_of(id(1)), Some(id(2)));
        assert_ne!(flipped(&authority, 1), flipped(&authority, 2));

        let flipped_member = if flipped(&authority, 1) { id(1) } else { id(2) };
        assert!(authority.is_pending_enactment(flipped_member));
    }

    #[test]
    fn test_first_flux_confirms_then_toggles() {
        let mut authority = authority_with(&[1, 2]);
        authority.handle_packet(id(1), &ClientMessage::Rizz.encode());
        let member = if flipped(&authority, 1) { 1 } else { 2 };
        let other = 3 - member;

        // Grace apply from the flipped member enacts without toggling
        let outbound = authority.handle_packet(id(member), &ClientMessage::Flux { flipped: true }.encode());
        assert_eq!(
            outbound,
            vec![Outbound::new(
                Route::All,
                ServerMessage::Flux {
                    player: id(member),
                    partner: id(other),
                    flipped: true
                }
            )]
        );
        assert_eq!(authority.registry().gravity(id(member)), Some(GravityEffect::FLIPPED));

        // A later announcement toggles
        authority.handle_packet(id(member), &ClientMessage::Flux { flipped: false }.encode());
        assert!(!flipped(&authority, member));
        assert!(flipped(&authority, other));
    }

    #[test]
    fn test_partner_toggle_during_grace_clears_pending() {
        let mut authority = authority_with(&[1, 2]);
        authority.handle_packet(id(1), &ClientMessage::Rizz.encode());
        let member = if flipped(&authority, 1) { 1 } else { 2 };
        let other = 3 - member;

        authority.handle_packet(id(other), &ClientMessage::Flux { flipped: true }.encode());
        assert!(flipped(&authority, other));
        assert!(!authority.is_pending_enactment(id(member)));

        // The late grace apply is now an ordinary toggle
        authority.handle_packet(id(member), &ClientMessage::Flux { flipped: true }.encode());
        assert!(flipped(&authority, member));
        assert!(!flipped(&authority, other));
    }

    #[test]
    fn test_toggle_during_grace_is_not_mistaken_for_confirmation() {
        let mut authority = authority_with(&[1, 2]);
        authority.handle_packet(id(1), &ClientMessage::Rizz.encode());
        let member = if flipped(&authority, 1) { 1 } else { 2 };
        let other = 3 - member;

        // The flipped member toggled back before its grace apply fired
        authority.handle_packet(id(member), &ClientMessage::Flux { flipped: false }.encode());
        assert!(!flipped(&authority, member));
        assert!(flipped(&authority, other));
        assert!(!authority.is_pending_enactment(id(member)));
    }

    #[test]
    fn test_flux_from_unentangled_dropped() {
        let mut authority = authority_with(&[1, 2]);
        let outbound = authority.handle_packet(id(1), &ClientMessage::Flux { flipped: true }.encode());
        assert!(outbound.is_empty());
        assert!(!flipped(&authority, 1));
    }

    #[test]
    fn test_malformed_and_unknown_dropped() {
        let mut authority = authority_with(&[1, 2]);
        assert!(authority.handle_packet(id(1), &[1]).is_empty());
        assert!(authority.handle_packet(id(1), &[9]).is_empty());
        assert!(authority.handle_packet(id(1), &[]).is_empty());
        assert_eq!(authority.registry().partner_of(id(1)), None);
    }

    #[test]
    fn test_unknown_sender_dropped() {
        let mut authority = authority_with(&[1]);
        assert!(matches!(
            authority.handle_message(id(8), ClientMessage::Rizz),
            Err(LinkError::InvalidPeerReference(_))
        ));
    }

    #[test]
    fn test_departed_sender_is_not_readmitted() {
        let mut authority = authority_with(&[1, 2, 3]);
        authority.participant_left(id(2));
        assert!(authority.handle_packet(id(2), &ClientMessage::Rizz.encode()).is_empty());
        assert!(!authority.registry().is_active(id(2)));

        // The next request pairs live participants only
        authority.handle_packet(id(3), &ClientMessage::Rizz.encode());
        assert_eq!(authority.registry().partner_of(id(3)), Some(id(1)));
    }

    #[test]
    fn test_repeated_rizz_is_ignored() {
        let mut authority = authority_with(&[1, 2, 3]);
        authority.handle_packet(id(1), &ClientMessage::Rizz.encode());
        assert!(authority.handle_packet(id(1), &ClientMessage::Rizz.encode()).is_empty());
        assert!(authority.handle_packet(id(2), &ClientMessage::Rizz.encode()).is_empty());
        assert_eq!(authority.registry().partner_of(id(3)), None);
    }

    #[test]
    fn test_sync_request_and_response_routing() {
        let mut authority = authority_with(&[1, 2, 3]);
        let fan_out = authority.handle_packet(id(3), &ClientMessage::SyncRequest.encode());
        assert_eq!(
            fan_out,
            vec![Outbound::new(
                Route::AllExcept(id(3)),
                ServerMessage::SyncRequest { requester: id(3) }
            )]
        );

        let answer = ClientMessage::SyncResponse {
            requester: id(3),
            responder: id(1),
            flipped: true,
        };
        let relayed = authority.handle_packet(id(1), &answer.encode());
        assert_eq!(
            relayed,
            vec![Outbound::new(
                Route::To(id(3)),
                ServerMessage::SyncResponse {
                    responder: id(1),
                    flipped: true
                }
            )]
        );
    }

    #[test]
    fn test_decoherence_rebroadcast_excludes_sender() {
        let mut authority = authority_with(&[1, 2, 3]);
        authority.handle_packet(id(1), &ClientMessage::Rizz.encode());
        let outbound = authority.handle_packet(id(1), &ClientMessage::Decoherence.encode());
        assert_eq!(
            outbound,
            vec![Outbound::new(
                Route::AllExcept(id(1)),
                ServerMessage::Decoherence { participant: id(1) }
            )]
        );
        assert_eq!(authority.registry().partner_of(id(2)), None);
        assert!(!authority.is_pending_enactment(id(1)));
        assert!(!authority.is_pending_enactment(id(2)));
    }

    #[test]
    fn test_leave_releases_partner() {
        let mut authority = authority_with(&[1, 2]);
        authority.handle_packet(id(1), &ClientMessage::Rizz.encode());
        authority.participant_left(id(2));
        let survivor = authority.registry().get(id(1)).unwrap();
        assert_eq!(survivor.partner, None);
        assert!(survivor.is_baseline());
        assert!(!authority.is_pending_enactment(id(1)));
        assert!(!authority.is_pending_enactment(id(2)));
    }

    #[test]
    fn test_late_decoherence_keeps_new_pair() {
        let mut authority = authority_with(&[1, 2, 3]);
        authority.handle_packet(id(1), &ClientMessage::Rizz.encode());
        assert_eq!(authority.registry().partner_of(id(1)), Some(id(2)));

        authority.participant_left(id(2));
        // Participant 3 pairs with the released survivor first
        authority.handle_packet(id(3), &ClientMessage::Rizz.encode());
        assert_eq!(authority.registry().partner_of(id(1)), Some(id(3)));

        let outbound = authority.handle_packet(id(1), &ClientMessage::Decoherence.encode());
        assert!(outbound.is_empty());
        assert_eq!(authority.registry().partner_of(id(1)), Some(id(3)));
        assert_eq!(authority.registry().partner_of(id(3)), Some(id(1)));

        // A later announcement is an explicit request again
        let outbound = authority.handle_packet(id(1), &ClientMessage::Decoherence.encode());
        assert_eq!(outbound.len(), 1);
        assert_eq!(authority.registry().partner_of(id(3)), None);
    }

    #[test]
    fn test_decoherence_after_release_is_rebroadcast() {
        let mut authority = authority_with(&[1, 2, 3]);
        authority.handle_packet(id(1), &ClientMessage::Rizz.encode());
        authority.participant_left(id(2));

        let outbound = authority.handle_packet(id(1), &ClientMessage::Decoherence.encode());
        assert_eq!(
            outbound,
            vec![Outbound::new(
                Route::AllExcept(id(1)),
                ServerMessage::Decoherence { participant: id(1) }
            )]
        );
    }
}
