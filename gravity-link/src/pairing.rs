//! Server-side pairing of unentangled participants

use rand::Rng;

use crate::error::{LinkError, Result};
use crate::peer::PeerRegistry;
use crate::protocol::{Outbound, Route, ServerMessage};
use crate::types::ParticipantId;

/// A relationship formed by `PairingEngine::try_pair`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pairing {
    /// Participant that asked to be paired
    pub requester: ParticipantId,
    /// Participant it was matched with
    pub partner: ParticipantId,
    /// Initial orientation of the requester, the partner holds the complement
    pub requester_flipped: bool,
}

impl Pairing {
    /// Member of the pair that starts flipped
    pub fn flipped_member(&self) -> ParticipantId {
        if self.requester_flipped {
            self.requester
        } else {
            self.partner
        }
    }

    /// PairRequest announcements for both members
    pub fn announcements(&self) -> [Outbound; 2] {
        [
            Outbound::new(
                Route::To(self.partner),
                ServerMessage::Rizz {
                    partner: self.requester,
                    flipped: !self.requester_flipped,
                },
            ),
            Outbound::new(
                Route::To(self.requester),
                ServerMessage::Rizz {
                    partner: self.partner,
                    flipped: self.requester_flipped,
                },
            ),
        ]
    }
}

/// Matches unentangled participants using an injectable random source
///
/// The engine holds `&mut` access for the whole decision, so two requests can
/// never both claim the same candidate.
#[derive(Debug)]
pub struct PairingEngine<R> {
    rng: R,
}

impl<R: Rng> PairingEngine<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Pair `requester` with the first unentangled active participant
    ///
    /// Candidates are scanned in ascending id order. Returns `Ok(None)` when
    /// nobody is available, leaving all state untouched. Fails with
    /// `RaceOnPairing` when the requester is already entangled, which happens
    /// when its own request arrives after another participant claimed it.
    pub fn try_pair(&mut self, registry: &mut PeerRegistry, requester: ParticipantId) -> Result<Option<Pairing>> {
        registry.require(requester)?;
        if registry.is_entangled(requester) {
            return Err(LinkError::RaceOnPairing(requester));
        }

        let candidate = registry
            .active_ids()
            .filter(|id| *id != requester)
            .find(|id| !registry.is_entangled(*id));

        let Some(partner) = candidate else {
            tracing::debug!("Participant '{}' found no pairing candidate", requester);
            return Ok(None);
        };

        let coin = self.rng.random_bool(0.5);
        let pairing = Pairing {
            requester,
            partner,
            requester_flipped: !coin,
        };

        registry.link(requester, partner)?;
        // Orientation is recorded but not enacted; the flipped member enacts it after its grace delay
        registry.require_mut(partner)?.flipped = coin;
        registry.require_mut(requester)?.flipped = !coin;

        tracing::info!(
            "Participant '{}' entangled with '{}' (flipped: '{}')",
            requester,
            partner,
            pairing.flipped_member()
        );
        Ok(Some(pairing))
    }
}
