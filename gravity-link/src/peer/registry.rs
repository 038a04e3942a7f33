//! Registry of session participants and their peer state

use std::collections::BTreeMap;

use super::peer_state::PeerState;
use crate::error::{LinkError, Result};
use crate::types::{GravityEffect, ParticipantId};

/// One session member as seen by this process
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub id: ParticipantId,
    pub active: bool,
    pub state: PeerState,
}

/// Participants keyed by id, iterated in ascending id order
///
/// Entries are never removed: a departed participant stays as an inactive
/// record with default state so stale ids can be recognised.
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    participants: BTreeMap<ParticipantId, Participant>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a participant as active with fresh state
    ///
    /// Returns false if it was already active, in which case its state is kept.
    pub fn join(&mut self, id: ParticipantId) -> bool {
        match self.participants.get_mut(&id) {
            Some(participant) if participant.active => false,
            Some(participant) => {
                participant.active = true;
                participant.state = PeerState::new();
                true
            }
            None => {
                self.participants.insert(
                    id,
                    Participant {
                        id,
                        active: true,
                        state: PeerState::new(),
                    },
                );
                true
            }
        }
    }

    /// Mark a participant inactive and reset its state
    ///
    /// Returns the partner it held, if any. The partner's own record is left
    /// untouched; tearing the relationship down is the caller's job.
    pub fn leave(&mut self, id: ParticipantId) -> Option<ParticipantId> {
        let participant = self.participants.get_mut(&id)?;
        let partner = participant.state.partner;
        participant.active = false;
        participant.state = PeerState::new();
        partner
    }

    /// Whether a participant is known and active
    pub fn is_active(&self, id: ParticipantId) -> bool {
        self.participants.get(&id).is_some_and(|p| p.active)
    }

    /// State of an active participant
    pub fn get(&self, id: ParticipantId) -> Option<&PeerState> {
        self.participants
            .get(&id)
            .filter(|p| p.active)
            .map(|p| &p.state)
    }

    /// Mutable state of an active participant
    pub fn get_mut(&mut self, id: ParticipantId) -> Option<&mut PeerState> {
        self.participants
            .get_mut(&id)
            .filter(|p| p.active)
            .map(|p| &mut p.state)
    }

    /// State of an active participant, or `InvalidPeerReference`
    pub fn require(&self, id: ParticipantId) -> Result<&PeerState> {
        self.get(id).ok_or(LinkError::InvalidPeerReference(id))
    }

    /// Mutable state of an active participant, or `InvalidPeerReference`
    pub fn require_mut(&mut self, id: ParticipantId) -> Result<&mut PeerState> {
        self.get_mut(id).ok_or(LinkError::InvalidPeerReference(id))
    }

    /// Active participant ids in ascending order
    pub fn active_ids(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.participants
            .values()
            .filter(|p| p.active)
            .map(|p| p.id)
    }

    /// Number of active participants
    pub fn active_count(&self) -> usize {
        self.active_ids().count()
    }

    /// Partner of `id` if both are active
    pub fn partner_of(&self, id: ParticipantId) -> Option<ParticipantId> {
        self.get(id)
            .and_then(|state| state.partner)
            .filter(|partner| self.is_active(*partner))
    }

    /// Whether `id` holds a partner reference to an active participant
    pub fn is_entangled(&self, id: ParticipantId) -> bool {
        self.partner_of(id).is_some()
    }

    /// Enacted effect of an active participant
    pub fn gravity(&self, id: ParticipantId) -> Option<GravityEffect> {
        self.get(id).map(|state| state.gravity)
    }

    /// Link two active participants to each other
    pub fn link(&mut self, a: ParticipantId, b: ParticipantId) -> Result<()> {
        if a == b {
            return Err(LinkError::InvalidPeerReference(b));
        }
        self.require(a)?;
        self.require(b)?;
        self.require_mut(a)?.partner = Some(b);
        self.require_mut(b)?.partner = Some(a);
        Ok(())
    }

    /// Set a pair's orientations antisymmetrically and enact both
    pub fn orient_pair(&mut self, player: ParticipantId, partner: ParticipantId, flipped: bool) -> Result<()> {
        self.require(player)?;
        self.require(partner)?;
        self.require_mut(player)?.set_orientation(flipped);
        self.require_mut(partner)?.set_orientation(!flipped);
        Ok(())
    }
}
