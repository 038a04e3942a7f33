/// Per-participant entanglement record
use crate::types::{GravityEffect, ParticipantId};

/// Entanglement state of one participant
///
/// `flipped` is the orientation the protocol agreed on. `gravity` is the
/// physical effect currently enacted, which lags behind `flipped` while a
/// pairing grace delay is pending.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerState {
    /// Other member of the relationship
    pub partner: Option<ParticipantId>,
    /// Orientation flag
    pub flipped: bool,
    /// Whether the ascend trigger was held on the previous tick
    pub last_input_latch: bool,
    /// Enacted physical effect
    pub gravity: GravityEffect,
}

impl PeerState {
    pub fn new() -> Self {
        Self {
            partner: None,
            flipped: false,
            last_input_latch: false,
            gravity: GravityEffect::BASELINE,
        }
    }

    /// Set the orientation and enact it
    pub fn set_orientation(&mut self, flipped: bool) {
        self.flipped = flipped;
        self.enact();
    }

    /// Recompute the physical effect from the orientation
    pub fn enact(&mut self) {
        self.gravity = GravityEffect::from_orientation(self.flipped);
    }

    /// Drop the relationship and return to baseline
    ///
    /// The input latch survives, it tracks the input device rather than the relationship.
    pub fn decohere(&mut self) {
        self.partner = None;
        self.flipped = false;
        self.gravity = GravityEffect::BASELINE;
    }

    /// Whether this record holds the baseline orientation and effect
    pub fn is_baseline(&self) -> bool {
        !self.flipped && self.gravity == GravityEffect::BASELINE
    }
}

impl Default for PeerState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_baseline() {
        let state = PeerState::default();
        assert_eq!(state.partner, None);
        assert!(state.is_baseline());
    }

    #[test]
    fn test_set_orientation_enacts() {
        let mut state = PeerState::new();
        state.set_orientation(true);
        assert_eq!(state.gravity, GravityEffect::FLIPPED);
        state.set_orientation(false);
        assert_eq!(state.gravity, GravityEffect::BASELINE);
    }

    #[test]
    fn test_decohere_keeps_latch() {
        let mut state = PeerState::new();
        state.partner = Some(ParticipantId::new(3));
        state.set_orientation(true);
        state.last_input_latch = true;

        state.decohere();
        assert_eq!(state.partner, None);
        assert!(state.is_baseline());
        assert!(state.last_input_latch);
    }
}
