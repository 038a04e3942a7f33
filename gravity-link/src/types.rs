/// Core types for the gravity-link library
use std::str::FromStr;

use crate::error::LinkError;

/// Stable identifier of a session participant
///
/// Participant ids travel on the wire as a single unsigned byte,
/// so a session holds at most 256 participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParticipantId(u8);

impl ParticipantId {
    /// Create from the raw wire byte
    pub const fn new(raw: u8) -> Self {
        ParticipantId(raw)
    }

    /// Raw wire byte
    pub const fn as_u8(&self) -> u8 {
        self.0
    }
}

impl From<u8> for ParticipantId {
    fn from(raw: u8) -> Self {
        ParticipantId(raw)
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ParticipantId {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u8>()
            .map(ParticipantId)
            .map_err(|e| LinkError::Config(format!("Invalid participant id '{}': {}", s, e)))
    }
}

/// Physical effect handed to the host movement engine
///
/// Both fields are pure functions of a participant's orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GravityEffect {
    /// Forced gravity magnitude: zero leaves movement unconstrained,
    /// `i32::MAX` pins the participant to the ceiling
    pub forced_gravity: i32,
    /// Signed gravity direction, `1.0` normal or `-1.0` flipped
    pub direction: f32,
}

impl GravityEffect {
    /// Effect of a participant in normal orientation
    pub const BASELINE: GravityEffect = GravityEffect {
        forced_gravity: 0,
        direction: 1.0,
    };

    /// Effect of a participant in flipped orientation
    pub const FLIPPED: GravityEffect = GravityEffect {
        forced_gravity: i32::MAX,
        direction: -1.0,
    };

    /// Derive the effect from an orientation flag
    pub const fn from_orientation(flipped: bool) -> Self {
        if flipped {
            Self::FLIPPED
        } else {
            Self::BASELINE
        }
    }

    /// Whether this effect pins the participant
    pub fn is_forced(&self) -> bool {
        self.forced_gravity > 0
    }
}

impl Default for GravityEffect {
    fn default() -> Self {
        Self::BASELINE
    }
}
