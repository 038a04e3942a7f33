//! Key expression types for link traffic and presence

use crate::error::{LinkError, Result};
use crate::types::ParticipantId;
use zenoh::key_expr::KeyExpr;

/// Direction of link traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to server
    Up,
    /// Server to client
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    fn parse(chunk: &str) -> Option<Self> {
        match chunk {
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            _ => None,
        }
    }
}

/// Link keyexpr: the channel between the server and one client
///
/// Pattern: `<prefix>/<up|down>/<participant_id>`
///
/// A `None` participant stands for the `*` wildcard, used by the server to
/// subscribe to every client at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkKeyexpr {
    prefix: String,
    direction: Direction,
    participant: Option<ParticipantId>,
}

impl LinkKeyexpr {
    pub fn new(prefix: &str, direction: Direction, participant: Option<ParticipantId>) -> Self {
        Self {
            prefix: prefix.to_string(),
            direction,
            participant,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn participant(&self) -> Option<ParticipantId> {
        self.participant
    }

    /// Build the zenoh key expression
    pub fn to_keyexpr(&self) -> Result<KeyExpr<'static>> {
        let keyexpr_str = format!(
            "{}/{}/{}",
            self.prefix,
            self.direction.as_str(),
            participant_chunk(self.participant)
        );
        owned_keyexpr(keyexpr_str)
    }
}

impl TryFrom<&KeyExpr<'_>> for LinkKeyexpr {
    type Error = LinkError;

    fn try_from(keyexpr: &KeyExpr<'_>) -> Result<Self> {
        let parts: Vec<&str> = keyexpr.as_str().split('/').collect();

        // Expected pattern: [...prefix]/<up|down>/<participant_id>
        let direction = parts
            .len()
            .checked_sub(2)
            .and_then(|i| Direction::parse(parts[i]))
            .ok_or_else(|| {
                LinkError::InvalidKeyexpr(format!("Invalid LinkKeyexpr pattern: {}", keyexpr.as_str()))
            })?;

        let participant = parse_participant(parts[parts.len() - 1], keyexpr)?;
        let prefix = parts[..parts.len() - 2].join("/");

        Ok(Self {
            prefix,
            direction,
            participant,
        })
    }
}

/// Presence keyexpr: liveliness token of a participant
///
/// Pattern: `<prefix>/presence/<participant_id>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceKeyexpr {
    prefix: String,
    participant: Option<ParticipantId>,
}

impl PresenceKeyexpr {
    pub fn new(prefix: &str, participant: Option<ParticipantId>) -> Self {
        Self {
            prefix: prefix.to_string(),
            participant,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn participant(&self) -> Option<ParticipantId> {
        self.participant
    }

    /// Build the zenoh key expression
    pub fn to_keyexpr(&self) -> Result<KeyExpr<'static>> {
        let keyexpr_str = format!("{}/presence/{}", self.prefix, participant_chunk(self.participant));
        owned_keyexpr(keyexpr_str)
    }
}

impl TryFrom<&KeyExpr<'_>> for PresenceKeyexpr {
    type Error = LinkError;

    fn try_from(keyexpr: &KeyExpr<'_>) -> Result<Self> {
        let parts: Vec<&str> = keyexpr.as_str().split('/').collect();

        // Expected pattern: [...prefix]/presence/<participant_id>
        if parts.len() < 2 || parts[parts.len() - 2] != "presence" {
            return Err(LinkError::InvalidKeyexpr(format!(
                "Invalid PresenceKeyexpr pattern: {}",
                keyexpr.as_str()
            )));
        }

        let participant = parse_participant(parts[parts.len() - 1], keyexpr)?;
        let prefix = parts[..parts.len() - 2].join("/");

        Ok(Self { prefix, participant })
    }
}

/// Authority keyexpr: liveliness token of the server
///
/// Pattern: `<prefix>/authority`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityKeyexpr {
    prefix: String,
}

impl AuthorityKeyexpr {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    /// Build the zenoh key expression
    pub fn to_keyexpr(&self) -> Result<KeyExpr<'static>> {
        owned_keyexpr(format!("{}/authority", self.prefix))
    }
}

fn participant_chunk(participant: Option<ParticipantId>) -> String {
    match participant {
        Some(id) => id.to_string(),
        None => "*".to_string(),
    }
}

fn parse_participant(chunk: &str, keyexpr: &KeyExpr<'_>) -> Result<Option<ParticipantId>> {
    if chunk == "*" {
        return Ok(None);
    }
    chunk
        .parse::<u8>()
        .map(|raw| Some(ParticipantId::new(raw)))
        .map_err(|_| {
            LinkError::InvalidKeyexpr(format!(
                "Invalid participant id '{}' in keyexpr: {}",
                chunk,
                keyexpr.as_str()
            ))
        })
}

fn owned_keyexpr(keyexpr_str: String) -> Result<KeyExpr<'static>> {
    KeyExpr::try_from(keyexpr_str.clone())
        .map_err(|e| LinkError::InvalidKeyexpr(format!("{}: {}", keyexpr_str, e)))
}
