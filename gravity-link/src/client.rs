//! Client-side protocol state
//!
//! A client owns the state of its locally controlled participant and a mirror
//! of everyone else. It predicts its own toggles, reconciles to server
//! broadcasts, and defers enacting a flipped pairing by the configured grace
//! delay.

use tokio::time::Instant;

use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::grace::GraceTimers;
use crate::notice::Notice;
use crate::orientation::{self, AscendInput};
use crate::peer::PeerRegistry;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::resync;
use crate::teardown;
use crate::types::{GravityEffect, ParticipantId};

/// What a client call produced: frames for the server and notices for the host
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientOutput {
    pub outbound: Vec<ClientMessage>,
    pub notices: Vec<Notice>,
}

impl ClientOutput {
    fn message(message: ClientMessage) -> Self {
        Self {
            outbound: vec![message],
            notices: Vec::new(),
        }
    }

    /// Append another output
    pub fn extend(&mut self, other: ClientOutput) {
        self.outbound.extend(other.outbound);
        self.notices.extend(other.notices);
    }

    /// Whether nothing was produced
    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.notices.is_empty()
    }
}

/// Protocol state of one client endpoint
#[derive(Debug)]
pub struct ClientPeer {
    local: ParticipantId,
    config: LinkConfig,
    registry: PeerRegistry,
    grace: GraceTimers,
}

impl ClientPeer {
    /// Create a client for the locally controlled participant `local`
    pub fn new(local: ParticipantId, config: LinkConfig) -> Self {
        let mut registry = PeerRegistry::new();
        registry.join(local);
        Self {
            local,
            config,
            registry,
            grace: GraceTimers::new(),
        }
    }

    /// Locally controlled participant
    pub fn local(&self) -> ParticipantId {
        self.local
    }

    /// Client configuration
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Local view of the session
    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// Partner of the local participant
    pub fn partner(&self) -> Option<ParticipantId> {
        self.registry.partner_of(self.local)
    }

    /// Whether the local participant is entangled
    pub fn is_entangled(&self) -> bool {
        self.registry.is_entangled(self.local)
    }

    /// Local orientation
    pub fn is_flipped(&self) -> bool {
        self.registry.get(self.local).is_some_and(|s| s.flipped)
    }

    /// Effect the movement engine should apply to `participant`
    pub fn gravity(&self, participant: ParticipantId) -> Option<GravityEffect> {
        self.registry.gravity(participant)
    }

    /// Deadline of the pending grace apply, if any
    pub fn next_grace_deadline(&self) -> Option<Instant> {
        self.grace.next_due()
    }

    /// Host event: another participant joined
    pub fn participant_joined(&mut self, participant: ParticipantId) {
        if participant != self.local && self.registry.join(participant) {
            tracing::debug!("Client '{}' sees participant '{}' join", self.local, participant);
        }
    }

    /// Host event: another participant disconnected
    ///
    /// Losing the partner dissolves the local relationship: the local record
    /// returns to baseline, the server is told and a notice is raised.
    pub fn participant_left(&mut self, participant: ParticipantId) -> ClientOutput {
        if participant == self.local {
            return ClientOutput::default();
        }
        let was_partner = self.registry.get(self.local).and_then(|s| s.partner) == Some(participant);
        teardown::disconnect(&mut self.registry, participant);
        if !was_partner {
            return ClientOutput::default();
        }
        self.grace.cancel(self.local);
        if let Some(state) = self.registry.get_mut(self.local) {
            state.decohere();
        }
        tracing::info!("Client '{}' is experiencing decoherence", self.local);
        ClientOutput {
            outbound: vec![ClientMessage::Decoherence],
            notices: vec![Notice::Decoherence],
        }
    }

    /// The server went away
    ///
    /// A restarted server remembers no pairing, so every relationship in the
    /// mirror is dropped and the next `enter_world` asks for a partner again.
    /// Nothing is sent: there is nobody to tell.
    pub fn authority_lost(&mut self) -> ClientOutput {
        let was_entangled = self.is_entangled();
        self.grace.cancel(self.local);
        let ids: Vec<ParticipantId> = self.registry.active_ids().collect();
        for id in ids {
            if let Some(state) = self.registry.get_mut(id) {
                if state.partner.is_some() {
                    state.decohere();
                }
            }
        }
        if !was_entangled {
            return ClientOutput::default();
        }
        tracing::info!("Client '{}' lost its entanglement with the server", self.local);
        ClientOutput {
            outbound: Vec::new(),
            notices: vec![Notice::Decoherence],
        }
    }

    /// Local participant entered the world
    ///
    /// Asks for everyone's orientation, then asks to be paired.
    pub fn enter_world(&mut self) -> ClientOutput {
        let mut outbound = vec![ClientMessage::SyncRequest];
        if !self.is_entangled() {
            outbound.push(ClientMessage::Rizz);
        }
        ClientOutput {
            outbound,
            notices: vec![Notice::Aligning],
        }
    }

    /// Local participant respawned; re-enact its current orientation
    ///
    /// Respawning changes nothing the server tracks, so nothing is announced.
    pub fn respawn(&mut self) {
        let Some(partner) = self.partner() else {
            return;
        };
        if self.grace.is_pending(self.local) {
            return;
        }
        let flipped = self.is_flipped();
        if let Err(e) = self.registry.orient_pair(self.local, partner, flipped) {
            tracing::debug!("Client '{}' respawn apply skipped: {}", self.local, e);
        }
    }

    /// Sample the ascend trigger for one tick
    pub fn ascend(&mut self, input: AscendInput) -> ClientOutput {
        let entangled = self.is_entangled();
        let fired = match self.registry.get_mut(self.local) {
            Some(state) => orientation::ascend_edge(state, input, entangled),
            None => false,
        };
        if fired {
            self.toggle()
        } else {
            ClientOutput::default()
        }
    }

    /// The local participant took damage
    pub fn hurt(&mut self) -> ClientOutput {
        if self.config.pain_flip {
            self.toggle()
        } else {
            ClientOutput::default()
        }
    }

    /// `participant` performed a jump
    pub fn jumped(&mut self, participant: ParticipantId) -> ClientOutput {
        if self.config.gravity_jump && participant == self.local {
            self.toggle()
        } else {
            ClientOutput::default()
        }
    }

    /// Toggle the local orientation if entangled
    pub fn toggle(&mut self) -> ClientOutput {
        match orientation::toggle_local(&mut self.registry, self.local) {
            Ok(message) => {
                // A manual toggle supersedes a pending pairing apply
                self.grace.cancel(self.local);
                ClientOutput::message(message)
            }
            Err(LinkError::NotEntangled(_)) => ClientOutput::default(),
            Err(e) => {
                tracing::warn!("Client '{}' toggle failed: {}", self.local, e);
                ClientOutput::default()
            }
        }
    }

    /// Run grace applies that are due at `now`
    ///
    /// Each apply re-validates that the relationship it was scheduled for
    /// still exists and the assigned orientation is still unenacted.
    pub fn poll_grace(&mut self, now: Instant) -> ClientOutput {
        let mut output = ClientOutput::default();
        for (participant, pending) in self.grace.take_due(now) {
            if participant != self.local {
                continue;
            }
            let still_valid = self.registry.partner_of(self.local) == Some(pending.partner)
                && self
                    .registry
                    .get(self.local)
                    .is_some_and(|s| s.flipped && s.gravity != GravityEffect::FLIPPED);
            if !still_valid {
                tracing::debug!("Client '{}' grace apply no longer valid", self.local);
                continue;
            }
            match orientation::apply_local(&mut self.registry, self.local) {
                Ok(message) => output.outbound.push(message),
                Err(e) => tracing::debug!("Client '{}' grace apply skipped: {}", self.local, e),
            }
        }
        output
    }

    /// Decode and handle one frame from the server
    ///
    /// Errors are logged and the frame is dropped.
    pub fn handle_packet(&mut self, frame: &[u8], now: Instant) -> ClientOutput {
        match ServerMessage::decode(frame).and_then(|message| self.handle_message(message, now)) {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("Client '{}' dropped frame: {}", self.local, e);
                ClientOutput::default()
            }
        }
    }

    /// Handle one decoded server message
    pub fn handle_message(&mut self, message: ServerMessage, now: Instant) -> Result<ClientOutput> {
        tracing::debug!("Client '{}' received {:?}", self.local, message);
        match message {
            ServerMessage::Rizz { partner, flipped } => self.entangle(partner, flipped, now),
            ServerMessage::Flux {
                player,
                partner,
                flipped,
            } => {
                orientation::apply_broadcast(&mut self.registry, self.local, player, partner, flipped)?;
                Ok(ClientOutput::default())
            }
            ServerMessage::SyncRequest { requester } => {
                let answer = resync::answer_request(&self.registry, self.local, requester)?;
                Ok(ClientOutput {
                    outbound: answer.into_iter().collect(),
                    notices: Vec::new(),
                })
            }
            ServerMessage::SyncResponse { responder, flipped } => {
                resync::apply_response(&mut self.registry, self.local, responder, flipped)?;
                Ok(ClientOutput::default())
            }
            ServerMessage::Decoherence { participant } => {
                if participant == self.local {
                    return Err(LinkError::InvalidPeerReference(participant));
                }
                if teardown::apply_notice(&mut self.registry, self.local, participant)? {
                    self.grace.cancel(self.local);
                    tracing::info!("Client '{}' released by '{}'", self.local, participant);
                    return Ok(ClientOutput {
                        outbound: Vec::new(),
                        notices: vec![Notice::Decoherence],
                    });
                }
                Ok(ClientOutput::default())
            }
        }
    }

    /// Adopt a pairing announced by the server
    fn entangle(&mut self, partner: ParticipantId, flipped: bool, now: Instant) -> Result<ClientOutput> {
        if partner == self.local {
            return Err(LinkError::InvalidPeerReference(partner));
        }
        // The server may announce a partner whose join has not reached us yet
        self.registry.join(partner);
        self.registry.link(self.local, partner)?;
        self.registry.require_mut(self.local)?.flipped = flipped;
        self.registry.require_mut(partner)?.flipped = !flipped;
        tracing::info!(
            "Client '{}' has entangled with '{}' (flipped: {})",
            self.local,
            partner,
            flipped
        );

        if flipped {
            self.grace
                .schedule(self.local, partner, now, self.config.grace_delay());
        } else {
            self.grace.cancel(self.local);
        }

        Ok(ClientOutput {
            outbound: Vec::new(),
            notices: vec![Notice::Entangled { partner }, Notice::PrepareForDesync],
        })
    }
}
