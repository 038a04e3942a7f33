//! Authoritative server bound to a zenoh session

use std::collections::BTreeMap;

use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::network::{
    presence, AuthorityToken, Direction, LinkPublisher, LinkSubscriber, PresenceEvent, PresenceWatch,
};
use crate::protocol::{ClientMessage, Outbound, ServerMessage};
use crate::server::Authority;
use crate::stats::{LinkStats, StatsTracker};
use crate::types::ParticipantId;

use super::StepResult;

/// Commands that can be sent to the server node
#[derive(Debug, Clone)]
pub enum ServerCommand {
    /// Stop the node's run loop
    Stop,
}

/// Server node: owns the authority and routes its messages over zenoh
pub struct ServerNode {
    config: LinkConfig,
    session: zenoh::Session,
    authority: Authority,
    /// Kept alive so clients know the server is up
    _authority_token: AuthorityToken,
    presence: PresenceWatch,
    uplink: LinkSubscriber<ClientMessage>,
    /// One publisher per connected participant
    downlinks: BTreeMap<ParticipantId, LinkPublisher<ServerMessage>>,
    command_rx: flume::Receiver<ServerCommand>,
    command_tx: flume::Sender<ServerCommand>,
    stats_tracker: StatsTracker,
}

impl std::fmt::Debug for ServerNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerNode")
            .field("prefix", &self.config.keyexpr_prefix)
            .field("participants", &self.downlinks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ServerNode {
    /// Create a server node (use `SessionExt::declare_link_server`)
    pub(crate) async fn new_internal(config: LinkConfig, session: zenoh::Session) -> Result<Self> {
        let prefix = config.keyexpr_prefix.clone();
        let stats_tracker = StatsTracker::new();

        let authority_token = AuthorityToken::declare(&session, &prefix).await?;
        let presence = PresenceWatch::declare(&session, &prefix).await?;
        let uplink = LinkSubscriber::new(&session, &prefix, Direction::Up, None, stats_tracker.clone()).await?;
        let (command_tx, command_rx) = flume::unbounded();

        tracing::info!("Server node on '{}' initialized with Zenoh session", prefix);

        Ok(Self {
            config,
            session,
            authority: Authority::new(),
            _authority_token: authority_token,
            presence,
            uplink,
            downlinks: BTreeMap::new(),
            command_rx,
            command_tx,
            stats_tracker,
        })
    }

    /// Get reference to Zenoh session
    pub fn session(&self) -> &zenoh::Session {
        &self.session
    }

    /// Server-side protocol state
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Get a sender for sending commands to this node
    pub fn sender(&self) -> flume::Sender<ServerCommand> {
        self.command_tx.clone()
    }

    /// Get current traffic statistics
    pub fn stats(&self) -> LinkStats {
        self.stats_tracker.get_stats()
    }

    /// Run the server until the step timeout elapses or a Stop command arrives
    ///
    /// Presence changes and inbound frames are handled one at a time in
    /// arrival order.
    pub async fn step(&mut self) -> Result<StepResult> {
        let sleep = tokio::time::sleep(self.config.step_timeout());
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => {
                    return Ok(StepResult::Timeout);
                }
                event = self.presence.next() => match event {
                    Ok(PresenceEvent::Joined(participant)) => self.admit(participant).await,
                    Ok(PresenceEvent::Left(participant)) => {
                        self.downlinks.remove(&participant);
                        self.authority.participant_left(participant);
                    }
                    Err(e) => tracing::warn!("Server node presence error: {}", e),
                },
                received = self.uplink.recv() => match received {
                    Ok((sender, message)) => self.handle(sender, message).await,
                    Err(e) => tracing::warn!("Server node dropped frame: {}", e),
                },
                result = self.command_rx.recv_async() => match result {
                    Err(_) => {
                        tracing::info!("Server node command channel closed");
                        return Ok(StepResult::Stop);
                    }
                    Ok(ServerCommand::Stop) => {
                        tracing::info!("Server node received Stop command, exiting");
                        return Ok(StepResult::Stop);
                    }
                },
            }
        }
    }

    /// Register a participant and open its downlink
    async fn admit(&mut self, participant: ParticipantId) {
        self.authority.participant_joined(participant);
        if self.downlinks.contains_key(&participant) {
            return;
        }
        match LinkPublisher::new(
            &self.session,
            &self.config.keyexpr_prefix,
            Direction::Down,
            participant,
            self.stats_tracker.clone(),
        )
        .await
        {
            Ok(publisher) => {
                self.downlinks.insert(participant, publisher);
            }
            Err(e) => tracing::error!(
                "Server node failed to open downlink to participant '{}': {}",
                participant,
                e
            ),
        }
    }

    async fn handle(&mut self, sender: ParticipantId, message: ClientMessage) {
        // Traffic may overtake the presence announcement of a fresh participant,
        // but a sender holding no presence token is gone or was never here
        if !self.authority.registry().is_active(sender) {
            match presence::is_present(&self.session, &self.config.keyexpr_prefix, sender).await {
                Ok(true) => {
                    tracing::debug!("Participant '{}' heard before its presence", sender);
                    self.admit(sender).await;
                }
                Ok(false) => {
                    self.stats_tracker.record_dropped();
                    tracing::debug!("Dropped {:?} from absent participant '{}'", message.kind(), sender);
                    return;
                }
                Err(e) => {
                    self.stats_tracker.record_dropped();
                    tracing::warn!("Server node could not check presence of participant '{}': {}", sender, e);
                    return;
                }
            }
        }

        match self.authority.handle_message(sender, message) {
            Ok(outbound) => {
                for outbound in outbound {
                    self.route(outbound).await;
                }
            }
            Err(LinkError::RaceOnPairing(id)) => {
                tracing::debug!("Participant '{}' pairing request ignored, already entangled", id);
            }
            Err(e) => {
                self.stats_tracker.record_dropped();
                tracing::warn!("Server node dropped message from participant '{}': {}", sender, e);
            }
        }
    }

    async fn route(&self, outbound: Outbound) {
        for (participant, publisher) in &self.downlinks {
            if !outbound.route.includes(*participant) {
                continue;
            }
            if let Err(e) = publisher.put(&outbound.message).await {
                tracing::error!(
                    "Server node failed to send {:?} to participant '{}': {}",
                    outbound.message.kind(),
                    participant,
                    e
                );
            }
        }
    }
}
