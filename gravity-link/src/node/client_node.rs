//! Client endpoint bound to a zenoh session

use tokio::time::Instant;

use crate::client::{ClientOutput, ClientPeer};
use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::network::{
    AuthorityWatch, Direction, LinkPublisher, LinkSubscriber, PresenceEvent, PresenceToken, PresenceWatch,
};
use crate::orientation::AscendInput;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::stats::{LinkStats, StatsTracker};
use crate::types::{GravityEffect, ParticipantId};

use super::StepResult;

/// Commands that can be sent to the client node
#[derive(Debug, Clone)]
pub enum ClientCommand {
    /// Ascend trigger sampled this tick
    Ascend(AscendInput),
    /// The local participant took damage
    Hurt,
    /// The local participant jumped
    Jump,
    /// The local participant respawned
    Respawn,
    /// Stop the node's run loop
    Stop,
}

/// Client node: drives a `ClientPeer` from zenoh traffic and local commands
pub struct ClientNode {
    id: ParticipantId,
    config: LinkConfig,
    session: zenoh::Session,
    peer: ClientPeer,
    /// Announces this participant to the server and the other clients
    _presence_token: PresenceToken,
    presence: PresenceWatch,
    authority: AuthorityWatch,
    /// Whether the world was entered since the server last appeared
    entered: bool,
    downlink: LinkSubscriber<ServerMessage>,
    uplink: LinkPublisher<ClientMessage>,
    command_rx: flume::Receiver<ClientCommand>,
    command_tx: flume::Sender<ClientCommand>,
    stats_tracker: StatsTracker,
}

impl std::fmt::Debug for ClientNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientNode")
            .field("id", &self.id)
            .field("prefix", &self.config.keyexpr_prefix)
            .field("partner", &self.peer.partner())
            .finish()
    }
}

impl ClientNode {
    /// Create a client node (use `SessionExt::declare_link_client`)
    pub(crate) async fn new_internal(id: ParticipantId, config: LinkConfig, session: zenoh::Session) -> Result<Self> {
        let prefix = config.keyexpr_prefix.clone();
        let stats_tracker = StatsTracker::new();

        let downlink =
            LinkSubscriber::new(&session, &prefix, Direction::Down, Some(id), stats_tracker.clone()).await?;
        let uplink = LinkPublisher::new(&session, &prefix, Direction::Up, id, stats_tracker.clone()).await?;
        let presence_token = PresenceToken::declare(&session, &prefix, id).await?;
        let presence = PresenceWatch::declare(&session, &prefix).await?;
        let authority = AuthorityWatch::declare(&session, &prefix).await?;
        let (command_tx, command_rx) = flume::unbounded();

        tracing::info!("Node '{}' initialized with Zenoh session", id);

        Ok(Self {
            id,
            peer: ClientPeer::new(id, config.clone()),
            config,
            session,
            _presence_token: presence_token,
            presence,
            authority,
            entered: false,
            downlink,
            uplink,
            command_rx,
            command_tx,
            stats_tracker,
        })
    }

    /// Locally controlled participant
    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// Get reference to Zenoh session
    pub fn session(&self) -> &zenoh::Session {
        &self.session
    }

    /// Client-side protocol state
    pub fn peer(&self) -> &ClientPeer {
        &self.peer
    }

    /// Effect the movement engine should apply to `participant`
    pub fn gravity(&self, participant: ParticipantId) -> Option<GravityEffect> {
        self.peer.gravity(participant)
    }

    /// Whether the world was entered since the server last appeared
    pub fn has_entered(&self) -> bool {
        self.entered
    }

    /// Get a sender for sending commands to this node
    pub fn sender(&self) -> flume::Sender<ClientCommand> {
        self.command_tx.clone()
    }

    /// Get current traffic statistics
    pub fn stats(&self) -> LinkStats {
        self.stats_tracker.get_stats()
    }

    /// Execute one step of the client
    ///
    /// Returns when either:
    /// - handling produced notices for the host (returns Notices)
    /// - the step timeout elapses (returns Timeout)
    /// - a Stop command is received (returns Stop)
    pub async fn step(&mut self) -> Result<StepResult> {
        let sleep = tokio::time::sleep(self.config.step_timeout());
        tokio::pin!(sleep);

        loop {
            let grace_deadline = self.peer.next_grace_deadline();
            let output = tokio::select! {
                () = &mut sleep => {
                    return Ok(StepResult::Timeout);
                }
                () = tokio::time::sleep_until(grace_deadline.unwrap_or_else(Instant::now)), if grace_deadline.is_some() => {
                    self.peer.poll_grace(Instant::now())
                }
                alive = self.authority.next() => match alive {
                    Ok(true) if !self.entered => {
                        tracing::info!("Node '{}' sees the server, entering the world", self.id);
                        self.entered = true;
                        self.peer.enter_world()
                    }
                    Ok(true) => ClientOutput::default(),
                    Ok(false) => {
                        tracing::warn!("Node '{}' lost the server", self.id);
                        self.entered = false;
                        self.peer.authority_lost()
                    }
                    Err(e) => {
                        tracing::warn!("Node '{}' authority watch error: {}", self.id, e);
                        ClientOutput::default()
                    }
                },
                event = self.presence.next() => match event {
                    Ok(PresenceEvent::Joined(participant)) => {
                        self.peer.participant_joined(participant);
                        ClientOutput::default()
                    }
                    Ok(PresenceEvent::Left(participant)) => self.peer.participant_left(participant),
                    Err(e) => {
                        tracing::warn!("Node '{}' presence error: {}", self.id, e);
                        ClientOutput::default()
                    }
                },
                received = self.downlink.recv() => match received {
                    Ok((_, message)) => self.handle(message),
                    Err(e) => {
                        tracing::warn!("Node '{}' dropped frame: {}", self.id, e);
                        ClientOutput::default()
                    }
                },
                result = self.command_rx.recv_async() => match result {
                    Err(_) => {
                        tracing::info!("Node '{}' command channel closed", self.id);
                        return Ok(StepResult::Stop);
                    }
                    Ok(ClientCommand::Stop) => {
                        tracing::info!("Node '{}' received Stop command, exiting", self.id);
                        return Ok(StepResult::Stop);
                    }
                    Ok(command) => self.command(command),
                },
            };

            for message in &output.outbound {
                if let Err(e) = self.uplink.put(message).await {
                    tracing::error!("Node '{}' failed to send {:?}: {}", self.id, message.kind(), e);
                }
            }
            if !output.notices.is_empty() {
                return Ok(StepResult::Notices(output.notices));
            }
        }
    }

    fn handle(&mut self, message: ServerMessage) -> ClientOutput {
        match self.peer.handle_message(message, Instant::now()) {
            Ok(output) => output,
            Err(e @ LinkError::InvalidPeerReference(_)) => {
                self.stats_tracker.record_dropped();
                tracing::debug!("Node '{}' ignored stale message: {}", self.id, e);
                ClientOutput::default()
            }
            Err(e) => {
                self.stats_tracker.record_dropped();
                tracing::warn!("Node '{}' dropped message: {}", self.id, e);
                ClientOutput::default()
            }
        }
    }

    fn command(&mut self, command: ClientCommand) -> ClientOutput {
        match command {
            ClientCommand::Ascend(input) => self.peer.ascend(input),
            ClientCommand::Hurt => self.peer.hurt(),
            ClientCommand::Jump => self.peer.jumped(self.id),
            ClientCommand::Respawn => {
                self.peer.respawn();
                ClientOutput::default()
            }
            ClientCommand::Stop => ClientOutput::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::node::session_ext::SessionExt;

    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_client_node_creation() {
        let session = zenoh::open(zenoh::Config::default()).await.unwrap();
        let node = session
            .declare_link_client(ParticipantId::new(4))
            .prefix("gravity/test/client_creation")
            .await
            .unwrap();
        assert_eq!(node.id(), ParticipantId::new(4));
        assert!(!node.has_entered());
        assert!(!node.peer().is_entangled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_client_node_stop() {
        let session = zenoh::open(zenoh::Config::default()).await.unwrap();
        let mut node = session
            .declare_link_client(ParticipantId::new(5))
            .prefix("gravity/test/client_stop")
            .step_timeout_ms(50)
            .await
            .unwrap();

        node.sender().send(ClientCommand::Stop).unwrap();
        assert_eq!(node.step().await.unwrap(), StepResult::Stop);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_client_enters_world_and_pairs_over_zenoh() {
        let session = zenoh::open(zenoh::Config::default()).await.unwrap();
        let prefix = "gravity/test/pairing";
        let mut server = session
            .declare_link_server()
            .prefix(prefix)
            .step_timeout_ms(50)
            .await
            .unwrap();
        let mut first = session
            .declare_link_client(ParticipantId::new(1))
            .prefix(prefix)
            .step_timeout_ms(50)
            .await
            .unwrap();
        let mut second = session
            .declare_link_client(ParticipantId::new(2))
            .prefix(prefix)
            .step_timeout_ms(50)
            .await
            .unwrap();

        for _ in 0..40 {
            server.step().await.unwrap();
            first.step().await.unwrap();
            second.step().await.unwrap();
            if first.peer().is_entangled() && second.peer().is_entangled() {
                break;
            }
        }

        assert!(first.has_entered());
        assert_eq!(first.peer().partner(), Some(ParticipantId::new(2)));
        assert_eq!(second.peer().partner(), Some(ParticipantId::new(1)));
        assert_ne!(first.peer().is_flipped(), second.peer().is_flipped());
        assert!(server.stats().input_frames > 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_server_restart_pairs_again() {
        let session = zenoh::open(zenoh::Config::default()).await.unwrap();
        let prefix = "gravity/test/restart";
        let mut first = session
            .declare_link_client(ParticipantId::new(1))
            .prefix(prefix)
            .step_timeout_ms(50)
            .await
            .unwrap();
        let mut second = session
            .declare_link_client(ParticipantId::new(2))
            .prefix(prefix)
            .step_timeout_ms(50)
            .await
            .unwrap();

        let mut server = session
            .declare_link_server()
            .prefix(prefix)
            .step_timeout_ms(50)
            .await
            .unwrap();
        for _ in 0..40 {
            server.step().await.unwrap();
            first.step().await.unwrap();
            second.step().await.unwrap();
            if first.peer().is_entangled() && second.peer().is_entangled() {
                break;
            }
        }
        assert!(first.peer().is_entangled());

        drop(server);
        for _ in 0..40 {
            first.step().await.unwrap();
            second.step().await.unwrap();
            if !first.has_entered() && !second.has_entered() {
                break;
            }
        }
        assert!(!first.has_entered());
        assert!(!first.peer().is_entangled());
        assert!(!second.peer().is_entangled());

        let mut server = session
            .declare_link_server()
            .prefix(prefix)
            .step_timeout_ms(50)
            .await
            .unwrap();
        for _ in 0..40 {
            server.step().await.unwrap();
            first.step().await.unwrap();
            second.step().await.unwrap();
            if server.authority().registry().partner_of(ParticipantId::new(1)).is_some()
                && first.peer().is_entangled()
                && second.peer().is_entangled()
            {
                break;
            }
        }
        assert_eq!(
            server.authority().registry().partner_of(ParticipantId::new(1)),
            Some(ParticipantId::new(2))
        );
        assert_eq!(first.peer().partner(), Some(ParticipantId::new(2)));
        assert_eq!(second.peer().partner(), Some(ParticipantId::new(1)));
    }
}
