//! In-memory session wiring one authority to any number of clients
//!
//! Frames travel as encoded bytes through a single FIFO queue, which keeps
//! every sender-to-receiver channel ordered the way the network transport
//! does. Time only moves when `advance` is called, so grace delays can be
//! driven deterministically.

use std::collections::{BTreeMap, VecDeque};

use rand::rngs::StdRng;
use rand::Rng;
use tokio::time::{Duration, Instant};

use crate::client::{ClientOutput, ClientPeer};
use crate::config::LinkConfig;
use crate::notice::Notice;
use crate::orientation::AscendInput;
use crate::server::Authority;
use crate::types::ParticipantId;

/// A frame in flight
#[derive(Debug, Clone, PartialEq, Eq)]
enum Frame {
    /// Client to server
    Up { sender: ParticipantId, bytes: Vec<u8> },
    /// Server to client
    Down { receiver: ParticipantId, bytes: Vec<u8> },
}

/// Server plus clients connected through an in-memory queue
#[derive(Debug)]
pub struct LoopbackSession<R = StdRng> {
    authority: Authority<R>,
    clients: BTreeMap<ParticipantId, ClientPeer>,
    config: LinkConfig,
    queue: VecDeque<Frame>,
    notices: Vec<(ParticipantId, Notice)>,
    now: Instant,
}

impl LoopbackSession<StdRng> {
    /// Create a session whose authority is seeded from the operating system
    pub fn new(config: LinkConfig) -> Self {
        Self::with_authority(config, Authority::new())
    }
}

impl<R: Rng> LoopbackSession<R> {
    /// Create a session whose authority draws pairing coin flips from `rng`
    pub fn with_rng(config: LinkConfig, rng: R) -> Self {
        Self::with_authority(config, Authority::with_rng(rng))
    }

    fn with_authority(config: LinkConfig, authority: Authority<R>) -> Self {
        Self {
            authority,
            clients: BTreeMap::new(),
            config,
            queue: VecDeque::new(),
            notices: Vec::new(),
            now: Instant::now(),
        }
    }

    /// Server side of the session
    pub fn authority(&self) -> &Authority<R> {
        &self.authority
    }

    /// Client of `participant`, if connected
    pub fn client(&self, participant: ParticipantId) -> Option<&ClientPeer> {
        self.clients.get(&participant)
    }

    /// Connected participants in id order
    pub fn participants(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.clients.keys().copied()
    }

    /// Notices raised so far, tagged with the client that raised them
    pub fn notices(&self) -> &[(ParticipantId, Notice)] {
        &self.notices
    }

    /// Current session time
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Number of frames waiting for delivery
    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }

    /// Connect `participant`
    ///
    /// Every existing client observes the join and the new client learns about
    /// everyone already connected. Nothing is sent until it enters the world.
    pub fn join(&mut self, participant: ParticipantId) {
        self.authority.participant_joined(participant);
        for client in self.clients.values_mut() {
            client.participant_joined(participant);
        }
        let mut client = ClientPeer::new(participant, self.config.clone());
        for existing in self.clients.keys() {
            client.participant_joined(*existing);
        }
        self.clients.insert(participant, client);
    }

    /// Disconnect `participant`
    pub fn leave(&mut self, participant: ParticipantId) {
        if self.clients.remove(&participant).is_none() {
            return;
        }
        self.authority.participant_left(participant);
        self.queue.retain(|frame| match frame {
            Frame::Up { sender, .. } => *sender != participant,
            Frame::Down { receiver, .. } => *receiver != participant,
        });
        let ids: Vec<ParticipantId> = self.clients.keys().copied().collect();
        for id in ids {
            if let Some(client) = self.clients.get_mut(&id) {
                let output = client.participant_left(participant);
                self.enqueue(id, output);
            }
        }
    }

    /// Replace the server with a fresh one drawing coin flips from `rng`
    ///
    /// Frames in flight are lost. Every client sees the server go away and
    /// come back, then enters the world again.
    pub fn restart_authority(&mut self, rng: R) {
        self.queue.clear();
        self.authority = Authority::with_rng(rng);
        let ids: Vec<ParticipantId> = self.clients.keys().copied().collect();
        for id in &ids {
            self.authority.participant_joined(*id);
        }
        for id in &ids {
            self.with_client(*id, |client| client.authority_lost());
        }
        for id in ids {
            self.enter_world(id);
        }
    }

    /// `participant` enters the world, requesting a resync and a partner
    pub fn enter_world(&mut self, participant: ParticipantId) {
        if let Some(client) = self.clients.get_mut(&participant) {
            let output = client.enter_world();
            self.enqueue(participant, output);
        }
    }

    /// Sample the ascend trigger of `participant` for one tick
    pub fn ascend(&mut self, participant: ParticipantId, pressed: bool) {
        let input = AscendInput {
            pressed,
            climbing: false,
        };
        self.with_client(participant, |client| client.ascend(input));
    }

    /// `participant` took damage
    pub fn hurt(&mut self, participant: ParticipantId) {
        self.with_client(participant, |client| client.hurt());
    }

    /// `participant` jumped
    pub fn jumped(&mut self, participant: ParticipantId) {
        self.with_client(participant, |client| client.jumped(participant));
    }

    /// Toggle `participant` directly, bypassing trigger gating
    pub fn toggle(&mut self, participant: ParticipantId) {
        self.with_client(participant, |client| client.toggle());
    }

    /// `participant` respawned
    pub fn respawn(&mut self, participant: ParticipantId) {
        if let Some(client) = self.clients.get_mut(&participant) {
            client.respawn();
        }
    }

    /// Queue a raw frame from `sender` to the server
    pub fn inject_up(&mut self, sender: ParticipantId, bytes: Vec<u8>) {
        self.queue.push_back(Frame::Up { sender, bytes });
    }

    /// Queue a raw frame from the server to `receiver`
    pub fn inject_down(&mut self, receiver: ParticipantId, bytes: Vec<u8>) {
        self.queue.push_back(Frame::Down { receiver, bytes });
    }

    /// Move time forward and run every grace apply that became due
    pub fn advance(&mut self, by: Duration) {
        self.now += by;
        let now = self.now;
        let ids: Vec<ParticipantId> = self.clients.keys().copied().collect();
        for id in ids {
            if let Some(client) = self.clients.get_mut(&id) {
                let output = client.poll_grace(now);
                self.enqueue(id, output);
            }
        }
    }

    /// Deliver frames until the queue is empty, returning how many were delivered
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(frame) = self.queue.pop_front() {
            delivered += 1;
            match frame {
                Frame::Up { sender, bytes } => {
                    if !self.clients.contains_key(&sender) {
                        continue;
                    }
                    for outbound in self.authority.handle_packet(sender, &bytes) {
                        let bytes = outbound.message.encode();
                        for receiver in self.clients.keys() {
                            if outbound.route.includes(*receiver) {
                                self.queue.push_back(Frame::Down {
                                    receiver: *receiver,
                                    bytes: bytes.clone(),
                                });
                            }
                        }
                    }
                }
                Frame::Down { receiver, bytes } => {
                    let now = self.now;
                    if let Some(client) = self.clients.get_mut(&receiver) {
                        let output = client.handle_packet(&bytes, now);
                        self.enqueue(receiver, output);
                    }
                }
            }
        }
        delivered
    }

    /// Advance past the grace delay and deliver everything that follows
    pub fn settle(&mut self) {
        self.pump();
        self.advance(self.config.grace_delay());
        self.pump();
    }

    fn with_client(&mut self, participant: ParticipantId, f: impl FnOnce(&mut ClientPeer) -> ClientOutput) {
        if let Some(client) = self.clients.get_mut(&participant) {
            let output = f(client);
            self.enqueue(participant, output);
        }
    }

    fn enqueue(&mut self, sender: ParticipantId, output: ClientOutput) {
        for message in output.outbound {
            self.queue.push_back(Frame::Up {
                sender,
                bytes: message.encode(),
            });
        }
        self.notices
            .extend(output.notices.into_iter().map(|notice| (sender, notice)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ClientMessage, ServerMessage};
    use crate::types::GravityEffect;
    use rand::SeedableRng;

    fn id(raw: u8) -> ParticipantId {
        ParticipantId::new(raw)
    }

    fn session(seed: u64, ids: &[u8]) -> LoopbackSession {
        let mut session = LoopbackSession::with_rng(LinkConfig::default(), StdRng::seed_from_u64(seed));
        for raw in ids {
            session.join(id(*raw));
        }
        session
    }

    fn server_flipped(session: &LoopbackSession, raw: u8) -> bool {
        session.authority().registry().get(id(raw)).unwrap().flipped
    }

    fn mirror_flipped(session: &LoopbackSession, viewer: u8, raw: u8) -> bool {
        session
            .client(id(viewer))
            .unwrap()
            .registry()
            .get(id(raw))
            .unwrap()
            .flipped
    }

    /// Pair 1 and 2 and wait out the grace delay
    fn paired(seed: u64, ids: &[u8]) -> LoopbackSession {
        let mut session = session(seed, ids);
        session.enter_world(id(1));
        session.enter_world(id(2));
        session.settle();
        session
    }

    #[test]
    fn test_pairing_assigns_exactly_one_flip() {
        let mut session = session(7, &[1, 2]);
        session.enter_world(id(1));
        session.pump();

        let registry = session.authority().registry();
        assert_eq!(registry.partner_of(id(1)), Some(id(2)));
        assert_eq!(registry.partner_of(id(2)), Some(id(1)));
        assert_ne!(server_flipped(&session, 1), server_flipped(&session, 2));

        for viewer in [1, 2] {
            let client = session.client(id(viewer)).unwrap();
            assert!(client.is_entangled());
        }
        assert!(session
            .notices()
            .contains(&(id(1), Notice::Entangled { partner: id(2) })));
        assert!(session
            .notices()
            .contains(&(id(2), Notice::Entangled { partner: id(1) })));
    }

    #[test]
    fn test_grace_enacts_assigned_orientation_without_toggle() {
        let mut session = session(11, &[1, 2]);
        session.enter_world(id(1));
        session.pump();
        let assigned_1 = server_flipped(&session, 1);
        let flipped_member = if assigned_1 { 1 } else { 2 };

        // Not enacted before the grace delay
        let client = session.client(id(flipped_member)).unwrap();
        assert_eq!(client.gravity(id(flipped_member)), Some(GravityEffect::BASELINE));

        session.advance(Duration::from_millis(5000));
        session.pump();

        assert_eq!(server_flipped(&session, 1), assigned_1);
        assert_eq!(server_flipped(&session, 2), !assigned_1);
        for viewer in [1, 2] {
            let client = session.client(id(viewer)).unwrap();
            assert_eq!(client.gravity(id(flipped_member)), Some(GravityEffect::FLIPPED));
            assert_eq!(client.gravity(id(3 - flipped_member)), Some(GravityEffect::BASELINE));
        }
        assert!(!session.authority().is_pending_enactment(id(flipped_member)));
    }

    #[test]
    fn test_pairs_stay_antisymmetric_under_interleaved_toggles() {
        let mut session = paired(3, &[1, 2, 3, 4]);
        session.enter_world(id(3));
        session.enter_world(id(4));
        session.settle();

        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..200 {
            let who = id(rng.random_range(1..=4));
            session.toggle(who);
            if rng.random_bool(0.3) {
                session.pump();
            }
        }
        session.pump();

        for (a, b) in [(1, 2), (3, 4)] {
            assert_ne!(server_flipped(&session, a), server_flipped(&session, b));
            for viewer in [a, b] {
                assert_eq!(mirror_flipped(&session, viewer, a), server_flipped(&session, a));
                assert_eq!(mirror_flipped(&session, viewer, b), server_flipped(&session, b));
            }
        }
    }

    #[test]
    fn test_partner_references_are_exclusive() {
        let mut session = paired(5, &[1, 2, 3, 4, 5]);
        for raw in [3, 4, 5] {
            session.enter_world(id(raw));
        }
        session.settle();

        let registry = session.authority().registry();
        let mut seen = std::collections::HashSet::new();
        for participant in registry.active_ids() {
            if let Some(partner) = registry.partner_of(participant) {
                assert_eq!(registry.partner_of(partner), Some(participant));
                assert!(seen.insert(partner), "'{}' is partner of two participants", partner);
            }
        }
        // Odd participant out stays unpaired
        assert_eq!(registry.partner_of(id(5)), None);
    }

    #[test]
    fn test_toggle_resolved_by_server_reaches_everyone() {
        let mut session = paired(17, &[1, 2, 3]);
        if server_flipped(&session, 1) {
            session.toggle(id(1));
            session.pump();
        }
        assert!(!server_flipped(&session, 1));
        assert!(server_flipped(&session, 2));

        session.toggle(id(1));
        session.pump();

        assert!(server_flipped(&session, 1));
        assert!(!server_flipped(&session, 2));
        for viewer in [1, 2, 3] {
            assert!(mirror_flipped(&session, viewer, 1));
            assert!(!mirror_flipped(&session, viewer, 2));
            let client = session.client(id(viewer)).unwrap();
            assert_eq!(client.gravity(id(1)), Some(GravityEffect::FLIPPED));
            assert_eq!(client.gravity(id(2)), Some(GravityEffect::BASELINE));
        }
    }

    #[test]
    fn test_partner_disconnect_resets_survivor() {
        let mut session = paired(23, &[1, 2, 3]);
        session.leave(id(2));
        session.pump();

        let server = session.authority().registry();
        assert_eq!(server.partner_of(id(1)), None);
        assert_eq!(server.gravity(id(1)), Some(GravityEffect::BASELINE));

        let survivor = session.client(id(1)).unwrap();
        assert_eq!(survivor.partner(), None);
        let effect = survivor.gravity(id(1)).unwrap();
        assert_eq!(effect.forced_gravity, 0);
        assert!(session.notices().contains(&(id(1), Notice::Decoherence)));

        // Bystander mirror dropped the relationship too
        let bystander = session.client(id(3)).unwrap();
        assert_eq!(bystander.registry().get(id(1)).unwrap().partner, None);
    }

    #[test]
    fn test_late_joiner_converges_on_server_orientations() {
        let mut session = paired(31, &[1, 2]);
        session.toggle(id(2));
        session.pump();

        session.join(id(3));
        session.enter_world(id(3));
        session.pump();

        for raw in [1, 2] {
            assert_eq!(mirror_flipped(&session, 3, raw), server_flipped(&session, raw));
        }
        // Nobody left to pair with
        assert!(!session.client(id(3)).unwrap().is_entangled());
    }

    #[test]
    fn test_truncated_flux_is_discarded() {
        let mut session = paired(41, &[1, 2]);
        let before_1 = server_flipped(&session, 1);

        session.inject_up(id(1), vec![1]);
        session.inject_down(id(2), vec![1, 1, 2]);
        assert_eq!(session.pump(), 2);

        assert_eq!(server_flipped(&session, 1), before_1);
        assert_eq!(mirror_flipped(&session, 2, 1), before_1);
        assert_eq!(session.authority().registry().partner_of(id(1)), Some(id(2)));
    }

    #[test]
    fn test_explicit_decoherence_clears_mirrors() {
        let mut session = paired(43, &[1, 2, 3]);
        session.inject_up(id(1), ClientMessage::Decoherence.encode());
        session.pump();

        assert_eq!(session.authority().registry().partner_of(id(2)), None);
        assert!(session.client(id(2)).unwrap().partner().is_none());
        assert!(session.notices().contains(&(id(2), Notice::Decoherence)));
        assert_eq!(session.client(id(3)).unwrap().registry().get(id(1)).unwrap().partner, None);
    }

    #[test]
    fn test_stale_broadcast_does_not_revive_pair() {
        let mut session = paired(47, &[1, 2]);
        session.leave(id(2));
        session.pump();
        session.join(id(2));

        let stale = ServerMessage::Flux {
            player: id(2),
            partner: id(1),
            flipped: true,
        };
        session.inject_down(id(1), stale.encode());
        session.pump();
        assert_eq!(session.client(id(1)).unwrap().partner(), None);
    }

    #[test]
    fn test_rejoin_pairs_again() {
        let mut session = paired(53, &[1, 2]);
        session.leave(id(2));
        session.pump();

        session.join(id(2));
        session.enter_world(id(2));
        session.settle();
        assert_eq!(session.authority().registry().partner_of(id(1)), Some(id(2)));
        assert_eq!(session.client(id(1)).unwrap().partner(), Some(id(2)));
    }

    #[test]
    fn test_pairing_between_leave_and_decoherence_holds() {
        let mut session = paired(59, &[1, 2, 3]);
        // The newcomer's request is queued ahead of the survivor's announcement
        session.enter_world(id(3));
        session.leave(id(2));
        session.settle();

        let registry = session.authority().registry();
        assert_eq!(registry.partner_of(id(1)), Some(id(3)));
        assert_eq!(registry.partner_of(id(3)), Some(id(1)));
        for raw in [1, 3] {
            let client = session.client(id(raw)).unwrap();
            assert_eq!(client.partner(), registry.partner_of(id(raw)));
            for member in [1, 3] {
                assert_eq!(mirror_flipped(&session, raw, member), server_flipped(&session, member));
            }
        }
        assert_ne!(server_flipped(&session, 1), server_flipped(&session, 3));

        // The new pair is live on both ends
        session.toggle(id(3));
        session.pump();
        assert_eq!(mirror_flipped(&session, 1, 3), server_flipped(&session, 3));
        assert_eq!(mirror_flipped(&session, 1, 1), server_flipped(&session, 1));
    }

    #[test]
    fn test_server_restart_pairs_again() {
        let mut session = paired(67, &[1, 2]);
        session.restart_authority(StdRng::seed_from_u64(68));
        session.settle();

        let registry = session.authority().registry();
        assert_eq!(registry.partner_of(id(1)), Some(id(2)));
        assert_eq!(session.client(id(1)).unwrap().partner(), Some(id(2)));
        assert_eq!(session.client(id(2)).unwrap().partner(), Some(id(1)));
        assert!(session.notices().contains(&(id(1), Notice::Decoherence)));

        // Toggles reach the restarted server
        let before = server_flipped(&session, 1);
        session.toggle(id(1));
        session.pump();
        assert_eq!(server_flipped(&session, 1), !before);
        assert_eq!(mirror_flipped(&session, 2, 1), !before);
    }
}
