//! Publisher for link frames

use std::marker::PhantomData;

use crate::error::Result;
use crate::network::keyexpr::{Direction, LinkKeyexpr};
use crate::protocol::WireMessage;
use crate::stats::StatsTracker;
use crate::types::ParticipantId;

/// Publishes encoded messages on one link keyexpr
///
/// Declares a publisher on `<prefix>/<direction>/<participant_id>`.
pub struct LinkPublisher<M> {
    publisher: zenoh::pubsub::Publisher<'static>,
    stats_tracker: StatsTracker,
    _phantom: PhantomData<M>,
}

impl<M> std::fmt::Debug for LinkPublisher<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkPublisher")
            .field("type", &std::any::type_name::<M>())
            .field("key_expr", &self.publisher.key_expr())
            .finish()
    }
}

impl<M: WireMessage> LinkPublisher<M> {
    pub async fn new(
        session: &zenoh::Session,
        prefix: &str,
        direction: Direction,
        participant: ParticipantId,
        stats_tracker: StatsTracker,
    ) -> Result<Self> {
        let keyexpr = LinkKeyexpr::new(prefix, direction, Some(participant)).to_keyexpr()?;
        let publisher = session.declare_publisher(keyexpr).await?;

        Ok(Self {
            publisher,
            stats_tracker,
            _phantom: PhantomData,
        })
    }

    /// Encode and publish one message
    pub async fn put(&self, message: &M) -> Result<()> {
        let frame = message.encode();
        let len = frame.len();
        self.publisher.put(frame).await?;
        self.stats_tracker.record_output(len);
        Ok(())
    }
}
