//! Subscriber for link frames with decoding

use std::marker::PhantomData;

use crate::error::{LinkError, Result};
use crate::network::keyexpr::{Direction, LinkKeyexpr};
use crate::protocol::WireMessage;
use crate::stats::StatsTracker;
use crate::types::ParticipantId;

/// Subscribes to link frames and decodes them
///
/// With `participant` set the subscription covers a single channel, otherwise
/// it uses `<prefix>/<direction>/*` to hear every participant. `recv()`
/// returns the participant named in the sample keyexpr with the decoded
/// message.
pub struct LinkSubscriber<M> {
    subscriber: zenoh::pubsub::Subscriber<zenoh::handlers::FifoChannelHandler<zenoh::sample::Sample>>,
    stats_tracker: StatsTracker,
    _phantom: PhantomData<M>,
}

impl<M> std::fmt::Debug for LinkSubscriber<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkSubscriber")
            .field("type", &std::any::type_name::<M>())
            .field("key_expr", &self.subscriber.key_expr())
            .finish()
    }
}

impl<M: WireMessage> LinkSubscriber<M> {
    pub async fn new(
        session: &zenoh::Session,
        prefix: &str,
        direction: Direction,
        participant: Option<ParticipantId>,
        stats_tracker: StatsTracker,
    ) -> Result<Self> {
        let keyexpr = LinkKeyexpr::new(prefix, direction, participant).to_keyexpr()?;
        let subscriber = session.declare_subscriber(keyexpr).await?;

        Ok(Self {
            subscriber,
            stats_tracker,
            _phantom: PhantomData,
        })
    }

    /// Receive and decode the next frame
    ///
    /// Frames that fail to decode are counted as dropped and returned as errors;
    /// the subscription itself stays usable.
    pub async fn recv(&self) -> Result<(ParticipantId, M)> {
        let sample = self
            .subscriber
            .recv_async()
            .await
            .map_err(|e| LinkError::Internal(format!("Failed to receive sample: {}", e)))?;

        let frame = sample.payload().to_bytes();
        self.stats_tracker.record_input(frame.len());

        let participant = LinkKeyexpr::try_from(sample.key_expr())
            .and_then(|link| {
                link.participant().ok_or_else(|| {
                    LinkError::InvalidKeyexpr(format!(
                        "Received sample with wildcard participant in keyexpr '{}'",
                        sample.key_expr()
                    ))
                })
            })
            .inspect_err(|_| self.stats_tracker.record_dropped())?;

        let message = M::decode(&frame).inspect_err(|_| self.stats_tracker.record_dropped())?;
        Ok((participant, message))
    }
}
