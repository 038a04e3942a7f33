//! Presence tracking over liveliness tokens

use std::time::Duration;

use zenoh::liveliness::LivelinessToken;
use zenoh::sample::SampleKind;

use crate::error::{LinkError, Result};
use crate::network::keyexpr::{AuthorityKeyexpr, PresenceKeyexpr};
use crate::types::ParticipantId;

/// Liveliness token announcing a participant
///
/// The token is automatically undeclared when dropped.
#[derive(Debug)]
pub struct PresenceToken {
    #[allow(dead_code)]
    token: LivelinessToken,
    participant: ParticipantId,
}

impl PresenceToken {
    /// Declare the presence of `participant`
    pub async fn declare(session: &zenoh::Session, prefix: &str, participant: ParticipantId) -> Result<Self> {
        let keyexpr = PresenceKeyexpr::new(prefix, Some(participant)).to_keyexpr()?;
        let token = session.liveliness().declare_token(keyexpr).await?;
        Ok(Self { token, participant })
    }

    pub fn participant(&self) -> ParticipantId {
        self.participant
    }
}

/// A participant appeared or disappeared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEvent {
    Joined(ParticipantId),
    Left(ParticipantId),
}

/// Watches every presence token under a prefix
///
/// Tokens alive when the watch is declared are reported as joins first.
pub struct PresenceWatch {
    subscriber: zenoh::pubsub::Subscriber<zenoh::handlers::FifoChannelHandler<zenoh::sample::Sample>>,
}

impl std::fmt::Debug for PresenceWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceWatch")
            .field("key_expr", &self.subscriber.key_expr())
            .finish()
    }
}

impl PresenceWatch {
    pub async fn declare(session: &zenoh::Session, prefix: &str) -> Result<Self> {
        let keyexpr = PresenceKeyexpr::new(prefix, None).to_keyexpr()?;
        let subscriber = session
            .liveliness()
            .declare_subscriber(keyexpr)
            .history(true)
            .await?;
        Ok(Self { subscriber })
    }

    /// Wait for the next presence change
    pub async fn next(&self) -> Result<PresenceEvent> {
        let sample = self
            .subscriber
            .recv_async()
            .await
            .map_err(|e| LinkError::Internal(format!("Failed to receive presence sample: {}", e)))?;

        let participant = PresenceKeyexpr::try_from(sample.key_expr())?
            .participant()
            .ok_or_else(|| LinkError::InvalidKeyexpr(format!("Wildcard presence keyexpr '{}'", sample.key_expr())))?;

        Ok(match sample.kind() {
            SampleKind::Put => PresenceEvent::Joined(participant),
            SampleKind::Delete => PresenceEvent::Left(participant),
        })
    }
}

/// How long a presence query waits for replies
const PRESENCE_QUERY_TIMEOUT: Duration = Duration::from_millis(500);

/// Ask the network whether `participant` currently holds its presence token
pub async fn is_present(session: &zenoh::Session, prefix: &str, participant: ParticipantId) -> Result<bool> {
    let keyexpr = PresenceKeyexpr::new(prefix, Some(participant)).to_keyexpr()?;
    let replies = session
        .liveliness()
        .get(keyexpr)
        .timeout(PRESENCE_QUERY_TIMEOUT)
        .await?;

    while let Ok(reply) = replies.recv_async().await {
        match reply.result() {
            Ok(_) => return Ok(true),
            Err(e) => tracing::debug!("Presence reply error: {:?}", e),
        }
    }
    Ok(false)
}

/// Liveliness token announcing the server
#[derive(Debug)]
pub struct AuthorityToken {
    #[allow(dead_code)]
    token: LivelinessToken,
}

impl AuthorityToken {
    pub async fn declare(session: &zenoh::Session, prefix: &str) -> Result<Self> {
        let keyexpr = AuthorityKeyexpr::new(prefix).to_keyexpr()?;
        let token = session.liveliness().declare_token(keyexpr).await?;
        Ok(Self { token })
    }
}

/// Watches the server token, reporting whether the server is alive
pub struct AuthorityWatch {
    subscriber: zenoh::pubsub::Subscriber<zenoh::handlers::FifoChannelHandler<zenoh::sample::Sample>>,
}

impl std::fmt::Debug for AuthorityWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorityWatch")
            .field("key_expr", &self.subscriber.key_expr())
            .finish()
    }
}

impl AuthorityWatch {
    pub async fn declare(session: &zenoh::Session, prefix: &str) -> Result<Self> {
        let keyexpr = AuthorityKeyexpr::new(prefix).to_keyexpr()?;
        let subscriber = session
            .liveliness()
            .declare_subscriber(keyexpr)
            .history(true)
            .await?;
        Ok(Self { subscriber })
    }

    /// Wait for the server to appear (`true`) or disappear (`false`)
    pub async fn next(&self) -> Result<bool> {
        let sample = self
            .subscriber
            .recv_async()
            .await
            .map_err(|e| LinkError::Internal(format!("Failed to receive authority sample: {}", e)))?;
        Ok(sample.kind() == SampleKind::Put)
    }
}
