use zenoh::Resolvable;

use crate::config::LinkConfig;
use crate::error::Result;
use crate::types::ParticipantId;

use super::{ClientNode, ServerNode};

/// Extension trait for zenoh::Session to declare gravity-link nodes
pub trait SessionExt {
    /// Declare the authoritative server
    ///
    /// # Example
    /// ```no_run
    /// use gravity_link::SessionExt;
    ///
    /// # async fn example() {
    /// let session = zenoh::open(zenoh::Config::default()).await.unwrap();
    /// let server = session
    ///     .declare_link_server()
    ///     .prefix("gravity/link")
    ///     .await
    ///     .unwrap();
    /// # }
    /// ```
    fn declare_link_server(&self) -> ServerNodeBuilder<'_>;

    /// Declare a client for the locally controlled participant `id`
    fn declare_link_client(&self, id: ParticipantId) -> ClientNodeBuilder<'_>;
}

impl SessionExt for zenoh::Session {
    fn declare_link_server(&self) -> ServerNodeBuilder<'_> {
        ServerNodeBuilder {
            session: self,
            config: LinkConfig::default(),
        }
    }

    fn declare_link_client(&self, id: ParticipantId) -> ClientNodeBuilder<'_> {
        ClientNodeBuilder {
            session: self,
            id,
            config: LinkConfig::default(),
        }
    }
}

/// Builder for the server node
#[must_use = "Resolvables do nothing unless you resolve them using `.await` or `zenoh::Wait::wait`"]
pub struct ServerNodeBuilder<'a> {
    session: &'a zenoh::Session,
    config: LinkConfig,
}

impl ServerNodeBuilder<'_> {
    /// Replace the whole configuration
    pub fn config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the key expression prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.keyexpr_prefix = prefix.into();
        self
    }

    /// Set the step timeout in milliseconds
    pub fn step_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.step_timeout_ms = timeout_ms;
        self
    }
}

impl Resolvable for ServerNodeBuilder<'_> {
    type To = Result<ServerNode>;
}

impl<'a> std::future::IntoFuture for ServerNodeBuilder<'a> {
    type Output = <Self as Resolvable>::To;
    type IntoFuture = std::pin::Pin<Box<dyn std::future::Future<Output = Self::Output> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            // The node owns its session handle
            let session = self.session.clone();
            ServerNode::new_internal(self.config, session).await
        })
    }
}

/// Builder for a client node
#[must_use = "Resolvables do nothing unless you resolve them using `.await` or `zenoh::Wait::wait`"]
pub struct ClientNodeBuilder<'a> {
    session: &'a zenoh::Session,
    id: ParticipantId,
    config: LinkConfig,
}

impl ClientNodeBuilder<'_> {
    /// Replace the whole configuration
    pub fn config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the key expression prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.keyexpr_prefix = prefix.into();
        self
    }

    /// Set the step timeout in milliseconds
    pub fn step_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.step_timeout_ms = timeout_ms;
        self
    }

    /// Enable the damage-triggered toggle
    pub fn pain_flip(mut self, enabled: bool) -> Self {
        self.config.pain_flip = enabled;
        self
    }

    /// Enable the jump-triggered toggle
    pub fn gravity_jump(mut self, enabled: bool) -> Self {
        self.config.gravity_jump = enabled;
        self
    }
}

impl Resolvable for ClientNodeBuilder<'_> {
    type To = Result<ClientNode>;
}

impl<'a> std::future::IntoFuture for ClientNodeBuilder<'a> {
    type Output = <Self as Resolvable>::To;
    type IntoFuture = std::pin::Pin<Box<dyn std::future::Future<Output = Self::Output> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            let session = self.session.clone();
            ClientNode::new_internal(self.id, self.config, session).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_builder_applies_settings() {
        let session = zenoh::open(zenoh::Config::default()).await.unwrap();
        let builder = session
            .declare_link_client(ParticipantId::new(9))
            .prefix("gravity/test/builder")
            .step_timeout_ms(10)
            .pain_flip(true);
        assert_eq!(builder.config.keyexpr_prefix, "gravity/test/builder");
        assert_eq!(builder.config.step_timeout_ms, 10);
        assert!(builder.config.pain_flip);
        assert!(!builder.config.gravity_jump);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_invalid_prefix_is_rejected() {
        let session = zenoh::open(zenoh::Config::default()).await.unwrap();
        let result = session.declare_link_server().prefix("bad//prefix").await;
        assert!(result.is_err());
    }
}
