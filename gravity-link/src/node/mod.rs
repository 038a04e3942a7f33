//! Networked server and client nodes

pub mod client_node;
pub mod server_node;
pub mod session_ext;

pub use client_node::{ClientCommand, ClientNode};
pub use server_node::{ServerCommand, ServerNode};
pub use session_ext::{ClientNodeBuilder, ServerNodeBuilder, SessionExt};

use crate::notice::Notice;

/// Result of a single node step
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// The step produced notices for the host to present
    Notices(Vec<Notice>),
    /// The step timeout elapsed
    Timeout,
    /// The node was stopped
    Stop,
}
