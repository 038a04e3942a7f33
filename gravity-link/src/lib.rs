//! # gravity-link
//!
//! Gravity entanglement for multiplayer sessions, synchronized over Zenoh.
//!
//! ## Overview
//!
//! Participants are paired into exclusive entangled pairs by an authoritative
//! server. Each pair carries a binary orientation: one member has normal
//! gravity, the other is flipped. Toggling one member flips both, and the
//! server decides the final pair state so every client converges on it.
//!
//! ## Key Features
//!
//! - Random, fair orientation assignment on pairing with a seedable source
//! - Client-side prediction reconciled to authoritative broadcasts
//! - Late-join resync of every participant's orientation
//! - Teardown on disconnect or explicit decoherence
//! - Cancellable grace delay before a flipped pairing takes effect
//! - Compact fixed-shape binary frames, one kind byte per message
//!
//! The protocol core (`server`, `client`) is transport agnostic. `node` binds it
//! to Zenoh pub/sub and liveliness, and `loopback` wires it up in memory.
//!
//! ## Example
//!
//! ```rust,no_run
//! use gravity_link::{ClientCommand, ParticipantId, SessionExt, StepResult};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let session = zenoh::open(zenoh::Config::default()).await?;
//!     let mut client = session.declare_link_client(ParticipantId::new(1)).await?;
//!     client.sender().send(ClientCommand::Hurt)?;
//!
//!     loop {
//!         match client.step().await? {
//!             StepResult::Notices(notices) => println!("{:?}", notices),
//!             StepResult::Timeout => println!("{:?}", client.gravity(client.id())),
//!             StepResult::Stop => return Ok(()),
//!         }
//!     }
//! }
//! ```

// Module declarations
pub mod client;
pub mod config;
pub mod error;
pub mod grace;
pub mod loopback;
pub mod network;
pub mod node;
pub mod notice;
pub mod orientation;
pub mod pairing;
pub mod peer;
pub mod protocol;
pub mod resync;
pub mod server;
pub mod stats;
pub mod teardown;
pub mod types;

// Re-exports for convenience
pub use client::{ClientOutput, ClientPeer};
pub use config::{LinkConfig, Theme};
pub use error::{LinkError, Result};
pub use loopback::LoopbackSession;
pub use node::{ClientCommand, ClientNode, ServerCommand, ServerNode, SessionExt, StepResult};
pub use notice::Notice;
pub use orientation::AscendInput;
pub use protocol::{ClientMessage, MessageKind, Outbound, Route, ServerMessage, WireMessage};
pub use server::Authority;
pub use stats::{LinkStats, StatsTracker};
pub use types::{GravityEffect, ParticipantId};
