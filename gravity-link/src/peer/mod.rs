// Module declarations
pub mod peer_state;
pub mod registry;

pub use peer_state::PeerState;
pub use registry::{Participant, PeerRegistry};
