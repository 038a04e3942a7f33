//! Network layer for gravity-link

pub mod keyexpr;
pub mod link_publisher;
pub mod link_subscriber;
pub mod presence;

pub use keyexpr::{AuthorityKeyexpr, Direction, LinkKeyexpr, PresenceKeyexpr};
pub use link_publisher::LinkPublisher;
pub use link_subscriber::LinkSubscriber;
pub use presence::{is_present, AuthorityToken, AuthorityWatch, PresenceEvent, PresenceToken, PresenceWatch};
