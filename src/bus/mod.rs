/// Topic-addressed publish/subscribe exchange
pub mod broker;

/// Bus attachments: the capability interface and its variants
pub mod connection;

pub use broker::{Bus, CHANNEL_CAPACITY};
pub use connection::{Connection, InMemoryLink, Link};
