pub mod connection;
pub mod hub;

pub use hub::{Hub, Publisher, SnapshotSource, Subscription};
