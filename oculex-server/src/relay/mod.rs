//! Real-time relay between the doctor and patient roles.
//!
//! The hub keeps no history and no persistence: it tracks live connections,
//! their role-group membership, and fans events out to whole groups. An
//! event aimed at an empty group is dropped silently.

pub mod connection;
pub mod hub;
pub mod messages;

pub use connection::Connection;
pub use hub::RelayHub;
