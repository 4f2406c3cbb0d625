//! Client library for the Bento privacy gateway.
//!
//! [`ChatSession`] drives the interception handshake, [`PolicyStore`]
//! mirrors the account's policy profiles and [`SharedMonitor`] holds the
//! health, terminal feed and safety score shown next to the chat.

pub mod api;
pub mod chat;
pub mod error;
pub mod policy;
pub mod system;

#[cfg(test)]
mod testing;

pub use api::{HttpShieldApi, ShieldApi};
pub use chat::{ChatSession, ChatStatus, Interception, Message};
pub use error::ClientError;
pub use policy::{PolicyProfile, PolicyStore};
pub use system::{HealthData, HealthStatus, SharedMonitor, SystemMonitor, TerminalLog};
