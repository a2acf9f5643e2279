//! Client for the hosted realtime WebSocket service.

pub mod channel;
pub mod client;
pub mod messages;
pub mod reconnect;

pub use channel::{spawn_channel, ChannelConfig};
pub use client::{RealtimeClient, RealtimeError};
