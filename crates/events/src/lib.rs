//! Realtime change events for keepmd.
//!
//! - [`change`]: row-level change events, filters and bindings.
//! - [`bus`]: in-process fan-out used by the memory backend.
//! - [`subscription`]: consumer/producer halves of a change stream.
//! - [`realtime`]: WebSocket client for the hosted realtime service.

pub mod bus;
pub mod change;
pub mod realtime;
pub mod subscription;

pub use bus::ChangeBus;
pub use change::{ChangeBinding, ChangeEvent, ChangeFilter, ChangeKind, RowChange, Table};
pub use subscription::{subscription_channel, Subscription, SubscriptionFeed};
