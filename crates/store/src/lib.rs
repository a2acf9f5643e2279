//! The client data store for keepmd.
//!
//! - [`store`]: [`NotesStore`], the cache of one user's notes and tags
//!   with optimistic mutations.
//! - [`realtime`]: reconciliation of remote change events into the cache.
//! - [`session`]: [`AuthSession`], the signed-in user and account flows.
//! - [`notice`]: transient notices for the view layer.

pub mod notice;
mod pending;
pub mod realtime;
pub mod session;
pub mod state;
pub mod store;

pub use notice::{Notice, NoticeLevel, Notices};
pub use realtime::{bindings_for, CHANNEL_NAME};
pub use session::{AuthError, AuthResult, AuthSession};
pub use state::StoreState;
pub use store::NotesStore;
