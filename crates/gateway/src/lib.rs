//! Backend gateway for keepmd.
//!
//! The store talks to its backend only through two traits:
//! [`NotesBackend`] for rows and change streams, [`AuthBackend`] for
//! accounts and sessions. Two implementations are provided:
//!
//! - [`HostedClient`]: the hosted backend-as-a-service over HTTP and
//!   WebSocket.
//! - [`MemoryBackend`]: an in-process backend for offline use and tests.

pub mod auth;
pub mod backend;
pub mod error;
pub mod hosted;
pub mod memory;

pub use auth::{AuthBackend, AuthUser, OtpKind, Session, SignUpOutcome};
pub use backend::NotesBackend;
pub use error::{GatewayError, GatewayResult};
pub use hosted::HostedClient;
pub use memory::{MemoryBackend, Operation};
