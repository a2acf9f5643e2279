//! Domain model and pure logic for the keepmd note-taking client.
//!
//! Nothing in this crate performs I/O. The store, gateway and binary
//! crates build on these types:
//!
//! - [`note`] / [`tag`]: rows and payloads exchanged with the backend.
//! - [`filter`]: the derived, filtered note grid shown to the user.
//! - [`activity`]: calendar activity counts.
//! - [`export`]: markdown export selection and file naming.
//! - [`preferences`]: locally persisted UI preferences.
//! - [`validation`]: input checks run before any request is issued.

pub mod activity;
pub mod error;
pub mod export;
pub mod filter;
pub mod note;
pub mod preferences;
pub mod tag;
pub mod types;
pub mod validation;
