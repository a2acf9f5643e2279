//! Terminal client for keepmd.
//!
//! - [`config`]: environment configuration.
//! - [`prefs`]: the local preference file.
//! - [`view`]: text rendering of the note grid.
//! - [`export`]: markdown export to a directory.

pub mod config;
pub mod export;
pub mod prefs;
pub mod view;
