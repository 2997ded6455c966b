//! Stasis: declarative local development environments.
//!
//! A `stasis.yaml` manifest names a project and its services. `stasis up`
//! turns it into a bridge network plus one labelled container per service;
//! `stasis down` removes them again while keeping volume data on the host.

pub mod binding;
pub mod cli;
pub mod config;
pub mod error;
pub mod manifest;
pub mod naming;
pub mod reconcile;
pub mod runtime;
pub mod testing;

pub use config::Config;
pub use error::{Result, StasisError};
