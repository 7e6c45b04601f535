//! statuslink connects a local development chain to the Status mobile app.
//!
//! The Status app exposes a development API on the phone. statuslink makes
//! sure the app knows this machine's chain as a network, switches the app to
//! it, and opens the dApp in the Status browser. Remote network ids are
//! cached on disk by network fingerprint so restarts never add duplicates.

pub mod app;
pub mod bootstrap;
pub mod chain;
pub mod cli;
pub mod config;
pub mod error;
pub mod network;
pub mod reconcile;
pub mod remote;
pub mod settings;

pub use config::Config;
pub use error::{Error, FailureKind};
