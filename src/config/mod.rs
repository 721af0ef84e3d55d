//! Configuration module for HostFiles
//!
//! Provides configuration management including CLI arguments,
//! the JSON config file, and transfer limits.

mod settings;

pub use settings::*;
