//! Storage infrastructure: configuration file loading.
//!
//! The gateway keeps no persistent state of its own; the device directory is
//! rebuilt from live connections after every restart.  The only thing read
//! from disk is the TOML configuration handled by [`config`].

pub mod config;
