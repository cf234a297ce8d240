//! # Configuration
//!
//! Server configuration (profiles, file and environment layering) and the
//! chat client's connection and pacing settings.

pub mod client;
pub mod server;
