//! autosync CLI internals
//!
//! Exposed as a library so the scenario runner and config layer can be
//! tested without spawning the binary.

pub mod scenario;
pub mod system_config;
