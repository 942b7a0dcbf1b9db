//! Command handlers for the Marquee CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod build;
pub mod search;
pub mod serve;
pub mod stats;

// Re-export command types for convenience
pub use build::BuildCommand;
pub use search::SearchCommand;
pub use serve::ServeCommand;
pub use stats::StatsCommand;
