//! CLI commands implementation

pub mod ask;
pub mod config;
pub mod init;

pub use ask::*;
pub use config::*;
pub use init::*;
