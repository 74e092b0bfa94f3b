pub mod backup;
pub mod cli;
pub mod config;
pub mod encode;
pub mod error;
pub mod model;
pub mod restore;
pub mod writer;

pub use backup::BackupEngine;
pub use config::Config;
pub use error::DumpError;
pub use model::{BackupArtifact, BackupMode, BackupRequest, EngineFamily};
pub use restore::RestoreEngine;
