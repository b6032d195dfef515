//! Watchfolder core library: domain types, configuration, errors.
//!
//! Public API surface:
//! - [`types`]: file names, second-precision timestamps, state mapping, upload plan
//! - [`config`]: YAML configuration load / save / validate
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, LoggingConfig, ValidationError};
pub use error::ConfigError;
pub use types::{
    CycleContext, CycleId, DirectoryListing, FileName, StateMapping, Timestamp, Tracked,
    UploadPlan, UploadTask,
};
