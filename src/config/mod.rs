//! Configuration module
//!
//! Session-level settings consumed by the connection and the execution
//! state machine, loadable from TOML.

#[allow(clippy::module_inception)]
pub mod config;

pub use config::{
    DriverConfig, LoggingConfig, ServiceLimitOverride, WorkgroupSettings, DEFAULT_WORKGROUP,
};
