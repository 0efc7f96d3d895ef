//! Statement-oriented client driver for an asynchronous, poll-based SQL query
//! service (submit, poll status, fetch paginated results).
//!
//! Callers hand a [`Connection`] SQL text and typed arguments and get back
//! either a row [`Cursor`] or an [`ExecResult`]; the submit/poll/fetch
//! protocol stays hidden. The remote service is reached only through the
//! [`api::QueryService`] trait.

pub mod api;
pub mod blocking;
pub mod cache;
pub mod config;
pub mod connection;
pub mod data;
pub mod error;
pub mod logging;
pub mod services;
pub mod sql;

pub use cache::WorkgroupCache;
pub use config::DriverConfig;
pub use connection::{Connection, Connector, ExecResult, Statement};
pub use data::{Cursor, DataValue, Row};
pub use error::{CancelReason, DriverError, RemoteError, Result};
pub use services::{CostReport, ExecContext};
pub use sql::{SqlArg, DRIVER_VERSION};
