//! Query text handling: argument interpolation, pseudo-commands and
//! structural checks

pub mod interpolate;
pub mod pseudo_command;
pub mod statement;

pub use interpolate::{build_execution_params, interpolate, SqlArg};
pub use pseudo_command::{PseudoCommand, DRIVER_VERSION};
pub use statement::{is_execution_id, is_query_valid, is_read_only_statement, placeholder_count};
