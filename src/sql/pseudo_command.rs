//! In-band control commands carried in the query string
//!
//! `pc:<command> [remainder]` is intercepted before anything reaches the
//! service:
//! - `pc:get_query_id <sql>` submits `<sql>` and answers with its execution id
//! - `pc:get_query_id_status <id>` answers with the execution's current state
//! - `pc:stop_query_id <id>` stops the execution and answers `OK`
//! - `pc:get_driver_version` answers with the driver version

use crate::error::{DriverError, Result};

pub const PSEUDO_COMMAND_PREFIX: &str = "pc:";

pub const PC_GET_QUERY_ID: &str = "get_query_id";
pub const PC_GET_QUERY_ID_STATUS: &str = "get_query_id_status";
pub const PC_STOP_QUERY_ID: &str = "stop_query_id";
pub const PC_GET_DRIVER_VERSION: &str = "get_driver_version";

/// Version reported by `pc:get_driver_version`
pub const DRIVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoCommand {
    GetQueryId,
    GetQueryIdStatus,
    StopQueryId,
    GetDriverVersion,
}

impl PseudoCommand {
    pub fn name(&self) -> &'static str {
        match self {
            PseudoCommand::GetQueryId => PC_GET_QUERY_ID,
            PseudoCommand::GetQueryIdStatus => PC_GET_QUERY_ID_STATUS,
            PseudoCommand::StopQueryId => PC_STOP_QUERY_ID,
            PseudoCommand::GetDriverVersion => PC_GET_DRIVER_VERSION,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            PC_GET_QUERY_ID => Some(PseudoCommand::GetQueryId),
            PC_GET_QUERY_ID_STATUS => Some(PseudoCommand::GetQueryIdStatus),
            PC_STOP_QUERY_ID => Some(PseudoCommand::StopQueryId),
            PC_GET_DRIVER_VERSION => Some(PseudoCommand::GetDriverVersion),
            _ => None,
        }
    }

    /// Whether the command needs text after its name
    pub fn takes_remainder(&self) -> bool {
        !matches!(self, PseudoCommand::GetDriverVersion)
    }
}

/// A query string split into an optional control command and the text it wraps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery<'a> {
    pub command: Option<PseudoCommand>,
    /// SQL, an execution id, or empty for `get_driver_version`
    pub query: &'a str,
}

/// Recognize a `pc:` prefix. Plain SQL comes back untouched with no command.
pub fn parse(query: &str) -> Result<ParsedQuery<'_>> {
    let Some(body) = query.strip_prefix(PSEUDO_COMMAND_PREFIX) else {
        return Ok(ParsedQuery {
            command: None,
            query,
        });
    };

    let body = body.trim();
    let (name, remainder) = match body.find(char::is_whitespace) {
        Some(pos) => (&body[..pos], body[pos..].trim()),
        None => (body, ""),
    };

    let command =
        PseudoCommand::from_name(name).ok_or_else(|| DriverError::UnknownPseudoCommand(body.to_string()))?;

    if command.takes_remainder() && remainder.is_empty() {
        return Err(DriverError::InvalidQuery(format!(
            "pseudo command {} requires an argument",
            command.name()
        )));
    }

    Ok(ParsedQuery {
        command: Some(command),
        query: if command.takes_remainder() { remainder } else { "" },
    })
}
