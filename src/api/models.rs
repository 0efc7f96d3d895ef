use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of one remote execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ExecutionState {
    /// Succeeded, Failed and Cancelled never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Succeeded | ExecutionState::Failed | ExecutionState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Queued => "QUEUED",
            ExecutionState::Running => "RUNNING",
            ExecutionState::Succeeded => "SUCCEEDED",
            ExecutionState::Failed => "FAILED",
            ExecutionState::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statement classification reported by the service once it has parsed the query
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StatementType {
    Ddl,
    Dml,
    Utility,
    Other(String),
}

impl From<&str> for StatementType {
    fn from(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "DDL" => StatementType::Ddl,
            "DML" => StatementType::Dml,
            "UTILITY" => StatementType::Utility,
            _ => StatementType::Other(value.to_string()),
        }
    }
}

impl From<String> for StatementType {
    fn from(value: String) -> Self {
        StatementType::from(value.as_str())
    }
}

impl From<StatementType> for String {
    fn from(value: StatementType) -> Self {
        match value {
            StatementType::Ddl => "DDL".to_string(),
            StatementType::Dml => "DML".to_string(),
            StatementType::Utility => "UTILITY".to_string(),
            StatementType::Other(s) => s,
        }
    }
}

/// Status snapshot of a remote execution, as returned by a status poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryExecution {
    pub execution_id: String,
    pub state: ExecutionState,
    /// Backend-supplied reason, set when the execution failed
    pub state_change_reason: Option<String>,
    pub statement_type: Option<StatementType>,
    pub bytes_scanned: Option<i64>,
}

impl QueryExecution {
    pub fn new(execution_id: impl Into<String>, state: ExecutionState) -> Self {
        Self {
            execution_id: execution_id.into(),
            state,
            state_change_reason: None,
            statement_type: None,
            bytes_scanned: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.state_change_reason = Some(reason.into());
        self
    }

    pub fn with_statement_type(mut self, statement_type: StatementType) -> Self {
        self.statement_type = Some(statement_type);
        self
    }

    pub fn with_bytes_scanned(mut self, bytes: i64) -> Self {
        self.bytes_scanned = Some(bytes);
        self
    }
}

/// Everything the service needs to start one execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartExecutionRequest {
    pub query: String,
    /// Literal SQL fragments bound natively to the `?` placeholders of `query`
    pub execution_parameters: Vec<String>,
    pub database: String,
    pub output_location: String,
    pub workgroup: String,
}

/// Column descriptor of a result set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
        }
    }
}

/// One page of results. A page without `next_token` is the last one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultPage {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<Option<String>>>,
    pub next_token: Option<String>,
    pub update_count: Option<i64>,
}

impl ResultPage {
    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self {
            columns,
            rows,
            next_token: None,
            update_count: None,
        }
    }

    /// Single-row, single-string-column page used for pseudo-command answers
    pub fn single_value(value: impl Into<String>) -> Self {
        Self::new(
            vec![ColumnInfo::new("_col0", "string")],
            vec![vec![Some(value.into())]],
        )
    }

    pub fn with_next_token(mut self, token: impl Into<String>) -> Self {
        self.next_token = Some(token.into());
        self
    }

    pub fn with_update_count(mut self, count: i64) -> Self {
        self.update_count = Some(count);
        self
    }

    pub fn is_last(&self) -> bool {
        self.next_token.is_none()
    }

    /// True if the first row repeats the column names verbatim
    pub fn starts_with_header_row(&self) -> bool {
        match self.rows.first() {
            Some(first) if !self.columns.is_empty() && first.len() == self.columns.len() => first
                .iter()
                .zip(&self.columns)
                .all(|(cell, column)| cell.as_deref() == Some(column.name.as_str())),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkgroupState {
    Enabled,
    Disabled,
}

/// Service-side settings of a workgroup; opaque to the execution path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkgroupConfiguration {
    pub bytes_scanned_cutoff_per_query: Option<i64>,
    pub enforce_workgroup_configuration: bool,
    pub publish_metrics_enabled: bool,
    pub requester_pays_enabled: bool,
    pub output_location: Option<String>,
}

/// 1 TiB
pub const DEFAULT_BYTES_SCANNED_CUTOFF_PER_QUERY: i64 = 1024 * 1024 * 1024 * 1024;

impl Default for WorkgroupConfiguration {
    fn default() -> Self {
        Self {
            bytes_scanned_cutoff_per_query: Some(DEFAULT_BYTES_SCANNED_CUTOFF_PER_QUERY),
            enforce_workgroup_configuration: true,
            publish_metrics_enabled: true,
            requester_pays_enabled: false,
            output_location: None,
        }
    }
}

/// Key/value tags attached to a workgroup at creation time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkgroupTags(BTreeMap<String, String>);

impl WorkgroupTags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Workgroup as described by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workgroup {
    pub name: String,
    pub state: WorkgroupState,
    pub configuration: Option<WorkgroupConfiguration>,
    #[serde(default)]
    pub tags: WorkgroupTags,
}

impl Workgroup {
    pub fn enabled(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: WorkgroupState::Enabled,
            configuration: None,
            tags: WorkgroupTags::new(),
        }
    }

    pub fn disabled(name: impl Into<String>) -> Self {
        Self {
            state: WorkgroupState::Disabled,
            ..Self::enabled(name)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state == WorkgroupState::Enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!ExecutionState::Queued.is_terminal());
        assert!(!ExecutionState::Running.is_terminal());
        assert!(ExecutionState::Succeeded.is_terminal());
        assert!(ExecutionState::Failed.is_terminal());
        assert!(ExecutionState::Cancelled.is_terminal());
        assert_eq!(ExecutionState::Cancelled.to_string(), "CANCELLED");
    }

    #[test]
    fn test_statement_type_from_wire() {
        assert_eq!(StatementType::from("DDL"), StatementType::Ddl);
        assert_eq!(StatementType::from("dml"), StatementType::Dml);
        assert_eq!(StatementType::from("UTILITY"), StatementType::Utility);
        assert_eq!(
            StatementType::from("TIMEOUT_NOW"),
            StatementType::Other("TIMEOUT_NOW".to_string())
        );
        let json = serde_json::to_string(&StatementType::Ddl).unwrap();
        assert_eq!(json, "\"DDL\"");
    }

    #[test]
    fn test_header_row_detection() {
        let columns = vec![ColumnInfo::new("id", "integer"), ColumnInfo::new("name", "varchar")];
        let page = ResultPage::new(
            columns.clone(),
            vec![
                vec![Some("id".into()), Some("name".into())],
                vec![Some("1".into()), Some("alice".into())],
            ],
        );
        assert!(page.starts_with_header_row());

        let page = ResultPage::new(columns.clone(), vec![vec![Some("1".into()), Some("id".into())]]);
        assert!(!page.starts_with_header_row());

        let page = ResultPage::new(columns, vec![vec![Some("id".into()), None]]);
        assert!(!page.starts_with_header_row());
    }

    #[test]
    fn test_single_value_page() {
        let page = ResultPage::single_value("OK");
        assert_eq!(page.columns, vec![ColumnInfo::new("_col0", "string")]);
        assert_eq!(page.rows, vec![vec![Some("OK".to_string())]]);
        assert!(page.is_last());
    }

    #[test]
    fn test_workgroup_tags() {
        let mut tags = WorkgroupTags::new();
        tags.add("team", "data").add("env", "prod");
        assert_eq!(tags.len(), 2);
        assert_eq!(tags.get("env"), Some("prod"));
        let keys: Vec<&str> = tags.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["env", "team"]);
    }
}
