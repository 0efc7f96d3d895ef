//! Remote query service capability and its data models
//!
//! The driver never talks to a transport directly. Everything it needs from the
//! service goes through [`QueryService`], so any client (an SDK wrapper, an HTTP
//! client, the scripted double in [`scripted`]) can be plugged in.

pub mod models;
pub mod scripted;

use async_trait::async_trait;

use crate::error::RemoteError;
pub use models::{
    ColumnInfo, ExecutionState, QueryExecution, ResultPage, StartExecutionRequest,
    StatementType, Workgroup, WorkgroupConfiguration, WorkgroupState, WorkgroupTags,
};

/// The operations the remote query service offers
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Submit a query; returns the execution id.
    ///
    /// A failure after the id was assigned is reported with
    /// [`RemoteError::execution_id`] set.
    async fn start_execution(&self, request: StartExecutionRequest) -> Result<String, RemoteError>;

    async fn get_execution_status(&self, execution_id: &str) -> Result<QueryExecution, RemoteError>;

    async fn stop_execution(&self, execution_id: &str) -> Result<(), RemoteError>;

    /// Fetch one page of results; `next_token` is `None` for the first page
    async fn get_results_page(
        &self,
        execution_id: &str,
        next_token: Option<&str>,
    ) -> Result<ResultPage, RemoteError>;

    async fn get_workgroup(&self, name: &str) -> Result<Workgroup, RemoteError>;

    async fn create_workgroup(
        &self,
        name: &str,
        configuration: &WorkgroupConfiguration,
        tags: Option<&WorkgroupTags>,
    ) -> Result<(), RemoteError>;
}
