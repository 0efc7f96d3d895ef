//! Scripted [`QueryService`] for tests and offline demos
//!
//! Responses are canned per query text, execution id and continuation token.
//! Every call is recorded so tests can assert on exactly what reached the
//! service.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::models::{
    QueryExecution, ResultPage, StartExecutionRequest, Workgroup, WorkgroupConfiguration,
    WorkgroupTags,
};
use super::QueryService;
use crate::error::RemoteError;

/// One recorded call against the service
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    StartExecution(StartExecutionRequest),
    GetExecutionStatus(String),
    StopExecution(String),
    GetResultsPage {
        execution_id: String,
        next_token: Option<String>,
    },
    GetWorkgroup(String),
    CreateWorkgroup {
        name: String,
        configuration: WorkgroupConfiguration,
        tags: Option<WorkgroupTags>,
    },
}

type PageKey = (String, Option<String>);

#[derive(Default)]
struct Script {
    submissions: HashMap<String, Result<String, RemoteError>>,
    statuses: HashMap<String, VecDeque<Result<QueryExecution, RemoteError>>>,
    pages: HashMap<PageKey, Result<ResultPage, RemoteError>>,
    stops: HashMap<String, Result<(), RemoteError>>,
    workgroups: HashMap<String, Result<Workgroup, RemoteError>>,
    create_workgroup_error: Option<RemoteError>,
    cancel_triggers: HashMap<String, (usize, CancellationToken)>,
    calls: Vec<RemoteCall>,
}

/// In-memory service that answers from a script
#[derive(Default)]
pub struct ScriptedService {
    script: Mutex<Script>,
    workgroup_latency: Mutex<Duration>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        // A panicking test thread must not hide the script from the others
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Submitting `query` yields `execution_id`
    pub fn on_submit(&self, query: impl Into<String>, execution_id: impl Into<String>) -> &Self {
        self.script()
            .submissions
            .insert(query.into(), Ok(execution_id.into()));
        self
    }

    /// Submitting `query` fails with `error`
    pub fn on_submit_error(&self, query: impl Into<String>, error: RemoteError) -> &Self {
        self.script().submissions.insert(query.into(), Err(error));
        self
    }

    /// Status polls for `execution_id` walk through `states`; the last one repeats
    pub fn with_statuses(
        &self,
        execution_id: impl Into<String>,
        states: impl IntoIterator<Item = QueryExecution>,
    ) -> &Self {
        self.script()
            .statuses
            .insert(execution_id.into(), states.into_iter().map(Ok).collect());
        self
    }

    pub fn with_status_error(&self, execution_id: impl Into<String>, error: RemoteError) -> &Self {
        self.script()
            .statuses
            .insert(execution_id.into(), VecDeque::from([Err(error)]));
        self
    }

    /// Page returned for `execution_id` when asked with `token`
    pub fn with_page(
        &self,
        execution_id: impl Into<String>,
        token: Option<&str>,
        page: ResultPage,
    ) -> &Self {
        self.script()
            .pages
            .insert((execution_id.into(), token.map(str::to_string)), Ok(page));
        self
    }

    pub fn with_page_error(
        &self,
        execution_id: impl Into<String>,
        token: Option<&str>,
        error: RemoteError,
    ) -> &Self {
        self.script()
            .pages
            .insert((execution_id.into(), token.map(str::to_string)), Err(error));
        self
    }

    pub fn with_stop_error(&self, execution_id: impl Into<String>, error: RemoteError) -> &Self {
        self.script().stops.insert(execution_id.into(), Err(error));
        self
    }

    pub fn with_workgroup(&self, workgroup: Workgroup) -> &Self {
        self.script()
            .workgroups
            .insert(workgroup.name.clone(), Ok(workgroup));
        self
    }

    pub fn with_workgroup_error(&self, name: impl Into<String>, error: RemoteError) -> &Self {
        self.script().workgroups.insert(name.into(), Err(error));
        self
    }

    pub fn with_create_workgroup_error(&self, error: RemoteError) -> &Self {
        self.script().create_workgroup_error = Some(error);
        self
    }

    /// Delay every workgroup lookup, to widen the window for concurrent callers
    pub fn with_workgroup_latency(&self, latency: Duration) -> &Self {
        *self
            .workgroup_latency
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = latency;
        self
    }

    /// Cancel `token` right after the `polls`-th status poll of `execution_id` is served
    pub fn cancel_after_polls(
        &self,
        execution_id: impl Into<String>,
        polls: usize,
        token: CancellationToken,
    ) -> &Self {
        self.script()
            .cancel_triggers
            .insert(execution_id.into(), (polls, token));
        self
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.script().calls.clone()
    }

    pub fn submissions(&self) -> Vec<StartExecutionRequest> {
        self.script()
            .calls
            .iter()
            .filter_map(|c| match c {
                RemoteCall::StartExecution(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn status_polls(&self, execution_id: &str) -> usize {
        self.count(|c| matches!(c, RemoteCall::GetExecutionStatus(id) if id == execution_id))
    }

    pub fn stop_calls(&self, execution_id: &str) -> usize {
        self.count(|c| matches!(c, RemoteCall::StopExecution(id) if id == execution_id))
    }

    pub fn page_fetches(&self, execution_id: &str) -> usize {
        self.count(
            |c| matches!(c, RemoteCall::GetResultsPage { execution_id: id, .. } if id == execution_id),
        )
    }

    pub fn workgroup_lookups(&self, name: &str) -> usize {
        self.count(|c| matches!(c, RemoteCall::GetWorkgroup(n) if n == name))
    }

    fn count(&self, pred: impl Fn(&RemoteCall) -> bool) -> usize {
        self.script().calls.iter().filter(|c| pred(c)).count()
    }
}

#[async_trait]
impl QueryService for ScriptedService {
    async fn start_execution(&self, request: StartExecutionRequest) -> Result<String, RemoteError> {
        let mut script = self.script();
        script.calls.push(RemoteCall::StartExecution(request.clone()));
        script
            .submissions
            .get(&request.query)
            .cloned()
            .unwrap_or_else(|| {
                Err(RemoteError::new(format!(
                    "no scripted execution for query {:?}",
                    request.query
                )))
            })
    }

    async fn get_execution_status(&self, execution_id: &str) -> Result<QueryExecution, RemoteError> {
        let mut script = self.script();
        script
            .calls
            .push(RemoteCall::GetExecutionStatus(execution_id.to_string()));

        let polls = script
            .calls
            .iter()
            .filter(|c| matches!(c, RemoteCall::GetExecutionStatus(id) if id == execution_id))
            .count();
        if let Some((after, token)) = script.cancel_triggers.get(execution_id) {
            if polls >= *after {
                token.cancel();
            }
        }

        let Some(queue) = script.statuses.get_mut(execution_id) else {
            return Err(RemoteError::new(format!(
                "unknown execution id {}",
                execution_id
            )));
        };
        if queue.len() > 1 {
            if let Some(next) = queue.pop_front() {
                return next;
            }
        }
        queue
            .front()
            .cloned()
            .unwrap_or_else(|| Err(RemoteError::new("no scripted status")))
    }

    async fn stop_execution(&self, execution_id: &str) -> Result<(), RemoteError> {
        let mut script = self.script();
        script
            .calls
            .push(RemoteCall::StopExecution(execution_id.to_string()));
        script.stops.get(execution_id).cloned().unwrap_or(Ok(()))
    }

    async fn get_results_page(
        &self,
        execution_id: &str,
        next_token: Option<&str>,
    ) -> Result<ResultPage, RemoteError> {
        let mut script = self.script();
        script.calls.push(RemoteCall::GetResultsPage {
            execution_id: execution_id.to_string(),
            next_token: next_token.map(str::to_string),
        });
        let key = (execution_id.to_string(), next_token.map(str::to_string));
        script.pages.get(&key).cloned().unwrap_or_else(|| {
            Err(RemoteError::new(format!(
                "no scripted page for {} at token {:?}",
                execution_id, next_token
            )))
        })
    }

    async fn get_workgroup(&self, name: &str) -> Result<Workgroup, RemoteError> {
        self.script()
            .calls
            .push(RemoteCall::GetWorkgroup(name.to_string()));

        let latency = *self
            .workgroup_latency
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        self.script()
            .workgroups
            .get(name)
            .cloned()
            .unwrap_or_else(|| Err(RemoteError::new(format!("workgroup {} not found", name))))
    }

    async fn create_workgroup(
        &self,
        name: &str,
        configuration: &WorkgroupConfiguration,
        tags: Option<&WorkgroupTags>,
    ) -> Result<(), RemoteError> {
        let mut script = self.script();
        script.calls.push(RemoteCall::CreateWorkgroup {
            name: name.to_string(),
            configuration: configuration.clone(),
            tags: tags.cloned(),
        });
        if let Some(err) = &script.create_workgroup_error {
            return Err(err.clone());
        }
        let workgroup = Workgroup {
            configuration: Some(configuration.clone()),
            tags: tags.cloned().unwrap_or_default(),
            ..Workgroup::enabled(name)
        };
        script.workgroups.insert(name.to_string(), Ok(workgroup));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::ExecutionState;

    #[tokio::test]
    async fn test_status_sequence_repeats_last() {
        let service = ScriptedService::new();
        service.with_statuses(
            "qid",
            [
                QueryExecution::new("qid", ExecutionState::Queued),
                QueryExecution::new("qid", ExecutionState::Succeeded),
            ],
        );

        let first = service.get_execution_status("qid").await.unwrap();
        let second = service.get_execution_status("qid").await.unwrap();
        let third = service.get_execution_status("qid").await.unwrap();
        assert_eq!(first.state, ExecutionState::Queued);
        assert_eq!(second.state, ExecutionState::Succeeded);
        assert_eq!(third.state, ExecutionState::Succeeded);
        assert_eq!(service.status_polls("qid"), 3);
    }

    #[tokio::test]
    async fn test_unscripted_calls_fail() {
        let service = ScriptedService::new();
        assert!(service.get_execution_status("nope").await.is_err());
        assert!(service.get_results_page("nope", None).await.is_err());
        assert!(service.get_workgroup("nope").await.is_err());
        assert!(service.stop_execution("nope").await.is_ok());
        assert_eq!(service.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_created_workgroup_becomes_visible() {
        let service = ScriptedService::new();
        assert!(service.get_workgroup("etl").await.is_err());
        service
            .create_workgroup("etl", &WorkgroupConfiguration::default(), None)
            .await
            .unwrap();
        let wg = service.get_workgroup("etl").await.unwrap();
        assert!(wg.is_enabled());
    }
}
