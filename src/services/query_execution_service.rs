use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::api::{
    ExecutionState, QueryExecution, QueryService, ResultPage, StartExecutionRequest,
    WorkgroupConfiguration,
};
use crate::cache::WorkgroupCache;
use crate::config::{DriverConfig, DEFAULT_WORKGROUP};
use crate::data::Cursor;
use crate::error::{CancelReason, DriverError, RemoteError, Result};
use crate::services::cost::CostReport;
use crate::services::exec_context::ExecContext;

/// Drives one statement at a time through submit, poll and fetch
///
/// The poll loop is the only place a statement waits. Each iteration races the
/// poll-interval timer against the caller's [`ExecContext`]; whichever fires
/// first wins.
pub struct QueryExecutionService {
    service: Arc<dyn QueryService>,
    workgroups: Arc<WorkgroupCache>,
    config: DriverConfig,
    last_cost: Mutex<Option<CostReport>>,
}

impl QueryExecutionService {
    pub fn new(
        service: Arc<dyn QueryService>,
        workgroups: Arc<WorkgroupCache>,
        config: DriverConfig,
    ) -> Self {
        Self {
            service,
            workgroups,
            config,
            last_cost: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Most recent cost report, when cost accounting is enabled
    pub fn last_cost(&self) -> Option<CostReport> {
        self.last_cost
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Make sure the configured workgroup can take queries.
    ///
    /// The default workgroup is never looked up. A failed lookup either creates
    /// the workgroup remotely (when allowed) or fails the statement.
    pub async fn resolve_workgroup(&self) -> Result<()> {
        let name = self.config.workgroup_name();
        if name == DEFAULT_WORKGROUP {
            return Ok(());
        }

        match self.workgroups.resolve(self.service.as_ref(), name).await {
            Ok(workgroup) if workgroup.is_enabled() => {
                debug!(target: "workgroup", workgroup = name, "workgroup is enabled");
                Ok(())
            }
            Ok(_) => {
                warn!(target: "workgroup", workgroup = name, "workgroup is disabled");
                Err(DriverError::WorkgroupDisabled(name.to_string()))
            }
            Err(e) => {
                warn!(target: "workgroup", workgroup = name, error = %e, "didn't find workgroup");
                if !self.config.workgroup.allow_remote_creation {
                    return Err(DriverError::WorkgroupUnavailable {
                        name: name.to_string(),
                        source: RemoteError::clone(&e),
                    });
                }
                self.create_workgroup(name).await
            }
        }
    }

    async fn create_workgroup(&self, name: &str) -> Result<()> {
        let settings = &self.config.workgroup;
        let configuration = settings
            .configuration
            .clone()
            .unwrap_or_else(WorkgroupConfiguration::default);
        let tags = (!settings.tags.is_empty()).then_some(&settings.tags);

        if let Err(e) = self
            .service
            .create_workgroup(name, &configuration, tags)
            .await
        {
            error!(target: "workgroup", workgroup = name, error = %e, "workgroup creation failed");
            return Err(e.into());
        }
        info!(target: "workgroup", workgroup = name, "workgroup created");
        Ok(())
    }

    /// Submit a query; returns the execution id. Never retried.
    pub async fn submit(&self, query: &str, execution_parameters: Vec<String>) -> Result<String> {
        let request = StartExecutionRequest {
            query: query.to_string(),
            execution_parameters,
            database: self.config.database.clone(),
            output_location: self.config.output_location.clone(),
            workgroup: self.config.workgroup_name().to_string(),
        };

        match self.service.start_execution(request).await {
            Ok(query_id) => {
                debug!(target: "query", query_id = %query_id, "query submitted");
                Ok(query_id)
            }
            Err(e) => {
                error!(
                    target: "query",
                    workgroup = self.config.workgroup_name(),
                    query_id = e.execution_id.as_deref().unwrap_or(""),
                    error = %e,
                    "query submission failed"
                );
                Err(e.into())
            }
        }
    }

    /// Submit and run to completion, then open the result cursor
    pub async fn execute(
        &self,
        ctx: &ExecContext,
        query: &str,
        execution_parameters: Vec<String>,
    ) -> Result<Cursor> {
        let started = Instant::now();
        let query_id = self.submit(query, execution_parameters).await?;
        self.wait_for_completion(ctx, &query_id, started).await?;
        Cursor::open(Arc::clone(&self.service), query_id).await
    }

    /// Submit without waiting: the answer is the execution id as a single row.
    ///
    /// A failed submission still answers when the service assigned a request id.
    pub async fn submit_for_id(&self, query: &str, execution_parameters: Vec<String>) -> Result<Cursor> {
        let value = match self.submit(query, execution_parameters).await {
            Ok(query_id) => query_id,
            Err(DriverError::Remote(e)) => match e.request_id.clone() {
                Some(request_id) => request_id,
                None => return Err(DriverError::Remote(e)),
            },
            Err(e) => return Err(e),
        };
        Cursor::from_page(ResultPage::single_value(value))
    }

    /// Poll until the execution reaches a terminal state, the client-side
    /// timeout passes, or the caller gives up.
    ///
    /// `started` is when submission began; the timeout is measured from there.
    pub async fn wait_for_completion(
        &self,
        ctx: &ExecContext,
        query_id: &str,
        started: Instant,
    ) -> Result<QueryExecution> {
        let poll_interval = self.config.poll_interval();
        let limits = &self.config.service_limits;
        let workgroup = self.config.workgroup_name();

        loop {
            let status = match self.service.get_execution_status(query_id).await {
                Ok(status) => status,
                Err(e) => {
                    error!(target: "query", workgroup, query_id, error = %e, "status poll failed");
                    return Err(e.into());
                }
            };

            match status.state {
                ExecutionState::Cancelled => {
                    error!(target: "query", workgroup, query_id, "query cancelled by the service");
                    self.report_cost(&status);
                    return Err(DriverError::QueryCancelled {
                        query_id: query_id.to_string(),
                    });
                }
                ExecutionState::Failed => {
                    let reason = status.state_change_reason.clone().unwrap_or_default();
                    error!(target: "query", workgroup, query_id, reason = %reason, "query failed");
                    self.report_cost(&status);
                    return Err(DriverError::QueryFailed {
                        query_id: query_id.to_string(),
                        reason,
                    });
                }
                ExecutionState::Succeeded => {
                    debug!(
                        target: "query",
                        query_id,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "query succeeded"
                    );
                    self.report_cost(&status);
                    return Ok(status);
                }
                ExecutionState::Queued | ExecutionState::Running => {}
            }

            tokio::select! {
                reason = ctx.done() => {
                    return Err(self.abandon(query_id, reason, &status).await);
                }
                _ = tokio::time::sleep(poll_interval) => {
                    let elapsed = started.elapsed();
                    // No remote stop here: the service enforces its own limits
                    if limits.is_timed_out(elapsed, status.statement_type.as_ref()) {
                        error!(
                            target: "query",
                            workgroup,
                            query_id,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "query timed out"
                        );
                        return Err(DriverError::QueryTimeout {
                            query_id: query_id.to_string(),
                            elapsed,
                        });
                    }
                }
            }
        }
    }

    /// The caller gave up: stop the execution remotely and report why.
    /// A failed stop supersedes the caller's reason.
    async fn abandon(&self, query_id: &str, reason: CancelReason, last: &QueryExecution) -> DriverError {
        if let Err(e) = self.service.stop_execution(query_id).await {
            error!(target: "query", query_id, error = %e, "stopping query failed");
            return e.into();
        }

        if self.config.moneywise {
            let snapshot = match self.service.get_execution_status(query_id).await {
                Ok(status) => status,
                Err(_) => last.clone(),
            };
            self.report_cost(&snapshot);
        }
        error!(target: "query", query_id, reason = %reason, "query canceled");
        DriverError::Cancelled(reason)
    }

    /// Results of an execution that already finished; nothing is submitted
    pub async fn cached_results(&self, query_id: &str) -> Result<Cursor> {
        if self.config.moneywise {
            self.report_cost(&QueryExecution::new(query_id, ExecutionState::Succeeded).with_bytes_scanned(0));
        }
        Cursor::open(Arc::clone(&self.service), query_id).await
    }

    /// Current state of an execution, as a single row
    pub async fn status_of(&self, query_id: &str) -> Result<Cursor> {
        let status = match self.service.get_execution_status(query_id).await {
            Ok(status) => status,
            Err(e) => {
                error!(target: "query", query_id, error = %e, "status lookup failed");
                return Err(e.into());
            }
        };
        Cursor::from_page(ResultPage::single_value(status.state.as_str()))
    }

    /// Stop an execution; answers `OK` as a single row
    pub async fn stop(&self, query_id: &str) -> Result<Cursor> {
        if let Err(e) = self.service.stop_execution(query_id).await {
            error!(target: "query", query_id, error = %e, "stopping query failed");
            return Err(e.into());
        }
        Cursor::from_page(ResultPage::single_value("OK"))
    }

    fn report_cost(&self, execution: &QueryExecution) {
        if !self.config.moneywise {
            return;
        }
        let report = CostReport::from_execution(execution);
        report.emit();
        *self.last_cost.lock().unwrap_or_else(|e| e.into_inner()) = Some(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::scripted::ScriptedService;
    use crate::api::{StatementType, Workgroup};
    use crate::config::ServiceLimitOverride;
    use crate::error::RemoteError;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const QID: &str = "c89088ab-595d-4ee6-a9ce-73b55aeb8953";

    fn running() -> QueryExecution {
        QueryExecution::new(QID, ExecutionState::Running)
    }

    fn executor(service: &Arc<ScriptedService>, config: DriverConfig) -> QueryExecutionService {
        QueryExecutionService::new(service.clone(), Arc::new(WorkgroupCache::new()), config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_succeeded() {
        let service = Arc::new(ScriptedService::new());
        service.with_statuses(
            QID,
            [
                QueryExecution::new(QID, ExecutionState::Queued),
                running(),
                QueryExecution::new(QID, ExecutionState::Succeeded).with_bytes_scanned(42),
            ],
        );
        let exec = executor(&service, DriverConfig::default().with_moneywise(true));

        let status = exec
            .wait_for_completion(&ExecContext::background(), QID, Instant::now())
            .await
            .unwrap();
        assert_eq!(status.state, ExecutionState::Succeeded);
        assert_eq!(service.status_polls(QID), 3);
        assert_eq!(exec.last_cost().unwrap().bytes_scanned, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_failure_carries_reason() {
        let service = Arc::new(ScriptedService::new());
        service.with_statuses(
            QID,
            [running(), QueryExecution::new(QID, ExecutionState::Failed).with_reason("SYNTAX_ERROR")],
        );
        let exec = executor(&service, DriverConfig::default().with_moneywise(true));

        let err = exec
            .wait_for_completion(&ExecContext::background(), QID, Instant::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::QueryFailed { ref reason, .. } if reason == "SYNTAX_ERROR"));
        assert!(exec.last_cost().is_some());
        assert_eq!(service.stop_calls(QID), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_cancel_is_not_caller_cancel() {
        let service = Arc::new(ScriptedService::new());
        service.with_statuses(QID, [QueryExecution::new(QID, ExecutionState::Cancelled)]);
        let exec = executor(&service, DriverConfig::default());

        let err = exec
            .wait_for_completion(&ExecContext::background(), QID, Instant::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::QueryCancelled { .. }));
        assert_eq!(service.stop_calls(QID), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_issues_no_stop() {
        let service = Arc::new(ScriptedService::new());
        service.with_statuses(QID, [running().with_statement_type(StatementType::Dml)]);
        let limits = ServiceLimitOverride {
            ddl_query_timeout_secs: None,
            dml_query_timeout_secs: Some(10),
        };
        let exec = executor(
            &service,
            DriverConfig::default()
                .with_poll_interval(Duration::from_secs(3))
                .with_service_limits(limits),
        );

        let err = exec
            .wait_for_completion(&ExecContext::background(), QID, Instant::now())
            .await
            .unwrap_err();
        match err {
            DriverError::QueryTimeout { elapsed, .. } => assert_eq!(elapsed, Duration::from_secs(12)),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(service.stop_calls(QID), 0);
        assert_eq!(service.status_polls(QID), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ddl_uses_longer_threshold() {
        let service = Arc::new(ScriptedService::new());
        let mut statuses = vec![running().with_statement_type(StatementType::Ddl); 5];
        statuses.push(QueryExecution::new(QID, ExecutionState::Succeeded));
        service.with_statuses(QID, statuses);
        let limits = ServiceLimitOverride {
            ddl_query_timeout_secs: Some(60),
            dml_query_timeout_secs: Some(5),
        };
        let exec = executor(&service, DriverConfig::default().with_service_limits(limits));

        let status = exec
            .wait_for_completion(&ExecContext::background(), QID, Instant::now())
            .await
            .unwrap();
        assert_eq!(status.state, ExecutionState::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_cancel_stops_once() {
        let service = Arc::new(ScriptedService::new());
        let token = CancellationToken::new();
        service
            .with_statuses(QID, [running()])
            .cancel_after_polls(QID, 2, token.clone());
        let exec = executor(&service, DriverConfig::default());

        let err = exec
            .wait_for_completion(&ExecContext::with_cancel(token), QID, Instant::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Cancelled(CancelReason::Cancelled)));
        assert_eq!(service.stop_calls(QID), 1);
        assert_eq!(service.status_polls(QID), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_counts_as_caller_cancel() {
        let service = Arc::new(ScriptedService::new());
        service.with_statuses(QID, [running()]);
        let exec = executor(&service, DriverConfig::default());
        let ctx = ExecContext::background().with_timeout(Duration::from_secs(7));

        let err = exec.wait_for_completion(&ctx, QID, Instant::now()).await.unwrap_err();
        assert!(matches!(err, DriverError::Cancelled(CancelReason::DeadlineExceeded)));
        assert_eq!(service.stop_calls(QID), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_stop_supersedes_cancel() {
        let service = Arc::new(ScriptedService::new());
        let token = CancellationToken::new();
        service
            .with_statuses(QID, [running()])
            .with_stop_error(QID, RemoteError::new("stop refused"))
            .cancel_after_polls(QID, 1, token.clone());
        let exec = executor(&service, DriverConfig::default());

        let err = exec
            .wait_for_completion(&ExecContext::with_cancel(token), QID, Instant::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Remote(ref e) if e.message == "stop refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_error_is_returned_as_is() {
        let service = Arc::new(ScriptedService::new());
        service.with_status_error(QID, RemoteError::new("throttled"));
        let exec = executor(&service, DriverConfig::default());

        let err = exec
            .wait_for_completion(&ExecContext::background(), QID, Instant::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Remote(ref e) if e.message == "throttled"));
    }

    #[tokio::test]
    async fn test_default_workgroup_is_not_looked_up() {
        let service = Arc::new(ScriptedService::new());
        let exec = executor(&service, DriverConfig::default());
        exec.resolve_workgroup().await.unwrap();
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_workgroup() {
        let service = Arc::new(ScriptedService::new());
        service.with_workgroup(Workgroup::disabled("etl"));
        let exec = executor(&service, DriverConfig::default().with_workgroup("etl", true));

        let err = exec.resolve_workgroup().await.unwrap_err();
        assert!(matches!(err, DriverError::WorkgroupDisabled(ref name) if name == "etl"));
    }

    #[tokio::test]
    async fn test_submit_for_id_falls_back_to_request_id() {
        let service = Arc::new(ScriptedService::new());
        service.on_submit_error(
            "SELECT 1",
            RemoteError::new("internal error").with_request_id("req-123"),
        );
        let exec = executor(&service, DriverConfig::default());

        let mut cursor = exec.submit_for_id("SELECT 1", Vec::new()).await.unwrap();
        assert_eq!(cursor.next().await.unwrap().unwrap().raw(0), Some("req-123"));
    }
}
