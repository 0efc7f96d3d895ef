//! Statement-oriented session over the remote query service
//!
//! A [`Connection`] runs one statement at a time (`&mut self` everywhere);
//! the generic pooling layer above owns concurrency. Query text passes
//! through pseudo-command parsing, the read-only gate, argument handling and
//! workgroup resolution before anything is submitted.

use std::sync::Arc;
use tracing::warn;

use crate::api::{QueryService, ResultPage};
use crate::cache::WorkgroupCache;
use crate::config::DriverConfig;
use crate::data::Cursor;
use crate::error::{DriverError, Result};
use crate::services::{CostReport, ExecContext, QueryExecutionService};
use crate::sql::pseudo_command::{self, PseudoCommand};
use crate::sql::{
    build_execution_params, interpolate, is_execution_id, is_query_valid, is_read_only_statement,
    placeholder_count, SqlArg, DRIVER_VERSION,
};

/// Hands out connections that share one service client and one workgroup cache
#[derive(Clone)]
pub struct Connector {
    service: Arc<dyn QueryService>,
    workgroups: Arc<WorkgroupCache>,
    config: DriverConfig,
}

impl Connector {
    pub fn new(service: Arc<dyn QueryService>, config: DriverConfig) -> Self {
        Self::with_cache(service, Arc::new(WorkgroupCache::new()), config)
    }

    pub fn with_cache(
        service: Arc<dyn QueryService>,
        workgroups: Arc<WorkgroupCache>,
        config: DriverConfig,
    ) -> Self {
        Self {
            service,
            workgroups,
            config,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn connect(&self) -> Connection {
        Connection::new(
            Arc::clone(&self.service),
            Arc::clone(&self.workgroups),
            self.config.clone(),
        )
    }
}

/// Outcome of a statement run for effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    rows_affected: i64,
}

impl ExecResult {
    pub fn rows_affected(&self) -> i64 {
        self.rows_affected
    }

    /// The service has no notion of generated keys
    pub fn last_insert_id(&self) -> Option<i64> {
        None
    }
}

pub struct Connection {
    executor: QueryExecutionService,
}

impl Connection {
    pub fn new(
        service: Arc<dyn QueryService>,
        workgroups: Arc<WorkgroupCache>,
        config: DriverConfig,
    ) -> Self {
        Self {
            executor: QueryExecutionService::new(service, workgroups, config),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        self.executor.config()
    }

    /// Cost of the most recent statement, when cost accounting is on
    pub fn last_cost(&self) -> Option<CostReport> {
        self.executor.last_cost()
    }

    pub async fn query(&mut self, query: &str, args: &[SqlArg]) -> Result<Cursor> {
        self.query_with_context(&ExecContext::background(), query, args)
            .await
    }

    /// Run a statement that produces rows.
    ///
    /// With arguments, the placeholder text is submitted together with the
    /// rendered execution parameters for native binding.
    pub async fn query_with_context(
        &mut self,
        ctx: &ExecContext,
        query: &str,
        args: &[SqlArg],
    ) -> Result<Cursor> {
        self.run_query(ctx, query, args).await
    }

    pub async fn execute(&mut self, query: &str, args: &[SqlArg]) -> Result<ExecResult> {
        self.execute_with_context(&ExecContext::background(), query, args)
            .await
    }

    /// Run a statement for effect. Arguments are interpolated client-side and
    /// the literal text is submitted without execution parameters.
    pub async fn execute_with_context(
        &mut self,
        ctx: &ExecContext,
        query: &str,
        args: &[SqlArg],
    ) -> Result<ExecResult> {
        let text = if args.is_empty() {
            query.to_string()
        } else {
            interpolate(query, args, self.config().max_query_length)?
        };
        if !is_query_valid(&text) {
            return Err(DriverError::InvalidQuery("query is empty".to_string()));
        }

        let mut cursor = self.run_query(ctx, &text, &[]).await?;
        let rows_affected = cursor.update_count().unwrap_or(0);
        cursor.close();
        Ok(ExecResult { rows_affected })
    }

    /// Connectivity probe: runs `SELECT 1` and discards the rows
    pub async fn ping(&mut self) -> Result<()> {
        match self.query("SELECT 1", &[]).await {
            Ok(mut cursor) => {
                cursor.close();
                Ok(())
            }
            Err(e) => Err(DriverError::BadConnection(Box::new(e))),
        }
    }

    pub fn prepare(&mut self, query: &str) -> Result<Statement<'_>> {
        if !is_query_valid(query) {
            return Err(DriverError::InvalidQuery("query is empty".to_string()));
        }
        Ok(Statement {
            num_input: placeholder_count(query),
            query: query.to_string(),
            conn: self,
            closed: false,
        })
    }

    /// The service has no transactions
    pub fn begin(&mut self) -> Result<()> {
        Err(DriverError::TransactionUnsupported)
    }

    async fn run_query(&mut self, ctx: &ExecContext, query: &str, args: &[SqlArg]) -> Result<Cursor> {
        let parsed = pseudo_command::parse(query)?;
        if parsed.command == Some(PseudoCommand::GetDriverVersion) {
            return Cursor::from_page(ResultPage::single_value(DRIVER_VERSION));
        }

        let text = parsed.query;
        let execution_id = is_execution_id(text);
        let config = self.executor.config();

        // Reading an execution by id is allowed; stopping one is a write
        let reads_by_id = execution_id && parsed.command != Some(PseudoCommand::StopQueryId);
        if config.read_only && !reads_by_id && !is_read_only_statement(text) {
            warn!(target: "query", query = text, "write db violation");
            return Err(DriverError::ReadOnlyViolation);
        }

        // Interpolation validates the arguments even when they end up bound natively
        let interpolated = if args.is_empty() {
            None
        } else {
            Some(interpolate(text, args, config.max_query_length)?)
        };
        if !is_query_valid(interpolated.as_deref().unwrap_or(text)) {
            return Err(DriverError::InvalidQuery("query is empty".to_string()));
        }

        self.executor.resolve_workgroup().await?;

        if execution_id {
            let query_id = text.trim();
            return match parsed.command {
                Some(PseudoCommand::GetQueryIdStatus) => self.executor.status_of(query_id).await,
                Some(PseudoCommand::StopQueryId) => self.executor.stop(query_id).await,
                _ => self.executor.cached_results(query_id).await,
            };
        }

        // Status and stop wrapping SQL text run it as a plain statement
        let params = build_execution_params(args, config.max_query_length)?;
        match parsed.command {
            Some(PseudoCommand::GetQueryId) => self.executor.submit_for_id(text, params).await,
            _ => self.executor.execute(ctx, text, params).await,
        }
    }
}

/// A prepared statement: query text plus its placeholder count
pub struct Statement<'c> {
    conn: &'c mut Connection,
    query: String,
    num_input: usize,
    closed: bool,
}

impl<'c> Statement<'c> {
    pub fn num_input(&self) -> usize {
        self.num_input
    }

    pub fn sql(&self) -> &str {
        &self.query
    }

    pub async fn query(&mut self, args: &[SqlArg]) -> Result<Cursor> {
        self.query_with_context(&ExecContext::background(), args)
            .await
    }

    pub async fn query_with_context(&mut self, ctx: &ExecContext, args: &[SqlArg]) -> Result<Cursor> {
        self.check_args(args)?;
        self.conn.query_with_context(ctx, &self.query, args).await
    }

    pub async fn execute(&mut self, args: &[SqlArg]) -> Result<ExecResult> {
        self.execute_with_context(&ExecContext::background(), args)
            .await
    }

    pub async fn execute_with_context(
        &mut self,
        ctx: &ExecContext,
        args: &[SqlArg],
    ) -> Result<ExecResult> {
        self.check_args(args)?;
        self.conn.execute_with_context(ctx, &self.query, args).await
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_args(&self, args: &[SqlArg]) -> Result<()> {
        if self.closed {
            return Err(DriverError::StatementClosed);
        }
        if args.len() != self.num_input {
            return Err(DriverError::InvalidQuery(format!(
                "statement expects {} arguments, got {}",
                self.num_input,
                args.len()
            )));
        }
        Ok(())
    }
}
