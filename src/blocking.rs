//! Synchronous wrappers for callers without an async runtime
//!
//! Each [`Connection`] owns a current-thread tokio runtime and blocks on it
//! for every call. Cursors keep a handle to that runtime so rows can be pulled
//! with a plain `Iterator`. Cancellation still works from another thread
//! through the [`ExecContext`] token.

use std::sync::Arc;
use tokio::runtime::Runtime;

use crate::api::QueryService;
use crate::cache::WorkgroupCache;
use crate::config::DriverConfig;
use crate::connection::{self, ExecResult};
use crate::data::{DataColumn, Row};
use crate::error::Result;
use crate::services::{CostReport, ExecContext};
use crate::sql::SqlArg;

fn build_runtime() -> Result<Arc<Runtime>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    Ok(Arc::new(runtime))
}

pub struct Connection {
    runtime: Arc<Runtime>,
    inner: connection::Connection,
}

impl Connection {
    pub fn new(
        service: Arc<dyn QueryService>,
        workgroups: Arc<WorkgroupCache>,
        config: DriverConfig,
    ) -> Result<Self> {
        Ok(Self {
            runtime: build_runtime()?,
            inner: connection::Connection::new(service, workgroups, config),
        })
    }

    pub fn from_connector(connector: &connection::Connector) -> Result<Self> {
        Ok(Self {
            runtime: build_runtime()?,
            inner: connector.connect(),
        })
    }

    pub fn query(&mut self, query: &str, args: &[SqlArg]) -> Result<Cursor> {
        self.query_with_context(&ExecContext::background(), query, args)
    }

    pub fn query_with_context(
        &mut self,
        ctx: &ExecContext,
        query: &str,
        args: &[SqlArg],
    ) -> Result<Cursor> {
        let inner = self
            .runtime
            .block_on(self.inner.query_with_context(ctx, query, args))?;
        Ok(Cursor {
            runtime: Arc::clone(&self.runtime),
            inner,
            errored: false,
        })
    }

    pub fn execute(&mut self, query: &str, args: &[SqlArg]) -> Result<ExecResult> {
        self.execute_with_context(&ExecContext::background(), query, args)
    }

    pub fn execute_with_context(
        &mut self,
        ctx: &ExecContext,
        query: &str,
        args: &[SqlArg],
    ) -> Result<ExecResult> {
        self.runtime
            .block_on(self.inner.execute_with_context(ctx, query, args))
    }

    pub fn ping(&mut self) -> Result<()> {
        self.runtime.block_on(self.inner.ping())
    }

    pub fn prepare(&mut self, query: &str) -> Result<Statement<'_>> {
        let inner = self.inner.prepare(query)?;
        Ok(Statement {
            runtime: Arc::clone(&self.runtime),
            inner,
        })
    }

    pub fn begin(&mut self) -> Result<()> {
        self.inner.begin()
    }

    pub fn last_cost(&self) -> Option<CostReport> {
        self.inner.last_cost()
    }
}

pub struct Statement<'c> {
    runtime: Arc<Runtime>,
    inner: connection::Statement<'c>,
}

impl Statement<'_> {
    pub fn num_input(&self) -> usize {
        self.inner.num_input()
    }

    pub fn query(&mut self, args: &[SqlArg]) -> Result<Cursor> {
        let inner = self.runtime.block_on(self.inner.query(args))?;
        Ok(Cursor {
            runtime: Arc::clone(&self.runtime),
            inner,
            errored: false,
        })
    }

    pub fn execute(&mut self, args: &[SqlArg]) -> Result<ExecResult> {
        self.runtime.block_on(self.inner.execute(args))
    }

    pub fn close(&mut self) {
        self.inner.close();
    }
}

/// Blocking row iterator. Yields `Err` once for a failed page fetch, then ends.
///
/// The async cursor underneath keeps a failed page's token, so
/// [`Cursor::retry`] can resume iteration after a transient failure.
pub struct Cursor {
    runtime: Arc<Runtime>,
    inner: crate::data::Cursor,
    errored: bool,
}

impl Cursor {
    pub fn columns(&self) -> &[DataColumn] {
        self.inner.columns()
    }

    pub fn update_count(&self) -> Option<i64> {
        self.inner.update_count()
    }

    pub fn close(&mut self) {
        self.inner.close();
    }

    /// Whether iteration stopped on an error
    pub fn is_errored(&self) -> bool {
        self.errored
    }

    /// Resume after an error; the next item refetches the page that failed
    pub fn retry(&mut self) {
        self.errored = false;
    }

    pub fn into_inner(self) -> crate::data::Cursor {
        self.inner
    }
}

impl Iterator for Cursor {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.errored || self.inner.is_closed() {
            return None;
        }
        let item = self.runtime.block_on(self.inner.next()).transpose();
        if matches!(item, Some(Err(_))) {
            self.errored = true;
        }
        item
    }
}
