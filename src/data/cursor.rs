//! Row cursor over one logical result set spanning any number of pages
//!
//! Pages are fetched lazily: the next page is requested only when the rows of
//! the current one are used up. The header row some result encodings repeat
//! as data is dropped from the first page only.

use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use crate::api::{QueryService, ResultPage};
use crate::data::datatable::{DataColumn, Row};
use crate::error::{DriverError, Result};

pub struct Cursor {
    source: Option<PageSource>,
    columns: Vec<DataColumn>,
    rows: VecDeque<Vec<Option<String>>>,
    next_token: Option<String>,
    update_count: Option<i64>,
    /// Set when a loaded page broke the column count; the result set can't be trusted past it
    arity_failure: Option<(usize, usize)>,
    closed: bool,
}

struct PageSource {
    service: Arc<dyn QueryService>,
    execution_id: String,
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("execution_id", &self.execution_id())
            .field("columns", &self.columns)
            .field("buffered_rows", &self.rows.len())
            .field("next_token", &self.next_token)
            .field("update_count", &self.update_count)
            .field("arity_failure", &self.arity_failure)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Cursor {
    /// Fetch the first page of a finished execution's results
    pub async fn open(service: Arc<dyn QueryService>, execution_id: impl Into<String>) -> Result<Self> {
        let execution_id = execution_id.into();
        let page = service.get_results_page(&execution_id, None).await?;
        debug!(
            target: "query",
            query_id = %execution_id,
            rows = page.rows.len(),
            has_more = !page.is_last(),
            "fetched first result page"
        );

        let skip_header = page.starts_with_header_row();
        let mut cursor = Self::from_first_page(page, skip_header)?;
        cursor.source = Some(PageSource {
            service,
            execution_id,
        });
        Ok(cursor)
    }

    /// Cursor over a single, locally built page (pseudo-command answers)
    pub fn from_page(page: ResultPage) -> Result<Self> {
        Self::from_first_page(page, false)
    }

    fn from_first_page(page: ResultPage, skip_header: bool) -> Result<Self> {
        let columns: Vec<DataColumn> = page.columns.iter().map(DataColumn::from).collect();
        validate_arity(&page, columns.len())?;

        let mut rows: VecDeque<_> = page.rows.into();
        if skip_header {
            rows.pop_front();
        }

        Ok(Self {
            source: None,
            columns,
            rows,
            next_token: page.next_token,
            update_count: page.update_count,
            arity_failure: None,
            closed: false,
        })
    }

    pub fn columns(&self) -> &[DataColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn execution_id(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.execution_id.as_str())
    }

    /// Rows affected, for statements that don't produce a row set
    pub fn update_count(&self) -> Option<i64> {
        self.update_count
    }

    /// A count-only result: no columns, only an update count
    pub fn is_update_count(&self) -> bool {
        self.columns.is_empty() && self.update_count.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Next row, `Ok(None)` once the last page is exhausted.
    ///
    /// A page with the wrong column count fails this and every later call.
    pub async fn next(&mut self) -> Result<Option<Row>> {
        if self.closed {
            return Err(DriverError::CursorClosed);
        }
        if let Some((expected, found)) = self.arity_failure {
            return Err(DriverError::ColumnArityMismatch { expected, found });
        }

        loop {
            if let Some(cells) = self.rows.pop_front() {
                return Ok(Some(Row::from_cells(cells, &self.columns)));
            }

            let Some(token) = self.next_token.take() else {
                return Ok(None);
            };
            self.fetch_page(token).await?;
        }
    }

    async fn fetch_page(&mut self, token: String) -> Result<()> {
        let Some(source) = self.source.as_ref() else {
            // Local pages never carry a continuation
            return Ok(());
        };

        let page = match source
            .service
            .get_results_page(&source.execution_id, Some(token.as_str()))
            .await
        {
            Ok(page) => page,
            Err(e) => {
                // Keep the token so a retry of next() asks for the same page
                self.next_token = Some(token);
                return Err(e.into());
            }
        };
        debug!(
            target: "query",
            query_id = %source.execution_id,
            token = %token,
            rows = page.rows.len(),
            has_more = !page.is_last(),
            "fetched result page"
        );

        if let Err(e) = validate_arity(&page, self.columns.len()) {
            if let DriverError::ColumnArityMismatch { expected, found } = e {
                self.arity_failure = Some((expected, found));
            }
            return Err(e);
        }
        self.rows.extend(page.rows);
        self.next_token = page.next_token;
        Ok(())
    }

    /// Drain every remaining row
    pub async fn fetch_all(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Release buffered rows and the page source. Always succeeds.
    pub fn close(&mut self) {
        self.closed = true;
        self.rows.clear();
        self.next_token = None;
        self.source = None;
    }
}

fn validate_arity(page: &ResultPage, expected: usize) -> Result<()> {
    match page.rows.iter().find(|row| row.len() != expected) {
        Some(row) => Err(DriverError::ColumnArityMismatch {
            expected,
            found: row.len(),
        }),
        None => Ok(()),
    }
}
