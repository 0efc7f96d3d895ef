use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::QueryExecution;

/// Smallest amount of data a query is billed for
pub const MIN_BILLED_BYTES: i64 = 10 * 1_000_000;

const BILLING_INCREMENT_BYTES: i64 = 1_000_000;

/// USD per terabyte scanned
pub const PRICE_PER_TB_USD: f64 = 5.0;

const BYTES_PER_TB: f64 = 1e12;

/// Bytes scanned by one execution and what that costs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostReport {
    pub execution_id: String,
    pub bytes_scanned: i64,
    pub cost_usd: f64,
}

impl CostReport {
    pub fn new(execution_id: impl Into<String>, bytes_scanned: i64) -> Self {
        Self {
            execution_id: execution_id.into(),
            bytes_scanned,
            cost_usd: estimate_cost_usd(bytes_scanned),
        }
    }

    /// Build from the most recent status snapshot; missing statistics count as zero
    pub fn from_execution(execution: &QueryExecution) -> Self {
        Self::new(
            execution.execution_id.clone(),
            execution.bytes_scanned.unwrap_or(0),
        )
    }

    pub fn emit(&self) {
        info!(
            target: "cost",
            query_id = %self.execution_id,
            bytes_scanned = self.bytes_scanned,
            cost_usd = self.cost_usd,
            "query cost"
        );
    }
}

/// Billed bytes round up to the next megabyte with a 10 MB floor.
/// Nothing scanned (cached results) costs nothing.
pub fn estimate_cost_usd(bytes_scanned: i64) -> f64 {
    if bytes_scanned <= 0 {
        return 0.0;
    }

    let billed = bytes_scanned.max(MIN_BILLED_BYTES);
    let billed = (billed + BILLING_INCREMENT_BYTES - 1) / BILLING_INCREMENT_BYTES * BILLING_INCREMENT_BYTES;
    billed as f64 / BYTES_PER_TB * PRICE_PER_TB_USD
}
