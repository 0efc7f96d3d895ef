pub mod cost;
pub mod exec_context;
pub mod query_execution_service;

pub use cost::CostReport;
pub use exec_context::ExecContext;
pub use query_execution_service::QueryExecutionService;
