pub mod execute;
pub mod plan;

pub use execute::{execute, ExecutionLog, ExecutionMode, LogEntry, OperationOutcome};
pub use plan::{build_plan, PlanError, PlanOptions};
