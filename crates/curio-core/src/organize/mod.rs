//! Library organization: classify, plan, back up, execute, roll back.

mod backup;
mod classify;
mod executor;
mod planner;

pub use backup::{BackupRecord, BackupStats, BackupStore};
pub use classify::{classify_base_model, Classification};
pub use executor::{ExecutionReport, OrganizeExecutor, OrganizeProgress, OrganizeState};
pub use planner::{LabelSummary, OrganizationMove, OrganizationPlan, OrganizePlanner, PlanConflict};
