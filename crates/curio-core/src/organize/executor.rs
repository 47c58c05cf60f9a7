//! Organization execution and rollback.
//!
//! Executing a plan is strictly backup-first: the record that makes exact
//! rollback possible is durably written before the first file moves. One
//! item's failure never stops the batch; partial success is an expected
//! outcome and is reported as such.

use crate::audit::AuditLog;
use crate::cancel::CancellationToken;
use crate::library::move_file;
use crate::metadata::{retarget_sidecar, sidecar_paths};
use crate::organize::backup::BackupStore;
use crate::organize::planner::{OrganizationMove, OrganizationPlan, OrganizePlanner};
use crate::{CurioError, LibraryGuard, Result};
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Observable phase of the organizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrganizeState {
    Idle,
    Planning,
    AwaitingConfirmation,
    BackingUp,
    Executing,
    Done,
    PartialFailure,
    Validating,
    AwaitingFix,
    Fixing,
}

/// Progress snapshot for a running execute/rollback pass.
#[derive(Debug, Clone)]
pub struct OrganizeProgress {
    pub completed: usize,
    pub total: usize,
    pub current: String,
}

/// Outcome summary of an execute or rollback pass.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub success: bool,
    pub completed: usize,
    pub total: usize,
    pub errors: Vec<String>,
    pub message: String,
}

impl ExecutionReport {
    fn finish(completed: usize, total: usize, errors: Vec<String>, verb: &str) -> Self {
        let message = if errors.is_empty() {
            format!("Successfully {} {} files", verb, completed)
        } else {
            format!("Completed with {} errors", errors.len())
        };
        Self {
            success: errors.is_empty(),
            completed,
            total,
            errors,
            message,
        }
    }

    fn cancelled(completed: usize, total: usize, errors: Vec<String>) -> Self {
        Self {
            success: false,
            completed,
            total,
            errors,
            message: "Cancelled by user".to_string(),
        }
    }
}

/// Executes organization plans against the filesystem.
pub struct OrganizeExecutor {
    backups: BackupStore,
    audit: AuditLog,
    /// Shared with the download queue: moves and downloads must not
    /// interleave on overlapping paths.
    library_guard: LibraryGuard,
    state: Mutex<OrganizeState>,
    /// Moves reported by the last validate pass, consumed by `fix`.
    pending_fix: Mutex<Option<Vec<OrganizationMove>>>,
}

impl OrganizeExecutor {
    pub fn new(data_dir: &std::path::Path, library_guard: LibraryGuard) -> Self {
        Self {
            backups: BackupStore::new(data_dir),
            audit: AuditLog::new(data_dir),
            library_guard,
            state: Mutex::new(OrganizeState::Idle),
            pending_fix: Mutex::new(None),
        }
    }

    pub fn state(&self) -> OrganizeState {
        *self.state.lock().unwrap()
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    fn set_state(&self, state: OrganizeState) {
        *self.state.lock().unwrap() = state;
    }

    /// Plan a reorganization, leaving the executor awaiting confirmation.
    pub async fn plan(
        &self,
        planner: &OrganizePlanner<'_>,
        roots: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<OrganizationPlan> {
        self.set_state(OrganizeState::Planning);
        let result = planner.plan(roots, cancel).await;
        match &result {
            Ok(_) => self.set_state(OrganizeState::AwaitingConfirmation),
            Err(_) => self.set_state(OrganizeState::Idle),
        }
        result
    }

    /// Read-only validation pass: reports misplaced files without moving
    /// anything. The reported moves are kept for a later `fix`.
    pub async fn validate(
        &self,
        planner: &OrganizePlanner<'_>,
        roots: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<OrganizationPlan> {
        self.set_state(OrganizeState::Validating);
        match planner.plan(roots, cancel).await {
            Ok(plan) => {
                *self.pending_fix.lock().unwrap() = Some(plan.moves.clone());
                self.set_state(OrganizeState::AwaitingFix);
                Ok(plan)
            }
            Err(e) => {
                self.set_state(OrganizeState::Idle);
                Err(e)
            }
        }
    }

    /// Execute only the moves reported by the previous `validate` pass.
    pub async fn fix(
        &self,
        cancel: &CancellationToken,
        progress_tx: Option<mpsc::Sender<OrganizeProgress>>,
    ) -> Result<ExecutionReport> {
        let moves = self
            .pending_fix
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| CurioError::Other("No validated plan to fix".into()))?;

        self.set_state(OrganizeState::Fixing);
        let mut plan = OrganizationPlan::default();
        for m in moves {
            let entry = plan.summary.entry(m.label.clone()).or_default();
            entry.count += 1;
            entry.size += m.size_bytes;
            plan.moves.push(m);
        }
        self.execute(&plan, cancel, progress_tx).await
    }

    /// Execute a plan: back up, then move every artifact with its sidecars.
    ///
    /// If the backup cannot be written, nothing is moved. Per-item failures
    /// are collected into the report; the batch always runs to the end
    /// unless cancelled.
    pub async fn execute(
        &self,
        plan: &OrganizationPlan,
        cancel: &CancellationToken,
        progress_tx: Option<mpsc::Sender<OrganizeProgress>>,
    ) -> Result<ExecutionReport> {
        let _library = self.library_guard.lock().await;

        // Backup-before-mutate: abort entirely if this fails
        self.set_state(OrganizeState::BackingUp);
        let backup = match self
            .backups
            .save(plan.moves.clone(), plan.summary.clone())
        {
            Ok(record) => record,
            Err(e) => {
                self.set_state(OrganizeState::Idle);
                return Err(e);
            }
        };
        self.audit.append(
            "organize_execute",
            serde_json::json!({
                "backup": backup.timestamp,
                "moves": plan.moves.len(),
            }),
        );

        self.set_state(OrganizeState::Executing);

        let total = plan.moves.len();
        let mut completed = 0;
        let mut errors = Vec::new();

        for move_info in &plan.moves {
            if cancel.is_cancelled() {
                self.set_state(OrganizeState::PartialFailure);
                return Ok(ExecutionReport::cancelled(completed, total, errors));
            }

            if let Some(ref tx) = progress_tx {
                let _ = tx.try_send(OrganizeProgress {
                    completed,
                    total,
                    current: move_info.display_name.clone(),
                });
            }

            match self.execute_move(move_info) {
                Ok(()) => completed += 1,
                Err(e) => {
                    let line = format!("Failed to move {}: {}", move_info.display_name, e);
                    warn!("{}", line);
                    errors.push(line);
                }
            }
        }

        let report = ExecutionReport::finish(completed, total, errors, "organized");
        self.set_state(if report.success {
            OrganizeState::Done
        } else {
            OrganizeState::PartialFailure
        });
        Ok(report)
    }

    fn execute_move(&self, move_info: &OrganizationMove) -> Result<()> {
        let source = &move_info.source;
        let target = &move_info.target;

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CurioError::io_with_path(e, parent))?;
        }

        // Never overwrite: a target that appeared since planning is skipped
        if target.exists() {
            debug!("Target already exists, skipping: {}", target.display());
            return Ok(());
        }

        let sidecars = sidecar_paths(source);
        move_file(source, target)?;

        for sidecar in sidecars {
            let Some(sidecar_target) = retarget_sidecar(&sidecar, source, target) else {
                continue;
            };
            if let Err(e) = move_file(&sidecar, &sidecar_target) {
                warn!("Could not move sidecar {}: {}", sidecar.display(), e);
            }
        }

        info!("Organized: {} -> {}/", move_info.display_name, move_info.label);
        Ok(())
    }

    /// Reverse the most recent backup's moves exactly (target -> source).
    ///
    /// A file missing at rollback time (moved or deleted by the user since)
    /// is a per-item error, not an abort. Label directories left empty are
    /// removed best-effort.
    pub async fn rollback(
        &self,
        cancel: &CancellationToken,
        progress_tx: Option<mpsc::Sender<OrganizeProgress>>,
    ) -> Result<ExecutionReport> {
        let _library = self.library_guard.lock().await;

        let backup = self.backups.latest().ok_or(CurioError::NoBackup)?;
        info!("Starting rollback of {} files ({})", backup.moves.len(), backup.timestamp);

        let total = backup.moves.len();
        let mut completed = 0;
        let mut errors = Vec::new();

        for move_info in &backup.moves {
            if cancel.is_cancelled() {
                return Ok(ExecutionReport::cancelled(completed, total, errors));
            }

            if let Some(ref tx) = progress_tx {
                let _ = tx.try_send(OrganizeProgress {
                    completed,
                    total,
                    current: move_info.display_name.clone(),
                });
            }

            // Reverse direction: the executed target goes back to the source
            let source = &move_info.target;
            let target = &move_info.source;

            if !source.exists() {
                errors.push(format!(
                    "File not found (may have been moved): {}",
                    move_info.display_name
                ));
                continue;
            }

            if target.exists() {
                errors.push(format!(
                    "Original location already occupied, skipping: {}",
                    move_info.display_name
                ));
                continue;
            }

            if let Some(parent) = target.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    errors.push(format!("Failed to restore {}: {}", move_info.display_name, e));
                    continue;
                }
            }

            let sidecars = sidecar_paths(source);
            match move_file(source, target) {
                Ok(()) => {
                    for sidecar in sidecars {
                        let Some(sidecar_target) = retarget_sidecar(&sidecar, source, target)
                        else {
                            continue;
                        };
                        if let Err(e) = move_file(&sidecar, &sidecar_target) {
                            warn!("Could not roll back sidecar {}: {}", sidecar.display(), e);
                        }
                    }
                    debug!("Rolled back: {}", move_info.display_name);
                    completed += 1;
                }
                Err(e) => {
                    errors.push(format!("Failed to rollback {}: {}", move_info.display_name, e));
                }
            }
        }

        // Remove classification folders the run created and left empty
        for move_info in &backup.moves {
            if let Some(folder) = move_info.target.parent() {
                let is_empty = std::fs::read_dir(folder)
                    .map(|mut entries| entries.next().is_none())
                    .unwrap_or(false);
                if is_empty {
                    if std::fs::remove_dir(folder).is_ok() {
                        info!("Removed empty folder: {}", folder.display());
                    }
                }
            }
        }

        self.audit.append(
            "organize_rollback",
            serde_json::json!({
                "backup": backup.timestamp,
                "completed": completed,
                "errors": errors.len(),
            }),
        );

        Ok(ExecutionReport::finish(completed, total, errors, "rolled back"))
    }
}
