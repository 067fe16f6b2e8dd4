use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use common::{join_relpath, now_secs, MoveOperation, Plan};
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    Preview,
    Execute,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationOutcome {
    /// Preview only: the operation would run.
    Planned,
    Applied,
    SkippedAlreadySatisfied,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub operation: MoveOperation,
    pub outcome: OperationOutcome,
    pub at: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionLog {
    pub entries: Vec<LogEntry>,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ExecutionLog {
    fn record(&mut self, operation: &MoveOperation, outcome: OperationOutcome) {
        match &outcome {
            OperationOutcome::Applied => self.applied += 1,
            OperationOutcome::SkippedAlreadySatisfied => self.skipped += 1,
            OperationOutcome::Failed(_) => self.failed += 1,
            OperationOutcome::Planned => {}
        }
        self.entries.push(LogEntry {
            operation: operation.clone(),
            outcome,
            at: now_secs(),
        });
    }
}

/// Applies a plan under the library root. Preview never touches the
/// filesystem. Execute runs operations in plan order; a failure is logged
/// and the remaining operations still run. Each move is a plain rename:
/// it either fully succeeds or leaves the source untouched, and an
/// existing destination is never overwritten.
pub fn execute(root: &Path, plan: &Plan, mode: ExecutionMode) -> ExecutionLog {
    let mut log = ExecutionLog::default();

    for operation in &plan.operations {
        if mode == ExecutionMode::Preview {
            log.record(operation, OperationOutcome::Planned);
            continue;
        }
        let outcome = apply(root, operation);
        log.record(operation, outcome);
    }

    if mode == ExecutionMode::Execute {
        cleanup_vacated_dirs(root, &log);
    }

    log
}

fn apply(root: &Path, operation: &MoveOperation) -> OperationOutcome {
    let source = join_relpath(root, &operation.source);
    let destination = join_relpath(root, &operation.destination);

    if source == destination {
        return OperationOutcome::SkippedAlreadySatisfied;
    }
    if !source.exists() {
        if destination.exists() {
            // A previous run already moved this file.
            return OperationOutcome::SkippedAlreadySatisfied;
        }
        return OperationOutcome::Failed("source no longer exists".to_string());
    }
    if destination.exists() {
        return OperationOutcome::Failed("destination already exists".to_string());
    }

    if let Some(parent) = destination.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            warn!("Failed to create {:?}: {}", parent, err);
            return OperationOutcome::Failed(format!("create dir failed: {}", err));
        }
    }

    match fs::rename(&source, &destination) {
        Ok(()) => {
            info!("Moved {} -> {}", operation.source, operation.destination);
            OperationOutcome::Applied
        }
        Err(err) => {
            warn!(
                "Failed to move {} -> {}: {}",
                operation.source, operation.destination, err
            );
            OperationOutcome::Failed(format!("rename failed: {}", err))
        }
    }
}

/// Removes source directories left empty by applied moves. Only empty
/// directories go; remove_dir refuses anything else.
fn cleanup_vacated_dirs(root: &Path, log: &ExecutionLog) {
    let mut parents = BTreeSet::new();
    for entry in &log.entries {
        if entry.outcome != OperationOutcome::Applied {
            continue;
        }
        if let Some((parent, _)) = entry.operation.source.rsplit_once('/') {
            parents.insert(parent.to_string());
        }
    }
    // Deepest first so nested empties collapse upward.
    let mut parents: Vec<String> = parents.into_iter().collect();
    parents.sort_by_key(|p| std::cmp::Reverse(p.matches('/').count()));

    for parent in parents {
        let abs = join_relpath(root, &parent);
        if fs::remove_dir(&abs).is_ok() {
            info!("Removed empty folder {}", parent);
        }
    }
}
