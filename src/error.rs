//! Process-startup error taxonomy. Distinct from `types::FaultKind`, which
//! is a latched runtime motor-safety state owned by the supervisor; these
//! variants only ever surface before the control loops start running.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RtSetupError {
    #[error("mlockall failed: {0}")]
    MemLock(#[source] nix::Error),

    #[error("sched_setaffinity failed: {0}")]
    Affinity(#[source] nix::Error),

    #[error("sched_setscheduler(SCHED_FIFO, {priority}) failed: {source}")]
    Scheduler {
        priority: i32,
        #[source]
        source: nix::Error,
    },
}
