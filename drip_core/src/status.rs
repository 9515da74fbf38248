//! Process identity and the per-tick status returned by the controller.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessKind {
    Dispense,
    Calibration,
    Drain,
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dispense => "dispense",
            Self::Calibration => "calibration",
            Self::Drain => "drain",
        })
    }
}

/// Result of one control-loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    /// No process was active.
    Idle,
    /// A process ran this tick and is still active.
    Running(ProcessKind),
    /// A process closed during this tick (target reached, timeout or deactivation).
    Finished(ProcessKind),
}

impl TickStatus {
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running(_))
    }
}
