use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Lifecycle state shared by steps and nodes.
///
/// `Unknown -> Running -> {Complete, Skipped, Error, ConditionFailed}`.
/// `Running` is observational and may be skipped. Terminal states are sticky.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Status {
    Unknown = 0,
    Running = 1,
    Complete = 2,
    Skipped = 3,
    Error = 4,
    /// A node guard evaluated to false (soft skip). Never used for steps.
    ConditionFailed = 5,
}

impl Status {
    /// `Complete` or `Skipped`.
    pub fn is_passed(self) -> bool {
        matches!(self, Status::Complete | Status::Skipped)
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Unknown | Status::Running)
    }

    /// Whether a node that ended in this state notifies its children.
    pub fn releases_children(self) -> bool {
        self.is_passed() || self == Status::ConditionFailed
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Status::Running,
            2 => Status::Complete,
            3 => Status::Skipped,
            4 => Status::Error,
            5 => Status::ConditionFailed,
            _ => Status::Unknown,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Unknown => "unknown",
            Status::Running => "running",
            Status::Complete => "complete",
            Status::Skipped => "skipped",
            Status::Error => "error",
            Status::ConditionFailed => "condition_failed",
        };
        f.write_str(s)
    }
}

/// Lock-free holder of a [`Status`] enforcing the forward-only state machine.
#[derive(Debug, Default)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(Status::Unknown as u8))
    }

    pub fn get(&self) -> Status {
        Status::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `next`. Returns `false` (and changes nothing) when the current
    /// state is terminal or `next` is `Unknown`.
    pub fn transition(&self, next: Status) -> bool {
        if next == Status::Unknown {
            return false;
        }
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                if Status::from_u8(raw).is_terminal() {
                    None
                } else {
                    Some(next as u8)
                }
            })
            .is_ok()
    }
}
