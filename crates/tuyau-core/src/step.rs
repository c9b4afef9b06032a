//! The step contract and the per-step runtime record.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use tracing::{debug, error};

use crate::error::{Result, TuyauError};
use crate::status::{Status, StatusCell};
use crate::types::StepId;
use crate::var::VarAccess;

/// Terminal outcome of a successful step run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Complete,
    Skipped,
}

impl From<StepOutcome> for Status {
    fn from(outcome: StepOutcome) -> Self {
        match outcome {
            StepOutcome::Complete => Status::Complete,
            StepOutcome::Skipped => Status::Skipped,
        }
    }
}

/// A unit of work attached to exactly one node.
///
/// `run` either returns a passed outcome or an error. A panic inside `run`
/// is treated exactly like a returned error. Steps are never retried.
pub trait Step<C>: Send + Sync + 'static {
    /// Display name.
    fn name(&self) -> &str;

    /// Free-text comment shown under the name in labels.
    fn comment(&self) -> &str {
        ""
    }

    /// Shared Variables this step reads or writes, with their intent.
    fn variables(&self) -> Vec<VarAccess> {
        Vec::new()
    }

    /// Perform the work.
    fn run(&self, ctx: &C) -> Result<StepOutcome>;

    /// Label for the visualization hook.
    fn label(&self) -> String {
        if self.comment().is_empty() {
            self.name().to_string()
        } else {
            format!("{}\n{}", self.name(), self.comment())
        }
    }
}

/// A step together with its status and captured error.
pub struct StepCell<C> {
    id: StepId,
    step: Box<dyn Step<C>>,
    status: StatusCell,
    error: OnceLock<Arc<TuyauError>>,
}

impl<C: 'static> StepCell<C> {
    pub fn new(step: Box<dyn Step<C>>) -> Self {
        Self {
            id: StepId::new(),
            step,
            status: StatusCell::new(),
            error: OnceLock::new(),
        }
    }

    pub fn id(&self) -> StepId {
        self.id
    }

    pub fn step(&self) -> &dyn Step<C> {
        self.step.as_ref()
    }

    pub fn status(&self) -> Status {
        self.status.get()
    }

    pub fn error(&self) -> Option<Arc<TuyauError>> {
        self.error.get().cloned()
    }

    /// Run the step on the current thread and record its terminal status.
    pub fn execute(&self, ctx: &C) -> Status {
        let name = self.step.name();
        self.status.transition(Status::Running);

        let result = match catch_unwind(AssertUnwindSafe(|| self.step.run(ctx))) {
            Ok(result) => result,
            Err(payload) => Err(TuyauError::StepPanicked {
                step: name.to_string(),
                message: panic_message(payload.as_ref()),
            }),
        };

        match result {
            Ok(outcome) => {
                debug!(step = %name, outcome = ?outcome, "Step finished");
                self.status.transition(outcome.into());
            }
            Err(e) => {
                error!(step = %name, error = %e, "Step failed");
                let _ = self.error.set(Arc::new(e));
                self.status.transition(Status::Error);
            }
        }
        self.status.get()
    }
}

/// Text of a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
