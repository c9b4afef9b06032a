//! Built-in steps: the synthetic endpoint steps and a closure wrapper.

use std::sync::{Mutex, PoisonError};

use tuyau_core::context::snapshot_variables;
use tuyau_core::{
    Access, PipelineContext, Result, Step, StepOutcome, VarAccess, VarSnapshot,
};

/// Records the context's declared variables every time it runs.
///
/// The synthetic root runs one named `Start` and the final node one named
/// `End`, so a rendered graph shows the inputs and outputs of the run.
pub struct SnapshotStep {
    name: String,
    comment: String,
    snapshot: Mutex<Vec<VarSnapshot>>,
}

impl SnapshotStep {
    pub fn new(name: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comment: comment.into(),
            snapshot: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn start() -> Self {
        Self::new("Start", "Pipeline inputs")
    }

    pub(crate) fn end() -> Self {
        Self::new("End", "Pipeline outputs")
    }

    /// Variables captured by the last run, empty before it.
    pub fn snapshot(&self) -> Vec<VarSnapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<C: PipelineContext> Step<C> for SnapshotStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn comment(&self) -> &str {
        &self.comment
    }

    fn run(&self, ctx: &C) -> Result<StepOutcome> {
        let vars = snapshot_variables(ctx);
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = vars;
        Ok(StepOutcome::Complete)
    }

    fn label(&self) -> String {
        let mut label = self.name.clone();
        for var in self.snapshot() {
            label.push_str(&format!("\n{}: {} = {}", var.name, var.type_name, var.value));
        }
        label
    }
}

type StepFn<C> = Box<dyn Fn(&C) -> Result<StepOutcome> + Send + Sync>;

/// A step backed by a closure.
pub struct FnStep<C> {
    name: String,
    comment: String,
    variables: Vec<VarAccess>,
    f: StepFn<C>,
}

impl<C: 'static> FnStep<C> {
    /// Wrap a closure that completes on `Ok`.
    pub fn new(
        name: impl Into<String>,
        f: impl Fn(&C) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self::with_outcome(name, move |ctx| f(ctx).map(|()| StepOutcome::Complete))
    }

    /// Wrap a closure that decides between completing and skipping.
    pub fn with_outcome(
        name: impl Into<String>,
        f: impl Fn(&C) -> Result<StepOutcome> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            comment: String::new(),
            variables: Vec::new(),
            f: Box::new(f),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Declare a variable access for hazard validation.
    pub fn uses(mut self, view: &impl Access) -> Self {
        self.variables.push(view.access());
        self
    }
}

impl<C: Send + Sync + 'static> Step<C> for FnStep<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn comment(&self) -> &str {
        &self.comment
    }

    fn variables(&self) -> Vec<VarAccess> {
        self.variables.clone()
    }

    fn run(&self, ctx: &C) -> Result<StepOutcome> {
        (self.f)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuyau_core::{AccessMode, PipeVar, TuyauError, VarHandle};

    struct Ctx {
        x: PipeVar<i32>,
    }

    impl PipelineContext for Ctx {
        fn variables(&self) -> Vec<&dyn VarHandle> {
            vec![&self.x]
        }
    }

    #[test]
    fn test_snapshot_step_captures_variables() {
        let ctx = Ctx {
            x: PipeVar::new("x", 3),
        };
        let step = SnapshotStep::start();
        assert!(Step::<Ctx>::label(&step).starts_with("Start"));
        assert_eq!(Step::<Ctx>::run(&step, &ctx).unwrap(), StepOutcome::Complete);

        let snapshot = step.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "x");
        assert_eq!(snapshot[0].value, "3");
        assert!(Step::<Ctx>::label(&step).contains("x: "));
    }

    #[test]
    fn test_fn_step_declares_accesses() {
        let x = PipeVar::new("x", 1);
        let y = PipeVar::<i32>::no_default("y");
        let (input, output) = (x.input(), y.output());
        let step = FnStep::new("double", move |_: &()| {
            output.set(input.get()? * 2);
            Ok(())
        })
        .with_comment("y = 2x")
        .uses(&x.input())
        .uses(&y.output());

        let modes: Vec<AccessMode> = step.variables().iter().map(|a| a.mode).collect();
        assert_eq!(modes, vec![AccessMode::Input, AccessMode::Output]);
        assert_eq!(step.label(), "double\ny = 2x");
        assert_eq!(step.run(&()).unwrap(), StepOutcome::Complete);
        assert_eq!(y.get().unwrap(), 2);
    }

    #[test]
    fn test_fn_step_propagates_errors() {
        let step = FnStep::new("boom", |_: &()| Err(TuyauError::step("boom", "bad input")));
        assert!(matches!(step.run(&()), Err(TuyauError::StepFailed { .. })));

        let skip = FnStep::with_outcome("maybe", |_: &()| Ok(StepOutcome::Skipped));
        assert_eq!(skip.run(&()).unwrap(), StepOutcome::Skipped);
    }
}
