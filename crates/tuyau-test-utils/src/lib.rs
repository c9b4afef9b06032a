//! Shared fixtures for tuyau tests: instrumented steps and a small context.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tuyau_core::{
    Access, PipeVar, PipelineContext, Result, Step, StepOutcome, TuyauError, VarAccess, VarHandle,
};

type Action = Box<dyn Fn() -> Result<()> + Send + Sync>;

/// Step that counts its runs and can declare variable accesses.
pub struct ProbeStep {
    name: String,
    runs: Arc<AtomicUsize>,
    variables: Vec<VarAccess>,
    action: Option<Action>,
}

impl ProbeStep {
    pub fn new(name: impl Into<String>) -> Self {
        Self::counting(name, &Arc::new(AtomicUsize::new(0)))
    }

    /// Share a run counter with the caller.
    pub fn counting(name: impl Into<String>, runs: &Arc<AtomicUsize>) -> Self {
        Self {
            name: name.into(),
            runs: Arc::clone(runs),
            variables: Vec::new(),
            action: None,
        }
    }

    pub fn declaring(mut self, view: &impl Access) -> Self {
        self.variables.push(view.access());
        self
    }

    /// Run `f` after counting.
    pub fn with_action(mut self, f: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        self.action = Some(Box::new(f));
        self
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.runs)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl<C: Send + Sync + 'static> Step<C> for ProbeStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn variables(&self) -> Vec<VarAccess> {
        self.variables.clone()
    }

    fn run(&self, _ctx: &C) -> Result<StepOutcome> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Some(action) = &self.action {
            action()?;
        }
        Ok(StepOutcome::Complete)
    }
}

/// Step that always returns a `StepFailed` error.
pub struct FailStep {
    name: String,
    message: String,
}

impl FailStep {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl<C: Send + Sync + 'static> Step<C> for FailStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, _ctx: &C) -> Result<StepOutcome> {
        Err(TuyauError::step(&self.name, &self.message))
    }
}

/// Step that panics.
pub struct PanicStep(pub String);

impl<C: Send + Sync + 'static> Step<C> for PanicStep {
    fn name(&self) -> &str {
        &self.0
    }

    fn run(&self, _ctx: &C) -> Result<StepOutcome> {
        panic!("{} blew up", self.0)
    }
}

/// Step that reports itself skipped.
pub struct SkipStep(pub String);

impl<C: Send + Sync + 'static> Step<C> for SkipStep {
    fn name(&self) -> &str {
        &self.0
    }

    fn run(&self, _ctx: &C) -> Result<StepOutcome> {
        Ok(StepOutcome::Skipped)
    }
}

/// Context with a few integer variables for diamond-shaped tests.
pub struct TestContext {
    pub threads: usize,
    pub left: PipeVar<i64>,
    pub right: PipeVar<i64>,
    pub total: PipeVar<i64>,
}

impl TestContext {
    pub fn with_threads(threads: usize) -> Self {
        Self {
            threads,
            ..Self::default()
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self {
            threads: 4,
            left: PipeVar::no_default("left"),
            right: PipeVar::no_default("right"),
            total: PipeVar::no_default("total"),
        }
    }
}

impl PipelineContext for TestContext {
    fn thread_count(&self) -> usize {
        self.threads
    }

    fn variables(&self) -> Vec<&dyn VarHandle> {
        vec![&self.left, &self.right, &self.total]
    }
}
