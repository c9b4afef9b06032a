//! The arithmetic demo pipeline.
//!
//! ```text
//!            +-> node 1 ---------------------------+
//!   root ----+                                     +-> node 6 -> final
//!            +-> node 2 -+-> node 3 -+-> node 5 ---+
//!                        +-> node 4 -+
//! ```

use serde::{Deserialize, Serialize};
use tracing::info;

use tuyau_core::{
    Access, EngineConfig, InOut, Input, Output, PipeVar, PipelineContext, Result, Step,
    StepOutcome, VarAccess, VarHandle,
};
use tuyau_engine::{FnStep, Node, Pipeline, PipelineBuilder};

/// `[demo]` section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    #[serde(default = "default_x")]
    pub x: f64,
    #[serde(default = "default_y")]
    pub y: f64,
    /// Worker threads; `0` defers to `engine.default_thread_count`.
    #[serde(default)]
    pub threads: usize,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            x: default_x(),
            y: default_y(),
            threads: 0,
        }
    }
}

fn default_x() -> f64 {
    2.0
}

fn default_y() -> f64 {
    3.0
}

/// Whole config file for the binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub demo: DemoConfig,
}

pub struct DemoContext {
    threads: usize,
    pub input_x: PipeVar<f64>,
    pub input_y: PipeVar<f64>,
    pub result_step1: PipeVar<f64>,
    pub result_step3: PipeVar<f64>,
    pub result_step4: PipeVar<f64>,
    pub result_step5: PipeVar<f64>,
    pub result_step6: PipeVar<f64>,
}

impl DemoContext {
    pub fn new(config: &DemoConfig) -> Self {
        Self {
            threads: config.threads,
            input_x: PipeVar::new("input_x", config.x),
            input_y: PipeVar::new("input_y", config.y),
            result_step1: PipeVar::no_default("result_step1"),
            result_step3: PipeVar::no_default("result_step3"),
            result_step4: PipeVar::no_default("result_step4"),
            result_step5: PipeVar::no_default("result_step5"),
            result_step6: PipeVar::no_default("result_step6"),
        }
    }
}

impl PipelineContext for DemoContext {
    fn thread_count(&self) -> usize {
        self.threads
    }

    fn variables(&self) -> Vec<&dyn VarHandle> {
        vec![
            &self.input_x,
            &self.input_y,
            &self.result_step1,
            &self.result_step3,
            &self.result_step4,
            &self.result_step5,
            &self.result_step6,
        ]
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Op {
    Add,
    Multiply,
}

impl Op {
    fn apply(self, x: f64, y: f64) -> f64 {
        match self {
            Op::Add => x + y,
            Op::Multiply => x * y,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Multiply => "*",
        }
    }
}

/// `res = x <op> y`. The result may alias an operand.
pub struct ArithmeticStep {
    name: String,
    op: Op,
    x: Input<f64>,
    y: Input<f64>,
    res: Output<f64>,
    aliased: Option<InOut<f64>>,
}

impl ArithmeticStep {
    pub fn new(
        name: impl Into<String>,
        op: Op,
        x: &PipeVar<f64>,
        y: &PipeVar<f64>,
        res: &PipeVar<f64>,
    ) -> Self {
        let aliased = (res.id() == x.id() || res.id() == y.id()).then(|| res.inout());
        Self {
            name: name.into(),
            op,
            x: x.input(),
            y: y.input(),
            res: res.output(),
            aliased,
        }
    }
}

impl Step<DemoContext> for ArithmeticStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn comment(&self) -> &str {
        match self.op {
            Op::Add => "Add two numbers",
            Op::Multiply => "Multiply two numbers",
        }
    }

    fn variables(&self) -> Vec<VarAccess> {
        match &self.aliased {
            Some(inout) => {
                let mut vars = vec![inout.access()];
                vars.extend(
                    [self.x.access(), self.y.access()]
                        .into_iter()
                        .filter(|a| a.var != inout.access().var),
                );
                vars
            }
            None => vec![self.x.access(), self.y.access(), self.res.access()],
        }
    }

    fn run(&self, _ctx: &DemoContext) -> Result<StepOutcome> {
        let (x, y) = (self.x.get()?, self.y.get()?);
        let value = self.op.apply(x, y);
        self.res.set(value);
        info!(step = %self.name, "{x} {} {y} = {value}", self.op.symbol());
        Ok(StepOutcome::Complete)
    }
}

fn log_step(name: &str, var: &PipeVar<f64>) -> FnStep<DemoContext> {
    let input = var.input();
    let step_name = name.to_string();
    FnStep::new(name, move |_: &DemoContext| {
        let value = input.get()?;
        info!(step = %step_name, variable = %input.name(), value, "Printing the field value");
        Ok(())
    })
    .with_comment("Print a field")
    .uses(&var.input())
}

fn skip_step(name: &str) -> FnStep<DemoContext> {
    let step_name = name.to_string();
    FnStep::with_outcome(name, move |_: &DemoContext| {
        info!(step = %step_name, "Skipping");
        Ok(StepOutcome::Skipped)
    })
    .with_comment("Skipped step")
}

/// Assemble the six-node demo over `ctx`'s variables.
pub fn build(ctx: &DemoContext, engine: EngineConfig) -> Result<Pipeline<DemoContext>> {
    use Op::{Add, Multiply};

    let mut builder = PipelineBuilder::new("Example Pipeline").with_config(engine);

    let node1 = builder.add_node(
        Node::new("Process node 1")
            .with_step(ArithmeticStep::new("Step 1.1", Add, &ctx.input_x, &ctx.input_y, &ctx.result_step1))
            .with_step(log_step("Step 1.2", &ctx.result_step1))
            .with_step(ArithmeticStep::new(
                "Step 1.3",
                Multiply,
                &ctx.result_step1,
                &ctx.result_step1,
                &ctx.result_step1,
            )),
    );
    let node2 = builder.add_node(Node::new("Process node 2").with_step(skip_step("Skip step 2")));
    let node3 = builder.add_node(
        Node::new("Process node 3")
            .with_step(ArithmeticStep::new("Step 3.1", Add, &ctx.input_x, &ctx.input_y, &ctx.result_step3)),
    );
    let node4 = builder.add_node(
        Node::new("Process node 4")
            .with_step(ArithmeticStep::new("Step 4.1", Multiply, &ctx.input_x, &ctx.input_y, &ctx.result_step4)),
    );
    let node5 = builder.add_node(
        Node::new("Process node 5")
            .with_step(ArithmeticStep::new("Step 5.1", Add, &ctx.result_step3, &ctx.result_step4, &ctx.result_step5)),
    );
    let node6 = builder.add_node(
        Node::new("Process node 6")
            .with_step(ArithmeticStep::new("Step 6.1", Multiply, &ctx.result_step3, &ctx.result_step5, &ctx.result_step6))
            .with_step(log_step("Final logging!", &ctx.result_step6)),
    );

    builder
        .start_nodes([node1, node2])?
        .add_children_to(node2, [node3, node4])?
        .add_parents_to(node5, [node3, node4])?
        .add_parents_to(node6, [node5, node1])?;

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tuyau_core::Status;

    #[test]
    fn test_demo_pipeline_runs() {
        let ctx = Arc::new(DemoContext::new(&DemoConfig::default()));
        let pipeline = build(&ctx, EngineConfig::default()).unwrap();
        pipeline.execute(Arc::clone(&ctx)).unwrap();

        assert!(pipeline.is_complete());
        assert!(pipeline.runtime_error().is_none());
        // x = 2, y = 3
        assert_eq!(ctx.result_step1.get().unwrap(), 25.0);
        assert_eq!(ctx.result_step3.get().unwrap(), 5.0);
        assert_eq!(ctx.result_step4.get().unwrap(), 6.0);
        assert_eq!(ctx.result_step5.get().unwrap(), 11.0);
        assert_eq!(ctx.result_step6.get().unwrap(), 55.0);

        let node2 = pipeline.node_by_name("Process node 2").unwrap();
        assert_eq!(node2.status(), Status::Complete);
        assert_eq!(node2.steps()[0].status(), Status::Skipped);
    }

    #[test]
    fn test_aliased_result_declared_once() {
        let ctx = DemoContext::new(&DemoConfig::default());
        let step = ArithmeticStep::new("sq", Op::Multiply, &ctx.result_step1, &ctx.result_step1, &ctx.result_step1);
        let vars = step.variables();
        assert_eq!(vars.len(), 1);
        assert!(vars[0].mode.reads() && vars[0].mode.writes());
    }
}
