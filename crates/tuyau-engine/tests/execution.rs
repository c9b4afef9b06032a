use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tuyau_core::{Status, StepOutcome, TuyauError};
use tuyau_engine::{Condition, Dispatch, FnStep, Node, PipelineBuilder};
use tuyau_test_utils::{FailStep, PanicStep, ProbeStep, SkipStep, TestContext};

fn diamond(
    ctx: &TestContext,
) -> (
    tuyau_engine::Pipeline<TestContext>,
    [tuyau_core::NodeId; 3],
    Arc<AtomicUsize>,
) {
    let c_runs = Arc::new(AtomicUsize::new(0));
    let mut builder = PipelineBuilder::new("diamond");
    let a = builder.add_node(Node::new("A").with_step(
        FnStep::new("write left", |ctx: &TestContext| {
            ctx.left.set(2);
            Ok(())
        })
        .uses(&ctx.left.output()),
    ));
    let b = builder.add_node(Node::new("B").with_step(
        FnStep::new("write right", |ctx: &TestContext| {
            ctx.right.set(3);
            Ok(())
        })
        .uses(&ctx.right.output()),
    ));
    let counter = Arc::clone(&c_runs);
    let c = builder.add_node(Node::new("C").with_step(
        FnStep::new("sum", move |ctx: &TestContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            ctx.total.set(ctx.left.get()? + ctx.right.get()?);
            Ok(())
        })
        .uses(&ctx.left.input())
        .uses(&ctx.right.input())
        .uses(&ctx.total.output()),
    ));
    builder.link([a, b], c).unwrap();
    (builder.build().unwrap(), [a, b, c], c_runs)
}

#[test]
fn test_diamond_barrier_waits_for_every_parent() {
    let ctx = TestContext::default();
    let (pipeline, [a, b, c], c_runs) = diamond(&ctx);

    match pipeline.notify(&ctx, pipeline.root()).unwrap() {
        Dispatch::Release(children) => {
            assert!(children.contains(&a) && children.contains(&b));
        }
        other => panic!("root did not release its children: {other:?}"),
    }

    assert_eq!(pipeline.notify(&ctx, a).unwrap(), Dispatch::Release(vec![c]));
    assert_eq!(pipeline.notify(&ctx, c).unwrap(), Dispatch::Waiting);
    assert_eq!(pipeline.node(c).unwrap().status(), Status::Unknown);
    assert_eq!(c_runs.load(Ordering::SeqCst), 0);

    pipeline.notify(&ctx, b).unwrap();
    assert_eq!(
        pipeline.notify(&ctx, c).unwrap(),
        Dispatch::Release(vec![pipeline.final_node()])
    );
    assert_eq!(c_runs.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.node(c).unwrap().status(), Status::Complete);
    assert_eq!(ctx.total.get().unwrap(), 5);
}

#[test]
fn test_diamond_end_to_end_sees_both_writes() {
    let ctx = Arc::new(TestContext::default());
    let (pipeline, [_, _, c], c_runs) = diamond(&ctx);

    pipeline.execute(Arc::clone(&ctx)).unwrap();

    assert!(pipeline.is_complete());
    assert!(pipeline.runtime_error().is_none());
    assert_eq!(c_runs.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.node(c).unwrap().status(), Status::Complete);
    assert_eq!(ctx.total.get().unwrap(), 5);
}

#[test]
fn test_condition_failure_is_a_soft_skip() {
    let downstream = ProbeStep::new("downstream");
    let runs = downstream.counter();
    let mut builder = PipelineBuilder::<TestContext>::new("guarded");
    let guarded = builder.add_node(
        Node::new("guarded")
            .with_step(ProbeStep::new("never"))
            .with_condition(Condition::when("feature enabled", || false)),
    );
    let child = builder.add_node(Node::new("child").with_step(downstream));
    builder.add_child_to(guarded, child).unwrap();
    builder.when(child, !Condition::passed(guarded)).unwrap();
    let pipeline = builder.build().unwrap();

    pipeline.execute(Arc::new(TestContext::default())).unwrap();

    let node = pipeline.node(guarded).unwrap();
    assert_eq!(node.status(), Status::ConditionFailed);
    assert!(node.executed());
    assert_eq!(node.steps()[0].status(), Status::Unknown);
    match node.error().as_deref() {
        Some(TuyauError::ConditionFailed { node, failed }) => {
            assert_eq!(node, "guarded");
            assert_eq!(failed, &vec!["feature enabled".to_string()]);
        }
        other => panic!("expected a condition error, got {other:?}"),
    }

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.node(child).unwrap().status(), Status::Complete);
    assert!(pipeline.is_complete());
    assert!(pipeline.runtime_error().is_none());
}

#[test]
fn test_status_condition_reads_parent_outcome() {
    let mut builder = PipelineBuilder::<TestContext>::new("status");
    let skipped = builder.add_node(Node::new("skipper").with_step(SkipStep("skip".into())));
    let check = builder.add_node(Node::new("check").with_step(ProbeStep::new("probe")));
    builder.add_child_to(skipped, check).unwrap();
    builder
        .when(
            check,
            Condition::all([
                Condition::passed(skipped),
                Condition::status(skipped, Status::Complete),
            ]),
        )
        .unwrap();
    let pipeline = builder.build().unwrap();

    pipeline.execute(Arc::new(TestContext::default())).unwrap();

    let skipper = pipeline.node(skipped).unwrap();
    assert_eq!(skipper.status(), Status::Complete);
    assert_eq!(skipper.steps()[0].status(), Status::Skipped);
    assert_eq!(pipeline.node(check).unwrap().status(), Status::Complete);
    assert!(pipeline.node(check).unwrap().condition_results().iter().all(|r| r.passed));
}

#[test]
fn test_error_stops_only_its_branch() {
    let mut builder = PipelineBuilder::<TestContext>::new("isolation");
    let a = builder.add_node(Node::new("A").with_step(ProbeStep::new("slow fail").with_action(|| {
        std::thread::sleep(Duration::from_millis(50));
        Err(TuyauError::step("slow fail", "boom"))
    })));
    let after_a = ProbeStep::new("after A");
    let after_a_runs = after_a.counter();
    let a_child = builder.add_node(Node::new("after A").with_step(after_a));
    builder.add_child_to(a, a_child).unwrap();
    let b = builder.add_node(Node::new("B").with_step(ProbeStep::new("ok")));
    let pipeline = builder.build().unwrap();

    pipeline.execute(Arc::new(TestContext::default())).unwrap();

    let node_a = pipeline.node(a).unwrap();
    assert_eq!(node_a.status(), Status::Error);
    let captured = pipeline.runtime_error().unwrap();
    assert!(Arc::ptr_eq(&captured, &node_a.error().unwrap()));
    assert!(captured.to_string().contains("boom"));

    assert_eq!(pipeline.node(b).unwrap().status(), Status::Complete);
    assert_eq!(after_a_runs.load(Ordering::SeqCst), 0);
    assert_eq!(pipeline.node(a_child).unwrap().status(), Status::Unknown);
    assert!(!pipeline.is_complete());
}

#[test]
fn test_steps_run_in_order_and_stop_at_first_error() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let step = |name: &'static str| {
        let log = Arc::clone(&log);
        FnStep::new(name, move |_: &TestContext| {
            log.lock().unwrap().push(name);
            Ok(())
        })
    };
    let mut builder = PipelineBuilder::<TestContext>::new("ordered");
    let node = builder.add_node(
        Node::new("sequence")
            .with_step(step("first"))
            .with_step(step("second"))
            .with_step(FailStep::new("third", "bad"))
            .with_step(step("fourth")),
    );
    let pipeline = builder.build().unwrap();

    pipeline.execute(Arc::new(TestContext::default())).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    let steps = pipeline.node(node).unwrap().steps();
    assert_eq!(steps[2].status(), Status::Error);
    assert_eq!(steps[3].status(), Status::Unknown);
    assert!(matches!(
        pipeline.runtime_error().as_deref(),
        Some(TuyauError::StepFailed { step, .. }) if step == "third"
    ));
}

#[test]
fn test_panicking_step_becomes_node_error() {
    let mut builder = PipelineBuilder::<TestContext>::new("panics");
    let node = builder.add_node(Node::new("unstable").with_step(PanicStep("explode".into())));
    let pipeline = builder.build().unwrap();

    pipeline.execute(Arc::new(TestContext::default())).unwrap();

    assert_eq!(pipeline.node(node).unwrap().status(), Status::Error);
    assert!(matches!(
        pipeline.runtime_error().as_deref(),
        Some(TuyauError::StepPanicked { message, .. }) if message.contains("blew up")
    ));
}

#[test]
fn test_panicking_condition_terminates_the_run() {
    let after = ProbeStep::new("after");
    let after_runs = after.counter();
    let mut builder = PipelineBuilder::<TestContext>::new("guard panics");
    let guarded = builder.add_node(
        Node::new("guarded")
            .with_step(ProbeStep::new("never"))
            .with_condition(Condition::when("explodes", || panic!("guard blew up"))),
    );
    let child = builder.add_node(Node::new("child").with_step(after));
    builder.add_child_to(guarded, child).unwrap();
    let pipeline = builder.build().unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    let runner = pipeline.clone();
    std::thread::spawn(move || {
        let result = runner.execute(Arc::new(TestContext::default()));
        let _ = tx.send(result.is_ok());
    });
    let finished = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("execute returned after a guard panic");
    assert!(finished);

    let node = pipeline.node(guarded).unwrap();
    assert_eq!(node.status(), Status::Error);
    assert!(node.executed());
    assert_eq!(node.steps()[0].status(), Status::Unknown);
    assert!(matches!(
        pipeline.runtime_error().as_deref(),
        Some(TuyauError::ConditionPanicked { node, message })
            if node == "guarded" && message.contains("guard blew up")
    ));
    assert_eq!(after_runs.load(Ordering::SeqCst), 0);
    assert!(!pipeline.is_complete());
}

#[test]
fn test_redispatch_of_resolved_node_is_a_noop() {
    let probe = ProbeStep::new("once");
    let runs = probe.counter();
    let mut builder = PipelineBuilder::<TestContext>::new("idempotent");
    let node = builder.add_node(Node::new("once").with_step(probe));
    let pipeline = builder.build().unwrap();
    let ctx = Arc::new(TestContext::default());

    pipeline.execute(Arc::clone(&ctx)).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    assert_eq!(pipeline.notify(&ctx, node).unwrap(), Dispatch::Resolved);
    assert_eq!(pipeline.notify(&ctx, pipeline.root()).unwrap(), Dispatch::Resolved);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.node(node).unwrap().status(), Status::Complete);
}

#[test]
fn test_second_execute_is_rejected() {
    let pipeline = PipelineBuilder::<TestContext>::new("once").build().unwrap();
    let ctx = Arc::new(TestContext::default());
    pipeline.execute(Arc::clone(&ctx)).unwrap();
    assert!(matches!(
        pipeline.execute(ctx),
        Err(TuyauError::AlreadyExecuted)
    ));
}

#[test]
fn test_first_error_wins() {
    let mut builder = PipelineBuilder::<TestContext>::new("two failures");
    builder.add_node(Node::new("left").with_step(FailStep::new("left", "left failed")));
    builder.add_node(Node::new("right").with_step(FailStep::new("right", "right failed")));
    let pipeline = builder.build().unwrap();

    pipeline.execute(Arc::new(TestContext::with_threads(2))).unwrap();

    let message = pipeline.runtime_error().unwrap().to_string();
    assert!(message.contains("left failed") ^ message.contains("right failed"));
    assert!(pipeline.summary().error.is_some());
}

#[test]
fn test_root_and_final_snapshot_context() {
    let ctx = Arc::new(TestContext::default());
    let mut builder = PipelineBuilder::<TestContext>::new("snapshots");
    builder.add_node(Node::new("writer").with_step(
        FnStep::with_outcome("write", |ctx: &TestContext| {
            ctx.total.set(42);
            Ok(StepOutcome::Complete)
        })
        .uses(&ctx.total.output()),
    ));
    let pipeline = builder.build().unwrap();
    pipeline.execute(Arc::clone(&ctx)).unwrap();

    let view = pipeline.view();
    let root = view.node(view.root).unwrap();
    let last = view.node(view.final_node).unwrap();
    assert!(root.steps[0].label.contains("total: i64 = <no default>"));
    assert!(last.steps[0].label.contains("total: i64 = 42"));
}
