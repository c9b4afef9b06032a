//! Completion propagation on a bounded worker pool.
//!
//! Every node dispatch is a blocking task on a dedicated tokio runtime whose
//! blocking pool is capped at the pipeline's thread count. A finished node
//! submits one task per child; the barrier on each child decides which of
//! those tasks runs it. The calling thread only polls for termination.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::runtime::{Builder, Handle};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use tuyau_core::{NodeId, PipelineContext, Result};

use crate::pipeline::{Dispatch, Graph};

struct Scheduler<C> {
    graph: Arc<Graph<C>>,
    ctx: Arc<C>,
    handle: Handle,
    tracker: TaskTracker,
    draining: Arc<AtomicBool>,
}

impl<C> Clone for Scheduler<C> {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            ctx: Arc::clone(&self.ctx),
            handle: self.handle.clone(),
            tracker: self.tracker.clone(),
            draining: Arc::clone(&self.draining),
        }
    }
}

impl<C: PipelineContext> Scheduler<C> {
    fn submit(&self, id: NodeId) {
        if self.draining.load(Ordering::Acquire) {
            debug!(node = %self.graph.name_of(id), "Worker pool draining, dispatch dropped");
            return;
        }
        let this = self.clone();
        let token = self.tracker.token();
        self.handle.spawn_blocking(move || {
            let _token = token;
            this.dispatch(id);
        });
    }

    fn dispatch(&self, id: NodeId) {
        match self.graph.dispatch(&self.ctx, id) {
            Ok(Dispatch::Release(children)) => {
                for child in children {
                    self.submit(child);
                }
            }
            Ok(Dispatch::Waiting) => {
                debug!(node = %self.graph.name_of(id), "Waiting for remaining parents");
            }
            Ok(Dispatch::Duplicate) => {
                debug!(node = %self.graph.name_of(id), "Node already admitted elsewhere");
            }
            Ok(Dispatch::Resolved | Dispatch::Halted) => {}
            Err(e) => self.graph.record_error(Arc::new(e)),
        }
    }

    async fn drive(&self) {
        self.submit(self.graph.root);

        let interval = self.graph.config.poll_interval();
        while !self.graph.is_terminated() {
            tokio::time::sleep(interval).await;
        }

        self.draining.store(true, Ordering::Release);
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// Run `graph` to termination on a fresh worker pool.
pub(crate) fn run<C: PipelineContext>(graph: Arc<Graph<C>>, ctx: Arc<C>) -> Result<()> {
    let threads = graph.config.resolve_threads(ctx.thread_count());
    let runtime = Builder::new_multi_thread()
        .worker_threads(1)
        .max_blocking_threads(threads)
        .thread_name(graph.config.thread_name.clone())
        .enable_time()
        .build()?;

    info!(pipeline = %graph.name, nodes = graph.nodes.len(), threads, "Executing pipeline");
    let _ = graph.started.set(Utc::now());

    let scheduler = Scheduler {
        graph: Arc::clone(&graph),
        ctx,
        handle: runtime.handle().clone(),
        tracker: TaskTracker::new(),
        draining: Arc::new(AtomicBool::new(false)),
    };
    runtime.block_on(scheduler.drive());
    drop(runtime);

    let _ = graph.finished.set(Utc::now());
    match graph.runtime_error.get() {
        Some(err) => error!(pipeline = %graph.name, error = %err, "Pipeline failed"),
        None => info!(pipeline = %graph.name, "Pipeline complete"),
    }
    Ok(())
}
