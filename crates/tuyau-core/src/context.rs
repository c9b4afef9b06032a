use serde::{Deserialize, Serialize};

use crate::var::VarHandle;

/// Worker count used when neither the context nor the config specify one.
pub const DEFAULT_THREAD_COUNT: usize = 4;

/// Contract for the shared state a pipeline runs against.
///
/// The context exclusively owns all Shared Variables. The engine never
/// persists or serializes it and adds no locking around it; steps access it
/// concurrently through `&self`.
pub trait PipelineContext: Send + Sync + 'static {
    /// Worker pool size. `0` defers to the engine configuration.
    fn thread_count(&self) -> usize {
        DEFAULT_THREAD_COUNT
    }

    /// Variables exposed for diagnostics (root/final step labels, reports).
    fn variables(&self) -> Vec<&dyn VarHandle> {
        Vec::new()
    }
}

/// Point-in-time rendering of one context variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarSnapshot {
    pub name: String,
    pub type_name: String,
    pub value: String,
}

/// Render every declared variable of `ctx`.
pub fn snapshot_variables<C: PipelineContext + ?Sized>(ctx: &C) -> Vec<VarSnapshot> {
    ctx.variables()
        .into_iter()
        .map(|handle| VarSnapshot {
            name: handle.var_ref().name.to_string(),
            type_name: handle.type_name().to_string(),
            value: handle.describe(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::var::PipeVar;

    struct Ctx {
        x: PipeVar<f64>,
        label: PipeVar<String>,
    }

    impl PipelineContext for Ctx {
        fn variables(&self) -> Vec<&dyn VarHandle> {
            vec![&self.x, &self.label]
        }
    }

    #[test]
    fn test_default_thread_count() {
        let ctx = Ctx {
            x: PipeVar::new("x", 1.0),
            label: PipeVar::no_default("label"),
        };
        assert_eq!(ctx.thread_count(), DEFAULT_THREAD_COUNT);
    }

    #[test]
    fn test_snapshot_variables() {
        let ctx = Ctx {
            x: PipeVar::new("x", 2.5),
            label: PipeVar::no_default("label"),
        };
        let snap = snapshot_variables(&ctx);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].name, "x");
        assert_eq!(snap[0].type_name, "f64");
        assert_eq!(snap[0].value, "2.5");
        assert_eq!(snap[1].value, "<no default>");
    }
}
