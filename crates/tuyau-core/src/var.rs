//! Shared Variables: named, typed slots owned by a pipeline context.
//!
//! A [`PipeVar`] is a cheap handle; clones point at the same slot, so steps
//! hold references to the context's variables rather than copies. Steps read
//! and write through tagged views ([`Input`], [`Output`], [`InOut`]) whose
//! [`VarAccess`] is what the build-time hazard validator consumes.

use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{Result, TuyauError};
use crate::types::VarId;

struct Slot<T> {
    id: VarId,
    name: Arc<str>,
    value: RwLock<Option<T>>,
}

/// Handle to a named, typed Shared Variable.
pub struct PipeVar<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for PipeVar<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Send + Sync + 'static> PipeVar<T> {
    /// Create a variable holding an initial value.
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self::from_parts(name.into(), Some(value))
    }

    /// Create a variable without a default value. Reading it before any
    /// write fails with [`TuyauError::NoDefault`].
    pub fn no_default(name: impl Into<String>) -> Self {
        Self::from_parts(name.into(), None)
    }

    fn from_parts(name: String, value: Option<T>) -> Self {
        Self {
            slot: Arc::new(Slot {
                id: VarId::new(),
                name: Arc::from(name),
                value: RwLock::new(value),
            }),
        }
    }

    pub fn id(&self) -> VarId {
        self.slot.id
    }

    pub fn name(&self) -> &str {
        &self.slot.name
    }

    /// Borrow the current value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let guard = self
            .slot
            .value
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(value) => Ok(f(value)),
            None => Err(TuyauError::NoDefault {
                variable: self.name().to_string(),
            }),
        }
    }

    pub fn set(&self, value: T) {
        let mut guard = self
            .slot
            .value
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Some(value);
    }

    pub fn is_set(&self) -> bool {
        self.slot
            .value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn var_ref(&self) -> VarRef {
        VarRef {
            id: self.slot.id,
            name: Arc::clone(&self.slot.name),
        }
    }

    /// Read-only view.
    pub fn input(&self) -> Input<T> {
        Input { var: self.clone() }
    }

    /// Write-only view.
    pub fn output(&self) -> Output<T> {
        Output { var: self.clone() }
    }

    /// Read-write view.
    pub fn inout(&self) -> InOut<T> {
        InOut { var: self.clone() }
    }
}

impl<T: Clone + Send + Sync + 'static> PipeVar<T> {
    /// Clone the current value out of the slot.
    pub fn get(&self) -> Result<T> {
        self.with(T::clone)
    }
}

impl<T: std::fmt::Debug + Send + Sync + 'static> std::fmt::Debug for PipeVar<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeVar")
            .field("name", &self.name())
            .field("value", &self.describe())
            .finish()
    }
}

/// Identity of a variable, detached from its type. Equality is by id.
#[derive(Debug, Clone)]
pub struct VarRef {
    pub id: VarId,
    pub name: Arc<str>,
}

impl PartialEq for VarRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for VarRef {}

impl std::hash::Hash for VarRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for VarRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VarRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// How a step uses a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Input,
    Output,
    InOut,
}

impl AccessMode {
    pub fn reads(self) -> bool {
        matches!(self, AccessMode::Input | AccessMode::InOut)
    }

    pub fn writes(self) -> bool {
        matches!(self, AccessMode::Output | AccessMode::InOut)
    }
}

/// A variable reference tagged with the intent of the step using it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarAccess {
    pub var: VarRef,
    pub mode: AccessMode,
}

/// Implemented by the tagged views so steps can declare their accesses.
pub trait Access {
    fn access(&self) -> VarAccess;
}

/// Read-only view of a variable.
pub struct Input<T> {
    var: PipeVar<T>,
}

impl<T: Send + Sync + 'static> Input<T> {
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.var.with(f)
    }

    pub fn name(&self) -> &str {
        self.var.name()
    }
}

impl<T: Clone + Send + Sync + 'static> Input<T> {
    pub fn get(&self) -> Result<T> {
        self.var.get()
    }
}

/// Write-only view of a variable.
pub struct Output<T> {
    var: PipeVar<T>,
}

impl<T: Send + Sync + 'static> Output<T> {
    pub fn set(&self, value: T) {
        self.var.set(value)
    }

    pub fn name(&self) -> &str {
        self.var.name()
    }
}

/// Read-write view of a variable.
pub struct InOut<T> {
    var: PipeVar<T>,
}

impl<T: Send + Sync + 'static> InOut<T> {
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.var.with(f)
    }

    pub fn set(&self, value: T) {
        self.var.set(value)
    }

    pub fn name(&self) -> &str {
        self.var.name()
    }
}

impl<T: Clone + Send + Sync + 'static> InOut<T> {
    pub fn get(&self) -> Result<T> {
        self.var.get()
    }

    /// Read, transform and write back.
    pub fn update(&self, f: impl FnOnce(T) -> T) -> Result<()> {
        let current = self.var.get()?;
        self.var.set(f(current));
        Ok(())
    }
}

macro_rules! impl_access {
    ($view:ident, $mode:expr) => {
        impl<T: Send + Sync + 'static> Access for $view<T> {
            fn access(&self) -> VarAccess {
                VarAccess {
                    var: self.var.var_ref(),
                    mode: $mode,
                }
            }
        }

        impl<T> Clone for $view<T> {
            fn clone(&self) -> Self {
                Self {
                    var: self.var.clone(),
                }
            }
        }
    };
}

impl_access!(Input, AccessMode::Input);
impl_access!(Output, AccessMode::Output);
impl_access!(InOut, AccessMode::InOut);

/// Type-erased diagnostic view of a variable, used to list a context's
/// variables without reflection.
pub trait VarHandle: Send + Sync {
    fn var_ref(&self) -> VarRef;
    fn type_name(&self) -> &'static str;
    /// Debug rendering of the current value, or `<no default>`.
    fn describe(&self) -> String;
}

impl<T: std::fmt::Debug + Send + Sync + 'static> VarHandle for PipeVar<T> {
    fn var_ref(&self) -> VarRef {
        PipeVar::var_ref(self)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn describe(&self) -> String {
        self.with(|v| format!("{v:?}"))
            .unwrap_or_else(|_| "<no default>".to_string())
    }
}
