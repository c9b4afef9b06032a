pub mod config;
pub mod conflict;
pub mod context;
pub mod error;
pub mod status;
pub mod step;
pub mod types;
pub mod var;

pub use config::{AppConfig, EngineConfig};
pub use conflict::{ConflictReport, Hazard, HazardKind};
pub use context::{PipelineContext, VarSnapshot, DEFAULT_THREAD_COUNT};
pub use error::{Result, TuyauError};
pub use status::{Status, StatusCell};
pub use step::{panic_message, Step, StepCell, StepOutcome};
pub use types::{NodeId, StepId, VarId};
pub use var::{Access, AccessMode, InOut, Input, Output, PipeVar, VarAccess, VarHandle, VarRef};
