//! Execution Engine
//!
//! Pipeline execution with file-descriptor wiring, chain evaluation with
//! short-circuit semantics, pipefail accounting, xtrace, and timeout
//! enforcement.

pub mod executor;
pub mod redirect;
pub mod result;

pub use executor::{ExecEnv, Executor};
pub use redirect::{FdOp, OutSpec, RedirectionPlan, StdinSpec};
pub use result::{CommandResult, ResultMetadata};
