//! tmf-eval: resolves a build-state control file into a run state.
//!
//! Given a [`Context`](tmf_core::Context) of selected scenarios and events,
//! [`resolve`] walks the control-file graph, keeps the inputs whose scopes
//! match, substitutes variables and re-derives files. The resulting
//! [`RunState`] exposes what output readers and the solver launcher need.

pub mod launch;
pub mod resolve;
pub mod run;
pub mod variables;

pub use launch::{launch_args, spawn, Binary, BinaryRegistry, LaunchError};
pub use resolve::{context, resolve, InputStatus, ResolveError, Resolver, RunState};
pub use run::Precision;
pub use variables::{EventDefinition, EventDefinitions, VariableTable};
