//! # Script Engine
//!
//! An embeddable JavaScript session built on QuickJS.
//!
//! ## Features
//!
//! - **Bindings**: a per-session namespace of script-visible values
//! - **Host functions**: native Rust functions and bound methods callable from scripts
//! - **Typed errors**: failures raised inside host callbacks reach the caller unchanged,
//!   with the script line that triggered them
//! - **Nested calls**: `a.b.c(...)` resolved from the host with `a.b` as receiver
//! - **Async evaluation**: one unit of work handed to a caller-supplied executor,
//!   with cooperative cancellation and timeouts
//!
//! ### Example
//!
//! ```rust
//! use std::sync::Arc;
//! use script_engine::{HostFunction, ScriptEngine, ScriptValue};
//!
//! struct Counter {
//!     step: f64,
//! }
//!
//! let engine = ScriptEngine::new().unwrap();
//! let next = HostFunction::bound(Arc::new(Counter { step: 2.0 }), "next", |c: &Counter, n: f64| n + c.step);
//! engine.bind_function(next).unwrap();
//!
//! assert_eq!(engine.evaluate("next(1)").unwrap(), ScriptValue::Number(3.0));
//!
//! let err = engine.evaluate("\nnext()").unwrap_err();
//! assert_eq!(err.line(), Some(2));
//! ```
//!
//! ## Modules
//!
//! - [`core`]: error types and shared macros
//! - [`config`]: configuration loading and logging setup
//! - [`scripting`]: the engine, bindings and host function bridge

/// Error types and shared macros
pub mod core;
/// Configuration system
pub mod config;
/// Scripting engine
pub mod scripting;

pub use crate::config::{init_logging, ScriptEngineConfig};
pub use crate::core::{ErrorKind, InterruptReason, ScriptError, ScriptResult};
pub use crate::scripting::{
    CancelHandle, EvalHandle, Executor, HostFunction, MethodTable, ScriptEngine, ScriptValue,
    ThreadExecutor,
};
