//! Callable Script Value Protocol
//!
//! The capability a host value implements to be exposed to scripts as a
//! function. The QuickJS adapter (`proxy.rs`) maps proxy traps onto this
//! trait, so the engine sees one language-agnostic surface.

use super::value::ScriptValue;
use crate::core::ScriptResult;

/// Script-visible object protocol
pub trait ScriptObject: Send + Sync {
    /// Invoke as a function. `receiver` is the script-side `this`.
    fn call(&self, receiver: &ScriptValue, args: &[ScriptValue]) -> ScriptResult<ScriptValue>;

    /// `new target(...args)`
    fn new_object(&self, args: &[ScriptValue]) -> ScriptResult<ScriptValue>;

    fn get_member(&self, name: &str) -> ScriptResult<ScriptValue>;

    fn set_member(&self, name: &str, value: ScriptValue) -> ScriptResult<()>;

    fn remove_member(&self, name: &str) -> ScriptResult<()>;

    fn get_slot(&self, index: u32) -> ScriptResult<ScriptValue>;

    fn set_slot(&self, index: u32, value: ScriptValue) -> ScriptResult<()>;

    fn has_member(&self, name: &str) -> bool;

    fn has_slot(&self, index: u32) -> bool;

    /// Enumerable member names
    fn member_names(&self) -> Vec<String>;

    fn values(&self) -> Vec<ScriptValue>;

    fn is_function(&self) -> bool;

    fn is_strict_function(&self) -> bool;

    fn is_array(&self) -> bool;

    fn is_instance_of(&self, class: &ScriptValue) -> bool;

    fn class_name(&self) -> String;

    /// Numeric coercion (`+value` in script)
    fn to_number(&self) -> ScriptResult<f64>;
}
