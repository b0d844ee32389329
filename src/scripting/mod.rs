//! 脚本系统
//!
//! - `engine` - 引擎门面：绑定、执行、函数调用
//! - `bindings` - 绑定作用域
//! - `bridge` - 宿主函数桥
//! - `trampoline` - 回调边界上的错误载体与行号恢复
//! - `path` - 点分路径解析
//! - `executor` - 异步执行的执行器接口

pub mod bindings;
pub mod bridge;
mod convert;
pub mod engine;
pub mod executor;
pub mod interrupt;
mod path;
pub mod protocol;
mod proxy;
mod scope;
mod trampoline;
pub mod value;

pub use bindings::BindingsStore;
pub use bridge::{HostFn, HostFunction, HostMethod, InvocationFailure, MethodTable};
pub use engine::ScriptEngine;
pub use executor::{EvalHandle, Executor, Job, ThreadExecutor};
pub use interrupt::CancelHandle;
pub use protocol::ScriptObject;
pub use trampoline::EVAL_SOURCE_NAME;
pub use value::{format_arguments, FromScriptValue, IntoHostResult, ScriptValue};
