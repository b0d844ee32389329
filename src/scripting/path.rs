//! Path Resolver
//!
//! Resolves dotted identifier chains (`a.b.c`) against the global scope and
//! calls the final member with the value before it as receiver.

use std::sync::Arc;

use rquickjs::function::{Rest, This};
use rquickjs::{Ctx, Function, Value};

use crate::core::{ScriptError, ScriptResult};

use super::convert::{from_js, to_js};
use super::scope::{Failure, ScopeState};
use super::value::ScriptValue;

/// 拆分点分路径；空路径或空段无法解析
pub(crate) fn split_path(path: &str) -> ScriptResult<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|segment| segment.trim().is_empty()) {
        return Err(ScriptError::no_such_path(path, "empty path segment"));
    }
    Ok(segments)
}

fn convert_args<'js>(
    ctx: &Ctx<'js>,
    state: &Arc<ScopeState>,
    args: &[ScriptValue],
) -> Result<Vec<Value<'js>>, Failure> {
    args.iter().map(|arg| to_js(ctx, state, arg)).collect()
}

/// 调用顶层函数
pub(crate) fn call_function<'js>(
    ctx: &Ctx<'js>,
    state: &Arc<ScopeState>,
    name: &str,
    args: &[ScriptValue],
) -> Result<ScriptValue, Failure> {
    let value: Value = ctx.globals().get(name)?;
    let function = match value.as_function() {
        Some(function) => function.clone(),
        None if value.is_undefined() => {
            return Err(ScriptError::no_such_path(name, "not defined").into())
        }
        None => return Err(ScriptError::no_such_path(name, "not a function").into()),
    };

    let args = convert_args(ctx, state, args)?;
    let result: Value = function.call((Rest(args),))?;
    Ok(from_js(state, &result)?)
}

/// 沿点分路径解析并调用
///
/// 中间段不是脚本对象时，错误中给出已解析的前缀（不含失败的标识符）。
pub(crate) fn call_path<'js>(
    ctx: &Ctx<'js>,
    state: &Arc<ScopeState>,
    segments: &[&str],
    args: &[ScriptValue],
) -> Result<ScriptValue, Failure> {
    let globals = ctx.globals();
    let mut receiver: Value<'js> = globals.clone().into_value();
    let mut current: Value<'js> = globals.get(segments[0])?;

    for (index, segment) in segments.iter().enumerate().skip(1) {
        let next: Value<'js> = match current.as_object() {
            Some(object) => object.get(*segment)?,
            None => {
                return Err(ScriptError::no_such_path(
                    segments[..index].join("."),
                    "not a script object",
                )
                .into())
            }
        };
        receiver = std::mem::replace(&mut current, next);
    }

    let function: Function<'js> = match current.as_function() {
        Some(function) => function.clone(),
        None => {
            return Err(ScriptError::no_such_path(segments.join("."), "not a function").into())
        }
    };

    let args = convert_args(ctx, state, args)?;
    let result: Value = function.call((This(receiver), Rest(args)))?;
    Ok(from_js(state, &result)?)
}
