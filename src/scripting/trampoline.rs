//! Invocation Exception Translator
//!
//! A host callback invoked by QuickJS can only fail with the runtime's own
//! error type. A typed [`ScriptError`] raised inside such a callback is stashed
//! in the scope's [`Trampoline`] under a token; what actually propagates through
//! the script is an ordinary `Error` object tagged with that token. The guarded
//! entry point (`Scope::enter`) catches the thrown value and, if it carries a
//! token, hands back the original typed error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use rquickjs::convert::Coerced;
use rquickjs::{Ctx, FromJs, Function, Object, Value};

use crate::core::ScriptError;

use super::scope::{lock, ScopeState};

/// Synthetic file name QuickJS reports for text passed to `Ctx::eval`.
pub const EVAL_SOURCE_NAME: &str = "eval_script";

/// Property carrying the carrier token on a thrown `Error`.
const CARRIER_KEY: &str = "__hostError__";

/// 源码位置：行号（1 起始）和可选列号
pub(crate) type Position = (u32, Option<u32>);

/// Carrier table for typed errors raised inside host callbacks.
#[derive(Debug, Default)]
pub(crate) struct Trampoline {
    pending: Mutex<HashMap<u32, ScriptError>>,
    next: AtomicU32,
}

impl Trampoline {
    /// Stash `error` and return the runtime error that throws its carrier.
    pub(crate) fn throw(&self, ctx: &Ctx<'_>, error: ScriptError) -> rquickjs::Error {
        let token = self.next.fetch_add(1, Ordering::Relaxed);
        let message = error.to_string();
        lock(&self.pending).insert(token, error);

        match carrier(ctx, &message, token) {
            Ok(value) => ctx.throw(value),
            Err(err) => err,
        }
    }

    fn take(&self, token: u32) -> Option<ScriptError> {
        lock(&self.pending).remove(&token)
    }

    /// Drop carriers that script code caught and never rethrew.
    pub(crate) fn discard_pending(&self) -> usize {
        let mut pending = lock(&self.pending);
        let stale = pending.len();
        pending.clear();
        stale
    }
}

fn carrier<'js>(ctx: &Ctx<'js>, message: &str, token: u32) -> rquickjs::Result<Value<'js>> {
    let error_ctor: Function = ctx.globals().get("Error")?;
    let error: Object = error_ctor.call((message,))?;
    error.set(CARRIER_KEY, token)?;
    Ok(error.into_value())
}

/// Read a property; a getter that throws counts as absent.
pub(crate) fn read_prop<'js, V: FromJs<'js>>(
    ctx: &Ctx<'js>,
    object: &Object<'js>,
    key: &str,
) -> Option<V> {
    match object.get::<_, Option<V>>(key) {
        Ok(value) => value,
        Err(rquickjs::Error::Exception) => {
            let _ = ctx.catch();
            None
        }
        Err(_) => None,
    }
}

/// Turn a failed runtime call into the typed error the caller sees.
pub(crate) fn translate(ctx: &Ctx<'_>, state: &ScopeState, err: rquickjs::Error) -> ScriptError {
    match err {
        rquickjs::Error::Exception => {
            let thrown = ctx.catch();
            if let Some(reason) = state.interrupt.take_tripped() {
                return ScriptError::Interrupted { reason };
            }
            unwrap_thrown(ctx, state, thrown)
        }
        other => ScriptError::script(other.to_string()),
    }
}

fn unwrap_thrown<'js>(ctx: &Ctx<'js>, state: &ScopeState, thrown: Value<'js>) -> ScriptError {
    let Some(object) = thrown.as_object() else {
        return ScriptError::script(describe(ctx, &thrown));
    };

    if let Some(error) = read_prop::<u32>(ctx, object, CARRIER_KEY).and_then(|t| state.trampoline.take(t)) {
        return error;
    }

    let position = read_prop::<String>(ctx, object, "stack")
        .and_then(|stack| find_frame(&stack, EVAL_SOURCE_NAME))
        .or_else(|| {
            let file = read_prop::<String>(ctx, object, "fileName");
            let line = read_prop::<u32>(ctx, object, "lineNumber")?;
            match file {
                Some(file) if file != EVAL_SOURCE_NAME => None,
                _ => Some((line, None)),
            }
        });

    ScriptError::script(describe(ctx, &thrown)).at_position(position)
}

/// `String(value)`, falling back to a fixed text if conversion throws
pub(crate) fn describe<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> String {
    match Coerced::<String>::from_js(ctx, value.clone()) {
        Ok(text) => text.0,
        Err(err) => {
            if matches!(err, rquickjs::Error::Exception) {
                let _ = ctx.catch();
            }
            "uncaught exception".to_string()
        }
    }
}

/// Position of the innermost evaluation-unit frame on the current call stack.
pub(crate) fn call_site(ctx: &Ctx<'_>) -> Option<Position> {
    match capture_stack(ctx) {
        Ok(stack) => stack.and_then(|stack| find_frame(&stack, EVAL_SOURCE_NAME)),
        Err(err) => {
            if matches!(err, rquickjs::Error::Exception) {
                let _ = ctx.catch();
            }
            None
        }
    }
}

fn capture_stack(ctx: &Ctx<'_>) -> rquickjs::Result<Option<String>> {
    let error_ctor: Function = ctx.globals().get("Error")?;
    let error: Object = error_ctor.call(())?;
    error.get("stack")
}

// ============================================================================
// 调用栈解析
// ============================================================================

#[derive(Debug, PartialEq)]
struct Frame<'a> {
    file: &'a str,
    line: u32,
    column: Option<u32>,
}

/// 解析一行栈帧：`at name (file:line[:col])` 或 `at file:line[:col]`
fn parse_frame(text: &str) -> Option<Frame<'_>> {
    let rest = text.trim().strip_prefix("at ")?;
    let location = match rest.rfind('(') {
        Some(open) if rest.ends_with(')') => &rest[open + 1..rest.len() - 1],
        _ => rest,
    };

    let mut parts = location.rsplitn(3, ':');
    let last = parts.next()?;
    let middle = parts.next()?;

    match (middle.parse::<u32>(), parts.next()) {
        (Ok(line), Some(file)) => Some(Frame {
            file,
            line,
            column: Some(last.parse().ok()?),
        }),
        _ => {
            let line = last.parse().ok()?;
            let file = &location[..location.len() - last.len() - 1];
            Some(Frame {
                file,
                line,
                column: None,
            })
        }
    }
}

/// 第一个来源为 `source_name` 的栈帧位置
pub(crate) fn find_frame(stack: &str, source_name: &str) -> Option<Position> {
    stack
        .lines()
        .filter_map(parse_frame)
        .find(|frame| frame.file == source_name)
        .map(|frame| (frame.line, frame.column))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_frame() {
        assert_eq!(
            parse_frame("    at <eval> (eval_script:3)"),
            Some(Frame {
                file: "eval_script",
                line: 3,
                column: None
            })
        );
        assert_eq!(
            parse_frame("    at apply (<input>:2:17)"),
            Some(Frame {
                file: "<input>",
                line: 2,
                column: Some(17)
            })
        );
    }

    #[test]
    fn test_parse_bare_frame() {
        assert_eq!(
            parse_frame("    at eval_script:5"),
            Some(Frame {
                file: "eval_script",
                line: 5,
                column: None
            })
        );
    }

    #[test]
    fn test_parse_native_frame() {
        assert_eq!(parse_frame("    at call (native)"), None);
        assert_eq!(parse_frame("ReferenceError: x is not defined"), None);
    }

    #[test]
    fn test_file_names_with_colons() {
        let frame = parse_frame("    at run (C:\\scripts\\init.js:12)").unwrap();
        assert_eq!(frame.file, "C:\\scripts\\init.js");
        assert_eq!(frame.line, 12);
    }

    #[test]
    fn test_find_first_evaluation_frame() {
        let stack = "    at Error (native)\n    at call (native)\n    at apply (<input>:3)\n    at add (eval_script:2)\n    at <eval> (eval_script:7)\n";
        assert_eq!(find_frame(stack, EVAL_SOURCE_NAME), Some((2, None)));
        assert_eq!(find_frame("    at apply (<input>:3)\n", EVAL_SOURCE_NAME), None);
    }

    #[test]
    fn test_discard_pending() {
        let trampoline = Trampoline::default();
        lock(&trampoline.pending).insert(7, ScriptError::script("stale"));
        assert_eq!(trampoline.discard_pending(), 1);
        assert!(trampoline.take(7).is_none());
    }
}
