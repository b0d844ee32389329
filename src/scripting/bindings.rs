//! Bindings Store
//!
//! The bindings of a session are the enumerable own properties of the QuickJS
//! global object: host binds, script `var` declarations, top-level functions
//! and `globalThis.x = ...` all land there, while the built-ins (which are
//! non-enumerable) do not count as bindings.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rquickjs::{Ctx, Object, Runtime, Value};

use crate::core::{ScriptError, ScriptResult};

use super::convert::{from_js, to_js};
use super::interrupt::InterruptState;
use super::scope::{Failure, Scope};
use super::value::ScriptValue;

fn is_bound_in(globals: &Object<'_>, name: &str) -> rquickjs::Result<bool> {
    for key in globals.keys::<String>() {
        if key? == name {
            return Ok(true);
        }
    }
    Ok(false)
}

/// 写入绑定；同名的内置属性（不可枚举）先被移除，使新绑定可见
fn put<'js>(
    ctx: &Ctx<'js>,
    globals: &Object<'js>,
    name: &str,
    value: Value<'js>,
) -> Result<(), Failure> {
    if globals.contains_key(name)? && !is_bound_in(globals, name)? {
        if let Err(err) = globals.remove(name) {
            if matches!(err, rquickjs::Error::Exception) {
                let _ = ctx.catch();
            }
        }
    }
    globals.set(name, value)?;
    Ok(())
}

/// 会话的绑定作用域
pub struct BindingsStore {
    runtime: Runtime,
    interrupt: Arc<InterruptState>,
    timeout: Option<Duration>,
    scope: Arc<Scope>,
}

impl BindingsStore {
    pub(crate) fn new(
        runtime: Runtime,
        interrupt: Arc<InterruptState>,
        timeout: Option<Duration>,
    ) -> ScriptResult<Self> {
        let scope = Arc::new(Scope::new(&runtime, Arc::clone(&interrupt), timeout)?);
        Ok(Self {
            runtime,
            interrupt,
            timeout,
            scope,
        })
    }

    pub(crate) fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }

    /// 绑定值，覆盖已有绑定
    pub fn bind(&self, name: &str, value: ScriptValue) -> ScriptResult<()> {
        tracing::debug!(target: "scripting.bindings", name, kind = value.type_name(), "Bind");
        self.scope.enter(|ctx, state| {
            let value = to_js(ctx, state, &value)?;
            put(ctx, &ctx.globals(), name, value)
        })
    }

    /// 已绑定则返回现有值，否则绑定并返回 `value`
    pub fn get_or_bind(&self, name: &str, value: ScriptValue) -> ScriptResult<ScriptValue> {
        self.scope.enter(|ctx, state| {
            let globals = ctx.globals();
            if is_bound_in(&globals, name)? {
                let existing: Value = globals.get(name)?;
                return Ok(from_js(state, &existing)?);
            }
            tracing::debug!(target: "scripting.bindings", name, "Bind (absent)");
            let js = to_js(ctx, state, &value)?;
            put(ctx, &globals, name, js)?;
            Ok(value)
        })
    }

    /// 读取绑定；未绑定时返回 `None`
    pub fn get(&self, name: &str) -> ScriptResult<Option<ScriptValue>> {
        self.scope.enter(|ctx, state| {
            let globals = ctx.globals();
            if !is_bound_in(&globals, name)? {
                return Ok(None);
            }
            let value: Value = globals.get(name)?;
            Ok(Some(from_js(state, &value)?))
        })
    }

    pub fn is_bound(&self, name: &str) -> ScriptResult<bool> {
        self.scope
            .enter(|ctx, _| Ok(is_bound_in(&ctx.globals(), name)?))
    }

    /// 移除绑定，返回调用前是否已绑定
    ///
    /// 脚本声明的绑定若不可删除，返回 `Unsupported`，绑定保持不变。
    pub fn remove(&self, name: &str) -> ScriptResult<bool> {
        let removed = self.scope.enter(|ctx, _| {
            let globals = ctx.globals();
            if !is_bound_in(&globals, name)? {
                return Ok(false);
            }
            if let Err(err) = globals.remove(name) {
                if !matches!(err, rquickjs::Error::Exception) {
                    return Err(err.into());
                }
                let _ = ctx.catch();
            }
            if is_bound_in(&globals, name)? {
                return Err(ScriptError::unsupported(format!(
                    "Binding `{}` was declared by script code and cannot be removed",
                    name
                ))
                .into());
            }
            Ok(true)
        })?;

        if removed {
            tracing::debug!(target: "scripting.bindings", name, "Removed binding");
        }
        Ok(removed)
    }

    /// 当前所有绑定的副本
    pub fn snapshot(&self) -> ScriptResult<HashMap<String, ScriptValue>> {
        self.scope.enter(|ctx, state| {
            let mut bindings = HashMap::new();
            for prop in ctx.globals().props::<String, Value>() {
                let (name, value) = prop?;
                bindings.insert(name, from_js(state, &value)?);
            }
            Ok(bindings)
        })
    }

    /// 绑定名列表
    pub fn names(&self) -> ScriptResult<Vec<String>> {
        self.scope.enter(|ctx, _| {
            let names = ctx
                .globals()
                .keys::<String>()
                .collect::<rquickjs::Result<Vec<_>>>()?;
            Ok(names)
        })
    }

    /// 清空绑定并安装新的空作用域
    ///
    /// 运行时保持不变；正在异步执行的任务继续使用旧作用域。
    pub fn clear(&mut self) -> ScriptResult<()> {
        self.scope = Arc::new(Scope::new(
            &self.runtime,
            Arc::clone(&self.interrupt),
            self.timeout,
        )?);
        tracing::debug!(target: "scripting.bindings", "Installed fresh binding scope");
        Ok(())
    }
}

impl std::fmt::Debug for BindingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingsStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
