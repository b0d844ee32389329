//! 绑定作用域与受保护入口
//!
//! 每个 [`Scope`] 对应一个 QuickJS `Context`，其全局对象就是绑定作用域。
//! 所有进入运行时的操作都经过 [`Scope::enter`]，这是错误载体唯一的解包点。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rquickjs::{Context, Ctx, Runtime, Value};

use crate::core::{ScriptError, ScriptResult};

use super::convert::{from_js, install_introspection};
use super::interrupt::{new_token, CancelToken, InterruptState};
use super::proxy::BridgeRegistry;
use super::trampoline::{translate, Trampoline};
use super::value::ScriptValue;

/// 获取锁；持锁线程 panic 后数据仍可用
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 宿主回调可访问的作用域状态
///
/// 回调闭包只持有这一份状态，不持有 `Context`，避免引用环。
#[derive(Debug)]
pub(crate) struct ScopeState {
    pub(crate) trampoline: Trampoline,
    pub(crate) registry: BridgeRegistry,
    pub(crate) interrupt: Arc<InterruptState>,
    pub(crate) timeout: Option<Duration>,
}

/// 运行时内部失败：QuickJS 自身的错误或已经成型的脚本错误
#[derive(Debug)]
pub(crate) enum Failure {
    Js(rquickjs::Error),
    Script(ScriptError),
}

impl From<rquickjs::Error> for Failure {
    fn from(err: rquickjs::Error) -> Self {
        Failure::Js(err)
    }
}

impl From<ScriptError> for Failure {
    fn from(err: ScriptError) -> Self {
        Failure::Script(err)
    }
}

/// 一个绑定作用域
///
/// `Scope` 不可克隆；需要跨线程共享时用 `Arc<Scope>`。
pub(crate) struct Scope {
    context: Context,
    state: Arc<ScopeState>,
}

impl Scope {
    pub(crate) fn new(
        runtime: &Runtime,
        interrupt: Arc<InterruptState>,
        timeout: Option<Duration>,
    ) -> ScriptResult<Self> {
        let context = Context::full(runtime)
            .map_err(|e| ScriptError::Init(format!("Failed to create script context: {}", e)))?;
        context
            .with(|ctx| install_introspection(&ctx))
            .map_err(|e| ScriptError::Init(format!("Failed to prepare script context: {}", e)))?;

        Ok(Self {
            context,
            state: Arc::new(ScopeState {
                trampoline: Trampoline::default(),
                registry: BridgeRegistry::default(),
                interrupt,
                timeout,
            }),
        })
    }

    /// 受保护入口
    ///
    /// 在运行时锁内执行 `f`；抛出的错误载体在这里被还原为原始的 [`ScriptError`]，
    /// 脚本捕获后丢弃的载体在返回前清除。
    pub(crate) fn enter<R, F>(&self, f: F) -> ScriptResult<R>
    where
        F: for<'js> FnOnce(&Ctx<'js>, &Arc<ScopeState>) -> Result<R, Failure> + Send,
        R: Send,
    {
        self.enter_with(new_token(), f)
    }

    /// 使用调用方提供的取消令牌进入运行时
    pub(crate) fn enter_with<R, F>(&self, token: CancelToken, f: F) -> ScriptResult<R>
    where
        F: for<'js> FnOnce(&Ctx<'js>, &Arc<ScopeState>) -> Result<R, Failure> + Send,
        R: Send,
    {
        let state = &self.state;
        let result = self.context.with(|ctx| {
            state.interrupt.arm(token, state.timeout);
            let result = f(&ctx, state).map_err(|failure| match failure {
                Failure::Script(err) => err,
                Failure::Js(err) => translate(&ctx, state, err),
            });
            state.interrupt.disarm();
            result
        });

        let stale = state.trampoline.discard_pending();
        if stale > 0 {
            tracing::trace!(target: "scripting", stale, "Discarded caught host errors");
        }
        result
    }

    /// 在本作用域执行脚本源码
    pub(crate) fn evaluate(&self, source: &str) -> ScriptResult<ScriptValue> {
        self.evaluate_with(new_token(), source)
    }

    pub(crate) fn evaluate_with(&self, token: CancelToken, source: &str) -> ScriptResult<ScriptValue> {
        self.enter_with(token, |ctx, state| {
            let value: Value = ctx.eval(source)?;
            Ok(from_js(state, &value)?)
        })
    }
}
