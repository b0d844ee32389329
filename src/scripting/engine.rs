// ============================================================================
// 脚本引擎门面
// 会话生命周期、绑定操作、同步/异步执行、数值读取
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use futures::channel::oneshot;
use rquickjs::Runtime;

use crate::config::ScriptEngineConfig;
use crate::core::{ScriptError, ScriptResult};

use super::bindings::BindingsStore;
use super::bridge::{HostFunction, MethodTable};
use super::executor::{EvalHandle, Executor};
use super::interrupt::{new_token, CancelHandle, InterruptState};
use super::path::{call_function, call_path, split_path};
use super::value::ScriptValue;

/// 脚本引擎会话
///
/// 独占一个 QuickJS 运行时和一个绑定作用域。多个引擎互不共享状态，可以并发运行。
///
/// ```rust
/// use script_engine::{HostFunction, ScriptEngine, ScriptValue};
///
/// let engine = ScriptEngine::new().unwrap();
/// engine.bind_value("base", 40).unwrap();
/// engine
///     .bind_function(HostFunction::from_fn("Math", "inc", |x: f64| x + 1.0))
///     .unwrap();
///
/// let result = engine.evaluate("inc(base) + 1").unwrap();
/// assert_eq!(result, ScriptValue::Number(42.0));
/// ```
pub struct ScriptEngine {
    bindings: BindingsStore,
    interrupt: Arc<InterruptState>,
    config: ScriptEngineConfig,
}

impl ScriptEngine {
    /// 使用默认配置创建引擎
    pub fn new() -> ScriptResult<Self> {
        Self::with_config(ScriptEngineConfig::default())
    }

    /// 使用指定配置创建引擎
    pub fn with_config(config: ScriptEngineConfig) -> ScriptResult<Self> {
        config
            .validate()
            .map_err(|e| ScriptError::Init(e.to_string()))?;

        let runtime = Runtime::new()
            .map_err(|e| ScriptError::Init(format!("Failed to create QuickJS runtime: {}", e)))?;

        let limits = &config.runtime;
        if let Some(limit) = limits.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(size) = limits.max_stack_size {
            runtime.set_max_stack_size(size);
        }
        if let Some(threshold) = limits.gc_threshold {
            runtime.set_gc_threshold(threshold);
        }

        let interrupt = Arc::new(InterruptState::default());
        let handler_state = Arc::clone(&interrupt);
        runtime.set_interrupt_handler(Some(Box::new(move || handler_state.should_interrupt())));

        let bindings = BindingsStore::new(runtime, Arc::clone(&interrupt), config.evaluation.timeout())?;

        tracing::info!(
            target: "scripting",
            memory_limit = ?limits.memory_limit,
            timeout_ms = ?config.evaluation.timeout_ms,
            "Script engine created"
        );

        Ok(Self {
            bindings,
            interrupt,
            config,
        })
    }

    pub fn config(&self) -> &ScriptEngineConfig {
        &self.config
    }

    /// 绑定作用域
    pub fn bindings(&self) -> &BindingsStore {
        &self.bindings
    }

    /// 取消句柄，作用于调用 `cancel` 时本引擎正在运行的执行；空闲时的取消被忽略
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::active(Arc::clone(&self.interrupt))
    }

    // ========================================================================
    // 绑定
    // ========================================================================

    pub fn bind_value(&self, name: &str, value: impl Into<ScriptValue>) -> ScriptResult<()> {
        self.bindings.bind(name, value.into())
    }

    /// 以方法名绑定宿主函数
    pub fn bind_function(&self, function: HostFunction) -> ScriptResult<()> {
        let name = function.name().to_string();
        self.bindings.bind(&name, ScriptValue::Function(function))
    }

    /// 按名称和参数类型解析方法，绑定到实例后以方法名绑定
    pub fn bind_method<T>(
        &self,
        table: &MethodTable<T>,
        instance: Arc<T>,
        name: &str,
        param_types: &[&str],
    ) -> ScriptResult<HostFunction>
    where
        T: Send + Sync + 'static,
    {
        let function = table.resolve(instance, name, param_types)?;
        self.bind_function(function.clone())?;
        Ok(function)
    }

    pub fn get_or_bind(&self, name: &str, value: impl Into<ScriptValue>) -> ScriptResult<ScriptValue> {
        self.bindings.get_or_bind(name, value.into())
    }

    pub fn get(&self, name: &str) -> ScriptResult<Option<ScriptValue>> {
        self.bindings.get(name)
    }

    pub fn is_bound(&self, name: &str) -> ScriptResult<bool> {
        self.bindings.is_bound(name)
    }

    pub fn remove(&self, name: &str) -> ScriptResult<bool> {
        self.bindings.remove(name)
    }

    pub fn snapshot(&self) -> ScriptResult<HashMap<String, ScriptValue>> {
        self.bindings.snapshot()
    }

    /// 清空所有绑定，安装新的空作用域；运行时不重建
    pub fn clear_bindings(&mut self) -> ScriptResult<()> {
        self.bindings.clear()
    }

    // ========================================================================
    // 执行
    // ========================================================================

    /// 执行脚本；脚本没有产生值时返回 `ScriptValue::Undefined`
    pub fn evaluate(&self, source: &str) -> ScriptResult<ScriptValue> {
        tracing::debug!(target: "scripting", bytes = source.len(), "Evaluating script");
        let result = self.bindings.scope().evaluate(source);
        if let Err(err) = &result {
            tracing::debug!(target: "scripting", kind = ?err.kind(), "Evaluation failed: {}", err);
        }
        result
    }

    /// 把一次执行交给调用方的执行器
    ///
    /// 任务持有当前作用域；之后调用 `clear_bindings` 不影响已提交的任务。
    pub fn evaluate_async<E>(&self, source: impl Into<String>, executor: &E) -> EvalHandle
    where
        E: Executor + ?Sized,
    {
        let (sender, receiver) = oneshot::channel();
        let scope = Arc::clone(self.bindings.scope());
        let token = new_token();
        let job_token = Arc::clone(&token);
        let source = source.into();

        tracing::debug!(target: "scripting", bytes = source.len(), "Submitting script");
        executor.execute(Box::new(move || {
            let result = scope.evaluate_with(job_token, &source);
            // 句柄已被丢弃时结果无人接收
            let _ = sender.send(result);
        }));

        EvalHandle::new(receiver, CancelHandle::job(token))
    }

    /// 调用顶层脚本函数
    pub fn call_function(&self, name: &str, args: &[ScriptValue]) -> ScriptResult<ScriptValue> {
        tracing::trace!(target: "scripting", function = name, argc = args.len(), "Calling function");
        self.bindings
            .scope()
            .enter(|ctx, state| call_function(ctx, state, name, args))
    }

    /// 调用嵌套对象上的方法，例如 `a.b.c`，接收者为 `a.b`
    pub fn call_object_method(&self, path: &str, args: &[ScriptValue]) -> ScriptResult<ScriptValue> {
        let segments = split_path(path)?;
        if segments.len() == 1 {
            return self.call_function(segments[0], args);
        }

        tracing::trace!(target: "scripting", path, argc = args.len(), "Calling object method");
        self.bindings
            .scope()
            .enter(|ctx, state| call_path(ctx, state, &segments, args))
    }

    /// 以数字读取绑定
    ///
    /// 未绑定（或为 null/undefined）时返回 NaN；文本去掉首尾空白后解析。
    pub fn read_as_number(&self, name: &str) -> ScriptResult<f64> {
        let text = match self.get(name)? {
            None | Some(ScriptValue::Undefined) | Some(ScriptValue::Null) => return Ok(f64::NAN),
            Some(ScriptValue::Number(n)) => return Ok(n),
            Some(ScriptValue::String(text)) => text,
            Some(other) => other.to_string(),
        };

        text.trim()
            .parse::<f64>()
            .map_err(|cause| ScriptError::NumberFormat {
                name: name.to_string(),
                text,
                cause,
            })
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("bindings", &self.bindings)
            .field("config", &self.config)
            .finish()
    }
}
