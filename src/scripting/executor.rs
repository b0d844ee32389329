//! 异步执行
//!
//! 引擎不自行调度：`evaluate_async` 把一次执行作为一个任务交给调用方提供的
//! [`Executor`]，并返回代表最终结果的 [`EvalHandle`]。

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::thread;

use futures::channel::oneshot;

use crate::core::{InterruptReason, ScriptError, ScriptResult};

use super::interrupt::CancelHandle;
use super::value::ScriptValue;

/// 一个执行单元
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// 执行上下文
pub trait Executor {
    /// 提交任务；执行器丢弃任务时，对应的句柄以 `Interrupted` 结束
    fn execute(&self, job: Job);
}

impl<F> Executor for F
where
    F: Fn(Job),
{
    fn execute(&self, job: Job) {
        self(job)
    }
}

/// 交给 tokio 阻塞线程池，脚本执行不会占用异步工作线程
impl Executor for tokio::runtime::Handle {
    fn execute(&self, job: Job) {
        drop(self.spawn_blocking(job));
    }
}

impl Executor for tokio::runtime::Runtime {
    fn execute(&self, job: Job) {
        self.handle().execute(job)
    }
}

/// 每个任务一个命名线程
#[derive(Debug, Clone)]
pub struct ThreadExecutor {
    name: String,
}

impl ThreadExecutor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for ThreadExecutor {
    fn default() -> Self {
        Self::new("script-eval")
    }
}

impl Executor for ThreadExecutor {
    fn execute(&self, job: Job) {
        if let Err(err) = thread::Builder::new().name(self.name.clone()).spawn(job) {
            tracing::error!(target: "scripting", thread = %self.name, "Failed to spawn evaluation thread: {}", err);
        }
    }
}

/// 异步执行的结果句柄
///
/// 既可以 `.await`，也可以用 [`EvalHandle::wait`] 阻塞等待。
#[derive(Debug)]
pub struct EvalHandle {
    receiver: oneshot::Receiver<ScriptResult<ScriptValue>>,
    cancel: CancelHandle,
}

fn abandoned() -> ScriptError {
    ScriptError::Interrupted {
        reason: InterruptReason::Abandoned,
    }
}

impl EvalHandle {
    pub(crate) fn new(
        receiver: oneshot::Receiver<ScriptResult<ScriptValue>>,
        cancel: CancelHandle,
    ) -> Self {
        Self { receiver, cancel }
    }

    /// 请求取消本次执行；执行结束后请求的取消被忽略
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// 阻塞等待结果
    pub fn wait(self) -> ScriptResult<ScriptValue> {
        futures::executor::block_on(self)
    }

    /// 非阻塞查询；尚未完成时返回 `None`
    pub fn try_result(&mut self) -> Option<ScriptResult<ScriptValue>> {
        match self.receiver.try_recv() {
            Ok(result) => result,
            Err(oneshot::Canceled) => Some(Err(abandoned())),
        }
    }
}

impl Future for EvalHandle {
    type Output = ScriptResult<ScriptValue>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| Err(abandoned())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use crate::scripting::interrupt::new_token;

    fn handle() -> (oneshot::Sender<ScriptResult<ScriptValue>>, EvalHandle) {
        let (sender, receiver) = oneshot::channel();
        let cancel = CancelHandle::job(new_token());
        (sender, EvalHandle::new(receiver, cancel))
    }

    #[test]
    fn test_wait_for_result() {
        let (sender, handle) = handle();
        ThreadExecutor::default().execute(Box::new(move || {
            let _ = sender.send(Ok(ScriptValue::from(3)));
        }));
        assert_eq!(handle.wait().unwrap(), ScriptValue::Number(3.0));
    }

    #[test]
    fn test_try_result_pending_then_ready() {
        let (sender, mut handle) = handle();
        assert!(handle.try_result().is_none());
        sender.send(Ok(ScriptValue::Null)).unwrap();
        assert_eq!(handle.try_result().unwrap().unwrap(), ScriptValue::Null);
    }

    #[test]
    fn test_dropped_job_is_abandoned() {
        let (sender, handle) = handle();
        let dropping = |job: Job| drop(job);
        dropping.execute(Box::new(move || {
            let _ = sender.send(Ok(ScriptValue::Undefined));
        }));

        let err = handle.wait().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Interrupted);
    }

    #[test]
    fn test_cancel_reaches_shared_state() {
        let (_sender, handle) = handle();
        let cancel = handle.cancel_handle();
        handle.cancel();
        assert!(cancel.is_cancelled());
    }
}
