//! 协作式中断
//!
//! QuickJS 周期性调用运行时的中断回调；回调返回 `true` 时当前执行抛出不可捕获的错误。
//! 每次进入运行时都装载一个取消令牌，取消只作用于持有该令牌的那次执行。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::core::InterruptReason;

use super::scope::lock;

/// 单次执行的取消标志
pub(crate) type CancelToken = Arc<AtomicBool>;

pub(crate) fn new_token() -> CancelToken {
    Arc::new(AtomicBool::new(false))
}

/// 与运行时中断回调共享的状态
#[derive(Debug, Default)]
pub(crate) struct InterruptState {
    active: Mutex<Option<CancelToken>>,
    deadline: Mutex<Option<Instant>>,
    tripped: Mutex<Option<InterruptReason>>,
}

impl InterruptState {
    /// 取消当前正在运行的执行；空闲时不产生任何效果
    pub(crate) fn cancel_active(&self) -> bool {
        match lock(&self.active).as_ref() {
            Some(token) => {
                token.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub(crate) fn active_cancelled(&self) -> bool {
        lock(&self.active)
            .as_ref()
            .is_some_and(|token| token.load(Ordering::SeqCst))
    }

    /// 进入运行时前调用，装载本次执行的令牌
    pub(crate) fn arm(&self, token: CancelToken, timeout: Option<Duration>) {
        *lock(&self.active) = Some(token);
        *lock(&self.deadline) = timeout.map(|t| Instant::now() + t);
        *lock(&self.tripped) = None;
    }

    /// 离开运行时后调用
    pub(crate) fn disarm(&self) {
        *lock(&self.active) = None;
        *lock(&self.deadline) = None;
    }

    /// 中断回调
    pub(crate) fn should_interrupt(&self) -> bool {
        let reason = if self.active_cancelled() {
            InterruptReason::Cancelled
        } else if lock(&self.deadline).is_some_and(|deadline| Instant::now() >= deadline) {
            InterruptReason::TimedOut
        } else {
            return false;
        };
        *lock(&self.tripped) = Some(reason);
        true
    }

    /// 本次执行是否被中断过
    pub(crate) fn take_tripped(&self) -> Option<InterruptReason> {
        lock(&self.tripped).take()
    }
}

#[derive(Debug, Clone)]
enum Target {
    /// 引擎上正在运行的任意一次执行
    Active(Arc<InterruptState>),
    /// 一次已提交的异步执行
    Job(CancelToken),
}

/// 取消句柄
///
/// 引擎的句柄取消当时正在运行的执行；[`EvalHandle`](super::EvalHandle) 的句柄只取消
/// 它自己的那次执行，在任务开始之前请求的取消会在任务开始时生效，任务结束后请求的取消被忽略。
#[derive(Debug, Clone)]
pub struct CancelHandle {
    target: Target,
}

impl CancelHandle {
    pub(crate) fn active(state: Arc<InterruptState>) -> Self {
        Self {
            target: Target::Active(state),
        }
    }

    pub(crate) fn job(token: CancelToken) -> Self {
        Self {
            target: Target::Job(token),
        }
    }

    pub fn cancel(&self) {
        match &self.target {
            Target::Active(state) => {
                let running = state.cancel_active();
                tracing::debug!(target: "scripting", running, "Cancellation requested");
            }
            Target::Job(token) => {
                tracing::debug!(target: "scripting", "Job cancellation requested");
                token.store(true, Ordering::SeqCst);
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match &self.target {
            Target::Active(state) => state.active_cancelled(),
            Target::Job(token) => token.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_trips_cancelled() {
        let state = InterruptState::default();
        let token = new_token();
        state.arm(Arc::clone(&token), None);
        assert!(!state.should_interrupt());

        token.store(true, Ordering::SeqCst);
        assert!(state.should_interrupt());
        assert_eq!(state.take_tripped(), Some(InterruptReason::Cancelled));
        assert_eq!(state.take_tripped(), None);
    }

    #[test]
    fn test_deadline_trips_timed_out() {
        let state = InterruptState::default();
        state.arm(new_token(), Some(Duration::ZERO));
        assert!(state.should_interrupt());
        assert_eq!(state.take_tripped(), Some(InterruptReason::TimedOut));
    }

    #[test]
    fn test_active_handle_ignored_while_idle() {
        let state = Arc::new(InterruptState::default());
        let handle = CancelHandle::active(Arc::clone(&state));
        handle.cancel();
        assert!(!handle.is_cancelled());

        state.arm(new_token(), None);
        assert!(!state.should_interrupt());

        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(state.should_interrupt());
        state.disarm();
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn test_job_handle_only_reaches_its_own_entry() {
        let state = InterruptState::default();
        let token = new_token();
        let handle = CancelHandle::job(Arc::clone(&token));

        // 任务开始前请求的取消在装载时生效
        handle.cancel();
        state.arm(token, None);
        assert!(state.should_interrupt());
        state.disarm();

        // 之后的执行使用新令牌，不受影响
        state.arm(new_token(), None);
        assert!(!state.should_interrupt());
        handle.cancel();
        assert!(!state.should_interrupt());
    }
}
