//! 统一错误处理模块
//!
//! 脚本引擎对外暴露的所有失败都收敛到 [`ScriptError`]：
//!
//! - **运行时错误** (`Script`): QuickJS 自身报告的语法/运行时错误
//! - **宿主调用错误** (`HostInvocation`): 桥接的原生方法拒绝了参数或执行失败
//! - **不支持的操作** (`Unsupported`): 对宿主函数做了结构性操作
//! - **路径不存在** (`NoSuchPath`): 点分路径或顶层函数名无法解析
//! - **数字格式错误** (`NumberFormat`): 文本绑定无法解析为数字

use std::fmt;
use std::num::ParseFloatError;
use std::sync::Arc;

use thiserror::Error;

/// 可跨线程传递的底层错误
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 共享的错误原因
pub type ErrorCause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// 脚本引擎错误类型
#[derive(Error, Debug, Clone)]
pub enum ScriptError {
    #[error("{message}{}", position_suffix(.line, .column))]
    Script {
        message: String,
        line: Option<u32>,
        column: Option<u32>,
    },

    #[error("{message}{}", position_suffix(.line, .column))]
    HostInvocation {
        message: String,
        line: Option<u32>,
        column: Option<u32>,
        #[source]
        cause: Option<ErrorCause>,
    },

    #[error("{message}{}", position_suffix(.line, .column))]
    Unsupported {
        message: String,
        line: Option<u32>,
        column: Option<u32>,
    },

    #[error("No such path: {path} ({reason})")]
    NoSuchPath { path: String, reason: String },

    #[error("Binding `{name}` cannot be read as a number: {text:?}")]
    NumberFormat {
        name: String,
        text: String,
        #[source]
        cause: ParseFloatError,
    },

    #[error("Script evaluation interrupted: {reason}")]
    Interrupted { reason: InterruptReason },

    #[error("Initialization error: {0}")]
    Init(String),
}

/// 中断原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptReason {
    /// 调用方请求取消
    Cancelled,
    /// 超过配置的执行时限
    TimedOut,
    /// 执行器在运行前丢弃了任务
    Abandoned,
}

impl fmt::Display for InterruptReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterruptReason::Cancelled => f.write_str("cancelled"),
            InterruptReason::TimedOut => f.write_str("timed out"),
            InterruptReason::Abandoned => f.write_str("abandoned by executor"),
        }
    }
}

/// 错误分类，便于调用方匹配
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SyntaxOrRuntime,
    HostInvocation,
    UnsupportedOperation,
    NoSuchPath,
    NumberFormat,
    Interrupted,
    Init,
}

fn position_suffix(line: &Option<u32>, column: &Option<u32>) -> String {
    match (line, column) {
        (Some(line), Some(column)) => format!(" (line {line}, column {column})"),
        (Some(line), None) => format!(" (line {line})"),
        _ => String::new(),
    }
}

impl ScriptError {
    pub fn script(message: impl Into<String>) -> Self {
        ScriptError::Script {
            message: message.into(),
            line: None,
            column: None,
        }
    }

    pub fn host_invocation(message: impl Into<String>, cause: Option<ErrorCause>) -> Self {
        ScriptError::HostInvocation {
            message: message.into(),
            line: None,
            column: None,
            cause,
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        ScriptError::Unsupported {
            message: message.into(),
            line: None,
            column: None,
        }
    }

    pub fn no_such_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ScriptError::NoSuchPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// 附加源码位置；对不携带位置的错误类型无效果
    pub fn at_position(mut self, position: Option<(u32, Option<u32>)>) -> Self {
        if let Some((new_line, new_column)) = position {
            match &mut self {
                ScriptError::Script { line, column, .. }
                | ScriptError::HostInvocation { line, column, .. }
                | ScriptError::Unsupported { line, column, .. } => {
                    *line = Some(new_line);
                    *column = new_column;
                }
                _ => {}
            }
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ScriptError::Script { .. } => ErrorKind::SyntaxOrRuntime,
            ScriptError::HostInvocation { .. } => ErrorKind::HostInvocation,
            ScriptError::Unsupported { .. } => ErrorKind::UnsupportedOperation,
            ScriptError::NoSuchPath { .. } => ErrorKind::NoSuchPath,
            ScriptError::NumberFormat { .. } => ErrorKind::NumberFormat,
            ScriptError::Interrupted { .. } => ErrorKind::Interrupted,
            ScriptError::Init(_) => ErrorKind::Init,
        }
    }

    /// 错误消息（不含位置后缀）
    pub fn message(&self) -> String {
        match self {
            ScriptError::Script { message, .. }
            | ScriptError::HostInvocation { message, .. }
            | ScriptError::Unsupported { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// 触发错误的脚本行号（1 起始）
    pub fn line(&self) -> Option<u32> {
        match self {
            ScriptError::Script { line, .. }
            | ScriptError::HostInvocation { line, .. }
            | ScriptError::Unsupported { line, .. } => *line,
            _ => None,
        }
    }

    pub fn column(&self) -> Option<u32> {
        match self {
            ScriptError::Script { column, .. }
            | ScriptError::HostInvocation { column, .. }
            | ScriptError::Unsupported { column, .. } => *column,
            _ => None,
        }
    }
}

/// 脚本结果类型别名
pub type ScriptResult<T> = Result<T, ScriptError>;
