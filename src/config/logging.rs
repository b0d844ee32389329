use std::fs::OpenOptions;
use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use super::{ConfigError, ConfigResult};
use crate::impl_default;

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: LogLevel,

    /// 日志文件路径，设置后输出到文件
    pub log_file_path: Option<String>,

    /// 是否输出到控制台
    pub log_to_console: bool,
}

impl_default!(LoggingConfig {
    level: LogLevel::Info,
    log_file_path: None,
    log_to_console: true,
});

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// 跟踪
    Trace,
    /// 调试
    Debug,
    /// 信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(ConfigError::ParseError(format!("unknown log level `{other}`"))),
        }
    }
}

/// 按配置组装订阅者：控制台和文件可以同时输出，两者都关闭时不输出
fn build_subscriber(
    config: &LoggingConfig,
) -> ConfigResult<impl tracing::Subscriber + Send + Sync + 'static> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_filter()));

    let file_layer = match &config.log_file_path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    let console_layer = config.log_to_console.then(fmt::layer);

    Ok(tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer))
}

/// 初始化日志系统
///
/// `RUST_LOG` 环境变量优先于配置中的级别。重复调用不会报错，
/// 已安装的订阅者保持不变。
pub fn init_logging(config: &LoggingConfig) -> ConfigResult<()> {
    if build_subscriber(config)?.try_init().is_ok() {
        tracing::debug!(target: "config", level = config.level.as_filter(), "Logging initialized");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parse() {
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_file_output_keeps_console_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.log");
        let config = LoggingConfig {
            level: LogLevel::Trace,
            log_file_path: Some(path.to_string_lossy().into_owned()),
            log_to_console: true,
        };

        let subscriber = build_subscriber(&config).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(target: "config", "written to file");
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("written to file"));
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        let config = LoggingConfig::default();
        assert!(init_logging(&config).is_ok());
        assert!(init_logging(&config).is_ok());
    }
}
