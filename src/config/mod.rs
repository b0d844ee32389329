/// 脚本引擎配置系统
///
/// 提供TOML/JSON配置文件、环境变量覆盖和配置验证
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub mod logging;

pub use logging::{init_logging, LogLevel, LoggingConfig};

use crate::impl_default;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// QuickJS 运行时允许的最小内存上限
const MIN_MEMORY_LIMIT: usize = 1024 * 1024;
/// 最小栈大小
const MIN_STACK_SIZE: usize = 64 * 1024;

/// 脚本引擎主配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptEngineConfig {
    /// 运行时限制
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// 执行配置
    #[serde(default)]
    pub evaluation: EvaluationConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 运行时限制
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// 内存上限（字节），None 表示不限制
    pub memory_limit: Option<usize>,

    /// 最大栈大小（字节）
    pub max_stack_size: Option<usize>,

    /// GC 触发阈值（字节）
    pub gc_threshold: Option<usize>,
}

impl_default!(RuntimeConfig {
    memory_limit: None,
    max_stack_size: Some(1024 * 1024),
    gc_threshold: None,
});

impl RuntimeConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(limit) = self.memory_limit {
            if limit < MIN_MEMORY_LIMIT {
                return Err(ConfigError::ValidationError(format!(
                    "memory_limit must be at least {} bytes",
                    MIN_MEMORY_LIMIT
                )));
            }
        }
        if let Some(stack) = self.max_stack_size {
            if stack < MIN_STACK_SIZE {
                return Err(ConfigError::ValidationError(format!(
                    "max_stack_size must be at least {} bytes",
                    MIN_STACK_SIZE
                )));
            }
        }
        if self.gc_threshold == Some(0) {
            return Err(ConfigError::ValidationError(
                "gc_threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// 执行配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// 单次执行的超时时间（毫秒）
    pub timeout_ms: Option<u64>,
}

impl_default!(EvaluationConfig { timeout_ms: None });

impl EvaluationConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::ValidationError(
                "timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl ScriptEngineConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_json_str(&content)
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 保存为TOML文件
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 保存为JSON文件
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("SCRIPT_ENGINE_MEMORY_LIMIT") {
            if let Ok(limit) = val.parse() {
                self.runtime.memory_limit = Some(limit);
            }
        }
        if let Ok(val) = env::var("SCRIPT_ENGINE_MAX_STACK_SIZE") {
            if let Ok(size) = val.parse() {
                self.runtime.max_stack_size = Some(size);
            }
        }
        if let Ok(val) = env::var("SCRIPT_ENGINE_GC_THRESHOLD") {
            if let Ok(threshold) = val.parse() {
                self.runtime.gc_threshold = Some(threshold);
            }
        }
        if let Ok(val) = env::var("SCRIPT_ENGINE_EVAL_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                self.evaluation.timeout_ms = Some(ms);
            }
        }
        if let Ok(val) = env::var("SCRIPT_ENGINE_LOG_LEVEL") {
            if let Ok(level) = val.parse() {
                self.logging.level = level;
            }
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        self.runtime.validate()?;
        self.evaluation.validate()?;
        Ok(())
    }

    /// 自动查找并加载配置文件
    ///
    /// 按以下顺序查找：
    /// 1. ./script_engine.toml
    /// 2. ./script_engine.json
    /// 3. <用户配置目录>/script_engine/config.toml
    /// 4. 使用默认配置
    pub fn load_or_default() -> Self {
        if let Ok(config) = Self::from_toml_file("script_engine.toml") {
            tracing::info!(target: "config", "Loaded config from script_engine.toml");
            return config;
        }

        if let Ok(config) = Self::from_json_file("script_engine.json") {
            tracing::info!(target: "config", "Loaded config from script_engine.json");
            return config;
        }

        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("script_engine").join("config.toml");

            if let Ok(config) = Self::from_toml_file(&config_path) {
                tracing::info!(target: "config", "Loaded config from {:?}", config_path);
                return config;
            }
        }

        tracing::debug!(target: "config", "Using default configuration");
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScriptEngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.evaluation.timeout(), None);
    }

    #[test]
    fn test_toml_serialization() {
        let mut config = ScriptEngineConfig::default();
        config.runtime.memory_limit = Some(64 * 1024 * 1024);
        config.evaluation.timeout_ms = Some(250);

        let toml_str = toml::to_string(&config).unwrap();
        let parsed: ScriptEngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.runtime, config.runtime);
        assert_eq!(parsed.evaluation.timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_json_serialization() {
        let config = ScriptEngineConfig::default();
        let json_str = serde_json::to_string(&config).unwrap();
        let parsed = ScriptEngineConfig::from_json_str(&json_str).unwrap();
        assert_eq!(parsed.runtime, config.runtime);
        assert_eq!(parsed.logging.level, config.logging.level);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ScriptEngineConfig::from_toml_str(
            r#"
            [evaluation]
            timeout_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.evaluation.timeout_ms, Some(500));
        assert_eq!(config.runtime, RuntimeConfig::default());
    }

    #[test]
    fn test_validation_rejects_tiny_limits() {
        let mut config = ScriptEngineConfig::default();
        config.runtime.memory_limit = Some(1024);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = ScriptEngineConfig::default();
        config.evaluation.timeout_ms = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml() {
        let result = ScriptEngineConfig::from_toml_str("runtime = 3");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");

        let mut config = ScriptEngineConfig::default();
        config.runtime.gc_threshold = Some(4 * 1024 * 1024);
        config.save_toml(&path).unwrap();

        let loaded = ScriptEngineConfig::from_toml_file(&path).unwrap();
        assert_eq!(loaded.runtime.gc_threshold, Some(4 * 1024 * 1024));

        let json_path = dir.path().join("engine.json");
        config.save_json(&json_path).unwrap();
        let loaded = ScriptEngineConfig::from_json_file(&json_path).unwrap();
        assert_eq!(loaded.runtime, config.runtime);
    }

    #[test]
    fn test_missing_file() {
        let result = ScriptEngineConfig::from_toml_file("/nonexistent/script_engine.toml");
        assert!(matches!(result, Err(ConfigError::FileError(_))));
    }
}
