//! 核心错误定义

use thiserror::Error;

/// 配置导入/更新错误
///
/// 出错时调用方持有的配置保持不变。
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// 操作队列错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// 重试次数耗尽
    #[error("Operation '{name}' failed after {attempts} attempt(s): {message}")]
    Failed {
        name: String,
        attempts: u32,
        message: String,
    },

    #[error("Operation '{0}' was cancelled before it started")]
    Cancelled(String),

    /// 队列在交付结果前被销毁
    #[error("Operation queue dropped before the result was delivered")]
    Dropped,
}
