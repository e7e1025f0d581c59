//! 错误定义模块

use std::time::Duration;
use thiserror::Error;

/// 流水线统一错误类型
#[derive(Error, Debug)]
pub enum RtEditError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("服务未配置: {0}")]
    NotConfigured(&'static str),

    #[error("网络错误: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("服务 {service} 返回状态码 {status}")]
    Http { service: &'static str, status: u16 },

    #[error("响应解析错误: {0}")]
    Decode(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("切片索引 {index} 超出范围 [1, {len}]")]
    SliceOutOfRange { index: usize, len: usize },

    #[error("操作进行中: {0}")]
    Busy(&'static str),

    #[error("操作超时: {operation} (预算 {budget:?})")]
    Timeout { operation: String, budget: Duration },

    #[error("操作已取消: {0}")]
    Cancelled(String),

    #[error("上传第 {index}/{total} 个文件失败 (已上传 {uploaded}): {reason}")]
    UploadFailed {
        index: usize,
        uploaded: usize,
        total: usize,
        reason: String,
    },

    #[error("流水线步骤 {step} 失败: {reason}")]
    StepFailed { step: String, reason: String },

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl RtEditError {
    /// 是否为传输层错误（不可达、非2xx、超时）
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Http { .. } | Self::NotConfigured(_) | Self::Timeout { .. }
        )
    }
}

/// 流水线统一结果类型
pub type Result<T> = std::result::Result<T, RtEditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(RtEditError::Http { service: "archive", status: 502 }.is_transport());
        assert!(RtEditError::NotConfigured("extraction").is_transport());
        assert!(!RtEditError::Decode("missing rois".into()).is_transport());
        assert!(!RtEditError::Busy("workflow").is_transport());
    }

    #[test]
    fn test_upload_failure_message() {
        let err = RtEditError::UploadFailed {
            index: 3,
            uploaded: 2,
            total: 5,
            reason: "HTTP 500".into(),
        };
        assert_eq!(err.to_string(), "上传第 3/5 个文件失败 (已上传 2): HTTP 500");
    }
}
