//! 进度与通知上报
//!
//! 流水线与展示层之间的边界：进度百分比、进行中的文字状态、
//! 以及操作结束时的成功/失败通知。

use serde::{Deserialize, Serialize};

/// 通知级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

/// 终态通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, message)
    }
}

/// 展示层上报接口
pub trait ProgressReporter: Send + Sync {
    /// 进行中的文字状态
    fn status(&self, message: &str);

    /// 总体进度 (0–100)
    fn progress(&self, percent: f64);

    /// 操作结束通知
    fn notify(&self, notification: Notification);
}

/// 将进度与通知写入日志的默认上报器
#[derive(Debug, Default, Clone)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn status(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn progress(&self, percent: f64) {
        tracing::debug!("Progress {:.0}%", percent);
    }

    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Error => tracing::error!("{}", notification.message),
            _ => tracing::info!("{}", notification.message),
        }
    }
}
