//! 外部服务端点
//!
//! 归档、ROI提取和编排服务的基础URL。未配置的服务不会导致启动失败，
//! 只会让对应调用返回 `NotConfigured`。

use rtedit_core::{Result, RtEditError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 外部服务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Service {
    Archive,
    Extraction,
    Orchestrator,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Archive => "archive",
            Self::Extraction => "extraction",
            Self::Orchestrator => "orchestrator",
        }
    }
}

/// 服务端点配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceEndpoints {
    pub archive_url: Option<String>,
    pub extraction_url: Option<String>,
    pub orchestrator_url: Option<String>,
}

impl ServiceEndpoints {
    pub fn base(&self, service: Service) -> Option<&str> {
        let url = match service {
            Service::Archive => self.archive_url.as_deref(),
            Service::Extraction => self.extraction_url.as_deref(),
            Service::Orchestrator => self.orchestrator_url.as_deref(),
        };
        url.map(str::trim).filter(|u| !u.is_empty())
    }

    /// 拼接服务URL
    pub fn url(&self, service: Service, path: &str) -> Result<String> {
        let base = self
            .base(service)
            .ok_or(RtEditError::NotConfigured(service.as_str()))?;
        Ok(join_url(base, path))
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// 构建共享HTTP客户端
///
/// 只限制建立连接的时间；每次调用的总时长由 [`crate::bounded`] 按各自预算控制。
pub fn build_client(connect_timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .build()?;
    Ok(client)
}

/// 把非2xx响应转换为错误
pub(crate) fn ensure_success(
    service: Service,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(RtEditError::Http {
            service: service.as_str(),
            status: status.as_u16(),
        })
    }
}
