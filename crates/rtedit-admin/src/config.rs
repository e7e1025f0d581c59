//! 配置管理
//!
//! 内置默认值 → 可选TOML文件 → `RTEDIT_` 环境变量，逐层覆盖。
//! 例如 `RTEDIT_SERVICES__ARCHIVE_URL=http://localhost:8042`。

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use rtedit_integration::{
    HttpProcessingBackend, ProcessingBackend, ServiceEndpoints, SimulatedProcessingBackend,
    StagePaths,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::logging::LoggingConfig;

/// 目录一次最多列出的检查数
const STUDY_LIMIT_CAP: usize = 20;

/// 完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 外部服务
    pub services: ServicesConfig,
    /// 处理流水线
    pub processing: ProcessingConfig,
    /// 上传
    pub upload: UploadConfig,
    /// 检查目录
    pub catalog: CatalogConfig,
    /// 日志
    pub logging: LoggingConfig,
}

/// 外部服务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub archive_url: Option<String>,
    pub extraction_url: Option<String>,
    pub orchestrator_url: Option<String>,
    /// ROI提取调用超时（秒）
    pub extraction_timeout_secs: u64,
    /// 建立连接超时（秒），不限制请求总时长
    pub connect_timeout_secs: u64,
}

/// 处理流水线配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub voxelize_path: String,
    pub post_process_path: String,
    pub generate_output_path: String,
    /// 单步超时（秒）
    pub step_timeout_secs: u64,
    /// 使用固定延时的模拟后端
    pub simulate: bool,
    pub simulated_delay_ms: u64,
}

/// 上传配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// 单个文件上传超时（秒）
    pub request_timeout_secs: u64,
}

/// 检查目录配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub study_limit: usize,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            archive_url: Some("http://localhost:8000".to_string()),
            extraction_url: Some("http://localhost:8000".to_string()),
            orchestrator_url: Some("http://localhost:8000".to_string()),
            extraction_timeout_secs: 60,
            connect_timeout_secs: 10,
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        let paths = StagePaths::default();
        Self {
            voxelize_path: paths.voxelize,
            post_process_path: paths.post_process,
            generate_output_path: paths.generate_output,
            step_timeout_secs: 300,
            simulate: false,
            simulated_delay_ms: 2000,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 120,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            study_limit: STUDY_LIMIT_CAP,
        }
    }
}

impl AppConfig {
    pub fn endpoints(&self) -> ServiceEndpoints {
        ServiceEndpoints {
            archive_url: self.services.archive_url.clone(),
            extraction_url: self.services.extraction_url.clone(),
            orchestrator_url: self.services.orchestrator_url.clone(),
        }
    }

    pub fn stage_paths(&self) -> StagePaths {
        StagePaths {
            voxelize: self.processing.voxelize_path.clone(),
            post_process: self.processing.post_process_path.clone(),
            generate_output: self.processing.generate_output_path.clone(),
        }
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.processing.step_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload.request_timeout_secs)
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.services.extraction_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.services.connect_timeout_secs)
    }

    /// 按配置选择处理后端
    pub fn processing_backend(&self, client: reqwest::Client) -> Arc<dyn ProcessingBackend> {
        if self.processing.simulate {
            info!(
                "Using simulated processing backend ({} ms per step)",
                self.processing.simulated_delay_ms
            );
            Arc::new(SimulatedProcessingBackend::new(Duration::from_millis(
                self.processing.simulated_delay_ms,
            )))
        } else {
            Arc::new(HttpProcessingBackend::new(
                client,
                self.endpoints(),
                self.stage_paths(),
            ))
        }
    }
}

/// 校验规则
struct ValidationRule {
    field_path: &'static str,
    validator: fn(&AppConfig) -> Result<()>,
}

/// 配置校验器
pub struct ConfigValidator {
    rules: Vec<ValidationRule>,
}

impl ConfigValidator {
    pub fn new() -> Self {
        let rules = vec![
            ValidationRule {
                field_path: "services.archive_url",
                validator: |c| check_url(c.services.archive_url.as_deref()),
            },
            ValidationRule {
                field_path: "services.extraction_url",
                validator: |c| check_url(c.services.extraction_url.as_deref()),
            },
            ValidationRule {
                field_path: "services.orchestrator_url",
                validator: |c| check_url(c.services.orchestrator_url.as_deref()),
            },
            ValidationRule {
                field_path: "services.extraction_timeout_secs",
                validator: |c| check_timeout(c.services.extraction_timeout_secs),
            },
            ValidationRule {
                field_path: "services.connect_timeout_secs",
                validator: |c| check_timeout(c.services.connect_timeout_secs),
            },
            ValidationRule {
                field_path: "processing.step_timeout_secs",
                validator: |c| check_timeout(c.processing.step_timeout_secs),
            },
            ValidationRule {
                field_path: "upload.request_timeout_secs",
                validator: |c| check_timeout(c.upload.request_timeout_secs),
            },
            ValidationRule {
                field_path: "catalog.study_limit",
                validator: |c| {
                    if (1..=STUDY_LIMIT_CAP).contains(&c.catalog.study_limit) {
                        Ok(())
                    } else {
                        Err(anyhow::anyhow!("must be between 1 and {}", STUDY_LIMIT_CAP))
                    }
                },
            },
        ];

        Self { rules }
    }

    pub fn validate(&self, config: &AppConfig) -> Result<()> {
        for rule in &self.rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(anyhow::anyhow!("Invalid {}: {}", rule.field_path, e));
            }
        }
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn check_url(url: Option<&str>) -> Result<()> {
    // 未配置的服务允许缺省
    let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) else {
        return Ok(());
    };
    let parsed = reqwest::Url::parse(url).with_context(|| format!("malformed URL `{}`", url))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(anyhow::anyhow!("unsupported scheme `{}` in `{}`", other, url)),
    }
}

fn check_timeout(secs: u64) -> Result<()> {
    if secs == 0 {
        Err(anyhow::anyhow!("timeout cannot be 0"))
    } else {
        Ok(())
    }
}

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 加载配置；`path` 为空时只使用默认值与环境变量
    pub fn load(path: Option<&str>) -> Result<AppConfig> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }
        let config = Self::assemble(builder.add_source(Self::environment()))?;

        match path {
            Some(path) => info!("Configuration loaded from: {}", path),
            None => info!("Configuration loaded from defaults and environment"),
        }
        Ok(config)
    }

    fn environment() -> Environment {
        Environment::with_prefix("RTEDIT")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn assemble(builder: ConfigBuilder<DefaultState>) -> Result<AppConfig> {
        let settings = builder.build().context("Failed to read configuration")?;
        let config: AppConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        ConfigValidator::new().validate(&config)?;
        Ok(config)
    }

    /// 渲染为TOML文本
    pub fn to_toml(config: &AppConfig) -> Result<String> {
        toml::to_string_pretty(config).context("Failed to serialize configuration")
    }

    /// 默认配置的TOML文本
    pub fn default_toml() -> Result<String> {
        Self::to_toml(&AppConfig::default())
    }
}
