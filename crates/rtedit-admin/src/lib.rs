//! # RT Editor 管理模块
//!
//! 配置加载与校验、日志初始化

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, CatalogConfig, ConfigManager, ConfigValidator, ProcessingConfig, ServicesConfig,
    UploadConfig,
};
pub use logging::{init_logging, LoggingConfig};
