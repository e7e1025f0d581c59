//! # RT Editor Core
//!
//! RT-STRUCT 编辑流水线的核心模块，提供标识符、数据模型、错误定义和通用工具。

pub mod error;
pub mod models;
pub mod utils;

pub use error::{Result, RtEditError};
pub use models::*;
