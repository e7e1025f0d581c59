//! # RT Editor 集成模块
//!
//! 提供与外部服务的集成功能，包括：
//! - 影像归档客户端：检查/系列查询、文件上传、DICOM对象读取
//! - ROI提取客户端：从RT-STRUCT提取ROI列表
//! - 处理后端：体素化、后处理、DICOM-SEG生成
//! - 外部调用的超时预算与取消

pub mod archive;
pub mod call;
pub mod endpoints;
pub mod extraction;
pub mod processing;

pub use archive::{ArchiveClient, HttpArchiveClient, UploadFile, UploadReceipt};
pub use call::bounded;
pub use endpoints::{build_client, Service, ServiceEndpoints};
pub use extraction::{HttpRoiExtractor, RoiExtractor};
pub use processing::{
    HttpProcessingBackend, ProcessingBackend, ProcessingRequest, ProcessingStage,
    SimulatedProcessingBackend, StagePaths, StageReport,
};
