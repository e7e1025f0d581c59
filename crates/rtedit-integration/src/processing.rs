//! 处理服务后端
//!
//! 体素化、后处理和DICOM-SEG生成三个外部处理操作。这些服务的计算契约
//! 由各自的服务方定义，这里只负责发起调用并回传结果。

use async_trait::async_trait;
use rtedit_core::{InstanceId, Result, RtEditError, SeriesId, StudyId};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::endpoints::{ensure_success, Service, ServiceEndpoints};

/// 外部处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessingStage {
    Voxelize,
    PostProcess,
    GenerateOutput,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Voxelize => "voxelize",
            Self::PostProcess => "post-process",
            Self::GenerateOutput => "generate-output",
        }
    }
}

/// 处理请求：一对CT系列与RT-STRUCT实例
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRequest {
    pub study_id: StudyId,
    #[serde(rename = "series_uid")]
    pub ct_series: SeriesId,
    #[serde(rename = "rtstruct_uid")]
    pub rtstruct_instance: InstanceId,
}

/// 单个阶段的处理结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: ProcessingStage,
    pub detail: serde_json::Value,
    /// 生成的DICOM-SEG实例（仅输出阶段可能返回）
    pub output_instance: Option<InstanceId>,
}

/// 处理后端接口
#[async_trait]
pub trait ProcessingBackend: Send + Sync {
    async fn run_stage(
        &self,
        stage: ProcessingStage,
        request: &ProcessingRequest,
    ) -> Result<StageReport>;
}

/// 各阶段在编排服务上的路径
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagePaths {
    pub voxelize: String,
    pub post_process: String,
    pub generate_output: String,
}

impl Default for StagePaths {
    fn default() -> Self {
        Self {
            voxelize: "/api/rt/convert-to-seg".to_string(),
            post_process: "/api/morphology".to_string(),
            generate_output: "/api/workflow/process".to_string(),
        }
    }
}

impl StagePaths {
    fn path(&self, stage: ProcessingStage) -> &str {
        match stage {
            ProcessingStage::Voxelize => &self.voxelize,
            ProcessingStage::PostProcess => &self.post_process,
            ProcessingStage::GenerateOutput => &self.generate_output,
        }
    }
}

/// 通过编排服务HTTP接口执行处理阶段
#[derive(Debug, Clone)]
pub struct HttpProcessingBackend {
    client: reqwest::Client,
    endpoints: ServiceEndpoints,
    paths: StagePaths,
}

impl HttpProcessingBackend {
    pub fn new(client: reqwest::Client, endpoints: ServiceEndpoints, paths: StagePaths) -> Self {
        Self {
            client,
            endpoints,
            paths,
        }
    }
}

#[async_trait]
impl ProcessingBackend for HttpProcessingBackend {
    async fn run_stage(
        &self,
        stage: ProcessingStage,
        request: &ProcessingRequest,
    ) -> Result<StageReport> {
        let url = self
            .endpoints
            .url(Service::Orchestrator, self.paths.path(stage))?;
        debug!("POST {} ({})", url, stage.as_str());

        let response = self.client.post(&url).json(request).send().await?;
        let body = ensure_success(Service::Orchestrator, response)?.bytes().await?;
        let detail: serde_json::Value = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body)
                .map_err(|e| RtEditError::Decode(format!("{}: {}", stage.as_str(), e)))?
        };

        let output_instance = detail
            .get("output_instance_id")
            .and_then(|id| id.as_str())
            .map(InstanceId::from);

        info!("Stage {} finished for study {}", stage.as_str(), request.study_id);
        Ok(StageReport {
            stage,
            detail,
            output_instance,
        })
    }
}

/// 固定延时的模拟后端，用于没有处理服务时的演示与联调
#[derive(Debug, Clone)]
pub struct SimulatedProcessingBackend {
    delay: Duration,
}

impl SimulatedProcessingBackend {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl ProcessingBackend for SimulatedProcessingBackend {
    async fn run_stage(
        &self,
        stage: ProcessingStage,
        request: &ProcessingRequest,
    ) -> Result<StageReport> {
        debug!("Simulating {} for study {}", stage.as_str(), request.study_id);
        tokio::time::sleep(self.delay).await;
        let output_instance = match stage {
            ProcessingStage::GenerateOutput => Some(InstanceId::new(format!(
                "simulated-seg-{}",
                request.rtstruct_instance
            ))),
            _ => None,
        };
        Ok(StageReport {
            stage,
            detail: serde_json::json!({ "simulated": true }),
            output_instance,
        })
    }
}
