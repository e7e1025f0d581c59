//! 流水线工作流
//!
//! 固定的五步流水线：导入 → 体素化 → 编辑（可选）→ 后处理 → 生成输出。
//! 步骤严格按顺序执行；每个外部处理步骤在调用前置为 `Active`，
//! 调用成功后置为 `Completed`，失败时置为 `Failed` 并记录原因。

use rtedit_core::{InstanceId, Result, RtEditError};
use rtedit_integration::{bounded, ProcessingBackend, ProcessingRequest, ProcessingStage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::flight::SingleFlight;
use crate::reporter::ProgressReporter;
use crate::state_machine::{StepEvent, StepStateMachine, StepStatus};

/// 流水线步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStep {
    Import,
    Voxelize,
    Editing,
    PostProcess,
    GenerateOutput,
}

impl PipelineStep {
    pub const ALL: [PipelineStep; 5] = [
        PipelineStep::Import,
        PipelineStep::Voxelize,
        PipelineStep::Editing,
        PipelineStep::PostProcess,
        PipelineStep::GenerateOutput,
    ];

    pub fn index(&self) -> usize {
        match self {
            Self::Import => 0,
            Self::Voxelize => 1,
            Self::Editing => 2,
            Self::PostProcess => 3,
            Self::GenerateOutput => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Voxelize => "voxelize",
            Self::Editing => "editing",
            Self::PostProcess => "post-process",
            Self::GenerateOutput => "generate-output",
        }
    }

    /// 需要调用外部处理服务的步骤
    pub fn stage(&self) -> Option<ProcessingStage> {
        match self {
            Self::Voxelize => Some(ProcessingStage::Voxelize),
            Self::PostProcess => Some(ProcessingStage::PostProcess),
            Self::GenerateOutput => Some(ProcessingStage::GenerateOutput),
            Self::Import | Self::Editing => None,
        }
    }

    /// 步骤激活时上报的进度
    fn progress_on_start(&self) -> Option<u8> {
        match self {
            Self::Voxelize => Some(20),
            _ => None,
        }
    }

    /// 步骤完成时上报的进度
    fn progress_on_finish(&self) -> Option<u8> {
        match self {
            Self::Editing => Some(50),
            Self::PostProcess => Some(80),
            Self::GenerateOutput => Some(100),
            _ => None,
        }
    }
}

/// 单个步骤
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowStep {
    pub step: PipelineStep,
    pub status: StepStatus,
    pub failure: Option<String>,
}

/// 工作流状态快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowState {
    pub run_id: Option<Uuid>,
    pub steps: Vec<WorkflowStep>,
    pub target: Option<ProcessingRequest>,
    pub export_enabled: bool,
    pub output_instance: Option<InstanceId>,
    pub progress: u8,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self {
            run_id: None,
            steps: PipelineStep::ALL
                .iter()
                .map(|step| WorkflowStep {
                    step: *step,
                    status: StepStatus::Pending,
                    failure: None,
                })
                .collect(),
            target: None,
            export_enabled: false,
            output_instance: None,
            progress: 0,
        }
    }

    pub fn statuses(&self) -> Vec<StepStatus> {
        self.steps.iter().map(|s| s.status).collect()
    }

    pub fn status(&self, step: PipelineStep) -> StepStatus {
        self.steps[step.index()].status
    }

    /// 当前处于执行中或失败的步骤
    pub fn cursor(&self) -> Option<PipelineStep> {
        self.steps
            .iter()
            .find(|s| matches!(s.status, StepStatus::Active | StepStatus::Failed))
            .map(|s| s.step)
    }

    pub fn failed_step(&self) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }

    pub fn is_finished(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Completed)
    }

    /// 步骤状态不变式：游标之前全部完成，之后全部等待
    pub fn is_consistent(&self) -> bool {
        let open = self
            .steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Active | StepStatus::Failed))
            .count();
        if open > 1 {
            return false;
        }

        let boundary = match self.cursor() {
            Some(step) => step.index(),
            None => self
                .steps
                .iter()
                .position(|s| s.status != StepStatus::Completed)
                .unwrap_or(self.steps.len()),
        };
        let after = if self.cursor().is_some() { boundary + 1 } else { boundary };

        self.steps[..boundary]
            .iter()
            .all(|s| s.status == StepStatus::Completed)
            && self.steps[after..]
                .iter()
                .all(|s| s.status == StepStatus::Pending)
    }
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::new()
    }
}

/// 工作流执行器
pub struct Workflow {
    state: RwLock<WorkflowState>,
    state_machine: StepStateMachine,
    backend: Arc<dyn ProcessingBackend>,
    flight: SingleFlight,
    step_budget: Duration,
}

impl Workflow {
    pub fn new(backend: Arc<dyn ProcessingBackend>, step_budget: Duration) -> Self {
        Self {
            state: RwLock::new(WorkflowState::new()),
            state_machine: StepStateMachine::new(),
            backend,
            flight: SingleFlight::new("workflow"),
            step_budget,
        }
    }

    pub async fn snapshot(&self) -> WorkflowState {
        self.state.read().await.clone()
    }

    pub fn in_flight(&self) -> bool {
        self.flight.in_flight()
    }

    /// 设置处理目标
    ///
    /// 目标变化时，除导入外的所有步骤回到 `Pending`，导出状态清空；
    /// 运行中调用返回 `Busy`。目标不变时保留当前状态。
    pub async fn select_target(&self, target: Option<ProcessingRequest>) -> Result<()> {
        let _permit = self.flight.acquire()?;
        let mut state = self.state.write().await;
        if state.target == target {
            return Ok(());
        }

        let imported = state.status(PipelineStep::Import) == StepStatus::Completed;
        let mut next = WorkflowState::new();
        if imported {
            next.steps[PipelineStep::Import.index()].status = StepStatus::Completed;
        }
        next.target = target;
        info!(
            "Workflow target changed to {}",
            next.target
                .as_ref()
                .map(|t| t.study_id.as_str())
                .unwrap_or("none")
        );
        *state = next;
        Ok(())
    }

    /// 上传完成后标记导入步骤
    pub async fn mark_imported(&self) -> Result<()> {
        let status = self.state.read().await.status(PipelineStep::Import);
        match status {
            StepStatus::Pending => self.apply(PipelineStep::Import, StepEvent::Skip, None).await,
            _ => Ok(()),
        }
    }

    /// 从第一个未完成的步骤开始运行整条流水线
    pub async fn run(
        &self,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let _permit = self.flight.acquire()?;

        let (target, start) = {
            let mut state = self.state.write().await;
            let target = state.target.clone().ok_or_else(|| {
                RtEditError::Validation("no CT + RT-STRUCT pair selected".to_string())
            })?;
            if state.is_finished() {
                return Err(RtEditError::Validation(
                    "workflow already completed, reset before running again".to_string(),
                ));
            }
            if let Some(failed) = state.failed_step() {
                return Err(RtEditError::Validation(format!(
                    "step {} failed, retry or reset first",
                    failed.step.label()
                )));
            }
            let start = state
                .steps
                .iter()
                .position(|s| s.status != StepStatus::Completed)
                .unwrap_or(0);
            let run_id = Uuid::new_v4();
            state.run_id = Some(run_id);
            state.progress = 0;
            info!("Workflow run {} started for study {}", run_id, target.study_id);
            (target, start)
        };

        reporter.status("Processing...");
        reporter.progress(0.0);
        self.drive(start, &target, reporter, cancel).await
    }

    /// 从失败的步骤恢复运行
    pub async fn retry(
        &self,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let _permit = self.flight.acquire()?;

        let (target, start) = {
            let state = self.state.read().await;
            let failed = state
                .failed_step()
                .ok_or_else(|| RtEditError::Validation("no failed step to retry".to_string()))?
                .step;
            let target = state.target.clone().ok_or_else(|| {
                RtEditError::Validation("no CT + RT-STRUCT pair selected".to_string())
            })?;
            (target, failed)
        };

        info!("Retrying workflow from step {}", start.label());
        self.apply(start, StepEvent::Retry, None).await?;
        reporter.status("Processing...");
        self.drive(start.index(), &target, reporter, cancel).await
    }

    /// 清空全部步骤状态与处理目标
    pub async fn reset(&self) -> Result<()> {
        let _permit = self.flight.acquire()?;
        *self.state.write().await = WorkflowState::new();
        info!("Workflow reset");
        Ok(())
    }

    /// 可导出的DICOM-SEG实例
    pub async fn export_target(&self) -> Result<InstanceId> {
        let state = self.state.read().await;
        if !state.export_enabled {
            return Err(RtEditError::Validation("export is not enabled yet".to_string()));
        }
        state
            .output_instance
            .clone()
            .ok_or_else(|| RtEditError::NotFound("no DICOM-SEG output instance".to_string()))
    }

    async fn drive(
        &self,
        start: usize,
        target: &ProcessingRequest,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for step in &PipelineStep::ALL[start..] {
            let step = *step;
            let status = self.state.read().await.status(step);

            let stage = match step.stage() {
                Some(stage) => stage,
                None => {
                    if status == StepStatus::Pending {
                        self.apply(step, StepEvent::Skip, None).await?;
                    }
                    self.checkpoint(step.progress_on_finish(), reporter).await;
                    continue;
                }
            };

            if status == StepStatus::Pending {
                self.apply(step, StepEvent::Activate, None).await?;
            }
            self.checkpoint(step.progress_on_start(), reporter).await;

            let outcome = bounded(
                step.label(),
                self.step_budget,
                cancel,
                self.backend.run_stage(stage, target),
            )
            .await;

            match outcome {
                Ok(report) => {
                    debug!("Step {} report: {}", step.label(), report.detail);
                    self.apply(step, StepEvent::Complete, None).await?;
                    if let Some(instance) = report.output_instance {
                        self.state.write().await.output_instance = Some(instance);
                    }
                    self.checkpoint(step.progress_on_finish(), reporter).await;
                }
                Err(e) => {
                    error!("Step {} failed: {}", step.label(), e);
                    let reason = e.to_string();
                    self.apply(step, StepEvent::Fail, Some(reason.clone())).await?;
                    return Err(RtEditError::StepFailed {
                        step: step.label().to_string(),
                        reason,
                    });
                }
            }
        }

        self.state.write().await.export_enabled = true;
        info!("Workflow finished for study {}", target.study_id);
        Ok(())
    }

    async fn apply(
        &self,
        step: PipelineStep,
        event: StepEvent,
        failure: Option<String>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let slot = &mut state.steps[step.index()];
        let next = self.state_machine.transition(slot.status, event)?;
        debug!("Step {} {} -> {}", step.label(), slot.status.as_str(), next.as_str());
        slot.status = next;
        slot.failure = failure;
        debug_assert!(state.is_consistent(), "step statuses out of order");
        Ok(())
    }

    async fn checkpoint(&self, progress: Option<u8>, reporter: &dyn ProgressReporter) {
        if let Some(percent) = progress {
            self.state.write().await.progress = percent;
            reporter.progress(f64::from(percent));
        }
    }
}
