//! 流水线控制器
//!
//! 编辑会话的唯一持有者。把上传、目录、查看器、ROI提取与工作流串联起来，
//! 并在每个整体操作结束时发出终态通知。

use bytes::Bytes;
use rtedit_core::{rois_from_records, ImageRef, Result, RtEditError, SeriesId, Study, StudyId};
use rtedit_integration::{
    bounded, ArchiveClient, ProcessingBackend, RoiExtractor, UploadFile,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::{StudyCatalog, MAX_LISTED_STUDIES};
use crate::commands::CommandTable;
use crate::reporter::{Notification, ProgressReporter};
use crate::session::{reduce, SessionEvent, SessionState, ViewerTool};
use crate::upload::{UploadCoordinator, UploadReport};
use crate::viewer::{SliceDisplay, SliceRenderer};
use crate::workflow::{Workflow, WorkflowState};

/// 控制器参数
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub study_limit: usize,
    pub upload_budget: Duration,
    pub extraction_budget: Duration,
    pub step_budget: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            study_limit: MAX_LISTED_STUDIES,
            upload_budget: Duration::from_secs(120),
            extraction_budget: Duration::from_secs(60),
            step_budget: Duration::from_secs(300),
        }
    }
}

/// 选择检查后的摘要
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSummary {
    pub study_id: StudyId,
    pub ct_series: Option<SeriesId>,
    pub rtstruct_series: Option<SeriesId>,
    pub slices: usize,
    pub rois: usize,
    pub can_process: bool,
}

/// 外部协作者
pub struct Collaborators {
    pub archive: Arc<dyn ArchiveClient>,
    pub extractor: Arc<dyn RoiExtractor>,
    pub backend: Arc<dyn ProcessingBackend>,
    pub display: Arc<dyn SliceDisplay>,
    pub reporter: Arc<dyn ProgressReporter>,
}

/// 流水线控制器
pub struct PipelineController {
    archive: Arc<dyn ArchiveClient>,
    extractor: Arc<dyn RoiExtractor>,
    reporter: Arc<dyn ProgressReporter>,
    catalog: StudyCatalog,
    uploads: UploadCoordinator,
    workflow: Workflow,
    renderer: SliceRenderer,
    commands: CommandTable,
    session: RwLock<SessionState>,
    extraction_budget: Duration,
}

impl PipelineController {
    pub fn new(collaborators: Collaborators, settings: ControllerSettings) -> Self {
        let Collaborators {
            archive,
            extractor,
            backend,
            display,
            reporter,
        } = collaborators;

        Self {
            catalog: StudyCatalog::new(archive.clone(), settings.study_limit),
            uploads: UploadCoordinator::new(archive.clone(), settings.upload_budget),
            workflow: Workflow::new(backend, settings.step_budget),
            renderer: SliceRenderer::new(archive.clone(), display),
            commands: CommandTable::new(),
            session: RwLock::new(SessionState::default()),
            extraction_budget: settings.extraction_budget,
            archive,
            extractor,
            reporter,
        }
    }

    pub async fn session(&self) -> SessionState {
        self.session.read().await.clone()
    }

    pub async fn workflow_state(&self) -> WorkflowState {
        self.workflow.snapshot().await
    }

    pub async fn studies(&self) -> Vec<Study> {
        self.catalog.studies().await
    }

    /// 上传一批文件；全部成功后刷新目录并完成导入步骤
    pub async fn import_files(
        &self,
        files: &[UploadFile],
        cancel: &CancellationToken,
    ) -> Result<UploadReport> {
        let report = match self
            .uploads
            .upload_batch(files, self.reporter.as_ref(), cancel)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                self.reporter.notify(Notification::error(format!("Upload failed: {}", e)));
                return Err(e);
            }
        };

        self.workflow.mark_imported().await?;
        if let Err(e) = self.catalog.refresh().await {
            warn!("Catalog refresh after upload failed: {}", e);
            self.reporter
                .notify(Notification::error(format!("Failed to load studies: {}", e)));
        }

        self.reporter.notify(Notification::success(format!(
            "{} files uploaded",
            report.total
        )));
        Ok(report)
    }

    pub async fn refresh_catalog(&self) -> Result<Vec<Study>> {
        self.catalog.refresh().await.map_err(|e| {
            self.reporter
                .notify(Notification::error(format!("Failed to load studies: {}", e)));
            e
        })
    }

    /// 选择检查：分类系列、加载首张切片、提取ROI
    ///
    /// 处理运行中不能切换检查。
    pub async fn select_study(
        &self,
        study_id: &StudyId,
        cancel: &CancellationToken,
    ) -> Result<SelectionSummary> {
        if self.workflow.in_flight() {
            return Err(RtEditError::Busy("workflow"));
        }
        info!("Loading study {}", study_id);
        self.reporter.status("Loading study...");

        let (study, classification) = match self.catalog.classify(study_id).await {
            Ok(result) => result,
            Err(e) => {
                self.reporter
                    .notify(Notification::error(format!("Failed to load study: {}", e)));
                return Err(e);
            }
        };

        let rtstruct_instance = classification.rtstruct_instance().cloned();
        if let Err(e) = self
            .workflow
            .select_target(classification.processing_request())
            .await
        {
            self.reporter
                .notify(Notification::error(format!("Failed to load study: {}", e)));
            return Err(e);
        }

        let first_image = {
            let mut session = self.session.write().await;
            *session = reduce(
                &session,
                SessionEvent::StudySelected {
                    study,
                    classification,
                },
            )?;
            session.viewer.as_ref().map(|v| v.current_image().clone())
        };

        if let Some(image) = first_image {
            self.renderer.render(&image).await;
        }

        if let Some(instance) = rtstruct_instance {
            let extraction = bounded(
                "extract-rois",
                self.extraction_budget,
                cancel,
                self.extractor.extract_rois(&instance),
            )
            .await;

            match extraction {
                Ok(records) => {
                    let mut session = self.session.write().await;
                    let still_selected = session
                        .study
                        .as_ref()
                        .map(|s| &s.id == study_id)
                        .unwrap_or(false);
                    if still_selected {
                        *session = reduce(&session, SessionEvent::RoisLoaded(rois_from_records(records)))?;
                    }
                }
                Err(e) => warn!("ROI extraction for {} failed: {}", instance, e),
            }
        }

        let session = self.session.read().await;
        let summary = SelectionSummary {
            study_id: study_id.clone(),
            ct_series: session
                .classification
                .as_ref()
                .and_then(|c| c.ct.as_ref().map(|s| s.id.clone())),
            rtstruct_series: session
                .classification
                .as_ref()
                .and_then(|c| c.rtstruct.as_ref().map(|s| s.id.clone())),
            slices: session.viewer.as_ref().map(|v| v.len()).unwrap_or(0),
            rois: session.rois.len(),
            can_process: session.can_process(),
        };

        if summary.can_process {
            self.reporter
                .notify(Notification::success("CT + RT-STRUCT detected"));
        }
        Ok(summary)
    }

    /// 切换到第 `index` 张切片（从1开始）
    pub async fn navigate_slice(&self, index: usize) -> Result<ImageRef> {
        let image = {
            let mut session = self.session.write().await;
            *session = reduce(&session, SessionEvent::SliceSelected(index))?;
            session
                .viewer
                .as_ref()
                .map(|v| v.current_image().clone())
                .ok_or_else(|| RtEditError::Internal("viewer vanished".to_string()))?
        };
        self.renderer.render(&image).await;
        Ok(image)
    }

    /// 按动作名执行ROI操作
    pub async fn dispatch_roi(&self, action: &str, roi_index: usize) -> Result<()> {
        let mut session = self.session.write().await;
        *session = self.commands.dispatch(&session, action, roi_index)?;
        Ok(())
    }

    pub async fn select_tool(&self, tool: ViewerTool) -> Result<()> {
        let mut session = self.session.write().await;
        *session = reduce(&session, SessionEvent::ToolSelected(tool))?;
        Ok(())
    }

    /// 运行处理流水线
    pub async fn process(&self, cancel: &CancellationToken) -> Result<()> {
        if !self.session.read().await.can_process() {
            return Err(RtEditError::Validation(
                "processing requires both a CT and an RT-STRUCT series".to_string(),
            ));
        }
        let outcome = self.workflow.run(self.reporter.as_ref(), cancel).await;
        self.finish_run(outcome)
    }

    /// 从失败步骤重试
    pub async fn retry(&self, cancel: &CancellationToken) -> Result<()> {
        let outcome = self.workflow.retry(self.reporter.as_ref(), cancel).await;
        self.finish_run(outcome)
    }

    fn finish_run(&self, outcome: Result<()>) -> Result<()> {
        match &outcome {
            Ok(()) => self
                .reporter
                .notify(Notification::success("Workflow completed")),
            Err(e) => self
                .reporter
                .notify(Notification::error(format!("Workflow failed: {}", e))),
        }
        outcome
    }

    /// 下载生成的DICOM-SEG
    pub async fn export(&self) -> Result<Bytes> {
        let instance = self.workflow.export_target().await?;
        self.reporter.notify(Notification::info("Exporting DICOM-SEG..."));
        let data = self.archive.fetch_segmentation(&instance).await.map_err(|e| {
            self.reporter
                .notify(Notification::error(format!("Export failed: {}", e)));
            e
        })?;
        info!("Exported DICOM-SEG {} ({} bytes)", instance, data.len());
        Ok(data)
    }

    /// 完全重置；未确认时不做任何修改
    pub async fn reset(&self, confirmed: bool) -> Result<bool> {
        if !confirmed {
            return Ok(false);
        }
        if self.uploads.in_flight() {
            return Err(RtEditError::Busy("upload"));
        }
        self.workflow.reset().await?;
        let mut session = self.session.write().await;
        *session = reduce(&session, SessionEvent::Reset)?;
        info!("Session reset");
        Ok(true)
    }
}
