//! 流水线演示程序
//!
//! 使用内存归档和模拟处理后端，走完 上传 → 选择检查 → 浏览切片 → 处理 → 导出 → 重置 的全过程

use async_trait::async_trait;
use bytes::Bytes;
use rtedit::model::{ImageRef, InstanceId, RoiRecord, Series, SeriesId, Study, StudyId};
use rtedit::integration::{
    ArchiveClient, RoiExtractor, SimulatedProcessingBackend, UploadFile, UploadReceipt,
};
use rtedit::workflow::{SliceDisplay, ViewerTool};
use rtedit::{Collaborators, ControllerSettings, PipelineController, RtEditError, TracingReporter};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SLICES: usize = 5;

/// 内存归档：上传的文件组成一个检查
#[derive(Default)]
struct MemoryArchive {
    uploaded: Mutex<Vec<String>>,
}

impl MemoryArchive {
    fn study_id() -> StudyId {
        StudyId::from("demo-study")
    }

    fn ct() -> Series {
        Series {
            id: SeriesId::from("demo-ct"),
            study_id: Self::study_id(),
            modality: Some("CT".to_string()),
            instances: (1..=SLICES)
                .map(|i| InstanceId::new(format!("ct-{}", i)))
                .collect(),
        }
    }

    fn rtstruct() -> Series {
        Series {
            id: SeriesId::from("demo-rt"),
            study_id: Self::study_id(),
            modality: Some("RTSTRUCT".to_string()),
            instances: vec![InstanceId::from("rs-1")],
        }
    }
}

#[async_trait]
impl ArchiveClient for MemoryArchive {
    async fn list_studies(&self) -> rtedit::Result<Vec<StudyId>> {
        if self.uploaded.lock().map(|u| u.is_empty()).unwrap_or(true) {
            return Ok(Vec::new());
        }
        Ok(vec![Self::study_id()])
    }

    async fn fetch_study(&self, id: &StudyId) -> rtedit::Result<Study> {
        if id != &Self::study_id() {
            return Err(RtEditError::NotFound(id.to_string()));
        }
        Ok(Study {
            id: id.clone(),
            patient_name: "DEMO^PATIENT".to_string(),
            study_date: Some("20240315".to_string()),
            series: vec![Self::ct().id, Self::rtstruct().id],
        })
    }

    async fn fetch_series(&self, id: &SeriesId) -> rtedit::Result<Series> {
        [Self::ct(), Self::rtstruct()]
            .into_iter()
            .find(|s| &s.id == id)
            .ok_or_else(|| RtEditError::NotFound(id.to_string()))
    }

    async fn upload(&self, file: &UploadFile) -> rtedit::Result<UploadReceipt> {
        let mut uploaded = self
            .uploaded
            .lock()
            .map_err(|_| RtEditError::Internal("archive lock poisoned".to_string()))?;
        uploaded.push(file.name.clone());
        Ok(UploadReceipt {
            file_name: file.name.clone(),
            instance_id: Some(InstanceId::new(format!("inst-{}", uploaded.len()))),
        })
    }

    async fn fetch_image(&self, image: &ImageRef) -> rtedit::Result<Bytes> {
        Ok(Bytes::from(format!("pixels of {}", image.instance)))
    }

    async fn fetch_segmentation(&self, instance: &InstanceId) -> rtedit::Result<Bytes> {
        Ok(Bytes::from(format!("DICOM-SEG {}", instance)))
    }
}

struct MemoryExtractor;

#[async_trait]
impl RoiExtractor for MemoryExtractor {
    async fn extract_rois(&self, _rtstruct: &InstanceId) -> rtedit::Result<Vec<RoiRecord>> {
        Ok(vec![
            RoiRecord { name: "GTV".to_string(), volume: Some(12.5) },
            RoiRecord { name: "PTV".to_string(), volume: Some(48.25) },
            RoiRecord { name: "SpinalCord".to_string(), volume: None },
        ])
    }
}

struct PrintDisplay;

#[async_trait]
impl SliceDisplay for PrintDisplay {
    async fn show(&self, image: &ImageRef, data: Bytes) -> rtedit::Result<()> {
        println!("   🖼  {} ({} bytes)", image, data.len());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    println!("🚀 RT-STRUCT 编辑流水线演示\n");

    let controller = PipelineController::new(
        Collaborators {
            archive: Arc::new(MemoryArchive::default()),
            extractor: Arc::new(MemoryExtractor),
            backend: Arc::new(SimulatedProcessingBackend::new(Duration::from_millis(200))),
            display: Arc::new(PrintDisplay),
            reporter: Arc::new(TracingReporter),
        },
        ControllerSettings::default(),
    );
    let cancel = CancellationToken::new();

    // 1. 上传
    let files: Vec<UploadFile> = (1..=SLICES)
        .map(|i| UploadFile::new(format!("CT{:03}.dcm", i), vec![0u8; 128]))
        .chain(std::iter::once(UploadFile::new("RS.dcm", vec![0u8; 64])))
        .collect();
    let report = controller.import_files(&files, &cancel).await?;
    println!("✅ 上传了 {} 个文件", report.total);

    // 2. 检查列表
    for study in controller.studies().await {
        println!("📋 {} {} {}", study.id, study.patient_name, study.display_date());
    }

    // 3. 选择检查
    let summary = controller
        .select_study(&MemoryArchive::study_id(), &cancel)
        .await?;
    println!(
        "✅ CT {} 张切片, {} 个ROI, 可处理: {}",
        summary.slices, summary.rois, summary.can_process
    );
    for roi in controller.session().await.rois {
        println!("   {} {} {}", roi.color, roi.name, roi.volume_label());
    }

    // 4. 浏览与ROI操作
    controller.select_tool(ViewerTool::WindowLevel).await?;
    controller.navigate_slice(3).await?;
    controller.dispatch_roi("toggle", 2).await?;
    controller.dispatch_roi("edit", 0).await?;

    // 5. 处理与导出
    controller.process(&cancel).await?;
    let state = controller.workflow_state().await;
    for step in &state.steps {
        println!("   {:<16} {}", step.step.label(), step.status.as_str());
    }
    let seg = controller.export().await?;
    println!("✅ 导出 {} 字节", seg.len());

    // 6. 重置
    controller.reset(true).await?;
    println!("\n✅ 演示完成！");
    Ok(())
}
