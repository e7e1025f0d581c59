//! 测试用的内存实现

use async_trait::async_trait;
use bytes::Bytes;
use rtedit_core::{
    ImageRef, InstanceId, Result, RoiRecord, RtEditError, Series, SeriesId, Study, StudyId,
};
use rtedit_integration::{
    ArchiveClient, ProcessingBackend, ProcessingRequest, ProcessingStage, RoiExtractor,
    StageReport, UploadFile, UploadReceipt,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::reporter::{Notification, ProgressReporter};
use crate::viewer::SliceDisplay;

pub fn series(id: &str, study: &str, modality: &str, instances: usize) -> Series {
    Series {
        id: SeriesId::from(id),
        study_id: StudyId::from(study),
        modality: Some(modality.to_string()),
        instances: (1..=instances)
            .map(|i| InstanceId::new(format!("{}-inst-{}", id, i)))
            .collect(),
    }
}

pub fn study(id: &str, series: &[&Series]) -> Study {
    Study {
        id: StudyId::from(id),
        patient_name: format!("PATIENT^{}", id.to_uppercase()),
        study_date: Some("20240102".to_string()),
        series: series.iter().map(|s| s.id.clone()).collect(),
    }
}

/// 内存归档
#[derive(Default)]
pub struct FakeArchive {
    pub studies: Mutex<Vec<Study>>,
    pub series: Mutex<HashMap<SeriesId, Series>>,
    pub fail_upload_at: Mutex<Option<usize>>, // 第几次上传失败（从1开始）
    pub uploaded: Mutex<Vec<String>>,
    pub upload_attempts: Mutex<usize>,
    pub fetched_images: Mutex<Vec<ImageRef>>,
    pub broken_images: Mutex<HashSet<InstanceId>>,
    pub broken_studies: Mutex<HashSet<StudyId>>,
    pub series_fetches: Mutex<usize>,
    pub offline: Mutex<bool>,
}

impl FakeArchive {
    pub fn with_study(study: Study, series: Vec<Series>) -> Arc<Self> {
        let archive = Self::default();
        archive.add_study(study, series);
        Arc::new(archive)
    }

    pub fn add_study(&self, study: Study, series: Vec<Series>) {
        self.studies.lock().unwrap().push(study);
        let mut map = self.series.lock().unwrap();
        for s in series {
            map.insert(s.id.clone(), s);
        }
    }

    fn check_online(&self) -> Result<()> {
        if *self.offline.lock().unwrap() {
            return Err(RtEditError::Http { service: "archive", status: 503 });
        }
        Ok(())
    }
}

#[async_trait]
impl ArchiveClient for FakeArchive {
    async fn list_studies(&self) -> Result<Vec<StudyId>> {
        self.check_online()?;
        Ok(self.studies.lock().unwrap().iter().map(|s| s.id.clone()).collect())
    }

    async fn fetch_study(&self, id: &StudyId) -> Result<Study> {
        self.check_online()?;
        if self.broken_studies.lock().unwrap().contains(id) {
            return Err(RtEditError::Http { service: "archive", status: 500 });
        }
        self.studies
            .lock()
            .unwrap()
            .iter()
            .find(|s| &s.id == id)
            .cloned()
            .ok_or_else(|| RtEditError::NotFound(id.to_string()))
    }

    async fn fetch_series(&self, id: &SeriesId) -> Result<Series> {
        self.check_online()?;
        *self.series_fetches.lock().unwrap() += 1;
        self.series
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| RtEditError::NotFound(id.to_string()))
    }

    async fn upload(&self, file: &UploadFile) -> Result<UploadReceipt> {
        let attempt = {
            let mut attempts = self.upload_attempts.lock().unwrap();
            *attempts += 1;
            *attempts
        };
        if *self.fail_upload_at.lock().unwrap() == Some(attempt) {
            return Err(RtEditError::Http { service: "archive", status: 500 });
        }
        self.uploaded.lock().unwrap().push(file.name.clone());
        Ok(UploadReceipt {
            file_name: file.name.clone(),
            instance_id: Some(InstanceId::new(format!("uploaded-{}", attempt))),
        })
    }

    async fn fetch_image(&self, image: &ImageRef) -> Result<Bytes> {
        self.fetched_images.lock().unwrap().push(image.clone());
        if self.broken_images.lock().unwrap().contains(&image.instance) {
            return Err(RtEditError::Http { service: "archive", status: 404 });
        }
        Ok(Bytes::from(format!("DICM:{}", image.instance)))
    }

    async fn fetch_segmentation(&self, instance: &InstanceId) -> Result<Bytes> {
        Ok(Bytes::from(format!("SEG:{}", instance)))
    }
}

/// 内存ROI提取服务
#[derive(Default)]
pub struct FakeExtractor {
    pub rois: Mutex<Vec<RoiRecord>>,
    pub fail: Mutex<bool>,
    pub calls: Mutex<Vec<InstanceId>>,
}

impl FakeExtractor {
    pub fn with_names(names: &[&str]) -> Arc<Self> {
        let extractor = Self::default();
        *extractor.rois.lock().unwrap() = names
            .iter()
            .enumerate()
            .map(|(i, name)| RoiRecord {
                name: name.to_string(),
                volume: Some(10.0 * (i + 1) as f64),
            })
            .collect();
        Arc::new(extractor)
    }
}

#[async_trait]
impl RoiExtractor for FakeExtractor {
    async fn extract_rois(&self, rtstruct: &InstanceId) -> Result<Vec<RoiRecord>> {
        self.calls.lock().unwrap().push(rtstruct.clone());
        if *self.fail.lock().unwrap() {
            return Err(RtEditError::Decode("extract-rois: missing `rois`".to_string()));
        }
        Ok(self.rois.lock().unwrap().clone())
    }
}

/// 可编排的处理后端
#[derive(Default)]
pub struct ScriptedBackend {
    pub fail_on: Mutex<Option<ProcessingStage>>,
    pub calls: Mutex<Vec<ProcessingStage>>,
    pub output_instance: Mutex<Option<InstanceId>>,
    /// 设置后，在该阶段内部等待 `release`
    pub hold_on: Mutex<Option<ProcessingStage>>,
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl ProcessingBackend for ScriptedBackend {
    async fn run_stage(
        &self,
        stage: ProcessingStage,
        _request: &ProcessingRequest,
    ) -> Result<StageReport> {
        self.calls.lock().unwrap().push(stage);

        let hold = *self.hold_on.lock().unwrap() == Some(stage);
        if hold {
            self.entered.notify_one();
            self.release.notified().await;
        }

        if *self.fail_on.lock().unwrap() == Some(stage) {
            return Err(RtEditError::Http { service: "orchestrator", status: 500 });
        }
        let output_instance = match stage {
            ProcessingStage::GenerateOutput => self.output_instance.lock().unwrap().clone(),
            _ => None,
        };
        Ok(StageReport {
            stage,
            detail: serde_json::Value::Null,
            output_instance,
        })
    }
}

/// 记录所有上报内容
#[derive(Default)]
pub struct RecordingReporter {
    pub statuses: Mutex<Vec<String>>,
    pub progress: Mutex<Vec<f64>>,
    pub notifications: Mutex<Vec<Notification>>,
}

impl RecordingReporter {
    pub fn progress(&self) -> Vec<f64> {
        self.progress.lock().unwrap().clone()
    }

    pub fn last_notification(&self) -> Option<Notification> {
        self.notifications.lock().unwrap().last().cloned()
    }
}

impl ProgressReporter for RecordingReporter {
    fn status(&self, message: &str) {
        self.statuses.lock().unwrap().push(message.to_string());
    }

    fn progress(&self, percent: f64) {
        self.progress.lock().unwrap().push(percent);
    }

    fn notify(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }
}

/// 记录显示过的切片
#[derive(Default)]
pub struct RecordingDisplay {
    pub shown: Mutex<Vec<ImageRef>>,
}

impl RecordingDisplay {
    pub fn shown(&self) -> Vec<ImageRef> {
        self.shown.lock().unwrap().clone()
    }
}

#[async_trait]
impl SliceDisplay for RecordingDisplay {
    async fn show(&self, image: &ImageRef, _data: Bytes) -> Result<()> {
        self.shown.lock().unwrap().push(image.clone());
        Ok(())
    }
}
