//! 上传协调器
//!
//! 按顺序逐个上传一批文件。任何一个文件失败都立即停止，
//! 已上传的文件保留在归档中，不做回滚。

use rtedit_core::{utils::percent, Result, RtEditError};
use rtedit_integration::{bounded, ArchiveClient, UploadFile, UploadReceipt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::flight::SingleFlight;
use crate::reporter::ProgressReporter;

/// 批量上传结果
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReport {
    pub total: usize,
    pub receipts: Vec<UploadReceipt>,
}

/// 上传协调器
pub struct UploadCoordinator {
    archive: Arc<dyn ArchiveClient>,
    flight: SingleFlight,
    budget: Duration,
}

impl UploadCoordinator {
    pub fn new(archive: Arc<dyn ArchiveClient>, budget: Duration) -> Self {
        Self {
            archive,
            flight: SingleFlight::new("upload"),
            budget,
        }
    }

    pub fn in_flight(&self) -> bool {
        self.flight.in_flight()
    }

    /// 顺序上传，每个文件成功后上报 `完成数 / 总数 × 100`
    pub async fn upload_batch(
        &self,
        files: &[UploadFile],
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<UploadReport> {
        let _permit = self.flight.acquire()?;

        if files.is_empty() {
            return Err(RtEditError::Validation("no files to upload".to_string()));
        }

        let total = files.len();
        reporter.status("Uploading DICOM files...");
        reporter.progress(0.0);

        let mut receipts = Vec::with_capacity(total);
        for (position, file) in files.iter().enumerate() {
            let operation = format!("upload {}", file.name);
            match bounded(&operation, self.budget, cancel, self.archive.upload(file)).await {
                Ok(receipt) => {
                    receipts.push(receipt);
                    reporter.progress(percent(position + 1, total));
                }
                Err(e) => {
                    error!("Upload of {} failed after {} of {} files: {}", file.name, position, total, e);
                    return Err(RtEditError::UploadFailed {
                        index: position + 1,
                        uploaded: position,
                        total,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!("Uploaded {} files", total);
        Ok(UploadReport { total, receipts })
    }
}
