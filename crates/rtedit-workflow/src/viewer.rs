//! 切片查看会话
//!
//! 一个系列的有序影像引用与当前显示位置。切片索引对外从1开始，
//! 范围为 `[1, N]`。

use async_trait::async_trait;
use bytes::Bytes;
use rtedit_core::{ImageRef, Result, RtEditError, Series, SeriesId};
use rtedit_integration::ArchiveClient;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// 查看会话
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewerSession {
    series: SeriesId,
    images: Vec<ImageRef>,
    current: usize,
}

impl ViewerSession {
    pub fn new(series: SeriesId, images: Vec<ImageRef>) -> Result<Self> {
        if images.is_empty() {
            return Err(RtEditError::Validation(format!(
                "series {} has no images",
                series
            )));
        }
        Ok(Self {
            series,
            images,
            current: 1,
        })
    }

    /// 每个实例一个影像引用；没有实例时返回 `None`
    pub fn from_series(series: &Series) -> Option<Self> {
        let images = series
            .instances
            .iter()
            .cloned()
            .map(ImageRef::wado)
            .collect();
        Self::new(series.id.clone(), images).ok()
    }

    pub fn series(&self) -> &SeriesId {
        &self.series
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn images(&self) -> &[ImageRef] {
        &self.images
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_image(&self) -> &ImageRef {
        &self.images[self.current - 1]
    }

    /// 切片计数器文本
    pub fn counter_text(&self) -> String {
        self.current.to_string()
    }

    /// 只有多于一张切片时才提供导航
    pub fn navigation_enabled(&self) -> bool {
        self.images.len() > 1
    }

    /// 移动到第 `index` 张切片
    pub fn select(&mut self, index: usize) -> Result<&ImageRef> {
        if index < 1 || index > self.images.len() {
            return Err(RtEditError::SliceOutOfRange {
                index,
                len: self.images.len(),
            });
        }
        self.current = index;
        Ok(&self.images[index - 1])
    }
}

/// 显示表面
#[async_trait]
pub trait SliceDisplay: Send + Sync {
    async fn show(&self, image: &ImageRef, data: Bytes) -> Result<()>;
}

/// 读取切片并交给显示表面；单张切片的失败只记录日志
pub struct SliceRenderer {
    archive: Arc<dyn ArchiveClient>,
    display: Arc<dyn SliceDisplay>,
}

impl SliceRenderer {
    pub fn new(archive: Arc<dyn ArchiveClient>, display: Arc<dyn SliceDisplay>) -> Self {
        Self { archive, display }
    }

    /// 可重复调用；返回是否显示成功
    pub async fn render(&self, image: &ImageRef) -> bool {
        debug!("Loading slice {}", image);
        let data = match self.archive.fetch_image(image).await {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to load slice {}: {}", image, e);
                return false;
            }
        };
        match self.display.show(image, data).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to display slice {}: {}", image, e);
                false
            }
        }
    }
}
