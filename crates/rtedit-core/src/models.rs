//! 核心数据模型定义

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! archive_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

archive_id!(
    /// 影像归档中的检查标识符
    StudyId
);
archive_id!(
    /// 影像归档中的系列标识符
    SeriesId
);
archive_id!(
    /// 影像归档中的实例标识符（单个DICOM对象）
    InstanceId
);

/// 检查信息（每次目录刷新得到的不可变快照）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Study {
    pub id: StudyId,
    pub patient_name: String,
    pub study_date: Option<String>, // YYYYMMDD
    pub series: Vec<SeriesId>,
}

impl Study {
    /// 用于列表显示的检查日期
    pub fn display_date(&self) -> String {
        crate::utils::format_study_date(self.study_date.as_deref())
    }
}

/// 系列信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub id: SeriesId,
    pub study_id: StudyId, // 仅作反向引用
    pub modality: Option<String>,
    pub instances: Vec<InstanceId>,
}

impl Series {
    pub fn role(&self) -> SeriesRole {
        SeriesRole::from_modality(self.modality.as_deref())
    }
}

/// 系列在流水线中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeriesRole {
    Ct,
    RtStruct,
    Other,
}

impl SeriesRole {
    pub fn from_modality(modality: Option<&str>) -> Self {
        match modality {
            Some("CT") => Self::Ct,
            Some("RTSTRUCT") => Self::RtStruct,
            _ => Self::Other,
        }
    }
}

/// ROI显示颜色调色板（12色，按位置循环使用）
pub const ROI_PALETTE: [&str; 12] = [
    "#ff6b6b", "#4ecdc4", "#45b7d1", "#f9ca24",
    "#6c5ce7", "#00b894", "#fdcb6e", "#e17055",
    "#74b9ff", "#a29bfe", "#fd79a8", "#fab1a0",
];

/// 提取结果中第 `index` 个ROI的显示颜色
pub fn roi_color(index: usize) -> &'static str {
    ROI_PALETTE[index % ROI_PALETTE.len()]
}

/// 提取服务返回的ROI记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiRecord {
    pub name: String,
    #[serde(default)]
    pub volume: Option<f64>, // cm³
}

/// 会话中的ROI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Roi {
    pub name: String,
    pub volume_cm3: Option<f64>,
    pub color: &'static str,
    pub visible: bool,
}

impl Roi {
    /// 按提取结果中的位置构造ROI，颜色由位置决定
    pub fn from_record(index: usize, record: RoiRecord) -> Self {
        Self {
            name: record.name,
            volume_cm3: record.volume,
            color: roi_color(index),
            visible: true,
        }
    }

    pub fn volume_label(&self) -> String {
        match self.volume_cm3 {
            Some(volume) => format!("{:.2} cm³", volume),
            None => "N/A".to_string(),
        }
    }
}

/// 按提取顺序构造ROI列表
pub fn rois_from_records(records: Vec<RoiRecord>) -> Vec<Roi> {
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| Roi::from_record(index, record))
        .collect()
}

/// 切片查看器使用的影像引用
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub scheme: String,
    pub instance: InstanceId,
}

impl ImageRef {
    pub const WADO_URI: &'static str = "wadouri";

    pub fn wado(instance: InstanceId) -> Self {
        Self {
            scheme: Self::WADO_URI.to_string(),
            instance,
        }
    }

    /// 归档网关上的原始DICOM对象路径
    pub fn path(&self) -> String {
        format!("/api/orthanc/instances/{}/file", self.instance)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.path())
    }
}
