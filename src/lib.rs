//! # RT Editor
//!
//! RT-STRUCT 编辑流水线：上传DICOM文件、分类CT与RT-STRUCT系列、
//! 提取ROI、浏览切片，并经体素化与后处理生成DICOM-SEG。

pub use rtedit_core as model;
pub use rtedit_integration as integration;
pub use rtedit_workflow as workflow;

pub use rtedit_core::{Result, RtEditError};
pub use rtedit_workflow::{
    Collaborators, ControllerSettings, PipelineController, ProgressReporter, SelectionSummary,
    TracingReporter,
};
