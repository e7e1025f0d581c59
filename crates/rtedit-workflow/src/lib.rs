//! # RT Editor 工作流模块
//!
//! 提供RT-STRUCT编辑流水线的编排功能，包括：
//! - 上传协调：顺序批量上传与进度上报
//! - 检查目录：检查列表与CT/RT-STRUCT系列分类
//! - 步骤状态机：导入 → 体素化 → 编辑 → 后处理 → 生成输出
//! - 切片查看与ROI会话状态
//! - 流水线控制器：串联以上全部功能

pub mod catalog;
pub mod commands;
pub mod controller;
pub mod flight;
pub mod reporter;
pub mod session;
pub mod state_machine;
pub mod upload;
pub mod viewer;
pub mod workflow;

#[cfg(test)]
mod testing;

// 重新导出主要类型
pub use catalog::{classify_series, Classification, StudyCatalog, MAX_LISTED_STUDIES};
pub use commands::CommandTable;
pub use controller::{Collaborators, ControllerSettings, PipelineController, SelectionSummary};
pub use flight::{FlightPermit, SingleFlight};
pub use reporter::{Notification, NotificationLevel, ProgressReporter, TracingReporter};
pub use session::{reduce, SessionEvent, SessionState, ViewerTool};
pub use state_machine::{StepEvent, StepStateMachine, StepStatus};
pub use upload::{UploadCoordinator, UploadReport};
pub use viewer::{SliceDisplay, SliceRenderer, ViewerSession};
pub use workflow::{PipelineStep, Workflow, WorkflowState, WorkflowStep};
