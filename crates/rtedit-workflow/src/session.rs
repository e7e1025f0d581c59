//! 编辑会话状态
//!
//! 当前检查、系列分类、ROI列表、查看会话与所选工具。
//! 所有修改都经过 `reduce(state, event) -> state`，展示层只观察快照。

use rtedit_core::{Result, Roi, RtEditError, Study};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::catalog::Classification;
use crate::viewer::ViewerSession;

/// 查看器工具
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewerTool {
    #[default]
    Zoom,
    Pan,
    WindowLevel,
    Measure,
}

impl FromStr for ViewerTool {
    type Err = RtEditError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "zoom" => Ok(Self::Zoom),
            "pan" => Ok(Self::Pan),
            "window-level" | "wl" => Ok(Self::WindowLevel),
            "measure" => Ok(Self::Measure),
            _ => Err(RtEditError::Validation(format!("unknown tool: {}", value))),
        }
    }
}

/// 会话状态
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionState {
    pub study: Option<Study>,
    pub classification: Option<Classification>,
    pub rois: Vec<Roi>,
    pub viewer: Option<ViewerSession>,
    pub editing_roi: Option<usize>,
    pub tool: ViewerTool,
}

impl SessionState {
    pub fn can_process(&self) -> bool {
        self.classification
            .as_ref()
            .map(Classification::can_process)
            .unwrap_or(false)
    }
}

/// 会话事件
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// 选择检查：整体替换ROI列表与查看会话
    StudySelected {
        study: Study,
        classification: Classification,
    },
    RoisLoaded(Vec<Roi>),
    SliceSelected(usize),
    RoiVisibilityToggled(usize),
    RoiEditRequested(usize),
    ToolSelected(ViewerTool),
    Reset,
}

/// 纯状态转换
pub fn reduce(state: &SessionState, event: SessionEvent) -> Result<SessionState> {
    let mut next = state.clone();
    match event {
        SessionEvent::StudySelected {
            study,
            classification,
        } => {
            next.viewer = classification
                .ct
                .as_ref()
                .and_then(ViewerSession::from_series);
            next.study = Some(study);
            next.classification = Some(classification);
            next.rois = Vec::new();
            next.editing_roi = None;
        }
        SessionEvent::RoisLoaded(rois) => {
            next.rois = rois;
            next.editing_roi = None;
        }
        SessionEvent::SliceSelected(index) => {
            let viewer = next
                .viewer
                .as_mut()
                .ok_or_else(|| RtEditError::Validation("no series loaded in viewer".to_string()))?;
            viewer.select(index)?;
        }
        SessionEvent::RoiVisibilityToggled(index) => {
            let roi = roi_mut(&mut next, index)?;
            roi.visible = !roi.visible;
        }
        SessionEvent::RoiEditRequested(index) => {
            roi_mut(&mut next, index)?;
            next.editing_roi = Some(index);
        }
        SessionEvent::ToolSelected(tool) => next.tool = tool,
        SessionEvent::Reset => next = SessionState::default(),
    }
    Ok(next)
}

fn roi_mut(state: &mut SessionState, index: usize) -> Result<&mut Roi> {
    let len = state.rois.len();
    state
        .rois
        .get_mut(index)
        .ok_or_else(|| RtEditError::NotFound(format!("ROI #{} (of {})", index, len)))
}
